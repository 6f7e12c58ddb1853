//! Generative and embedding capability providers.

mod gemini;
mod provider;

pub use gemini::GeminiProvider;
pub use provider::{ChatTurn, EmbeddingProvider, GenerativeProvider, Part};
