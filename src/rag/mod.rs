//! Retrieval-augmented generation.
//!
//! `RagOrchestrator` drives a chat turn: sentinel interception, scope
//! resolution, retrieval, prompt augmentation, generation, persistence.

mod orchestrator;
mod prompt;

pub use orchestrator::{RagOrchestrator, FALLBACK_REPLY};
pub use prompt::context_prompt;
