//! Conversation persistence.
//!
//! A conversation owns its ordered message log, its named document context
//! buckets and the elevated-mode flag. Globally shared documents live in a
//! separate flat table.

mod store;
mod types;

pub use store::ChatStore;
pub use types::{ChatSummary, ContextBucket, Conversation, DocumentRecord, Message, Sender};
