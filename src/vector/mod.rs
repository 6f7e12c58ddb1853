//! Vector index over document chunks.
//!
//! Two interchangeable backends: an in-process SQLite store that keeps
//! chunk text inline, and a remote nearest-neighbor service that returns
//! ids only and needs a secondary text lookup.

mod index;
mod matching;
mod sqlite;

pub use index::{VectorEntry, VectorIndex};
pub use matching::MatchingVectorIndex;
pub use sqlite::SqliteVectorIndex;
