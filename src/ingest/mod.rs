//! Document ingestion: extract, chunk, embed, index, record.

mod chunker;
mod pipeline;

pub use chunker::chunk_text;
pub use pipeline::{FileReport, IngestionPipeline, IngestionReport, UploadedFile};
