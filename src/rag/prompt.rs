pub const CONTEXT_START: &str = "--- CONTEXT START ---";
pub const CONTEXT_END: &str = "--- CONTEXT END ---";
const CHUNK_SEPARATOR: &str = "\n---\n";

/// Wrap retrieved chunks and the user's question into the prompt sent to
/// the model. Only the outgoing turn carries this; the stored message
/// keeps the bare question.
pub fn context_prompt(chunks: &[String], question: &str) -> String {
    format!(
        "{}\n{}\n{}\n\nAnswer the following question based **only** on the context provided. \
If the answer is not in the context, say that you do not have enough information. \
Question: {}",
        CONTEXT_START,
        chunks.join(CHUNK_SEPARATOR),
        CONTEXT_END,
        question
    )
}
