use crate::core::errors::ApiError;

/// Split text into overlapping fixed-size chunks.
///
/// Windows of `chunk_size` characters advance by `chunk_size - overlap`;
/// the final chunk may be shorter. Character-indexed, so multi-byte text
/// never splits inside a code point.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ApiError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(ApiError::Configuration(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += step;
    }

    Ok(chunks)
}
