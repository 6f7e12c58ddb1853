//! Text extraction from uploaded files.
//!
//! Dispatches on file extension and declared content type. Structural
//! extraction is preferred; PDFs fall back to model transcription and
//! images are described by the vision-capable model.

use std::io::Read;
use std::path::Path;

use calamine::Reader;

use crate::core::errors::ApiError;
use crate::llm::{GenerativeProvider, Part};

const TRANSCRIBE_PROMPT: &str = "Extract all text from this document. Return only the plain \
text, with no additional formatting, as if copied and pasted. Do not summarize anything.";

const DESCRIBE_PROMPT: &str = "Describe this image in detail.";

/// Extract plain text from a file's raw bytes.
///
/// The returned text is guaranteed non-empty after trimming; an empty
/// result from any branch is an `ExtractionFailed` error.
pub async fn extract_text(
    llm: &dyn GenerativeProvider,
    bytes: &[u8],
    content_type: &str,
    original_name: &str,
) -> Result<String, ApiError> {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let text = match ext.as_str() {
        "docx" => extract_docx(bytes)?,
        "xlsx" | "xls" => extract_spreadsheet(bytes)?,
        "pdf" => extract_pdf(llm, bytes, content_type).await?,
        "jpg" | "jpeg" | "png" | "webp" => describe_image(llm, bytes, content_type, original_name).await?,
        _ if content_type.starts_with("image/") => {
            describe_image(llm, bytes, content_type, original_name).await?
        }
        "txt" => String::from_utf8_lossy(bytes).into_owned(),
        _ if content_type == "text/plain" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            return Err(ApiError::UnsupportedFormat(format!(
                "unsupported file type: .{} ({})",
                ext, content_type
            )))
        }
    };

    if text.trim().is_empty() {
        return Err(ApiError::ExtractionFailed(format!(
            "no text content could be extracted from \"{}\"",
            original_name
        )));
    }
    Ok(text)
}

/// Word-processor documents: unzip the document body and strip its XML.
fn extract_docx(bytes: &[u8]) -> Result<String, ApiError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ApiError::ExtractionFailed(format!("not a valid docx archive: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ApiError::ExtractionFailed(format!("docx has no document body: {}", e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ApiError::ExtractionFailed(e.to_string()))?;

    Ok(plain_text_from_docx_xml(&xml))
}

/// Pull the run text out of WordprocessingML, turning paragraphs and
/// explicit breaks into newlines.
fn plain_text_from_docx_xml(xml: &str) -> String {
    let mut result = String::new();
    let mut in_text = false;
    let mut chars = xml.chars();

    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            for t in chars.by_ref() {
                if t == '>' {
                    break;
                }
                tag.push(t);
            }
            if tag == "w:t" || tag.starts_with("w:t ") {
                in_text = true;
            } else if tag == "/w:t" {
                in_text = false;
            } else if tag == "/w:p" || tag.starts_with("w:br") {
                result.push('\n');
            } else if tag.starts_with("w:tab") {
                result.push('\t');
            }
        } else if in_text {
            result.push(c);
        }
    }

    result
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Spreadsheets: every sheet rendered as a text table, prefixed with its
/// name, sheets separated by a visible divider.
fn extract_spreadsheet(bytes: &[u8]) -> Result<String, ApiError> {
    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| ApiError::ExtractionFailed(format!("spreadsheet could not be opened: {}", e)))?;

    let mut sections = Vec::new();
    for name in workbook.sheet_names().to_owned() {
        let Some(Ok(range)) = workbook.worksheet_range(&name) else {
            continue;
        };
        let sheet_text = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n");
        if !sheet_text.trim().is_empty() {
            sections.push(format!("Contents of sheet \"{}\":\n{}", name, sheet_text));
        }
    }

    Ok(sections.join("\n\n---\n\n"))
}

/// PDFs: structural extraction first, model transcription as fallback.
async fn extract_pdf(
    llm: &dyn GenerativeProvider,
    bytes: &[u8],
    content_type: &str,
) -> Result<String, ApiError> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        outcome => {
            if let Err(e) = outcome {
                tracing::warn!("pdf text extraction failed, falling back to transcription: {}", e);
            } else {
                tracing::warn!("pdf text extraction came back empty, falling back to transcription");
            }
            llm.generate(&[
                Part::Text(TRANSCRIBE_PROMPT.to_string()),
                Part::Inline {
                    mime_type: content_type.to_string(),
                    data: bytes.to_vec(),
                },
            ])
            .await
        }
    }
}

async fn describe_image(
    llm: &dyn GenerativeProvider,
    bytes: &[u8],
    content_type: &str,
    original_name: &str,
) -> Result<String, ApiError> {
    let description = llm
        .generate(&[
            Part::Text(DESCRIBE_PROMPT.to_string()),
            Part::Inline {
                mime_type: content_type.to_string(),
                data: bytes.to_vec(),
            },
        ])
        .await?;

    Ok(format!(
        "Description of image \"{}\":\n{}",
        original_name, description
    ))
}
