//! Page-by-page text extraction from PDF files.

use std::path::Path;

use lopdf::Document as PdfDocument;
use tracing::debug;

use super::{Document, RetrievalError};

/// One [`Document`] per page with text, sourced as `<file>#page=<n>`.
/// Pages with no extractable text are skipped.
pub(super) fn load_pdf(path: &Path, file_name: &str) -> Result<Vec<Document>, RetrievalError> {
    let pdf_err = |message: String| RetrievalError::Pdf { path: path.to_path_buf(), message };

    let pdf = PdfDocument::load(path).map_err(|e| pdf_err(e.to_string()))?;

    let mut pages = Vec::new();
    for page in pdf.get_pages().into_keys() {
        let text = pdf
            .extract_text(&[page])
            .map_err(|e| pdf_err(format!("page {page}: {e}")))?;
        if text.trim().is_empty() {
            debug!(path = %path.display(), page, "skipping page without text");
            continue;
        }
        pages.push(Document { text, source: format!("{file_name}#page={page}") });
    }
    Ok(pages)
}
