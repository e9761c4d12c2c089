//! PDF text extraction via `lopdf`.

use lopdf::Document;
use tracing::{debug, warn};

/// Extract the text of every page, joining non-empty pages with a blank line.
///
/// Returns an empty string when the document cannot be parsed; callers treat
/// that as "needs manual review" rather than as a fetch failure.
pub fn extract_pdf_text(bytes: &[u8]) -> String {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, len = bytes.len(), "PDF parse failed");
            return String::new();
        }
    };

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    pages.push(text.to_string());
                }
            }
            Err(e) => debug!(page = page_number, error = %e, "page text extraction failed"),
        }
    }

    pages.join("\n\n").trim().to_string()
}
