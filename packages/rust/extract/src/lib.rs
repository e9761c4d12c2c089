//! Content extraction: fetched HTML or PDF bytes → normalized plain text.
//!
//! The transport layer hands over a content-type header (possibly absent), the
//! request URL, and the raw body. This crate decides the document kind and
//! produces the [`FetchedContent`] that is cached for the rest of a run.

mod html;
mod pdf;

use tracing::{debug, instrument};
use url::Url;

use registerscout_shared::{ContentKind, FetchedContent};

pub use html::{Anchor, collapse_whitespace, extract_anchors, html_to_text, text_outside_links};
pub use pdf::extract_pdf_text;

/// Content-type assumed for PDFs served without a header.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Content-type assumed for everything else served without a header.
pub const HTML_CONTENT_TYPE: &str = "text/html";

/// Resolve the effective content-type and document kind.
///
/// Falls back to `.pdf`-suffix sniffing when the header is absent or blank.
pub fn detect_kind(content_type: Option<&str>, url: &Url) -> (String, ContentKind) {
    let url_is_pdf = url.path().to_ascii_lowercase().ends_with(".pdf");
    let header = content_type
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    match header {
        None if url_is_pdf => (PDF_CONTENT_TYPE.to_string(), ContentKind::Pdf),
        None => (HTML_CONTENT_TYPE.to_string(), ContentKind::Html),
        Some(ct) => {
            let kind = if ct.contains("pdf") || url_is_pdf {
                ContentKind::Pdf
            } else if ct.contains("html") || ct.contains("xml") || ct.starts_with("text/") {
                ContentKind::Html
            } else {
                ContentKind::Other
            };
            (ct, kind)
        }
    }
}

/// Heuristic used by the crawler before parsing a body as a web page.
pub fn looks_like_html(content_type: &str, body: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("text/html") || ct.contains("application/xhtml+xml") {
        return true;
    }
    // Missing or generic type: sniff the start of the body.
    if !ct.is_empty() && !ct.contains("text") {
        return false;
    }
    let sample: String = body.chars().take(500).collect::<String>().to_ascii_lowercase();
    sample.contains("<html") || sample.contains("<!doctype html")
}

/// Convert a fetched body into cacheable content.
///
/// PDFs keep their raw bytes (even when text extraction fails); HTML keeps
/// only the extracted text. Other binary types yield empty text.
#[instrument(skip(body), fields(url = %url, len = body.len()))]
pub fn extract_document(url: &Url, content_type: Option<&str>, body: Vec<u8>) -> FetchedContent {
    let (content_type, kind) = detect_kind(content_type, url);

    let (text, raw_bytes) = match kind {
        ContentKind::Pdf => (extract_pdf_text(&body), Some(body)),
        ContentKind::Html => (html_to_text(&String::from_utf8_lossy(&body)), None),
        ContentKind::Other => (String::new(), None),
    };

    debug!(%content_type, ?kind, text_len = text.len(), "content extracted");

    FetchedContent {
        url: url.clone(),
        content_type,
        kind,
        raw_bytes,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn header_wins_over_suffix_for_html() {
        let (ct, kind) = detect_kind(
            Some("text/html; charset=utf-8"),
            &url("https://example.gov.uk/councillors"),
        );
        assert_eq!(ct, "text/html; charset=utf-8");
        assert_eq!(kind, ContentKind::Html);
    }

    #[test]
    fn missing_header_sniffs_pdf_suffix() {
        let (ct, kind) = detect_kind(None, &url("https://example.gov.uk/docs/ROI-Smith.PDF"));
        assert_eq!(ct, PDF_CONTENT_TYPE);
        assert_eq!(kind, ContentKind::Pdf);

        let (ct, kind) = detect_kind(Some("  "), &url("https://example.gov.uk/page"));
        assert_eq!(ct, HTML_CONTENT_TYPE);
        assert_eq!(kind, ContentKind::Html);
    }

    #[test]
    fn octet_stream_pdf_is_pdf() {
        let (_, kind) = detect_kind(
            Some("application/octet-stream"),
            &url("https://example.gov.uk/register.pdf"),
        );
        assert_eq!(kind, ContentKind::Pdf);

        let (_, kind) = detect_kind(Some("image/png"), &url("https://example.gov.uk/logo.png"));
        assert_eq!(kind, ContentKind::Other);
    }

    #[test]
    fn html_document_drops_raw_bytes() {
        let body = b"<html><body><h1>Register of Interests</h1><p>Alex   Carter</p></body></html>";
        let content = extract_document(
            &url("https://example.gov.uk/roi"),
            Some("text/html"),
            body.to_vec(),
        );
        assert!(content.is_html());
        assert!(content.raw_bytes.is_none());
        assert_eq!(content.text, "Register of Interests Alex Carter");
    }

    #[test]
    fn broken_pdf_keeps_bytes_with_empty_text() {
        let body = b"%PDF-1.4 this is not really a pdf".to_vec();
        let content = extract_document(
            &url("https://example.gov.uk/roi.pdf"),
            Some("application/pdf"),
            body.clone(),
        );
        assert!(content.is_pdf());
        assert_eq!(content.text, "");
        assert_eq!(content.raw_bytes, Some(body));
    }

    #[test]
    fn sniff_html_without_header() {
        assert!(looks_like_html("", "<!DOCTYPE html><html><body></body></html>"));
        assert!(looks_like_html("text/html", ""));
        assert!(!looks_like_html("application/pdf", "<html>"));
        assert!(!looks_like_html("", "%PDF-1.7"));
    }
}
