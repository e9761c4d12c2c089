//! HTML → plain text, and anchor extraction.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Elements whose text never reaches the output.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

/// Maximum length (in chars) of an anchor's parent-context text.
const CONTEXT_CHARS: usize = 200;

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

/// A link found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Absolute URL, fragment stripped.
    pub href: Url,
    /// The `href` attribute as written in the page.
    pub raw_href: String,
    /// Whitespace-collapsed link text.
    pub text: String,
    /// Whitespace-collapsed text of the parent element, truncated.
    pub context: String,
}

/// Collapse every whitespace run into one space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip markup and collapse whitespace into a single plain-text blob.
pub fn html_to_text(html: &str) -> String {
    collect_text(html, SKIP_TAGS)
}

/// Like [`html_to_text`], but without the text of links.
///
/// A page that only links to an official (a member listing, say) does not
/// name them in this text.
pub fn text_outside_links(html: &str) -> String {
    let mut skip = SKIP_TAGS.to_vec();
    skip.push("a");
    collect_text(html, &skip)
}

fn collect_text(html: &str, skip: &[&str]) -> String {
    let doc = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in doc.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| skip.contains(&el.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }

    collapse_whitespace(&parts.join(" "))
}

/// Extract every navigable anchor, resolved against `base_url`.
pub fn extract_anchors(html: &str, base_url: &Url) -> Vec<Anchor> {
    let doc = Html::parse_document(html);
    let mut anchors = Vec::new();

    for el in doc.select(&ANCHOR_SEL) {
        let Some(raw_href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if raw_href.is_empty()
            || raw_href.starts_with('#')
            || raw_href.starts_with("javascript:")
            || raw_href.starts_with("mailto:")
            || raw_href.starts_with("tel:")
        {
            continue;
        }

        let Ok(mut href) = base_url.join(raw_href) else {
            continue;
        };
        href.set_fragment(None);

        anchors.push(Anchor {
            href,
            raw_href: raw_href.to_string(),
            text: collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")),
            context: parent_context(&el),
        });
    }

    anchors
}

fn parent_context(el: &ElementRef<'_>) -> String {
    let Some(parent) = el.parent().and_then(ElementRef::wrap) else {
        return String::new();
    };
    let text = collapse_whitespace(&parent.text().collect::<Vec<_>>().join(" "));
    text.chars().take(CONTEXT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_skips_scripts_and_styles() {
        let html = r#"<html><head><title>T</title><style>p { color: red }</style></head>
            <body><script>var x = 1;</script>
            <h1>Register   of
            Interests</h1><p>Cllr <b>Alex</b> Carter</p><noscript>enable js</noscript></body></html>"#;
        assert_eq!(html_to_text(html), "Register of Interests Cllr Alex Carter");
    }

    #[test]
    fn link_text_can_be_left_out() {
        let html = r#"<html><body><h1>Register of interests</h1>
            <ul><li><a href="/roi/alex-carter">Alex <b>Carter</b></a> (Riverside)</li></ul>
            </body></html>"#;
        assert_eq!(
            html_to_text(html),
            "Register of interests Alex Carter (Riverside)"
        );
        assert_eq!(text_outside_links(html), "Register of interests (Riverside)");
    }

    #[test]
    fn anchors_resolve_and_skip_non_navigable() {
        let html = r##"<html><body>
            <ul><li>Register of interests: <a href="mgRofI.aspx?UID=12#top">view</a></li></ul>
            <a href="#main">Skip</a>
            <a href="mailto:clerk@example.gov.uk">Email</a>
            <a href="javascript:void(0)">Print</a>
            <a href="https://other.example.org/page"> External
               link </a>
        </body></html>"##;
        let base = Url::parse("https://democracy.sandshire.gov.uk/mgUserInfo.aspx?UID=12").unwrap();
        let anchors = extract_anchors(html, &base);

        assert_eq!(anchors.len(), 2);
        assert_eq!(
            anchors[0].href.as_str(),
            "https://democracy.sandshire.gov.uk/mgRofI.aspx?UID=12"
        );
        assert_eq!(anchors[0].text, "view");
        assert_eq!(anchors[0].context, "Register of interests: view");
        assert_eq!(anchors[1].text, "External link");
        assert_eq!(anchors[1].raw_href, "https://other.example.org/page");
    }

    #[test]
    fn context_is_truncated() {
        let long = "word ".repeat(100);
        let html = format!(r#"<p>{long}<a href="/x">x</a></p>"#);
        let base = Url::parse("https://example.gov.uk/").unwrap();
        let anchors = extract_anchors(&html, &base);
        assert_eq!(anchors[0].context.chars().count(), CONTEXT_CHARS);
    }
}
