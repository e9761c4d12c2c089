//! Register-of-interests recognition.

use url::Url;

/// Phrases that identify a register of interests in link or page text.
const REGISTER_PHRASES: &[&str] = &[
    "register of interests",
    "register of interest",
    "register of member interests",
    "register of members interests",
    "register of members' interests",
    "register of member's interests",
    "members' interests",
    "member's interests",
    "declaration of interest",
    "declarations of interest",
    "pecuniary interests",
    "disclosable pecuniary interests",
];

/// URL fragments used by common council CMSs for register pages.
const REGISTER_URL_HINTS: &[&str] = &[
    "mgdeclarationsubmission",
    "mgrofi",
    "registerofinterests",
    "register-of-interests",
    "register-of-members-interests",
];

/// Words that suggest a link leads towards councillor or governance pages.
const GOVERNANCE_KEYWORDS: &[&str] = &[
    "register",
    "interest",
    "member",
    "councillor",
    "democracy",
    "committee",
    "governance",
    "declaration",
    "mgmemberindex",
    "mguserinfo",
];

/// True when the combined link text and href look like a register of interests.
///
/// Matching is case-insensitive with whitespace runs collapsed.
pub fn looks_like_register(text: &str, href: &str) -> bool {
    let haystack = haystack(text, href);
    REGISTER_URL_HINTS.iter().any(|hint| haystack.contains(hint))
        || REGISTER_PHRASES.iter().any(|phrase| haystack.contains(phrase))
}

/// Page-text variant of [`looks_like_register`].
pub fn looks_like_register_text(text: &str) -> bool {
    looks_like_register(text, "")
}

/// True when the URL path ends in `.pdf` (query string ignored).
pub fn is_pdf_link(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}

/// True when a link is worth following during a council-site crawl.
pub fn has_governance_keyword(text: &str, href: &str) -> bool {
    let haystack = haystack(text, href);
    GOVERNANCE_KEYWORDS.iter().any(|kw| haystack.contains(kw))
}

fn haystack(text: &str, href: &str) -> String {
    format!("{text} {href}")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_register_phrases() {
        assert!(looks_like_register("Register of Interests", ""));
        assert!(looks_like_register("Declarations of Interest", ""));
        assert!(looks_like_register("Disclosable Pecuniary Interests", ""));
        assert!(looks_like_register("Register of Members' Interests", ""));
        assert!(looks_like_register("Register  of\n interests", ""));
        assert!(!looks_like_register("Contact Us", ""));
        assert!(!looks_like_register("Council tax", "/council-tax"));
    }

    #[test]
    fn recognises_cms_url_hints() {
        assert!(looks_like_register("View", "mgRofI.aspx?UID=123"));
        assert!(looks_like_register(
            "",
            "https://democracy.example.gov.uk/mgDeclarationSubmission.aspx?UID=9"
        ));
        assert!(looks_like_register("", "/councillors/register-of-interests"));
        assert!(!looks_like_register("View", "/mgUserInfo.aspx?UID=123"));
    }

    #[test]
    fn page_text_variant() {
        assert!(looks_like_register_text(
            "Councillor Alex Carter Register of interests Section 1 Employment"
        ));
        assert!(!looks_like_register_text("Bin collection days"));
    }

    #[test]
    fn pdf_links_ignore_query() {
        let pdf = Url::parse("https://example.gov.uk/docs/ROI%20Carter.PDF?v=2").unwrap();
        let page = Url::parse("https://example.gov.uk/docs/roi?file=a.pdf").unwrap();
        assert!(is_pdf_link(&pdf));
        assert!(!is_pdf_link(&page));
    }

    #[test]
    fn governance_keywords() {
        assert!(has_governance_keyword("Your councillors", "/councillors"));
        assert!(has_governance_keyword("", "/mgMemberIndex.aspx"));
        assert!(!has_governance_keyword("Parking permits", "/parking"));
    }
}
