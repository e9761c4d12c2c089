//! Councillor-index URL candidates for ModernGov-style council sites.

use url::Url;

/// Placeholder substituted with the council slug.
pub const SLUG_PLACEHOLDER: &str = "{slug}";

/// Lower-case the council name and drop everything that is not alphanumeric.
pub fn council_slug(council: &str) -> String {
    council
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Expand every template for the council, skipping ones that do not parse.
pub fn index_urls(templates: &[String], council: &str) -> Vec<Url> {
    let slug = council_slug(council);
    if slug.is_empty() {
        return Vec::new();
    }

    templates
        .iter()
        .filter_map(|template| Url::parse(&template.replace(SLUG_PLACEHOLDER, &slug)).ok())
        .collect()
}
