//! Fuzzy matching of official names in free text.

use std::sync::LazyLock;

use regex::Regex;

static NON_LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z]+").expect("valid regex"));

/// Tokens either side of a surname inspected for the first name or initial.
const WINDOW_BEFORE: usize = 3;
const WINDOW_AFTER: usize = 3;

/// Lowercase and collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(lowered: &str) -> Vec<&str> {
    NON_LETTER_RE
        .split(lowered)
        .filter(|t| !t.is_empty())
        .collect()
}

/// True when `text` plausibly mentions the official called `name`.
///
/// Exact (case-insensitive) substring first; otherwise the surname must
/// appear as a whole token with the first name, or any token sharing its
/// initial, within three tokens either side. This accepts "J. Smith" and
/// "Smith, Jane" for "Jane Smith" and rejects "John Smithson".
///
/// The window includes the surname itself, so a surname sharing the first
/// name's initial ("Sam Smith") matches on the surname alone.
pub fn name_matches(text: &str, name: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lowered = normalize_name(text);
    let target = normalize_name(name);
    if target.is_empty() {
        return false;
    }
    if lowered.contains(&target) {
        return true;
    }

    let parts = tokens(&target);
    let (Some(first), Some(surname)) = (parts.first(), parts.last()) else {
        return false;
    };
    if parts.len() < 2 {
        return false;
    }
    let Some(initial) = first.chars().next() else {
        return false;
    };

    let words = tokens(&lowered);
    words
        .iter()
        .enumerate()
        .filter(|(_, word)| *word == surname)
        .any(|(i, _)| {
            let start = i.saturating_sub(WINDOW_BEFORE);
            let end = (i + WINDOW_AFTER + 1).min(words.len());
            words[start..end]
                .iter()
                .any(|w| w == first || w.starts_with(initial))
        })
}

/// True when an anchor's text names the official outright.
pub fn anchor_names_official(link_text: &str, name: &str) -> bool {
    let target = normalize_name(name);
    !target.is_empty() && normalize_name(link_text).contains(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_and_windowed_initials() {
        assert!(name_matches("Jane Q. Smith elected for Wardtown", "Jane Smith"));
        assert!(name_matches("J. Smith, Wardtown ward", "Jane Smith"));
        assert!(name_matches("Smith, Jane (Labour)", "Jane Smith"));
        assert!(name_matches("CLLR JANE   SMITH", "Jane Smith"));
    }

    #[test]
    fn rejects_near_misses() {
        assert!(!name_matches("John Smithson", "Jane Smith"));
        assert!(!name_matches("", "Jane Smith"));
        assert!(!name_matches("Carter", "Jane Smith"));
        // Surname alone, no first name or initial nearby.
        assert!(!name_matches("the smith report was tabled", "Jane Smith"));
    }

    #[test]
    fn surname_counts_toward_its_own_initial() {
        assert!(name_matches("Councillor Smith replied", "Sam Smith"));
        assert!(name_matches("Councillor S Smith replied", "Sam Smith"));
        assert!(!name_matches("Councillor Smith replied", "Jane Smith"));
    }

    #[test]
    fn hyphenated_surnames_use_last_part() {
        assert!(name_matches("A. Carter-Jones, Riverside", "Alex Carter-Jones"));
    }

    #[test]
    fn anchor_text_must_contain_full_name() {
        assert!(anchor_names_official("Councillor Alex  Carter", "Alex Carter"));
        assert!(!anchor_names_official("A. Carter", "Alex Carter"));
    }
}
