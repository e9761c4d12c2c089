//! Pure text classifiers shared by discovery, crawling and attribution.
//!
//! - [`looks_like_register`]: does a link or page look like a register of
//!   interests?
//! - [`name_matches`]: does some text mention a given official?
//!
//! Nothing here performs I/O.

mod names;
mod register;

pub use names::{anchor_names_official, name_matches, normalize_name};
pub use register::{
    has_governance_keyword, is_pdf_link, looks_like_register, looks_like_register_text,
};
