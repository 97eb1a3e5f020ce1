//! Link Parser & Classifier (spec §4.A) — regex-based extraction of
//! download links and passwords from free-form text, plus per-provider
//! URL classification and canonicalization.

pub mod normalize;
pub mod parse;
pub mod providers;

pub use normalize::normalize as normalize_url;
pub use parse::parse_links;
pub use providers::{classify, extract_links, extract_password, is_valid_link};
