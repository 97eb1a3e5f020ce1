use netreach_common::Link;

use crate::normalize::normalize;
use crate::providers::{classify, extract_links, extract_password, is_valid_link};

/// Extract every valid, normalized link (with its password, if any) from
/// free-form text. This is the composition the channel scraper and
/// plugins are expected to call: extraction, classification, password
/// recovery, validation and normalization all in one pass.
pub fn parse_links(text: &str) -> Vec<Link> {
    extract_links(text)
        .into_iter()
        .filter_map(|raw| {
            let link_type = classify(&raw);
            if !is_valid_link(&raw, link_type) {
                return None;
            }
            let password = extract_password(text, &raw);
            let url = normalize(&raw, &password);
            Some(Link {
                link_type,
                url,
                password,
            })
        })
        .collect()
}
