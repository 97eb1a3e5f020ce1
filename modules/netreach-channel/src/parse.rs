//! Message-block extraction out of a channel feed page (spec §4.G).
//!
//! The feed markup is treated the way the teacher's `RssFetcher`/
//! `extract_links_by_pattern` treat pages: with targeted regexes
//! instead of a full HTML parser, since the only structure that
//! matters is a handful of well-known attributes.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use netreach_common::types::{Link, SearchResult};

fn data_post_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"data-post="([^"/]+)/(\d+)""#).expect("valid regex"))
}

fn datetime_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"datetime="([^"]+)""#).expect("valid regex"))
}

fn href_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"))
}

fn background_image_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"background-image:\s*url\(['"]?([^'")]+)['"]?\)"#).expect("valid regex"))
}

fn img_src_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("valid regex"))
}

fn tag_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"<[^>]+>"#).expect("valid regex"))
}

fn strip_tags(html: &str) -> String {
    tag_regex().replace_all(html, "\n").to_string()
}

fn is_avatar(src: &str) -> bool {
    let lower = src.to_lowercase();
    lower.contains("userpic") || lower.contains("avatar") || lower.contains("/photo_small")
}

/// Split a channel feed page into per-message segments. Each segment
/// runs from one `data-post` occurrence up to (but not including) the
/// next one, which holds for the append-only list layout these feeds
/// use.
fn split_message_blocks(html: &str) -> Vec<(String, String, &str)> {
    let matches: Vec<_> = data_post_regex().captures_iter(html).collect();
    let mut blocks = Vec::with_capacity(matches.len());
    for (i, cap) in matches.iter().enumerate() {
        let whole = cap.get(0).unwrap();
        let start = whole.start();
        let end = matches.get(i + 1).map(|m| m.get(0).unwrap().start()).unwrap_or(html.len());
        let channel = cap[1].to_string();
        let message_id = cap[2].to_string();
        blocks.push((channel, message_id, &html[start..end]));
    }
    blocks
}

fn extract_title(text: &str) -> String {
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("名称：") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    String::new()
}

/// Dedup links by their base (pre-query) URL, keeping the first
/// non-empty password seen for each — the "per-provider bucketed
/// password map" from spec §4.G.
fn bucket_by_base_url(links: Vec<Link>) -> Vec<Link> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Link> = HashMap::new();
    for link in links {
        let base = link.url.split('?').next().unwrap_or(&link.url).to_string();
        match buckets.get_mut(&base) {
            Some(existing) => {
                if existing.password.is_empty() && !link.password.is_empty() {
                    *existing = link;
                }
            }
            None => {
                order.push(base.clone());
                buckets.insert(base, link);
            }
        }
    }
    order.into_iter().filter_map(|k| buckets.remove(&k)).collect()
}

fn extract_images(block_html: &str) -> Vec<String> {
    let mut images = Vec::new();
    for cap in background_image_regex().captures_iter(block_html) {
        let src = cap[1].to_string();
        if !is_avatar(&src) {
            images.push(src);
        }
    }
    for cap in img_src_regex().captures_iter(block_html) {
        let src = cap[1].to_string();
        if !is_avatar(&src) {
            images.push(src);
        }
    }
    images
}

/// Parse one channel's feed page into its search results. Never
/// returns an error: a page that doesn't match the expected layout
/// simply yields zero results (spec §4.G: a single channel's failure
/// is always an empty sub-result, never a propagated error).
pub fn parse_channel_page(default_channel: &str, html: &str) -> Vec<SearchResult> {
    split_message_blocks(html)
        .into_iter()
        .map(|(channel, message_id, block)| {
            let channel = if channel.is_empty() { default_channel.to_string() } else { channel };
            let datetime = datetime_regex()
                .captures(block)
                .and_then(|c| DateTime::parse_from_rfc3339(&c[1]).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            let text = strip_tags(block);

            let anchor_links: Vec<Link> = href_regex()
                .captures_iter(block)
                .filter_map(|c| {
                    let raw = &c[1];
                    let link_type = netreach_parser::classify(raw);
                    if !netreach_parser::is_valid_link(raw, link_type) {
                        return None;
                    }
                    let password = netreach_parser::extract_password(&text, raw);
                    let url = netreach_parser::normalize_url(raw, &password);
                    Some(Link { link_type, url, password })
                })
                .collect();

            let mut links = netreach_parser::parse_links(&text);
            links.extend(anchor_links);
            let links = bucket_by_base_url(links);

            let images = extract_images(block);
            let title = extract_title(&text);

            SearchResult {
                unique_id: SearchResult::channel_unique_id(&channel, &message_id),
                message_id,
                channel,
                datetime,
                title,
                content: text.trim().to_string(),
                links,
                tags: Vec::new(),
                images,
            }
        })
        .collect()
}
