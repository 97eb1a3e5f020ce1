//! Reference HTML-scraping plugin (spec §4.F supplement).
//!
//! Fetches a per-keyword results page and runs the shared link parser
//! (component A) over the raw markup, the same way the teacher's
//! `extract_links_by_pattern` pulls hrefs out of a page without a full
//! HTML parser.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use netreach_common::types::SearchResult;
use reqwest::Client;
use tracing::{info, warn};

use crate::plugin::Plugin;

pub struct HtmlScrapePlugin {
    name: String,
    /// Template containing a literal `{keyword}` placeholder.
    search_url_template: String,
    client: Client,
}

impl HtmlScrapePlugin {
    pub fn new(name: impl Into<String>, search_url_template: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build html plugin client");
        Self {
            name: name.into(),
            search_url_template: search_url_template.into(),
            client,
        }
    }

    fn title_regex() -> &'static regex::Regex {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r#"<a[^>]*>([^<]{2,120})</a>"#).expect("valid regex"))
    }
}

#[async_trait]
impl Plugin for HtmlScrapePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, keyword: &str, _ext: &serde_json::Value) -> anyhow::Result<Vec<SearchResult>> {
        let url = self.search_url_template.replace("{keyword}", &urlencoding_escape(keyword));

        let fetch = netreach_common::retry::with_backoff(|_attempt| {
            let client = &self.client;
            let url = &url;
            async move {
                let resp = client.get(url).send().await?;
                if resp.status().as_u16() != 200 {
                    anyhow::bail!("html plugin endpoint returned non-200 status {}", resp.status());
                }
                resp.text().await.map_err(anyhow::Error::from)
            }
        })
        .await;

        let html = match fetch {
            Ok(html) => html,
            Err(e) => {
                warn!(plugin = %self.name, error = %e, "html plugin request failed after retries");
                return Ok(Vec::new());
            }
        };

        let links = netreach_parser::parse_links(&html);
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let titles: Vec<&str> = Self::title_regex()
            .captures_iter(&html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        let now = Utc::now();
        let results = links
            .into_iter()
            .enumerate()
            .map(|(i, link)| {
                let title = titles.get(i).copied().unwrap_or(keyword).trim().to_string();
                let internal_id = format!("{i}-{}", link.url);
                SearchResult {
                    unique_id: SearchResult::plugin_unique_id(&self.name, &internal_id),
                    message_id: internal_id,
                    channel: String::new(),
                    datetime: now,
                    title,
                    content: String::new(),
                    links: vec![link],
                    tags: Vec::new(),
                    images: Vec::new(),
                }
            })
            .collect::<Vec<_>>();

        info!(plugin = %self.name, count = results.len(), "html plugin search complete");
        Ok(results)
    }
}

fn urlencoding_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoding_escape_preserves_unreserved_chars() {
        assert_eq!(urlencoding_escape("abc-123_XYZ.~"), "abc-123_XYZ.~");
    }

    #[test]
    fn urlencoding_escape_percent_encodes_everything_else() {
        assert_eq!(urlencoding_escape("a b"), "a%20b");
        assert_eq!(urlencoding_escape("中文"), "%E4%B8%AD%E6%96%87");
    }
}
