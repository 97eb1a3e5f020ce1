//! Channel Scraper (spec §4.G): fetches a channel's public feed page
//! and turns it into `SearchResult`s via the message-block parser.

use std::time::Duration;

use netreach_common::types::SearchResult;
use reqwest::Client;
use tracing::warn;

use crate::parse::parse_channel_page;

pub struct ChannelScraper {
    client: Client,
    /// Base URL ending right before the channel name, e.g. `https://t.me/s/`.
    base_url: String,
}

impl ChannelScraper {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build channel scraper client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch and parse a single channel's feed. A fetch or parse
    /// failure yields an empty result set rather than an error — per
    /// spec §4.G, one channel's failure must never fail the whole
    /// orchestration.
    pub async fn scrape(&self, channel: &str) -> Vec<SearchResult> {
        match self.fetch(channel).await {
            Ok(html) => parse_channel_page(channel, &html),
            Err(e) => {
                warn!(channel, error = %e, "channel fetch failed, yielding empty sub-result");
                Vec::new()
            }
        }
    }

    /// Fetch with the spec §5 retry policy: exponential backoff, up to
    /// 3 attempts, 200 OK the sole success status (anything else —
    /// including other 2xx — is treated as a transient failure worth
    /// retrying, since these feeds never legitimately respond with
    /// e.g. a 204 or 206).
    async fn fetch(&self, channel: &str) -> anyhow::Result<String> {
        let url = format!("{}{}", self.base_url, channel);
        netreach_common::retry::with_backoff(|_attempt| {
            let client = &self.client;
            let url = &url;
            async move {
                let resp = client.get(url).header("User-Agent", "netreach-channel/0.1").send().await?;
                if resp.status().as_u16() != 200 {
                    anyhow::bail!("channel feed returned non-200 status {}", resp.status());
                }
                resp.text().await.map_err(anyhow::Error::from)
            }
        })
        .await
    }
}
