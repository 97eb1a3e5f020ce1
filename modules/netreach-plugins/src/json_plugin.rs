//! Reference JSON-API plugin (spec §4.F supplement): a backend that
//! already returns structured hits, so no text scraping is needed —
//! just classification/normalization of the URLs it hands back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use netreach_common::types::{Link, SearchResult};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::plugin::Plugin;

#[derive(Debug, Deserialize)]
struct ApiHit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    items: Vec<ApiHit>,
}

pub struct JsonApiPlugin {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl JsonApiPlugin {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build json plugin client");
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key,
            client,
        }
    }
}

#[async_trait]
impl Plugin for JsonApiPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, keyword: &str, ext: &serde_json::Value) -> anyhow::Result<Vec<SearchResult>> {
        let mut body = serde_json::json!({ "keyword": keyword });
        if let (Some(body_obj), Some(ext_obj)) = (body.as_object_mut(), ext.as_object()) {
            for (k, v) in ext_obj {
                body_obj.insert(k.clone(), v.clone());
            }
        }

        let fetch = netreach_common::retry::with_backoff(|_attempt| {
            let client = &self.client;
            let endpoint = &self.endpoint;
            let body = &body;
            let api_key = &self.api_key;
            async move {
                let mut req = client.post(endpoint).json(body);
                if let Some(key) = api_key {
                    req = req.header("Authorization", format!("Bearer {key}"));
                }
                let resp = req.send().await?;
                if resp.status().as_u16() != 200 {
                    anyhow::bail!("json plugin endpoint returned non-200 status {}", resp.status());
                }
                resp.json::<ApiResponse>().await.map_err(anyhow::Error::from)
            }
        })
        .await;

        let parsed: ApiResponse = match fetch {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(plugin = %self.name, error = %e, "json plugin request failed after retries");
                return Ok(Vec::new());
            }
        };

        let now = Utc::now();
        let results = parsed
            .items
            .into_iter()
            .filter(|hit| netreach_parser::is_valid_link(&hit.url, netreach_parser::classify(&hit.url)))
            .map(|hit| {
                let link_type = netreach_parser::classify(&hit.url);
                let url = netreach_parser::normalize_url(&hit.url, &hit.password);
                let internal_id = if hit.id.is_empty() { url.clone() } else { hit.id };
                SearchResult {
                    unique_id: SearchResult::plugin_unique_id(&self.name, &internal_id),
                    message_id: internal_id,
                    channel: String::new(),
                    datetime: now,
                    title: hit.title,
                    content: String::new(),
                    links: vec![Link {
                        link_type,
                        url,
                        password: hit.password,
                    }],
                    tags: Vec::new(),
                    images: Vec::new(),
                }
            })
            .collect::<Vec<_>>();

        info!(plugin = %self.name, count = results.len(), "json plugin search complete");
        Ok(results)
    }
}
