//! End-to-end orchestrator scenarios (spec §8), built on in-process
//! stub plugins so none of this depends on real network access — the
//! channel side is exercised in isolation over in `netreach-channel`'s
//! own tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netreach_cache::{MainCache, PluginCache};
use netreach_channel::ChannelScraper;
use netreach_common::types::{Link, LinkType, ResultType, SearchRequest, SearchResult, SourceType};
use netreach_common::Config;
use netreach_orchestrator::Orchestrator;
use netreach_plugins::{Plugin, PluginRegistry};

struct CountingPlugin {
    name: &'static str,
    link_type: LinkType,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for CountingPlugin {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(&self, keyword: &str, _ext: &serde_json::Value) -> anyhow::Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchResult {
            unique_id: format!("{}-{}", self.name, self.calls.load(Ordering::SeqCst)),
            message_id: "1".to_string(),
            channel: String::new(),
            datetime: chrono::Utc::now(),
            title: format!("{keyword} result from {}", self.name),
            content: String::new(),
            links: vec![Link {
                link_type: self.link_type,
                url: format!("https://pan.example.com/s/{}", self.name),
                password: String::new(),
            }],
            tags: Vec::new(),
            images: Vec::new(),
        }])
    }
}

fn make_orchestrator(plugins: Vec<Arc<dyn Plugin>>) -> Arc<Orchestrator> {
    let mut config = Config::default();
    config.async_response_timeout = Duration::from_secs(2);
    config.plugin_timeout = Duration::from_secs(2);
    config.cache_ttl = Duration::from_secs(3600);

    let registry = Arc::new(PluginRegistry::new());
    for p in plugins {
        registry.register(p);
    }
    let channel_scraper = Arc::new(ChannelScraper::new("https://t.me/s/"));
    let main_cache = Arc::new(MainCache::new());
    let plugin_cache = Arc::new(PluginCache::new(Duration::from_secs(3600), 10_000_000));
    Orchestrator::new(config, registry, channel_scraper, main_cache, plugin_cache)
}

fn plugin_only_request(keyword: &str) -> SearchRequest {
    SearchRequest {
        keyword: keyword.to_string(),
        source_type: SourceType::Plugin,
        result_type: ResultType::All,
        ..Default::default()
    }
}

#[tokio::test]
async fn single_plugin_result_is_merged_into_its_link_type_bucket() {
    let calls = Arc::new(AtomicUsize::new(0));
    let plugin: Arc<dyn Plugin> = Arc::new(CountingPlugin { name: "p1", link_type: LinkType::Quark, calls: calls.clone() });
    let orchestrator = make_orchestrator(vec![plugin]);

    let response = orchestrator.search(plugin_only_request("alpha")).await;

    assert_eq!(response.total, 1);
    let merged = response.merged_by_type.expect("merged_by_type present for ResultType::All");
    assert_eq!(merged.get("quark").map(Vec::len), Some(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeat_request_within_ttl_is_served_from_main_cache_without_recalling_plugin() {
    let calls = Arc::new(AtomicUsize::new(0));
    let plugin: Arc<dyn Plugin> = Arc::new(CountingPlugin { name: "p1", link_type: LinkType::Baidu, calls: calls.clone() });
    let orchestrator = make_orchestrator(vec![plugin]);

    let _ = orchestrator.search(plugin_only_request("beta")).await;
    let second = orchestrator.search(plugin_only_request("beta")).await;

    assert_eq!(second.total, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second call should be served from the main cache");
}

#[tokio::test]
async fn force_refresh_bypasses_the_main_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let plugin: Arc<dyn Plugin> = Arc::new(CountingPlugin { name: "p1", link_type: LinkType::Baidu, calls: calls.clone() });
    let orchestrator = make_orchestrator(vec![plugin]);

    let _ = orchestrator.search(plugin_only_request("gamma")).await;
    let mut refreshed = plugin_only_request("gamma");
    refreshed.force_refresh = true;
    let _ = orchestrator.search(refreshed).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2, "force_refresh must skip the main cache read");
}

#[tokio::test]
async fn cloud_types_filter_narrows_the_merged_response() {
    let calls_a = Arc::new(AtomicUsize::new(0));
    let calls_b = Arc::new(AtomicUsize::new(0));
    let quark: Arc<dyn Plugin> = Arc::new(CountingPlugin { name: "quark-src", link_type: LinkType::Quark, calls: calls_a });
    let baidu: Arc<dyn Plugin> = Arc::new(CountingPlugin { name: "baidu-src", link_type: LinkType::Baidu, calls: calls_b });
    let orchestrator = make_orchestrator(vec![quark, baidu]);

    let mut request = plugin_only_request("delta");
    request.cloud_types = vec![LinkType::Quark];
    let response = orchestrator.search(request).await;

    let merged = response.merged_by_type.expect("merged_by_type present");
    assert!(merged.contains_key("quark"));
    assert!(!merged.contains_key("baidu"));
}

#[tokio::test]
async fn results_only_result_type_omits_merged_by_type() {
    let calls = Arc::new(AtomicUsize::new(0));
    let plugin: Arc<dyn Plugin> = Arc::new(CountingPlugin { name: "p1", link_type: LinkType::Xunlei, calls });
    let orchestrator = make_orchestrator(vec![plugin]);

    let mut request = plugin_only_request("epsilon");
    request.result_type = ResultType::Results;
    let response = orchestrator.search(request).await;

    assert!(response.merged_by_type.is_none());
    assert_eq!(response.results.map(|r| r.len()), Some(1));
}
