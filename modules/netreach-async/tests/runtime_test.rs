use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netreach_async::{AsyncPluginRuntime, WorkerPool};
use netreach_cache::{MainCache, PluginCache};
use netreach_common::types::SearchResult;
use netreach_plugins::{Plugin, PluginSearchOutcome};

fn result(id: &str) -> SearchResult {
    SearchResult {
        unique_id: id.to_string(),
        message_id: id.to_string(),
        channel: String::new(),
        datetime: chrono::Utc::now(),
        title: format!("title-{id}"),
        content: String::new(),
        links: Vec::new(),
        tags: Vec::new(),
        images: Vec::new(),
    }
}

struct FastPlugin {
    calls: AtomicUsize,
}

#[async_trait]
impl Plugin for FastPlugin {
    fn name(&self) -> &str {
        "fast"
    }

    async fn search(&self, _keyword: &str, _ext: &serde_json::Value) -> anyhow::Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![result("a")])
    }
}

struct SlowPlugin {
    delay: Duration,
}

#[async_trait]
impl Plugin for SlowPlugin {
    fn name(&self) -> &str {
        "slow"
    }

    async fn search(&self, _keyword: &str, _ext: &serde_json::Value) -> anyhow::Result<Vec<SearchResult>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![result("slow-1")])
    }

    async fn search_with_result(&self, keyword: &str, ext: &serde_json::Value) -> anyhow::Result<PluginSearchOutcome> {
        let results = self.search(keyword, ext).await?;
        Ok(PluginSearchOutcome {
            results,
            is_final: true,
            timestamp: chrono::Utc::now(),
        })
    }
}

fn runtime(response_timeout: Duration, plugin_timeout: Duration, max_workers: usize, max_tasks: usize) -> AsyncPluginRuntime {
    let plugin_cache = Arc::new(PluginCache::new(Duration::from_secs(3600), 10_000_000));
    let main_cache = Arc::new(MainCache::new());
    let pool = WorkerPool::new(max_workers, max_tasks);
    AsyncPluginRuntime::new(plugin_cache, main_cache, pool, response_timeout, plugin_timeout, Duration::from_secs(3600))
}

#[tokio::test]
async fn miss_with_fast_plugin_returns_final_results() {
    let rt = runtime(Duration::from_millis(500), Duration::from_secs(5), 4, 10);
    let plugin = Arc::new(FastPlugin { calls: AtomicUsize::new(0) });
    let outcome = rt.search(plugin, "kw", serde_json::json!({}), "fp").await;
    assert!(outcome.is_final);
    assert_eq!(outcome.results.len(), 1);
}

#[tokio::test]
async fn response_timeout_returns_empty_nonfinal_while_plugin_keeps_running() {
    let rt = runtime(Duration::from_millis(50), Duration::from_secs(5), 4, 10);
    let plugin = Arc::new(SlowPlugin { delay: Duration::from_millis(300) });
    let outcome = rt.search(plugin, "kw", serde_json::json!({}), "fp").await;
    assert!(!outcome.is_final);
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn saturated_pool_falls_back_to_inline_short_client() {
    // max_tasks=0 means try_acquire always fails -> inline path.
    let rt = runtime(Duration::from_millis(500), Duration::from_secs(5), 4, 0);
    let plugin = Arc::new(FastPlugin { calls: AtomicUsize::new(0) });
    let outcome = rt.search(plugin, "kw", serde_json::json!({}), "fp").await;
    assert!(outcome.is_final);
    assert_eq!(outcome.results.len(), 1);
}

#[tokio::test]
async fn second_call_within_ttl_is_served_from_plugin_cache_without_recalling_plugin() {
    let rt = runtime(Duration::from_millis(500), Duration::from_secs(5), 4, 10);
    let plugin = Arc::new(FastPlugin { calls: AtomicUsize::new(0) });
    let _ = rt.search(plugin.clone(), "kw", serde_json::json!({}), "fp").await;
    let calls_after_first = plugin.calls.load(Ordering::SeqCst);
    let outcome = rt.search(plugin.clone(), "kw", serde_json::json!({}), "fp").await;
    assert_eq!(plugin.calls.load(Ordering::SeqCst), calls_after_first);
    assert!(outcome.is_final);
}
