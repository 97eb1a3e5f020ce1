//! Plugin Registry & Base (spec §4.F).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netreach_common::types::SearchResult;

/// Outcome of `search_with_result`: the raw results plus whether this
/// is a final (complete) answer and when it was produced.
pub struct PluginSearchOutcome {
    pub results: Vec<SearchResult>,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

/// A third-party search backend (spec §4.F). Implementors are HTML
/// scrapers or JSON-API clients; the async runtime (component E) is
/// what actually applies timeouts/caching around `search`.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Registration order tiebreaker; higher runs first when the
    /// orchestrator needs to rank otherwise-equal sources.
    fn priority(&self) -> i32 {
        0
    }

    /// Opt out of the orchestrator's keyword post-filter (spec §4.H
    /// step 5) — for plugins whose backend already scopes results to
    /// the keyword server-side.
    fn skip_service_filter(&self) -> bool {
        false
    }

    async fn search(&self, keyword: &str, ext: &serde_json::Value) -> anyhow::Result<Vec<SearchResult>>;

    /// Default `search_with_result`: a single call to `search` is
    /// always treated as final. The async runtime is the layer that
    /// produces non-final (partial/timed-out) outcomes.
    async fn search_with_result(&self, keyword: &str, ext: &serde_json::Value) -> anyhow::Result<PluginSearchOutcome> {
        let results = self.search(keyword, ext).await?;
        Ok(PluginSearchOutcome {
            results,
            is_final: true,
            timestamp: Utc::now(),
        })
    }
}
