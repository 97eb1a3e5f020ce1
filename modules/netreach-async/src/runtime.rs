//! Async Plugin Runtime (spec §4.E) — the short-client/long-client
//! dual-timeout state machine around a single plugin invocation.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use netreach_cache::{Lookup, MainCache, PluginCache};
use netreach_common::types::SearchResult;
use netreach_plugins::Plugin;
use tracing::warn;

use crate::worker_pool::WorkerPool;

pub struct AsyncSearchOutcome {
    pub results: Vec<SearchResult>,
    pub is_final: bool,
}

/// Invoked after a background continuation (or refresh) lands a fresh,
/// complete result set for `(plugin_name, keyword)` under `fingerprint`.
///
/// The runtime itself only knows about one plugin's results; it has no
/// view of the other sources that make up a full `SearchResponse`. This
/// hook lets the orchestrator (which does have that view) rebuild the
/// cross-source merged response and write the upgrade, instead of the
/// runtime writing just its own plugin's slice into the main cache
/// (spec §4.E: "merge with any concurrently-stored entry ... main-cache
/// write (is_final=true)").
pub type RebuildHook =
    Arc<dyn Fn(String, String, String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct AsyncPluginRuntime {
    plugin_cache: Arc<PluginCache>,
    main_cache: Arc<MainCache>,
    worker_pool: Arc<WorkerPool>,
    /// `response_timeout` from spec §4.E: the caller is never blocked
    /// past this, regardless of cache/pool state.
    response_timeout: Duration,
    /// `plugin_timeout`: ceiling for the long-client background call.
    plugin_timeout: Duration,
    main_cache_ttl: Duration,
    rebuild_hook: Option<RebuildHook>,
}

impl AsyncPluginRuntime {
    pub fn new(
        plugin_cache: Arc<PluginCache>,
        main_cache: Arc<MainCache>,
        worker_pool: Arc<WorkerPool>,
        response_timeout: Duration,
        plugin_timeout: Duration,
        main_cache_ttl: Duration,
    ) -> Self {
        Self {
            plugin_cache,
            main_cache,
            worker_pool,
            response_timeout,
            plugin_timeout,
            main_cache_ttl,
            rebuild_hook: None,
        }
    }

    /// Attach a cross-source rebuild hook (see `RebuildHook`). Builder
    /// style so call sites that don't need it (most tests) are unaffected.
    pub fn with_rebuild_hook(mut self, hook: RebuildHook) -> Self {
        self.rebuild_hook = Some(hook);
        self
    }

    /// `AsyncSearch(keyword, search_fn, main_cache_key, ext)` (spec §4.E).
    pub async fn search(&self, plugin: Arc<dyn Plugin>, keyword: &str, ext: serde_json::Value, main_cache_key: &str) -> AsyncSearchOutcome {
        let plugin_name = plugin.name().to_string();
        let (lookup, needs_refresh) = self.plugin_cache.lookup(&plugin_name, keyword).await;

        match lookup {
            Lookup::Fresh(entry) => {
                if needs_refresh {
                    self.spawn_refresh(plugin, keyword.to_string(), ext, main_cache_key.to_string());
                }
                AsyncSearchOutcome {
                    results: entry.results,
                    is_final: true,
                }
            }
            Lookup::Stale(entry) => {
                self.spawn_refresh(plugin, keyword.to_string(), ext, main_cache_key.to_string());
                AsyncSearchOutcome {
                    results: entry.results,
                    is_final: false,
                }
            }
            Lookup::Miss => match self.worker_pool.try_acquire() {
                Some(permit) => {
                    self.execute_with_background_continuation(permit, plugin, keyword.to_string(), ext, main_cache_key.to_string())
                        .await
                }
                None => self.execute_inline(plugin, keyword.to_string(), ext).await,
            },
        }
    }

    /// Worker pool saturated: run the short-client call inline, no
    /// background continuation. Degrades gracefully — a result or an
    /// error is always returned, never a dropped task.
    async fn execute_inline(&self, plugin: Arc<dyn Plugin>, keyword: String, ext: serde_json::Value) -> AsyncSearchOutcome {
        match tokio::time::timeout(self.response_timeout, plugin.search_with_result(&keyword, &ext)).await {
            Ok(Ok(outcome)) => {
                self.plugin_cache.write(plugin.name(), &keyword, outcome.results.clone(), outcome.is_final).await;
                AsyncSearchOutcome {
                    results: outcome.results,
                    is_final: outcome.is_final,
                }
            }
            Ok(Err(e)) => {
                warn!(plugin = plugin.name(), error = %e, "plugin search failed on inline (pool-saturated) path");
                AsyncSearchOutcome {
                    results: Vec::new(),
                    is_final: true,
                }
            }
            Err(_elapsed) => AsyncSearchOutcome {
                results: Vec::new(),
                is_final: false,
            },
        }
    }

    /// A worker slot is held: spawn the long-client call, race it
    /// against `response_timeout` via a oneshot, and let the spawned
    /// task keep running as the background continuation if the race
    /// is lost. The task performs its own cache writes so the caller
    /// never needs to rejoin it.
    ///
    /// On a fresh/complete result, only the Plugin Response Cache (a
    /// `Vec<SearchResult>` store) is written directly here — the Main
    /// Cache holds serialized `SearchResponse` objects, not a single
    /// plugin's raw result list, so only the `rebuild_hook` (which has
    /// the cross-source view needed to build a real `SearchResponse`)
    /// is allowed to write it. Without a hook attached, the main cache
    /// simply isn't upgraded by this continuation; the next orchestrator
    /// run picks up the now-fresh plugin cache entry instead.
    async fn execute_with_background_continuation(
        &self,
        permit: crate::worker_pool::WorkerPermit,
        plugin: Arc<dyn Plugin>,
        keyword: String,
        ext: serde_json::Value,
        main_cache_key: String,
    ) -> AsyncSearchOutcome {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let plugin_cache = self.plugin_cache.clone();
        let plugin_timeout = self.plugin_timeout;
        let plugin_name = plugin.name().to_string();
        let task_keyword = keyword.clone();
        let rebuild_hook = self.rebuild_hook.clone();
        let task_fingerprint = main_cache_key.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = tokio::time::timeout(plugin_timeout, plugin.search_with_result(&task_keyword, &ext)).await;
            match outcome {
                Ok(Ok(fresh)) => {
                    let (existing, _) = plugin_cache.lookup(&plugin_name, &task_keyword).await;
                    let prior = match existing {
                        Lookup::Fresh(e) | Lookup::Stale(e) => e.results,
                        Lookup::Miss => Vec::new(),
                    };
                    let merged = merge_preferring_new(fresh.results, prior);
                    plugin_cache.write(&plugin_name, &task_keyword, merged.clone(), true).await;
                    if let Some(hook) = rebuild_hook {
                        hook(plugin_name.clone(), task_keyword.clone(), task_fingerprint.clone()).await;
                    }
                    let _ = tx.send(Some(AsyncSearchOutcome {
                        results: merged,
                        is_final: true,
                    }));
                }
                Ok(Err(e)) => {
                    warn!(plugin = %plugin_name, error = %e, "plugin search failed on background continuation");
                    let _ = tx.send(None);
                }
                Err(_elapsed) => {
                    warn!(plugin = %plugin_name, "plugin timed out against its own plugin_timeout, cache left as-is");
                    let _ = tx.send(None);
                }
            }
        });

        match tokio::time::timeout(self.response_timeout, rx).await {
            Ok(Ok(Some(outcome))) => outcome,
            Ok(Ok(None)) | Ok(Err(_)) => AsyncSearchOutcome {
                results: Vec::new(),
                is_final: true,
            },
            Err(_elapsed) => {
                // response_timeout hit first. Avoid clobbering a same-race
                // completion that already landed a fresh entry.
                let (current, _) = self.plugin_cache.lookup(&plugin_name, &keyword).await;
                if !matches!(current, Lookup::Fresh(_)) {
                    self.plugin_cache.write(&plugin_name, &keyword, Vec::new(), false).await;
                    let empty = serde_json::to_vec::<Vec<SearchResult>>(&Vec::new()).unwrap_or_default();
                    self.main_cache
                        .write_plugin(&plugin_name, &main_cache_key, &keyword, empty, 0, false, self.main_cache_ttl)
                        .await;
                }
                AsyncSearchOutcome {
                    results: Vec::new(),
                    is_final: false,
                }
            }
        }
    }

    /// Detached refresh task for cache hits past their freshness
    /// window (spec §4.E state machine). Reuses the same worker pool
    /// admission so a burst of refreshes can't bypass the concurrency
    /// ceiling.
    fn spawn_refresh(&self, plugin: Arc<dyn Plugin>, keyword: String, ext: serde_json::Value, main_cache_key: String) {
        let Some(permit) = self.worker_pool.try_acquire() else {
            return; // pool saturated: skip this refresh, the next hit will retry
        };
        let plugin_cache = self.plugin_cache.clone();
        let plugin_timeout = self.plugin_timeout;
        let plugin_name = plugin.name().to_string();
        let rebuild_hook = self.rebuild_hook.clone();
        let task_fingerprint = main_cache_key.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(plugin_timeout, plugin.search_with_result(&keyword, &ext)).await {
                Ok(Ok(fresh)) => {
                    let (existing, _) = plugin_cache.lookup(&plugin_name, &keyword).await;
                    let prior = match existing {
                        Lookup::Fresh(e) | Lookup::Stale(e) => e.results,
                        Lookup::Miss => Vec::new(),
                    };
                    let merged = merge_preferring_new(fresh.results, prior);
                    plugin_cache.write(&plugin_name, &keyword, merged.clone(), true).await;
                    // Main Cache write is the rebuild hook's job (see
                    // `execute_with_background_continuation`'s doc comment):
                    // it's the only caller with the cross-source view needed
                    // to serialize a real `SearchResponse`.
                    if let Some(hook) = rebuild_hook {
                        hook(plugin_name.clone(), keyword.clone(), task_fingerprint.clone()).await;
                    }
                }
                Ok(Err(e)) => {
                    warn!(plugin = %plugin_name, error = %e, "background refresh failed");
                }
                Err(_elapsed) => {
                    warn!(plugin = %plugin_name, "background refresh timed out");
                }
            }
        });
    }
}

/// `new ⊕ old`: new results first in their original order, old
/// results with an unseen `unique_id` appended (spec §4.E merge rule).
fn merge_preferring_new(new: Vec<SearchResult>, old: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = new.iter().map(|r| r.unique_id.clone()).collect();
    let mut out = new;
    for r in old {
        if seen.insert(r.unique_id.clone()) {
            out.push(r);
        }
    }
    out
}
