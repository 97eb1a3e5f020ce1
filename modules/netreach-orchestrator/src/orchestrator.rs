//! Search Orchestrator (spec §4.H) — fan-out to channels + plugins,
//! budget-bounded gather, post-filter, merge-by-type, cache write-through.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use netreach_async::{AsyncPluginRuntime, RebuildHook};
use netreach_cache::{cache_key, Lookup, MainCache, PluginCache};
use netreach_channel::ChannelScraper;
use netreach_common::types::{LinkType, MergedLink, ResultType, SearchRequest, SearchResponse, SearchResult, SourceType};
use netreach_common::Config;
use netreach_plugins::PluginRegistry;
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, warn};

use crate::merge::{apply_keyword_filter, build_merged_by_type, dedup_sourced_by_unique_id, filter_by_cloud_types, total_merged_links, SourcedResult};

/// The subset of a normalized request needed to rebuild a cross-source
/// response later, recorded at fan-out time and consulted only by the
/// background-completion rebuild hook (spec §4.E/§4.H interplay:
/// "their plugins' own runtimes will update the main cache when done").
#[derive(Debug, Clone)]
struct NormalizedRequest {
    keyword: String,
    channels: Vec<String>,
    plugin_names: Vec<String>,
}

pub struct Orchestrator {
    config: Config,
    main_cache: Arc<MainCache>,
    plugin_cache: Arc<PluginCache>,
    registry: Arc<PluginRegistry>,
    async_runtime: Arc<AsyncPluginRuntime>,
    channel_scraper: Arc<ChannelScraper>,
    request_registry: RwLock<HashMap<String, NormalizedRequest>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        registry: Arc<PluginRegistry>,
        channel_scraper: Arc<ChannelScraper>,
        main_cache: Arc<MainCache>,
        plugin_cache: Arc<PluginCache>,
    ) -> Arc<Self> {
        let worker_pool = netreach_async::WorkerPool::new(config.async_max_background_workers, config.async_max_background_tasks);

        Arc::new_cyclic(|weak: &Weak<Orchestrator>| {
            let hook = rebuild_hook(weak.clone());
            let async_runtime = Arc::new(
                AsyncPluginRuntime::new(
                    plugin_cache.clone(),
                    main_cache.clone(),
                    worker_pool,
                    config.async_response_timeout,
                    config.plugin_timeout,
                    config.cache_ttl,
                )
                .with_rebuild_hook(hook),
            );

            Orchestrator {
                config,
                main_cache,
                plugin_cache,
                registry,
                async_runtime,
                channel_scraper,
                request_registry: RwLock::new(HashMap::new()),
            }
        })
    }

    /// `Search(...)` (spec §4.H).
    pub async fn search(&self, request: SearchRequest) -> SearchResponse {
        let (keyword, channels, plugin_names, source_type, result_type) = self.normalize(&request);
        let fingerprint = cache_key(&keyword, &channels, source_type.as_str(), &plugin_names);

        if !request.force_refresh {
            if let Some(entry) = self.main_cache.get(&fingerprint).await {
                if let Ok(canonical) = serde_json::from_slice::<SearchResponse>(&entry.serialized_response) {
                    info!(keyword = %keyword, fingerprint = %fingerprint, "main cache hit");
                    return shape_response(&canonical, result_type, &request.cloud_types);
                }
            }
        }

        self.request_registry.write().await.insert(
            fingerprint.clone(),
            NormalizedRequest {
                keyword: keyword.clone(),
                channels: channels.clone(),
                plugin_names: plugin_names.clone(),
            },
        );

        let concurrency = self.config.effective_concurrency(channels.len(), plugin_names.len(), request.concurrency);
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let budget = self.config.async_response_timeout;

        let channel_handles: Vec<_> = channels
            .iter()
            .cloned()
            .map(|channel| {
                let sem = semaphore.clone();
                let scraper = self.channel_scraper.clone();
                tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let results = scraper.scrape(&channel).await;
                    let label = MergedLink::source_for_channel(&channel);
                    results
                        .into_iter()
                        .map(|result| SourcedResult { result, source_label: label.clone(), skip_filter: false })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let plugin_handles: Vec<_> = plugin_names
            .iter()
            .filter_map(|name| self.registry.get(name).map(|p| (name.clone(), p)))
            .map(|(name, plugin)| {
                let sem = semaphore.clone();
                let rt = self.async_runtime.clone();
                let keyword = keyword.clone();
                let ext = request.ext.clone();
                let fingerprint = fingerprint.clone();
                let skip_filter = plugin.skip_service_filter();
                tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let outcome = rt.search(plugin, &keyword, ext, &fingerprint).await;
                    let sourced = outcome
                        .results
                        .into_iter()
                        .map(|result| SourcedResult {
                            result,
                            source_label: MergedLink::source_for_plugin(&name),
                            skip_filter,
                        })
                        .collect::<Vec<_>>();
                    (sourced, outcome.is_final)
                })
            })
            .collect();

        let channel_outcomes = futures::future::join_all(channel_handles.into_iter().map(|h| async move {
            match tokio::time::timeout(budget, h).await {
                Ok(Ok(v)) => Some(v),
                Ok(Err(e)) => {
                    warn!(error = %e, "channel task panicked");
                    None
                }
                Err(_elapsed) => None,
            }
        }))
        .await;

        let plugin_outcomes = futures::future::join_all(plugin_handles.into_iter().map(|h| async move {
            match tokio::time::timeout(budget, h).await {
                Ok(Ok(v)) => Some(v),
                Ok(Err(e)) => {
                    warn!(error = %e, "plugin task panicked");
                    None
                }
                Err(_elapsed) => None,
            }
        }))
        .await;

        let all_final = channel_outcomes.iter().all(Option::is_some) && plugin_outcomes.iter().all(|o| matches!(o, Some((_, true))));

        let mut sourced: Vec<SourcedResult> = Vec::new();
        for r in channel_outcomes.into_iter().flatten() {
            sourced.extend(r);
        }
        for (r, _) in plugin_outcomes.into_iter().flatten() {
            sourced.extend(r);
        }

        let sourced = dedup_sourced_by_unique_id(sourced);
        let filtered = apply_keyword_filter(&keyword, sourced);

        let canonical = build_canonical(&filtered);

        let serialized = serde_json::to_vec(&canonical).unwrap_or_default();
        self.main_cache
            .write_orchestrator(&fingerprint, &keyword, serialized, all_final, self.config.cache_ttl)
            .await;

        if canonical.total == 0 && !request.force_refresh {
            if let Some(stale) = self.main_cache.get_stale(&fingerprint).await {
                if let Ok(stale_canonical) = serde_json::from_slice::<SearchResponse>(&stale.serialized_response) {
                    if stale_canonical.total > 0 {
                        return shape_response(&stale_canonical, result_type, &request.cloud_types);
                    }
                }
            }
        }

        shape_response(&canonical, result_type, &request.cloud_types)
    }

    /// Parameter normalization (spec §4.H step 1).
    fn normalize(&self, request: &SearchRequest) -> (String, Vec<String>, Vec<String>, SourceType, ResultType) {
        let keyword = request.keyword.trim().to_lowercase();
        let result_type = request.result_type;

        let (channels, plugins, source_type) = match request.source_type {
            SourceType::Tg => (request.channels.clone(), Vec::new(), SourceType::Tg),
            SourceType::Plugin => (Vec::new(), request.plugins.clone(), SourceType::Plugin),
            SourceType::All => (request.channels.clone(), request.plugins.clone(), SourceType::All),
        };

        let channels = if channels.is_empty() && !matches!(source_type, SourceType::Plugin) {
            self.config.channels.clone()
        } else {
            channels
        };

        let plugin_names = self.effective_plugin_names(&plugins, source_type);

        (keyword, channels, plugin_names, source_type, result_type)
    }

    fn effective_plugin_names(&self, requested: &[String], source_type: SourceType) -> Vec<String> {
        if matches!(source_type, SourceType::Tg) {
            return Vec::new();
        }
        let non_empty: Vec<String> = requested.iter().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect();
        if non_empty.is_empty() {
            self.registry.names()
        } else {
            non_empty
        }
    }

    /// Cross-source rebuild triggered by a plugin's background
    /// continuation (spec §4.E): re-scrapes the request's channels live
    /// and pulls the current plugin-cache state for every plugin that
    /// was part of the original request, then rewrites the full
    /// canonical response under the same fingerprint.
    async fn rebuild_after_background_completion(&self, fingerprint: &str, keyword: &str) {
        let Some(req) = self.request_registry.read().await.get(fingerprint).cloned() else {
            return;
        };

        let channel_futs = req.channels.iter().map(|c| {
            let scraper = self.channel_scraper.clone();
            let c = c.clone();
            async move {
                let label = MergedLink::source_for_channel(&c);
                scraper
                    .scrape(&c)
                    .await
                    .into_iter()
                    .map(|result| SourcedResult { result, source_label: label.clone(), skip_filter: false })
                    .collect::<Vec<_>>()
            }
        });
        let channel_results = futures::future::join_all(channel_futs).await;

        let mut sourced: Vec<SourcedResult> = Vec::new();
        for r in channel_results {
            sourced.extend(r);
        }

        for name in &req.plugin_names {
            let skip_filter = self.registry.get(name).map(|p| p.skip_service_filter()).unwrap_or(false);
            let (lookup, _) = self.plugin_cache.lookup(name, keyword).await;
            let results = match lookup {
                Lookup::Fresh(e) | Lookup::Stale(e) => e.results,
                Lookup::Miss => Vec::new(),
            };
            let label = MergedLink::source_for_plugin(name);
            sourced.extend(
                results
                    .into_iter()
                    .map(|result| SourcedResult { result, source_label: label.clone(), skip_filter }),
            );
        }

        let sourced = dedup_sourced_by_unique_id(sourced);
        let filtered = apply_keyword_filter(keyword, sourced);
        let canonical = build_canonical(&filtered);
        let serialized = serde_json::to_vec(&canonical).unwrap_or_default();

        self.main_cache
            .write_plugin("background-rebuild", fingerprint, keyword, serialized, canonical.total, true, self.config.cache_ttl)
            .await;
    }
}

fn rebuild_hook(weak: Weak<Orchestrator>) -> RebuildHook {
    Arc::new(move |_plugin_name: String, keyword: String, fingerprint: String| {
        let weak = weak.clone();
        Box::pin(async move {
            if let Some(orch) = weak.upgrade() {
                orch.rebuild_after_background_completion(&fingerprint, &keyword).await;
            }
        })
    })
}

/// Canonical cached shape: every surviving result plus every merged
/// bucket, unfiltered by `cloud_types` (cloud-type filtering is applied
/// at read/shape time so the same cache entry can serve any
/// `cloud_types` request, since the cache fingerprint doesn't include it
/// — spec §4.B's fingerprint inputs omit `cloud_types` entirely).
fn build_canonical(filtered: &[SourcedResult]) -> SearchResponse {
    let merged_by_type = build_merged_by_type(filtered);
    let total = total_merged_links(&merged_by_type);
    let results: Vec<SearchResult> = filtered.iter().map(|s| s.result.clone()).collect();
    SearchResponse {
        total,
        results: Some(results),
        merged_by_type: Some(merged_by_type),
    }
}

/// Shape the canonical (always-full) cached response per the request's
/// `result_type` and `cloud_types` (spec §4.H steps 5 & 7).
fn shape_response(canonical: &SearchResponse, result_type: ResultType, cloud_types: &[LinkType]) -> SearchResponse {
    let empty_results = Vec::new();
    let empty_merged = HashMap::new();
    let results = canonical.results.as_ref().unwrap_or(&empty_results);
    let merged = canonical.merged_by_type.as_ref().unwrap_or(&empty_merged);

    let (filtered_results, filtered_merged) = filter_by_cloud_types(results, merged, cloud_types);

    match result_type {
        ResultType::Results => SearchResponse {
            total: filtered_results.len(),
            results: Some(filtered_results),
            merged_by_type: None,
        },
        ResultType::MergedByType => SearchResponse {
            total: total_merged_links(&filtered_merged),
            results: None,
            merged_by_type: Some(filtered_merged),
        },
        ResultType::All => SearchResponse {
            total: total_merged_links(&filtered_merged),
            results: Some(filtered_results),
            merged_by_type: Some(filtered_merged),
        },
    }
}
