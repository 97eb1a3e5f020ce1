//! Main Cache (spec §4.C) — keyword-keyed store of merged search
//! responses, with partial/final marking, TTL, and disk persistence.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::snapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainCacheEntry {
    pub serialized_response: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub ttl_secs: u64,
    pub is_final: bool,
    pub keyword: String,
}

impl MainCacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.timestamp).num_seconds() < self.ttl_secs as i64
    }
}

fn data_hash(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Process-wide shared main cache. Concurrent map behind a `RwLock`
/// (teacher precedent: `AppState.rate_limiter: Mutex<HashMap<...>>`),
/// plus an independent dedup tracker and a single dump-in-flight guard.
pub struct MainCache {
    entries: RwLock<HashMap<String, MainCacheEntry>>,
    /// Per-plugin-instance dedup tracker for rule 4 (spec §4.C):
    /// the same `(plugin, fingerprint, data_hash, is_final)` update is
    /// applied at most once.
    applied_updates: RwLock<HashSet<String>>,
    dump_lock: Mutex<()>,
}

impl Default for MainCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MainCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            applied_updates: RwLock::new(HashSet::new()),
            dump_lock: Mutex::new(()),
        }
    }

    /// Load a snapshot from disk, keeping only entries that are still
    /// fresh, per spec §4.C "On startup, load snapshot entries whose
    /// `now - timestamp <= ttl`". A load failure starts with an empty
    /// cache rather than failing startup.
    pub fn load_from(path: &Path) -> Self {
        match snapshot::load_snapshot::<HashMap<String, MainCacheEntry>>(path) {
            Ok(map) => {
                let now = Utc::now();
                let filtered: HashMap<String, MainCacheEntry> =
                    map.into_iter().filter(|(_, e)| e.is_fresh(now)).collect();
                info!(entries = filtered.len(), path = %path.display(), "loaded main cache snapshot");
                Self {
                    entries: RwLock::new(filtered),
                    applied_updates: RwLock::new(HashSet::new()),
                    dump_lock: Mutex::new(()),
                }
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "no usable main cache snapshot, starting empty");
                Self::new()
            }
        }
    }

    /// Read, honoring TTL: a stale-but-present entry is a miss here.
    pub async fn get(&self, fingerprint: &str) -> Option<MainCacheEntry> {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .get(fingerprint)
            .filter(|e| e.is_fresh(now))
            .cloned()
    }

    /// Explicit "serve stale" read used by the orchestrator while a
    /// plugin's background continuation is still running (spec §4.C
    /// Read: "Stale-but-present entries ... are returned on explicit
    /// 'serve stale' reads").
    pub async fn get_stale(&self, fingerprint: &str) -> Option<MainCacheEntry> {
        self.entries.read().await.get(fingerprint).cloned()
    }

    /// Write rule 1: an orchestrator write with `is_final=true`
    /// overwrites any entry unconditionally.
    pub async fn write_orchestrator_final(&self, fingerprint: &str, keyword: &str, serialized: Vec<u8>, ttl: Duration) {
        let entry = MainCacheEntry {
            serialized_response: serialized,
            timestamp: Utc::now(),
            ttl_secs: ttl.as_secs(),
            is_final: true,
            keyword: keyword.to_string(),
        };
        self.entries.write().await.insert(fingerprint.to_string(), entry);
    }

    /// Orchestrator write that may itself be partial (some sources
    /// timed out before `response_timeout`, spec §5 scenario 2): an
    /// `is_final=true` write overwrites unconditionally (rule 1); a
    /// partial write only lands when there is no entry yet, or the
    /// existing entry is itself still partial — a final entry is never
    /// downgraded back to partial.
    pub async fn write_orchestrator(&self, fingerprint: &str, keyword: &str, serialized: Vec<u8>, is_final: bool, ttl: Duration) {
        if is_final {
            self.write_orchestrator_final(fingerprint, keyword, serialized, ttl).await;
            return;
        }
        let mut map = self.entries.write().await;
        let already_final = map.get(fingerprint).map(|e| e.is_final).unwrap_or(false);
        if already_final {
            return;
        }
        map.insert(
            fingerprint.to_string(),
            MainCacheEntry {
                serialized_response: serialized,
                timestamp: Utc::now(),
                ttl_secs: ttl.as_secs(),
                is_final: false,
                keyword: keyword.to_string(),
            },
        );
    }

    /// Write rules 2-4: a plugin background-completion write. Returns
    /// whether the write was applied (for tests/observability).
    #[allow(clippy::too_many_arguments)]
    pub async fn write_plugin(
        &self,
        plugin_name: &str,
        fingerprint: &str,
        keyword: &str,
        serialized: Vec<u8>,
        result_count: usize,
        is_final: bool,
        ttl: Duration,
    ) -> bool {
        let hash = data_hash(&serialized);
        let dedup_key = format!("{plugin_name}:{fingerprint}:{hash}:{is_final}");
        {
            let mut applied = self.applied_updates.write().await;
            if !applied.insert(dedup_key) {
                return false; // rule 4: already applied once
            }
        }

        let mut map = self.entries.write().await;
        let incoming_len = serialized.len();
        let new_entry = MainCacheEntry {
            serialized_response: serialized,
            timestamp: Utc::now(),
            ttl_secs: ttl.as_secs(),
            is_final,
            keyword: keyword.to_string(),
        };

        match map.get(fingerprint) {
            Some(existing) => {
                if is_final {
                    // rule 2
                    if incoming_len >= existing.serialized_response.len() || !existing.is_final {
                        map.insert(fingerprint.to_string(), new_entry);
                        true
                    } else {
                        false
                    }
                } else if result_count == 0 {
                    false // rule 3
                } else if existing.is_final {
                    false // monotonicity: never degrade a final entry to partial
                } else {
                    map.insert(fingerprint.to_string(), new_entry);
                    true
                }
            }
            None => {
                map.insert(fingerprint.to_string(), new_entry);
                true
            }
        }
    }

    /// Dump to `path` if no dump is currently in flight. Readers and
    /// other writers proceed unimpeded: only a read lock is taken on
    /// the map itself, the exclusive guard is just for the dump
    /// operation (spec §4.C persistence).
    pub async fn dump(&self, path: &Path) -> anyhow::Result<()> {
        let Ok(_guard) = self.dump_lock.try_lock() else {
            return Ok(()); // a dump is already in flight; skip this tick
        };
        let snapshot = self.entries.read().await.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || snapshot::save_snapshot(&path, &snapshot)).await??;
        Ok(())
    }

    /// Spawn the periodic (~2 min) persistence loop (spec §4.C).
    pub fn spawn_persistence(self: std::sync::Arc<Self>, path: PathBuf, interval: Duration) {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                if let Err(e) = self.dump(&path).await {
                    warn!(error = %e, "main cache snapshot write failed, will retry next cycle");
                }
            }
        });
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn orchestrator_final_write_always_overwrites() {
        let cache = MainCache::new();
        cache
            .write_orchestrator_final("fp", "kw", vec![1, 2, 3], Duration::from_secs(60))
            .await;
        cache
            .write_orchestrator_final("fp", "kw", vec![9], Duration::from_secs(60))
            .await;
        let e = cache.get("fp").await.unwrap();
        assert_eq!(e.serialized_response, vec![9]);
    }

    #[tokio::test]
    async fn plugin_final_write_requires_larger_or_upgrade_from_partial() {
        let cache = MainCache::new();
        cache
            .write_plugin("p1", "fp", "kw", vec![1, 2, 3, 4], 1, true, Duration::from_secs(60))
            .await;
        // smaller final write over an existing final entry: rejected
        let applied = cache
            .write_plugin("p1", "fp", "kw", vec![1], 1, true, Duration::from_secs(60))
            .await;
        assert!(!applied);
        assert_eq!(cache.get("fp").await.unwrap().serialized_response.len(), 4);
    }

    #[tokio::test]
    async fn partial_write_never_degrades_a_final_entry() {
        let cache = MainCache::new();
        cache
            .write_plugin("p1", "fp", "kw", vec![1, 2, 3], 1, true, Duration::from_secs(60))
            .await;
        let applied = cache
            .write_plugin("p2", "fp", "kw", vec![9], 1, false, Duration::from_secs(60))
            .await;
        assert!(!applied);
        let e = cache.get("fp").await.unwrap();
        assert!(e.is_final);
        assert_eq!(e.serialized_response, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_partial_write_is_noop_when_entry_exists() {
        let cache = MainCache::new();
        cache
            .write_plugin("p1", "fp", "kw", vec![1], 1, false, Duration::from_secs(60))
            .await;
        let applied = cache
            .write_plugin("p1", "fp", "kw", vec![], 0, false, Duration::from_secs(60))
            .await;
        assert!(!applied);
    }

    #[tokio::test]
    async fn duplicate_update_is_applied_at_most_once() {
        let cache = MainCache::new();
        let applied1 = cache
            .write_plugin("p1", "fp", "kw", vec![1, 2], 1, true, Duration::from_secs(60))
            .await;
        let applied2 = cache
            .write_plugin("p1", "fp", "kw", vec![1, 2], 1, true, Duration::from_secs(60))
            .await;
        assert!(applied1);
        assert!(!applied2);
    }

    #[tokio::test]
    async fn orchestrator_partial_write_lands_on_a_miss() {
        let cache = MainCache::new();
        cache.write_orchestrator("fp", "kw", vec![1, 2], false, Duration::from_secs(60)).await;
        let e = cache.get("fp").await.unwrap();
        assert!(!e.is_final);
        assert_eq!(e.serialized_response, vec![1, 2]);
    }

    #[tokio::test]
    async fn orchestrator_partial_write_never_downgrades_a_final_entry() {
        let cache = MainCache::new();
        cache.write_orchestrator("fp", "kw", vec![1, 2, 3], true, Duration::from_secs(60)).await;
        cache.write_orchestrator("fp", "kw", vec![9], false, Duration::from_secs(60)).await;
        let e = cache.get("fp").await.unwrap();
        assert!(e.is_final);
        assert_eq!(e.serialized_response, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn orchestrator_final_write_overwrites_a_prior_partial_entry() {
        let cache = MainCache::new();
        cache.write_orchestrator("fp", "kw", vec![1], false, Duration::from_secs(60)).await;
        cache.write_orchestrator("fp", "kw", vec![1, 2], true, Duration::from_secs(60)).await;
        let e = cache.get("fp").await.unwrap();
        assert!(e.is_final);
        assert_eq!(e.serialized_response, vec![1, 2]);
    }

    #[tokio::test]
    async fn snapshot_round_trips_and_filters_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.bin.gz");
        let cache = MainCache::new();
        cache
            .write_orchestrator_final("fresh", "kw", vec![1], Duration::from_secs(3600))
            .await;
        cache
            .write_orchestrator_final("stale", "kw", vec![2], Duration::from_secs(0))
            .await;
        cache.dump(&path).await.unwrap();

        let loaded = MainCache::load_from(&path);
        assert_eq!(loaded.len().await, 1);
        assert!(loaded.get("fresh").await.is_some());
    }
}
