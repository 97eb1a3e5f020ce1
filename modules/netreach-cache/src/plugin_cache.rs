//! Plugin Response Cache (spec §4.D) — per-(plugin, keyword) cache of
//! raw plugin results, with access bookkeeping and score-based eviction.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use netreach_common::types::SearchResult;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPluginEntry {
    pub results: Vec<SearchResult>,
    pub timestamp: DateTime<Utc>,
    pub complete: bool,
    pub last_access: DateTime<Utc>,
    pub access_count: u64,
}

impl CachedPluginEntry {
    fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    fn idle(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_access).to_std().unwrap_or(Duration::ZERO)
    }

    /// Eviction score: `access_count / (idle_time² · age)`. Entries
    /// accessed often and recently score high (kept); idle, old, rarely
    /// hit entries score low (evicted first).
    fn score(&self, now: DateTime<Utc>, ttl: Duration) -> f64 {
        let idle_secs = self.idle(now).as_secs_f64().max(1.0);
        let age_secs = self.age(now).as_secs_f64().max(1.0);
        let _ = ttl;
        self.access_count as f64 / (idle_secs * idle_secs * age_secs)
    }
}

pub enum Lookup {
    /// Fresh hit; no background refresh needed.
    Fresh(CachedPluginEntry),
    /// Stale (or incomplete) hit with data; caller should also trigger
    /// a background refresh.
    Stale(CachedPluginEntry),
    Miss,
}

struct Entries {
    map: HashMap<String, CachedPluginEntry>,
    last_opportunistic_cleanup: Option<DateTime<Utc>>,
}

pub struct PluginCache {
    entries: RwLock<Entries>,
    ttl: Duration,
    max_size_bytes: u64,
}

fn key(plugin: &str, keyword: &str) -> String {
    format!("{plugin}:{}", keyword.trim().to_lowercase())
}

/// Rough per-entry size estimate used for the `max_size` eviction
/// trigger — counts bytes of the title/url/password strings rather than
/// paying for a full serialization on every pass.
fn estimate_size(entry: &CachedPluginEntry) -> u64 {
    entry
        .results
        .iter()
        .map(|r| {
            (r.title.len() + r.links.iter().map(|l| l.url.len() + l.password.len()).sum::<usize>()) as u64
        })
        .sum()
}

impl PluginCache {
    pub fn new(ttl: Duration, max_size_bytes: u64) -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                last_opportunistic_cleanup: None,
            }),
            ttl,
            max_size_bytes,
        }
    }

    /// `lookup` per spec §4.D: returns Fresh/Stale/Miss, and tells the
    /// caller whether a background refresh should be scheduled (true
    /// for Stale, and for Fresh entries past 80% of their TTL).
    pub async fn lookup(&self, plugin: &str, keyword: &str) -> (Lookup, bool) {
        let k = key(plugin, keyword);
        let now = Utc::now();
        let mut guard = self.entries.write().await;

        let should_cleanup = guard
            .last_opportunistic_cleanup
            .map(|t| now - t > chrono::Duration::minutes(30))
            .unwrap_or(true);

        let outcome = match guard.map.get_mut(&k) {
            Some(entry) if entry.age(now) < self.ttl && entry.complete => {
                entry.last_access = now;
                entry.access_count += 1;
                let stale_refresh = entry.age(now).as_secs_f64() > 0.8 * self.ttl.as_secs_f64();
                (Lookup::Fresh(entry.clone()), stale_refresh)
            }
            Some(entry) if (entry.age(now) >= self.ttl || !entry.complete) && !entry.results.is_empty() => {
                entry.last_access = now;
                entry.access_count += 1;
                (Lookup::Stale(entry.clone()), true)
            }
            _ => (Lookup::Miss, false),
        };

        if should_cleanup {
            guard.last_opportunistic_cleanup = Some(now);
            self.evict_locked(&mut guard, now);
        }

        outcome
    }

    /// Write semantics (spec §4.D): overwriting preserves
    /// `last_access`/`access_count` from the prior entry, and a merge
    /// dedups by `unique_id` preferring the new entries.
    pub async fn write(&self, plugin: &str, keyword: &str, results: Vec<SearchResult>, complete: bool) {
        let k = key(plugin, keyword);
        let now = Utc::now();
        let mut guard = self.entries.write().await;

        let (last_access, access_count) = guard
            .map
            .get(&k)
            .map(|e| (e.last_access, e.access_count))
            .unwrap_or((now, 0));

        let merged = match guard.map.remove(&k) {
            Some(prior) => merge_by_unique_id(prior.results, results),
            None => results,
        };

        guard.map.insert(
            k,
            CachedPluginEntry {
                results: merged,
                timestamp: now,
                complete,
                last_access,
                access_count,
            },
        );
    }

    /// Hourly scheduled eviction pass (spec §4.D).
    pub async fn evict(&self) {
        let now = Utc::now();
        let mut guard = self.entries.write().await;
        self.evict_locked(&mut guard, now);
    }

    fn evict_locked(&self, guard: &mut Entries, now: DateTime<Utc>) {
        let before = guard.map.len();
        guard.map.retain(|_, e| e.age(now) <= self.ttl);

        let total_size: u64 = guard.map.values().map(estimate_size).sum();
        if total_size > self.max_size_bytes {
            let mut scored: Vec<(String, f64)> = guard
                .map
                .iter()
                .map(|(k, e)| (k.clone(), e.score(now, self.ttl)))
                .collect();
            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            let max_evictions = (guard.map.len() as f64 * 0.2).ceil() as usize;
            let mut running_size = total_size;
            let mut evicted = 0;
            for (k, _) in scored {
                if running_size <= self.max_size_bytes || evicted >= max_evictions {
                    break;
                }
                if let Some(e) = guard.map.remove(&k) {
                    running_size = running_size.saturating_sub(estimate_size(&e));
                    evicted += 1;
                }
            }
        }

        let evicted_total = before.saturating_sub(guard.map.len());
        if evicted_total > 0 {
            debug!(evicted = evicted_total, remaining = guard.map.len(), "plugin cache eviction pass");
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }
}

fn merge_by_unique_id(old: Vec<SearchResult>, new: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(old.len() + new.len());
    for r in new.into_iter().chain(old) {
        if let Some(&idx) = seen.get(&r.unique_id) {
            let _: usize = idx; // first occurrence (from `new`) wins; drop this duplicate
        } else {
            seen.insert(r.unique_id.clone(), out.len());
            out.push(r);
        }
    }
    out
}
