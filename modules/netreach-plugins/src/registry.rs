use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::plugin::Plugin;

/// Process-wide plugin registry (spec §4.F). Registration happens
/// single-threaded at startup, so a plain `std::sync::Mutex` (never
/// held across an `.await`) is enough — lookups during a search just
/// clone the `Arc`.
pub struct PluginRegistry {
    plugins: Mutex<HashMap<String, Arc<dyn Plugin>>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Mutex::new(HashMap::new()),
        }
    }

    /// Duplicate names overwrite the prior entry (last writer wins).
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();
        self.plugins.lock().expect("plugin registry poisoned").insert(name, plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.lock().expect("plugin registry poisoned").get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins.lock().expect("plugin registry poisoned").values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.lock().expect("plugin registry poisoned").keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.lock().expect("plugin registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginSearchOutcome;
    use async_trait::async_trait;
    use netreach_common::types::SearchResult;

    struct Stub(&'static str);

    #[async_trait]
    impl Plugin for Stub {
        fn name(&self) -> &str {
            self.0
        }

        async fn search(&self, _keyword: &str, _ext: &serde_json::Value) -> anyhow::Result<Vec<SearchResult>> {
            Ok(Vec::new())
        }

        async fn search_with_result(&self, _keyword: &str, _ext: &serde_json::Value) -> anyhow::Result<PluginSearchOutcome> {
            Ok(PluginSearchOutcome {
                results: Vec::new(),
                is_final: true,
                timestamp: chrono::Utc::now(),
            })
        }
    }

    #[test]
    fn duplicate_name_overwrites_prior_entry() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(Stub("alpha")));
        registry.register(Arc::new(Stub("alpha")));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("alpha").is_some());
    }

    #[test]
    fn distinct_names_coexist() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(Stub("alpha")));
        registry.register(Arc::new(Stub("beta")));
        assert_eq!(registry.len(), 2);
    }
}
