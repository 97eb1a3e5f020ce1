//! Two-tier cache (spec §4.C, §4.D): the Main Cache stores serialized,
//! merged responses keyed by request fingerprint; the Plugin Response
//! Cache stores raw per-plugin result lists keyed by `(plugin, keyword)`.

pub mod key;
pub mod main_cache;
pub mod plugin_cache;
pub mod snapshot;

pub use key::cache_key;
pub use main_cache::{MainCache, MainCacheEntry};
pub use plugin_cache::{CachedPluginEntry, Lookup, PluginCache};
