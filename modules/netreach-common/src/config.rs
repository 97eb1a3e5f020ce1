use std::env;
use std::time::Duration;

/// Process configuration, loaded once from environment variables at
/// startup (§6 of the spec). Every field has a sane default; nothing here
/// is a hard-required var, since the engine must be able to boot with
/// zero configuration and just use conservative defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub channels: Vec<String>,
    pub concurrency: usize,
    pub port: u16,
    pub proxy: Option<String>,

    pub cache_enabled: bool,
    pub cache_path: String,
    pub cache_max_size: usize,
    pub cache_ttl: Duration,
    pub enable_compression: bool,
    pub min_size_to_compress: usize,

    /// Accepted for parity with the original env surface; Rust has no
    /// tunable GC to apply this to, so it is carried but inert.
    pub gc_percent: i32,
    /// Same as `gc_percent`: accepted, logged, not actionable in Rust.
    pub optimize_memory: bool,

    pub plugin_timeout: Duration,
    pub async_plugin_enabled: bool,
    pub async_response_timeout: Duration,
    pub async_max_background_workers: usize,
    pub async_max_background_tasks: usize,
    pub async_cache_ttl: Duration,

    pub http_read_timeout: Duration,
    pub http_write_timeout: Duration,
    pub http_idle_timeout: Duration,
    pub http_max_conns: usize,

    pub plugin_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        let async_response_timeout = Duration::from_secs(4);
        Self {
            channels: Vec::new(),
            concurrency: 0,
            port: 8888,
            proxy: None,
            cache_enabled: true,
            cache_path: "./cache".to_string(),
            cache_max_size: 100 * 1024 * 1024,
            cache_ttl: Duration::from_secs(3600),
            enable_compression: true,
            min_size_to_compress: 1024,
            gc_percent: 100,
            optimize_memory: false,
            plugin_timeout: Duration::from_secs(30),
            async_plugin_enabled: true,
            async_response_timeout,
            async_max_background_workers: 20,
            async_max_background_tasks: 100,
            async_cache_ttl: Duration::from_secs(6 * 3600),
            http_read_timeout: Self::floor_read_timeout(async_response_timeout),
            http_write_timeout: Duration::from_secs(60),
            http_idle_timeout: Duration::from_secs(120),
            http_max_conns: 1000,
            plugin_count: 0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let channels = env::var("CHANNELS")
            .ok()
            .map(|v| split_csv(&v))
            .unwrap_or(defaults.channels);

        let async_response_timeout = env_duration_secs("ASYNC_RESPONSE_TIMEOUT")
            .unwrap_or(defaults.async_response_timeout);

        Self {
            channels,
            concurrency: env_parse("CONCURRENCY").unwrap_or(defaults.concurrency),
            port: env_parse("PORT").unwrap_or(defaults.port),
            proxy: env::var("PROXY").ok().filter(|s| !s.is_empty()),

            cache_enabled: env_bool("CACHE_ENABLED").unwrap_or(defaults.cache_enabled),
            cache_path: env::var("CACHE_PATH").unwrap_or(defaults.cache_path),
            cache_max_size: env_parse("CACHE_MAX_SIZE").unwrap_or(defaults.cache_max_size),
            cache_ttl: env_duration_secs("CACHE_TTL").unwrap_or(defaults.cache_ttl),
            enable_compression: env_bool("ENABLE_COMPRESSION")
                .unwrap_or(defaults.enable_compression),
            min_size_to_compress: env_parse("MIN_SIZE_TO_COMPRESS")
                .unwrap_or(defaults.min_size_to_compress),

            gc_percent: env_parse("GC_PERCENT").unwrap_or(defaults.gc_percent),
            optimize_memory: env_bool("OPTIMIZE_MEMORY").unwrap_or(defaults.optimize_memory),

            plugin_timeout: env_duration_secs("PLUGIN_TIMEOUT").unwrap_or(defaults.plugin_timeout),
            async_plugin_enabled: env_bool("ASYNC_PLUGIN_ENABLED")
                .unwrap_or(defaults.async_plugin_enabled),
            async_response_timeout,
            async_max_background_workers: env_parse("ASYNC_MAX_BACKGROUND_WORKERS")
                .unwrap_or(defaults.async_max_background_workers),
            async_max_background_tasks: env_parse("ASYNC_MAX_BACKGROUND_TASKS")
                .unwrap_or(defaults.async_max_background_tasks),
            async_cache_ttl: env::var("ASYNC_CACHE_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.async_cache_ttl),

            http_read_timeout: env_duration_secs("HTTP_READ_TIMEOUT")
                .unwrap_or_else(|| Self::floor_read_timeout(async_response_timeout)),
            http_write_timeout: env_duration_secs("HTTP_WRITE_TIMEOUT")
                .unwrap_or(defaults.http_write_timeout),
            http_idle_timeout: env_duration_secs("HTTP_IDLE_TIMEOUT")
                .unwrap_or(defaults.http_idle_timeout),
            http_max_conns: env_parse("HTTP_MAX_CONNS").unwrap_or(defaults.http_max_conns),

            plugin_count: env_parse("PLUGIN_COUNT").unwrap_or(defaults.plugin_count),
        }
    }

    /// `HTTPReadTimeout` must never be shorter than `3 * AsyncResponseTimeout`,
    /// clamped to a 30s floor — see the Open Questions resolution in
    /// SPEC_FULL.md §9.
    fn floor_read_timeout(async_response_timeout: Duration) -> Duration {
        (async_response_timeout * 3).max(Duration::from_secs(30))
    }

    /// Effective fan-out ceiling for a search with `n_channels + n_plugins`
    /// sources, honoring an explicit override.
    pub fn effective_concurrency(&self, n_channels: usize, n_plugins: usize, override_: Option<usize>) -> usize {
        override_
            .filter(|v| *v > 0)
            .unwrap_or_else(|| (n_channels + n_plugins + 10).max(1))
    }

    /// Log presence/length of values without leaking secrets (proxy creds
    /// may be embedded in `PROXY`).
    pub fn log_redacted(&self) {
        tracing::info!(
            channels = self.channels.len(),
            port = self.port,
            proxy_set = self.proxy.is_some(),
            cache_enabled = self.cache_enabled,
            cache_path = %self.cache_path,
            async_plugin_enabled = self.async_plugin_enabled,
            async_response_timeout_ms = self.async_response_timeout.as_millis() as u64,
            plugin_timeout_ms = self.plugin_timeout.as_millis() as u64,
            "configuration loaded"
        );
    }
}

fn split_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

fn env_duration_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_read_timeout_is_a_floor_not_a_multiple() {
        let cfg = Config::default();
        assert!(cfg.http_read_timeout >= Duration::from_secs(30));
        assert!(cfg.http_read_timeout >= cfg.async_response_timeout * 3);
    }

    #[test]
    fn effective_concurrency_defaults_to_sources_plus_ten() {
        let cfg = Config::default();
        assert_eq!(cfg.effective_concurrency(3, 4, None), 17);
        assert_eq!(cfg.effective_concurrency(0, 0, None), 10);
        assert_eq!(cfg.effective_concurrency(3, 4, Some(2)), 2);
        assert_eq!(cfg.effective_concurrency(3, 4, Some(0)), 17);
    }
}
