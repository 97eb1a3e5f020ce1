use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use netreach_cache::{MainCache, PluginCache};
use netreach_channel::ChannelScraper;
use netreach_common::Config;
use netreach_orchestrator::Orchestrator;
use netreach_plugins::{HtmlScrapePlugin, JsonApiPlugin, PluginRegistry};
use tower_http::compression::predicate::SizeAbove;
use tower_http::compression::{CompressionLayer, DefaultPredicate, Predicate};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod handlers;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<PluginRegistry>,
    pub config: Config,
    /// Signing key for the vestigial session cookie (component N);
    /// unread by anything on the live router.
    pub auth_secret: String,
}

fn register_plugins(registry: &PluginRegistry) {
    registry.register(Arc::new(HtmlScrapePlugin::new(
        "html-demo",
        "https://example-netdisk-index.invalid/search",
    )));
    registry.register(Arc::new(JsonApiPlugin::new(
        "json-demo",
        "https://example-netdisk-api.invalid/v1/search",
        std::env::var("JSON_DEMO_API_KEY").ok(),
    )));
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("netreach=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let cache_path = PathBuf::from(&config.cache_path).join("main_cache.bin.gz");
    let main_cache = Arc::new(if config.cache_enabled {
        MainCache::load_from(&cache_path)
    } else {
        MainCache::new()
    });
    if config.cache_enabled {
        main_cache.clone().spawn_persistence(cache_path, Duration::from_secs(120));
    }

    let plugin_cache = Arc::new(PluginCache::new(config.async_cache_ttl, config.cache_max_size as u64));
    spawn_plugin_cache_eviction(plugin_cache.clone());

    let registry = Arc::new(PluginRegistry::new());
    register_plugins(&registry);

    let channel_scraper = Arc::new(ChannelScraper::new("https://t.me/s/"));

    let orchestrator = Orchestrator::new(config.clone(), registry.clone(), channel_scraper, main_cache, plugin_cache);

    let auth_secret = std::env::var("SESSION_SECRET").unwrap_or_else(|_| "dev-only-insecure-secret".to_string());

    let port = config.port;
    let enable_compression = config.enable_compression;
    let min_size_to_compress = config.min_size_to_compress.min(u16::MAX as usize) as u16;
    let state = Arc::new(AppState {
        orchestrator,
        registry,
        config,
        auth_secret,
    });

    let app = Router::new()
        .route("/api/search", get(handlers::search_get).post(handlers::search_post))
        .route("/api/health", get(handlers::health))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        );

    let app = if enable_compression {
        app.layer(CompressionLayer::new().compress_when(DefaultPredicate::new().and(SizeAbove::new(min_size_to_compress))))
    } else {
        app
    };

    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "netreach-api starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_plugin_cache_eviction(plugin_cache: Arc<PluginCache>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tick.tick().await;
            plugin_cache.evict().await;
        }
    });
}
