//! HTTP Entry handlers (spec §4.I / spec.md §6): `GET/POST /api/search`
//! and `GET /api/health`. Both search verbs funnel into the same
//! parameter-normalization and orchestrator call; only how the raw
//! parameters are gathered differs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use netreach_common::types::{LinkType, ResultType, SearchRequest, SourceType};
use netreach_common::EngineError;
use serde::Serialize;
use serde_json::Value;

use crate::AppState;

/// `{code, message, data}` — spec.md §6: `code=0` on success, HTTP status
/// mirrors success/error class.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    code: i32,
    message: String,
    data: T,
}

impl<T: Serialize> Envelope<T> {
    fn ok(data: T) -> Self {
        Envelope { code: 0, message: "ok".to_string(), data }
    }
}

fn error_response(status: StatusCode, err: &EngineError) -> axum::response::Response {
    // code=0 is reserved for success (spec.md §6); everything else is
    // non-zero, and an internal/catastrophic failure must carry
    // code=500 specifically so the envelope mirrors the HTTP status.
    let code = if status == StatusCode::INTERNAL_SERVER_ERROR { 500 } else { 1 };
    let body = Envelope {
        code,
        message: err.to_string(),
        data: serde_json::Value::Null,
    };
    (status, Json(body)).into_response()
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidParameter(_) | EngineError::MissingField(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn search_get(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> axum::response::Response {
    let value = query_map_to_value(params);
    handle_search(state, value).await
}

pub async fn search_post(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> axum::response::Response {
    handle_search(state, body).await
}

async fn handle_search(state: Arc<AppState>, raw: Value) -> axum::response::Response {
    let request = match build_search_request(remap_keys(raw)) {
        Ok(r) => r,
        Err(e) => return error_response(status_for(&e), &e),
    };
    let response = state.orchestrator.search(request).await;
    Json(Envelope::ok(response)).into_response()
}

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    plugins_enabled: bool,
    plugin_count: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let body = HealthBody {
        status: "ok",
        plugins_enabled: state.config.async_plugin_enabled,
        plugin_count: state.registry.len(),
    };
    Json(Envelope::ok(body)).into_response()
}

/// A bare query string has no concept of nested objects/arrays, so the
/// GET path is coerced into the same flat `Value::Object<String>` shape
/// as a JSON body's top-level keys; array/bool/number fields are
/// reparsed from their string form by `build_search_request`.
fn query_map_to_value(params: HashMap<String, String>) -> Value {
    let map: serde_json::Map<String, Value> = params.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    Value::Object(map)
}

fn long_key(k: &str) -> &str {
    match k {
        "kw" => "keyword",
        "conc" => "concurrency",
        "refresh" => "force_refresh",
        "res" => "result_type",
        "src" => "source_type",
        other => other,
    }
}

/// Map short query/body param names onto their long form (spec.md §6:
/// "Maps short query names (kw, conc, refresh, res, src) to long names
/// internally"). A body that already uses long names passes through.
fn remap_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut out = serde_json::Map::with_capacity(obj.len());
            for (k, v) in obj {
                out.insert(long_key(&k).to_string(), v);
            }
            Value::Object(out)
        }
        other => other,
    }
}

fn value_to_csv_vec(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect(),
        Value::String(s) => s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
        _ => Vec::new(),
    }
}

fn value_to_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Value::Number(n) => n.as_i64().map(|x| x != 0).unwrap_or(false),
        _ => false,
    }
}

fn value_to_usize(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().map(|x| x as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// `value` must already have long-form keys (see `remap_keys`).
pub fn build_search_request(value: Value) -> Result<SearchRequest, EngineError> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(EngineError::InvalidParameter("request must be a JSON object or query string".to_string())),
    };

    let keyword = obj.get("keyword").and_then(Value::as_str).map(str::trim).unwrap_or("").to_string();
    if keyword.is_empty() {
        return Err(EngineError::MissingField("keyword".to_string()));
    }

    let channels = obj.get("channels").map(value_to_csv_vec).unwrap_or_default();
    let plugins = obj.get("plugins").map(value_to_csv_vec).unwrap_or_default();
    let cloud_types = obj
        .get("cloud_types")
        .map(value_to_csv_vec)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| LinkType::from_str_loose(s))
        .collect();

    let concurrency = obj.get("concurrency").and_then(value_to_usize);
    let force_refresh = obj.get("force_refresh").map(value_to_bool).unwrap_or(false);
    let result_type = obj.get("result_type").and_then(Value::as_str).map(ResultType::parse).unwrap_or_default();
    let source_type = obj.get("source_type").and_then(Value::as_str).map(SourceType::parse).unwrap_or_default();
    let ext = obj.remove("ext").unwrap_or_else(|| serde_json::json!({}));

    Ok(SearchRequest {
        keyword,
        channels,
        concurrency,
        force_refresh,
        result_type,
        source_type,
        plugins,
        cloud_types,
        ext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_map_onto_the_long_request_shape() {
        let raw = serde_json::json!({
            "kw": "alpha",
            "conc": "5",
            "refresh": "true",
            "res": "results",
            "src": "plugin",
        });
        let request = build_search_request(remap_keys(raw)).unwrap();
        assert_eq!(request.keyword, "alpha");
        assert_eq!(request.concurrency, Some(5));
        assert!(request.force_refresh);
        assert_eq!(request.result_type, ResultType::Results);
        assert_eq!(request.source_type, SourceType::Plugin);
    }

    #[test]
    fn missing_keyword_is_rejected() {
        let raw = serde_json::json!({"conc": 2});
        let err = build_search_request(remap_keys(raw)).unwrap_err();
        assert!(matches!(err, EngineError::MissingField(_)));
    }

    #[test]
    fn csv_channels_and_cloud_types_are_split_and_trimmed() {
        let raw = serde_json::json!({"keyword": "a", "channels": "c1, c2 ,c3", "cloud_types": "quark,baidu"});
        let request = build_search_request(remap_keys(raw)).unwrap();
        assert_eq!(request.channels, vec!["c1", "c2", "c3"]);
        assert_eq!(request.cloud_types, vec![LinkType::Quark, LinkType::Baidu]);
    }

    #[test]
    fn json_array_channels_pass_through_unchanged() {
        let raw = serde_json::json!({"keyword": "a", "channels": ["c1", "c2"]});
        let request = build_search_request(remap_keys(raw)).unwrap();
        assert_eq!(request.channels, vec!["c1", "c2"]);
    }
}
