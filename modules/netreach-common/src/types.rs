use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of cloud-storage providers a link can be classified into
/// (spec §3, `Link.type`). `Others` is the total fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Baidu,
    Quark,
    Aliyun,
    Xunlei,
    Tianyi,
    Uc,
    #[serde(rename = "115")]
    Cloud115,
    #[serde(rename = "123")]
    Cloud123,
    Mobile,
    Pikpak,
    Lanzou,
    Magnet,
    Ed2k,
    Others,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkType::Baidu => "baidu",
            LinkType::Quark => "quark",
            LinkType::Aliyun => "aliyun",
            LinkType::Xunlei => "xunlei",
            LinkType::Tianyi => "tianyi",
            LinkType::Uc => "uc",
            LinkType::Cloud115 => "115",
            LinkType::Cloud123 => "123",
            LinkType::Mobile => "mobile",
            LinkType::Pikpak => "pikpak",
            LinkType::Lanzou => "lanzou",
            LinkType::Magnet => "magnet",
            LinkType::Ed2k => "ed2k",
            LinkType::Others => "others",
        };
        write!(f, "{s}")
    }
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Baidu => "baidu",
            LinkType::Quark => "quark",
            LinkType::Aliyun => "aliyun",
            LinkType::Xunlei => "xunlei",
            LinkType::Tianyi => "tianyi",
            LinkType::Uc => "uc",
            LinkType::Cloud115 => "115",
            LinkType::Cloud123 => "123",
            LinkType::Mobile => "mobile",
            LinkType::Pikpak => "pikpak",
            LinkType::Lanzou => "lanzou",
            LinkType::Magnet => "magnet",
            LinkType::Ed2k => "ed2k",
            LinkType::Others => "others",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Some(match s.as_str() {
            "baidu" => LinkType::Baidu,
            "quark" => LinkType::Quark,
            "aliyun" => LinkType::Aliyun,
            "xunlei" => LinkType::Xunlei,
            "tianyi" => LinkType::Tianyi,
            "uc" => LinkType::Uc,
            "115" => LinkType::Cloud115,
            "123" => LinkType::Cloud123,
            "mobile" => LinkType::Mobile,
            "pikpak" => LinkType::Pikpak,
            "lanzou" => LinkType::Lanzou,
            "magnet" => LinkType::Magnet,
            "ed2k" => LinkType::Ed2k,
            "others" => LinkType::Others,
            _ => return None,
        })
    }
}

/// A single download link extracted from a source (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub url: String,
    #[serde(default)]
    pub password: String,
}

/// One search hit before merge-by-type (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub unique_id: String,
    pub message_id: String,
    /// Empty string for plugin-sourced results (invariant, spec §3).
    pub channel: String,
    pub datetime: DateTime<Utc>,
    pub title: String,
    pub content: String,
    pub links: Vec<Link>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl SearchResult {
    pub fn channel_unique_id(channel: &str, message_id: &str) -> String {
        format!("{channel}_{message_id}")
    }

    pub fn plugin_unique_id(plugin_name: &str, internal_id: &str) -> String {
        format!("{plugin_name}-{internal_id}")
    }
}

/// A link folded into the merged-by-type view, carrying its provenance
/// (spec §3, `MergedLink`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedLink {
    pub url: String,
    pub password: String,
    pub note: String,
    pub datetime: DateTime<Utc>,
    /// `"tg:{channel}"` or `"plugin:{name}"`.
    pub source: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl MergedLink {
    pub fn source_for_channel(channel: &str) -> String {
        format!("tg:{channel}")
    }

    pub fn source_for_plugin(plugin: &str) -> String {
        format!("plugin:{plugin}")
    }
}

/// Final response shape returned to the HTTP caller (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResponse {
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_by_type: Option<HashMap<String, Vec<MergedLink>>>,
}

/// Requested response shape (spec §4.H step 1 / §6 `result_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    All,
    Results,
    MergedByType,
}

impl ResultType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "all" => ResultType::All,
            "results" => ResultType::Results,
            // "merge" is aliased to "merged_by_type" (spec §4.H step 1).
            "merge" | "merged_by_type" => ResultType::MergedByType,
            _ => ResultType::MergedByType,
        }
    }
}

impl Default for ResultType {
    fn default() -> Self {
        ResultType::MergedByType
    }
}

/// Which family of sources to query (spec §4.H step 1 / §6 `source_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    All,
    Tg,
    Plugin,
}

impl SourceType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "tg" => SourceType::Tg,
            "plugin" => SourceType::Plugin,
            _ => SourceType::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::All => "all",
            SourceType::Tg => "tg",
            SourceType::Plugin => "plugin",
        }
    }
}

impl Default for SourceType {
    fn default() -> Self {
        SourceType::All
    }
}

/// Normalized search request, after HTTP-entry parameter mapping
/// (spec §4.H step 1). This is the "long form" the Open Questions in
/// spec.md §9 name as authoritative.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub keyword: String,
    pub channels: Vec<String>,
    pub concurrency: Option<usize>,
    pub force_refresh: bool,
    pub result_type: ResultType,
    pub source_type: SourceType,
    pub plugins: Vec<String>,
    pub cloud_types: Vec<LinkType>,
    pub ext: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_type_round_trips_through_display_and_parse() {
        for t in [
            LinkType::Baidu,
            LinkType::Quark,
            LinkType::Aliyun,
            LinkType::Cloud115,
            LinkType::Cloud123,
            LinkType::Magnet,
            LinkType::Ed2k,
            LinkType::Others,
        ] {
            assert_eq!(LinkType::from_str_loose(&t.to_string()), Some(t));
        }
    }

    #[test]
    fn result_type_aliases_merge_to_merged_by_type() {
        assert_eq!(ResultType::parse("merge"), ResultType::MergedByType);
        assert_eq!(ResultType::parse("merged_by_type"), ResultType::MergedByType);
        assert_eq!(ResultType::parse("results"), ResultType::Results);
        assert_eq!(ResultType::parse("all"), ResultType::All);
    }

    #[test]
    fn plugin_results_use_empty_channel_and_dashed_unique_id() {
        let id = SearchResult::plugin_unique_id("myplugin", "42");
        assert_eq!(id, "myplugin-42");
    }
}
