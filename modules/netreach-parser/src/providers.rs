//! Provider signature table and the regex set used to recognize and
//! normalize cloud-storage links. Kept as a single data module per the
//! design notes — classification and extraction both consult it, so a
//! new provider is a one-place change.

use std::sync::OnceLock;

use netreach_common::LinkType;
use regex::Regex;
use url::Url;

/// Domain substrings that identify a provider, checked case-insensitively
/// in declaration order (first match wins, so more specific hosts should
/// be listed before looser ones — none currently overlap).
const DOMAIN_SIGNATURES: &[(&[&str], LinkType)] = &[
    (&["pan.baidu.com", "yun.baidu.com"], LinkType::Baidu),
    (&["pan.quark.cn"], LinkType::Quark),
    (&["alipan.com", "aliyundrive.com"], LinkType::Aliyun),
    (&["pan.xunlei.com"], LinkType::Xunlei),
    (&["cloud.189.cn"], LinkType::Tianyi),
    (&["drive.uc.cn"], LinkType::Uc),
    (&["115.com", "115cdn.com", "anxia.com"], LinkType::Cloud115),
    (&["123pan.com", "123684.com", "123865.com", "123912.com"], LinkType::Cloud123),
    (&["caiyun.139.com", "139.com"], LinkType::Mobile),
    (&["mypikpak.com"], LinkType::Pikpak),
    (&["lanzou.com", "lanzoui.com", "lanzoux.com", "lanzoub.com"], LinkType::Lanzou),
];

/// Classify a URL by provider. Total and deterministic: magnet/ed2k are
/// checked by scheme, everything else by domain substring match, and
/// anything unmatched falls back to `Others`.
pub fn classify(url: &str) -> LinkType {
    let trimmed = url.trim();
    let lower = trimmed.to_lowercase();
    if lower.starts_with("magnet:") {
        return LinkType::Magnet;
    }
    if lower.starts_with("ed2k://") {
        return LinkType::Ed2k;
    }
    for (hosts, link_type) in DOMAIN_SIGNATURES {
        if hosts.iter().any(|h| lower.contains(h)) {
            return *link_type;
        }
    }
    LinkType::Others
}

/// A link is only kept if its URL passes provider-specific validation
/// (spec §3 invariant on `Link`).
pub fn is_valid_link(url: &str, link_type: LinkType) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return false;
    }
    match link_type {
        LinkType::Magnet => trimmed.to_lowercase().starts_with("magnet:?xt="),
        LinkType::Ed2k => trimmed.to_lowercase().starts_with("ed2k://|file|"),
        LinkType::Others => Url::parse(trimmed)
            .map(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or(false),
        _ => Url::parse(trimmed).is_ok(),
    }
}

fn union_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"magnet:\?xt=urn:[a-zA-Z0-9]+:[a-zA-Z0-9]{32,40}[^\s<>""']*",
            r"|ed2k://\|file\|[^\s<>""']+\|/?",
            r"|https?://(?:pan\.baidu\.com|yun\.baidu\.com|pan\.quark\.cn|alipan\.com|",
            r"aliyundrive\.com|pan\.xunlei\.com|cloud\.189\.cn|drive\.uc\.cn|",
            r"115(?:cdn)?\.com|anxia\.com|123(?:pan|684|865|912)\.com|",
            r"(?:caiyun\.)?139\.com|mypikpak\.com|lanzou[a-z]?\.com)[^\s<>""']*"
        ))
        .expect("union regex is a fixed, valid pattern")
    })
}

/// Scan free-form text for links: `magnet:`, `ed2k://`, and known provider
/// hosts (spec §4.A `extract_links`).
pub fn extract_links(text: &str) -> Vec<String> {
    union_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', '\u{3002}']).to_string())
        .collect()
}

fn password_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:提取|访问|密)码?[:：]\s*([A-Za-z0-9]{4,})|pwd[:：]\s*([A-Za-z0-9]{4,})")
            .expect("password regex is a fixed, valid pattern")
    })
}

/// Extract a password for a link: query param `pwd=` first, then the
/// `提取码`/`访问码`/`密码`/`pwd` pattern in surrounding text, else empty
/// (spec §4.A `extract_password`).
pub fn extract_password(text: &str, url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(pwd) = parsed.query_pairs().find(|(k, _)| k == "pwd") {
            if !pwd.1.is_empty() {
                return pwd.1.to_string();
            }
        }
    }
    if let Some(caps) = password_regex().captures(text) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            return m.as_str().to_string();
        }
    }
    String::new()
}
