use netreach_common::LinkType;
use url::Url;

use crate::providers::classify;

/// Provider-specific canonicalization (spec §4.A `normalize`).
///
/// Idempotent by construction: `normalize(normalize(u, p), p) == normalize(u, p)`
/// for every provider branch below — see the unit tests.
pub fn normalize(url: &str, password: &str) -> String {
    let trimmed = url.trim();
    match classify(trimmed) {
        LinkType::Magnet | LinkType::Ed2k => trimmed.to_string(),
        LinkType::Baidu => normalize_baidu(trimmed, password),
        LinkType::Tianyi | LinkType::Uc | LinkType::Cloud123 | LinkType::Aliyun => {
            strip_query_keep_path(trimmed)
        }
        LinkType::Cloud115 => normalize_115(trimmed, password),
        _ => trimmed.to_string(),
    }
}

/// Truncate at `?pwd=` and reappend a known 4-char password.
fn normalize_baidu(url: &str, password: &str) -> String {
    let base = match url.to_lowercase().find("?pwd=") {
        Some(idx) => &url[..idx],
        None => url,
    };
    let pwd: String = password.chars().take(4).collect();
    if pwd.len() == 4 {
        format!("{base}?pwd={pwd}")
    } else {
        base.to_string()
    }
}

/// Strip tracking params, keep the bare share path.
fn strip_query_keep_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut out = format!(
                "{}://{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or_default()
            );
            if let Some(port) = parsed.port() {
                out.push_str(&format!(":{port}"));
            }
            out.push_str(parsed.path());
            out
        }
        None => url.split('?').next().unwrap_or(url).to_string(),
    }
}

/// Like `strip_query_keep_path`, but 115 additionally keeps up to 4 chars
/// of a `password=` query parameter (preferring the URL's own param over
/// an externally-supplied password).
fn normalize_115(url: &str, password: &str) -> String {
    let base = strip_query_keep_path(url);
    let from_url = Url::parse(url)
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "password").map(|(_, v)| v.to_string()));
    let candidate = from_url.unwrap_or_else(|| password.to_string());
    let pwd: String = candidate.chars().take(4).collect();
    if pwd.is_empty() {
        base
    } else {
        format!("{base}?password={pwd}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baidu_normalization_is_idempotent() {
        let u = "https://pan.baidu.com/s/1abcXYZ?pwd=1234&surl=foo";
        let once = normalize(u, "1234");
        let twice = normalize(&once, "1234");
        assert_eq!(once, twice);
        assert_eq!(once, "https://pan.baidu.com/s/1abcXYZ?pwd=1234");
    }

    #[test]
    fn baidu_without_known_password_has_no_pwd_param() {
        let u = "https://pan.baidu.com/s/1abcXYZ?pwd=1234";
        assert_eq!(normalize(u, ""), "https://pan.baidu.com/s/1abcXYZ");
    }

    #[test]
    fn aliyun_strips_tracking_params() {
        let u = "https://www.alipan.com/s/abcDEF123?utm_source=share&from=app";
        let out = normalize(u, "");
        assert_eq!(out, "https://www.alipan.com/s/abcDEF123");
        assert_eq!(out, normalize(&out, ""));
    }

    #[test]
    fn cloud115_keeps_truncated_password_param() {
        let u = "https://115.com/s/swabcdef?password=12345678";
        let out = normalize(u, "");
        assert_eq!(out, "https://115.com/s/swabcdef?password=1234");
        assert_eq!(out, normalize(&out, ""));
    }

    #[test]
    fn magnet_and_ed2k_pass_through_unchanged() {
        let m = "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01";
        assert_eq!(normalize(m, ""), m);
        let e = "ed2k://|file|movie.mkv|123456|ABCDEF0123456789ABCDEF0123456789|/";
        assert_eq!(normalize(e, ""), e);
    }
}
