//! Cache Key Generator (spec §4.B) — deterministic fingerprint over
//! (keyword, channels, source-type, plugins).

use std::sync::OnceLock;

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Hash a (sorted, deduplicated-by-caller) list of strings. Short lists
/// (<5 elements) use the literal sorted comma-join instead of a digest —
/// a documented performance optimization (spec §4.B) since it is still
/// deterministic and avoids hashing in the hot path for the common case
/// of one or two channels/plugins.
fn hash_list(items: &[String]) -> String {
    let mut sorted: Vec<&str> = items.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    let joined = sorted.join(",");
    if sorted.len() < 5 {
        joined
    } else {
        md5_hex(&joined)
    }
}

fn all_channels_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| md5_hex("__all_channels__"))
}

fn all_plugins_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| md5_hex("__all_plugins__"))
}

/// Compute the main-cache fingerprint for a search request.
///
/// `source_type` is the already-normalized request field (`"all"`,
/// `"tg"`, or `"plugin"`); callers pass it through verbatim.
pub fn cache_key(keyword: &str, channels: &[String], source_type: &str, plugins: &[String]) -> String {
    let keyword_norm = keyword.trim().to_lowercase();
    let source_type_norm = source_type.trim().to_lowercase();

    let channels_hash = if channels.is_empty() {
        all_channels_hash().to_string()
    } else {
        hash_list(channels)
    };

    let plugins_hash = if source_type_norm == "tg" {
        "none".to_string()
    } else {
        let non_empty: Vec<String> = plugins
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if non_empty.is_empty() {
            all_plugins_hash().to_string()
        } else {
            hash_list(&non_empty)
        }
    };

    let raw = format!("{keyword_norm}:{channels_hash}:{source_type_norm}:{plugins_hash}");
    md5_hex(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_is_insensitive_to_case_whitespace_and_order() {
        let a = cache_key(
            "  Alpha Movie ",
            &["ChannelB".into(), "channela".into()],
            "all",
            &["p2".into(), "p1".into()],
        );
        let b = cache_key(
            "alpha movie",
            &["channela".into(), "ChannelB".into()],
            "ALL",
            &["p1".into(), "p2".into()],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn tg_source_ignores_plugins_entirely() {
        let a = cache_key("x", &["c".into()], "tg", &["p1".into()]);
        let b = cache_key("x", &["c".into()], "tg", &["p2".into(), "p3".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_and_all_empty_plugin_lists_collapse_to_the_same_key() {
        let a = cache_key("x", &[], "all", &[]);
        let b = cache_key("x", &[], "all", &["".into(), "  ".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_keywords_produce_different_keys() {
        let a = cache_key("alpha", &[], "all", &[]);
        let b = cache_key("beta", &[], "all", &[]);
        assert_ne!(a, b);
    }
}
