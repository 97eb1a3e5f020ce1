//! Keyword post-filter and merge-by-type assembly (spec §4.H steps 5-6).

use std::collections::HashMap;

use netreach_common::types::{LinkType, MergedLink, SearchResult};

/// One result plus where it came from and whether its plugin opted out
/// of the keyword post-filter (spec §4.F `skip_service_filter`).
pub struct SourcedResult {
    pub result: SearchResult,
    pub source_label: String,
    pub skip_filter: bool,
}

/// Keyword-filter soundness (spec §8): every whitespace token of the
/// lowercased keyword must occur in the lowercased title or content.
/// An empty keyword trivially passes everything (defensive; the HTTP
/// entry already rejects an empty keyword before this is reached).
pub fn passes_keyword_filter(keyword: &str, title: &str, content: &str) -> bool {
    let kw = keyword.trim().to_lowercase();
    if kw.is_empty() {
        return true;
    }
    let title_l = title.to_lowercase();
    let content_l = content.to_lowercase();
    kw.split_whitespace().all(|tok| title_l.contains(tok) || content_l.contains(tok))
}

/// Drop results that fail the keyword filter, except those whose
/// producing source set `skip_service_filter` (spec §4.H step 5).
pub fn apply_keyword_filter(keyword: &str, sourced: Vec<SourcedResult>) -> Vec<SourcedResult> {
    sourced
        .into_iter()
        .filter(|s| s.skip_filter || passes_keyword_filter(keyword, &s.result.title, &s.result.content))
        .collect()
}

/// Flatten surviving results into `type -> ordered_list<MergedLink>`
/// buckets (spec §4.H step 6): dedup by normalized URL within a bucket
/// preferring the entry with a non-empty password, tie-broken by the
/// most recent `datetime`; each bucket sorted by `datetime` descending.
pub fn build_merged_by_type(sourced: &[SourcedResult]) -> HashMap<String, Vec<MergedLink>> {
    let mut by_type: HashMap<LinkType, HashMap<String, MergedLink>> = HashMap::new();

    for s in sourced {
        for link in &s.result.links {
            let candidate = MergedLink {
                url: link.url.clone(),
                password: link.password.clone(),
                note: s.result.title.clone(),
                datetime: s.result.datetime,
                source: s.source_label.clone(),
                images: s.result.images.clone(),
            };
            let bucket = by_type.entry(link.link_type).or_default();
            match bucket.get(&link.url) {
                Some(existing) if !is_better(&candidate, existing) => {}
                _ => {
                    bucket.insert(link.url.clone(), candidate);
                }
            }
        }
    }

    by_type
        .into_iter()
        .map(|(t, bucket)| {
            let mut links: Vec<MergedLink> = bucket.into_values().collect();
            links.sort_by(|a, b| b.datetime.cmp(&a.datetime));
            (t.as_str().to_string(), links)
        })
        .collect()
}

/// `candidate` beats `existing` if it carries a password and `existing`
/// doesn't, or (password-ness equal) it is more recent.
fn is_better(candidate: &MergedLink, existing: &MergedLink) -> bool {
    let cand_has_pwd = !candidate.password.is_empty();
    let exist_has_pwd = !existing.password.is_empty();
    match (cand_has_pwd, exist_has_pwd) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.datetime >= existing.datetime,
    }
}

/// Distinct merged link count across every bucket.
pub fn total_merged_links(merged: &HashMap<String, Vec<MergedLink>>) -> usize {
    merged.values().map(|v| v.len()).sum()
}

/// Cloud-type filter (spec §4.H step 5): keep only links/results whose
/// type is in `cloud_types`; empty `cloud_types` means "all types".
pub fn filter_by_cloud_types(
    results: &[SearchResult],
    merged: &HashMap<String, Vec<MergedLink>>,
    cloud_types: &[LinkType],
) -> (Vec<SearchResult>, HashMap<String, Vec<MergedLink>>) {
    if cloud_types.is_empty() {
        return (results.to_vec(), merged.clone());
    }
    let allowed: std::collections::HashSet<&str> = cloud_types.iter().map(|t| t.as_str()).collect();

    let filtered_merged: HashMap<String, Vec<MergedLink>> = merged
        .iter()
        .filter(|(k, _)| allowed.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let filtered_results: Vec<SearchResult> = results
        .iter()
        .filter(|r| r.links.iter().any(|l| allowed.contains(l.link_type.as_str())))
        .cloned()
        .collect();

    (filtered_results, filtered_merged)
}

/// Dedup a flat list of results by `unique_id`, first occurrence wins
/// (spec §8: "`unique_id` is unique within the response").
pub fn dedup_sourced_by_unique_id(sourced: Vec<SourcedResult>) -> Vec<SourcedResult> {
    let mut seen = std::collections::HashSet::new();
    sourced.into_iter().filter(|s| seen.insert(s.result.unique_id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use netreach_common::types::Link;

    fn result(id: &str, title: &str, content: &str, links: Vec<Link>) -> SearchResult {
        SearchResult {
            unique_id: id.to_string(),
            message_id: id.to_string(),
            channel: String::new(),
            datetime: Utc::now(),
            title: title.to_string(),
            content: content.to_string(),
            links,
            tags: Vec::new(),
            images: Vec::new(),
        }
    }

    fn link(t: LinkType, url: &str, pwd: &str) -> Link {
        Link {
            link_type: t,
            url: url.to_string(),
            password: pwd.to_string(),
        }
    }

    #[test]
    fn keyword_filter_requires_every_token() {
        assert!(passes_keyword_filter("alpha movie", "An Alpha Movie", ""));
        assert!(!passes_keyword_filter("alpha show", "An Alpha Movie", ""));
    }

    #[test]
    fn skip_filter_sources_bypass_keyword_check() {
        let sourced = vec![SourcedResult {
            result: result("a", "totally unrelated", "", vec![]),
            source_label: "plugin:p".into(),
            skip_filter: true,
        }];
        let out = apply_keyword_filter("alpha", sourced);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn merged_bucket_prefers_password_then_recency() {
        let now = Utc::now();
        let older_with_pwd = SourcedResult {
            result: {
                let mut r = result("a", "t", "", vec![link(LinkType::Baidu, "https://pan.baidu.com/s/x", "1234")]);
                r.datetime = now - ChronoDuration::hours(1);
                r
            },
            source_label: "tg:c1".into(),
            skip_filter: false,
        };
        let newer_no_pwd = SourcedResult {
            result: {
                let mut r = result("b", "t", "", vec![link(LinkType::Baidu, "https://pan.baidu.com/s/x", "")]);
                r.datetime = now;
                r
            },
            source_label: "tg:c2".into(),
            skip_filter: false,
        };
        let merged = build_merged_by_type(&[older_with_pwd, newer_no_pwd]);
        let bucket = &merged["baidu"];
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].password, "1234");
    }

    #[test]
    fn bucket_sorted_datetime_descending() {
        let now = Utc::now();
        let mut older = result("a", "t", "", vec![link(LinkType::Quark, "https://pan.quark.cn/s/a", "")]);
        older.datetime = now - ChronoDuration::hours(2);
        let mut newer = result("b", "t", "", vec![link(LinkType::Quark, "https://pan.quark.cn/s/b", "")]);
        newer.datetime = now;
        let sourced = vec![
            SourcedResult { result: older, source_label: "tg:c".into(), skip_filter: false },
            SourcedResult { result: newer, source_label: "tg:c".into(), skip_filter: false },
        ];
        let merged = build_merged_by_type(&sourced);
        let bucket = &merged["quark"];
        assert_eq!(bucket[0].url, "https://pan.quark.cn/s/b");
        assert_eq!(bucket[1].url, "https://pan.quark.cn/s/a");
    }

    #[test]
    fn cloud_type_filter_drops_nonmatching_buckets_and_results() {
        let r = result(
            "a",
            "t",
            "",
            vec![
                link(LinkType::Quark, "https://pan.quark.cn/s/a", ""),
                link(LinkType::Baidu, "https://pan.baidu.com/s/a", ""),
            ],
        );
        let sourced = vec![SourcedResult { result: r.clone(), source_label: "tg:c".into(), skip_filter: false }];
        let merged = build_merged_by_type(&sourced);
        let (results, filtered_merged) = filter_by_cloud_types(&[r], &merged, &[LinkType::Quark]);
        assert_eq!(filtered_merged.len(), 1);
        assert!(filtered_merged.contains_key("quark"));
        assert_eq!(results.len(), 1); // result kept: it has a quark link
    }

    #[test]
    fn dedup_by_unique_id_keeps_first() {
        let sourced = vec![
            SourcedResult { result: result("a", "first", "", vec![]), source_label: "tg:c".into(), skip_filter: false },
            SourcedResult { result: result("a", "second", "", vec![]), source_label: "tg:c".into(), skip_filter: false },
        ];
        let out = dedup_sourced_by_unique_id(sourced);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].result.title, "first");
    }
}
