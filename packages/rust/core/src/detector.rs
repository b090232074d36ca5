//! Additive diff between two scan snapshots.
//!
//! Only what newly appeared is reported. A page or hit that disappears from
//! `current` produces no entry.

use std::collections::HashSet;

use keywatch_shared::{KeywordHit, PageResult, ScanSnapshot};

/// Compute what is new in `current` relative to `previous`.
///
/// - A URL absent from `previous` is reported with all of its hits.
/// - A URL present in both is reported with the hits of `current` that have
///   no equal `(keyword, context)` hit in `previous`, in `current`'s order,
///   and only if at least one such hit exists.
/// - URLs only in `previous` are ignored.
pub fn diff_snapshots(current: &ScanSnapshot, previous: &ScanSnapshot) -> ScanSnapshot {
    current
        .iter()
        .filter_map(|page| match previous.page(&page.url) {
            None => Some(page.clone()),
            Some(old) => {
                let seen: HashSet<&KeywordHit> = old.hits.iter().collect();
                let new_hits: Vec<KeywordHit> = page
                    .hits
                    .iter()
                    .filter(|hit| !seen.contains(hit))
                    .cloned()
                    .collect();
                (!new_hits.is_empty()).then(|| PageResult {
                    url: page.url.clone(),
                    hits: new_hits,
                })
            }
        })
        .collect()
}
