//! Point-in-time scan of a URL set for a keyword set.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use keywatch_fetcher::Fetcher;
use keywatch_shared::{PageResult, ScanSnapshot};

use crate::matcher::Matcher;

/// Fetches each URL and matches keywords against its text.
pub struct Scanner {
    fetcher: Arc<dyn Fetcher>,
    matcher: Matcher,
}

impl Scanner {
    pub fn new(fetcher: Arc<dyn Fetcher>, matcher: Matcher) -> Self {
        Self { fetcher, matcher }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Scan `urls` in order and collect the pages that have hits.
    ///
    /// A URL that cannot be fetched contributes nothing and does not stop the
    /// scan. Duplicate and blank URLs are scanned once / skipped. If no
    /// usable keyword remains after normalization nothing is fetched.
    #[instrument(skip_all, fields(urls = urls.len(), keywords = keywords.len()))]
    pub async fn scan<U, K>(&self, urls: &[U], keywords: &[K]) -> ScanSnapshot
    where
        U: AsRef<str>,
        K: AsRef<str>,
    {
        let mut snapshot = ScanSnapshot::new();

        let keyword_set = self.matcher.compile(keywords);
        if keyword_set.is_empty() {
            debug!("no usable keywords, skipping scan");
            return snapshot;
        }

        let mut seen = HashSet::new();
        let mut failures = 0usize;

        for url in urls.iter().map(AsRef::as_ref) {
            if url.trim().is_empty() || !seen.insert(url) {
                continue;
            }

            let text = match self.fetcher.fetch(url).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(%url, error = %e, "fetch failed, skipping page");
                    failures += 1;
                    continue;
                }
            };

            let hits = self.matcher.find_compiled(&text, &keyword_set);
            debug!(%url, hits = hits.len(), "page matched");
            snapshot.push(PageResult {
                url: url.to_string(),
                hits,
            });
        }

        debug!(
            pages_with_hits = snapshot.len(),
            hits = snapshot.hit_count(),
            failures,
            "scan complete"
        );
        snapshot
    }
}
