//! Core domain types for keyword watching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SubscriberId
// ---------------------------------------------------------------------------

/// Opaque subscriber identifier, owned by the external subscriber directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// A watcher of URLs for keywords. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    /// Pages to scan, in scan order.
    pub urls: Vec<String>,
    /// Keywords to look for, in match order.
    pub keywords: Vec<String>,
    /// Whether newly appeared hits are mailed to `contact_address`.
    pub notify_by_email: bool,
    pub contact_address: String,
}

// ---------------------------------------------------------------------------
// Scan results
// ---------------------------------------------------------------------------

/// One keyword occurrence with the normalized text around it.
///
/// Two hits are equal iff keyword and context are both equal; the match
/// position is not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordHit {
    pub keyword: String,
    pub context: String,
}

impl KeywordHit {
    pub fn new(keyword: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            context: context.into(),
        }
    }
}

/// Hits found on a single page, in keyword order then document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub hits: Vec<KeywordHit>,
}

/// Point-in-time scan result: one [`PageResult`] per URL that had hits,
/// in URL scan order.
///
/// Pages without hits are never stored; [`ScanSnapshot::push`] drops them,
/// and deserialization goes through `push` as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PageResult>", into = "Vec<PageResult>")]
pub struct ScanSnapshot(Vec<PageResult>);

impl ScanSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page result. Returns `false` (and drops it) if it has no hits.
    pub fn push(&mut self, page: PageResult) -> bool {
        if page.hits.is_empty() {
            return false;
        }
        self.0.push(page);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn pages(&self) -> &[PageResult] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PageResult> {
        self.0.iter()
    }

    /// Look up the result for a URL.
    pub fn page(&self, url: &str) -> Option<&PageResult> {
        self.0.iter().find(|p| p.url == url)
    }

    /// Total number of hits across all pages.
    pub fn hit_count(&self) -> usize {
        self.0.iter().map(|p| p.hits.len()).sum()
    }
}

impl FromIterator<PageResult> for ScanSnapshot {
    fn from_iter<I: IntoIterator<Item = PageResult>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for page in iter {
            snapshot.push(page);
        }
        snapshot
    }
}

impl From<Vec<PageResult>> for ScanSnapshot {
    fn from(pages: Vec<PageResult>) -> Self {
        pages.into_iter().collect()
    }
}

impl From<ScanSnapshot> for Vec<PageResult> {
    fn from(snapshot: ScanSnapshot) -> Self {
        snapshot.0
    }
}

impl<'a> IntoIterator for &'a ScanSnapshot {
    type Item = &'a PageResult;
    type IntoIter = std::slice::Iter<'a, PageResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Change history
// ---------------------------------------------------------------------------

/// Immutable record of what newly appeared at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Time-sortable record identifier (UUID v7).
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub diff: ScanSnapshot,
}

impl ChangeRecord {
    pub fn new(timestamp: DateTime<Utc>, diff: ScanSnapshot) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp,
            diff,
        }
    }
}

/// Per-subscriber comparison baseline and change history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberState {
    /// Baseline for the next comparison.
    pub last_snapshot: ScanSnapshot,
    /// Oldest-first history of non-empty diffs.
    pub change_log: Vec<ChangeRecord>,
}

impl SubscriberState {
    /// Commit a scan outcome.
    ///
    /// A non-empty `diff` appends a record and advances the baseline to
    /// `current` together. An empty `diff` leaves the state untouched, so the
    /// baseline keeps pointing at the last snapshot that produced a change.
    /// Returns whether anything was committed.
    pub fn apply_diff(
        &mut self,
        current: ScanSnapshot,
        diff: &ScanSnapshot,
        at: DateTime<Utc>,
    ) -> bool {
        if diff.is_empty() {
            return false;
        }
        self.change_log.push(ChangeRecord::new(at, diff.clone()));
        self.last_snapshot = current;
        true
    }

    /// Empty the change log without touching the baseline.
    pub fn clear_log(&mut self) {
        self.change_log.clear();
    }

    /// Change log in presentation order (most recent first).
    pub fn log_newest_first(&self) -> Vec<ChangeRecord> {
        self.change_log.iter().rev().cloned().collect()
    }
}
