//! Watch engine: the operations behind the scheduler and the API layer.
//!
//! One refresh cycle for a subscriber is scan → diff against the stored
//! baseline → apply. The cycle holds the subscriber's state slot from before
//! the scan until after the apply, so a forced refresh and a scheduled tick
//! for the same id never interleave.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use keywatch_fetcher::HttpFetcher;
use keywatch_shared::{
    AppConfig, ChangeRecord, KeywatchError, Result, ScanSnapshot, Subscriber, SubscriberId,
    WatchSettings,
};

use crate::clock::{Clock, SystemClock};
use crate::detector::diff_snapshots;
use crate::directory::{StaticDirectory, SubscriberDirectory};
use crate::matcher::Matcher;
use crate::notifier::Notifier;
use crate::scanner::Scanner;
use crate::state::SubscriberStateStore;

/// Outcome of one scheduled tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Subscribers scanned.
    pub subscribers: usize,
    /// Subscribers whose diff was non-empty.
    pub changed: usize,
    /// Notifications attempted.
    pub notifications_attempted: usize,
    /// Notifications handed off successfully.
    pub notifications_sent: usize,
    /// The directory could not be read; nothing was scanned.
    pub directory_failed: bool,
}

/// Scans, diffs, records and notifies on behalf of subscribers.
pub struct WatchEngine {
    scanner: Scanner,
    store: Arc<SubscriberStateStore>,
    directory: Arc<dyn SubscriberDirectory>,
    notifier: Notifier,
}

impl WatchEngine {
    pub fn new(
        scanner: Scanner,
        store: Arc<SubscriberStateStore>,
        directory: Arc<dyn SubscriberDirectory>,
        notifier: Notifier,
    ) -> Self {
        Self {
            scanner,
            store,
            directory,
            notifier,
        }
    }

    /// Wire the production collaborators from configuration: HTTP fetcher,
    /// config-backed directory, configured mail sender, system clock.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let settings = WatchSettings::from(config);
        let fetcher = Arc::new(HttpFetcher::from_settings(&settings)?);
        let scanner = Scanner::new(fetcher, Matcher::from_settings(&settings));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Ok(Self::new(
            scanner,
            Arc::new(SubscriberStateStore::new(clock)),
            Arc::new(StaticDirectory::from_config(config)),
            Notifier::from_config(&config.mail)?,
        ))
    }

    pub fn store(&self) -> &SubscriberStateStore {
        &self.store
    }

    pub fn directory(&self) -> &dyn SubscriberDirectory {
        self.directory.as_ref()
    }

    // -----------------------------------------------------------------------
    // API operations
    // -----------------------------------------------------------------------

    /// Ad-hoc scan. Touches no subscriber state.
    pub async fn preview_scan<U, K>(&self, urls: &[U], keywords: &[K]) -> ScanSnapshot
    where
        U: AsRef<str> + Sync,
        K: AsRef<str> + Sync,
    {
        self.scanner.scan(urls, keywords).await
    }

    /// Ad-hoc scan for a subscriber, defaulting omitted URLs or keywords to
    /// the subscriber's own.
    pub async fn preview_scan_for(
        &self,
        id: &SubscriberId,
        urls: Option<&[String]>,
        keywords: Option<&[String]>,
    ) -> Result<ScanSnapshot> {
        let subscriber = self.subscriber(id).await?;
        let urls = urls.unwrap_or(&subscriber.urls);
        let keywords = keywords.unwrap_or(&subscriber.keywords);
        Ok(self.scanner.scan(urls, keywords).await)
    }

    /// Run one scan-diff-apply cycle outside the schedule and return the diff.
    ///
    /// No notification is sent.
    #[instrument(skip(self), fields(subscriber = %id))]
    pub async fn force_refresh(&self, id: &SubscriberId) -> Result<ScanSnapshot> {
        let subscriber = self.subscriber(id).await?;
        Ok(self.refresh(&subscriber).await)
    }

    /// Change log, most recent first.
    pub async fn get_change_log(&self, id: &SubscriberId) -> Vec<ChangeRecord> {
        self.store.list_log(id).await
    }

    /// Empty the change log. The comparison baseline is kept.
    pub async fn clear_change_log(&self, id: &SubscriberId) {
        self.store.clear_log(id).await;
        info!(subscriber = %id, "change log cleared");
    }

    /// Drop all state for one subscriber; the next scan starts from scratch.
    pub fn reset(&self, id: &SubscriberId) -> bool {
        self.store.reset(id)
    }

    /// Drop all subscriber state.
    pub fn reset_all(&self) {
        self.store.reset_all();
    }

    // -----------------------------------------------------------------------
    // Scheduled work
    // -----------------------------------------------------------------------

    /// Process every subscriber once, sequentially in directory order.
    ///
    /// Subscribers with a non-empty diff who opted in are notified. A
    /// directory failure is logged and ends the tick early.
    #[instrument(skip(self))]
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let subscribers = match self.directory.list_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!(error = %e, "could not list subscribers, skipping tick");
                report.directory_failed = true;
                return report;
            }
        };

        for subscriber in &subscribers {
            report.subscribers += 1;

            let diff = self.refresh(subscriber).await;
            if diff.is_empty() {
                continue;
            }
            report.changed += 1;

            if subscriber.notify_by_email {
                report.notifications_attempted += 1;
                if self
                    .notifier
                    .notify(&subscriber.contact_address, &diff)
                    .await
                {
                    report.notifications_sent += 1;
                }
            }
        }

        info!(
            subscribers = report.subscribers,
            changed = report.changed,
            notified = report.notifications_sent,
            "tick complete"
        );
        report
    }

    /// Scan, diff against the baseline, and commit, holding the subscriber's slot throughout.
    async fn refresh(&self, subscriber: &Subscriber) -> ScanSnapshot {
        let mut state = self.store.lock(&subscriber.id).await;

        let current = self
            .scanner
            .scan(&subscriber.urls, &subscriber.keywords)
            .await;
        let diff = diff_snapshots(&current, &state.last_snapshot);

        if state.apply_diff(current, &diff) {
            info!(
                subscriber = %subscriber.id,
                pages = diff.len(),
                hits = diff.hit_count(),
                "new keyword hits recorded"
            );
        } else {
            debug!(subscriber = %subscriber.id, "no new keyword hits");
        }
        diff
    }

    async fn subscriber(&self, id: &SubscriberId) -> Result<Subscriber> {
        self.directory
            .find_subscriber(id)
            .await?
            .ok_or_else(|| KeywatchError::SubscriberNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use keywatch_shared::{KeywordHit, PageResult};

    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{RecordingMailer, StubFetcher};

    const URL: &str = "http://example.test";

    struct Harness {
        engine: WatchEngine,
        fetcher: Arc<StubFetcher>,
        mailer: Arc<RecordingMailer>,
        directory: Arc<StaticDirectory>,
        clock: Arc<ManualClock>,
    }

    fn subscriber(id: &str, urls: &[&str], keywords: &[&str], notify: bool) -> Subscriber {
        Subscriber {
            id: SubscriberId::from(id),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            notify_by_email: notify,
            contact_address: format!("{id}@example.com"),
        }
    }

    fn harness(fetcher: StubFetcher, subscribers: Vec<Subscriber>) -> Harness {
        harness_with_mailer(fetcher, subscribers, RecordingMailer::new())
    }

    fn harness_with_mailer(
        fetcher: StubFetcher,
        subscribers: Vec<Subscriber>,
        mailer: RecordingMailer,
    ) -> Harness {
        let fetcher = Arc::new(fetcher);
        let mailer = Arc::new(mailer);
        let directory = Arc::new(StaticDirectory::new(subscribers));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        ));

        let engine = WatchEngine::new(
            Scanner::new(fetcher.clone(), Matcher::default()),
            Arc::new(SubscriberStateStore::new(clock.clone())),
            directory.clone(),
            Notifier::new(mailer.clone(), "New keyword appeared"),
        );

        Harness {
            engine,
            fetcher,
            mailer,
            directory,
            clock,
        }
    }

    #[tokio::test]
    async fn first_scan_records_full_entry_second_records_nothing() {
        let h = harness(
            StubFetcher::new().with_page(URL, "Jehova witness site"),
            vec![subscriber("alice", &[URL], &["jehova"], false)],
        );
        let id = SubscriberId::from("alice");

        let diff = h.engine.force_refresh(&id).await.unwrap();
        let expected: ScanSnapshot = std::iter::once(PageResult {
            url: URL.into(),
            hits: vec![KeywordHit::new("jehova", "jehova witness site")],
        })
        .collect();
        assert_eq!(diff, expected);
        assert_eq!(h.engine.get_change_log(&id).await.len(), 1);

        let diff = h.engine.force_refresh(&id).await.unwrap();
        assert!(diff.is_empty());
        assert_eq!(h.engine.get_change_log(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn baseline_only_advances_on_non_empty_diff() {
        let (a, b, c) = ("http://a.test", "http://b.test", "http://c.test");
        let h = harness(
            StubFetcher::new()
                .with_page(a, "alpha")
                .with_page(b, "beta"),
            vec![subscriber("alice", &[a, b, c], &["alpha", "beta", "gamma"], false)],
        );
        let id = SubscriberId::from("alice");

        // Establish the baseline {alpha, beta}.
        assert!(!h.engine.force_refresh(&id).await.unwrap().is_empty());
        let baseline = h.engine.store().get(&id).await.last_snapshot;

        // Tick 1: beta disappears; removals are not changes.
        h.fetcher.remove_page(b);
        assert!(h.engine.force_refresh(&id).await.unwrap().is_empty());
        assert_eq!(h.engine.store().get(&id).await.last_snapshot, baseline);

        // Tick 2: beta comes back; still compared against the original baseline.
        h.fetcher.set_page(b, "beta");
        assert!(h.engine.force_refresh(&id).await.unwrap().is_empty());
        assert_eq!(h.engine.store().get(&id).await.last_snapshot, baseline);

        // Tick 3: gamma appears.
        h.fetcher.set_page(c, "gamma");
        let diff = h.engine.force_refresh(&id).await.unwrap();
        assert_eq!(diff.hit_count(), 1);
        assert_eq!(diff.pages()[0].url, c);
        assert_eq!(diff.pages()[0].hits[0].keyword, "gamma");

        let third = h
            .engine
            .preview_scan(&[a, b, c], &["alpha", "beta", "gamma"])
            .await;
        assert_eq!(h.engine.store().get(&id).await.last_snapshot, third);
        assert_eq!(h.engine.get_change_log(&id).await.len(), 2);
    }

    #[tokio::test]
    async fn clearing_log_keeps_matching_state() {
        let h = harness(
            StubFetcher::new().with_page(URL, "jehova"),
            vec![subscriber("alice", &[URL], &["jehova"], false)],
        );
        let id = SubscriberId::from("alice");

        h.engine.force_refresh(&id).await.unwrap();
        h.engine.clear_change_log(&id).await;
        assert!(h.engine.get_change_log(&id).await.is_empty());

        // Same content: still compared against the old baseline, so nothing new.
        assert!(h.engine.force_refresh(&id).await.unwrap().is_empty());
        assert!(h.engine.get_change_log(&id).await.is_empty());

        h.fetcher.set_page(URL, "jehova jehova");
        assert!(!h.engine.force_refresh(&id).await.unwrap().is_empty());
        assert_eq!(h.engine.get_change_log(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn change_log_is_newest_first_with_clock_timestamps() {
        let h = harness(
            StubFetcher::new().with_page(URL, "one"),
            vec![subscriber("alice", &[URL], &["one", "two"], false)],
        );
        let id = SubscriberId::from("alice");

        h.engine.force_refresh(&id).await.unwrap();
        let first_at = h.clock.now();
        h.clock.advance(chrono::Duration::minutes(15));
        h.fetcher.set_page(URL, "one two");
        h.engine.force_refresh(&id).await.unwrap();

        let log = h.engine.get_change_log(&id).await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].timestamp, first_at + chrono::Duration::minutes(15));
        assert_eq!(log[1].timestamp, first_at);
        assert!(log[0].diff.pages()[0].hits.iter().any(|hit| hit.keyword == "two"));
    }

    #[tokio::test]
    async fn preview_scan_bypasses_state() {
        let h = harness(
            StubFetcher::new().with_page(URL, "jehova"),
            vec![subscriber("alice", &[URL], &["jehova"], false)],
        );

        let snapshot = h.engine.preview_scan(&[URL], &["jehova"]).await;
        assert_eq!(snapshot.len(), 1);
        assert!(h.engine.store().is_empty());
    }

    #[tokio::test]
    async fn preview_scan_for_falls_back_to_subscriber_lists() {
        let other = "http://other.test";
        let h = harness(
            StubFetcher::new()
                .with_page(URL, "rust and tokio")
                .with_page(other, "tokio only"),
            vec![subscriber("alice", &[URL], &["rust"], false)],
        );
        let id = SubscriberId::from("alice");

        let own = h.engine.preview_scan_for(&id, None, None).await.unwrap();
        assert_eq!(own.hit_count(), 1);

        let keywords = vec!["tokio".to_string()];
        let urls = vec![other.to_string()];
        let custom = h
            .engine
            .preview_scan_for(&id, Some(&urls), Some(&keywords))
            .await
            .unwrap();
        assert_eq!(custom.pages()[0].url, other);
        assert!(h.engine.store().is_empty());
    }

    #[tokio::test]
    async fn force_refresh_unknown_subscriber_fails() {
        let h = harness(StubFetcher::new(), vec![]);
        let err = h
            .engine
            .force_refresh(&SubscriberId::from("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeywatchError::SubscriberNotFound(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn tick_notifies_only_opted_in_subscribers_with_changes() {
        let h = harness(
            StubFetcher::new().with_page(URL, "rust news"),
            vec![
                subscriber("alice", &[URL], &["rust"], true),
                subscriber("bob", &[URL], &["rust"], false),
                subscriber("carol", &[URL], &["absent"], true),
            ],
        );

        let report = h.engine.run_tick().await;
        assert_eq!(
            report,
            TickReport {
                subscribers: 3,
                changed: 2,
                notifications_attempted: 1,
                notifications_sent: 1,
                directory_failed: false,
            }
        );
        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[0].body, format!("{URL}: rust\n"));

        // Nothing new on the second tick.
        let report = h.engine.run_tick().await;
        assert_eq!(report.changed, 0);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_notification_keeps_applied_state() {
        let h = harness_with_mailer(
            StubFetcher::new().with_page(URL, "rust"),
            vec![subscriber("alice", &[URL], &["rust"], true)],
            RecordingMailer::failing(),
        );
        let id = SubscriberId::from("alice");

        let report = h.engine.run_tick().await;
        assert_eq!(report.notifications_attempted, 1);
        assert_eq!(report.notifications_sent, 0);
        assert_eq!(h.engine.get_change_log(&id).await.len(), 1);
        assert!(!h.engine.store().get(&id).await.last_snapshot.is_empty());
    }

    #[tokio::test]
    async fn unreachable_pages_do_not_stop_other_subscribers() {
        let h = harness(
            StubFetcher::new().with_page(URL, "rust"),
            vec![
                subscriber("alice", &["http://down.test"], &["rust"], false),
                subscriber("bob", &[URL], &["rust"], false),
            ],
        );

        let report = h.engine.run_tick().await;
        assert_eq!(report.subscribers, 2);
        assert_eq!(report.changed, 1);
        assert!(h.engine.get_change_log(&"alice".into()).await.is_empty());
        assert_eq!(h.engine.get_change_log(&"bob".into()).await.len(), 1);
    }

    #[tokio::test]
    async fn directory_changes_apply_on_next_tick() {
        let h = harness(StubFetcher::new().with_page(URL, "rust"), vec![]);
        assert_eq!(h.engine.run_tick().await.subscribers, 0);

        h.directory
            .replace(vec![subscriber("alice", &[URL], &["rust"], false)]);
        assert_eq!(h.engine.run_tick().await.changed, 1);
        assert_eq!(h.fetcher.calls(), 1);
    }

    struct BrokenDirectory;

    #[async_trait]
    impl SubscriberDirectory for BrokenDirectory {
        async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
            Err(KeywatchError::Directory("database offline".into()))
        }
    }

    #[tokio::test]
    async fn directory_failure_is_not_fatal() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let engine = WatchEngine::new(
            Scanner::new(Arc::new(StubFetcher::new()), Matcher::default()),
            Arc::new(SubscriberStateStore::new(clock)),
            Arc::new(BrokenDirectory),
            Notifier::new(Arc::new(RecordingMailer::new()), "subject"),
        );

        let report = engine.run_tick().await;
        assert!(report.directory_failed);
        assert_eq!(report.subscribers, 0);
    }

    #[tokio::test]
    async fn reset_starts_subscriber_from_scratch() {
        let h = harness(
            StubFetcher::new().with_page(URL, "rust"),
            vec![subscriber("alice", &[URL], &["rust"], false)],
        );
        let id = SubscriberId::from("alice");

        h.engine.force_refresh(&id).await.unwrap();
        assert!(h.engine.reset(&id));
        assert!(!h.engine.force_refresh(&id).await.unwrap().is_empty());

        h.engine.reset_all();
        assert!(h.engine.store().is_empty());
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forced_refresh_waits_for_in_flight_tick() {
        let h = harness(
            StubFetcher::gated().with_page(URL, "jehova"),
            vec![subscriber("alice", &[URL], &["jehova"], false)],
        );
        let engine = Arc::new(h.engine);
        let id = SubscriberId::from("alice");

        let tick = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_tick().await }
        });
        settle().await;
        assert_eq!(h.fetcher.calls(), 1);

        let forced = tokio::spawn({
            let engine = engine.clone();
            let id = id.clone();
            async move { engine.force_refresh(&id).await }
        });
        settle().await;
        // The tick still holds alice's slot, so the forced refresh has not scanned.
        assert_eq!(h.fetcher.calls(), 1);
        assert!(!forced.is_finished());

        h.fetcher.open_gate();
        let report = tick.await.unwrap();
        let diff = forced.await.unwrap().unwrap();

        assert_eq!(report.changed, 1);
        assert!(diff.is_empty());
        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(engine.get_change_log(&id).await.len(), 1);
    }
}
