//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use keywatch_fetcher::{FetchError, Fetcher, normalize_text};

use crate::notifier::{DeliveryError, MailSender};

/// Serves page text from a map; unknown URLs fail like an unreachable host.
///
/// A gated fetcher holds every fetch until [`StubFetcher::open_gate`] is called.
pub(crate) struct StubFetcher {
    pages: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl Default for StubFetcher {
    fn default() -> Self {
        Self {
            pages: Mutex::default(),
            calls: AtomicUsize::new(0),
            gate: watch::channel(true).0,
        }
    }
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated() -> Self {
        let fetcher = Self::default();
        fetcher.gate.send_replace(false);
        fetcher
    }

    /// Release held fetches; later fetches pass straight through.
    pub(crate) fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn with_page(self, url: &str, text: &str) -> Self {
        self.set_page(url, text);
        self
    }

    pub(crate) fn set_page(&self, url: &str, text: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
    }

    pub(crate) fn remove_page(&self, url: &str) {
        self.pages.lock().unwrap().remove(url);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // The sender lives in `self`, so the channel cannot close here.
        let _ = self.gate.subscribe().wait_for(|open| *open).await;
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .map(|text| normalize_text(text))
            .ok_or_else(|| FetchError::Request {
                url: url.to_string(),
                message: "connection refused".into(),
            })
    }
}

/// A sent message as seen by [`RecordingMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every message; optionally fails every delivery.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingMailer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DeliveryError::Transport("smtp unavailable".into()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
