//! Change notifications.
//!
//! [`Notifier`] turns a diff into a plain-text summary and hands it to a
//! [`MailSender`]. Delivery failures are logged and swallowed: they never
//! reach the caller and never undo the state change that produced the diff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use keywatch_shared::{KeywatchError, MailConfig, Result, ScanSnapshot};

/// Timeout for a single relay request.
const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Mail senders
// ---------------------------------------------------------------------------

/// Why a message could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The transport could not be reached or failed mid-request.
    #[error("mail transport failed: {0}")]
    Transport(String),

    /// The transport answered but refused the message.
    #[error("mail relay rejected message: HTTP {status}")]
    Rejected { status: u16 },
}

/// External mail-sending collaborator.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError> {
        info!(to, subject, body, "notification (no mail relay configured)");
        Ok(())
    }
}

/// JSON body posted to the relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Delivers messages by POSTing them as JSON to an HTTP mail relay.
#[derive(Debug, Clone)]
pub struct HttpMailRelay {
    client: Client,
    endpoint: Url,
    from: String,
}

impl HttpMailRelay {
    pub fn new(endpoint: &str, from: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| KeywatchError::config(format!("invalid mail relay URL '{endpoint}': {e}")))?;
        let client = Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .map_err(|e| KeywatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            from: from.into(),
        })
    }
}

#[async_trait]
impl MailSender for HttpMailRelay {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError> {
        let message = RelayMessage {
            from: &self.from,
            to,
            subject,
            body,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&message)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Build the sender described by `[mail]`: the HTTP relay if one is
/// configured, the log-only sender otherwise.
pub fn sender_from_config(config: &MailConfig) -> Result<Arc<dyn MailSender>> {
    match config.relay_url.as_deref() {
        Some(relay) => Ok(Arc::new(HttpMailRelay::new(relay, config.from.clone())?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Formats change summaries and attempts delivery.
pub struct Notifier {
    sender: Arc<dyn MailSender>,
    subject: String,
}

impl Notifier {
    pub fn new(sender: Arc<dyn MailSender>, subject: impl Into<String>) -> Self {
        Self {
            sender,
            subject: subject.into(),
        }
    }

    pub fn from_config(config: &MailConfig) -> Result<Self> {
        Ok(Self::new(sender_from_config(config)?, config.subject.clone()))
    }

    /// Send the summary of `diff` to `contact_address`.
    ///
    /// Returns whether the message was handed off successfully. Failures are
    /// logged, never returned.
    #[instrument(skip(self, diff), fields(pages = diff.len()))]
    pub async fn notify(&self, contact_address: &str, diff: &ScanSnapshot) -> bool {
        if diff.is_empty() {
            return false;
        }
        if contact_address.trim().is_empty() {
            warn!("subscriber has no contact address, notification dropped");
            return false;
        }

        let body = format_summary(diff);
        match self.sender.send(contact_address, &self.subject, &body).await {
            Ok(()) => {
                info!(to = contact_address, "notification sent");
                true
            }
            Err(e) => {
                warn!(to = contact_address, error = %e, "notification delivery failed");
                false
            }
        }
    }
}

/// Plain-text summary: one line per URL followed by its new keywords.
///
/// Keywords repeat once per hit in the diff; the summary lists each keyword
/// once per URL, in first-appearance order.
pub fn format_summary(diff: &ScanSnapshot) -> String {
    let mut out = String::new();
    for page in diff {
        let mut keywords: Vec<&str> = Vec::new();
        for hit in &page.hits {
            if !keywords.contains(&hit.keyword.as_str()) {
                keywords.push(&hit.keyword);
            }
        }
        out.push_str(&page.url);
        out.push_str(": ");
        out.push_str(&keywords.join(", "));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use keywatch_shared::{KeywordHit, PageResult};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testing::RecordingMailer;

    fn diff() -> ScanSnapshot {
        vec![
            PageResult {
                url: "https://a.test/news".into(),
                hits: vec![
                    KeywordHit::new("rust", "rust 1"),
                    KeywordHit::new("tokio", "tokio"),
                    KeywordHit::new("rust", "rust 2"),
                ],
            },
            PageResult {
                url: "https://b.test".into(),
                hits: vec![KeywordHit::new("serde", "serde")],
            },
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn summary_lists_urls_and_keywords() {
        assert_eq!(
            format_summary(&diff()),
            "https://a.test/news: rust, tokio\nhttps://b.test: serde\n"
        );
    }

    #[tokio::test]
    async fn notify_delivers_summary() {
        let mailer = Arc::new(RecordingMailer::new());
        let notifier = Notifier::new(mailer.clone(), "New keyword appeared");

        assert!(notifier.notify("alice@example.com", &diff()).await);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[0].subject, "New keyword appeared");
        assert!(sent[0].body.contains("https://b.test: serde"));
    }

    #[tokio::test]
    async fn notify_swallows_delivery_failure() {
        let mailer = Arc::new(RecordingMailer::failing());
        let notifier = Notifier::new(mailer.clone(), "subject");

        assert!(!notifier.notify("alice@example.com", &diff()).await);
        assert_eq!(mailer.attempts(), 1);
    }

    #[tokio::test]
    async fn notify_skips_empty_diff_and_missing_address() {
        let mailer = Arc::new(RecordingMailer::new());
        let notifier = Notifier::new(mailer.clone(), "subject");

        assert!(!notifier.notify("alice@example.com", &ScanSnapshot::new()).await);
        assert!(!notifier.notify("  ", &diff()).await);
        assert_eq!(mailer.attempts(), 0);
    }

    #[tokio::test]
    async fn relay_posts_json_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(serde_json::json!({
                "from": "keywatch@example.com",
                "to": "alice@example.com",
                "subject": "hello",
                "body": "line\n",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let relay =
            HttpMailRelay::new(&format!("{}/send", server.uri()), "keywatch@example.com").unwrap();
        relay
            .send("alice@example.com", "hello", "line\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn relay_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let relay = HttpMailRelay::new(&server.uri(), "keywatch@example.com").unwrap();
        let err = relay.send("a@example.com", "s", "b").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 503 }));
    }

    #[test]
    fn sender_from_config_validates_relay_url() {
        let mut config = MailConfig::default();
        assert!(sender_from_config(&config).is_ok());

        config.relay_url = Some("not a url".into());
        assert!(sender_from_config(&config).is_err());
    }
}
