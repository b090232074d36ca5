//! `reqwest`-backed page fetcher.
//!
//! Every request carries a bounded timeout so one unreachable host cannot
//! stall a scan indefinitely. Loopback and private-network targets are refused
//! unless explicitly allowed.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument};
use url::Url;

use keywatch_shared::{KeywatchError, Result, WatchSettings};

use crate::error::FetchError;
use crate::text::{extract_visible_text, normalize_text};
use crate::Fetcher;

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("keywatch/", env!("CARGO_PKG_VERSION"));

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 5;

/// Media types whose bodies are parsed as HTML.
const HTML_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Fetches pages over HTTP(S) and returns their normalized visible text.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    allow_private_hosts: bool,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_options(timeout, false)
    }

    /// Create a fetcher, optionally allowing loopback/private IPs (local
    /// deployments, mock servers).
    pub fn with_options(timeout: Duration, allow_private_hosts: bool) -> Result<Self> {
        Self::from_client_builder(Client::builder(), timeout, allow_private_hosts)
    }

    /// Create a fetcher from runtime settings.
    pub fn from_settings(settings: &WatchSettings) -> Result<Self> {
        Self::with_options(settings.fetch_timeout, settings.allow_private_hosts)
    }

    fn from_client_builder(
        builder: ClientBuilder,
        timeout: Duration,
        allow_private_hosts: bool,
    ) -> Result<Self> {
        let client = builder
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(allow_private_hosts))
            .timeout(timeout)
            .build()
            .map_err(|e| KeywatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_private_hosts,
        })
    }
}

/// Follow at most [`MAX_REDIRECTS`] hops, re-applying the host check to each.
fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if !allow_private_hosts && is_ssrf_target(attempt.url()) {
            let target = attempt.url().to_string();
            attempt.error(BlockedRedirect(target))
        } else {
            attempt.follow()
        }
    })
}

/// A redirect pointed at a host the fetcher refuses to contact.
#[derive(Debug, thiserror::Error)]
#[error("redirect to blocked host {0}")]
struct BlockedRedirect(String);

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if !self.allow_private_hosts && is_ssrf_target(&parsed) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
            });
        }

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| request_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            });

        let is_html = match media_type.as_deref() {
            None | Some("") => true,
            Some(t) if HTML_TYPES.contains(&t) => true,
            Some("text/plain") => false,
            Some(other) => {
                return Err(FetchError::NonText {
                    url: url.to_string(),
                    content_type: other.to_string(),
                });
            }
        };

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let raw = if is_html {
            extract_visible_text(&body)
        } else {
            body
        };
        let text = normalize_text(&raw);

        debug!(%url, body_len = raw.len(), text_len = text.len(), "page fetched");
        Ok(text)
    }
}

fn request_error(url: &str, e: &reqwest::Error) -> FetchError {
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        if let Some(BlockedRedirect(target)) = inner.downcast_ref::<BlockedRedirect>() {
            return FetchError::Blocked {
                url: target.clone(),
            };
        }
        source = inner.source();
    }

    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a loopback, private, or otherwise local resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fe80::/10 (link-local)
                || (first & 0xffc0) == 0xfe80
                // fc00::/7 (unique local)
                || (first & 0xfe00) == 0xfc00
        }
    }
}
