//! Per-URL fetch failures.

/// Why a single page could not be turned into text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The URL could not be parsed or uses an unsupported scheme.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The host resolves to a loopback/private target and private hosts are not allowed.
    #[error("{url}: blocked private or local host")]
    Blocked { url: String },

    /// The request did not complete within the configured timeout.
    #[error("{url}: timed out")]
    Timeout { url: String },

    /// Connection or protocol failure.
    #[error("{url}: request failed: {message}")]
    Request { url: String, message: String },

    /// Non-success HTTP status.
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response is not text we can match against.
    #[error("{url}: unsupported content type '{content_type}'")]
    NonText { url: String, content_type: String },

    /// The body could not be read or decoded.
    #[error("{url}: body read failed: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    /// The URL this failure belongs to.
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::Blocked { url }
            | Self::Timeout { url }
            | Self::Request { url, .. }
            | Self::Status { url, .. }
            | Self::NonText { url, .. }
            | Self::Body { url, .. } => url,
        }
    }
}
