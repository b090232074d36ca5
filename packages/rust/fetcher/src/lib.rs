//! Page retrieval and visible-text extraction.
//!
//! This crate provides:
//! - [`Fetcher`]: the seam the scanner fetches pages through
//! - [`HttpFetcher`]: `reqwest`-backed implementation with timeout and SSRF guard
//! - [`text`]: visible-text extraction and normalization

pub mod error;
pub mod http;
pub mod text;

use async_trait::async_trait;

pub use error::FetchError;
pub use http::HttpFetcher;
pub use text::{extract_visible_text, normalize_text};

/// Retrieves the normalized visible text of a page.
///
/// Implementations must return text that is already lowercased and
/// whitespace-collapsed (see [`normalize_text`]). Any failure is reported
/// as a [`FetchError`] and is never fatal to the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
