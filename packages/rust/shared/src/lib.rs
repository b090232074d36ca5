//! Shared types, error model, and configuration for keywatch.
//!
//! This crate is the foundation depended on by all other keywatch crates.
//! It provides:
//! - [`KeywatchError`]: the unified error type
//! - Domain types ([`Subscriber`], [`KeywordHit`], [`PageResult`], [`ScanSnapshot`],
//!   [`ChangeRecord`], [`SubscriberState`])
//! - Configuration ([`AppConfig`], [`WatchSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, KeywordMode, MailConfig, SubscriberEntry, WatchConfig, WatchSettings, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{KeywatchError, Result};
pub use types::{
    ChangeRecord, KeywordHit, PageResult, ScanSnapshot, Subscriber, SubscriberId,
    SubscriberState,
};
