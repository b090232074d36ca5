//! Keyword-watch engine.
//!
//! This crate ties page fetching, keyword matching, snapshot diffing and
//! per-subscriber history into the scheduled watch loop:
//! - [`matcher`]: keyword occurrences with bounded context
//! - [`scanner`]: fetch + match across a subscriber's URLs
//! - [`detector`]: additive diff between two snapshots
//! - [`state`]: per-subscriber baseline and change log
//! - [`notifier`]: change summaries and mail delivery
//! - [`engine`]: the operations exposed to the API layer
//! - [`scheduler`]: the recurring tick driver

pub mod clock;
pub mod detector;
pub mod directory;
pub mod engine;
pub mod matcher;
pub mod notifier;
pub mod scanner;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::diff_snapshots;
pub use directory::{StaticDirectory, SubscriberDirectory};
pub use engine::{TickReport, WatchEngine};
pub use matcher::{KeywordSet, Matcher};
pub use notifier::{
    DeliveryError, HttpMailRelay, LogMailer, MailSender, Notifier, format_summary, sender_from_config,
};
pub use scanner::Scanner;
pub use scheduler::{Scheduler, SchedulerState};
pub use state::{StateGuard, SubscriberStateStore};
