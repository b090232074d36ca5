//! Subscriber directory seam.

use std::sync::RwLock;

use async_trait::async_trait;

use keywatch_shared::{AppConfig, Result, Subscriber, SubscriberId};

/// External source of subscriber records.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// Every known subscriber, in processing order.
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;

    /// Look up one subscriber.
    async fn find_subscriber(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        Ok(self
            .list_subscribers()
            .await?
            .into_iter()
            .find(|s| &s.id == id))
    }
}

/// Directory backed by an in-memory list (typically `[[subscribers]]` from config).
#[derive(Debug, Default)]
pub struct StaticDirectory {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl StaticDirectory {
    pub fn new(subscribers: Vec<Subscriber>) -> Self {
        Self {
            subscribers: RwLock::new(subscribers),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.subscribers.iter().map(Subscriber::from).collect())
    }

    /// Replace the subscriber list; takes effect from the next tick.
    pub fn replace(&self, subscribers: Vec<Subscriber>) {
        *self.subscribers.write().unwrap_or_else(|e| e.into_inner()) = subscribers;
    }
}

#[async_trait]
impl SubscriberDirectory for StaticDirectory {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
