//! Per-subscriber state store.
//!
//! Each subscriber id owns an independent [`SubscriberState`] behind its own
//! async mutex. The id map itself is only locked briefly to find or create a
//! slot, so distinct ids never wait on each other, while a scan-diff-apply
//! cycle for one id holds that id's slot for its whole duration.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use keywatch_shared::{ChangeRecord, ScanSnapshot, SubscriberId, SubscriberState};

use crate::clock::Clock;

type Slot = Arc<Mutex<SubscriberState>>;

/// In-memory subscriber states keyed by id, created lazily on first access.
pub struct SubscriberStateStore {
    slots: RwLock<HashMap<SubscriberId, Slot>>,
    clock: Arc<dyn Clock>,
}

impl SubscriberStateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn slot(&self, id: &SubscriberId) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return slot.clone();
        }

        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(subscriber = %id, "creating subscriber state");
                Arc::new(Mutex::new(SubscriberState::default()))
            })
            .clone()
    }

    /// Take exclusive hold of one subscriber's state.
    ///
    /// Holders for the same id are serialized; other ids are unaffected.
    pub async fn lock(&self, id: &SubscriberId) -> StateGuard {
        StateGuard {
            guard: self.slot(id).lock_owned().await,
            clock: self.clock.clone(),
        }
    }

    /// Current state, created empty on first access.
    pub async fn get(&self, id: &SubscriberId) -> SubscriberState {
        self.lock(id).await.clone()
    }

    /// Commit a scan outcome; see [`SubscriberState::apply_diff`].
    pub async fn apply_diff(
        &self,
        id: &SubscriberId,
        current: ScanSnapshot,
        diff: &ScanSnapshot,
    ) -> bool {
        self.lock(id).await.apply_diff(current, diff)
    }

    /// Empty the change log, keeping the comparison baseline.
    pub async fn clear_log(&self, id: &SubscriberId) {
        self.lock(id).await.guard.clear_log();
    }

    /// Change log, most recent first.
    pub async fn list_log(&self, id: &SubscriberId) -> Vec<ChangeRecord> {
        self.lock(id).await.log_newest_first()
    }

    /// Forget one subscriber entirely. Returns whether it had state.
    pub fn reset(&self, id: &SubscriberId) -> bool {
        self.slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    /// Forget every subscriber.
    pub fn reset_all(&self) {
        self.slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of subscribers with state.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one subscriber's state.
pub struct StateGuard {
    guard: OwnedMutexGuard<SubscriberState>,
    clock: Arc<dyn Clock>,
}

impl StateGuard {
    /// Commit a scan outcome stamped with the store's clock.
    pub fn apply_diff(&mut self, current: ScanSnapshot, diff: &ScanSnapshot) -> bool {
        let at = self.clock.now();
        self.guard.apply_diff(current, diff, at)
    }
}

impl Deref for StateGuard {
    type Target = SubscriberState;

    fn deref(&self) -> &SubscriberState {
        &self.guard
    }
}
