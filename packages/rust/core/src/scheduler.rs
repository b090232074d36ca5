//! Periodic driver for [`WatchEngine::run_tick`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use keywatch_shared::{KeywatchError, Result};

use crate::engine::WatchEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs one tick per interval, the first one interval after `start`.
///
/// Ticks never overlap: a tick that overruns the interval delays the next
/// one instead of running concurrently with it.
pub struct Scheduler {
    engine: Arc<WatchEngine>,
    running: Mutex<Option<RunningTask>>,
    ticks: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(engine: Arc<WatchEngine>) -> Self {
        Self {
            engine,
            running: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.running.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(task) if !task.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Ticks finished since the scheduler was created.
    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Begin ticking every `interval`.
    pub fn start(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(KeywatchError::validation("scan interval must be non-zero"));
        }

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return Err(KeywatchError::validation("scheduler is already running"));
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            self.engine.clone(),
            interval,
            cancel.clone(),
            self.ticks.clone(),
        ));
        *running = Some(RunningTask { cancel, handle });

        info!(interval_secs = interval.as_secs(), "scheduler started");
        Ok(())
    }

    /// Stop ticking. A tick already in progress runs to completion first.
    pub async fn stop(&self) {
        let task = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(task) = task else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            error!(error = %e, "scheduler task ended abnormally");
        }
        info!("scheduler stopped");
    }
}

async fn tick_loop(
    engine: Arc<WatchEngine>,
    period: Duration,
    cancel: CancellationToken,
    ticks: Arc<AtomicU64>,
) {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }

        // The tick runs in its own task so a panic ends that tick only.
        let tick = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_tick().await }
        });
        if let Err(e) = tick.await {
            error!(error = %e, "tick aborted");
        }
        ticks.fetch_add(1, Ordering::SeqCst);
    }
}
