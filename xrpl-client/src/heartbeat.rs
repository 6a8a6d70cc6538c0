//! Periodic liveness probes.
//!
//! The monitor sends a ping carrying the current UTC timestamp on a fixed
//! interval. Replies are handled by the read loop, which extends the epoch's
//! deadlines; a link that stops answering is detected when the read deadline
//! expires. The only way out of [`HeartbeatState::Running`] is the epoch's stop
//! signal.

use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Lifecycle of a heartbeat monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// Probing on every tick
    Running,
    /// Stop signal received, task finished
    Stopped,
}

/// Sends one liveness probe.
pub trait Prober: Send + Sync + 'static {
    /// Send a probe carrying `payload`.
    fn probe(&self, payload: String) -> impl Future<Output = Result<()>> + Send;
}

/// Handle to the heartbeat task of one connection epoch.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Start probing every `interval` until `stop` flips to `true` or its
    /// sender is dropped. The first probe goes out one interval after start.
    pub fn spawn<P: Prober>(
        prober: P,
        interval: Duration,
        epoch: u64,
        mut stop: watch::Receiver<bool>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let task_running = Arc::clone(&running);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let payload = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
                        trace!(epoch, %payload, "Sending heartbeat ping");
                        if let Err(e) = prober.probe(payload).await {
                            warn!(epoch, error = %e, "Heartbeat ping failed");
                        }
                    }
                }
            }

            task_running.store(false, Ordering::Release);
            debug!(epoch, "Heartbeat stopped");
        });

        Self { running, handle }
    }

    /// Current state.
    pub fn state(&self) -> HeartbeatState {
        if self.running.load(Ordering::Acquire) {
            HeartbeatState::Running
        } else {
            HeartbeatState::Stopped
        }
    }

    /// Wait up to `grace` for the task to finish after the stop signal,
    /// aborting it otherwise.
    pub(crate) async fn join(mut self, grace: Duration) {
        if tokio::time::timeout(grace, &mut self.handle).await.is_err() {
            self.handle.abort();
            self.running.store(false, Ordering::Release);
        }
    }
}
