//! Poll scheduler
//!
//! One task multiplexes every metric's timer through the due-time queue in
//! [`PollTimers`] and dispatches requests one at a time through the
//! connection supervisor. Polling pauses while the link is down and picks up
//! again on reconnect.

mod timers;

pub use timers::{failure_backoff, PollOutcome, PollPhase, PollStatus, PollTimers};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use obd_conv::{decode, MetricRegistry};
use obd_core::MetricId;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PollingConfig;
use crate::store::{ReadingStore, UpdateOutcome};
use crate::supervisor::ConnectionSupervisor;

pub struct PollScheduler {
    registry: Arc<MetricRegistry>,
    supervisor: Arc<ConnectionSupervisor>,
    store: Arc<ReadingStore>,
    config: PollingConfig,
    timers: Mutex<PollTimers>,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<MetricRegistry>,
        supervisor: Arc<ConnectionSupervisor>,
        store: Arc<ReadingStore>,
        config: PollingConfig,
    ) -> Self {
        let timers = PollTimers::new(
            registry.all().iter().map(|d| (d.id.clone(), d.poll_interval())),
            Instant::now(),
            config.max_backoff(),
        );
        Self {
            registry,
            supervisor,
            store,
            config,
            timers: Mutex::new(timers),
        }
    }

    /// Timer state of one metric
    pub fn poll_status(&self, id: &MetricId) -> Option<PollStatus> {
        self.timers.lock().status(id).cloned()
    }

    pub fn poll_statuses(&self) -> BTreeMap<MetricId, PollStatus> {
        self.timers
            .lock()
            .statuses()
            .map(|(id, status)| (id.clone(), status.clone()))
            .collect()
    }

    /// Scheduler loop; runs until `shutdown` flips to true or its sender drops
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut link = self.supervisor.subscribe_status();
        info!(metrics = self.registry.len(), "Poll scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let connected = link.borrow_and_update().is_connected();
            if !connected {
                debug!("Link down, polling paused");
                tokio::select! {
                    changed = link.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = shutdown.changed() => break,
                }
            }

            let next_deadline = self.timers.lock().next_deadline();
            let Some(deadline) = next_deadline else {
                // Nothing registered; wait for shutdown
                let _ = shutdown.changed().await;
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                changed = link.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = shutdown.changed() => break,
            }

            let now = Instant::now();
            let next = {
                let mut timers = self.timers.lock();
                timers.mark_due(now);
                timers.pop_due(now)
            };
            if let Some(id) = next {
                self.poll_once(&id).await;
            }
        }

        info!("Poll scheduler stopped");
    }

    /// Request, decode and store one metric, then re-arm its timer
    async fn poll_once(&self, id: &MetricId) {
        let descriptor = match self.registry.describe(id) {
            Ok(d) => d,
            Err(e) => {
                error!(metric = %id, error = %e, "Scheduled metric missing from registry");
                return;
            }
        };

        let result = self
            .supervisor
            .request(descriptor.pid, self.config.request_timeout())
            .await;
        let now = Instant::now();

        match result {
            Ok(frame) => {
                let reading = decode(descriptor, &frame, Utc::now());
                if let Some(detail) = &reading.error {
                    debug!(metric = %id, frame = %frame, error = %detail, "Invalid frame");
                }
                match self.store.update(reading) {
                    Ok(UpdateOutcome::OutOfOrder) => {
                        debug!(metric = %id, "Reading arrived out of order");
                    }
                    Ok(UpdateOutcome::Accepted { .. }) => {}
                    Err(e) => warn!(metric = %id, error = %e, "Store rejected reading"),
                }
                self.timers.lock().complete(id, PollOutcome::Success, now);
            }
            Err(e) => {
                let delay = self
                    .timers
                    .lock()
                    .complete(id, PollOutcome::Failure(e.to_string()), now);
                debug!(
                    metric = %id,
                    error = %e,
                    retry_in_ms = delay.map(|d| d.as_millis() as u64),
                    "Poll failed"
                );
            }
        }
    }
}
