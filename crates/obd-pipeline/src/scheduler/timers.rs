//! Per-metric poll timers
//!
//! Pure bookkeeping with no I/O: the due-time queue, each metric's poll
//! phase and its failure backoff. The scheduler task drives it with the
//! current instant.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use obd_core::MetricId;
use serde::Serialize;
use tokio::time::Instant;

/// Where a metric is in its poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    /// Waiting for its timer
    Idle,
    /// Timer elapsed, waiting for the link
    Due,
    /// Request dispatched
    InFlight,
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success,
    Failure(String),
}

/// Diagnostic view of one metric's timer
#[derive(Debug, Clone, PartialEq)]
pub struct PollStatus {
    pub phase: PollPhase,
    pub interval: Duration,
    pub next_due: Instant,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<Instant>,
}

/// Delay before the next poll after `failures` consecutive failures
///
/// `interval * 2^failures`, capped at `max_backoff` but never below the
/// nominal interval.
pub fn failure_backoff(interval: Duration, failures: u32, max_backoff: Duration) -> Duration {
    let factor = 1u32 << failures.min(20);
    interval
        .saturating_mul(factor)
        .min(max_backoff)
        .max(interval)
}

pub struct PollTimers {
    statuses: HashMap<MetricId, PollStatus>,
    queue: BTreeSet<(Instant, MetricId)>,
    max_backoff: Duration,
}

impl PollTimers {
    /// Arm every metric to be due at `start`
    pub fn new<I>(metrics: I, start: Instant, max_backoff: Duration) -> Self
    where
        I: IntoIterator<Item = (MetricId, Duration)>,
    {
        let mut statuses = HashMap::new();
        let mut queue = BTreeSet::new();
        for (id, interval) in metrics {
            queue.insert((start, id.clone()));
            statuses.insert(
                id,
                PollStatus {
                    phase: PollPhase::Idle,
                    interval,
                    next_due: start,
                    consecutive_failures: 0,
                    last_error: None,
                    last_success: None,
                },
            );
        }
        Self {
            statuses,
            queue,
            max_backoff,
        }
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.first().map(|(due, _)| *due)
    }

    /// Move every metric whose timer has elapsed from Idle to Due
    pub fn mark_due(&mut self, now: Instant) {
        for (due, id) in &self.queue {
            if *due > now {
                break;
            }
            if let Some(status) = self.statuses.get_mut(id) {
                status.phase = PollPhase::Due;
            }
        }
    }

    /// Take the next due metric, ordered by `(due_at, id)`, and mark it in flight
    pub fn pop_due(&mut self, now: Instant) -> Option<MetricId> {
        let (due, _) = self.queue.first()?;
        if *due > now {
            return None;
        }
        let (_, id) = self.queue.pop_first()?;
        if let Some(status) = self.statuses.get_mut(&id) {
            status.phase = PollPhase::InFlight;
        }
        Some(id)
    }

    /// Record a poll result and re-arm the metric's timer
    ///
    /// Returns the delay until the next poll.
    pub fn complete(&mut self, id: &MetricId, outcome: PollOutcome, now: Instant) -> Option<Duration> {
        let status = self.statuses.get_mut(id)?;

        let delay = match outcome {
            PollOutcome::Success => {
                status.consecutive_failures = 0;
                status.last_error = None;
                status.last_success = Some(now);
                status.interval
            }
            PollOutcome::Failure(error) => {
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                status.last_error = Some(error);
                failure_backoff(status.interval, status.consecutive_failures, self.max_backoff)
            }
        };

        // Drop any stale entry so each metric is queued at most once
        self.queue.remove(&(status.next_due, id.clone()));
        status.phase = PollPhase::Idle;
        status.next_due = now + delay;
        self.queue.insert((status.next_due, id.clone()));
        Some(delay)
    }

    pub fn status(&self, id: &MetricId) -> Option<&PollStatus> {
        self.statuses.get(id)
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&MetricId, &PollStatus)> {
        self.statuses.iter()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
