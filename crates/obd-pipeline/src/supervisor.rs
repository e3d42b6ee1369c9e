//! Connection supervisor
//!
//! Owns the single [`LinkAdapter`] and is the only component that touches
//! the physical link. It keeps the link up (exponential backoff with jitter,
//! unlimited retries), publishes [`LinkStatus`] through a watch channel and
//! serialises requests so at most one is in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use obd_core::{LinkState, LinkStatus, Pid, RawFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::link::{LinkAdapter, LinkError};

/// Delay before reconnect attempt number `failures` (1-based)
pub fn reconnect_delay<R: Rng + ?Sized>(
    config: &ReconnectConfig,
    failures: u32,
    rng: &mut R,
) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let max = config.max_backoff();
    let base = config
        .initial_backoff()
        .saturating_mul(1u32 << exponent)
        .min(max);

    let jitter = config.jitter.clamp(0.0, 1.0);
    if jitter == 0.0 {
        return base;
    }
    let factor = rng.gen_range(1.0 - jitter..=1.0 + jitter);
    base.mul_f64(factor).min(max)
}

pub struct ConnectionSupervisor {
    link: Arc<dyn LinkAdapter>,
    config: ReconnectConfig,
    status: watch::Sender<LinkStatus>,
    request_lock: Mutex<()>,
    lost: Notify,
}

impl ConnectionSupervisor {
    pub fn new(link: Arc<dyn LinkAdapter>, config: ReconnectConfig) -> Self {
        let (status, _) = watch::channel(LinkStatus::default());
        Self {
            link,
            config,
            status,
            request_lock: Mutex::new(()),
            lost: Notify::new(),
        }
    }

    /// Current link status
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status transition
    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    pub fn describe(&self) -> String {
        self.link.describe()
    }

    /// Send one parameter request over the link
    ///
    /// Waits for any in-flight request to finish first. When `deadline`
    /// expires the adapter is reset and the link stays up unless the reset
    /// fails. An I/O failure, a closed link, a failed reset or an adapter
    /// that no longer holds a connection marks the link lost and wakes the
    /// reconnect cycle.
    pub async fn request(&self, pid: Pid, deadline: Duration) -> Result<RawFrame, LinkError> {
        let _in_flight = self.request_lock.lock().await;

        let connected = self.status.borrow().is_connected();
        if !connected {
            return Err(LinkError::NotConnected);
        }

        match tokio::time::timeout(deadline, self.link.request(pid, deadline)).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(LinkError::Timeout(_))) | Err(_) => {
                debug!(%pid, deadline_ms = deadline.as_millis() as u64, "Request deadline expired, resetting link");
                if let Err(e) = self.link.reset().await {
                    self.mark_lost(&e);
                }
                Err(LinkError::Timeout(deadline))
            }
            Ok(Err(e)) => {
                // Status said connected, so the adapter dropped the link on its own
                if e.is_link_loss() || e == LinkError::NotConnected {
                    self.mark_lost(&e);
                }
                Err(e)
            }
        }
    }

    fn mark_lost(&self, error: &LinkError) {
        let was_connected = self.status.send_if_modified(|status| {
            if status.state != LinkState::Connected {
                return false;
            }
            status.state = LinkState::Disconnected;
            status.last_error = Some(error.to_string());
            status.connected_since = None;
            true
        });

        if was_connected {
            warn!(error = %error, "Vehicle link lost");
            self.lost.notify_one();
        }
    }

    fn set_state(&self, state: LinkState) {
        self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            true
        });
    }

    /// Connection loop; runs until `shutdown` flips to true or its sender drops
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut rng = StdRng::from_entropy();
        info!(link = %self.link.describe(), "Connection supervisor started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(LinkState::Connecting);
            let result = tokio::select! {
                r = self.link.connect() => r,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(()) => {
                    self.status.send_modify(|status| {
                        status.state = LinkState::Connected;
                        status.consecutive_failures = 0;
                        status.last_error = None;
                        status.connected_since = Some(Utc::now());
                    });
                    info!(link = %self.link.describe(), "Vehicle link connected");

                    // Reconnect immediately once a request reports the link gone
                    tokio::select! {
                        _ = self.lost.notified() => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    let failures = self.status.borrow().consecutive_failures.saturating_add(1);
                    let delay = reconnect_delay(&self.config, failures, &mut rng);
                    self.status.send_modify(|status| {
                        status.state = LinkState::Reconnecting;
                        status.consecutive_failures = failures;
                        status.last_error = Some(e.to_string());
                        status.connected_since = None;
                    });
                    warn!(
                        error = %e,
                        attempt = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Vehicle link connect failed"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        self.link.disconnect().await;
        self.status.send_modify(|status| {
            status.state = LinkState::Disconnected;
            status.connected_since = None;
        });
        info!("Connection supervisor stopped");
    }
}
