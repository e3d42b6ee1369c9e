//! Simulated vehicle link
//!
//! Answers Mode 01 requests with plausible, slowly drifting values (a
//! bounded random walk per parameter). Tests script responses, drop the
//! link or stall requests through the control methods.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use obd_core::{Pid, RawFrame};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{LinkAdapter, LinkError};
use crate::config::MockConfig;

/// Raw-value random walk for one parameter
#[derive(Debug, Clone)]
struct SimulatedPid {
    raw: u32,
    min_raw: u32,
    max_raw: u32,
    variation: u32,
    len: usize,
}

impl SimulatedPid {
    fn new(min_raw: u32, max_raw: u32, variation: u32, len: usize) -> Self {
        Self {
            raw: min_raw + (max_raw - min_raw) / 2,
            min_raw,
            max_raw,
            variation,
            len,
        }
    }

    fn step(&mut self, rng: &mut StdRng) {
        if self.variation == 0 {
            return;
        }
        let delta = rng.gen_range(0..=self.variation * 2) as i64 - self.variation as i64;
        self.raw = (self.raw as i64 + delta).clamp(self.min_raw as i64, self.max_raw as i64) as u32;
    }

    fn data(&self) -> Vec<u8> {
        let bytes = self.raw.to_be_bytes();
        bytes[4 - self.len..].to_vec()
    }
}

struct SimState {
    rng: StdRng,
    pids: HashMap<u8, SimulatedPid>,
    scripted: HashMap<u8, VecDeque<Result<RawFrame, LinkError>>>,
}

impl SimState {
    fn frame_for(&mut self, pid: Pid) -> Result<RawFrame, LinkError> {
        if let Some(next) = self.scripted.get_mut(&pid.pid).and_then(|q| q.pop_front()) {
            return next;
        }
        if pid.service != Pid::CURRENT_DATA {
            return Err(LinkError::NoData);
        }

        let rng = &mut self.rng;
        let sim = self.pids.get_mut(&pid.pid).ok_or(LinkError::NoData)?;
        sim.step(rng);

        let mut frame = vec![pid.response_service(), pid.pid];
        match pid.pid {
            // Monitor status: MIL bit plus stored DTC count, readiness bytes fixed
            0x01 => {
                let count = sim.raw as u8 & 0x7F;
                let mil = if count > 0 { 0x80 } else { 0x00 };
                frame.extend_from_slice(&[mil | count, 0x07, 0xE5, 0x00]);
            }
            _ => frame.extend(sim.data()),
        }
        Ok(RawFrame::Bytes(frame))
    }
}

/// Parameters the simulated vehicle answers, as raw encoder ranges
fn default_pids() -> HashMap<u8, SimulatedPid> {
    HashMap::from([
        (0x01, SimulatedPid::new(0, 3, 0, 1)),
        (0x03, SimulatedPid::new(0x0200, 0x0200, 0, 2)),
        (0x04, SimulatedPid::new(25, 230, 8, 1)),
        (0x05, SimulatedPid::new(115, 145, 1, 1)),
        (0x06, SimulatedPid::new(0x70, 0x90, 2, 1)),
        (0x0A, SimulatedPid::new(67, 133, 3, 1)),
        (0x0B, SimulatedPid::new(30, 100, 3, 1)),
        (0x0C, SimulatedPid::new(2800, 14000, 400, 2)),
        (0x0D, SimulatedPid::new(0, 120, 3, 1)),
        (0x0F, SimulatedPid::new(60, 100, 1, 1)),
        (0x10, SimulatedPid::new(200, 2500, 60, 2)),
        (0x11, SimulatedPid::new(0, 255, 10, 1)),
        (0x1F, SimulatedPid::new(0, 10000, 5, 2)),
        (0x2F, SimulatedPid::new(25, 242, 1, 1)),
        (0x31, SimulatedPid::new(0, 50000, 1, 2)),
        (0x33, SimulatedPid::new(95, 105, 1, 1)),
        (0x42, SimulatedPid::new(12500, 14500, 50, 2)),
        (0x46, SimulatedPid::new(55, 75, 1, 1)),
        (0x5C, SimulatedPid::new(120, 150, 1, 1)),
        (0x5E, SimulatedPid::new(10, 300, 8, 2)),
    ])
}

/// Simulated vehicle link adapter
pub struct MockLinkAdapter {
    config: MockConfig,
    connected: AtomicBool,
    /// Link refuses connections while unplugged
    plugged: AtomicBool,
    stalled: AtomicBool,
    failing_resets: AtomicBool,
    failing_connects: AtomicU32,
    connects: AtomicU64,
    requests: AtomicU64,
    resets: AtomicU64,
    state: Mutex<SimState>,
}

impl MockLinkAdapter {
    pub fn new(config: &MockConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config: config.clone(),
            connected: AtomicBool::new(false),
            plugged: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
            failing_resets: AtomicBool::new(false),
            failing_connects: AtomicU32::new(0),
            connects: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            state: Mutex::new(SimState {
                rng,
                pids: default_pids(),
                scripted: HashMap::new(),
            }),
        }
    }

    /// Queue a response for the next request of `pid` (Mode 01 pid byte)
    pub fn push_response(&self, pid: u8, response: Result<RawFrame, LinkError>) {
        self.state
            .lock()
            .scripted
            .entry(pid)
            .or_default()
            .push_back(response);
    }

    /// Simulate unplugging (false) or replugging (true) the dongle
    ///
    /// Unplugging closes the current connection; in-flight and later
    /// requests fail with [`LinkError::Closed`].
    pub fn set_plugged(&self, plugged: bool) {
        self.plugged.store(plugged, Ordering::SeqCst);
        if !plugged {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Requests never complete while stalled
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Resets fail and drop the connection, like a dongle that stopped answering
    pub fn set_reset_fails(&self, fails: bool) {
        self.failing_resets.store(fails, Ordering::SeqCst);
    }

    /// Fail the next `attempts` connection attempts
    pub fn fail_connects(&self, attempts: u32) {
        self.failing_connects.store(attempts, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkAdapter for MockLinkAdapter {
    async fn connect(&self) -> Result<(), LinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if !self.plugged.load(Ordering::SeqCst) {
            return Err(LinkError::Connect("adapter unplugged".to_string()));
        }
        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(LinkError::Connect("simulated connect failure".to_string()));
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("Mock link: connected");
        Ok(())
    }

    async fn request(&self, pid: Pid, _timeout: Duration) -> Result<RawFrame, LinkError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }

        if self.stalled.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        // Dongle may have been pulled while waiting for the response
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }

        let response = self.state.lock().frame_for(pid);
        tracing::trace!(%pid, ?response, "Mock link: response");
        response
    }

    async fn reset(&self) -> Result<(), LinkError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.failing_resets.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(LinkError::Closed);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "mock://simulated-vehicle".to_string()
    }
}
