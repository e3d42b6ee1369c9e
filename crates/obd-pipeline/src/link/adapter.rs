//! Link adapter trait

use std::time::Duration;

use async_trait::async_trait;
use obd_core::{Pid, RawFrame};

use super::LinkError;

/// Transport-agnostic interface to the vehicle's diagnostic bus
///
/// OBD buses are half-duplex request/response. Callers never invoke an
/// adapter directly; the connection supervisor owns it and guarantees that
/// at most one request is in flight.
#[async_trait]
pub trait LinkAdapter: Send + Sync {
    /// Establish the link (open socket, initialise the interpreter)
    async fn connect(&self) -> Result<(), LinkError>;

    /// Send a parameter request and wait for its raw response
    ///
    /// The supervisor also bounds this call with `timeout` and drops the
    /// future when it expires, so adapters must be cancel safe.
    async fn request(&self, pid: Pid, timeout: Duration) -> Result<RawFrame, LinkError>;

    /// Discard any half-finished exchange after an abandoned request
    ///
    /// An error means the adapter could not recover and has dropped the
    /// connection; the caller must treat the link as lost.
    async fn reset(&self) -> Result<(), LinkError>;

    /// Tear the link down
    async fn disconnect(&self);

    /// Short description for logs (e.g. `elm327://192.168.0.10:35000`)
    fn describe(&self) -> String;
}
