//! obd-core - Core types for the OBD telemetry pipeline
//!
//! This crate defines the data model shared by the decoder, the pipeline
//! and the read API:
//!
//! - [`MetricId`] and [`Pid`]: what is measured and how it is requested
//! - [`Reading`]: one decoded, immutable observation of a metric
//! - [`LinkStatus`]: liveness of the vehicle link
//! - [`TelemetryError`]: configuration and lookup errors

pub mod error;
pub mod models;

pub use error::{TelemetryError, TelemetryResult};
pub use models::*;
