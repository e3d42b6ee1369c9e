//! Telemetry data models

pub mod link;
pub mod metric;
pub mod reading;
pub mod stats;

pub use link::{LinkState, LinkStatus};
pub use metric::{MetricId, Pid};
pub use reading::{Freshness, Quality, RawFrame, Reading, ReadingValue};
pub use stats::{FieldStats, WindowMean};
