//! Metric descriptors
//!
//! A descriptor is everything the pipeline knows about one metric: how to
//! request it, how to decode it, what range is plausible and how often to
//! poll it.

use std::time::Duration;

use obd_core::{MetricId, Pid};
use serde::{Deserialize, Serialize};

use crate::rule::DecodeRule;

/// Inclusive range of physically plausible values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Complete definition of a single metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub id: MetricId,
    /// Human-readable display name
    pub name: String,
    /// Parameter requested on the link
    pub pid: Pid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub range: ValidRange,
    pub rule: DecodeRule,
    /// Nominal poll interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Explicit precision override (decimal places)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
}

fn default_interval_ms() -> u64 {
    1000
}

impl MetricDescriptor {
    pub fn new(
        id: impl Into<MetricId>,
        name: impl Into<String>,
        pid: Pid,
        rule: DecodeRule,
        range: ValidRange,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pid,
            unit: None,
            range,
            rule,
            interval_ms: default_interval_ms(),
            precision: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Decimal places decoded values are rounded to
    pub fn effective_precision(&self) -> u8 {
        self.precision.unwrap_or_else(|| self.rule.precision())
    }
}
