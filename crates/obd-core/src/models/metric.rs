//! Metric identity models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of a diagnostic metric (e.g. `engine-rpm`)
///
/// Ordering is lexical; the poll scheduler relies on it to break ties
/// between metrics that fall due at the same instant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(String);

impl MetricId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MetricId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MetricId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// OBD-II parameter identifier: service (mode) plus PID byte
///
/// Serialises as four uppercase hex characters (`"010C"`), which is also
/// the request text understood by ELM327 interpreters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid {
    pub service: u8,
    pub pid: u8,
}

impl Pid {
    /// Mode 01 "show current data"
    pub const CURRENT_DATA: u8 = 0x01;

    pub const fn new(service: u8, pid: u8) -> Self {
        Self { service, pid }
    }

    /// A Mode 01 parameter
    pub const fn current(pid: u8) -> Self {
        Self::new(Self::CURRENT_DATA, pid)
    }

    /// Service byte of a positive response to this request
    pub fn response_service(&self) -> u8 {
        self.service.wrapping_add(0x40)
    }

    /// Request bytes as sent on a binary link
    pub fn request_bytes(&self) -> [u8; 2] {
        [self.service, self.pid]
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.service, self.pid)
    }
}

impl FromStr for Pid {
    type Err = String;

    /// Accepts `"010C"`, `"0x010C"` and `"01 0C"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if cleaned.len() != 4 {
            return Err(format!("invalid PID '{}': expected 4 hex digits", s));
        }
        let bytes = hex::decode(&cleaned).map_err(|e| format!("invalid PID '{}': {}", s, e))?;
        Ok(Self::new(bytes[0], bytes[1]))
    }
}

impl Serialize for Pid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
