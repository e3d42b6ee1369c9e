//! Reading models

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MetricId;

/// Quality flag attached to every reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Decoded and within the descriptor's valid range
    Ok,
    /// Last known good value older than the freshness threshold
    Stale,
    /// Frame was malformed or decoded out of range
    Invalid,
}

/// Presentation-facing classification of a reading at a point in time
///
/// "No data yet" is represented by the absence of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Live,
    Stale,
    Invalid,
}

/// Decoded value of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    /// Physical value in the descriptor's unit
    Number(f64),
    /// Discrete value with its label from the decode table
    Enumerated {
        raw: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl ReadingValue {
    /// Numeric view of the value (enumerations yield their raw code)
    pub fn as_f64(&self) -> f64 {
        match self {
            ReadingValue::Number(v) => *v,
            ReadingValue::Enumerated { raw, .. } => *raw as f64,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ReadingValue::Number(_) => None,
            ReadingValue::Enumerated { label, .. } => label.as_deref(),
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(v) => write!(f, "{}", v),
            ReadingValue::Enumerated { raw, label: Some(l) } => write!(f, "{} ({})", l, raw),
            ReadingValue::Enumerated { raw, label: None } => write!(f, "{}", raw),
        }
    }
}

/// One observation of a metric
///
/// Readings are immutable once built; a later reading supersedes an
/// earlier one rather than modifying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub metric: MetricId,
    /// Absent when the frame could not be decoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ReadingValue>,
    pub timestamp: DateTime<Utc>,
    pub quality: Quality,
    /// Decode failure detail for invalid readings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reading {
    /// A successfully decoded reading
    pub fn ok(metric: MetricId, value: ReadingValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric,
            value: Some(value),
            timestamp,
            quality: Quality::Ok,
            error: None,
        }
    }

    /// A reading for a frame that failed format or range checks
    pub fn invalid(metric: MetricId, error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric,
            value: None,
            timestamp,
            quality: Quality::Invalid,
            error: Some(error.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.quality != Quality::Invalid
    }

    /// Age of this reading at `now`, zero if `now` is earlier
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether a valid reading is still within `threshold` at `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.is_valid() && self.age_at(now) <= threshold
    }

    /// Classify this reading at `now` against a freshness threshold
    pub fn freshness(&self, now: DateTime<Utc>, threshold: Duration) -> Freshness {
        if !self.is_valid() {
            Freshness::Invalid
        } else if self.age_at(now) <= threshold {
            Freshness::Live
        } else {
            Freshness::Stale
        }
    }

    /// Copy of this reading with the quality a consumer should display at `now`
    pub fn presented_at(&self, now: DateTime<Utc>, threshold: Duration) -> Self {
        let mut reading = self.clone();
        if self.freshness(now, threshold) == Freshness::Stale {
            reading.quality = Quality::Stale;
        }
        reading
    }
}

/// Raw response from the vehicle link, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// Binary payload (service byte, PID echo, data bytes)
    Bytes(Vec<u8>),
    /// ELM327 text response, e.g. `"41 0C 1A F8"`
    Text(String),
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawFrame::Bytes(b) => f.write_str(&hex::encode_upper(b)),
            RawFrame::Text(t) => f.write_str(t.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_freshness_classification() {
        let threshold = Duration::from_secs(10);
        let reading = Reading::ok("coolant-temp".into(), ReadingValue::Number(212.0), at(0));

        assert_eq!(reading.freshness(at(5), threshold), Freshness::Live);
        assert_eq!(reading.freshness(at(10), threshold), Freshness::Live);
        assert_eq!(reading.freshness(at(11), threshold), Freshness::Stale);
        assert_eq!(reading.presented_at(at(11), threshold).quality, Quality::Stale);
        assert_eq!(reading.presented_at(at(1), threshold).quality, Quality::Ok);
    }

    #[test]
    fn test_invalid_reading_is_never_fresh() {
        let reading = Reading::invalid("coolant-temp".into(), "bad frame", at(0));
        assert_eq!(reading.freshness(at(0), Duration::from_secs(10)), Freshness::Invalid);
        assert!(!reading.is_fresh_at(at(0), Duration::from_secs(10)));
    }

    #[test]
    fn test_age_saturates_for_future_readings() {
        let reading = Reading::ok("engine-rpm".into(), ReadingValue::Number(800.0), at(5));
        assert_eq!(reading.age_at(at(5) - TimeDelta::seconds(1)), Duration::ZERO);
    }

    #[test]
    fn test_value_serialization() {
        let number = serde_json::to_value(ReadingValue::Number(1.5)).unwrap();
        assert_eq!(number, serde_json::json!(1.5));

        let label = serde_json::to_value(ReadingValue::Enumerated {
            raw: 2,
            label: Some("closed_loop".into()),
        })
        .unwrap();
        assert_eq!(label, serde_json::json!({"raw": 2, "label": "closed_loop"}));
    }
}
