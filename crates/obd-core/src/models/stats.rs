//! Summary statistics over a metric's recent history

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MetricId, Quality, Reading};

/// Min/max/mean over the valid readings of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub metric: MetricId,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

impl FieldStats {
    /// Compute statistics over the `Ok` readings in `readings`
    ///
    /// Returns `None` when no reading carries a usable value.
    pub fn from_readings<'a>(
        metric: MetricId,
        readings: impl IntoIterator<Item = &'a Reading>,
    ) -> Option<Self> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;

        for value in readings
            .into_iter()
            .filter(|r| r.quality == Quality::Ok)
            .filter_map(|r| r.value.as_ref())
        {
            let v = value.as_f64();
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }

        if count == 0 {
            return None;
        }

        Some(Self {
            metric,
            min,
            max,
            mean: sum / count as f64,
            count,
        })
    }
}

/// Mean of one metric over one time window
///
/// Windows are aligned to multiples of the window length since the UNIX
/// epoch and stamped with their end time. Windows without an ok reading are
/// left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMean {
    pub time: DateTime<Utc>,
    pub value: f64,
    pub count: usize,
}

impl WindowMean {
    /// Group the `Ok` readings in `readings` into windows of `window`
    ///
    /// A zero window yields nothing.
    pub fn from_readings<'a>(
        readings: impl IntoIterator<Item = &'a Reading>,
        window: Duration,
    ) -> Vec<Self> {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        if window_ms == 0 {
            return Vec::new();
        }

        let mut windows: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
        for reading in readings.into_iter().filter(|r| r.quality == Quality::Ok) {
            let Some(value) = reading.value.as_ref() else {
                continue;
            };
            let start = reading.timestamp.timestamp_millis().div_euclid(window_ms) * window_ms;
            let entry = windows.entry(start).or_insert((0.0, 0));
            entry.0 += value.as_f64();
            entry.1 += 1;
        }

        windows
            .into_iter()
            .filter_map(|(start, (sum, count))| {
                let end = start.checked_add(window_ms)?;
                Some(Self {
                    time: DateTime::from_timestamp_millis(end)?,
                    value: sum / count as f64,
                    count,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadingValue;
    use chrono::Utc;

    #[test]
    fn test_stats_skip_invalid() {
        let now = Utc::now();
        let id = MetricId::from("vehicle-speed");
        let readings = vec![
            Reading::ok(id.clone(), ReadingValue::Number(10.0), now),
            Reading::invalid(id.clone(), "garbled", now),
            Reading::ok(id.clone(), ReadingValue::Number(30.0), now),
        ];

        let stats = FieldStats::from_readings(id, &readings).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.mean, 20.0);
    }

    #[test]
    fn test_stats_empty() {
        assert!(FieldStats::from_readings("maf".into(), &[]).is_none());
    }

    #[test]
    fn test_window_means_align_to_epoch() {
        let id = MetricId::from("engine-rpm");
        let at = |secs: i64, v: f64| {
            Reading::ok(
                id.clone(),
                ReadingValue::Number(v),
                DateTime::from_timestamp(1_700_000_040 + secs, 0).unwrap(),
            )
        };
        // 1_700_000_040 is a multiple of 60, so windows start there
        let readings = vec![
            at(0, 800.0),
            at(30, 1000.0),
            Reading::invalid(id.clone(), "garbled", DateTime::from_timestamp(1_700_000_085, 0).unwrap()),
            at(59, 1200.0),
            at(185, 3000.0),
        ];

        let means = WindowMean::from_readings(&readings, Duration::from_secs(60));
        assert_eq!(means.len(), 2);
        assert_eq!(means[0].time, DateTime::from_timestamp(1_700_000_100, 0).unwrap());
        assert_eq!(means[0].value, 1000.0);
        assert_eq!(means[0].count, 3);
        // Empty windows in between are skipped
        assert_eq!(means[1].time, DateTime::from_timestamp(1_700_000_280, 0).unwrap());
        assert_eq!(means[1].value, 3000.0);

        assert!(WindowMean::from_readings(&readings, Duration::ZERO).is_empty());
    }
}
