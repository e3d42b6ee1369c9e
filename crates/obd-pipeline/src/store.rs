//! Reading store
//!
//! Single source of truth for the latest value and recent history of every
//! registered metric. All mutation goes through [`ReadingStore::update`],
//! serialised under one write lock so readers never observe a torn state.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use obd_conv::MetricRegistry;
use obd_core::{
    FieldStats, Freshness, MetricId, Reading, TelemetryError, TelemetryResult, WindowMean,
};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::bus::FanoutBus;
use crate::config::StoreConfig;

/// Outcome of a store update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Recorded in history; `replaced_latest` is false when an invalid
    /// reading was kept out of `latest` by a fresh valid value
    Accepted { replaced_latest: bool },
    /// Older than the most recent reading of the metric; discarded
    OutOfOrder,
}

/// A reading together with its presentation freshness
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingView {
    #[serde(flatten)]
    pub reading: Reading,
    pub freshness: Freshness,
    pub age_ms: u64,
}

#[derive(Debug)]
struct MetricState {
    latest: Option<Reading>,
    history: VecDeque<Reading>,
    capacity: usize,
}

impl MetricState {
    fn new(capacity: usize) -> Self {
        Self {
            latest: None,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }
}

pub struct ReadingStore {
    states: RwLock<HashMap<MetricId, MetricState>>,
    bus: FanoutBus,
    freshness_threshold: Duration,
}

impl ReadingStore {
    /// One empty state per registered metric
    pub fn new(
        registry: &MetricRegistry,
        config: &StoreConfig,
        bus: FanoutBus,
    ) -> TelemetryResult<Self> {
        if let Some(unknown) = config.history.keys().find(|id| !registry.contains(id)) {
            return Err(TelemetryError::UnknownMetric(unknown.clone()));
        }

        let states = registry
            .ids()
            .map(|id| (id.clone(), MetricState::new(config.capacity_for(id).max(1))))
            .collect();

        Ok(Self {
            states: RwLock::new(states),
            bus,
            freshness_threshold: config.freshness_threshold(),
        })
    }

    pub fn freshness_threshold(&self) -> Duration {
        self.freshness_threshold
    }

    pub fn bus(&self) -> &FanoutBus {
        &self.bus
    }

    /// Record a reading
    ///
    /// The reading always lands in history unless it is out of order. It
    /// becomes `latest` unless it is invalid while the current latest is
    /// valid and fresh relative to the new reading's timestamp. Accepted
    /// readings are published to the bus.
    pub fn update(&self, reading: Reading) -> TelemetryResult<UpdateOutcome> {
        let replaced_latest = {
            let mut states = self.states.write();
            let state = states
                .get_mut(&reading.metric)
                .ok_or_else(|| TelemetryError::UnknownMetric(reading.metric.clone()))?;

            if let Some(newest) = state.history.back() {
                if reading.timestamp < newest.timestamp {
                    debug!(
                        metric = %reading.metric,
                        timestamp = %reading.timestamp,
                        newest = %newest.timestamp,
                        "Out-of-order reading discarded"
                    );
                    return Ok(UpdateOutcome::OutOfOrder);
                }
            }

            while state.history.len() >= state.capacity {
                state.history.pop_front();
            }
            state.history.push_back(reading.clone());

            let keep_current = !reading.is_valid()
                && state.latest.as_ref().is_some_and(|latest| {
                    latest.is_fresh_at(reading.timestamp, self.freshness_threshold)
                });
            if !keep_current {
                state.latest = Some(reading.clone());
            }

            // Published under the lock so per-metric delivery order matches store order
            self.bus.publish(&reading);
            !keep_current
        };

        Ok(UpdateOutcome::Accepted { replaced_latest })
    }

    pub fn latest(&self, id: &MetricId) -> TelemetryResult<Option<Reading>> {
        let states = self.states.read();
        let state = states
            .get(id)
            .ok_or_else(|| TelemetryError::UnknownMetric(id.clone()))?;
        Ok(state.latest.clone())
    }

    /// History of a metric, oldest first
    pub fn history(&self, id: &MetricId) -> TelemetryResult<Vec<Reading>> {
        let states = self.states.read();
        let state = states
            .get(id)
            .ok_or_else(|| TelemetryError::UnknownMetric(id.clone()))?;
        Ok(state.history.iter().cloned().collect())
    }

    /// Latest reading of every metric that has one
    pub fn snapshot(&self) -> BTreeMap<MetricId, Reading> {
        self.states
            .read()
            .iter()
            .filter_map(|(id, state)| state.latest.clone().map(|r| (id.clone(), r)))
            .collect()
    }

    /// Latest reading of a metric classified at `now`
    pub fn view(&self, id: &MetricId, now: DateTime<Utc>) -> TelemetryResult<Option<ReadingView>> {
        Ok(self.latest(id)?.map(|r| self.present(r, now)))
    }

    pub fn snapshot_view(&self, now: DateTime<Utc>) -> BTreeMap<MetricId, ReadingView> {
        self.snapshot()
            .into_iter()
            .map(|(id, r)| (id, self.present(r, now)))
            .collect()
    }

    /// Min/max/mean over the ok readings in a metric's history
    pub fn stats(&self, id: &MetricId) -> TelemetryResult<Option<FieldStats>> {
        let states = self.states.read();
        let state = states
            .get(id)
            .ok_or_else(|| TelemetryError::UnknownMetric(id.clone()))?;
        Ok(FieldStats::from_readings(id.clone(), state.history.iter()))
    }

    /// Windowed means over the ok readings in a metric's history
    pub fn aggregate(&self, id: &MetricId, window: Duration) -> TelemetryResult<Vec<WindowMean>> {
        if window.is_zero() {
            return Err(TelemetryError::InvalidArgument(
                "aggregation window must be greater than zero".to_string(),
            ));
        }
        let states = self.states.read();
        let state = states
            .get(id)
            .ok_or_else(|| TelemetryError::UnknownMetric(id.clone()))?;
        Ok(WindowMean::from_readings(state.history.iter(), window))
    }

    fn present(&self, reading: Reading, now: DateTime<Utc>) -> ReadingView {
        let freshness = reading.freshness(now, self.freshness_threshold);
        let age_ms = reading.age_at(now).as_millis() as u64;
        ReadingView {
            reading: reading.presented_at(now, self.freshness_threshold),
            freshness,
            age_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Filter;
    use chrono::TimeDelta;
    use obd_core::{Quality, ReadingValue};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn ok(metric: &str, value: f64, secs: i64) -> Reading {
        Reading::ok(metric.into(), ReadingValue::Number(value), at(secs))
    }

    fn store_with(capacity: usize) -> ReadingStore {
        let registry = MetricRegistry::standard().unwrap();
        let config = StoreConfig {
            history_capacity: capacity,
            freshness_threshold_ms: 10_000,
            ..StoreConfig::default()
        };
        ReadingStore::new(&registry, &config, FanoutBus::new(16)).unwrap()
    }

    #[test]
    fn test_unknown_metric() {
        let store = store_with(10);
        let err = store.update(ok("warp-drive", 1.0, 0)).unwrap_err();
        assert_eq!(err, TelemetryError::UnknownMetric("warp-drive".into()));
        assert!(store.latest(&"warp-drive".into()).is_err());
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let store = store_with(3);
        for i in 0..5 {
            store.update(ok("engine-rpm", 800.0 + i as f64, i)).unwrap();
        }

        let values: Vec<f64> = store
            .history(&"engine-rpm".into())
            .unwrap()
            .iter()
            .map(|r| r.value.as_ref().unwrap().as_f64())
            .collect();
        assert_eq!(values, vec![802.0, 803.0, 804.0]);
        assert_eq!(
            store.latest(&"engine-rpm".into()).unwrap().unwrap().value,
            Some(ReadingValue::Number(804.0))
        );
    }

    #[test]
    fn test_invalid_does_not_replace_fresh_valid() {
        let store = store_with(10);
        store.update(ok("coolant-temp", 85.0, 0)).unwrap();

        let outcome = store
            .update(Reading::invalid("coolant-temp".into(), "out of range", at(2)))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Accepted { replaced_latest: false });

        let latest = store.latest(&"coolant-temp".into()).unwrap().unwrap();
        assert_eq!(latest.value, Some(ReadingValue::Number(85.0)));
        assert_eq!(store.history(&"coolant-temp".into()).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_replaces_expired_valid() {
        let store = store_with(10);
        store.update(ok("coolant-temp", 85.0, 0)).unwrap();

        let outcome = store
            .update(Reading::invalid("coolant-temp".into(), "garbled", at(11)))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Accepted { replaced_latest: true });
        assert_eq!(
            store.latest(&"coolant-temp".into()).unwrap().unwrap().quality,
            Quality::Invalid
        );
    }

    #[test]
    fn test_out_of_order_rejected() {
        let store = store_with(10);
        store.update(ok("vehicle-speed", 50.0, 5)).unwrap();
        assert_eq!(
            store.update(ok("vehicle-speed", 40.0, 4)).unwrap(),
            UpdateOutcome::OutOfOrder
        );
        assert_eq!(store.history(&"vehicle-speed".into()).unwrap().len(), 1);

        // Equal timestamps are accepted
        assert!(matches!(
            store.update(ok("vehicle-speed", 51.0, 5)).unwrap(),
            UpdateOutcome::Accepted { .. }
        ));
    }

    #[test]
    fn test_snapshot_and_views() {
        let store = store_with(10);
        store.update(ok("engine-rpm", 800.0, 0)).unwrap();
        store.update(ok("vehicle-speed", 60.0, 20)).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.contains_key(&MetricId::new("maf")));

        let views = store.snapshot_view(at(25));
        let rpm = &views[&MetricId::new("engine-rpm")];
        assert_eq!(rpm.freshness, Freshness::Stale);
        assert_eq!(rpm.reading.quality, Quality::Stale);
        assert_eq!(rpm.age_ms, 25_000);
        assert_eq!(views[&MetricId::new("vehicle-speed")].freshness, Freshness::Live);

        // Stored quality is unchanged by presentation
        assert_eq!(store.latest(&"engine-rpm".into()).unwrap().unwrap().quality, Quality::Ok);
        assert!(store.view(&"maf".into(), at(25)).unwrap().is_none());
    }

    #[test]
    fn test_aggregate_windows_over_history() {
        let store = store_with(10);
        for (secs, value) in [(0, 10.0), (4, 30.0), (11, 50.0), (13, 70.0)] {
            store.update(ok("vehicle-speed", value, secs)).unwrap();
        }
        store
            .update(Reading::invalid("vehicle-speed".into(), "bad", at(14)))
            .unwrap();

        let means = store
            .aggregate(&"vehicle-speed".into(), Duration::from_secs(10))
            .unwrap();
        let values: Vec<(DateTime<Utc>, f64, usize)> =
            means.iter().map(|m| (m.time, m.value, m.count)).collect();
        assert_eq!(values, vec![(at(10), 20.0, 2), (at(20), 60.0, 2)]);

        assert!(store
            .aggregate(&"maf".into(), Duration::from_secs(10))
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.aggregate(&"vehicle-speed".into(), Duration::ZERO),
            Err(TelemetryError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.aggregate(&"warp-drive".into(), Duration::from_secs(10)),
            Err(TelemetryError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_stats_over_ok_history() {
        let store = store_with(10);
        store.update(ok("vehicle-speed", 10.0, 0)).unwrap();
        store.update(ok("vehicle-speed", 30.0, 1)).unwrap();
        store
            .update(Reading::invalid("vehicle-speed".into(), "bad", at(2)))
            .unwrap();

        let stats = store.stats(&"vehicle-speed".into()).unwrap().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.mean, 20.0);
        assert!(store.stats(&"maf".into()).unwrap().is_none());
    }

    #[test]
    fn test_accepted_readings_are_published() {
        let store = store_with(10);
        let mut sub = store.bus().subscribe(Filter::All);

        store.update(ok("maf", 4.0, 1)).unwrap();
        store.update(ok("maf", 3.0, 0)).unwrap();
        store
            .update(Reading::invalid("maf".into(), "garbled", at(1) + TimeDelta::milliseconds(500)))
            .unwrap();

        assert_eq!(sub.try_recv().unwrap().value, Some(ReadingValue::Number(4.0)));
        assert_eq!(sub.try_recv().unwrap().quality, Quality::Invalid);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_history_override_must_name_known_metric() {
        let registry = MetricRegistry::standard().unwrap();
        let mut config = StoreConfig::default();
        config.history.insert("flux-capacitor".into(), 5);
        assert!(matches!(
            ReadingStore::new(&registry, &config, FanoutBus::new(4)),
            Err(TelemetryError::UnknownMetric(_))
        ));
    }
}
