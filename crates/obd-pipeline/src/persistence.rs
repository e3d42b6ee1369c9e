//! Persistence recorder
//!
//! Pushes accepted readings to an external time-series sink. The recorder
//! is an ordinary bus subscriber, so a slow or failing sink only loses its
//! own oldest readings and never blocks polling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use obd_core::{MetricId, ReadingValue};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::Subscription;
use crate::config::PersistenceConfig;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Push interface of the time-series store
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record(
        &self,
        metric: &MetricId,
        value: &ReadingValue,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError>;

    fn name(&self) -> &str;
}

/// Discards everything
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn record(
        &self,
        _metric: &MetricId,
        _value: &ReadingValue,
        _timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// One line of the JSON lines sink
#[derive(Debug, Serialize)]
struct Point<'a> {
    measurement: &'static str,
    vehicle_id: &'a str,
    metric: &'a MetricId,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
    timestamp: DateTime<Utc>,
}

/// Append-only JSON lines file, one point per reading
pub struct JsonLinesSink {
    path: PathBuf,
    vehicle_id: String,
    file: Mutex<tokio::fs::File>,
}

impl JsonLinesSink {
    pub async fn open(path: impl AsRef<Path>, vehicle_id: impl Into<String>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            vehicle_id: vehicle_id.into(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceSink for JsonLinesSink {
    async fn record(
        &self,
        metric: &MetricId,
        value: &ReadingValue,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let point = Point {
            measurement: "obd_readings",
            vehicle_id: &self.vehicle_id,
            metric,
            value: value.as_f64(),
            label: value.label(),
            timestamp,
        };
        let mut line = serde_json::to_vec(&point)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

/// Build the sink selected in configuration
pub async fn create_sink(
    config: &PersistenceConfig,
    vehicle_id: &str,
) -> Result<Arc<dyn PersistenceSink>, SinkError> {
    match config {
        PersistenceConfig::None => Ok(Arc::new(NullSink)),
        PersistenceConfig::JsonLines { path } => {
            let sink = JsonLinesSink::open(path, vehicle_id).await?;
            info!(path = %path.display(), "Recording readings to JSON lines file");
            Ok(Arc::new(sink))
        }
    }
}

/// Forward every valid reading from `subscription` to `sink` until the bus closes
pub fn spawn_recorder(sink: Arc<dyn PersistenceSink>, mut subscription: Subscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(sink = sink.name(), "Persistence recorder started");
        let mut recorded = 0u64;

        while let Some(reading) = subscription.recv().await {
            if !reading.is_valid() {
                continue;
            }
            let Some(value) = reading.value.as_ref() else {
                continue;
            };
            match sink.record(&reading.metric, value, reading.timestamp).await {
                Ok(()) => recorded += 1,
                Err(e) => warn!(
                    sink = sink.name(),
                    metric = %reading.metric,
                    error = %e,
                    "Persistence write failed"
                ),
            }
        }

        info!(
            sink = sink.name(),
            recorded,
            dropped = subscription.overruns(),
            "Persistence recorder stopped"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{FanoutBus, Filter};
    use obd_core::Reading;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySink {
        points: SyncMutex<Vec<(MetricId, f64)>>,
        fail: bool,
    }

    #[async_trait]
    impl PersistenceSink for MemorySink {
        async fn record(
            &self,
            metric: &MetricId,
            value: &ReadingValue,
            _timestamp: DateTime<Utc>,
        ) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Io(std::io::Error::other("disk full")));
            }
            self.points.lock().push((metric.clone(), value.as_f64()));
            Ok(())
        }

        fn name(&self) -> &str {
            "memory"
        }
    }

    fn ok(metric: &str, value: f64) -> Reading {
        Reading::ok(metric.into(), ReadingValue::Number(value), Utc::now())
    }

    #[tokio::test]
    async fn test_recorder_skips_invalid_readings() {
        let bus = FanoutBus::new(16);
        let sink = Arc::new(MemorySink::default());
        let handle = spawn_recorder(sink.clone(), bus.subscribe(Filter::All));

        bus.publish(&ok("engine-rpm", 800.0));
        bus.publish(&Reading::invalid("engine-rpm".into(), "garbled", Utc::now()));
        bus.publish(&ok("maf", 4.5));
        tokio::time::sleep(Duration::from_millis(50)).await;

        bus.close();
        handle.await.unwrap();
        assert_eq!(
            *sink.points.lock(),
            vec![(MetricId::new("engine-rpm"), 800.0), (MetricId::new("maf"), 4.5)]
        );
    }

    #[tokio::test]
    async fn test_sink_failures_do_not_stop_recorder() {
        let bus = FanoutBus::new(16);
        let sink = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let handle = spawn_recorder(sink, bus.subscribe(Filter::All));

        bus.publish(&ok("engine-rpm", 800.0));
        bus.publish(&ok("engine-rpm", 900.0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        bus.close();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_json_lines_sink_writes_one_line_per_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.jsonl");
        let sink = JsonLinesSink::open(&path, "vehicle_001").await.unwrap();

        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        sink.record(&"coolant-temp".into(), &ReadingValue::Number(88.0), ts)
            .await
            .unwrap();
        sink.record(
            &"mil-status".into(),
            &ReadingValue::Enumerated {
                raw: 1,
                label: Some("on".into()),
            },
            ts,
        )
        .await
        .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["measurement"], "obd_readings");
        assert_eq!(lines[0]["vehicle_id"], "vehicle_001");
        assert_eq!(lines[0]["metric"], "coolant-temp");
        assert_eq!(lines[0]["value"], 88.0);
        assert!(lines[0].get("label").is_none());
        assert_eq!(lines[1]["label"], "on");
        assert_eq!(lines[1]["value"], 1.0);
    }
}
