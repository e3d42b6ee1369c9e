//! Pipeline configuration
//!
//! Every field has a default so an empty TOML document is a runnable
//! configuration (simulated vehicle, standard catalog, no persistence).
//! Durations are expressed in milliseconds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use obd_core::MetricId;
use serde::{Deserialize, Serialize};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Tag attached to persisted readings
    #[serde(default = "default_vehicle_id")]
    pub vehicle_id: String,
    /// Metric catalog (YAML); the built-in catalog when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PathBuf>,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_vehicle_id() -> String {
    "vehicle_001".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vehicle_id: default_vehicle_id(),
            metrics: None,
            link: LinkConfig::default(),
            reconnect: ReconnectConfig::default(),
            polling: PollingConfig::default(),
            store: StoreConfig::default(),
            bus: BusConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

// =============================================================================
// Link Configuration
// =============================================================================

/// Vehicle link selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkConfig {
    /// ELM327 interpreter over TCP (Wi-Fi dongles)
    Elm327(Elm327Config),
    /// Simulated vehicle
    Mock(MockConfig),
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// ELM327 over TCP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Elm327Config {
    pub host: String,
    #[serde(default = "default_elm_port")]
    pub port: u16,
    /// Socket connect and adapter initialisation timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_elm_port() -> u16 {
    35000
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Elm327Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Simulated vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated response latency
    #[serde(default = "default_mock_latency")]
    pub latency_ms: u64,
    /// Seed for the value random walk; entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_mock_latency() -> u64 {
    20
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_mock_latency(),
            seed: None,
        }
    }
}

// =============================================================================
// Supervisor / Scheduler
// =============================================================================

/// Reconnect policy of the connection supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Relative jitter applied to each delay, 0.0 to 1.0
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter: default_jitter(),
        }
    }
}

impl ReconnectConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Poll scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Per-request deadline on the link
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Upper bound of the per-metric failure backoff
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Poll interval overrides by metric id
    #[serde(default)]
    pub intervals: HashMap<MetricId, u64>,
}

fn default_request_timeout() -> u64 {
    1000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            max_backoff_ms: default_max_backoff(),
            intervals: HashMap::new(),
        }
    }
}

impl PollingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Store / Bus / Persistence
// =============================================================================

/// Reading store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// History entries kept per metric
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// History capacity overrides by metric id
    #[serde(default)]
    pub history: HashMap<MetricId, usize>,
    /// Age after which the latest value is presented as stale
    #[serde(default = "default_freshness_threshold")]
    pub freshness_threshold_ms: u64,
}

fn default_history_capacity() -> usize {
    300
}

fn default_freshness_threshold() -> u64 {
    10_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            history: HashMap::new(),
            freshness_threshold_ms: default_freshness_threshold(),
        }
    }
}

impl StoreConfig {
    pub fn freshness_threshold(&self) -> Duration {
        Duration::from_millis(self.freshness_threshold_ms)
    }

    /// History capacity for one metric
    pub fn capacity_for(&self, id: &MetricId) -> usize {
        self.history
            .get(id)
            .copied()
            .unwrap_or(self.history_capacity)
    }
}

/// Fan-out bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Pending readings per subscription before overrun
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Persistence sink selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PersistenceConfig {
    #[default]
    None,
    /// Append-only JSON lines file
    #[serde(rename = "jsonl")]
    JsonLines { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.vehicle_id, "vehicle_001");
        assert!(matches!(config.link, LinkConfig::Mock(_)));
        assert!(matches!(config.persistence, PersistenceConfig::None));
        assert_eq!(config.polling.request_timeout(), Duration::from_secs(1));
        assert_eq!(config.store.history_capacity, 300);
        assert_eq!(config.bus.queue_capacity, 64);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            vehicle_id = "van-7"

            [link]
            type = "elm327"
            host = "192.168.0.10"

            [reconnect]
            initial_backoff_ms = 250
            jitter = 0.0

            [polling]
            request_timeout_ms = 400

            [polling.intervals]
            engine-rpm = 200
            fuel-level = 5000

            [store]
            history_capacity = 50
            freshness_threshold_ms = 3000

            [store.history]
            engine-rpm = 600

            [bus]
            queue_capacity = 16

            [persistence]
            type = "jsonl"
            path = "/tmp/readings.jsonl"
        "#;

        let config: PipelineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.vehicle_id, "van-7");
        match &config.link {
            LinkConfig::Elm327(elm) => {
                assert_eq!(elm.host, "192.168.0.10");
                assert_eq!(elm.port, 35000);
            }
            other => panic!("unexpected link {:?}", other),
        }
        assert_eq!(config.reconnect.initial_backoff(), Duration::from_millis(250));
        assert_eq!(config.reconnect.max_backoff_ms, 30_000);
        assert_eq!(config.polling.intervals[&MetricId::new("engine-rpm")], 200);
        assert_eq!(config.store.capacity_for(&MetricId::new("engine-rpm")), 600);
        assert_eq!(config.store.capacity_for(&MetricId::new("maf")), 50);
        assert_eq!(config.store.freshness_threshold(), Duration::from_secs(3));
        assert_eq!(config.bus.queue_capacity, 16);
        assert!(matches!(
            config.persistence,
            PersistenceConfig::JsonLines { ref path } if path == std::path::Path::new("/tmp/readings.jsonl")
        ));
    }

    #[test]
    fn test_invalid_config() {
        let err = toml::from_str::<PipelineConfig>("[link]\ntype = \"carrier-pigeon\"").unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }
}
