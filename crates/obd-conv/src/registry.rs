//! Metric registry - the static catalog of known parameters
//!
//! Built once at startup (from the standard catalog or a YAML file) and
//! immutable afterwards, so it is shared as a plain `Arc` without locking.

use std::collections::HashMap;
use std::path::Path;

use obd_core::{MetricId, TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};

use crate::descriptor::MetricDescriptor;
use crate::rule::DecodeRule;

/// Metadata about a catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Catalog file format
///
/// ```yaml
/// meta:
///   name: Standard OBD-II
///   version: "1.0"
///
/// metrics:
///   - id: coolant-temp
///     name: Coolant Temperature
///     pid: "0105"
///     unit: °C
///     range: { min: -40, max: 215 }
///     interval_ms: 2000
///     rule:
///       kind: linear
///       type: uint8
///       offset: -40
/// ```
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    meta: CatalogMeta,
    metrics: Vec<MetricDescriptor>,
}

/// Immutable catalog of metric descriptors
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    meta: CatalogMeta,
    /// Sorted by id
    descriptors: Vec<MetricDescriptor>,
    index: HashMap<MetricId, usize>,
}

impl MetricRegistry {
    /// Build a registry, validating every descriptor
    pub fn from_descriptors(
        meta: CatalogMeta,
        mut descriptors: Vec<MetricDescriptor>,
    ) -> TelemetryResult<Self> {
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));

        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, desc) in descriptors.iter().enumerate() {
            validate(desc)?;
            if index.insert(desc.id.clone(), i).is_some() {
                return Err(TelemetryError::DuplicateMetric(desc.id.clone()));
            }
        }

        Ok(Self {
            meta,
            descriptors,
            index,
        })
    }

    /// Load a catalog from a YAML string
    pub fn from_yaml(yaml: &str) -> TelemetryResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)
            .map_err(|e| TelemetryError::Config(format!("invalid metric catalog: {}", e)))?;
        Self::from_descriptors(file.meta, file.metrics)
    }

    /// Load a catalog from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> TelemetryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Look up a descriptor
    pub fn describe(&self, id: &MetricId) -> TelemetryResult<&MetricDescriptor> {
        self.index
            .get(id)
            .map(|&i| &self.descriptors[i])
            .ok_or_else(|| TelemetryError::UnknownMetric(id.clone()))
    }

    /// All descriptors in ascending id order
    pub fn all(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    pub fn ids(&self) -> impl Iterator<Item = &MetricId> {
        self.descriptors.iter().map(|d| &d.id)
    }

    pub fn contains(&self, id: &MetricId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn meta(&self) -> &CatalogMeta {
        &self.meta
    }

    /// Apply per-metric poll interval overrides (milliseconds)
    ///
    /// Every id must exist; a typo in configuration is a startup error.
    pub fn with_intervals(mut self, overrides: &HashMap<MetricId, u64>) -> TelemetryResult<Self> {
        for (id, &interval_ms) in overrides {
            let i = *self
                .index
                .get(id)
                .ok_or_else(|| TelemetryError::UnknownMetric(id.clone()))?;
            if interval_ms == 0 {
                return Err(TelemetryError::Config(format!(
                    "poll interval for {} must be greater than zero",
                    id
                )));
            }
            self.descriptors[i].interval_ms = interval_ms;
        }
        Ok(self)
    }
}

fn validate(desc: &MetricDescriptor) -> TelemetryResult<()> {
    let fail = |msg: &str| Err(TelemetryError::Config(format!("metric {}: {}", desc.id, msg)));

    if desc.id.as_str().is_empty() {
        return Err(TelemetryError::Config("metric with empty id".to_string()));
    }
    if desc.interval_ms == 0 {
        return fail("poll interval must be greater than zero");
    }
    if !(desc.range.min <= desc.range.max) {
        return fail("range min must not exceed max");
    }
    match &desc.rule {
        DecodeRule::Enum { labels, .. } if labels.is_empty() => fail("enum table is empty"),
        DecodeRule::Formula { weights, .. } if weights.is_empty() => fail("formula has no weights"),
        DecodeRule::Linear { scale, .. } if *scale == 0.0 => fail("linear scale is zero"),
        DecodeRule::BitMask { mask: 0, .. } => fail("bit mask is zero"),
        DecodeRule::BitMask { shift, .. } if *shift >= 32 => fail("bit shift must be below 32"),
        DecodeRule::BitMask { data_type, .. } | DecodeRule::Enum { data_type, .. }
            if data_type.is_signed() =>
        {
            fail("bit mask and enum rules need an unsigned type")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ValidRange;
    use crate::types::DataType;
    use obd_core::Pid;

    fn speed() -> MetricDescriptor {
        MetricDescriptor::new(
            "vehicle-speed",
            "Vehicle Speed",
            Pid::current(0x0D),
            DecodeRule::linear(DataType::Uint8, 1.0, 0.0),
            ValidRange::new(0.0, 255.0),
        )
    }

    #[test]
    fn test_describe_unknown() {
        let registry = MetricRegistry::from_descriptors(CatalogMeta::default(), vec![speed()]).unwrap();
        assert!(registry.describe(&"vehicle-speed".into()).is_ok());
        assert_eq!(
            registry.describe(&"warp-drive".into()).unwrap_err(),
            TelemetryError::UnknownMetric("warp-drive".into())
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = MetricRegistry::from_descriptors(CatalogMeta::default(), vec![speed(), speed()])
            .unwrap_err();
        assert_eq!(err, TelemetryError::DuplicateMetric("vehicle-speed".into()));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = MetricRegistry::from_descriptors(
            CatalogMeta::default(),
            vec![speed().with_interval_ms(0)],
        )
        .unwrap_err();
        assert!(matches!(err, TelemetryError::Config(_)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut desc = speed();
        desc.range = ValidRange::new(10.0, 0.0);
        assert!(MetricRegistry::from_descriptors(CatalogMeta::default(), vec![desc]).is_err());
    }

    fn mil(rule: DecodeRule) -> MetricDescriptor {
        MetricDescriptor::new(
            "mil-status",
            "Check Engine Light",
            Pid::current(0x01),
            rule,
            ValidRange::new(0.0, 1.0),
        )
    }

    #[test]
    fn test_bit_mask_rules_validated() {
        let yaml = r#"
metrics:
  - id: mil-status
    name: Check Engine Light
    pid: "0101"
    range: { min: 0, max: 1 }
    rule: { kind: bit_mask, mask: 128, shift: 40 }
"#;
        let err = MetricRegistry::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TelemetryError::Config(ref m) if m.contains("shift")));

        let zero_mask = DecodeRule::BitMask {
            data_type: DataType::Uint8,
            byte_offset: 0,
            mask: 0,
            shift: 0,
            labels: None,
        };
        let err = MetricRegistry::from_descriptors(CatalogMeta::default(), vec![mil(zero_mask)])
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Config(ref m) if m.contains("mask is zero")));

        let signed = DecodeRule::BitMask {
            data_type: DataType::Int8,
            byte_offset: 0,
            mask: 0x80,
            shift: 7,
            labels: None,
        };
        let err = MetricRegistry::from_descriptors(CatalogMeta::default(), vec![mil(signed)])
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Config(ref m) if m.contains("unsigned")));

        let widest = DecodeRule::BitMask {
            data_type: DataType::Uint32,
            byte_offset: 0,
            mask: 0x8000_0000,
            shift: 31,
            labels: None,
        };
        assert!(MetricRegistry::from_descriptors(CatalogMeta::default(), vec![mil(widest)]).is_ok());
    }

    #[test]
    fn test_interval_overrides() {
        let registry = MetricRegistry::from_descriptors(CatalogMeta::default(), vec![speed()]).unwrap();

        let overrides = HashMap::from([(MetricId::from("vehicle-speed"), 250)]);
        let registry = registry.with_intervals(&overrides).unwrap();
        assert_eq!(registry.describe(&"vehicle-speed".into()).unwrap().interval_ms, 250);

        let bad = HashMap::from([(MetricId::from("nope"), 250)]);
        assert_eq!(
            registry.with_intervals(&bad).unwrap_err(),
            TelemetryError::UnknownMetric("nope".into())
        );
    }
}
