//! Catalog loading from YAML files and decoding against loaded descriptors

use std::io::Write;

use chrono::Utc;
use obd_conv::{decode, DecodeRule, MetricRegistry};
use obd_core::{Pid, Quality, RawFrame, ReadingValue, TelemetryError};
use pretty_assertions::assert_eq;

const CATALOG: &str = r#"
meta:
  name: Test Vehicle
  version: "2.1"

metrics:
  - id: coolant-temp
    name: Coolant Temperature
    pid: "0105"
    unit: °C
    range: { min: -40, max: 215 }
    interval_ms: 2000
    rule:
      kind: linear
      type: uint8
      offset: -40

  - id: engine-rpm
    name: Engine RPM
    pid: "010C"
    unit: rpm
    range: { min: 0, max: 16383.75 }
    interval_ms: 250
    rule:
      kind: formula
      weights: [64, 0.25]

  - id: mil-status
    name: Check Engine Light
    pid: "0101"
    range: { min: 0, max: 1 }
    rule:
      kind: bit_mask
      mask: 128
      shift: 7
      labels:
        0: "off"
        1: "on"
"#;

#[test]
fn test_load_catalog_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CATALOG.as_bytes()).unwrap();

    let registry = MetricRegistry::from_file(file.path()).unwrap();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.meta().name.as_deref(), Some("Test Vehicle"));

    let ids: Vec<&str> = registry.all().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["coolant-temp", "engine-rpm", "mil-status"]);

    let rpm = registry.describe(&"engine-rpm".into()).unwrap();
    assert_eq!(rpm.pid, Pid::current(0x0C));
    assert_eq!(rpm.interval_ms, 250);
    assert_eq!(rpm.rule, DecodeRule::formula([64.0, 0.25], 0.0));

    // Default interval applies when omitted
    assert_eq!(registry.describe(&"mil-status".into()).unwrap().interval_ms, 1000);
}

#[test]
fn test_decode_with_loaded_catalog() {
    let registry = MetricRegistry::from_yaml(CATALOG).unwrap();
    let now = Utc::now();

    let rpm = registry.describe(&"engine-rpm".into()).unwrap();
    let reading = decode(rpm, &RawFrame::Text("41 0C 0B B8".to_string()), now);
    assert_eq!(reading.value, Some(ReadingValue::Number(750.0)));
    assert_eq!(reading.timestamp, now);

    let mil = registry.describe(&"mil-status".into()).unwrap();
    let reading = decode(mil, &RawFrame::Bytes(vec![0x41, 0x01, 0x00, 0x07, 0xE5, 0x00]), now);
    assert_eq!(reading.quality, Quality::Ok);
    assert_eq!(reading.value.unwrap().label(), Some("off"));
}

#[test]
fn test_invalid_catalog_is_config_error() {
    let err = MetricRegistry::from_yaml("metrics: [ { id: x } ]").unwrap_err();
    assert!(matches!(err, TelemetryError::Config(_)));

    let err = MetricRegistry::from_file("/nonexistent/catalog.yaml").unwrap_err();
    assert!(matches!(err, TelemetryError::Config(_)));
}

#[test]
fn test_standard_scenarios() {
    let registry = MetricRegistry::standard().unwrap();
    let now = Utc::now();

    let cases = [
        ("coolant-temp", vec![0x41, 0x05, 0x7B], 83.0),
        ("vehicle-speed", vec![0x41, 0x0D, 0x3C], 60.0),
        ("throttle-position", vec![0x41, 0x11, 0xFF], 100.0),
        ("control-module-voltage", vec![0x41, 0x42, 0x36, 0xB0], 14.0),
        ("maf", vec![0x41, 0x10, 0x03, 0xE8], 10.0),
        ("fuel-pressure", vec![0x41, 0x0A, 0x64], 300.0),
    ];

    for (id, bytes, expected) in cases {
        let desc = registry.describe(&id.into()).unwrap();
        let reading = decode(desc, &RawFrame::Bytes(bytes), now);
        assert_eq!(reading.value, Some(ReadingValue::Number(expected)), "metric {}", id);
    }
}
