//! Built-in catalog of standard Mode 01 parameters
//!
//! Covers the values shown by the dashboard: engine, temperatures, fuel
//! system, air intake, electrical, motion and MIL/DTC status.

use obd_core::{Pid, TelemetryResult};

use crate::descriptor::{MetricDescriptor, ValidRange};
use crate::registry::{CatalogMeta, MetricRegistry};
use crate::rule::DecodeRule;
use crate::types::DataType;

const PERCENT: f64 = 100.0 / 255.0;

fn percent(id: &str, name: &str, pid: u8, interval_ms: u64) -> MetricDescriptor {
    MetricDescriptor::new(
        id,
        name,
        Pid::current(pid),
        DecodeRule::linear(DataType::Uint8, PERCENT, 0.0),
        ValidRange::new(0.0, 100.0),
    )
    .with_unit("%")
    .with_precision(2)
    .with_interval_ms(interval_ms)
}

fn temperature(id: &str, name: &str, pid: u8, interval_ms: u64) -> MetricDescriptor {
    MetricDescriptor::new(
        id,
        name,
        Pid::current(pid),
        DecodeRule::linear(DataType::Uint8, 1.0, -40.0),
        ValidRange::new(-40.0, 215.0),
    )
    .with_unit("°C")
    .with_interval_ms(interval_ms)
}

#[allow(clippy::too_many_arguments)]
fn scaled(
    id: &str,
    name: &str,
    pid: u8,
    data_type: DataType,
    scale: f64,
    max: f64,
    unit: &str,
    interval_ms: u64,
) -> MetricDescriptor {
    MetricDescriptor::new(
        id,
        name,
        Pid::current(pid),
        DecodeRule::linear(data_type, scale, 0.0),
        ValidRange::new(0.0, max),
    )
    .with_unit(unit)
    .with_interval_ms(interval_ms)
}

/// Descriptors of the standard catalog
pub fn standard_descriptors() -> Vec<MetricDescriptor> {
    vec![
        // Engine
        scaled("engine-rpm", "Engine RPM", 0x0C, DataType::Uint16, 0.25, 16383.75, "rpm", 500),
        percent("engine-load", "Engine Load", 0x04, 1000),
        scaled("engine-runtime", "Engine Runtime", 0x1F, DataType::Uint16, 1.0, 65535.0, "s", 5000),
        // Motion
        scaled("vehicle-speed", "Vehicle Speed", 0x0D, DataType::Uint8, 1.0, 255.0, "km/h", 500),
        percent("throttle-position", "Throttle Position", 0x11, 500),
        scaled(
            "distance-since-clear",
            "Distance Since Codes Cleared",
            0x31,
            DataType::Uint16,
            1.0,
            65535.0,
            "km",
            30000,
        ),
        // Temperatures
        temperature("coolant-temp", "Coolant Temperature", 0x05, 2000),
        temperature("intake-temp", "Intake Air Temperature", 0x0F, 2000),
        temperature("oil-temp", "Engine Oil Temperature", 0x5C, 5000),
        temperature("ambient-temp", "Ambient Air Temperature", 0x46, 10000),
        // Fuel system
        percent("fuel-level", "Fuel Level", 0x2F, 10000),
        scaled("fuel-pressure", "Fuel Pressure", 0x0A, DataType::Uint8, 3.0, 765.0, "kPa", 2000),
        scaled("fuel-rate", "Engine Fuel Rate", 0x5E, DataType::Uint16, 0.05, 3276.75, "L/h", 1000),
        MetricDescriptor::new(
            "fuel-system-status",
            "Fuel System Status",
            Pid::current(0x03),
            DecodeRule::enumeration([
                (1, "open_loop_cold"),
                (2, "closed_loop"),
                (4, "open_loop_load"),
                (8, "open_loop_failure"),
                (16, "closed_loop_fault"),
            ]),
            ValidRange::new(0.0, 16.0),
        )
        .with_interval_ms(5000),
        MetricDescriptor::new(
            "short-term-fuel-trim",
            "Short Term Fuel Trim (Bank 1)",
            Pid::current(0x06),
            DecodeRule::formula([100.0 / 128.0], -100.0),
            ValidRange::new(-100.0, 99.22),
        )
        .with_unit("%")
        .with_precision(2)
        .with_interval_ms(1000),
        // Air intake
        scaled("maf", "Mass Air Flow", 0x10, DataType::Uint16, 0.01, 655.35, "g/s", 1000),
        scaled("intake-pressure", "Intake Manifold Pressure", 0x0B, DataType::Uint8, 1.0, 255.0, "kPa", 1000),
        scaled("barometric-pressure", "Barometric Pressure", 0x33, DataType::Uint8, 1.0, 255.0, "kPa", 30000),
        // Electrical
        scaled(
            "control-module-voltage",
            "Control Module Voltage",
            0x42,
            DataType::Uint16,
            0.001,
            65.535,
            "V",
            5000,
        ),
        // Diagnostics (PID 01: bit 7 of A is the MIL, bits 0-6 the DTC count)
        MetricDescriptor::new(
            "mil-status",
            "Check Engine Light",
            Pid::current(0x01),
            DecodeRule::bit_mask(0x80, 7).with_labels([(0, "off"), (1, "on")]),
            ValidRange::new(0.0, 1.0),
        )
        .with_interval_ms(5000),
        MetricDescriptor::new(
            "dtc-count",
            "Stored DTC Count",
            Pid::current(0x01),
            DecodeRule::bit_mask(0x7F, 0),
            ValidRange::new(0.0, 127.0),
        )
        .with_interval_ms(5000),
    ]
}

impl MetricRegistry {
    /// Registry with the built-in standard catalog
    pub fn standard() -> TelemetryResult<Self> {
        let meta = CatalogMeta {
            name: Some("Standard OBD-II".to_string()),
            version: Some("1.0".to_string()),
            description: Some("SAE J1979 Mode 01 parameters".to_string()),
        };
        MetricRegistry::from_descriptors(meta, standard_descriptors())
    }
}
