//! obd-conv - Metric registry and frame decoding for OBD-II telemetry
//!
//! # Features
//!
//! - **Closed set of decode rules** - linear scale/offset, bit masks, enum
//!   tables and byte-weighted formulas, selected per metric
//! - **Never-failing decoder** - malformed or implausible frames become
//!   readings with quality `invalid`
//! - **YAML catalogs** - metric definitions loaded once at startup
//! - **Precision-aware rounding** - no `1726.0000000001` RPM
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use obd_conv::{decode, MetricRegistry};
//! use obd_core::{Quality, RawFrame, ReadingValue};
//!
//! let registry = MetricRegistry::standard().unwrap();
//! let rpm = registry.describe(&"engine-rpm".into()).unwrap();
//!
//! let reading = decode(rpm, &RawFrame::Text("41 0C 1A F8".into()), Utc::now());
//! assert_eq!(reading.quality, Quality::Ok);
//! assert_eq!(reading.value, Some(ReadingValue::Number(1726.0)));
//!
//! let garbled = decode(rpm, &RawFrame::Text("41 0C 1".into()), Utc::now());
//! assert_eq!(garbled.quality, Quality::Invalid);
//! ```

pub mod catalog;
pub mod decode;
pub mod descriptor;
pub mod error;
pub mod precision;
pub mod registry;
pub mod rule;
pub mod types;

pub use decode::{decode, decode_value, frame_payload};
pub use descriptor::{MetricDescriptor, ValidRange};
pub use error::{DecodeError, DecodeResult};
pub use registry::{CatalogMeta, MetricRegistry};
pub use rule::DecodeRule;
pub use types::{ByteOrder, DataType};
