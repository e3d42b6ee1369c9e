//! Decode rules
//!
//! A closed set of strategies selected per metric by its descriptor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::precision::precision_from_scale;
use crate::types::{ByteOrder, DataType};

/// How the data bytes of a response become a physical value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeRule {
    /// `physical = raw * scale + offset`
    Linear {
        #[serde(rename = "type", default)]
        data_type: DataType,
        #[serde(default)]
        byte_order: ByteOrder,
        /// Index of the first data byte (0 = "A")
        #[serde(default)]
        byte_offset: usize,
        #[serde(default = "default_scale")]
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
    /// `(raw & mask) >> shift`, optionally labelled
    BitMask {
        #[serde(rename = "type", default)]
        data_type: DataType,
        #[serde(default)]
        byte_offset: usize,
        mask: u32,
        #[serde(default)]
        shift: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        labels: Option<BTreeMap<u32, String>>,
    },
    /// Table lookup; raw values missing from the table are invalid
    Enum {
        #[serde(rename = "type", default)]
        data_type: DataType,
        #[serde(default)]
        byte_offset: usize,
        labels: BTreeMap<u32, String>,
    },
    /// `sum(weights[i] * byte[i]) + offset` over the data bytes A, B, C...
    Formula {
        weights: Vec<f64>,
        #[serde(default)]
        offset: f64,
    },
}

fn default_scale() -> f64 {
    1.0
}

impl DecodeRule {
    /// Unsigned byte scaled and offset, the most common Mode 01 layout
    pub fn linear(data_type: DataType, scale: f64, offset: f64) -> Self {
        DecodeRule::Linear {
            data_type,
            byte_order: ByteOrder::Big,
            byte_offset: 0,
            scale,
            offset,
        }
    }

    pub fn bit_mask(mask: u32, shift: u8) -> Self {
        DecodeRule::BitMask {
            data_type: DataType::Uint8,
            byte_offset: 0,
            mask,
            shift,
            labels: None,
        }
    }

    pub fn enumeration<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        DecodeRule::Enum {
            data_type: DataType::Uint8,
            byte_offset: 0,
            labels: labels.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }

    pub fn formula(weights: impl Into<Vec<f64>>, offset: f64) -> Self {
        DecodeRule::Formula {
            weights: weights.into(),
            offset,
        }
    }

    /// Attach labels to a bit-mask rule; other rules are returned unchanged
    pub fn with_labels<I, S>(self, new_labels: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        match self {
            DecodeRule::BitMask {
                data_type,
                byte_offset,
                mask,
                shift,
                ..
            } => DecodeRule::BitMask {
                data_type,
                byte_offset,
                mask,
                shift,
                labels: Some(new_labels.into_iter().map(|(k, v)| (k, v.into())).collect()),
            },
            other => other,
        }
    }

    /// Number of data bytes (after service and PID echo) the rule reads
    pub fn required_len(&self) -> usize {
        match self {
            DecodeRule::Linear {
                data_type,
                byte_offset,
                ..
            }
            | DecodeRule::BitMask {
                data_type,
                byte_offset,
                ..
            }
            | DecodeRule::Enum {
                data_type,
                byte_offset,
                ..
            } => byte_offset + data_type.byte_size(),
            DecodeRule::Formula { weights, .. } => weights.len(),
        }
    }

    /// Decimal places implied by the rule's arithmetic
    pub fn precision(&self) -> u8 {
        match self {
            DecodeRule::Linear { scale, offset, .. } => {
                precision_from_scale(*scale).max(precision_from_scale(*offset))
            }
            DecodeRule::Formula { weights, offset } => weights
                .iter()
                .chain(std::iter::once(offset))
                .map(|w| precision_from_scale(*w))
                .max()
                .unwrap_or(0),
            DecodeRule::BitMask { .. } | DecodeRule::Enum { .. } => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DecodeRule::Linear { .. } => "linear",
            DecodeRule::BitMask { .. } => "bit_mask",
            DecodeRule::Enum { .. } => "enum",
            DecodeRule::Formula { .. } => "formula",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_len() {
        assert_eq!(DecodeRule::linear(DataType::Uint16, 0.25, 0.0).required_len(), 2);
        assert_eq!(DecodeRule::bit_mask(0x80, 7).required_len(), 1);
        assert_eq!(DecodeRule::formula([64.0, 0.25], 0.0).required_len(), 2);
    }

    #[test]
    fn test_precision() {
        assert_eq!(DecodeRule::linear(DataType::Uint16, 0.25, 0.0).precision(), 2);
        assert_eq!(DecodeRule::linear(DataType::Uint8, 1.0, -40.0).precision(), 0);
        assert_eq!(DecodeRule::formula([0.256, 0.001], 0.0).precision(), 3);
    }

    #[test]
    fn test_rule_from_yaml() {
        let yaml = r#"
kind: bit_mask
mask: 0x80
shift: 7
labels:
  0: "off"
  1: "on"
"#;
        let rule: DecodeRule = serde_yaml::from_str(yaml).unwrap();
        match rule {
            DecodeRule::BitMask {
                mask,
                shift,
                labels,
                ..
            } => {
                assert_eq!(mask, 0x80);
                assert_eq!(shift, 7);
                assert_eq!(labels.unwrap().get(&1).map(String::as_str), Some("on"));
            }
            other => panic!("Expected BitMask, got {:?}", other),
        }
    }
}
