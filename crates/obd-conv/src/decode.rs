//! Decoding raw frames to readings
//!
//! [`decode`] never fails: a bad frame yields a reading with quality
//! `invalid` so that one garbled response cannot halt the pipeline.

use chrono::{DateTime, Utc};
use obd_core::{Pid, RawFrame, Reading, ReadingValue};

use crate::descriptor::MetricDescriptor;
use crate::error::{DecodeError, DecodeResult};
use crate::precision::round_to_precision;
use crate::rule::DecodeRule;
use crate::types::{ByteOrder, DataType};

/// Negative response service identifier
const NEGATIVE_RESPONSE: u8 = 0x7F;

/// Decode a raw frame into a reading stamped with `timestamp`
pub fn decode(descriptor: &MetricDescriptor, frame: &RawFrame, timestamp: DateTime<Utc>) -> Reading {
    match decode_value(descriptor, frame) {
        Ok(value) => Reading::ok(descriptor.id.clone(), value, timestamp),
        Err(e) => Reading::invalid(descriptor.id.clone(), e.to_string(), timestamp),
    }
}

/// Decode a raw frame into a validated value
pub fn decode_value(descriptor: &MetricDescriptor, frame: &RawFrame) -> DecodeResult<ReadingValue> {
    let payload = frame_payload(frame)?;
    let data = strip_header(descriptor.pid, &payload)?;
    let value = apply_rule(&descriptor.rule, data, descriptor.effective_precision())?;

    let numeric = value.as_f64();
    if !numeric.is_finite() || !descriptor.range.contains(numeric) {
        return Err(DecodeError::OutOfRange {
            value: numeric,
            min: descriptor.range.min,
            max: descriptor.range.max,
        });
    }

    Ok(value)
}

/// Extract the binary payload of a frame
///
/// Text frames are ELM327 responses: hex pairs separated by spaces, one
/// line per responding ECU, possibly preceded by `SEARCHING...` and
/// followed by the `>` prompt. The first response line is used.
pub fn frame_payload(frame: &RawFrame) -> DecodeResult<Vec<u8>> {
    match frame {
        RawFrame::Bytes(bytes) if bytes.is_empty() => Err(DecodeError::Empty),
        RawFrame::Bytes(bytes) => Ok(bytes.clone()),
        RawFrame::Text(text) => {
            let line = text
                .split(['\r', '\n'])
                .map(|l| l.trim().trim_end_matches('>').trim())
                .find(|l| !l.is_empty() && !l.starts_with("SEARCHING"))
                .ok_or(DecodeError::Empty)?;

            let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            if compact.len() % 2 != 0 {
                return Err(DecodeError::Malformed(line.to_string()));
            }
            hex::decode(&compact).map_err(|_| DecodeError::Malformed(line.to_string()))
        }
    }
}

/// Check the response header and return the data bytes after the PID echo
fn strip_header(pid: Pid, payload: &[u8]) -> DecodeResult<&[u8]> {
    let (&service, rest) = payload.split_first().ok_or(DecodeError::Empty)?;

    if service == NEGATIVE_RESPONSE {
        return Err(DecodeError::NegativeResponse {
            service: rest.first().copied().unwrap_or(pid.service),
            nrc: rest.get(1).copied().unwrap_or(0),
        });
    }

    let expected = pid.response_service();
    if service != expected {
        return Err(DecodeError::UnexpectedService {
            expected,
            actual: service,
        });
    }

    let (&echo, data) = rest.split_first().ok_or(DecodeError::DataTooShort {
        expected: 2,
        actual: payload.len(),
    })?;

    if echo != pid.pid {
        return Err(DecodeError::PidMismatch {
            expected: pid.pid,
            actual: echo,
        });
    }

    Ok(data)
}

fn apply_rule(rule: &DecodeRule, data: &[u8], precision: u8) -> DecodeResult<ReadingValue> {
    check_length(data, rule.required_len())?;

    match rule {
        DecodeRule::Linear {
            data_type,
            byte_order,
            byte_offset,
            scale,
            offset,
        } => {
            let raw = read_raw(*data_type, *byte_order, data, *byte_offset)?;
            let physical = raw as f64 * scale + offset;
            Ok(ReadingValue::Number(round_to_precision(physical, precision)))
        }
        DecodeRule::BitMask {
            data_type,
            byte_offset,
            mask,
            shift,
            labels,
        } => {
            let raw = read_raw(*data_type, ByteOrder::Big, data, *byte_offset)? as u32;
            let masked = (raw & mask)
                .checked_shr(u32::from(*shift))
                .ok_or(DecodeError::InvalidShift(*shift))?;
            Ok(match labels {
                Some(labels) => ReadingValue::Enumerated {
                    raw: masked,
                    label: labels.get(&masked).cloned(),
                },
                None => ReadingValue::Number(masked as f64),
            })
        }
        DecodeRule::Enum {
            data_type,
            byte_offset,
            labels,
        } => {
            let raw = read_raw(*data_type, ByteOrder::Big, data, *byte_offset)? as u32;
            let label = labels
                .get(&raw)
                .cloned()
                .ok_or(DecodeError::UnknownEnumValue(raw))?;
            Ok(ReadingValue::Enumerated {
                raw,
                label: Some(label),
            })
        }
        DecodeRule::Formula { weights, offset } => {
            let physical = weights
                .iter()
                .zip(data)
                .map(|(w, &b)| w * b as f64)
                .sum::<f64>()
                + offset;
            Ok(ReadingValue::Number(round_to_precision(physical, precision)))
        }
    }
}

/// Read an integer of `data_type` at `offset`
fn read_raw(data_type: DataType, byte_order: ByteOrder, data: &[u8], offset: usize) -> DecodeResult<i64> {
    check_length(data, offset + data_type.byte_size())?;
    let bytes = &data[offset..offset + data_type.byte_size()];

    let raw = match data_type {
        DataType::Uint8 => bytes[0] as i64,
        DataType::Int8 => bytes[0] as i8 as i64,
        DataType::Uint16 => {
            let b = [bytes[0], bytes[1]];
            match byte_order {
                ByteOrder::Big => u16::from_be_bytes(b) as i64,
                ByteOrder::Little => u16::from_le_bytes(b) as i64,
            }
        }
        DataType::Int16 => {
            let b = [bytes[0], bytes[1]];
            match byte_order {
                ByteOrder::Big => i16::from_be_bytes(b) as i64,
                ByteOrder::Little => i16::from_le_bytes(b) as i64,
            }
        }
        DataType::Uint32 => {
            let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
            match byte_order {
                ByteOrder::Big => u32::from_be_bytes(b) as i64,
                ByteOrder::Little => u32::from_le_bytes(b) as i64,
            }
        }
    };

    Ok(raw)
}

fn check_length(data: &[u8], required: usize) -> DecodeResult<()> {
    if required > data.len() {
        Err(DecodeError::DataTooShort {
            expected: required,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}
