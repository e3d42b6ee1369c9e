//! Decode error types

use thiserror::Error;

/// Why a frame could not be turned into a valid reading
///
/// These never escape the decoder as faults; they are recorded as the
/// detail of an invalid reading.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    /// Text frame that is not a hex response (e.g. `?`, `CAN ERROR`)
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Frame with no payload
    #[error("empty frame")]
    Empty,

    /// ECU answered with a negative response (0x7F)
    #[error("negative response to service 0x{service:02X}: NRC 0x{nrc:02X}")]
    NegativeResponse { service: u8, nrc: u8 },

    /// Response belongs to another service
    #[error("unexpected response service: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedService { expected: u8, actual: u8 },

    /// Response echoes another PID
    #[error("PID mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    PidMismatch { expected: u8, actual: u8 },

    /// Fewer data bytes than the rule needs
    #[error("data too short: expected {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },

    /// Raw value has no entry in the enum table
    #[error("unknown enum value: {0}")]
    UnknownEnumValue(u32),

    /// Bit shift wider than the raw value
    #[error("invalid bit shift: {0}")]
    InvalidShift(u8),

    /// Decoded value outside the descriptor's valid range
    #[error("value out of range: {value} not in [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;
