//! Primitive types for raw byte interpretation

use serde::{Deserialize, Serialize};

/// Integer layout of the bytes a rule reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Unsigned 8-bit integer (the "A" byte of most Mode 01 PIDs)
    #[default]
    Uint8,
    /// Unsigned 16-bit integer ("256A + B")
    Uint16,
    /// Unsigned 32-bit integer
    Uint32,
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
        };
        f.write_str(s)
    }
}

impl DataType {
    /// Number of bytes read for one value of this type
    pub fn byte_size(&self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 => 4,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DataType::Int8 | DataType::Int16)
    }
}

/// Byte order for multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Most significant byte first, as OBD-II transmits
    #[default]
    Big,
    Little,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::Uint8.byte_size(), 1);
        assert_eq!(DataType::Uint16.byte_size(), 2);
        assert_eq!(DataType::Uint32.byte_size(), 4);
        assert_eq!(DataType::Int16.byte_size(), 2);
        assert!(DataType::Int8.is_signed());
        assert!(!DataType::Uint16.is_signed());
    }

    #[test]
    fn test_data_type_serde() {
        let t: DataType = serde_json::from_str("\"uint16\"").unwrap();
        assert_eq!(t, DataType::Uint16);
        assert_eq!(t.to_string(), "uint16");
    }
}
