// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA variant value representation.
//!
//! [`Variant`] is the protocol-side tagged value container the bridge moves
//! in and out of the OPC UA address space. The codec converts between this
//! and the XSD-typed [`crate::xsd::XsdValue`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Variant
// =============================================================================

/// An OPC UA variant value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// Boolean value.
    Boolean(bool),

    /// Signed 8-bit integer (SByte).
    SByte(i8),

    /// Unsigned 8-bit integer (Byte).
    Byte(u8),

    /// Signed 16-bit integer.
    Int16(i16),

    /// Unsigned 16-bit integer.
    UInt16(u16),

    /// Signed 32-bit integer.
    Int32(i32),

    /// Unsigned 32-bit integer.
    UInt32(u32),

    /// Signed 64-bit integer.
    Int64(i64),

    /// Unsigned 64-bit integer.
    UInt64(u64),

    /// 32-bit IEEE 754 float.
    Float(f32),

    /// 64-bit IEEE 754 double.
    Double(f64),

    /// UTF-8 string.
    String(String),

    /// Date and time (UTC).
    DateTime(DateTime<Utc>),

    /// Raw byte string.
    ByteString(Vec<u8>),

    /// Array of variants.
    Array(Vec<Variant>),

    /// Null value.
    Null,
}

impl Variant {
    /// Returns the variant type tag.
    pub fn variant_type(&self) -> VariantType {
        match self {
            Self::Boolean(_) => VariantType::Boolean,
            Self::SByte(_) => VariantType::SByte,
            Self::Byte(_) => VariantType::Byte,
            Self::Int16(_) => VariantType::Int16,
            Self::UInt16(_) => VariantType::UInt16,
            Self::Int32(_) => VariantType::Int32,
            Self::UInt32(_) => VariantType::UInt32,
            Self::Int64(_) => VariantType::Int64,
            Self::UInt64(_) => VariantType::UInt64,
            Self::Float(_) => VariantType::Float,
            Self::Double(_) => VariantType::Double,
            Self::String(_) => VariantType::String,
            Self::DateTime(_) => VariantType::DateTime,
            Self::ByteString(_) => VariantType::ByteString,
            Self::Array(_) | Self::Null => VariantType::Variant,
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to widen the value to an i128 (signed and unsigned families).
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::SByte(v) => Some(*v as i128),
            Self::Byte(v) => Some(*v as i128),
            Self::Int16(v) => Some(*v as i128),
            Self::UInt16(v) => Some(*v as i128),
            Self::Int32(v) => Some(*v as i128),
            Self::UInt32(v) => Some(*v as i128),
            Self::Int64(v) => Some(*v as i128),
            Self::UInt64(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// VariantType
// =============================================================================

/// OPC UA variant type tags relevant to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    /// Boolean.
    Boolean,
    /// Signed 8-bit integer.
    SByte,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float,
    /// 64-bit double.
    Double,
    /// UTF-8 string.
    String,
    /// Date and time.
    DateTime,
    /// Byte string.
    ByteString,
    /// Generic variant (arrays and null).
    Variant,
}

impl VariantType {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::ByteString => "ByteString",
            Self::Variant => "Variant",
        }
    }

    /// Returns `true` if this is an integer type.
    #[inline]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::SByte
                | Self::Byte
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
        )
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_type_tags() {
        assert_eq!(Variant::Boolean(true).variant_type(), VariantType::Boolean);
        assert_eq!(Variant::Double(1.0).variant_type(), VariantType::Double);
        assert_eq!(Variant::Null.variant_type(), VariantType::Variant);
        assert_eq!(
            Variant::Array(vec![Variant::Int32(1)]).variant_type(),
            VariantType::Variant
        );
    }

    #[test]
    fn test_as_i128() {
        assert_eq!(Variant::UInt64(u64::MAX).as_i128(), Some(u64::MAX as i128));
        assert_eq!(Variant::SByte(-1).as_i128(), Some(-1));
        assert_eq!(Variant::Double(1.0).as_i128(), None);
    }

    #[test]
    fn test_integer_family() {
        assert!(VariantType::Int16.is_integer());
        assert!(VariantType::UInt64.is_integer());
        assert!(!VariantType::Double.is_integer());
        assert!(!VariantType::String.is_integer());
    }
}
