// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! XSD value types used by AAS submodel elements.
//!
//! The bridge supports a closed set of XSD types per OPC 30270 (I4AAS):
//! every configured mapping declares exactly one [`XsdType`], and both sides
//! of the bridge must be coercible to it. [`XsdValue`] is the coerced,
//! XSD-typed form that flows between the codec, the loop-suppression cache,
//! and the AAS client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::variant::VariantType;

// =============================================================================
// XsdType
// =============================================================================

/// The closed enumeration of supported XSD value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum XsdType {
    /// `xs:boolean`
    Boolean,
    /// `xs:byte` (signed 8-bit)
    Byte,
    /// `xs:unsignedByte`
    UnsignedByte,
    /// `xs:short`
    Short,
    /// `xs:unsignedShort`
    UnsignedShort,
    /// `xs:int`
    Int,
    /// `xs:unsignedInt`
    UnsignedInt,
    /// `xs:long`
    Long,
    /// `xs:unsignedLong`
    UnsignedLong,
    /// `xs:float`
    Float,
    /// `xs:double`
    Double,
    /// `xs:string`
    String,
    /// `xs:dateTime`
    DateTime,
    /// `xs:duration`
    Duration,
    /// `xs:base64Binary`
    Base64Binary,
}

impl XsdType {
    /// Returns the `xs:`-prefixed name used in configuration and AAS
    /// element descriptors.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "xs:boolean",
            Self::Byte => "xs:byte",
            Self::UnsignedByte => "xs:unsignedByte",
            Self::Short => "xs:short",
            Self::UnsignedShort => "xs:unsignedShort",
            Self::Int => "xs:int",
            Self::UnsignedInt => "xs:unsignedInt",
            Self::Long => "xs:long",
            Self::UnsignedLong => "xs:unsignedLong",
            Self::Float => "xs:float",
            Self::Double => "xs:double",
            Self::String => "xs:string",
            Self::DateTime => "xs:dateTime",
            Self::Duration => "xs:duration",
            Self::Base64Binary => "xs:base64Binary",
        }
    }

    /// Returns `true` if this is an integer type.
    #[inline]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Byte
                | Self::UnsignedByte
                | Self::Short
                | Self::UnsignedShort
                | Self::Int
                | Self::UnsignedInt
                | Self::Long
                | Self::UnsignedLong
        )
    }

    /// Returns the intrinsic inclusive bounds for integer types.
    pub const fn integer_bounds(&self) -> Option<(i128, i128)> {
        match self {
            Self::Byte => Some((i8::MIN as i128, i8::MAX as i128)),
            Self::UnsignedByte => Some((0, u8::MAX as i128)),
            Self::Short => Some((i16::MIN as i128, i16::MAX as i128)),
            Self::UnsignedShort => Some((0, u16::MAX as i128)),
            Self::Int => Some((i32::MIN as i128, i32::MAX as i128)),
            Self::UnsignedInt => Some((0, u32::MAX as i128)),
            Self::Long => Some((i64::MIN as i128, i64::MAX as i128)),
            Self::UnsignedLong => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    /// The OPC UA variant type this XSD type projects onto (OPC 30270).
    pub const fn variant_type(&self) -> VariantType {
        match self {
            Self::Boolean => VariantType::Boolean,
            Self::Byte => VariantType::SByte,
            Self::UnsignedByte => VariantType::Byte,
            Self::Short => VariantType::Int16,
            Self::UnsignedShort => VariantType::UInt16,
            Self::Int => VariantType::Int32,
            Self::UnsignedInt => VariantType::UInt32,
            Self::Long => VariantType::Int64,
            Self::UnsignedLong => VariantType::UInt64,
            Self::Float => VariantType::Float,
            Self::Double => VariantType::Double,
            Self::String => VariantType::String,
            Self::DateTime => VariantType::DateTime,
            // OPC UA Duration is milliseconds carried as a Double.
            Self::Duration => VariantType::Double,
            Self::Base64Binary => VariantType::ByteString,
        }
    }
}

impl fmt::Display for XsdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for XsdType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("xs:").unwrap_or(s);
        match name {
            "boolean" => Ok(Self::Boolean),
            "byte" => Ok(Self::Byte),
            "unsignedByte" => Ok(Self::UnsignedByte),
            "short" => Ok(Self::Short),
            "unsignedShort" => Ok(Self::UnsignedShort),
            "int" => Ok(Self::Int),
            "unsignedInt" => Ok(Self::UnsignedInt),
            "long" => Ok(Self::Long),
            "unsignedLong" => Ok(Self::UnsignedLong),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "string" => Ok(Self::String),
            "dateTime" => Ok(Self::DateTime),
            "duration" => Ok(Self::Duration),
            "base64Binary" => Ok(Self::Base64Binary),
            _ => Err(ConfigError::unsupported_value_type(s)),
        }
    }
}

// =============================================================================
// XsdValue
// =============================================================================

/// An XSD-typed value, the coerced form flowing through the bridge.
///
/// Arrays are homogeneous per mapping (element-wise coercion); `Null` only
/// appears for mappings that declare nullability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum XsdValue {
    /// `xs:boolean`
    Boolean(bool),
    /// `xs:byte`
    Byte(i8),
    /// `xs:unsignedByte`
    UnsignedByte(u8),
    /// `xs:short`
    Short(i16),
    /// `xs:unsignedShort`
    UnsignedShort(u16),
    /// `xs:int`
    Int(i32),
    /// `xs:unsignedInt`
    UnsignedInt(u32),
    /// `xs:long`
    Long(i64),
    /// `xs:unsignedLong`
    UnsignedLong(u64),
    /// `xs:float`
    Float(f32),
    /// `xs:double`
    Double(f64),
    /// `xs:string`
    String(String),
    /// `xs:dateTime` (UTC)
    DateTime(DateTime<Utc>),
    /// `xs:duration`, stored as fractional milliseconds.
    Duration(f64),
    /// `xs:base64Binary`
    Base64Binary(Vec<u8>),
    /// Array of values (element-wise typed).
    Array(Vec<XsdValue>),
    /// Null, permitted only on nullable mappings.
    Null,
}

impl XsdValue {
    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to widen the value to an i128 (all integer variants).
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Byte(v) => Some(*v as i128),
            Self::UnsignedByte(v) => Some(*v as i128),
            Self::Short(v) => Some(*v as i128),
            Self::UnsignedShort(v) => Some(*v as i128),
            Self::Int(v) => Some(*v as i128),
            Self::UnsignedInt(v) => Some(*v as i128),
            Self::Long(v) => Some(*v as i128),
            Self::UnsignedLong(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Attempts to get the value as an f64 (floats and durations).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Duration(v) => Some(*v),
            _ => None,
        }
    }

    /// The short name of the contained value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::UnsignedByte(_) => "unsignedByte",
            Self::Short(_) => "short",
            Self::UnsignedShort(_) => "unsignedShort",
            Self::Int(_) => "int",
            Self::UnsignedInt(_) => "unsignedInt",
            Self::Long(_) => "long",
            Self::UnsignedLong(_) => "unsignedLong",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::DateTime(_) => "dateTime",
            Self::Duration(_) => "duration",
            Self::Base64Binary(_) => "base64Binary",
            Self::Array(_) => "array",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for XsdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::UnsignedByte(v) => write!(f, "{}", v),
            Self::Short(v) => write!(f, "{}", v),
            Self::UnsignedShort(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::UnsignedInt(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::UnsignedLong(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Duration(v) => write!(f, "{}ms", v),
            Self::Base64Binary(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xsd_type_roundtrip() {
        for type_name in [
            "xs:boolean",
            "xs:byte",
            "xs:unsignedByte",
            "xs:short",
            "xs:unsignedShort",
            "xs:int",
            "xs:unsignedInt",
            "xs:long",
            "xs:unsignedLong",
            "xs:float",
            "xs:double",
            "xs:string",
            "xs:dateTime",
            "xs:duration",
            "xs:base64Binary",
        ] {
            let parsed: XsdType = type_name.parse().unwrap();
            assert_eq!(parsed.as_str(), type_name);
        }
    }

    #[test]
    fn test_xsd_type_unprefixed() {
        assert_eq!("double".parse::<XsdType>().unwrap(), XsdType::Double);
    }

    #[test]
    fn test_xsd_type_unsupported() {
        assert!("xs:decimal".parse::<XsdType>().is_err());
        assert!("xs:anyURI".parse::<XsdType>().is_err());
    }

    #[test]
    fn test_variant_type_projection() {
        assert_eq!(XsdType::Byte.variant_type(), VariantType::SByte);
        assert_eq!(XsdType::UnsignedByte.variant_type(), VariantType::Byte);
        assert_eq!(XsdType::Duration.variant_type(), VariantType::Double);
        assert_eq!(XsdType::Base64Binary.variant_type(), VariantType::ByteString);
    }

    #[test]
    fn test_xsd_value_i128() {
        assert_eq!(XsdValue::UnsignedLong(u64::MAX).as_i128(), Some(u64::MAX as i128));
        assert_eq!(XsdValue::Byte(-1).as_i128(), Some(-1));
        assert_eq!(XsdValue::Double(1.0).as_i128(), None);
    }
}
