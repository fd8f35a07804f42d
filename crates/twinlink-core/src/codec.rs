// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bidirectional type codec between OPC UA variants and XSD-typed values.
//!
//! Coercion follows the OPC 30270 (I4AAS) conventions:
//!
//! - Integer families coerce losslessly only when the numeric value fits the
//!   target's inclusive range; otherwise `RangeError`.
//! - Float ↔ Double: widening is exact; narrowing fails with `RangeError`
//!   when the finite magnitude exceeds the target's maximum.
//! - Boolean ↔ Integer: `true ↔ 1`, `false ↔ 0`; any other integer is a
//!   `TypeError`.
//! - `xs:dateTime` ↔ OPC UA `DateTime`: UTC, 100 ns ticks since 1601-01-01;
//!   out-of-range dates fail with `RangeError`.
//! - `xs:duration` ↔ OPC UA `Duration` (milliseconds as Double), ISO-8601
//!   lexical form, fractional milliseconds preserved.
//! - Arrays apply element-wise; length preserved; empty arrays allowed.
//! - `null` decodes to `NullError` unless the mapping declares nullability.
//!
//! The canonical [`hash`] is a SHA-256 over a type-tagged big-endian byte
//! serialization, so equal values produce equal hashes regardless of which
//! direction they travelled.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};

use crate::error::{CodecError, CodecResult};
use crate::registry::ValueRange;
use crate::variant::{Variant, VariantType};
use crate::xsd::{XsdType, XsdValue};

/// 100 ns ticks between 1601-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

// =============================================================================
// Decode: OPC UA Variant -> XsdValue
// =============================================================================

/// Decodes an OPC UA variant into the mapping's declared XSD type.
pub fn decode(variant: &Variant, target: XsdType, nullable: bool) -> CodecResult<XsdValue> {
    if variant.is_null() {
        return if nullable {
            Ok(XsdValue::Null)
        } else {
            Err(CodecError::Null)
        };
    }

    if let Variant::Array(items) = variant {
        let decoded: CodecResult<Vec<XsdValue>> = items
            .iter()
            .map(|item| decode(item, target, nullable))
            .collect();
        return Ok(XsdValue::Array(decoded?));
    }

    match target {
        XsdType::Boolean => decode_boolean(variant),
        t if t.is_integer() => decode_integer(variant, t),
        XsdType::Float => decode_float(variant),
        XsdType::Double => decode_double(variant).map(XsdValue::Double),
        XsdType::String => match variant {
            Variant::String(s) => Ok(XsdValue::String(s.clone())),
            other => Err(type_mismatch(target, other)),
        },
        XsdType::DateTime => match variant {
            Variant::DateTime(dt) => {
                check_datetime_range(dt)?;
                Ok(XsdValue::DateTime(*dt))
            }
            other => Err(type_mismatch(target, other)),
        },
        XsdType::Duration => {
            let ms = decode_double(variant)
                .map_err(|_| type_mismatch(target, variant))?;
            Ok(XsdValue::Duration(ms))
        }
        XsdType::Base64Binary => match variant {
            Variant::ByteString(bytes) => Ok(XsdValue::Base64Binary(bytes.clone())),
            other => Err(type_mismatch(target, other)),
        },
        // Integer cases are handled by the guard above.
        _ => unreachable!("integer targets handled earlier"),
    }
}

fn decode_boolean(variant: &Variant) -> CodecResult<XsdValue> {
    match variant {
        Variant::Boolean(b) => Ok(XsdValue::Boolean(*b)),
        other => match other.as_i128() {
            Some(0) => Ok(XsdValue::Boolean(false)),
            Some(1) => Ok(XsdValue::Boolean(true)),
            Some(_) => Err(CodecError::type_mismatch(
                "xs:boolean",
                format!("integer {}", other),
            )),
            None => Err(type_mismatch(XsdType::Boolean, other)),
        },
    }
}

fn decode_integer(variant: &Variant, target: XsdType) -> CodecResult<XsdValue> {
    let wide = match variant {
        Variant::Boolean(b) => {
            if *b {
                1
            } else {
                0
            }
        }
        other => other
            .as_i128()
            .ok_or_else(|| type_mismatch(target, other))?,
    };
    integer_to_xsd(wide, target)
}

fn decode_float(variant: &Variant) -> CodecResult<XsdValue> {
    match variant {
        Variant::Float(v) => Ok(XsdValue::Float(*v)),
        Variant::Double(v) => narrow_to_f32(*v).map(XsdValue::Float),
        other => {
            let wide = other
                .as_i128()
                .ok_or_else(|| type_mismatch(XsdType::Float, other))?;
            Ok(XsdValue::Float(wide as f32))
        }
    }
}

fn decode_double(variant: &Variant) -> CodecResult<f64> {
    match variant {
        Variant::Float(v) => Ok(*v as f64),
        Variant::Double(v) => Ok(*v),
        other => other
            .as_i128()
            .map(|v| v as f64)
            .ok_or_else(|| type_mismatch(XsdType::Double, other)),
    }
}

// =============================================================================
// Encode: XsdValue -> OPC UA Variant
// =============================================================================

/// Encodes an XSD-typed value into the given OPC UA variant type.
pub fn encode(value: &XsdValue, target: VariantType) -> CodecResult<Variant> {
    if value.is_null() {
        return Ok(Variant::Null);
    }

    if let XsdValue::Array(items) = value {
        let encoded: CodecResult<Vec<Variant>> =
            items.iter().map(|item| encode(item, target)).collect();
        return Ok(Variant::Array(encoded?));
    }

    match target {
        VariantType::Boolean => match value {
            XsdValue::Boolean(b) => Ok(Variant::Boolean(*b)),
            other => match other.as_i128() {
                Some(0) => Ok(Variant::Boolean(false)),
                Some(1) => Ok(Variant::Boolean(true)),
                Some(_) => Err(CodecError::type_mismatch(
                    "Boolean",
                    format!("integer {}", other),
                )),
                None => Err(CodecError::type_mismatch("Boolean", other.kind())),
            },
        },
        t if t.is_integer() => encode_integer(value, t),
        VariantType::Float => match value {
            XsdValue::Float(v) => Ok(Variant::Float(*v)),
            XsdValue::Double(v) => narrow_to_f32(*v).map(Variant::Float),
            other => other
                .as_i128()
                .map(|v| Variant::Float(v as f32))
                .ok_or_else(|| CodecError::type_mismatch("Float", other.kind())),
        },
        VariantType::Double => match value {
            XsdValue::Float(v) => Ok(Variant::Double(*v as f64)),
            XsdValue::Double(v) => Ok(Variant::Double(*v)),
            XsdValue::Duration(ms) => Ok(Variant::Double(*ms)),
            other => other
                .as_i128()
                .map(|v| Variant::Double(v as f64))
                .ok_or_else(|| CodecError::type_mismatch("Double", other.kind())),
        },
        VariantType::String => match value {
            XsdValue::String(s) => Ok(Variant::String(s.clone())),
            other => Err(CodecError::type_mismatch("String", other.kind())),
        },
        VariantType::DateTime => match value {
            XsdValue::DateTime(dt) => {
                check_datetime_range(dt)?;
                Ok(Variant::DateTime(*dt))
            }
            other => Err(CodecError::type_mismatch("DateTime", other.kind())),
        },
        VariantType::ByteString => match value {
            XsdValue::Base64Binary(bytes) => Ok(Variant::ByteString(bytes.clone())),
            other => Err(CodecError::type_mismatch("ByteString", other.kind())),
        },
        other => Err(CodecError::type_mismatch(other.name(), value.kind())),
    }
}

fn encode_integer(value: &XsdValue, target: VariantType) -> CodecResult<Variant> {
    let wide = match value {
        XsdValue::Boolean(b) => {
            if *b {
                1
            } else {
                0
            }
        }
        other => other
            .as_i128()
            .ok_or_else(|| CodecError::type_mismatch(target.name(), other.kind()))?,
    };

    let (min, max) = variant_integer_bounds(target)
        .ok_or_else(|| CodecError::type_mismatch(target.name(), value.kind()))?;
    if wide < min || wide > max {
        return Err(CodecError::out_of_range(wide, min, max));
    }

    Ok(match target {
        VariantType::SByte => Variant::SByte(wide as i8),
        VariantType::Byte => Variant::Byte(wide as u8),
        VariantType::Int16 => Variant::Int16(wide as i16),
        VariantType::UInt16 => Variant::UInt16(wide as u16),
        VariantType::Int32 => Variant::Int32(wide as i32),
        VariantType::UInt32 => Variant::UInt32(wide as u32),
        VariantType::Int64 => Variant::Int64(wide as i64),
        VariantType::UInt64 => Variant::UInt64(wide as u64),
        _ => unreachable!("bounds lookup restricts to integer targets"),
    })
}

// =============================================================================
// JSON coercion: AAS payloads -> XsdValue
// =============================================================================

/// Coerces a raw AAS JSON value into the mapping's declared XSD type.
///
/// Integer and float types accept both JSON numbers and their lexical string
/// forms; the bridge itself emits strings for 64-bit values beyond 2^53, so
/// the decoder must take them back.
pub fn coerce_json(
    raw: &serde_json::Value,
    target: XsdType,
    nullable: bool,
) -> CodecResult<XsdValue> {
    use serde_json::Value as Json;

    if raw.is_null() {
        return if nullable {
            Ok(XsdValue::Null)
        } else {
            Err(CodecError::Null)
        };
    }

    if let Json::Array(items) = raw {
        let coerced: CodecResult<Vec<XsdValue>> = items
            .iter()
            .map(|item| coerce_json(item, target, nullable))
            .collect();
        return Ok(XsdValue::Array(coerced?));
    }

    match target {
        XsdType::Boolean => match raw {
            Json::Bool(b) => Ok(XsdValue::Boolean(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(0) => Ok(XsdValue::Boolean(false)),
                Some(1) => Ok(XsdValue::Boolean(true)),
                _ => Err(CodecError::type_mismatch("xs:boolean", n.to_string())),
            },
            Json::String(s) => match s.as_str() {
                "true" | "1" => Ok(XsdValue::Boolean(true)),
                "false" | "0" => Ok(XsdValue::Boolean(false)),
                other => Err(CodecError::type_mismatch("xs:boolean", other)),
            },
            other => Err(json_mismatch(target, other)),
        },
        t if t.is_integer() => {
            let wide = json_integer(raw, t)?;
            integer_to_xsd(wide, t)
        }
        XsdType::Float => {
            let v = json_float(raw, target)?;
            narrow_to_f32(v).map(XsdValue::Float)
        }
        XsdType::Double => json_float(raw, target).map(XsdValue::Double),
        XsdType::String => match raw {
            Json::String(s) => Ok(XsdValue::String(s.clone())),
            other => Err(json_mismatch(target, other)),
        },
        XsdType::DateTime => match raw {
            Json::String(s) => {
                let dt = DateTime::parse_from_rfc3339(s)
                    .map_err(|e| CodecError::type_mismatch("xs:dateTime", e.to_string()))?
                    .with_timezone(&Utc);
                check_datetime_range(&dt)?;
                Ok(XsdValue::DateTime(dt))
            }
            other => Err(json_mismatch(target, other)),
        },
        XsdType::Duration => match raw {
            Json::String(s) => parse_iso8601_duration(s)
                .map(XsdValue::Duration)
                .ok_or_else(|| CodecError::type_mismatch("xs:duration", s.as_str())),
            other => Err(json_mismatch(target, other)),
        },
        XsdType::Base64Binary => match raw {
            Json::String(s) => BASE64
                .decode(s)
                .map(XsdValue::Base64Binary)
                .map_err(|e| CodecError::type_mismatch("xs:base64Binary", e.to_string())),
            other => Err(json_mismatch(target, other)),
        },
        _ => unreachable!("integer targets handled earlier"),
    }
}

fn json_integer(raw: &serde_json::Value, target: XsdType) -> CodecResult<i128> {
    use serde_json::Value as Json;
    match raw {
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(v as i128)
            } else if let Some(v) = n.as_u64() {
                Ok(v as i128)
            } else {
                Err(CodecError::type_mismatch(target.as_str(), n.to_string()))
            }
        }
        Json::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|_| CodecError::type_mismatch(target.as_str(), s.as_str())),
        other => Err(json_mismatch(target, other)),
    }
}

fn json_float(raw: &serde_json::Value, target: XsdType) -> CodecResult<f64> {
    use serde_json::Value as Json;
    match raw {
        Json::Number(n) => n
            .as_f64()
            .ok_or_else(|| CodecError::type_mismatch(target.as_str(), n.to_string())),
        Json::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| CodecError::type_mismatch(target.as_str(), s.as_str())),
        other => Err(json_mismatch(target, other)),
    }
}

// =============================================================================
// JSON encoding: XsdValue -> AAS payloads
// =============================================================================

/// Encodes an XSD-typed value into the JSON shape the AAS `$value` API uses.
///
/// Booleans map to JSON booleans, integers to JSON numbers (64-bit values
/// beyond 2^53 become strings to stay JSON-safe), floats to JSON numbers
/// with `NaN`/`±Inf` rejected, dateTime to ISO-8601 UTC strings, durations
/// to ISO-8601 duration strings, binary to base64 strings.
pub fn to_json(value: &XsdValue) -> CodecResult<serde_json::Value> {
    use serde_json::{json, Value as Json};

    const JSON_SAFE_MAX: i128 = 1_i128 << 53;

    Ok(match value {
        XsdValue::Boolean(b) => Json::Bool(*b),
        XsdValue::Byte(v) => json!(*v),
        XsdValue::UnsignedByte(v) => json!(*v),
        XsdValue::Short(v) => json!(*v),
        XsdValue::UnsignedShort(v) => json!(*v),
        XsdValue::Int(v) => json!(*v),
        XsdValue::UnsignedInt(v) => json!(*v),
        XsdValue::Long(v) => {
            if (*v as i128).abs() > JSON_SAFE_MAX {
                Json::String(v.to_string())
            } else {
                json!(*v)
            }
        }
        XsdValue::UnsignedLong(v) => {
            if (*v as i128) > JSON_SAFE_MAX {
                Json::String(v.to_string())
            } else {
                json!(*v)
            }
        }
        XsdValue::Float(v) => float_to_json(*v as f64)?,
        XsdValue::Double(v) => float_to_json(*v)?,
        XsdValue::String(s) => Json::String(s.clone()),
        XsdValue::DateTime(dt) => {
            Json::String(dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        }
        XsdValue::Duration(ms) => Json::String(format_iso8601_duration(*ms)),
        XsdValue::Base64Binary(bytes) => Json::String(BASE64.encode(bytes)),
        XsdValue::Array(items) => {
            let encoded: CodecResult<Vec<Json>> = items.iter().map(to_json).collect();
            Json::Array(encoded?)
        }
        XsdValue::Null => Json::Null,
    })
}

fn float_to_json(v: f64) -> CodecResult<serde_json::Value> {
    serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .ok_or_else(|| CodecError::out_of_range(v, "-inf (exclusive)", "+inf (exclusive)"))
}

// =============================================================================
// Range validation
// =============================================================================

/// Validates a coerced value against a mapping's declared range.
///
/// Non-numeric values pass; arrays are checked element-wise.
pub fn check_range(value: &XsdValue, range: &ValueRange) -> CodecResult<()> {
    match value {
        XsdValue::Array(items) => {
            for item in items {
                check_range(item, range)?;
            }
            Ok(())
        }
        other => {
            let numeric = other
                .as_i128()
                .map(|v| v as f64)
                .or_else(|| other.as_f64());
            match numeric {
                Some(v) if !range.contains(v) => {
                    Err(CodecError::out_of_range(v, range.min, range.max))
                }
                _ => Ok(()),
            }
        }
    }
}

// =============================================================================
// Canonical hash
// =============================================================================

/// Stable canonical hash of an XSD-typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueHash([u8; 32]);

impl ValueHash {
    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for ValueHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Computes the canonical hash for loop suppression.
///
/// SHA-256 over a type-tagged big-endian serialization, so value equality
/// across directions yields hash equality.
pub fn hash(value: &XsdValue) -> ValueHash {
    let mut buf = Vec::with_capacity(16);
    canonical_bytes(value, &mut buf);
    let mut hasher = Sha256::new();
    hasher.update(&buf);
    ValueHash(hasher.finalize().into())
}

fn canonical_bytes(value: &XsdValue, out: &mut Vec<u8>) {
    match value {
        XsdValue::Null => out.push(0x00),
        XsdValue::Boolean(b) => {
            out.push(0xB1);
            out.push(u8::from(*b));
        }
        XsdValue::Byte(v) => {
            out.push(0xC1);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::UnsignedByte(v) => {
            out.push(0xC2);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::Short(v) => {
            out.push(0xC3);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::UnsignedShort(v) => {
            out.push(0xC4);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::Int(v) => {
            out.push(0xC5);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::UnsignedInt(v) => {
            out.push(0xC6);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::Long(v) => {
            out.push(0xC7);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::UnsignedLong(v) => {
            out.push(0xC8);
            out.extend_from_slice(&v.to_be_bytes());
        }
        XsdValue::Float(v) => {
            out.push(0xD4);
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        XsdValue::Double(v) => {
            out.push(0xD8);
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        XsdValue::String(s) => {
            out.push(0x53);
            out.extend_from_slice(&(s.len() as u32).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        XsdValue::DateTime(dt) => {
            out.push(0x44);
            out.extend_from_slice(&dt.timestamp_micros().to_be_bytes());
        }
        XsdValue::Duration(ms) => {
            out.push(0x50);
            out.extend_from_slice(&ms.to_bits().to_be_bytes());
        }
        XsdValue::Base64Binary(bytes) => {
            out.push(0x42);
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        XsdValue::Array(items) => {
            out.push(0xA0);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                canonical_bytes(item, out);
            }
        }
    }
}

// =============================================================================
// DateTime ticks
// =============================================================================

/// Converts a UTC timestamp to OPC UA ticks (100 ns since 1601-01-01).
pub fn datetime_to_ticks(dt: &DateTime<Utc>) -> CodecResult<i64> {
    check_datetime_range(dt)?;
    let ticks = UNIX_EPOCH_TICKS
        + dt.timestamp() * 10_000_000
        + i64::from(dt.timestamp_subsec_nanos()) / 100;
    Ok(ticks)
}

/// Converts OPC UA ticks back to a UTC timestamp.
pub fn datetime_from_ticks(ticks: i64) -> CodecResult<DateTime<Utc>> {
    let unix_ticks = ticks - UNIX_EPOCH_TICKS;
    let secs = unix_ticks.div_euclid(10_000_000);
    let nanos = (unix_ticks.rem_euclid(10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| CodecError::out_of_range(ticks, "1601-01-01", "9999-12-31"))
}

fn check_datetime_range(dt: &DateTime<Utc>) -> CodecResult<()> {
    // OPC UA DateTime covers 1601-01-01 through 9999-12-31.
    let min = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).unwrap();
    let max = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
    if *dt < min || *dt > max {
        return Err(CodecError::out_of_range(
            dt.to_rfc3339(),
            min.to_rfc3339(),
            max.to_rfc3339(),
        ));
    }
    Ok(())
}

// =============================================================================
// ISO-8601 durations
// =============================================================================

/// Parses a day-time ISO-8601 duration into fractional milliseconds.
///
/// Accepted grammar: `[-]P[nD][T[nH][nM][n[.n]S]]`. Year and month
/// components are rejected, their length in milliseconds is undefined.
pub fn parse_iso8601_duration(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total_ms = 0.0_f64;
    let mut seen = false;

    if !date_part.is_empty() {
        let days_text = date_part.strip_suffix('D')?;
        let days: f64 = days_text.parse().ok()?;
        total_ms += days * 86_400_000.0;
        seen = true;
    }

    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return None;
        }
        let mut remaining = time_part;
        for (suffix, factor) in [('H', 3_600_000.0), ('M', 60_000.0), ('S', 1_000.0)] {
            if let Some(pos) = remaining.find(suffix) {
                let number: f64 = remaining[..pos].parse().ok()?;
                total_ms += number * factor;
                remaining = &remaining[pos + 1..];
                seen = true;
            }
        }
        if !remaining.is_empty() {
            return None;
        }
    }

    if !seen {
        return None;
    }
    Some(if negative { -total_ms } else { total_ms })
}

/// Formats fractional milliseconds as an ISO-8601 day-time duration.
pub fn format_iso8601_duration(ms: f64) -> String {
    if ms == 0.0 {
        return "PT0S".to_string();
    }

    let negative = ms < 0.0;
    let mut remaining = ms.abs();

    let days = (remaining / 86_400_000.0).floor();
    remaining -= days * 86_400_000.0;
    let hours = (remaining / 3_600_000.0).floor();
    remaining -= hours * 3_600_000.0;
    let minutes = (remaining / 60_000.0).floor();
    remaining -= minutes * 60_000.0;
    let seconds = remaining / 1_000.0;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0.0 {
        out.push_str(&format!("{}D", days as u64));
    }
    if hours > 0.0 || minutes > 0.0 || seconds > 0.0 || days == 0.0 {
        out.push('T');
        if hours > 0.0 {
            out.push_str(&format!("{}H", hours as u64));
        }
        if minutes > 0.0 {
            out.push_str(&format!("{}M", minutes as u64));
        }
        if seconds > 0.0 || (hours == 0.0 && minutes == 0.0) {
            // Trim the float representation so 1.5s prints as "1.5S".
            let formatted = format!("{}", seconds);
            out.push_str(&formatted);
            out.push('S');
        }
    }
    out
}

// =============================================================================
// Shared helpers
// =============================================================================

fn integer_to_xsd(wide: i128, target: XsdType) -> CodecResult<XsdValue> {
    let (min, max) = target
        .integer_bounds()
        .expect("caller guarantees an integer target");
    if wide < min || wide > max {
        return Err(CodecError::out_of_range(wide, min, max));
    }
    Ok(match target {
        XsdType::Byte => XsdValue::Byte(wide as i8),
        XsdType::UnsignedByte => XsdValue::UnsignedByte(wide as u8),
        XsdType::Short => XsdValue::Short(wide as i16),
        XsdType::UnsignedShort => XsdValue::UnsignedShort(wide as u16),
        XsdType::Int => XsdValue::Int(wide as i32),
        XsdType::UnsignedInt => XsdValue::UnsignedInt(wide as u32),
        XsdType::Long => XsdValue::Long(wide as i64),
        XsdType::UnsignedLong => XsdValue::UnsignedLong(wide as u64),
        _ => unreachable!("bounds lookup restricts to integer targets"),
    })
}

fn variant_integer_bounds(target: VariantType) -> Option<(i128, i128)> {
    match target {
        VariantType::SByte => Some((i8::MIN as i128, i8::MAX as i128)),
        VariantType::Byte => Some((0, u8::MAX as i128)),
        VariantType::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
        VariantType::UInt16 => Some((0, u16::MAX as i128)),
        VariantType::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
        VariantType::UInt32 => Some((0, u32::MAX as i128)),
        VariantType::Int64 => Some((i64::MIN as i128, i64::MAX as i128)),
        VariantType::UInt64 => Some((0, u64::MAX as i128)),
        _ => None,
    }
}

fn narrow_to_f32(v: f64) -> CodecResult<f32> {
    if v.is_finite() && v.abs() > f32::MAX as f64 {
        return Err(CodecError::out_of_range(v, -f32::MAX, f32::MAX));
    }
    Ok(v as f32)
}

fn type_mismatch(target: XsdType, found: &Variant) -> CodecError {
    CodecError::type_mismatch(target.as_str(), found.variant_type().name())
}

fn json_mismatch(target: XsdType, found: &serde_json::Value) -> CodecError {
    let kind = match found {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    CodecError::type_mismatch(target.as_str(), kind)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(value: XsdValue, target: XsdType) {
        let variant = encode(&value, target.variant_type()).unwrap();
        let decoded = decode(&variant, target, false).unwrap();
        assert_eq!(decoded, value, "roundtrip for {}", target);
        assert_eq!(hash(&decoded), hash(&value));
    }

    #[test]
    fn test_roundtrip_identity() {
        roundtrip(XsdValue::Boolean(true), XsdType::Boolean);
        roundtrip(XsdValue::Byte(-12), XsdType::Byte);
        roundtrip(XsdValue::UnsignedByte(200), XsdType::UnsignedByte);
        roundtrip(XsdValue::Short(-30_000), XsdType::Short);
        roundtrip(XsdValue::UnsignedShort(65_000), XsdType::UnsignedShort);
        roundtrip(XsdValue::Int(-2_000_000_000), XsdType::Int);
        roundtrip(XsdValue::UnsignedInt(4_000_000_000), XsdType::UnsignedInt);
        roundtrip(XsdValue::Long(i64::MIN), XsdType::Long);
        roundtrip(XsdValue::UnsignedLong(u64::MAX), XsdType::UnsignedLong);
        roundtrip(XsdValue::Float(1.5), XsdType::Float);
        roundtrip(XsdValue::Double(42.0), XsdType::Double);
        roundtrip(XsdValue::String("hello".into()), XsdType::String);
        roundtrip(XsdValue::Duration(1500.25), XsdType::Duration);
        roundtrip(XsdValue::Base64Binary(vec![1, 2, 3]), XsdType::Base64Binary);
        roundtrip(
            XsdValue::Array(vec![XsdValue::Int(1), XsdValue::Int(2)]),
            XsdType::Int,
        );
        roundtrip(XsdValue::Array(vec![]), XsdType::Double);
    }

    #[test]
    fn test_integer_range_edges() {
        // For every integer type: L and H succeed, L-1 and H+1 fail.
        let cases: &[(XsdType, i128, i128)] = &[
            (XsdType::Byte, i8::MIN as i128, i8::MAX as i128),
            (XsdType::UnsignedByte, 0, u8::MAX as i128),
            (XsdType::Short, i16::MIN as i128, i16::MAX as i128),
            (XsdType::UnsignedShort, 0, u16::MAX as i128),
            (XsdType::Int, i32::MIN as i128, i32::MAX as i128),
            (XsdType::UnsignedInt, 0, u32::MAX as i128),
            (XsdType::Long, i64::MIN as i128, i64::MAX as i128),
            (XsdType::UnsignedLong, 0, u64::MAX as i128),
        ];
        for (target, min, max) in cases {
            assert!(integer_to_xsd(*min, *target).is_ok(), "{} min", target);
            assert!(integer_to_xsd(*max, *target).is_ok(), "{} max", target);
            assert!(
                matches!(integer_to_xsd(min - 1, *target), Err(CodecError::Range { .. })),
                "{} min-1",
                target
            );
            assert!(
                matches!(integer_to_xsd(max + 1, *target), Err(CodecError::Range { .. })),
                "{} max+1",
                target
            );
        }
    }

    #[test]
    fn test_boolean_integer_coercion() {
        assert_eq!(
            decode(&Variant::Int32(1), XsdType::Boolean, false).unwrap(),
            XsdValue::Boolean(true)
        );
        assert_eq!(
            decode(&Variant::Int32(0), XsdType::Boolean, false).unwrap(),
            XsdValue::Boolean(false)
        );
        assert!(matches!(
            decode(&Variant::Int32(2), XsdType::Boolean, false),
            Err(CodecError::Type { .. })
        ));

        assert_eq!(
            encode(&XsdValue::Boolean(true), VariantType::Int32).unwrap(),
            Variant::Int32(1)
        );
        assert!(matches!(
            encode(&XsdValue::Int(5), VariantType::Boolean),
            Err(CodecError::Type { .. })
        ));
    }

    #[test]
    fn test_float_narrowing() {
        assert!(matches!(
            decode(&Variant::Double(1e300), XsdType::Float, false),
            Err(CodecError::Range { .. })
        ));
        // Non-finite values are representable on both OPC float widths.
        assert!(decode(&Variant::Double(f64::INFINITY), XsdType::Float, false).is_ok());
        // Widening is exact.
        let widened = encode(&XsdValue::Float(1.5), VariantType::Double).unwrap();
        assert_eq!(widened, Variant::Double(1.5));
    }

    #[test]
    fn test_null_handling() {
        assert!(matches!(
            decode(&Variant::Null, XsdType::Double, false),
            Err(CodecError::Null)
        ));
        assert_eq!(
            decode(&Variant::Null, XsdType::Double, true).unwrap(),
            XsdValue::Null
        );
        assert!(matches!(
            coerce_json(&json!(null), XsdType::Int, false),
            Err(CodecError::Null)
        ));
    }

    #[test]
    fn test_json_coercion() {
        assert_eq!(
            coerce_json(&json!(55.0), XsdType::Double, false).unwrap(),
            XsdValue::Double(55.0)
        );
        assert_eq!(
            coerce_json(&json!(150), XsdType::Int, false).unwrap(),
            XsdValue::Int(150)
        );
        // Lexical 64-bit form comes back from our own encoder.
        assert_eq!(
            coerce_json(&json!("18446744073709551615"), XsdType::UnsignedLong, false).unwrap(),
            XsdValue::UnsignedLong(u64::MAX)
        );
        assert!(matches!(
            coerce_json(&json!("abc"), XsdType::Int, false),
            Err(CodecError::Type { .. })
        ));
        assert!(matches!(
            coerce_json(&json!(300), XsdType::UnsignedByte, false),
            Err(CodecError::Range { .. })
        ));
        assert!(matches!(
            coerce_json(&json!(42.5), XsdType::Int, false),
            Err(CodecError::Type { .. })
        ));
    }

    #[test]
    fn test_json_encoding_rules() {
        assert_eq!(to_json(&XsdValue::Boolean(true)).unwrap(), json!(true));
        assert_eq!(to_json(&XsdValue::Int(42)).unwrap(), json!(42));
        // 64-bit values beyond 2^53 become strings.
        assert_eq!(
            to_json(&XsdValue::UnsignedLong(u64::MAX)).unwrap(),
            json!("18446744073709551615")
        );
        assert_eq!(to_json(&XsdValue::Long(1024)).unwrap(), json!(1024));
        // Non-finite floats are rejected.
        assert!(to_json(&XsdValue::Double(f64::NAN)).is_err());
        assert!(to_json(&XsdValue::Double(f64::INFINITY)).is_err());
        // Binary becomes base64.
        assert_eq!(
            to_json(&XsdValue::Base64Binary(vec![1, 2, 3])).unwrap(),
            json!("AQID")
        );
    }

    #[test]
    fn test_datetime_ticks() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(datetime_to_ticks(&epoch).unwrap(), UNIX_EPOCH_TICKS);

        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let ticks = datetime_to_ticks(&dt).unwrap();
        assert_eq!(datetime_from_ticks(ticks).unwrap(), dt);
    }

    #[test]
    fn test_datetime_out_of_range() {
        let too_early = Utc.with_ymd_and_hms(1500, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            decode(&Variant::DateTime(too_early), XsdType::DateTime, false),
            Err(CodecError::Range { .. })
        ));
    }

    #[test]
    fn test_duration_parse_and_format() {
        assert_eq!(parse_iso8601_duration("PT1.5S"), Some(1500.0));
        assert_eq!(parse_iso8601_duration("PT2M"), Some(120_000.0));
        assert_eq!(parse_iso8601_duration("P1DT1H"), Some(90_000_000.0));
        assert_eq!(parse_iso8601_duration("-PT0.001S"), Some(-1.0));
        assert_eq!(parse_iso8601_duration("P1Y"), None);
        assert_eq!(parse_iso8601_duration("P"), None);
        assert_eq!(parse_iso8601_duration("1.5"), None);

        assert_eq!(format_iso8601_duration(0.0), "PT0S");
        assert_eq!(format_iso8601_duration(1500.0), "PT1.5S");
        assert_eq!(format_iso8601_duration(120_000.0), "PT2M");
        assert_eq!(format_iso8601_duration(90_000_000.0), "P1DT1H");

        // Fractional milliseconds survive a print/parse cycle.
        let ms = 1234.567;
        let printed = format_iso8601_duration(ms);
        let reparsed = parse_iso8601_duration(&printed).unwrap();
        assert!((reparsed - ms).abs() < 1e-6);
    }

    #[test]
    fn test_hash_stability() {
        let a = XsdValue::Double(42.0);
        let b = XsdValue::Double(42.0);
        let c = XsdValue::Double(42.5);
        assert_eq!(hash(&a), hash(&b));
        assert_ne!(hash(&a), hash(&c));

        // Same numeric value under different type tags hashes differently.
        assert_ne!(hash(&XsdValue::Int(1)), hash(&XsdValue::Long(1)));

        // Arrays are order-sensitive.
        let xs = XsdValue::Array(vec![XsdValue::Int(1), XsdValue::Int(2)]);
        let ys = XsdValue::Array(vec![XsdValue::Int(2), XsdValue::Int(1)]);
        assert_ne!(hash(&xs), hash(&ys));
    }

    #[test]
    fn test_declared_range() {
        let range = ValueRange { min: 0.0, max: 100.0 };
        assert!(check_range(&XsdValue::Double(50.0), &range).is_ok());
        assert!(check_range(&XsdValue::Double(0.0), &range).is_ok());
        assert!(check_range(&XsdValue::Double(100.0), &range).is_ok());
        assert!(matches!(
            check_range(&XsdValue::Double(150.0), &range),
            Err(CodecError::Range { .. })
        ));
        assert!(matches!(
            check_range(&XsdValue::Int(-1), &range),
            Err(CodecError::Range { .. })
        ));
        // Strings are not range-checked.
        assert!(check_range(&XsdValue::String("x".into()), &range).is_ok());
        // Arrays check every element.
        let items = XsdValue::Array(vec![XsdValue::Int(10), XsdValue::Int(200)]);
        assert!(check_range(&items, &range).is_err());
    }

    #[test]
    fn test_string_strictness() {
        assert!(matches!(
            decode(&Variant::Int32(5), XsdType::String, false),
            Err(CodecError::Type { .. })
        ));
        assert!(matches!(
            coerce_json(&json!(5), XsdType::String, false),
            Err(CodecError::Type { .. })
        ));
    }
}
