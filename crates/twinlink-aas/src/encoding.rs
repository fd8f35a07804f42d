// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! AAS Part 2 identifier and path encoding.
//!
//! Identifiers of Identifiables are base64url-encoded without padding when
//! they appear in API paths; idShortPath segments are percent-encoded (not
//! base64), with square brackets preserved for list element addressing.
//!
//! The bridge's internal idShortPath form is slash-separated; the HTTP API
//! uses the dotted AAS Part 2 grammar, so segments are joined with `.` when
//! building URLs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters percent-encoded inside an idShortPath segment. Square
/// brackets stay literal for list index notation.
const IDSHORT_SEGMENT_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

/// Encodes a submodel identifier for use in an API path.
///
/// With `encode_identifiers` set the id is base64url-encoded without
/// padding; otherwise it is used verbatim.
#[must_use]
pub fn encode_submodel_id(id: &str, encode_identifiers: bool) -> String {
    if encode_identifiers {
        URL_SAFE_NO_PAD.encode(id.as_bytes())
    } else {
        id.to_string()
    }
}

/// Decodes a base64url submodel identifier taken from an MQTT topic
/// segment. Falls back to the input when it is not valid base64url, since
/// some brokers publish raw identifiers.
#[must_use]
pub fn decode_submodel_id_lossy(encoded: &str) -> String {
    match URL_SAFE_NO_PAD.decode(encoded) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| encoded.to_string()),
        Err(_) => encoded.to_string(),
    }
}

/// Renders the bridge's slash-separated idShortPath as the dotted URL form,
/// percent-encoding each segment.
///
/// # Examples
///
/// ```
/// use twinlink_aas::encoding::encode_id_short_path;
///
/// assert_eq!(encode_id_short_path("Temperature"), "Temperature");
/// assert_eq!(encode_id_short_path("Line1/Temperature"), "Line1.Temperature");
/// assert_eq!(encode_id_short_path("My Property"), "My%20Property");
/// assert_eq!(encode_id_short_path("Components[0]/Value"), "Components[0].Value");
/// ```
#[must_use]
pub fn encode_id_short_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| utf8_percent_encode(segment, IDSHORT_SEGMENT_ESCAPE).to_string())
        .collect::<Vec<_>>()
        .join(".")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submodel_id_base64url() {
        let id = "urn:factory:submodel:sensors";
        let encoded = encode_submodel_id(id, true);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert_eq!(decode_submodel_id_lossy(&encoded), id);
    }

    #[test]
    fn test_submodel_id_verbatim() {
        let id = "urn:factory:submodel:sensors";
        assert_eq!(encode_submodel_id(id, false), id);
    }

    #[test]
    fn test_no_padding_for_any_length() {
        for id in ["a", "ab", "abc", "abcd", "https://example.org/sm/1"] {
            assert!(!encode_submodel_id(id, true).contains('='), "id {}", id);
        }
    }

    #[test]
    fn test_lossy_decode_passes_through_raw_ids() {
        // Not valid base64url, comes back unchanged.
        assert_eq!(decode_submodel_id_lossy("plain id!"), "plain id!");
    }

    #[test]
    fn test_path_segments_become_dotted() {
        assert_eq!(encode_id_short_path("Outer/Inner/Value"), "Outer.Inner.Value");
    }

    #[test]
    fn test_path_special_characters() {
        let encoded = encode_id_short_path("Has Space/Has<Angle>");
        assert_eq!(encoded, "Has%20Space.Has%3CAngle%3E");
    }

    #[test]
    fn test_path_brackets_preserved() {
        assert_eq!(
            encode_id_short_path("Phone[Business]/AreaCode"),
            "Phone[Business].AreaCode"
        );
    }

    #[test]
    fn test_unicode_submodel_id() {
        let id = "urn:beispiel:straße:1";
        let encoded = encode_submodel_id(id, true);
        assert_eq!(decode_submodel_id_lossy(&encoded), id);
    }
}
