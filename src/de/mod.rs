//! # De-serialization. Converts an LLSD stream to a tree of LLSDValue structs.
pub mod binary;
pub mod json;
pub mod notation;
pub mod xml;

use crate::error::{LLSDError, LLSDResult};
use crate::LLSDValue;

/// The four wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LLSDFormat {
    Xml,
    Notation,
    Binary,
    Json,
}

/// Peek at the head of a byte buffer and decide which encoding it is.
///
/// Checked in order: the `llsd-` magic means binary; the exact notation
/// sentinel means notation; a leading `<` means XML; `{` or `[` that
/// validates as JSON means JSON; anything else is notation.
pub fn detect_format(msg: &[u8]) -> LLSDFormat {
    if msg.starts_with(binary::LLSDBINARYMAGIC) {
        return LLSDFormat::Binary;
    }
    if msg.starts_with(notation::LLSDNOTATIONSENTINEL.as_bytes()) {
        return LLSDFormat::Notation;
    }
    let trimmed = trim_leading_whitespace(msg);
    match trimmed.first() {
        Some(b'<') => LLSDFormat::Xml,
        Some(b'{') | Some(b'[') => {
            //  Notation also opens maps and arrays with these; only a
            //  body that actually validates as JSON counts as JSON.
            if let Ok(text) = std::str::from_utf8(trimmed) {
                if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
                    return LLSDFormat::Json;
                }
            }
            LLSDFormat::Notation
        }
        _ => LLSDFormat::Notation,
    }
}

/// Parse LLSD, detecting the format from the data itself.
pub fn from_bytes(msg: &[u8]) -> LLSDResult<LLSDValue> {
    match detect_format(msg) {
        LLSDFormat::Binary => binary::from_bytes(msg),
        LLSDFormat::Xml => xml::from_str(as_text(msg)?),
        LLSDFormat::Json => json::from_str(as_text(msg)?),
        LLSDFormat::Notation => notation::from_str(as_text(msg)?),
    }
}

fn as_text(msg: &[u8]) -> LLSDResult<&str> {
    std::str::from_utf8(msg).map_err(LLSDError::from)
}

fn trim_leading_whitespace(msg: &[u8]) -> &[u8] {
    let start = msg
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(msg.len());
    &msg[start..]
}

// Unit tests

#[test]
fn detect_format_rules() {
    assert_eq!(detect_format(b"llsd-\x01\x00"), LLSDFormat::Binary);
    assert_eq!(
        detect_format(b"<?xml version=\"1.0\"?><llsd><undef /></llsd>"),
        LLSDFormat::Xml
    );
    assert_eq!(detect_format(b"  <llsd><undef /></llsd>"), LLSDFormat::Xml);
    assert_eq!(detect_format(b"{\"a\": 1}"), LLSDFormat::Json);
    assert_eq!(detect_format(b"[1, 2]"), LLSDFormat::Json);
    //  Braces that do not parse as JSON are notation.
    assert_eq!(detect_format(b"{a:i1}"), LLSDFormat::Notation);
    assert_eq!(detect_format(b"[i1,i2]"), LLSDFormat::Notation);
    assert_eq!(detect_format(b"i17"), LLSDFormat::Notation);
    assert_eq!(
        detect_format(b"<? llsd/notation ?>\n{a:i1}"),
        LLSDFormat::Notation
    );
}

#[test]
fn from_bytes_dispatches() {
    assert_eq!(
        from_bytes(b"llsd-\x01\x02\x00\x00\x00\x2A").unwrap(),
        LLSDValue::Integer(42)
    );
    assert_eq!(
        from_bytes(b"<llsd><integer>42</integer></llsd>").unwrap(),
        LLSDValue::Integer(42)
    );
    assert_eq!(from_bytes(b"i42").unwrap(), LLSDValue::Integer(42));
    let map = from_bytes(b"{\"a\": true}").unwrap();
    assert_eq!(map.as_map().unwrap()["a"], LLSDValue::Boolean(true));
    let map = from_bytes(b"{a:1}").unwrap();
    assert_eq!(map.as_map().unwrap()["a"], LLSDValue::Boolean(true));
}
