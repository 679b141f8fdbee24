//! # ser/notation -- serialize LLSD, notation form.
//!
//!  Library for serializing and de-serializing data in
//!  Linden Lab Structured Data format.
//!
//!  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//!
//!  Notation format, serialization.
//
//  License: LGPL.
//
use crate::error::LLSDResult;
use crate::LLSDValue;
use base64::Engine;

/// Outputs an LLSDValue as a single-line string in LLSD "notation"
/// format. No header is emitted, so notation output parses back
/// byte-identically.
pub fn to_string(value: &LLSDValue) -> LLSDResult<String> {
    let mut writer = String::new();
    generate_value(&mut writer, value);
    Ok(writer)
}

/// Generate notation for one value. Recursive.
fn generate_value(writer: &mut String, value: &LLSDValue) {
    match value {
        LLSDValue::Undefined => writer.push('!'),
        LLSDValue::Boolean(v) => writer.push(if *v { '1' } else { '0' }),
        LLSDValue::Integer(v) => {
            writer.push('i');
            writer.push_str(&v.to_string());
        }
        LLSDValue::Real(v) => {
            writer.push('r');
            writer.push_str(&crate::format_real(*v));
        }
        LLSDValue::String(v) => {
            writer.push('s');
            push_quoted(writer, v);
        }
        LLSDValue::UUID(v) => {
            writer.push('u');
            writer.push_str(&v.to_string());
        }
        LLSDValue::Date(v) => {
            writer.push('d');
            writer.push('"');
            writer.push_str(&crate::format_date(v));
            writer.push('"');
        }
        LLSDValue::URI(v) => {
            writer.push('l');
            writer.push('"');
            writer.push_str(&urlencoding::encode(v));
            writer.push('"');
        }
        LLSDValue::Binary(v) => {
            writer.push_str("b64\"");
            writer.push_str(&base64::engine::general_purpose::STANDARD.encode(v));
            writer.push('"');
        }
        //  Map is { key:value, key:value ... }
        LLSDValue::Map(v) => {
            writer.push('{');
            let mut first = true;
            for (key, entry) in v {
                if !first {
                    writer.push(',');
                }
                first = false;
                if is_bare_key(key) {
                    writer.push_str(key);
                } else {
                    writer.push('s');
                    push_quoted(writer, key);
                }
                writer.push(':');
                generate_value(writer, entry);
            }
            writer.push('}');
        }
        //  Array is [ child, child ... ]
        LLSDValue::Array(v) => {
            writer.push('[');
            let mut first = true;
            for entry in v {
                if !first {
                    writer.push(',');
                }
                first = false;
                generate_value(writer, entry);
            }
            writer.push(']');
        }
    }
}

/// Single-quoted string with backslash escapes.
fn push_quoted(writer: &mut String, s: &str) {
    writer.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' | '\\' => {
                writer.push('\\');
                writer.push(ch);
            }
            '\n' => writer.push_str("\\n"),
            '\t' => writer.push_str("\\t"),
            '\r' => writer.push_str("\\r"),
            _ => writer.push(ch),
        }
    }
    writer.push('\'');
}

/// A key may go unquoted when it is a bare identifier.
fn is_bare_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

// Unit tests

#[test]
fn notationgen_roundtrip_is_byte_identical() {
    //  Bareword keys preserved, single quotes on strings.
    const TEXT: &str =
        "{name:s'Alice',scores:[i10,i20,r3.5],id:u550e8400-e29b-41d4-a716-446655440000}";
    let parsed = crate::de::notation::from_str(TEXT).unwrap();
    let generated = to_string(&parsed).unwrap();
    assert_eq!(generated, TEXT);
}

#[test]
fn notationgen_quotes_non_identifier_keys() {
    let parsed = crate::de::notation::from_str("{s'two words':i1,ok_2:i2}").unwrap();
    let generated = to_string(&parsed).unwrap();
    assert_eq!(generated, "{s'two words':i1,ok_2:i2}");
}

#[test]
fn notationgen_real_specials() {
    let value = LLSDValue::Array(vec![
        LLSDValue::Real(f64::NAN),
        LLSDValue::Real(f64::INFINITY),
        LLSDValue::Real(f64::NEG_INFINITY),
    ]);
    assert_eq!(to_string(&value).unwrap(), "[rnan,rinf,r-inf]");
}

#[test]
fn notationgen_escapes_strings() {
    let value = LLSDValue::String("it's\na\\test".to_string());
    let generated = to_string(&value).unwrap();
    assert_eq!(generated, r"s'it\'s\na\\test'");
    let parsed = crate::de::notation::from_str(&generated).unwrap();
    assert_eq!(parsed, value);
}

#[test]
fn notationgen_scalars() {
    let value = LLSDValue::Array(vec![
        LLSDValue::Undefined,
        LLSDValue::Boolean(true),
        LLSDValue::Boolean(false),
        LLSDValue::Binary(b"Hello".to_vec()),
    ]);
    assert_eq!(to_string(&value).unwrap(), "[!,1,0,b64\"SGVsbG8=\"]");
}
