//! # ser/json -- serialize LLSD to its JSON projection.
//!
//!  Library for serializing and de-serializing data in
//!  Linden Lab Structured Data format.
//!
//!  UUID, URI and Date become strings, Binary becomes base64 (or the
//!  `{"__llsd_binary": ...}` wrapper), Undefined becomes null, and
//!  non-finite reals become the sentinel strings "NaN", "Infinity"
//!  and "-Infinity". This is interop plumbing, not the canonical
//!  format; route through XML, notation or binary for full fidelity.
//
//  License: LGPL.
//
use crate::de::json::JSONBINARYWRAPKEY;
use crate::error::{LLSDError, LLSDResult};
use crate::LLSDValue;
use base64::Engine;
use std::io::Write;

/// Options for the JSON serializer.
#[derive(Debug, Clone, Default)]
pub struct JsonSerOptions {
    /// Emit Binary as the `{"__llsd_binary": "<base64>"}` wrapper so
    /// it survives a round trip.
    pub binary_wrap: bool,
    /// Multi-line indented output instead of the compact form.
    pub pretty: bool,
}

/// Outputs an LLSDValue as JSON text.
pub fn to_string(value: &LLSDValue) -> LLSDResult<String> {
    to_string_with(value, &JsonSerOptions::default())
}

/// Outputs an LLSDValue as JSON text with explicit options.
pub fn to_string_with(value: &LLSDValue, options: &JsonSerOptions) -> LLSDResult<String> {
    let json = project(value, options);
    let rendered = if options.pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    rendered.map_err(|e| LLSDError::syntax(format!("JSON serialization failed: {}", e)))
}

/// Outputs an LLSD value as JSON to an output stream.
pub fn to_writer<W: Write>(writer: &mut W, value: &LLSDValue) -> LLSDResult<()> {
    let rendered = to_string(value)?;
    writer.write_all(rendered.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Map one LLSD value onto the JSON data model. Recursive.
fn project(value: &LLSDValue, options: &JsonSerOptions) -> serde_json::Value {
    match value {
        LLSDValue::Undefined => serde_json::Value::Null,
        LLSDValue::Boolean(v) => serde_json::Value::Bool(*v),
        LLSDValue::Integer(v) => serde_json::Value::from(*v),
        LLSDValue::Real(v) => {
            if v.is_nan() {
                serde_json::Value::from("NaN")
            } else if *v == f64::INFINITY {
                serde_json::Value::from("Infinity")
            } else if *v == f64::NEG_INFINITY {
                serde_json::Value::from("-Infinity")
            } else {
                // serde_json always renders a finite f64 with a '.'
                // or an exponent, keeping Integer and Real distinct.
                serde_json::Value::from(*v)
            }
        }
        LLSDValue::String(v) => serde_json::Value::from(v.as_str()),
        LLSDValue::UUID(v) => serde_json::Value::from(v.to_string()),
        LLSDValue::Date(v) => serde_json::Value::from(crate::format_date(v)),
        LLSDValue::URI(v) => serde_json::Value::from(v.as_str()),
        LLSDValue::Binary(v) => {
            let body = base64::engine::general_purpose::STANDARD.encode(v);
            if options.binary_wrap {
                let mut wrapper = serde_json::Map::new();
                wrapper.insert(JSONBINARYWRAPKEY.to_string(), serde_json::Value::from(body));
                serde_json::Value::Object(wrapper)
            } else {
                serde_json::Value::from(body)
            }
        }
        LLSDValue::Array(v) => {
            serde_json::Value::Array(v.iter().map(|entry| project(entry, options)).collect())
        }
        //  The preserve_order feature keeps insertion order here.
        LLSDValue::Map(v) => serde_json::Value::Object(
            v.iter()
                .map(|(key, entry)| (key.clone(), project(entry, options)))
                .collect(),
        ),
    }
}

// Unit tests

#[test]
fn jsongen_basic_types() {
    let value = LLSDValue::Array(vec![
        LLSDValue::Undefined,
        LLSDValue::Boolean(true),
        LLSDValue::Integer(42),
        LLSDValue::Real(3.5),
        LLSDValue::String("hi".to_string()),
    ]);
    assert_eq!(to_string(&value).unwrap(), r#"[null,true,42,3.5,"hi"]"#);
}

#[test]
fn jsongen_integer_vs_real_distinction() {
    //  Integral reals still carry a fractional part.
    let value = LLSDValue::Array(vec![LLSDValue::Integer(3), LLSDValue::Real(3.0)]);
    assert_eq!(to_string(&value).unwrap(), "[3,3.0]");
}

#[test]
fn jsongen_nonfinite_sentinels() {
    let value = LLSDValue::Array(vec![
        LLSDValue::Real(f64::NAN),
        LLSDValue::Real(f64::INFINITY),
        LLSDValue::Real(f64::NEG_INFINITY),
    ]);
    assert_eq!(
        to_string(&value).unwrap(),
        r#"["NaN","Infinity","-Infinity"]"#
    );
}

#[test]
fn jsongen_binary_modes() {
    let value = LLSDValue::Binary(b"Hello".to_vec());
    assert_eq!(to_string(&value).unwrap(), r#""SGVsbG8=""#);
    let options = JsonSerOptions {
        binary_wrap: true,
        ..JsonSerOptions::default()
    };
    assert_eq!(
        to_string_with(&value, &options).unwrap(),
        r#"{"__llsd_binary":"SGVsbG8="}"#
    );
}

#[test]
fn jsongen_preserves_map_order() {
    use crate::LLSDMap;
    let mut map = LLSDMap::new();
    map.insert("zebra".to_string(), LLSDValue::Integer(1));
    map.insert("aardvark".to_string(), LLSDValue::Integer(2));
    assert_eq!(
        to_string(&LLSDValue::Map(map)).unwrap(),
        r#"{"zebra":1,"aardvark":2}"#
    );
}

#[test]
fn jsongen_typed_scalars_as_strings() {
    use chrono::TimeZone;
    let value = LLSDValue::Array(vec![
        LLSDValue::UUID(uuid::uuid!("550e8400-e29b-41d4-a716-446655440000")),
        LLSDValue::URI("http://example.com/".to_string()),
        LLSDValue::Date(chrono::Utc.timestamp_millis_opt(1138804193000).unwrap()),
    ]);
    assert_eq!(
        to_string(&value).unwrap(),
        r#"["550e8400-e29b-41d4-a716-446655440000","http://example.com/","2006-02-01T14:29:53Z"]"#
    );
}
