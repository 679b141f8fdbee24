//
//  ser/binary -- serialize LLSD, binary form.
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  Binary format, serialization.
//
//  License: LGPL.
//
use crate::error::{LLSDError, LLSDResult};
use crate::LLSDValue;
use std::io::Write;
//
//  Constants
//
pub use crate::de::binary::{LLSDBINARYMAGIC, LLSDBINARYSENTINEL, LLSDBINARYVERSION};

/// Outputs an LLSDValue as a string of bytes in LLSD "binary" format,
/// 6-byte frame included.
pub fn to_bytes(value: &LLSDValue) -> LLSDResult<Vec<u8>> {
    let mut writer: Vec<u8> = Vec::new(); // just make a stream and use the stream form
    to_writer(&mut writer, value)?;
    Ok(writer)
}

/// Outputs an LLSD value to an output stream.
pub fn to_writer<W: Write>(writer: &mut W, value: &LLSDValue) -> LLSDResult<()> {
    writer.write_all(LLSDBINARYMAGIC)?;
    writer.write_all(&[LLSDBINARYVERSION])?;
    generate_value(writer, value)?;
    writer.flush()?;
    Ok(())
}

/// A length that goes on the wire as a u32.
fn wire_len(len: usize, what: &str) -> LLSDResult<u32> {
    u32::try_from(len)
        .map_err(|_| LLSDError::range(format!("{} of {} bytes exceeds u32 length", what, len)))
}

/// Generate one tagged value. Recursive.
fn generate_value<W: Write>(writer: &mut W, value: &LLSDValue) -> LLSDResult<()> {
    match value {
        LLSDValue::Undefined => writer.write_all(&[0x00])?,
        LLSDValue::Boolean(v) => {
            writer.write_all(&[0x01, u8::from(*v)])?;
        }
        LLSDValue::Integer(v) => {
            writer.write_all(&[0x02])?;
            writer.write_all(&v.to_be_bytes())?;
        }
        LLSDValue::Real(v) => {
            writer.write_all(&[0x03])?;
            writer.write_all(&v.to_be_bytes())?;
        }
        LLSDValue::String(v) => {
            writer.write_all(&[0x04])?;
            writer.write_all(&wire_len(v.len(), "string")?.to_be_bytes())?;
            writer.write_all(v.as_bytes())?;
        }
        LLSDValue::UUID(v) => {
            writer.write_all(&[0x05])?;
            writer.write_all(v.as_bytes())?;
        }
        LLSDValue::Date(v) => {
            writer.write_all(&[0x06])?;
            writer.write_all(&crate::date_to_epoch_seconds(v).to_be_bytes())?;
        }
        LLSDValue::URI(v) => {
            writer.write_all(&[0x07])?;
            writer.write_all(&wire_len(v.len(), "uri")?.to_be_bytes())?;
            writer.write_all(v.as_bytes())?;
        }
        LLSDValue::Binary(v) => {
            writer.write_all(&[0x08])?;
            writer.write_all(&wire_len(v.len(), "binary")?.to_be_bytes())?;
            writer.write_all(v)?;
        }
        //  Array is count, then each value.
        LLSDValue::Array(v) => {
            writer.write_all(&[0x09])?;
            writer.write_all(&wire_len(v.len(), "array")?.to_be_bytes())?;
            for entry in v {
                generate_value(writer, entry)?;
            }
        }
        //  Map is count, then (key length, key, value) per entry.
        LLSDValue::Map(v) => {
            writer.write_all(&[0x0A])?;
            writer.write_all(&wire_len(v.len(), "map")?.to_be_bytes())?;
            for (key, entry) in v {
                writer.write_all(&wire_len(key.len(), "map key")?.to_be_bytes())?;
                writer.write_all(key.as_bytes())?;
                generate_value(writer, entry)?;
            }
        }
    };
    Ok(())
}

// Unit tests

#[test]
fn binarygen_emits_exact_frame_and_tags() {
    use crate::LLSDMap;
    let mut map = LLSDMap::new();
    map.insert("x".to_string(), LLSDValue::Real(f64::NAN));
    let bytes = to_bytes(&LLSDValue::Map(map)).unwrap();
    assert_eq!(
        bytes,
        [
            0x6C, 0x6C, 0x73, 0x64, 0x2D, 0x01, 0x0A, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
            0x01, 0x78, 0x03, 0x7F, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]
    );
}

#[test]
fn binarygen_integer_layout() {
    let bytes = to_bytes(&LLSDValue::Integer(-2)).unwrap();
    assert_eq!(bytes, b"llsd-\x01\x02\xFF\xFF\xFF\xFE");
}

#[test]
fn binarygen_preserves_map_order() {
    use crate::LLSDMap;
    let mut map = LLSDMap::new();
    for key in ["zebra", "aardvark", "mongoose"] {
        map.insert(key.to_string(), LLSDValue::Undefined);
    }
    let bytes = to_bytes(&LLSDValue::Map(map)).unwrap();
    let zebra = bytes.windows(5).position(|w| w == b"zebra").unwrap();
    let aardvark = bytes.windows(8).position(|w| w == b"aardvark").unwrap();
    let mongoose = bytes.windows(8).position(|w| w == b"mongoose").unwrap();
    assert!(zebra < aardvark && aardvark < mongoose);
}
