//
//  de/binary -- de-serialize LLSD, binary form.
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  Binary format: a 6-byte "llsd-" + version frame, then one tagged
//  value. All integers are big-endian.
//
//  License: LGPL.
//
use crate::error::{LLSDError, LLSDResult, Position};
use crate::{LLSDMap, LLSDValue, LimitTracker, ParseLimits};
use std::io::Read;
//
//  Constants
//
/// Magic bytes that begin every binary LLSD document.
pub const LLSDBINARYMAGIC: &[u8] = b"llsd-";
/// Format version carried in the byte after the magic.
pub const LLSDBINARYVERSION: u8 = 0x01;
/// The full 6-byte frame.
pub const LLSDBINARYSENTINEL: &[u8] = b"llsd-\x01";

/// One-byte type tags of the binary encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryTag {
    Undefined = 0x00,
    Boolean = 0x01,
    Integer = 0x02,
    Real = 0x03,
    String = 0x04,
    UUID = 0x05,
    Date = 0x06,
    URI = 0x07,
    Binary = 0x08,
    Array = 0x09,
    Map = 0x0A,
}

impl TryFrom<u8> for BinaryTag {
    type Error = LLSDError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(BinaryTag::Undefined),
            0x01 => Ok(BinaryTag::Boolean),
            0x02 => Ok(BinaryTag::Integer),
            0x03 => Ok(BinaryTag::Real),
            0x04 => Ok(BinaryTag::String),
            0x05 => Ok(BinaryTag::UUID),
            0x06 => Ok(BinaryTag::Date),
            0x07 => Ok(BinaryTag::URI),
            0x08 => Ok(BinaryTag::Binary),
            0x09 => Ok(BinaryTag::Array),
            0x0A => Ok(BinaryTag::Map),
            other => Err(LLSDError::syntax(format!(
                "unknown binary type tag 0x{:02X}",
                other
            ))),
        }
    }
}

/// Options for the binary parser.
#[derive(Debug, Clone, Default)]
pub struct BinaryParseOptions {
    pub limits: ParseLimits,
    /// Accept the legacy 5-byte unversioned frame. A byte of 0x01
    /// after the magic is still read as the version.
    pub legacy_header: bool,
}

/// Parse binary LLSD, frame included, into an LLSD tree.
pub fn from_bytes(b: &[u8]) -> LLSDResult<LLSDValue> {
    from_bytes_with(b, &BinaryParseOptions::default())
}

/// Parse binary LLSD with explicit options.
pub fn from_bytes_with(b: &[u8], options: &BinaryParseOptions) -> LLSDResult<LLSDValue> {
    let mut parser = BinaryParser {
        data: b,
        offset: 0,
        tracker: LimitTracker::new(&options.limits),
    };
    parser.parse_frame(options.legacy_header)?;
    let value = parser.parse_value(1)?;
    if parser.offset != parser.data.len() {
        return Err(LLSDError::syntax_at(
            format!("{} trailing bytes after value", parser.data.len() - parser.offset),
            parser.position(),
        ));
    }
    Ok(value)
}

/// Read a whole binary LLSD document from a stream and parse it.
pub fn from_reader(rdr: &mut dyn Read) -> LLSDResult<LLSDValue> {
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf)?;
    from_bytes(&buf)
}

struct BinaryParser<'a, 'l> {
    data: &'a [u8],
    offset: usize,
    tracker: LimitTracker<'l>,
}

impl<'a, 'l> BinaryParser<'a, 'l> {
    fn position(&self) -> Position {
        Position::Offset(self.offset)
    }

    /// Check the 6-byte frame. Fails before any value byte is consumed.
    fn parse_frame(&mut self, legacy_header: bool) -> LLSDResult<()> {
        if self.data.len() < LLSDBINARYMAGIC.len() + 1
            || &self.data[..LLSDBINARYMAGIC.len()] != LLSDBINARYMAGIC
        {
            return Err(LLSDError::syntax_at(
                "missing llsd- binary magic",
                Position::Offset(0),
            ));
        }
        self.offset = LLSDBINARYMAGIC.len();
        match self.data[self.offset] {
            LLSDBINARYVERSION => {
                self.offset += 1;
                Ok(())
            }
            //  Unversioned legacy frame: the next byte is the first
            //  value tag. A leading 0x01 always reads as the version.
            _ if legacy_header => Ok(()),
            other => Err(LLSDError::syntax_at(
                format!("unsupported binary version 0x{:02X}", other),
                self.position(),
            )),
        }
    }

    fn read_u8(&mut self) -> LLSDResult<u8> {
        let b = self.read_bytes(1)?;
        Ok(b[0])
    }

    fn read_u32(&mut self) -> LLSDResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> LLSDResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f64(&mut self) -> LLSDResult<f64> {
        let b = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_be_bytes(raw))
    }

    /// Take `len` bytes, checking against what actually remains before
    /// anything is materialized.
    fn read_bytes(&mut self, len: usize) -> LLSDResult<&'a [u8]> {
        let remaining = self.data.len() - self.offset;
        if len > remaining {
            return Err(LLSDError::syntax_at(
                format!("need {} bytes, only {} remain", len, remaining),
                self.position(),
            ));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_string(&mut self) -> LLSDResult<String> {
        let position = self.position();
        let len = self.read_u32()? as usize;
        self.tracker.check_string(len, position)?;
        let bytes = self.read_bytes(len)?;
        Ok(std::str::from_utf8(bytes)
            .map_err(|e| LLSDError::from(e).at(position))?
            .to_string())
    }

    /// Parse one value - real, integer, map, etc. Recursive.
    fn parse_value(&mut self, depth: usize) -> LLSDResult<LLSDValue> {
        self.tracker.check_depth(depth, self.position())?;
        self.tracker.note_value(self.position())?;
        let tag_position = self.position();
        let tag = BinaryTag::try_from(self.read_u8()?).map_err(|e| e.at(tag_position))?;
        match tag {
            BinaryTag::Undefined => Ok(LLSDValue::Undefined),
            BinaryTag::Boolean => Ok(LLSDValue::Boolean(self.read_u8()? != 0)),
            BinaryTag::Integer => Ok(LLSDValue::Integer(self.read_i32()?)),
            BinaryTag::Real => Ok(LLSDValue::Real(self.read_f64()?)),
            BinaryTag::String => Ok(LLSDValue::String(self.read_string()?)),
            BinaryTag::UUID => {
                let bytes = self.read_bytes(16)?;
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Ok(LLSDValue::UUID(uuid::Uuid::from_bytes(raw)))
            }
            BinaryTag::Date => {
                let position = self.position();
                let seconds = self.read_f64()?;
                Ok(LLSDValue::Date(
                    crate::date_from_epoch_seconds(seconds).map_err(|e| e.at(position))?,
                ))
            }
            BinaryTag::URI => Ok(LLSDValue::URI(self.read_string()?)),
            BinaryTag::Binary => {
                let position = self.position();
                let len = self.read_u32()? as usize;
                self.tracker.check_binary(len, position)?;
                Ok(LLSDValue::Binary(self.read_bytes(len)?.to_vec()))
            }
            BinaryTag::Array => {
                let count = self.read_u32()?;
                //  No preallocation from the wire-supplied count.
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.parse_value(depth + 1)?);
                }
                Ok(LLSDValue::Array(items))
            }
            BinaryTag::Map => {
                let count = self.read_u32()?;
                let mut map = LLSDMap::new();
                for _ in 0..count {
                    let key_position = self.position();
                    let key = self.read_string()?;
                    let value = self.parse_value(depth + 1)?;
                    if map.insert(key.clone(), value).is_some() {
                        return Err(LLSDError::duplicate_key(key, key_position));
                    }
                }
                Ok(LLSDValue::Map(map))
            }
        }
    }
}

// Unit tests

#[test]
fn binaryparsetest1() {
    //  Construct a test value.
    let mut test1map = LLSDMap::new();
    test1map.insert("val1".to_string(), LLSDValue::Real(456.0));
    test1map.insert("val2".to_string(), LLSDValue::Integer(999));
    let test1 = LLSDValue::Array(vec![
        LLSDValue::Real(123.5),
        LLSDValue::Map(test1map),
        LLSDValue::Integer(42),
        LLSDValue::String("Hello world".to_string()),
    ]);
    //  Convert to binary form.
    let test1bin = crate::ser::binary::to_bytes(&test1).unwrap();
    //  Convert back to value form.
    let test1value = from_bytes(&test1bin).unwrap();
    //  Check that results match after round trip.
    assert_eq!(test1, test1value);
}

#[test]
fn binaryparse_nan_map() {
    //  Header; Map tag; one entry; key "x"; Real NaN.
    const BYTES: [u8; 24] = [
        0x6C, 0x6C, 0x73, 0x64, 0x2D, 0x01, 0x0A, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
        0x78, 0x03, 0x7F, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    let parsed = from_bytes(&BYTES).unwrap();
    let map = parsed.as_map().unwrap();
    assert_eq!(map.len(), 1);
    assert!(map["x"].as_real().unwrap().is_nan());
}

#[test]
fn binaryparse_rejects_bad_frame() {
    //  Wrong magic fails before any value byte is read.
    assert_eq!(
        from_bytes(b"llsd+\x01\x00").unwrap_err().kind(),
        crate::ErrorKind::Syntax
    );
    //  Wrong version.
    assert_eq!(
        from_bytes(b"llsd-\x02\x00").unwrap_err().kind(),
        crate::ErrorKind::Syntax
    );
    //  Too short for any frame.
    assert_eq!(
        from_bytes(b"llsd-").unwrap_err().kind(),
        crate::ErrorKind::Syntax
    );
}

#[test]
fn binaryparse_legacy_header() {
    //  Unversioned frame with an Integer value.
    let legacy = b"llsd-\x02\x00\x00\x00\x2A";
    assert!(from_bytes(legacy).is_err());
    let options = BinaryParseOptions {
        legacy_header: true,
        ..BinaryParseOptions::default()
    };
    assert_eq!(
        from_bytes_with(legacy, &options).unwrap(),
        LLSDValue::Integer(42)
    );
}

#[test]
fn binaryparse_rejects_unknown_tag() {
    let err = from_bytes(b"llsd-\x01\x0B").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Syntax);
}

#[test]
fn binaryparse_rejects_overlong_length() {
    //  String claims 16 bytes, only 3 present.
    let err = from_bytes(b"llsd-\x01\x04\x00\x00\x00\x10abc").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Syntax);
}

#[test]
fn binaryparse_rejects_bad_utf8() {
    let err = from_bytes(b"llsd-\x01\x04\x00\x00\x00\x02\xFF\xFE").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Encoding);
}

#[test]
fn binaryparse_rejects_duplicate_keys() {
    //  Map with key "a" twice.
    let mut bytes = Vec::from(&b"llsd-\x01"[..]);
    bytes.push(0x0A);
    bytes.extend_from_slice(&2u32.to_be_bytes());
    for _ in 0..2 {
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.push(b'a');
        bytes.push(0x00); // undef value
    }
    let err = from_bytes(&bytes).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::DuplicateKey);
}

#[test]
fn binaryparse_depth_limit() {
    //  Array nested 4 deep: [[[i1]]] is depth 4 counting the integer.
    let mut bytes = Vec::from(&b"llsd-\x01"[..]);
    for _ in 0..3 {
        bytes.push(0x09);
        bytes.extend_from_slice(&1u32.to_be_bytes());
    }
    bytes.push(0x02);
    bytes.extend_from_slice(&1i32.to_be_bytes());
    let ok_options = BinaryParseOptions {
        limits: ParseLimits {
            max_depth: 4,
            ..ParseLimits::default()
        },
        ..BinaryParseOptions::default()
    };
    assert!(from_bytes_with(&bytes, &ok_options).is_ok());
    let tight_options = BinaryParseOptions {
        limits: ParseLimits {
            max_depth: 3,
            ..ParseLimits::default()
        },
        ..BinaryParseOptions::default()
    };
    let err = from_bytes_with(&bytes, &tight_options).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Limit);
}

#[test]
fn binaryparse_element_limit() {
    let mut bytes = Vec::from(&b"llsd-\x01"[..]);
    bytes.push(0x09);
    bytes.extend_from_slice(&10u32.to_be_bytes());
    for _ in 0..10 {
        bytes.push(0x00);
    }
    let options = BinaryParseOptions {
        limits: ParseLimits {
            max_elements: 5,
            ..ParseLimits::default()
        },
        ..BinaryParseOptions::default()
    };
    let err = from_bytes_with(&bytes, &options).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Limit);
}
