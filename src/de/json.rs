//! # de/json -- de-serialize LLSD from its JSON projection.
//!
//!  Library for serializing and de-serializing data in
//!  Linden Lab Structured Data format.
//!
//!  JSON cannot natively distinguish UUID, URI, Date and Binary from
//!  String, so parsing applies the projection rules: UUID-shaped
//!  strings always promote, date and URI promotion are opt-in, and
//!  `{"__llsd_binary": "..."}` wrappers restore Binary when enabled.
//
//  License: LGPL.
//
use crate::error::{LLSDError, LLSDResult, Position};
use crate::util::is_canonical_uuid;
use crate::{LLSDMap, LLSDValue, ParseLimits};
use base64::Engine;
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use std::cell::{Cell, RefCell};
use std::fmt;

/// Key of the object wrapper that carries Binary through JSON.
pub const JSONBINARYWRAPKEY: &str = "__llsd_binary";

/// Options for the JSON parser.
#[derive(Debug, Clone)]
pub struct JsonParseOptions {
    pub limits: ParseLimits,
    /// Promote ISO-8601 strings to Date.
    pub date_detection: bool,
    /// Promote scheme://-shaped strings to URI.
    pub uri_detection: bool,
    /// Recognize the `{"__llsd_binary": "<base64>"}` wrapper.
    pub binary_wrap: bool,
    /// Read the sentinel strings "NaN", "Infinity", "-Infinity" back
    /// as non-finite reals.
    pub nonfinite_sentinels: bool,
}

impl Default for JsonParseOptions {
    fn default() -> Self {
        JsonParseOptions {
            limits: ParseLimits::default(),
            date_detection: false,
            uri_detection: false,
            binary_wrap: false,
            nonfinite_sentinels: true,
        }
    }
}

/// Parse the JSON projection of LLSD into an LLSD tree.
pub fn from_str(json_str: &str) -> LLSDResult<LLSDValue> {
    from_str_with(json_str, &JsonParseOptions::default())
}

/// Parse the JSON projection with explicit options.
pub fn from_str_with(json_str: &str, options: &JsonParseOptions) -> LLSDResult<LLSDValue> {
    let state = ParseState {
        options,
        produced: Cell::new(0),
        deferred: RefCell::new(None),
    };
    let mut deserializer = serde_json::Deserializer::from_str(json_str);
    let result = ValueSeed {
        state: &state,
        depth: 1,
    }
    .deserialize(&mut deserializer)
    .and_then(|value| deserializer.end().map(|_| value));
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            let position = if e.line() == 0 {
                Position::None
            } else {
                Position::LineColumn {
                    line: e.line(),
                    column: e.column(),
                }
            };
            //  An LLSD-level failure recorded mid-visit outranks the
            //  generic serde_json rendering of it.
            Err(match state.deferred.into_inner() {
                Some(err) => err.at(position),
                None => LLSDError::syntax_at(format!("invalid JSON: {}", e), position),
            })
        }
    }
}

/// Shared mutable parse state. serde errors are stringly typed, so the
/// precise LLSD error is parked here and recovered after the failure.
struct ParseState<'o> {
    options: &'o JsonParseOptions,
    produced: Cell<usize>,
    deferred: RefCell<Option<LLSDError>>,
}

impl<'o> ParseState<'o> {
    fn fail<E: de::Error>(&self, err: LLSDError) -> E {
        let rendered = err.to_string();
        *self.deferred.borrow_mut() = Some(err);
        E::custom(rendered)
    }

    fn note_value<E: de::Error>(&self) -> Result<(), E> {
        let produced = self.produced.get() + 1;
        self.produced.set(produced);
        if produced > self.options.limits.max_elements {
            return Err(self.fail(LLSDError::limit(
                format!(
                    "element count {} exceeds max-elements {}",
                    produced, self.options.limits.max_elements
                ),
                Position::None,
            )));
        }
        Ok(())
    }

    fn check_depth<E: de::Error>(&self, depth: usize) -> Result<(), E> {
        if depth > self.options.limits.max_depth {
            return Err(self.fail(LLSDError::limit(
                format!(
                    "depth {} exceeds max-depth {}",
                    depth, self.options.limits.max_depth
                ),
                Position::None,
            )));
        }
        Ok(())
    }
}

/// Builds one LLSDValue while serde_json walks the input.
struct ValueSeed<'o> {
    state: &'o ParseState<'o>,
    depth: usize,
}

impl<'de, 'o> DeserializeSeed<'de> for ValueSeed<'o> {
    type Value = LLSDValue;

    fn deserialize<D>(self, deserializer: D) -> Result<LLSDValue, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, 'o> Visitor<'de> for ValueSeed<'o> {
    type Value = LLSDValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<LLSDValue, E> {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        Ok(LLSDValue::Undefined)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<LLSDValue, E> {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        Ok(LLSDValue::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<LLSDValue, E> {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        i32::try_from(v)
            .map(LLSDValue::Integer)
            .map_err(|_| {
                self.state.fail(LLSDError::range(format!(
                    "integer {} does not fit in 32 bits",
                    v
                )))
            })
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<LLSDValue, E> {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        i32::try_from(v)
            .map(LLSDValue::Integer)
            .map_err(|_| {
                self.state.fail(LLSDError::range(format!(
                    "integer {} does not fit in 32 bits",
                    v
                )))
            })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<LLSDValue, E> {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        Ok(LLSDValue::Real(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<LLSDValue, E> {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        if v.len() > self.state.options.limits.max_string_bytes {
            return Err(self.state.fail(LLSDError::limit(
                format!(
                    "string of {} bytes exceeds max-string-bytes {}",
                    v.len(),
                    self.state.options.limits.max_string_bytes
                ),
                Position::None,
            )));
        }
        if is_canonical_uuid(v) {
            // The 8-4-4-4-12 pattern is unambiguous; always promote.
            if let Ok(parsed) = uuid::Uuid::parse_str(v) {
                return Ok(LLSDValue::UUID(parsed));
            }
        }
        if self.state.options.nonfinite_sentinels {
            match v {
                "NaN" => return Ok(LLSDValue::Real(f64::NAN)),
                "Infinity" => return Ok(LLSDValue::Real(f64::INFINITY)),
                "-Infinity" => return Ok(LLSDValue::Real(f64::NEG_INFINITY)),
                _ => {}
            }
        }
        if self.state.options.date_detection && !v.trim().is_empty() {
            // parse_date_text maps a blank body to the epoch, which
            // must not fire on ordinary whitespace strings.
            if let Ok(date) = crate::parse_date_text(v) {
                return Ok(LLSDValue::Date(date));
            }
        }
        if self.state.options.uri_detection && looks_like_uri(v) {
            return Ok(LLSDValue::URI(v.to_string()));
        }
        Ok(LLSDValue::String(v.to_string()))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<LLSDValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(ValueSeed {
            state: self.state,
            depth: self.depth + 1,
        })? {
            items.push(item);
        }
        Ok(LLSDValue::Array(items))
    }

    fn visit_map<A>(self, mut access: A) -> Result<LLSDValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        self.state.check_depth(self.depth)?;
        self.state.note_value()?;
        let mut map = LLSDMap::new();
        while let Some(key) = access.next_key::<String>()? {
            if map.contains_key(&key) {
                return Err(self
                    .state
                    .fail(LLSDError::duplicate_key(key, Position::None)));
            }
            let value = access.next_value_seed(ValueSeed {
                state: self.state,
                depth: self.depth + 1,
            })?;
            map.insert(key, value);
        }
        //  Unwrap the binary carrier object when asked to.
        if self.state.options.binary_wrap && map.len() == 1 {
            if let Some(LLSDValue::String(body)) = map.get(JSONBINARYWRAPKEY) {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(body)
                    .map_err(|e| self.state.fail(LLSDError::from(e)))?;
                if bytes.len() > self.state.options.limits.max_binary_bytes {
                    return Err(self.state.fail(LLSDError::limit(
                        format!(
                            "binary of {} bytes exceeds max-binary-bytes {}",
                            bytes.len(),
                            self.state.options.limits.max_binary_bytes
                        ),
                        Position::None,
                    )));
                }
                return Ok(LLSDValue::Binary(bytes));
            }
        }
        Ok(LLSDValue::Map(map))
    }
}

/// Conservative scheme://... shape check for opt-in URI promotion.
fn looks_like_uri(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once("://") else {
        return false;
    };
    if scheme.is_empty() || rest.is_empty() {
        return false;
    }
    let mut chars = scheme.chars();
    chars.next().map_or(false, |c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
        && !s.contains(char::is_whitespace)
}

// Unit tests

#[test]
fn jsonparse_basic_types() {
    let parsed = from_str(r#"[null, true, false, 42, -7, 3.5, 1e3, "hello"]"#).unwrap();
    assert_eq!(
        parsed,
        LLSDValue::Array(vec![
            LLSDValue::Undefined,
            LLSDValue::Boolean(true),
            LLSDValue::Boolean(false),
            LLSDValue::Integer(42),
            LLSDValue::Integer(-7),
            LLSDValue::Real(3.5),
            LLSDValue::Real(1000.0),
            LLSDValue::String("hello".to_string()),
        ])
    );
}

#[test]
fn jsonparse_uuid_always_promotes() {
    let parsed = from_str(r#""550e8400-e29b-41d4-a716-446655440000""#).unwrap();
    assert_eq!(
        parsed,
        LLSDValue::UUID(uuid::uuid!("550e8400-e29b-41d4-a716-446655440000"))
    );
    //  Near misses stay strings.
    let parsed = from_str(r#""550e8400-e29b-41d4-a716-44665544000g""#).unwrap();
    assert_eq!(parsed.kind(), crate::LLSDType::String);
}

#[test]
fn jsonparse_sentinel_nonfinite() {
    let parsed = from_str(r#"["NaN", "Infinity", "-Infinity"]"#).unwrap();
    let arr = parsed.as_array().unwrap();
    assert!(arr[0].as_real().unwrap().is_nan());
    assert_eq!(*arr[1].as_real().unwrap(), f64::INFINITY);
    assert_eq!(*arr[2].as_real().unwrap(), f64::NEG_INFINITY);
    //  With detection off they stay strings.
    let options = JsonParseOptions {
        nonfinite_sentinels: false,
        ..JsonParseOptions::default()
    };
    let parsed = from_str_with(r#"["NaN"]"#, &options).unwrap();
    assert_eq!(
        parsed,
        LLSDValue::Array(vec![LLSDValue::String("NaN".to_string())])
    );
}

#[test]
fn jsonparse_date_and_uri_detection_are_opt_in() {
    const TEXT: &str = r#"["2006-02-01T14:29:53Z", "http://example.com/x"]"#;
    let parsed = from_str(TEXT).unwrap();
    assert_eq!(parsed.as_array().unwrap()[0].kind(), crate::LLSDType::String);
    assert_eq!(parsed.as_array().unwrap()[1].kind(), crate::LLSDType::String);
    let options = JsonParseOptions {
        date_detection: true,
        uri_detection: true,
        ..JsonParseOptions::default()
    };
    let parsed = from_str_with(TEXT, &options).unwrap();
    assert_eq!(parsed.as_array().unwrap()[0].kind(), crate::LLSDType::Date);
    assert_eq!(
        parsed.as_array().unwrap()[1],
        LLSDValue::URI("http://example.com/x".to_string())
    );
}

#[test]
fn jsonparse_binary_wrap() {
    const TEXT: &str = r#"{"__llsd_binary": "SGVsbG8="}"#;
    //  Off by default: it is just a map.
    assert_eq!(from_str(TEXT).unwrap().kind(), crate::LLSDType::Map);
    let options = JsonParseOptions {
        binary_wrap: true,
        ..JsonParseOptions::default()
    };
    assert_eq!(
        from_str_with(TEXT, &options).unwrap(),
        LLSDValue::Binary(b"Hello".to_vec())
    );
}

#[test]
fn jsonparse_integer_range() {
    let err = from_str("5000000000").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Range);
    let err = from_str("-5000000000").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Range);
}

#[test]
fn jsonparse_rejects_duplicate_keys() {
    let err = from_str(r#"{"a": 1, "a": 2}"#).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::DuplicateKey);
}

#[test]
fn jsonparse_preserves_map_order() {
    let parsed = from_str(r#"{"zebra": 1, "aardvark": 2, "mongoose": 3}"#).unwrap();
    let keys: Vec<&str> = parsed.as_map().unwrap().keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["zebra", "aardvark", "mongoose"]);
}

#[test]
fn jsonparse_depth_limit() {
    let options = JsonParseOptions {
        limits: ParseLimits {
            max_depth: 3,
            ..ParseLimits::default()
        },
        ..JsonParseOptions::default()
    };
    assert!(from_str_with("[[1]]", &options).is_ok());
    let err = from_str_with("[[[1]]]", &options).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Limit);
}

#[test]
fn jsonparse_rejects_trailing_data() {
    let err = from_str("1 2").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Syntax);
}
