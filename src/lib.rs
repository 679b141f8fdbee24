//
//  lib.rs
//
//  Rust library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  License: LGPL.
//
//
//  Modules
//
pub mod de;
pub mod error;
pub mod ser;
pub mod util;

#[cfg(test)]
mod tests;

pub use crate::{
    de::{detect_format, from_bytes, LLSDFormat},
    error::{ErrorKind, LLSDError, LLSDResult, Position},
};

use chrono::{DateTime, TimeZone, Utc};
use enum_as_inner::EnumAsInner;
use indexmap::IndexMap;
use uuid::Uuid;

/// Ordered map type used for the Map variant — preserves insertion order,
/// which every serializer must reproduce.
pub type LLSDMap = IndexMap<String, LLSDValue>;

/// The primitive LLSD data item.
/// Serialization takes a tree of these.
/// Deserialization returns a tree of these.
///
/// `Clone` is a deep clone: a value owns its children and clones never
/// alias. `PartialEq` is structural, with IEEE semantics for `Real`
/// (NaN is unequal to itself) and order-insensitive map comparison.
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum LLSDValue {
    Undefined,
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
    UUID(Uuid),
    Date(DateTime<Utc>),
    URI(String),
    Binary(Vec<u8>),
    Array(Vec<LLSDValue>),
    Map(LLSDMap),
}

/// The tag of an [`LLSDValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LLSDType {
    Undefined,
    Boolean,
    Integer,
    Real,
    String,
    UUID,
    Date,
    URI,
    Binary,
    Array,
    Map,
}

impl LLSDValue {
    /// Which variant this value is.
    pub fn kind(&self) -> LLSDType {
        match self {
            LLSDValue::Undefined => LLSDType::Undefined,
            LLSDValue::Boolean(_) => LLSDType::Boolean,
            LLSDValue::Integer(_) => LLSDType::Integer,
            LLSDValue::Real(_) => LLSDType::Real,
            LLSDValue::String(_) => LLSDType::String,
            LLSDValue::UUID(_) => LLSDType::UUID,
            LLSDValue::Date(_) => LLSDType::Date,
            LLSDValue::URI(_) => LLSDType::URI,
            LLSDValue::Binary(_) => LLSDType::Binary,
            LLSDValue::Array(_) => LLSDType::Array,
            LLSDValue::Map(_) => LLSDType::Map,
        }
    }

    /// Variant name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            LLSDValue::Undefined => "undefined",
            LLSDValue::Boolean(_) => "boolean",
            LLSDValue::Integer(_) => "integer",
            LLSDValue::Real(_) => "real",
            LLSDValue::String(_) => "string",
            LLSDValue::UUID(_) => "uuid",
            LLSDValue::Date(_) => "date",
            LLSDValue::URI(_) => "uri",
            LLSDValue::Binary(_) => "binary",
            LLSDValue::Array(_) => "array",
            LLSDValue::Map(_) => "map",
        }
    }

    /// Total number of values in this subtree, the root included.
    pub fn count_elements(&self) -> usize {
        match self {
            LLSDValue::Array(items) => {
                1 + items.iter().map(LLSDValue::count_elements).sum::<usize>()
            }
            LLSDValue::Map(entries) => {
                1 + entries
                    .values()
                    .map(LLSDValue::count_elements)
                    .sum::<usize>()
            }
            _ => 1,
        }
    }

    /// Depth of the deepest value in this subtree. A leaf is depth 1.
    pub fn max_depth(&self) -> usize {
        match self {
            LLSDValue::Array(items) => {
                1 + items.iter().map(LLSDValue::max_depth).max().unwrap_or(0)
            }
            LLSDValue::Map(entries) => {
                1 + entries
                    .values()
                    .map(LLSDValue::max_depth)
                    .max()
                    .unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Structural equality with reduced-precision real comparison.
    ///
    /// `bits` is the number of significand bits that must agree, in
    /// `[0, 52]`; sign and exponent must always agree. `bits = -1`
    /// requests IEEE `==` (so NaN compares unequal to itself). Map
    /// comparison ignores key order; Binary compares byte for byte.
    pub fn equals(&self, other: &LLSDValue, bits: i32) -> bool {
        match (self, other) {
            (LLSDValue::Undefined, LLSDValue::Undefined) => true,
            (LLSDValue::Boolean(a), LLSDValue::Boolean(b)) => a == b,
            (LLSDValue::Integer(a), LLSDValue::Integer(b)) => a == b,
            (LLSDValue::Real(a), LLSDValue::Real(b)) => real_equals(*a, *b, bits),
            (LLSDValue::String(a), LLSDValue::String(b)) => a == b,
            (LLSDValue::UUID(a), LLSDValue::UUID(b)) => a == b,
            (LLSDValue::Date(a), LLSDValue::Date(b)) => a == b,
            (LLSDValue::URI(a), LLSDValue::URI(b)) => a == b,
            (LLSDValue::Binary(a), LLSDValue::Binary(b)) => a == b,
            (LLSDValue::Array(a), LLSDValue::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y, bits))
            }
            (LLSDValue::Map(a), LLSDValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, va)| b.get(k).map_or(false, |vb| va.equals(vb, bits)))
            }
            _ => false,
        }
    }
}

/// Compare two reals on sign, exponent, and the top `bits` significand
/// bits. NaN never compares equal. `bits < 0` falls back to IEEE `==`.
pub(crate) fn real_equals(a: f64, b: f64, bits: i32) -> bool {
    if bits < 0 {
        return a == b;
    }
    if a.is_nan() || b.is_nan() {
        return false;
    }
    let kept = bits.min(52) as u32;
    let mask: u64 = !((1u64 << (52 - kept)) - 1);
    (a.to_bits() & mask) == (b.to_bits() & mask)
}

//
//  Parse limits
//
pub const DEFAULT_MAX_DEPTH: usize = 1_000;
pub const DEFAULT_MAX_ELEMENTS: usize = 100_000;
pub const DEFAULT_MAX_STRING_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_BINARY_BYTES: usize = 256 * 1024 * 1024;

/// Resource caps every parser enforces. Exceeding any of them fails the
/// parse with [`LLSDError::Limit`].
#[derive(Debug, Clone)]
pub struct ParseLimits {
    /// Maximum nesting depth of containers.
    pub max_depth: usize,
    /// Cumulative count of values produced by one parse.
    pub max_elements: usize,
    /// Largest accepted string payload, in bytes.
    pub max_string_bytes: usize,
    /// Largest accepted binary payload, in bytes.
    pub max_binary_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        ParseLimits {
            max_depth: DEFAULT_MAX_DEPTH,
            max_elements: DEFAULT_MAX_ELEMENTS,
            max_string_bytes: DEFAULT_MAX_STRING_BYTES,
            max_binary_bytes: DEFAULT_MAX_BINARY_BYTES,
        }
    }
}

/// Running enforcement of [`ParseLimits`] during one parse call.
pub(crate) struct LimitTracker<'a> {
    limits: &'a ParseLimits,
    produced: usize,
}

impl<'a> LimitTracker<'a> {
    pub fn new(limits: &'a ParseLimits) -> Self {
        LimitTracker {
            limits,
            produced: 0,
        }
    }

    /// Count one produced value against max-elements.
    pub fn note_value(&mut self, position: Position) -> LLSDResult<()> {
        self.produced += 1;
        if self.produced > self.limits.max_elements {
            return Err(LLSDError::limit(
                format!(
                    "element count {} exceeds max-elements {}",
                    self.produced, self.limits.max_elements
                ),
                position,
            ));
        }
        Ok(())
    }

    pub fn check_depth(&self, depth: usize, position: Position) -> LLSDResult<()> {
        if depth > self.limits.max_depth {
            return Err(LLSDError::limit(
                format!("depth {} exceeds max-depth {}", depth, self.limits.max_depth),
                position,
            ));
        }
        Ok(())
    }

    pub fn check_string(&self, len: usize, position: Position) -> LLSDResult<()> {
        if len > self.limits.max_string_bytes {
            return Err(LLSDError::limit(
                format!(
                    "string of {} bytes exceeds max-string-bytes {}",
                    len, self.limits.max_string_bytes
                ),
                position,
            ));
        }
        Ok(())
    }

    pub fn check_binary(&self, len: usize, position: Position) -> LLSDResult<()> {
        if len > self.limits.max_binary_bytes {
            return Err(LLSDError::limit(
                format!(
                    "binary of {} bytes exceeds max-binary-bytes {}",
                    len, self.limits.max_binary_bytes
                ),
                position,
            ));
        }
        Ok(())
    }
}

//
//  Shared text conversions for reals and dates. Every text codec
//  renders these the same way.
//

/// Render a real in the SL spellings: "nan", "inf", "-inf", otherwise
/// the shortest decimal that round-trips.
pub(crate) fn format_real(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        v.to_string()
    }
}

/// Parse a real body. The empty string is 0.0, per the XML defaulting
/// rules. Rust's own float parser already accepts "nan", "inf",
/// "-inf" and "infinity" in any case.
pub(crate) fn parse_real_text(text: &str) -> LLSDResult<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0.0);
    }
    Ok(text.parse::<f64>()?)
}

/// Render a date as ISO-8601 UTC, milliseconds only when non-zero.
pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    let format = if date.timestamp_subsec_millis() != 0 {
        chrono::SecondsFormat::Millis
    } else {
        chrono::SecondsFormat::Secs
    };
    date.to_rfc3339_opts(format, true)
}

/// Parse an ISO-8601 date body. The empty string is the Unix epoch.
/// Fractions finer than a millisecond are truncated; the model keeps
/// millisecond precision so the binary format's f64-seconds encoding
/// stays lossless.
pub(crate) fn parse_date_text(text: &str) -> LLSDResult<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(DateTime::<Utc>::UNIX_EPOCH);
    }
    let parsed = DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc);
    date_from_epoch_millis(parsed.timestamp_millis())
}

pub(crate) fn date_from_epoch_millis(millis: i64) -> LLSDResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| LLSDError::range(format!("date {} ms out of range", millis)))
}

/// Binary-format date payload: IEEE binary64 seconds since the epoch.
pub(crate) fn date_from_epoch_seconds(seconds: f64) -> LLSDResult<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(LLSDError::range(format!(
            "date seconds {} is not finite",
            seconds
        )));
    }
    let millis = seconds * 1000.0;
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return Err(LLSDError::range(format!(
            "date seconds {} out of range",
            seconds
        )));
    }
    date_from_epoch_millis(millis.round() as i64)
}

pub(crate) fn date_to_epoch_seconds(date: &DateTime<Utc>) -> f64 {
    date.timestamp_millis() as f64 / 1000.0
}
