//
//  error.rs -- unified error type for LLSD parsing and serialization.
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  License: LGPL.
//
use std::fmt;

/// Result alias used by every fallible operation in this crate.
pub type LLSDResult<T> = Result<T, LLSDError>;

/// Where in the input an error was detected.
///
/// Byte-oriented parsers report a byte offset, the notation parser a
/// character offset, and the JSON parser a line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    /// Position not known.
    #[default]
    None,
    /// Byte or character offset from the start of the input.
    Offset(usize),
    /// One-based line and column.
    LineColumn { line: usize, column: usize },
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::None => Ok(()),
            Position::Offset(offset) => write!(f, " at offset {}", offset),
            Position::LineColumn { line, column } => {
                write!(f, " at line {}, column {}", line, column)
            }
        }
    }
}

/// The failure kind, for callers that dispatch without matching the
/// full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Encoding,
    Range,
    WrongType,
    DuplicateKey,
    Limit,
    Io,
    Validation,
}

/// Unified error for all codecs and utilities: a kind, a message, and
/// where available a position in the input.
#[derive(Debug, thiserror::Error)]
pub enum LLSDError {
    /// Malformed input for the declared format.
    #[error("syntax error: {message}{position}")]
    Syntax { message: String, position: Position },
    /// Bytes are not valid UTF-8, base64, or hex.
    #[error("encoding error: {message}{position}")]
    Encoding { message: String, position: Position },
    /// Numeric literal outside the representable range.
    #[error("value out of range: {message}{position}")]
    Range { message: String, position: Position },
    /// A typed accessor or operation met an incompatible variant.
    #[error("wrong type: {message}")]
    WrongType { message: String },
    /// A map contained the same key twice.
    #[error("duplicate map key {key:?}{position}")]
    DuplicateKey { key: String, position: Position },
    /// Depth or element-count cap exceeded.
    #[error("limit exceeded: {message}{position}")]
    Limit { message: String, position: Position },
    /// Underlying byte-stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Utility-level structural check failed.
    #[error("validation failed: {message}")]
    Validation { message: String },
}

impl LLSDError {
    pub fn syntax(message: impl Into<String>) -> Self {
        LLSDError::Syntax {
            message: message.into(),
            position: Position::None,
        }
    }

    pub fn syntax_at(message: impl Into<String>, position: Position) -> Self {
        LLSDError::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        LLSDError::Encoding {
            message: message.into(),
            position: Position::None,
        }
    }

    pub fn range(message: impl Into<String>) -> Self {
        LLSDError::Range {
            message: message.into(),
            position: Position::None,
        }
    }

    pub fn wrong_type(message: impl Into<String>) -> Self {
        LLSDError::WrongType {
            message: message.into(),
        }
    }

    pub fn duplicate_key(key: impl Into<String>, position: Position) -> Self {
        LLSDError::DuplicateKey {
            key: key.into(),
            position,
        }
    }

    pub fn limit(message: impl Into<String>, position: Position) -> Self {
        LLSDError::Limit {
            message: message.into(),
            position,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LLSDError::Validation {
            message: message.into(),
        }
    }

    /// Attach a position to an error that was built without one.
    pub fn at(mut self, new_position: Position) -> Self {
        match &mut self {
            LLSDError::Syntax { position, .. }
            | LLSDError::Encoding { position, .. }
            | LLSDError::Range { position, .. }
            | LLSDError::DuplicateKey { position, .. }
            | LLSDError::Limit { position, .. } => {
                if *position == Position::None {
                    *position = new_position;
                }
            }
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LLSDError::Syntax { .. } => ErrorKind::Syntax,
            LLSDError::Encoding { .. } => ErrorKind::Encoding,
            LLSDError::Range { .. } => ErrorKind::Range,
            LLSDError::WrongType { .. } => ErrorKind::WrongType,
            LLSDError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            LLSDError::Limit { .. } => ErrorKind::Limit,
            LLSDError::Io(_) => ErrorKind::Io,
            LLSDError::Validation { .. } => ErrorKind::Validation,
        }
    }
}

impl From<std::str::Utf8Error> for LLSDError {
    fn from(e: std::str::Utf8Error) -> Self {
        LLSDError::encoding(format!("invalid UTF-8: {}", e))
    }
}

impl From<std::string::FromUtf8Error> for LLSDError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        LLSDError::encoding(format!("invalid UTF-8: {}", e))
    }
}

impl From<base64::DecodeError> for LLSDError {
    fn from(e: base64::DecodeError) -> Self {
        LLSDError::encoding(format!("invalid base64: {}", e))
    }
}

impl From<hex::FromHexError> for LLSDError {
    fn from(e: hex::FromHexError) -> Self {
        LLSDError::encoding(format!("invalid base16: {}", e))
    }
}

impl From<uuid::Error> for LLSDError {
    fn from(e: uuid::Error) -> Self {
        LLSDError::syntax(format!("invalid UUID: {}", e))
    }
}

impl From<chrono::ParseError> for LLSDError {
    fn from(e: chrono::ParseError) -> Self {
        LLSDError::syntax(format!("invalid date: {}", e))
    }
}

impl From<std::num::ParseFloatError> for LLSDError {
    fn from(e: std::num::ParseFloatError) -> Self {
        LLSDError::syntax(format!("invalid real: {}", e))
    }
}

impl From<quick_xml::Error> for LLSDError {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Utf8(u) => LLSDError::from(u),
            other => LLSDError::syntax(format!("malformed XML: {}", other)),
        }
    }
}

/// Parse a decimal i32, distinguishing overflow from malformed digits.
pub(crate) fn parse_i32(text: &str) -> LLSDResult<i32> {
    use std::num::IntErrorKind;
    text.parse::<i32>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            LLSDError::range(format!("integer {:?} does not fit in 32 bits", text))
        }
        _ => LLSDError::syntax(format!("invalid integer {:?}", text)),
    })
}

// Unit tests

#[test]
fn error_display_includes_position() {
    let e = LLSDError::syntax_at("unexpected token", Position::Offset(17));
    assert_eq!(e.to_string(), "syntax error: unexpected token at offset 17");
    assert_eq!(e.kind(), ErrorKind::Syntax);
    let e = LLSDError::duplicate_key("name", Position::LineColumn { line: 3, column: 9 });
    assert_eq!(e.to_string(), "duplicate map key \"name\" at line 3, column 9");
    let e = LLSDError::wrong_type("expected map");
    assert_eq!(e.to_string(), "wrong type: expected map");
}

#[test]
fn parse_i32_distinguishes_range_from_syntax() {
    assert_eq!(parse_i32("2147483647").unwrap(), i32::MAX);
    assert_eq!(parse_i32("-2147483648").unwrap(), i32::MIN);
    assert_eq!(parse_i32("2147483648").unwrap_err().kind(), ErrorKind::Range);
    assert_eq!(parse_i32("donkey").unwrap_err().kind(), ErrorKind::Syntax);
}
