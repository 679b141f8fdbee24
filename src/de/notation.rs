//! # de/notation -- de-serialize LLSD, "notation" form.
//!
//!  Library for serializing and de-serializing data in
//!  Linden Lab Structured Data format.
//!
//!  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//!
//!  Notation format.
//!  Similar to JSON, but not compatible.
//
//  License: LGPL.
//
use crate::error::{LLSDError, LLSDResult, Position};
use crate::{LLSDMap, LLSDValue, LimitTracker, ParseLimits};
use base64::Engine;
use core::iter::Peekable;
use core::str::CharIndices;
use uuid::Uuid;
//
//  Constants
//
/// Notation LLSD prefix
pub const LLSDNOTATIONPREFIX: &str = "<? llsd/notation ?>\n";
/// Sentinel, must match exactly.
pub const LLSDNOTATIONSENTINEL: &str = "<? llsd/notation ?>";

/// Parse an LLSD string expressed in notation format into an LLSD tree.
/// A leading `<? llsd/notation ?>` sentinel is accepted and skipped.
pub fn from_str(notation_str: &str) -> LLSDResult<LLSDValue> {
    from_str_with(notation_str, &ParseLimits::default())
}

/// Parse notation with explicit resource limits.
pub fn from_str_with(notation_str: &str, limits: &ParseLimits) -> LLSDResult<LLSDValue> {
    let body = notation_str
        .strip_prefix(LLSDNOTATIONSENTINEL)
        .unwrap_or(notation_str);
    let mut parser = NotationParser {
        scan: Scanner::new(body),
        tracker: LimitTracker::new(limits),
    };
    let value = parser.parse_value(1)?;
    parser.scan.consume_whitespace();
    if let Some(ch) = parser.scan.peek() {
        return Err(LLSDError::syntax_at(
            format!("trailing data beginning with {:?}", ch),
            parser.scan.position(),
        ));
    }
    Ok(value)
}

/// Character cursor that remembers its byte offset for error reporting.
struct Scanner<'a> {
    chars: Peekable<CharIndices<'a>>,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner {
            chars: text.char_indices().peekable(),
            pos: 0,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn next(&mut self) -> Option<char> {
        let (i, ch) = self.chars.next()?;
        self.pos = i + ch.len_utf8();
        Some(ch)
    }

    fn position(&self) -> Position {
        Position::Offset(self.pos)
    }

    /// Consume whitespace. Next char will be non-whitespace.
    fn consume_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                let _ = self.next();
            } else {
                break;
            }
        }
    }
}

struct NotationParser<'a, 'l> {
    scan: Scanner<'a>,
    tracker: LimitTracker<'l>,
}

impl<'a, 'l> NotationParser<'a, 'l> {
    fn unexpected_eof(&self, context: &str) -> LLSDError {
        LLSDError::syntax_at(
            format!("unexpected end of input {}", context),
            self.scan.position(),
        )
    }

    /// Parse one value - real, integer, map, etc. Recursive.
    fn parse_value(&mut self, depth: usize) -> LLSDResult<LLSDValue> {
        self.scan.consume_whitespace();
        self.tracker.check_depth(depth, self.scan.position())?;
        self.tracker.note_value(self.scan.position())?;
        let ch = self
            .scan
            .next()
            .ok_or_else(|| self.unexpected_eof("expecting a value"))?;
        match ch {
            '!' => Ok(LLSDValue::Undefined),
            '1' => Ok(LLSDValue::Boolean(true)),
            '0' => Ok(LLSDValue::Boolean(false)),
            't' | 'T' | 'f' | 'F' => self.parse_boolean(ch),
            '{' => self.parse_map(depth),
            '[' => self.parse_array(depth),
            'i' => self.parse_integer(),
            'r' => self.parse_real(),
            'd' => self.parse_date(),
            'u' => self.parse_uuid(),
            'l' => self.parse_uri(),
            'b' => self.parse_binary(),
            's' => {
                let delim = self
                    .scan
                    .next()
                    .ok_or_else(|| self.unexpected_eof("after 's'"))?;
                if delim != '\'' && delim != '"' {
                    return Err(LLSDError::syntax_at(
                        format!("expected quote after 's', found {:?}", delim),
                        self.scan.position(),
                    ));
                }
                let s = self.parse_quoted_string(delim)?;
                Ok(LLSDValue::String(s))
            }
            '\'' | '"' => Ok(LLSDValue::String(self.parse_quoted_string(ch)?)),
            _ => Err(LLSDError::syntax_at(
                format!("unexpected character {:?}", ch),
                self.scan.position(),
            )),
        }
    }

    /// Parse "iNNN"
    fn parse_integer(&mut self) -> LLSDResult<LLSDValue> {
        let mut s = String::with_capacity(20);
        while let Some(ch) = self.scan.peek() {
            match ch {
                '0'..='9' | '+' | '-' => s.push(self.scan.next().unwrap()),
                _ => break,
            }
        }
        let position = self.scan.position();
        Ok(LLSDValue::Integer(
            crate::error::parse_i32(&s).map_err(|e| e.at(position))?,
        ))
    }

    /// Parse "rNNN". Accepts scientific notation and the word forms
    /// nan, inf, -inf.
    fn parse_real(&mut self) -> LLSDResult<LLSDValue> {
        let mut s = String::with_capacity(24);
        if let Some('+') | Some('-') = self.scan.peek() {
            s.push(self.scan.next().unwrap());
        }
        if self.scan.peek().map_or(false, |ch| ch.is_ascii_alphabetic()) {
            //  Word form: nan, inf, infinity.
            while let Some(ch) = self.scan.peek() {
                if ch.is_ascii_alphabetic() {
                    s.push(self.scan.next().unwrap());
                } else {
                    break;
                }
            }
        } else {
            while let Some(ch) = self.scan.peek() {
                match ch {
                    '0'..='9' | '+' | '-' | '.' | 'e' | 'E' => s.push(self.scan.next().unwrap()),
                    _ => break,
                }
            }
        }
        let position = self.scan.position();
        if s.is_empty() {
            return Err(LLSDError::syntax_at("'r' with no number body", position));
        }
        Ok(LLSDValue::Real(
            crate::parse_real_text(&s).map_err(|e| e.at(position))?,
        ))
    }

    /// Parse Boolean. All the allowed alphabetic forms.
    fn parse_boolean(&mut self, first_char: char) -> LLSDResult<LLSDValue> {
        let mut s = String::with_capacity(8);
        s.push(first_char);
        while let Some(ch) = self.scan.peek() {
            if ch.is_ascii_alphabetic() {
                s.push(self.scan.next().unwrap());
            } else {
                break;
            }
        }
        match s.as_str() {
            "f" | "F" | "false" | "FALSE" => Ok(LLSDValue::Boolean(false)),
            "t" | "T" | "true" | "TRUE" => Ok(LLSDValue::Boolean(true)),
            _ => Err(LLSDError::syntax_at(
                format!("invalid boolean {:?}", s),
                self.scan.position(),
            )),
        }
    }

    /// Parse the rest of a quoted string. The opening delimiter has been
    /// consumed. Backslash escapes \n \t \r \\ \' \" are processed;
    /// any other escaped character stands for itself.
    fn parse_quoted_string(&mut self, delim: char) -> LLSDResult<String> {
        let mut s = String::with_capacity(128);
        loop {
            let ch = self
                .scan
                .next()
                .ok_or_else(|| self.unexpected_eof("inside quoted string"))?;
            if ch == delim {
                break;
            }
            if ch == '\\' {
                let escaped = self
                    .scan
                    .next()
                    .ok_or_else(|| self.unexpected_eof("after backslash"))?;
                match escaped {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    other => s.push(other),
                }
            } else {
                s.push(ch);
            }
        }
        self.tracker.check_string(s.len(), self.scan.position())?;
        Ok(s)
    }

    /// Parse date string: d"ISO-8601".
    fn parse_date(&mut self) -> LLSDResult<LLSDValue> {
        let s = self.quoted_body("date")?;
        let position = self.scan.position();
        Ok(LLSDValue::Date(
            crate::parse_date_text(&s).map_err(|e| e.at(position))?,
        ))
    }

    /// Parse URI string: l"escaped-uri", percent-encoded per RFC 1738.
    fn parse_uri(&mut self) -> LLSDResult<LLSDValue> {
        let s = self.quoted_body("URI")?;
        let decoded = urlencoding::decode(&s)?;
        Ok(LLSDValue::URI(decoded.into_owned()))
    }

    /// Parse UUID: 36 chars of 8-4-4-4-12 hex, no quotes.
    fn parse_uuid(&mut self) -> LLSDResult<LLSDValue> {
        const UUID_LEN: usize = 36;
        let mut s = String::with_capacity(UUID_LEN);
        for _ in 0..UUID_LEN {
            s.push(
                self.scan
                    .next()
                    .ok_or_else(|| self.unexpected_eof("inside UUID"))?,
            );
        }
        let position = self.scan.position();
        if !crate::util::is_canonical_uuid(&s) {
            return Err(LLSDError::syntax_at(
                format!("invalid UUID {:?}", s),
                position,
            ));
        }
        Ok(LLSDValue::UUID(
            Uuid::parse_str(&s).map_err(|e| LLSDError::from(e).at(position))?,
        ))
    }

    /// Parse binary: b64"..." or b16"...".
    fn parse_binary(&mut self) -> LLSDResult<LLSDValue> {
        let base = match (self.scan.next(), self.scan.next()) {
            (Some('6'), Some('4')) => 64,
            (Some('1'), Some('6')) => 16,
            _ => {
                return Err(LLSDError::syntax_at(
                    "expected b64 or b16 binary marker",
                    self.scan.position(),
                ))
            }
        };
        let body = self.quoted_body("binary")?;
        let position = self.scan.position();
        let bytes = if base == 64 {
            base64::engine::general_purpose::STANDARD
                .decode(&body)
                .map_err(|e| LLSDError::from(e).at(position))?
        } else {
            hex::decode(&body).map_err(|e| LLSDError::from(e).at(position))?
        };
        self.tracker.check_binary(bytes.len(), position)?;
        Ok(LLSDValue::Binary(bytes))
    }

    /// Read the quoted body of a prefixed token (date, URI, binary).
    fn quoted_body(&mut self, what: &str) -> LLSDResult<String> {
        match self.scan.next() {
            Some(delim @ ('"' | '\'')) => self.parse_quoted_string(delim),
            Some(ch) => Err(LLSDError::syntax_at(
                format!("{} body must be quoted, found {:?}", what, ch),
                self.scan.position(),
            )),
            None => Err(self.unexpected_eof("expecting quoted body")),
        }
    }

    /// Parse "{ key : value, key : value ... }".
    /// Keys are bare identifiers or quoted strings.
    fn parse_map(&mut self, depth: usize) -> LLSDResult<LLSDValue> {
        let mut kvmap = LLSDMap::new();
        self.scan.consume_whitespace();
        if let Some('}') = self.scan.peek() {
            let _ = self.scan.next();
            return Ok(LLSDValue::Map(kvmap)); // empty map
        }
        loop {
            let key = self.parse_map_key()?;
            self.expect_char(':')?;
            let value = self.parse_value(depth + 1)?;
            let position = self.scan.position();
            if kvmap.insert(key.clone(), value).is_some() {
                return Err(LLSDError::duplicate_key(key, position));
            }
            self.scan.consume_whitespace();
            match self.scan.next() {
                Some(',') => {
                    self.scan.consume_whitespace();
                    //  Trailing commas are not permitted.
                    if let Some('}') = self.scan.peek() {
                        return Err(LLSDError::syntax_at(
                            "trailing comma in map",
                            self.scan.position(),
                        ));
                    }
                }
                Some('}') => return Ok(LLSDValue::Map(kvmap)),
                Some(ch) => {
                    return Err(LLSDError::syntax_at(
                        format!("expected ',' or '}}' in map, found {:?}", ch),
                        self.scan.position(),
                    ))
                }
                None => return Err(self.unexpected_eof("inside map")),
            }
        }
    }

    /// One map key: bare identifier, quoted, or s-prefixed quoted.
    /// An 's' starts a quoted key only when a quote follows; otherwise
    /// it is the first letter of a bare identifier.
    fn parse_map_key(&mut self) -> LLSDResult<String> {
        self.scan.consume_whitespace();
        let key = match self.scan.peek() {
            Some(delim @ ('\'' | '"')) => {
                let _ = self.scan.next();
                self.parse_quoted_string(delim)?
            }
            Some('s') => {
                let _ = self.scan.next();
                match self.scan.peek() {
                    Some(delim @ ('\'' | '"')) => {
                        let _ = self.scan.next();
                        self.parse_quoted_string(delim)?
                    }
                    _ => self.parse_bare_key('s')?,
                }
            }
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {
                let first = self.scan.next().unwrap();
                self.parse_bare_key(first)?
            }
            Some(ch) => {
                return Err(LLSDError::syntax_at(
                    format!("expected map key, found {:?}", ch),
                    self.scan.position(),
                ))
            }
            None => return Err(self.unexpected_eof("expecting map key")),
        };
        self.tracker.check_string(key.len(), self.scan.position())?;
        Ok(key)
    }

    /// The remainder of a bare identifier key.
    fn parse_bare_key(&mut self, first: char) -> LLSDResult<String> {
        let mut s = String::with_capacity(16);
        s.push(first);
        while let Some(ch) = self.scan.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                s.push(self.scan.next().unwrap());
            } else {
                break;
            }
        }
        Ok(s)
    }

    /// Parse "[ value, value ... ]".
    /// At this point, the '[' has been consumed.
    fn parse_array(&mut self, depth: usize) -> LLSDResult<LLSDValue> {
        let mut items = Vec::new();
        self.scan.consume_whitespace();
        if let Some(']') = self.scan.peek() {
            let _ = self.scan.next();
            return Ok(LLSDValue::Array(items)); // empty array
        }
        loop {
            items.push(self.parse_value(depth + 1)?);
            self.scan.consume_whitespace();
            match self.scan.next() {
                Some(',') => {
                    self.scan.consume_whitespace();
                    if let Some(']') = self.scan.peek() {
                        return Err(LLSDError::syntax_at(
                            "trailing comma in array",
                            self.scan.position(),
                        ));
                    }
                }
                Some(']') => return Ok(LLSDValue::Array(items)),
                Some(ch) => {
                    return Err(LLSDError::syntax_at(
                        format!("expected ',' or ']' in array, found {:?}", ch),
                        self.scan.position(),
                    ))
                }
                None => return Err(self.unexpected_eof("inside array")),
            }
        }
    }

    /// Consume an expected non-whitespace char.
    fn expect_char(&mut self, expected: char) -> LLSDResult<()> {
        self.scan.consume_whitespace();
        match self.scan.next() {
            Some(ch) if ch == expected => Ok(()),
            Some(ch) => Err(LLSDError::syntax_at(
                format!("expected {:?}, found {:?}", expected, ch),
                self.scan.position(),
            )),
            None => Err(self.unexpected_eof("expecting punctuation")),
        }
    }
}

// Unit tests

#[test]
fn notationparsetest1() {
    //  Scenario: nested map with bareword keys.
    let parsed = from_str(
        "{name:s'Alice',scores:[i10,i20,r3.5],id:u550e8400-e29b-41d4-a716-446655440000}",
    )
    .unwrap();
    let map = parsed.as_map().unwrap();
    assert_eq!(map.len(), 3);
    assert_eq!(map["name"], LLSDValue::String("Alice".to_string()));
    assert_eq!(
        map["scores"],
        LLSDValue::Array(vec![
            LLSDValue::Integer(10),
            LLSDValue::Integer(20),
            LLSDValue::Real(3.5),
        ])
    );
    assert_eq!(
        map["id"],
        LLSDValue::UUID(uuid::uuid!("550e8400-e29b-41d4-a716-446655440000"))
    );
    //  Keys iterate in source order.
    let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["name", "scores", "id"]);
}

#[test]
fn notationparse_all_scalar_forms() {
    let parsed = from_str(
        "[!,1,0,t,F,true,FALSE,i-7,r1.5e3,rnan,rinf,r-inf,\"dq\",'sq',s'pre',\
         d\"2006-02-01T14:29:53Z\",l\"http%3A//example.com/\",b64\"SGVsbG8=\",b16\"0fa1\"]",
    )
    .unwrap();
    let arr = parsed.as_array().unwrap();
    assert_eq!(arr[0], LLSDValue::Undefined);
    assert_eq!(arr[1], LLSDValue::Boolean(true));
    assert_eq!(arr[2], LLSDValue::Boolean(false));
    assert_eq!(arr[3], LLSDValue::Boolean(true));
    assert_eq!(arr[4], LLSDValue::Boolean(false));
    assert_eq!(arr[5], LLSDValue::Boolean(true));
    assert_eq!(arr[6], LLSDValue::Boolean(false));
    assert_eq!(arr[7], LLSDValue::Integer(-7));
    assert_eq!(arr[8], LLSDValue::Real(1500.0));
    assert!(arr[9].as_real().unwrap().is_nan());
    assert_eq!(arr[10], LLSDValue::Real(f64::INFINITY));
    assert_eq!(arr[11], LLSDValue::Real(f64::NEG_INFINITY));
    assert_eq!(arr[12], LLSDValue::String("dq".to_string()));
    assert_eq!(arr[13], LLSDValue::String("sq".to_string()));
    assert_eq!(arr[14], LLSDValue::String("pre".to_string()));
    assert_eq!(arr[16], LLSDValue::URI("http://example.com/".to_string()));
    assert_eq!(arr[17], LLSDValue::Binary(b"Hello".to_vec()));
    assert_eq!(arr[18], LLSDValue::Binary(vec![0x0f, 0xa1]));
}

#[test]
fn notationparse_escapes() {
    let parsed = from_str(r#"s'it\'s \"fine\"\n\tok \\ done'"#).unwrap();
    assert_eq!(
        parsed,
        LLSDValue::String("it's \"fine\"\n\tok \\ done".to_string())
    );
}

#[test]
fn notationparse_rejects_trailing_comma() {
    assert_eq!(
        from_str("[i1,i2,]").unwrap_err().kind(),
        crate::ErrorKind::Syntax
    );
    assert_eq!(
        from_str("{a:i1,}").unwrap_err().kind(),
        crate::ErrorKind::Syntax
    );
}

#[test]
fn notationparse_rejects_duplicate_keys() {
    let err = from_str("{a:i1,a:i2}").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::DuplicateKey);
}

#[test]
fn notationparse_eof_is_syntax_error() {
    for bad in ["{a:i1", "[i1,", "s'abc", "u550e8400", "r"] {
        let err = from_str(bad).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Syntax, "input {:?}", bad);
    }
}

#[test]
fn notationparse_integer_range() {
    assert_eq!(
        from_str("i2147483648").unwrap_err().kind(),
        crate::ErrorKind::Range
    );
}

#[test]
fn notationparse_quoted_keys() {
    let parsed = from_str("{'two words':i1,s\"3rd\":i2,plain_1:i3}").unwrap();
    let keys: Vec<&str> = parsed.as_map().unwrap().keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["two words", "3rd", "plain_1"]);
}

#[test]
fn notationparse_skips_sentinel() {
    let parsed = from_str("<? llsd/notation ?>\n{a:i1}").unwrap();
    assert_eq!(parsed.as_map().unwrap()["a"], LLSDValue::Integer(1));
}
