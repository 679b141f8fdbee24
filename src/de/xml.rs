//
//  de/xml.rs -- XML deserializer for LLSD
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  XML format.
//
//  License: LGPL.
//
use crate::error::{LLSDError, LLSDResult, Position};
use crate::{LLSDMap, LLSDValue, LimitTracker, ParseLimits};
use base64::Engine;
use quick_xml::events::attributes::Attributes;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{BufRead, BufReader};
//
//  Constants
//
pub const LLSDXMLPREFIX: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<llsd>\n";
pub const LLSDXMLSENTINEL: &str = "<?xml"; // Must begin with this.

/// Parse LLSD expressed in XML into an LLSD tree.
pub fn from_str(xmlstr: &str) -> LLSDResult<LLSDValue> {
    from_str_with(xmlstr, &ParseLimits::default())
}

/// Parse LLSD expressed in XML, with explicit resource limits.
pub fn from_str_with(xmlstr: &str, limits: &ParseLimits) -> LLSDResult<LLSDValue> {
    from_reader_with(&mut BufReader::new(xmlstr.as_bytes()), limits)
}

/// Read XML from a buffered source and parse into an LLSD tree.
pub fn from_reader<R: BufRead>(rdr: &mut R) -> LLSDResult<LLSDValue> {
    from_reader_with(rdr, &ParseLimits::default())
}

/// Read XML from a buffered source, with explicit resource limits.
pub fn from_reader_with<R: BufRead>(rdr: &mut R, limits: &ParseLimits) -> LLSDResult<LLSDValue> {
    let mut reader = Reader::from_reader(rdr);
    //  Text is not trimmed here; string bodies keep their whitespace and
    //  everything else trims per element.
    reader.expand_empty_elements(true); // want end tag events always
    XmlParser {
        reader,
        tracker: LimitTracker::new(limits),
    }
    .parse_document()
}

struct XmlParser<'l, R: BufRead> {
    reader: Reader<&'l mut R>,
    tracker: LimitTracker<'l>,
}

impl<'l, R: BufRead> XmlParser<'l, R> {
    fn position(&self) -> Position {
        Position::Offset(self.reader.buffer_position())
    }

    /// Outer parse. Find <llsd> and parse its single child.
    fn parse_document(&mut self) -> LLSDResult<LLSDValue> {
        let mut output: Option<LLSDValue> = None;
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name() {
                    b"llsd" => {
                        if output.is_some() {
                            return Err(LLSDError::syntax_at(
                                "more than one <llsd> block in data",
                                self.position(),
                            ));
                        }
                        output = Some(self.parse_llsd_body()?);
                    }
                    other => {
                        return Err(LLSDError::syntax_at(
                            format!(
                                "expected <llsd>, found <{}>",
                                String::from_utf8_lossy(other)
                            ),
                            self.position(),
                        ))
                    }
                },
                Ok(Event::Text(_)) => (),   // stray text outside <llsd>
                Ok(Event::End(_)) => (),    // tag matching check is automatic
                Ok(Event::Eof) => break,
                Ok(_) => (), // declaration, comments, processing instructions
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
        output.ok_or_else(|| LLSDError::syntax("unexpected end of data, no <llsd> block"))
    }

    /// Consume events up to the first value element inside <llsd> and
    /// parse it. The closing </llsd> is left for the outer loop.
    fn parse_llsd_body(&mut self) -> LLSDResult<LLSDValue> {
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let tagname = std::str::from_utf8(e.name())?.to_string();
                    let encoding = get_attr(&e.attributes(), b"encoding")?;
                    return self.parse_value(&tagname, encoding, 1);
                }
                Ok(Event::Text(ref e)) if is_all_whitespace(e) => (),
                Ok(Event::Comment(_)) => (),
                Ok(Event::End(_)) | Ok(Event::Eof) => {
                    return Err(LLSDError::syntax_at(
                        "<llsd> block contains no value",
                        self.position(),
                    ))
                }
                Ok(_) => {
                    return Err(LLSDError::syntax_at(
                        "expected a value element inside <llsd>",
                        self.position(),
                    ))
                }
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
    }

    /// Parse one value - real, integer, map, etc. Recursive.
    /// Entered with the start tag already consumed.
    fn parse_value(
        &mut self,
        starttag: &str,
        encoding: Option<String>,
        depth: usize,
    ) -> LLSDResult<LLSDValue> {
        self.tracker.check_depth(depth, self.position())?;
        self.tracker.note_value(self.position())?;
        match starttag {
            "undef" | "boolean" | "integer" | "real" | "string" | "uuid" | "date" | "uri"
            | "binary" => self.parse_primitive_value(starttag, encoding),
            "map" => self.parse_map(depth),
            "array" => self.parse_array(depth),
            _ => Err(LLSDError::syntax_at(
                format!("unknown data type <{}>", starttag),
                self.position(),
            )),
        }
    }

    /// Parse one primitive value. Text accumulates until the end tag.
    /// A nested <undef/> makes this a typed undefined, which collapses
    /// to plain Undefined.
    fn parse_primitive_value(
        &mut self,
        starttag: &str,
        encoding: Option<String>,
    ) -> LLSDResult<LLSDValue> {
        let mut text = String::new();
        let mut saw_undef = false;
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Text(ref e)) => text.push_str(&e.unescape_and_decode(&self.reader)?),
                Ok(Event::CData(ref e)) => text.push_str(std::str::from_utf8(e)?),
                Ok(Event::Start(ref e)) if e.name() == b"undef" => {
                    self.consume_end(b"undef")?;
                    saw_undef = true;
                }
                Ok(Event::Start(ref e)) => {
                    return Err(LLSDError::syntax_at(
                        format!(
                            "unexpected <{}> inside <{}>",
                            String::from_utf8_lossy(e.name()),
                            starttag
                        ),
                        self.position(),
                    ))
                }
                Ok(Event::End(ref e)) => {
                    let tagname = std::str::from_utf8(e.name())?;
                    if starttag != tagname {
                        return Err(LLSDError::syntax_at(
                            format!("unmatched XML tags: <{}> .. </{}>", starttag, tagname),
                            self.position(),
                        ));
                    }
                    if saw_undef {
                        return Ok(LLSDValue::Undefined);
                    }
                    return self.convert_primitive(starttag, text, encoding);
                }
                Ok(Event::Eof) => {
                    return Err(LLSDError::syntax_at(
                        format!("unexpected end of data inside <{}>", starttag),
                        self.position(),
                    ))
                }
                Ok(Event::Comment(_)) => (),
                Ok(_) => (),
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
    }

    /// Convert accumulated element text to the tagged primitive.
    fn convert_primitive(
        &mut self,
        starttag: &str,
        text: String,
        encoding: Option<String>,
    ) -> LLSDResult<LLSDValue> {
        let position = self.position();
        match starttag {
            "undef" => Ok(LLSDValue::Undefined),
            "boolean" => parse_boolean(text.trim()).map_err(|e| e.at(position)),
            "integer" => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(LLSDValue::Integer(0)) // empty element is 0
                } else {
                    Ok(LLSDValue::Integer(
                        crate::error::parse_i32(trimmed).map_err(|e| e.at(position))?,
                    ))
                }
            }
            "real" => Ok(LLSDValue::Real(
                crate::parse_real_text(&text).map_err(|e| e.at(position))?,
            )),
            "string" => {
                self.tracker.check_string(text.len(), position)?;
                Ok(LLSDValue::String(text))
            }
            "uri" => {
                let trimmed = text.trim();
                self.tracker.check_string(trimmed.len(), position)?;
                Ok(LLSDValue::URI(trimmed.to_string()))
            }
            "uuid" => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(LLSDValue::UUID(uuid::Uuid::nil()))
                } else if crate::util::is_canonical_uuid(trimmed) {
                    Ok(LLSDValue::UUID(
                        uuid::Uuid::parse_str(trimmed).map_err(|e| LLSDError::from(e).at(position))?,
                    ))
                } else {
                    Err(LLSDError::syntax_at(
                        format!("invalid UUID {:?}", trimmed),
                        position,
                    ))
                }
            }
            "date" => Ok(LLSDValue::Date(
                crate::parse_date_text(&text).map_err(|e| e.at(position))?,
            )),
            "binary" => {
                let bytes = parse_binary(&text, encoding).map_err(|e| e.at(position))?;
                self.tracker.check_binary(bytes.len(), position)?;
                Ok(LLSDValue::Binary(bytes))
            }
            _ => Err(LLSDError::syntax_at(
                format!("unexpected primitive data type <{}>", starttag),
                position,
            )),
        }
    }

    //  Parse one map. Format: <map> (<key>K</key> VALUE)* </map>
    fn parse_map(&mut self, depth: usize) -> LLSDResult<LLSDValue> {
        let mut map = LLSDMap::new();
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name() {
                    b"key" => {
                        let (k, v) = self.parse_map_entry(depth)?;
                        let position = self.position();
                        if map.insert(k.clone(), v).is_some() {
                            return Err(LLSDError::duplicate_key(k, position));
                        }
                    }
                    other => {
                        return Err(LLSDError::syntax_at(
                            format!(
                                "expected <key> in map, found <{}>",
                                String::from_utf8_lossy(other)
                            ),
                            self.position(),
                        ))
                    }
                },
                Ok(Event::Text(ref e)) if is_all_whitespace(e) => (),
                Ok(Event::Text(_)) => {
                    return Err(LLSDError::syntax_at("stray text inside <map>", self.position()))
                }
                Ok(Event::End(ref e)) => {
                    let tagname = std::str::from_utf8(e.name())?;
                    if tagname != "map" {
                        return Err(LLSDError::syntax_at(
                            format!("unmatched XML tags: <map> .. </{}>", tagname),
                            self.position(),
                        ));
                    }
                    return Ok(LLSDValue::Map(map));
                }
                Ok(Event::Eof) => {
                    return Err(LLSDError::syntax_at(
                        "unexpected end of data inside <map>",
                        self.position(),
                    ))
                }
                Ok(Event::Comment(_)) => (),
                Ok(_) => (),
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
    }

    //  Parse one map entry.
    //  Entered with the <key> start tag just consumed.
    fn parse_map_entry(&mut self, depth: usize) -> LLSDResult<(String, LLSDValue)> {
        let mut key = String::new();
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Text(ref e)) => key.push_str(&e.unescape_and_decode(&self.reader)?),
                Ok(Event::CData(ref e)) => key.push_str(std::str::from_utf8(e)?),
                Ok(Event::Start(ref e)) => {
                    return Err(LLSDError::syntax_at(
                        format!(
                            "unexpected <{}> inside <key>",
                            String::from_utf8_lossy(e.name())
                        ),
                        self.position(),
                    ))
                }
                Ok(Event::End(ref e)) => {
                    let tagname = std::str::from_utf8(e.name())?;
                    if tagname != "key" {
                        return Err(LLSDError::syntax_at(
                            format!("unmatched XML tags: <key> .. </{}>", tagname),
                            self.position(),
                        ));
                    }
                    self.tracker.check_string(key.len(), self.position())?;
                    let value = self.parse_entry_value(depth)?;
                    return Ok((key, value));
                }
                Ok(Event::Eof) => {
                    return Err(LLSDError::syntax_at(
                        "unexpected end of data inside <key>",
                        self.position(),
                    ))
                }
                Ok(Event::Comment(_)) => (),
                Ok(_) => (),
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
    }

    /// The value element that follows a </key>.
    fn parse_entry_value(&mut self, depth: usize) -> LLSDResult<LLSDValue> {
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let tagname = std::str::from_utf8(e.name())?.to_string();
                    let encoding = get_attr(&e.attributes(), b"encoding")?;
                    return self.parse_value(&tagname, encoding, depth + 1);
                }
                Ok(Event::Text(ref e)) if is_all_whitespace(e) => (),
                Ok(Event::Comment(_)) => (),
                Ok(_) => {
                    return Err(LLSDError::syntax_at(
                        "expected a value element after <key>",
                        self.position(),
                    ))
                }
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
    }

    /// Parse one array. Recursive.
    fn parse_array(&mut self, depth: usize) -> LLSDResult<LLSDValue> {
        let mut items: Vec<LLSDValue> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let tagname = std::str::from_utf8(e.name())?.to_string();
                    let encoding = get_attr(&e.attributes(), b"encoding")?;
                    items.push(self.parse_value(&tagname, encoding, depth + 1)?);
                }
                Ok(Event::Text(ref e)) if is_all_whitespace(e) => (),
                Ok(Event::Text(_)) => {
                    return Err(LLSDError::syntax_at(
                        "stray text inside <array>",
                        self.position(),
                    ))
                }
                Ok(Event::End(ref e)) => {
                    let tagname = std::str::from_utf8(e.name())?;
                    if tagname != "array" {
                        return Err(LLSDError::syntax_at(
                            format!("unmatched XML tags: <array> .. </{}>", tagname),
                            self.position(),
                        ));
                    }
                    return Ok(LLSDValue::Array(items));
                }
                Ok(Event::Eof) => {
                    return Err(LLSDError::syntax_at(
                        "unexpected end of data inside <array>",
                        self.position(),
                    ))
                }
                Ok(Event::Comment(_)) => (),
                Ok(_) => (),
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
    }

    /// Consume events up to the matching end tag for `name`. Used for
    /// the inner <undef/> of a typed undefined.
    fn consume_end(&mut self, name: &[u8]) -> LLSDResult<()> {
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::End(ref e)) if e.name() == name => return Ok(()),
                Ok(Event::Text(ref e)) if is_all_whitespace(e) => (),
                Ok(Event::Comment(_)) => (),
                Ok(Event::Eof) => {
                    return Err(LLSDError::syntax_at(
                        "unexpected end of data",
                        self.position(),
                    ))
                }
                Ok(_) => {
                    return Err(LLSDError::syntax_at(
                        format!(
                            "unexpected content inside <{}>",
                            String::from_utf8_lossy(name)
                        ),
                        self.position(),
                    ))
                }
                Err(e) => return Err(LLSDError::from(e).at(self.position())),
            }
            buf.clear();
        }
    }
}

///  Parse boolean. Accepts 0, 0.0, false, 1, 1.0, true; empty is false.
fn parse_boolean(s: &str) -> LLSDResult<LLSDValue> {
    match s {
        "" | "0" | "0.0" | "false" => Ok(LLSDValue::Boolean(false)),
        "1" | "1.0" | "true" => Ok(LLSDValue::Boolean(true)),
        _ => Err(LLSDError::syntax(format!("invalid boolean {:?}", s))),
    }
}

/// Parse binary element text.
/// Input in base64 (the default), base16, or base85 per the encoding
/// attribute. Whitespace inside the body is ignored.
fn parse_binary(s: &str, encoding: Option<String>) -> LLSDResult<Vec<u8>> {
    let mut body = s.to_string();
    body.retain(|c| !c.is_ascii_whitespace());
    match encoding.as_deref().unwrap_or("base64") {
        "base64" => Ok(base64::engine::general_purpose::STANDARD.decode(body)?),
        "base16" => Ok(hex::decode(body)?),
        "base85" => ascii85::decode(&body)
            .map_err(|e| LLSDError::encoding(format!("invalid base85: {:?}", e))),
        other => Err(LLSDError::syntax(format!(
            "unknown encoding: <binary encoding=\"{}\">",
            other
        ))),
    }
}

/// Search for an attribute in the attribute list.
fn get_attr(attrs: &Attributes, key: &[u8]) -> LLSDResult<Option<String>> {
    //  Each step has a possible error, so it's hard to do this more cleanly.
    for attr in attrs.clone() {
        let a = attr.map_err(|e| LLSDError::syntax(format!("malformed attribute: {}", e)))?;
        if a.key != key {
            continue; // not this one
        }
        let v = a.unescaped_value()?;
        let sv = std::str::from_utf8(&v)?;
        return Ok(Some(sv.to_string()));
    }
    Ok(None)
}

/// True if the text event is nothing but whitespace once decoded.
fn is_all_whitespace(e: &quick_xml::events::BytesText) -> bool {
    e.iter().all(|b| b.is_ascii_whitespace())
}

// Unit tests

#[test]
fn xmlparsetest1() {
    const TESTXMLZERO: &str = r#"
<?xml version="1.0" encoding="UTF-8"?>
<llsd>
<array>
<integer>0</integer>
<integer>100</integer>
<integer />
</array>
</llsd>
"#;

    const TESTXMLZEROARRAY: [i32; 3] = [0, 100, 0]; // expected values

    const TESTXML1: &str = r#"
<?xml version="1.0" encoding="UTF-8"?>
<llsd>
<map>
  <key>region_id</key>
    <uuid>67153d5b-3659-afb4-8510-adda2c034649</uuid>
  <key>scale</key>
    <string>one minute</string>
  <key>simulator statistics</key>
  <map>
    <key>time dilation</key><real>0.9878624</real>
    <key>sim fps</key><real>44.38898</real>
    <key>agent ms</key><real>0.01599029</real>
    <!-- Comment - some additional test values -->
    <key>hex number</key><binary encoding="base16">0fa1</binary>
    <key>base64 number</key><binary>SGVsbG8gd29ybGQ=</binary>
    <key>date</key><date>2006-02-01T14:29:53Z</date>
    <key>array</key>
        <array>
            <boolean>false</boolean>
            <integer>42</integer>
            <undef/>
            <uuid/>
            <boolean>1</boolean>
        </array>
  </map>
</map>
</llsd>
"#;

    fn trytestcase(teststr: &str) {
        //  Parse canned XML test case into internal format.
        //  Must not contain NaN, because NaN != NaN and the equal test will fail
        let parsed1 = from_str(teststr).unwrap();
        //  Generate XML back from parsed version.
        let generated = crate::ser::xml::to_string(&parsed1, true).unwrap();
        //  Parse that.
        let parsed2 = from_str(&generated).unwrap();
        //  Check that parses match.
        assert_eq!(parsed1, parsed2);
    }
    trytestcase(TESTXML1);
    //  Test zero case, where an empty <integer /> is 0, per spec.
    {
        let parsed0 = from_str(TESTXMLZERO).unwrap();
        let arr = parsed0.as_array().unwrap();
        assert_eq!(arr.len(), TESTXMLZEROARRAY.len());
        for (item, n) in arr.iter().zip(TESTXMLZEROARRAY) {
            assert_eq!(n, *(item.as_integer().unwrap()));
        }
    }
}

#[test]
fn xmlparse_preserves_map_order() {
    let parsed = from_str(
        "<llsd><map><key>zebra</key><integer>1</integer>\
         <key>aardvark</key><integer>2</integer>\
         <key>mongoose</key><integer>3</integer></map></llsd>",
    )
    .unwrap();
    let keys: Vec<&str> = parsed.as_map().unwrap().keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["zebra", "aardvark", "mongoose"]);
}

#[test]
fn xmlparse_rejects_duplicate_keys() {
    let err = from_str(
        "<llsd><map><key>a</key><integer>1</integer>\
         <key>a</key><integer>2</integer></map></llsd>",
    )
    .unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::DuplicateKey);
}

#[test]
fn xmlparse_typed_undef_collapses() {
    let parsed =
        from_str("<llsd><array><integer><undef/></integer><binary><undef/></binary></array></llsd>")
            .unwrap();
    assert_eq!(
        parsed,
        LLSDValue::Array(vec![LLSDValue::Undefined, LLSDValue::Undefined])
    );
}

#[test]
fn xmlparse_string_keeps_interior_whitespace() {
    let parsed = from_str("<llsd><string>  two  spaces  </string></llsd>").unwrap();
    assert_eq!(
        parsed,
        LLSDValue::String("  two  spaces  ".to_string())
    );
}

#[test]
fn xmlparse_real_specials() {
    let parsed = from_str(
        "<llsd><array><real>nan</real><real>inf</real><real>-inf</real><real>NaN</real></array></llsd>",
    )
    .unwrap();
    let arr = parsed.as_array().unwrap();
    assert!(arr[0].as_real().unwrap().is_nan());
    assert_eq!(*arr[1].as_real().unwrap(), f64::INFINITY);
    assert_eq!(*arr[2].as_real().unwrap(), f64::NEG_INFINITY);
    assert!(arr[3].as_real().unwrap().is_nan());
}

#[test]
fn xmlparse_integer_range() {
    let err = from_str("<llsd><integer>2147483648</integer></llsd>").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Range);
}

#[test]
fn xmlparse_depth_limit() {
    //  Depth 3 value: map > array > integer.
    let text = "<llsd><map><key>a</key><array><integer>1</integer></array></map></llsd>";
    let limits = ParseLimits {
        max_depth: 3,
        ..ParseLimits::default()
    };
    assert!(from_str_with(text, &limits).is_ok());
    let limits = ParseLimits {
        max_depth: 2,
        ..ParseLimits::default()
    };
    let err = from_str_with(text, &limits).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Limit);
}

#[test]
fn xmlparse_rejects_unknown_element() {
    let err = from_str("<llsd><widget>1</widget></llsd>").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Syntax);
}
