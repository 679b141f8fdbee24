//
//  ser/xml.rs -- XML serializer for LLSD
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
use crate::error::LLSDResult;
use crate::LLSDValue;
use base64::Engine;
use std::io::Write;
//
//  Constants
//
pub const LLSDXMLPREFIX: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<llsd>\n";
pub const LLSDXMLSENTINEL: &str = "<?xml"; // Must begin with this.
const XMLDECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// How the XML serializer lays out its output.
#[derive(Debug, Clone)]
pub struct XmlOptions {
    /// One element per line, indented. Off means no inter-element
    /// whitespace at all.
    pub pretty: bool,
    /// Spaces per nesting level when pretty-printing.
    pub indent: usize,
}

impl Default for XmlOptions {
    fn default() -> Self {
        XmlOptions {
            pretty: true,
            indent: 2,
        }
    }
}

/// LLSDValue to Writer. Indents by the default width if asked.
pub fn to_writer<W: Write>(writer: &mut W, value: &LLSDValue, do_indent: bool) -> LLSDResult<()> {
    to_writer_with(
        writer,
        value,
        &XmlOptions {
            pretty: do_indent,
            ..XmlOptions::default()
        },
    )
}

/// LLSDValue to Writer with explicit layout options.
pub fn to_writer_with<W: Write>(
    writer: &mut W,
    value: &LLSDValue,
    options: &XmlOptions,
) -> LLSDResult<()> {
    if options.pretty {
        writeln!(writer, "{}", XMLDECL)?;
        writeln!(writer, "<llsd>")?;
        generate_value(writer, value, options, 1)?;
        writeln!(writer, "</llsd>")?;
    } else {
        write!(writer, "{}<llsd>", XMLDECL)?;
        generate_value(writer, value, options, 0)?;
        write!(writer, "</llsd>")?;
    }
    writer.flush()?;
    Ok(())
}

/// LLSDValue to String.
/// Pretty prints out the value as XML if requested.
pub fn to_string(value: &LLSDValue, do_indent: bool) -> LLSDResult<String> {
    to_string_with(
        value,
        &XmlOptions {
            pretty: do_indent,
            ..XmlOptions::default()
        },
    )
}

/// LLSDValue to String with explicit layout options.
pub fn to_string_with(value: &LLSDValue, options: &XmlOptions) -> LLSDResult<String> {
    let mut s: Vec<u8> = Vec::new();
    to_writer_with(&mut s, value, options)?;
    Ok(String::from_utf8(s)?)
}

/// Generate one <TYPE> VALUE </TYPE> output. VALUE is recursive.
fn generate_value<W: Write>(
    writer: &mut W,
    value: &LLSDValue,
    options: &XmlOptions,
    level: usize,
) -> LLSDResult<()> {
    let pad = if options.pretty {
        " ".repeat(options.indent * level)
    } else {
        String::new()
    };
    let nl = if options.pretty { "\n" } else { "" };

    //  Write out one tag with a value.
    fn tag_value<W: Write>(
        writer: &mut W,
        tag: &str,
        text: &str,
        pad: &str,
        nl: &str,
    ) -> LLSDResult<()> {
        if text.is_empty() {
            // if empty, write as null tag
            write!(writer, "{}<{} />{}", pad, tag, nl)?;
        } else {
            write!(writer, "{}<{}>{}</{}>{}", pad, tag, text, tag, nl)?;
        }
        Ok(())
    }

    //  Emit XML for all possible types.
    match value {
        LLSDValue::Undefined => tag_value(writer, "undef", "", &pad, nl)?,
        LLSDValue::Boolean(v) => {
            tag_value(writer, "boolean", if *v { "true" } else { "false" }, &pad, nl)?
        }
        LLSDValue::Integer(v) => tag_value(writer, "integer", &v.to_string(), &pad, nl)?,
        LLSDValue::Real(v) => tag_value(writer, "real", &crate::format_real(*v), &pad, nl)?,
        LLSDValue::String(v) => tag_value(writer, "string", &xml_escape(v), &pad, nl)?,
        LLSDValue::UUID(v) => tag_value(writer, "uuid", &v.to_string(), &pad, nl)?,
        LLSDValue::Date(v) => tag_value(writer, "date", &crate::format_date(v), &pad, nl)?,
        LLSDValue::URI(v) => tag_value(writer, "uri", &xml_escape(v), &pad, nl)?,
        LLSDValue::Binary(v) => tag_value(
            writer,
            "binary",
            &base64::engine::general_purpose::STANDARD.encode(v),
            &pad,
            nl,
        )?,
        LLSDValue::Map(v) => {
            write!(writer, "{}<map>{}", pad, nl)?;
            let inner = if options.pretty {
                " ".repeat(options.indent * (level + 1))
            } else {
                String::new()
            };
            for (key, entry) in v {
                write!(writer, "{}<key>{}</key>{}", inner, xml_escape(key), nl)?;
                generate_value(writer, entry, options, level + 1)?;
            }
            write!(writer, "{}</map>{}", pad, nl)?;
        }
        LLSDValue::Array(v) => {
            write!(writer, "{}<array>{}", pad, nl)?;
            for entry in v {
                generate_value(writer, entry, options, level + 1)?;
            }
            write!(writer, "{}</array>{}", pad, nl)?;
        }
    };
    Ok(())
}

/// XML standard character escapes.
fn xml_escape(unescaped: &str) -> String {
    let mut s = String::new();
    for ch in unescaped.chars() {
        match ch {
            '<' => s += "&lt;",
            '>' => s += "&gt;",
            '\'' => s += "&apos;",
            '&' => s += "&amp;",
            '"' => s += "&quot;",
            _ => s.push(ch),
        }
    }
    s
}

// Unit tests

#[test]
fn xmlgen_pretty_layout() {
    use crate::LLSDMap;
    let mut map = LLSDMap::new();
    map.insert("x".to_string(), LLSDValue::Real(f64::NAN));
    let generated = to_string(&LLSDValue::Map(map), true).unwrap();
    assert_eq!(
        generated,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<llsd>\n  <map>\n    <key>x</key>\n    <real>nan</real>\n  </map>\n</llsd>\n"
    );
}

#[test]
fn xmlgen_compact_has_no_whitespace() {
    let generated = to_string(
        &LLSDValue::Array(vec![LLSDValue::Integer(1), LLSDValue::Boolean(true)]),
        false,
    )
    .unwrap();
    assert_eq!(
        generated,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><llsd><array><integer>1</integer><boolean>true</boolean></array></llsd>"
    );
}

#[test]
fn xmlgen_escapes_strings() {
    let generated = to_string(&LLSDValue::String("a<b&c\"d".to_string()), false).unwrap();
    assert!(generated.contains("<string>a&lt;b&amp;c&quot;d</string>"));
    //  And it parses back to the original.
    let parsed = crate::de::xml::from_str(&generated).unwrap();
    assert_eq!(parsed, LLSDValue::String("a<b&c\"d".to_string()));
}

#[test]
fn xmlgen_real_specials() {
    let generated = to_string(
        &LLSDValue::Array(vec![
            LLSDValue::Real(f64::NAN),
            LLSDValue::Real(f64::INFINITY),
            LLSDValue::Real(f64::NEG_INFINITY),
        ]),
        false,
    )
    .unwrap();
    assert!(generated.contains("<real>nan</real>"));
    assert!(generated.contains("<real>inf</real>"));
    assert!(generated.contains("<real>-inf</real>"));
}

#[test]
fn xmlgen_date_millis_only_when_nonzero() {
    use chrono::TimeZone;
    let on_second = chrono::Utc.timestamp_millis_opt(1138804193000).unwrap();
    let with_millis = chrono::Utc.timestamp_millis_opt(1138804193120).unwrap();
    let generated = to_string(&LLSDValue::Date(on_second), false).unwrap();
    assert!(generated.contains("<date>2006-02-01T14:29:53Z</date>"));
    let generated = to_string(&LLSDValue::Date(with_millis), false).unwrap();
    assert!(generated.contains("<date>2006-02-01T14:29:53.120Z</date>"));
}
