//! # tests.rs -- cross-format tests for serialization and deserialization.
//
//  License: LGPL.
//
use crate::{de, ser, LLSDMap, LLSDValue};

/// Structural equality that treats two NaNs as the same value, so
/// round-trip checks can carry non-finite reals. Map order must match
/// too, since serializers must reproduce it.
fn bits_equal(a: &LLSDValue, b: &LLSDValue) -> bool {
    match (a, b) {
        (LLSDValue::Real(x), LLSDValue::Real(y)) => x.to_bits() == y.to_bits(),
        (LLSDValue::Array(x), LLSDValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(i, j)| bits_equal(i, j))
        }
        (LLSDValue::Map(x), LLSDValue::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && bits_equal(va, vb))
        }
        _ => a == b,
    }
}

/// A value exercising every variant, container nesting included.
fn kitchen_sink() -> LLSDValue {
    use chrono::TimeZone;
    let mut inner = LLSDMap::new();
    inner.insert("undef".to_string(), LLSDValue::Undefined);
    inner.insert("yes".to_string(), LLSDValue::Boolean(true));
    inner.insert("no".to_string(), LLSDValue::Boolean(false));
    inner.insert("int".to_string(), LLSDValue::Integer(-12345));
    inner.insert("real".to_string(), LLSDValue::Real(0.9878624));
    inner.insert(
        "text".to_string(),
        LLSDValue::String("two words & <tags> 'quoted'".to_string()),
    );
    inner.insert(
        "id".to_string(),
        LLSDValue::UUID(uuid::uuid!("67153d5b-3659-afb4-8510-adda2c034649")),
    );
    inner.insert(
        "when".to_string(),
        LLSDValue::Date(chrono::Utc.timestamp_millis_opt(1138804193120).unwrap()),
    );
    inner.insert(
        "where".to_string(),
        LLSDValue::URI("http://example.com/path?q=1".to_string()),
    );
    inner.insert(
        "blob".to_string(),
        LLSDValue::Binary(vec![0x00, 0xFF, 0x42, 0xAB]),
    );
    let mut outer = LLSDMap::new();
    outer.insert("inner".to_string(), LLSDValue::Map(inner));
    outer.insert(
        "list".to_string(),
        LLSDValue::Array(vec![
            LLSDValue::Integer(1),
            LLSDValue::Real(2.5),
            LLSDValue::Array(vec![]),
            LLSDValue::Map(LLSDMap::new()),
        ]),
    );
    LLSDValue::Map(outer)
}

/// The real values that must survive every encoding bit-for-bit.
fn edge_reals() -> Vec<f64> {
    vec![
        f64::NAN,
        f64::INFINITY,
        f64::NEG_INFINITY,
        0.0,
        -0.0,
        f64::MIN_POSITIVE,
        f64::MAX,
        5e-324, // subnormal
    ]
}

#[test]
fn scenario_xml_minimal_map() {
    const INPUT: &str = "<?xml version=\"1.0\"?><llsd><map><key>region_id</key>\
        <uuid>67153d5b-3659-afb4-8510-adda2c034649</uuid><key>scale</key>\
        <string>one minute</string></map></llsd>";
    let parsed = de::xml::from_str(INPUT).unwrap();
    let map = parsed.as_map().unwrap();
    let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["region_id", "scale"]);
    assert_eq!(
        map["region_id"],
        LLSDValue::UUID(uuid::uuid!("67153d5b-3659-afb4-8510-adda2c034649"))
    );
    assert_eq!(map["scale"], LLSDValue::String("one minute".to_string()));
    let generated = ser::xml::to_string(&parsed, true).unwrap();
    assert_eq!(
        generated,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <llsd>\n\
         \x20 <map>\n\
         \x20   <key>region_id</key>\n\
         \x20   <uuid>67153d5b-3659-afb4-8510-adda2c034649</uuid>\n\
         \x20   <key>scale</key>\n\
         \x20   <string>one minute</string>\n\
         \x20 </map>\n\
         </llsd>\n"
    );
}

#[test]
fn scenario_notation_nested() {
    const INPUT: &str =
        "{name:s'Alice',scores:[i10,i20,r3.5],id:u550e8400-e29b-41d4-a716-446655440000}";
    let parsed = de::notation::from_str(INPUT).unwrap();
    let map = parsed.as_map().unwrap();
    assert_eq!(map.len(), 3);
    assert_eq!(
        map["scores"],
        LLSDValue::Array(vec![
            LLSDValue::Integer(10),
            LLSDValue::Integer(20),
            LLSDValue::Real(3.5),
        ])
    );
    //  Byte-identical round trip.
    assert_eq!(ser::notation::to_string(&parsed).unwrap(), INPUT);
}

#[test]
fn scenario_binary_nan_to_xml() {
    const BYTES: [u8; 24] = [
        0x6C, 0x6C, 0x73, 0x64, 0x2D, 0x01, 0x0A, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
        0x78, 0x03, 0x7F, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    let parsed = de::binary::from_bytes(&BYTES).unwrap();
    assert!(parsed.as_map().unwrap()["x"].as_real().unwrap().is_nan());
    let generated = ser::xml::to_string(&parsed, true).unwrap();
    assert_eq!(
        generated,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<llsd>\n  <map>\n    <key>x</key>\n    <real>nan</real>\n  </map>\n</llsd>\n"
    );
}

#[test]
fn roundtrip_kitchen_sink_all_formats() {
    let value = kitchen_sink();
    //  XML.
    let xml = ser::xml::to_string(&value, true).unwrap();
    assert!(bits_equal(&de::xml::from_str(&xml).unwrap(), &value));
    let xml = ser::xml::to_string(&value, false).unwrap();
    assert!(bits_equal(&de::xml::from_str(&xml).unwrap(), &value));
    //  Notation.
    let notation = ser::notation::to_string(&value).unwrap();
    assert!(bits_equal(&de::notation::from_str(&notation).unwrap(), &value));
    //  Binary.
    let binary = ser::binary::to_bytes(&value).unwrap();
    assert!(bits_equal(&de::binary::from_bytes(&binary).unwrap(), &value));
}

#[test]
fn roundtrip_edge_reals() {
    let value = LLSDValue::Array(edge_reals().into_iter().map(LLSDValue::Real).collect());
    let xml = ser::xml::to_string(&value, true).unwrap();
    assert!(bits_equal(&de::xml::from_str(&xml).unwrap(), &value));
    let notation = ser::notation::to_string(&value).unwrap();
    assert!(bits_equal(&de::notation::from_str(&notation).unwrap(), &value));
    let binary = ser::binary::to_bytes(&value).unwrap();
    assert!(bits_equal(&de::binary::from_bytes(&binary).unwrap(), &value));
    //  JSON strict mode: non-finite values become sentinel strings and
    //  come back as reals.
    let json = ser::json::to_string(&value).unwrap();
    assert!(bits_equal(&de::json::from_str(&json).unwrap(), &value));
}

#[test]
fn roundtrip_json_with_binary_wrap() {
    let value = kitchen_sink();
    let ser_options = ser::json::JsonSerOptions {
        binary_wrap: true,
        ..ser::json::JsonSerOptions::default()
    };
    let de_options = de::json::JsonParseOptions {
        binary_wrap: true,
        date_detection: true,
        uri_detection: true,
        ..de::json::JsonParseOptions::default()
    };
    let json = ser::json::to_string_with(&value, &ser_options).unwrap();
    let back = de::json::from_str_with(&json, &de_options).unwrap();
    assert!(bits_equal(&back, &value));
}

#[test]
fn roundtrip_json_default_modes() {
    //  Without detection flags, Date and URI come back as strings and
    //  UUIDs still promote.
    use chrono::TimeZone;
    let mut map = LLSDMap::new();
    map.insert(
        "id".to_string(),
        LLSDValue::UUID(uuid::uuid!("550e8400-e29b-41d4-a716-446655440000")),
    );
    map.insert(
        "when".to_string(),
        LLSDValue::Date(chrono::Utc.timestamp_millis_opt(1138804193000).unwrap()),
    );
    map.insert(
        "where".to_string(),
        LLSDValue::URI("http://example.com/".to_string()),
    );
    let json = ser::json::to_string(&LLSDValue::Map(map)).unwrap();
    let back = de::json::from_str(&json).unwrap();
    let back_map = back.as_map().unwrap();
    assert_eq!(back_map["id"].kind(), crate::LLSDType::UUID);
    assert_eq!(
        back_map["when"],
        LLSDValue::String("2006-02-01T14:29:53Z".to_string())
    );
    assert_eq!(
        back_map["where"],
        LLSDValue::String("http://example.com/".to_string())
    );
}

#[test]
fn map_order_survives_every_format() {
    let mut map = LLSDMap::new();
    for key in ["zebra", "aardvark", "mongoose", "01_numeric", "Two Words"] {
        map.insert(key.to_string(), LLSDValue::Integer(1));
    }
    let value = LLSDValue::Map(map);
    let expected: Vec<String> = value
        .as_map()
        .unwrap()
        .keys()
        .cloned()
        .collect();

    let observe = |parsed: &LLSDValue| -> Vec<String> {
        parsed.as_map().unwrap().keys().cloned().collect()
    };
    let xml = ser::xml::to_string(&value, true).unwrap();
    assert_eq!(observe(&de::xml::from_str(&xml).unwrap()), expected);
    let notation = ser::notation::to_string(&value).unwrap();
    assert_eq!(observe(&de::notation::from_str(&notation).unwrap()), expected);
    let binary = ser::binary::to_bytes(&value).unwrap();
    assert_eq!(observe(&de::binary::from_bytes(&binary).unwrap()), expected);
    let json = ser::json::to_string(&value).unwrap();
    assert_eq!(observe(&de::json::from_str(&json).unwrap()), expected);
}

#[test]
fn limits_apply_across_parsers() {
    use crate::ParseLimits;
    let tight = ParseLimits {
        max_elements: 3,
        ..ParseLimits::default()
    };
    let err = de::xml::from_str_with(
        "<llsd><array><integer>1</integer><integer>2</integer><integer>3</integer></array></llsd>",
        &tight,
    )
    .unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Limit);
    let err = de::notation::from_str_with("[i1,i2,i3]", &tight).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Limit);
}

#[test]
fn value_introspection() {
    let value = kitchen_sink();
    //  outer map + inner map (10 leaves) + list (4 entries).
    assert_eq!(value.count_elements(), 17);
    assert_eq!(value.max_depth(), 3);
    assert_eq!(value.kind(), crate::LLSDType::Map);
    assert_eq!(LLSDValue::Integer(1).count_elements(), 1);
    assert_eq!(LLSDValue::Integer(1).max_depth(), 1);
}

#[test]
fn cross_format_conversion_chain() {
    //  XML in, through every other format, back out unchanged.
    let original = kitchen_sink();
    let xml = ser::xml::to_string(&original, false).unwrap();
    let from_xml = de::xml::from_str(&xml).unwrap();
    let notation = ser::notation::to_string(&from_xml).unwrap();
    let from_notation = de::notation::from_str(&notation).unwrap();
    let binary = ser::binary::to_bytes(&from_notation).unwrap();
    let from_binary = de::binary::from_bytes(&binary).unwrap();
    assert!(bits_equal(&from_binary, &original));
}

#[test]
fn autodetect_roundtrips() {
    let value = kitchen_sink();
    let xml = ser::xml::to_string(&value, true).unwrap();
    let notation = ser::notation::to_string(&value).unwrap();
    let binary = ser::binary::to_bytes(&value).unwrap();
    assert!(bits_equal(&crate::from_bytes(xml.as_bytes()).unwrap(), &value));
    assert!(bits_equal(
        &crate::from_bytes(notation.as_bytes()).unwrap(),
        &value
    ));
    assert!(bits_equal(&crate::from_bytes(&binary).unwrap(), &value));
}
