//! Property-based round-trip tests across the four encodings.

use chrono::TimeZone;
use llsd::{de, ser, LLSDMap, LLSDValue};
use proptest::prelude::*;
use uuid::Uuid;

// =========================================================================
// Value generation strategies
// =========================================================================

/// Text payloads. Sentinel-shaped and UUID-shaped strings are excluded
/// because the JSON projection promotes those by design; colons are
/// excluded so date detection can never fire on plain text.
fn arb_text() -> impl Strategy<Value = String> {
    r#"[a-zA-Z0-9 <>&"'\\_.-]{0,32}"#.prop_filter("reserved string shapes", |s| {
        !matches!(s.as_str(), "NaN" | "Infinity" | "-Infinity") && !llsd::util::is_canonical_uuid(s)
    })
}

/// Bare and quoted map keys, up to 32 chars.
fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_][a-z0-9_]{0,31}",
        "[a-zA-Z ]{1,32}",
        "[0-9][a-z0-9]{0,31}",
    ]
}

/// Any f64 bit pattern worth testing, non-finite values included.
fn arb_real() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => any::<f64>(),
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
        1 => Just(-0.0),
        1 => Just(5e-324),
        1 => Just(f64::MAX),
    ]
}

fn arb_date() -> impl Strategy<Value = LLSDValue> {
    (-4_000_000_000_000i64..4_000_000_000_000i64)
        .prop_map(|ms| LLSDValue::Date(chrono::Utc.timestamp_millis_opt(ms).unwrap()))
}

fn arb_uri() -> impl Strategy<Value = LLSDValue> {
    "https?://[a-z]{1,8}\\.example\\.com/[a-z0-9]{0,8}".prop_map(LLSDValue::URI)
}

fn arb_uuid() -> impl Strategy<Value = LLSDValue> {
    prop::array::uniform16(any::<u8>()).prop_map(|b| LLSDValue::UUID(Uuid::from_bytes(b)))
}

/// Leaves for the full-fidelity formats: every variant appears.
fn arb_leaf() -> BoxedStrategy<LLSDValue> {
    prop_oneof![
        Just(LLSDValue::Undefined),
        any::<bool>().prop_map(LLSDValue::Boolean),
        any::<i32>().prop_map(LLSDValue::Integer),
        arb_real().prop_map(LLSDValue::Real),
        arb_text().prop_map(LLSDValue::String),
        arb_uuid(),
        arb_date(),
        arb_uri(),
        prop::collection::vec(any::<u8>(), 0..24).prop_map(LLSDValue::Binary),
    ]
    .boxed()
}

/// Leaves that survive the default JSON projection: no Binary, no
/// non-finite reals, no Date or URI (those stay strings without the
/// detection flags).
fn arb_json_leaf() -> BoxedStrategy<LLSDValue> {
    prop_oneof![
        Just(LLSDValue::Undefined),
        any::<bool>().prop_map(LLSDValue::Boolean),
        any::<i32>().prop_map(LLSDValue::Integer),
        any::<f64>()
            .prop_filter("finite only", |f| f.is_finite())
            .prop_map(LLSDValue::Real),
        arb_text().prop_map(LLSDValue::String),
        arb_uuid(),
    ]
    .boxed()
}

/// Containers over the given leaves, nested up to depth 8.
fn arb_value(leaf: BoxedStrategy<LLSDValue>) -> impl Strategy<Value = LLSDValue> {
    leaf.prop_recursive(8, 96, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(LLSDValue::Array),
            prop::collection::vec((arb_key(), inner), 0..5).prop_map(|pairs| {
                let mut map = LLSDMap::new();
                for (key, value) in pairs {
                    map.insert(key, value);
                }
                LLSDValue::Map(map)
            }),
        ]
    })
}

// =========================================================================
// Equality helper: bit-exact reals, order-sensitive maps
// =========================================================================

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

// =========================================================================
// Round-trip properties
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn xml_roundtrip_pretty(value in arb_value(arb_leaf())) {
        let text = ser::xml::to_string(&value, true).unwrap();
        let back = de::xml::from_str(&text).unwrap();
        prop_assert!(bits_equal(&back, &value), "through {}", text);
    }

    #[test]
    fn xml_roundtrip_compact(value in arb_value(arb_leaf())) {
        let text = ser::xml::to_string(&value, false).unwrap();
        let back = de::xml::from_str(&text).unwrap();
        prop_assert!(bits_equal(&back, &value), "through {}", text);
    }

    #[test]
    fn notation_roundtrip(value in arb_value(arb_leaf())) {
        let text = ser::notation::to_string(&value).unwrap();
        let back = de::notation::from_str(&text).unwrap();
        prop_assert!(bits_equal(&back, &value), "through {}", text);
    }

    #[test]
    fn notation_reserialization_is_stable(value in arb_value(arb_leaf())) {
        //  Notation out of the serializer reparses to the same bytes.
        let text = ser::notation::to_string(&value).unwrap();
        let back = de::notation::from_str(&text).unwrap();
        let again = ser::notation::to_string(&back).unwrap();
        prop_assert_eq!(text, again);
    }

    #[test]
    fn binary_roundtrip(value in arb_value(arb_leaf())) {
        let bytes = ser::binary::to_bytes(&value).unwrap();
        let back = de::binary::from_bytes(&bytes).unwrap();
        prop_assert!(bits_equal(&back, &value));
    }

    #[test]
    fn json_roundtrip_default_modes(value in arb_value(arb_json_leaf())) {
        let text = ser::json::to_string(&value).unwrap();
        let back = de::json::from_str(&text).unwrap();
        prop_assert!(bits_equal(&back, &value), "through {}", text);
    }

    #[test]
    fn json_roundtrip_binary_wrap(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let value = LLSDValue::Binary(bytes);
        let options = ser::json::JsonSerOptions { binary_wrap: true, ..Default::default() };
        let text = ser::json::to_string_with(&value, &options).unwrap();
        let parse_options = de::json::JsonParseOptions { binary_wrap: true, ..Default::default() };
        let back = de::json::from_str_with(&text, &parse_options).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn autodetect_identifies_own_output(value in arb_value(arb_leaf())) {
        use llsd::LLSDFormat;
        let binary = ser::binary::to_bytes(&value).unwrap();
        prop_assert_eq!(llsd::detect_format(&binary), LLSDFormat::Binary);
        let xml = ser::xml::to_string(&value, true).unwrap();
        prop_assert_eq!(llsd::detect_format(xml.as_bytes()), LLSDFormat::Xml);
    }

    #[test]
    fn map_order_preserved(pairs in prop::collection::vec(("[a-z]{1,12}", any::<i32>()), 0..12)) {
        let mut map = LLSDMap::new();
        for (key, v) in pairs {
            map.insert(key, LLSDValue::Integer(v));
        }
        let value = LLSDValue::Map(map);
        let expected: Vec<String> = value.as_map().unwrap().keys().cloned().collect();
        for parsed in [
            de::xml::from_str(&ser::xml::to_string(&value, true).unwrap()).unwrap(),
            de::notation::from_str(&ser::notation::to_string(&value).unwrap()).unwrap(),
            de::binary::from_bytes(&ser::binary::to_bytes(&value).unwrap()).unwrap(),
            de::json::from_str(&ser::json::to_string(&value).unwrap()).unwrap(),
        ] {
            let got: Vec<String> = parsed.as_map().unwrap().keys().cloned().collect();
            prop_assert_eq!(&got, &expected);
        }
    }

    #[test]
    fn bit_precision_equality_properties(x in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
        let a = LLSDValue::Real(x);
        prop_assert!(llsd::util::equals(&a, &a, 10));
        prop_assert!(llsd::util::equals(&a, &a, 52));
        let next = f64::from_bits(x.to_bits() + 1);
        if next.is_finite() {
            prop_assert!(!llsd::util::equals(&a, &LLSDValue::Real(next), 52));
        }
    }
}
