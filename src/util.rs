//
//  util.rs -- operations over LLSD trees that no codec depends on:
//  path lookup, typed getters, template matching and filtering,
//  structural merge, clone variants.
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  License: LGPL.
//
use crate::error::{LLSDError, LLSDResult};
use crate::{LLSDMap, LLSDType, LLSDValue};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

/// True if `s` is an 8-4-4-4-12 hex UUID with hyphens in the standard
/// places. This is the only string shape that auto-promotes to UUID.
pub fn is_canonical_uuid(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, &b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

//
//  Path lookup
//

/// Walk a dot-separated key path into nested maps. `None` is the
/// "not found" result: a missing key or a non-map along the way.
pub fn get<'a>(root: &'a LLSDValue, path: &str) -> Option<&'a LLSDValue> {
    let mut current = root;
    for part in path.split('.') {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}

/// Path lookup that explains its failure: `Validation` for a missing
/// key, `WrongType` when an intermediate value is not a map.
pub fn get_strict<'a>(root: &'a LLSDValue, path: &str) -> LLSDResult<&'a LLSDValue> {
    let mut current = root;
    for part in path.split('.') {
        let map = current.as_map().ok_or_else(|| {
            LLSDError::wrong_type(format!(
                "path {:?}: segment {:?} reached a {} value, expected a map",
                path,
                part,
                current.type_name()
            ))
        })?;
        current = map.get(part).ok_or_else(|| {
            LLSDError::validation(format!("path {:?}: key {:?} not found", path, part))
        })?;
    }
    Ok(current)
}

/// Any scalar stringifies; Binary and containers do not.
pub fn get_string(root: &LLSDValue, path: &str) -> Option<String> {
    match get(root, path)? {
        LLSDValue::Boolean(v) => Some(if *v { "true" } else { "false" }.to_string()),
        LLSDValue::Integer(v) => Some(v.to_string()),
        LLSDValue::Real(v) => Some(crate::format_real(*v)),
        LLSDValue::String(v) | LLSDValue::URI(v) => Some(v.clone()),
        LLSDValue::UUID(v) => Some(v.to_string()),
        LLSDValue::Date(v) => Some(crate::format_date(v)),
        _ => None,
    }
}

pub fn get_integer(root: &LLSDValue, path: &str) -> Option<i32> {
    get(root, path)?.as_integer().copied()
}

pub fn get_real(root: &LLSDValue, path: &str) -> Option<f64> {
    get(root, path)?.as_real().copied()
}

/// Boolean with the safe coercions: Integer zero/non-zero, and the
/// strings "true"/"false"/"1"/"0", case-insensitive.
pub fn get_boolean(root: &LLSDValue, path: &str) -> Option<bool> {
    match get(root, path)? {
        LLSDValue::Boolean(v) => Some(*v),
        LLSDValue::Integer(v) => Some(*v != 0),
        LLSDValue::String(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// UUID, or a String in the canonical pattern.
pub fn get_uuid(root: &LLSDValue, path: &str) -> Option<Uuid> {
    match get(root, path)? {
        LLSDValue::UUID(v) => Some(*v),
        LLSDValue::String(v) if is_canonical_uuid(v) => Uuid::parse_str(v).ok(),
        _ => None,
    }
}

pub fn get_date(root: &LLSDValue, path: &str) -> Option<DateTime<Utc>> {
    get(root, path)?.as_date().copied()
}

pub fn get_binary<'a>(root: &'a LLSDValue, path: &str) -> Option<&'a [u8]> {
    get(root, path)?.as_binary().map(Vec::as_slice)
}

//
//  Template matching
//

/// Structural prototype check. For maps, every template key must exist
/// in the data and match recursively; extra data keys are ignored. For
/// arrays, the data must be at least as long as the template and match
/// element-wise. Scalar templates accept data kinds per the
/// compatibility rules; an Undefined template accepts anything.
pub fn matches(template: &LLSDValue, data: &LLSDValue) -> bool {
    match template {
        LLSDValue::Undefined => true,
        LLSDValue::Map(template_entries) => match data.as_map() {
            Some(data_entries) => template_entries.iter().all(|(key, template_value)| {
                data_entries
                    .get(key)
                    .map_or(false, |data_value| matches(template_value, data_value))
            }),
            None => false,
        },
        LLSDValue::Array(template_items) => match data.as_array() {
            Some(data_items) => {
                data_items.len() >= template_items.len()
                    && template_items
                        .iter()
                        .zip(data_items)
                        .all(|(t, d)| matches(t, d))
            }
            None => false,
        },
        _ => scalar_matches(template, data),
    }
}

/// The scalar compatibility table.
fn scalar_matches(template: &LLSDValue, data: &LLSDValue) -> bool {
    match template.kind() {
        //  String accepts any scalar except Binary.
        LLSDType::String => !matches!(
            data.kind(),
            LLSDType::Binary | LLSDType::Array | LLSDType::Map | LLSDType::Undefined
        ),
        LLSDType::Integer => match data {
            LLSDValue::Integer(_) | LLSDValue::Real(_) | LLSDValue::Boolean(_) => true,
            LLSDValue::String(s) => s.trim().parse::<i32>().is_ok(),
            _ => false,
        },
        LLSDType::Real => matches!(
            data.kind(),
            LLSDType::Real | LLSDType::Integer | LLSDType::Boolean
        ),
        LLSDType::Boolean => match data {
            LLSDValue::Boolean(_) | LLSDValue::Integer(_) | LLSDValue::Real(_) => true,
            LLSDValue::String(s) => s == "true" || s == "false",
            _ => false,
        },
        LLSDType::UUID => match data {
            LLSDValue::UUID(_) => true,
            LLSDValue::String(s) => is_canonical_uuid(s),
            _ => false,
        },
        LLSDType::Date => match data {
            LLSDValue::Date(_) => true,
            LLSDValue::String(s) => DateTime::parse_from_rfc3339(s).is_ok(),
            _ => false,
        },
        LLSDType::Binary => data.kind() == LLSDType::Binary,
        LLSDType::URI => matches!(data.kind(), LLSDType::URI | LLSDType::String),
        //  Containers and Undefined are handled by the caller.
        _ => false,
    }
}

/// Keep only the parts of `data` the template names. Map keys absent
/// from the template map are dropped, unless a `"*"` wildcard key
/// admits them; an admitted wildcard value passes through unfiltered.
/// Array elements filter against the corresponding template element.
pub fn filter(data: &LLSDValue, template: &LLSDValue) -> LLSDValue {
    match (data, template) {
        (LLSDValue::Map(data_entries), LLSDValue::Map(template_entries)) => {
            let wildcard = template_entries.contains_key("*");
            let mut out = LLSDMap::new();
            for (key, data_value) in data_entries {
                if let Some(template_value) = template_entries.get(key) {
                    out.insert(key.clone(), filter(data_value, template_value));
                } else if wildcard {
                    out.insert(key.clone(), data_value.clone());
                }
            }
            LLSDValue::Map(out)
        }
        (LLSDValue::Array(data_items), LLSDValue::Array(template_items)) => LLSDValue::Array(
            data_items
                .iter()
                .enumerate()
                .map(|(i, data_value)| match template_items.get(i) {
                    Some(template_value) => filter(data_value, template_value),
                    None => data_value.clone(),
                })
                .collect(),
        ),
        _ => data.clone(),
    }
}

//
//  Clones and merge
//

/// Deep clone that drops map keys the filter maps to `false` and keeps
/// keys mapped to `true`. The same filter applies at every map level.
/// A `"*"` entry supplies the verdict for keys the filter does not
/// name; without one, unnamed keys are dropped.
pub fn clone_with_filter(value: &LLSDValue, key_filter: &IndexMap<String, bool>) -> LLSDValue {
    match value {
        LLSDValue::Map(entries) => {
            let wildcard = key_filter.get("*").copied();
            let mut out = LLSDMap::new();
            for (key, entry) in entries {
                let keep = key_filter.get(key).copied().or(wildcard).unwrap_or(false);
                if keep {
                    out.insert(key.clone(), clone_with_filter(entry, key_filter));
                }
            }
            LLSDValue::Map(out)
        }
        LLSDValue::Array(items) => LLSDValue::Array(
            items
                .iter()
                .map(|entry| clone_with_filter(entry, key_filter))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A "shallow" copy in a language without shared ownership: a new
/// top-level container is built and its children are cloned, since
/// aliasing them is not expressible here. For scalars this is the
/// value itself.
pub fn shallow_clone(value: &LLSDValue) -> LLSDValue {
    match value {
        LLSDValue::Map(entries) => LLSDValue::Map(entries.clone()),
        LLSDValue::Array(items) => LLSDValue::Array(items.clone()),
        other => other.clone(),
    }
}

/// Merge `overlay` onto `base`. Map/map pairs merge recursively and
/// overlay wins for scalars; arrays are replaced atomically.
pub fn merge(base: &LLSDValue, overlay: &LLSDValue) -> LLSDValue {
    match (base, overlay) {
        (LLSDValue::Map(base_entries), LLSDValue::Map(overlay_entries)) => {
            let mut out = base_entries.clone();
            for (key, overlay_value) in overlay_entries {
                let merged = match out.get(key) {
                    Some(base_value @ LLSDValue::Map(_)) if overlay_value.kind() == LLSDType::Map => {
                        merge(base_value, overlay_value)
                    }
                    _ => overlay_value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            LLSDValue::Map(out)
        }
        _ => overlay.clone(),
    }
}

/// Structural equality with bit-precision-aware real comparison.
/// See [`LLSDValue::equals`].
pub fn equals(a: &LLSDValue, b: &LLSDValue, bits: i32) -> bool {
    a.equals(b, bits)
}

// Unit tests

#[cfg(test)]
fn sample_tree() -> LLSDValue {
    let mut inner = LLSDMap::new();
    inner.insert("name".to_string(), LLSDValue::String("Region One".to_string()));
    inner.insert("agents".to_string(), LLSDValue::Integer(14));
    inner.insert("ratio".to_string(), LLSDValue::Real(0.5));
    inner.insert(
        "id".to_string(),
        LLSDValue::String("550e8400-e29b-41d4-a716-446655440000".to_string()),
    );
    inner.insert("active".to_string(), LLSDValue::Integer(1));
    let mut root = LLSDMap::new();
    root.insert("region".to_string(), LLSDValue::Map(inner));
    root.insert("flag".to_string(), LLSDValue::Boolean(true));
    LLSDValue::Map(root)
}

#[test]
fn get_walks_paths() {
    let tree = sample_tree();
    assert_eq!(
        get(&tree, "region.name"),
        Some(&LLSDValue::String("Region One".to_string()))
    );
    assert_eq!(get(&tree, "region.missing"), None);
    assert_eq!(get(&tree, "flag.too_deep"), None);
    assert!(get_strict(&tree, "region.name").is_ok());
    assert_eq!(
        get_strict(&tree, "region.missing").unwrap_err().kind(),
        crate::ErrorKind::Validation
    );
    assert_eq!(
        get_strict(&tree, "flag.too_deep").unwrap_err().kind(),
        crate::ErrorKind::WrongType
    );
}

#[test]
fn typed_getters_coerce() {
    let tree = sample_tree();
    assert_eq!(get_integer(&tree, "region.agents"), Some(14));
    assert_eq!(get_integer(&tree, "region.name"), None);
    assert_eq!(get_real(&tree, "region.ratio"), Some(0.5));
    assert_eq!(
        get_string(&tree, "region.agents").as_deref(),
        Some("14")
    );
    assert_eq!(get_string(&tree, "flag").as_deref(), Some("true"));
    assert_eq!(get_boolean(&tree, "region.active"), Some(true));
    assert_eq!(
        get_uuid(&tree, "region.id"),
        Some(uuid::uuid!("550e8400-e29b-41d4-a716-446655440000"))
    );
    assert_eq!(get_binary(&tree, "region.name"), None);
}

#[test]
fn template_compatibility_table() {
    let string_t = LLSDValue::String(String::new());
    let integer_t = LLSDValue::Integer(0);
    let real_t = LLSDValue::Real(0.0);
    let boolean_t = LLSDValue::Boolean(false);
    let uuid_t = LLSDValue::UUID(Uuid::nil());
    let date_t = LLSDValue::Date(DateTime::<Utc>::UNIX_EPOCH);
    let binary_t = LLSDValue::Binary(Vec::new());
    let uri_t = LLSDValue::URI(String::new());

    let integer = LLSDValue::Integer(9);
    let real = LLSDValue::Real(1.5);
    let string = LLSDValue::String("word".to_string());
    let numeric_string = LLSDValue::String("37".to_string());
    let binary = LLSDValue::Binary(vec![1]);

    //  String accepts any scalar except Binary.
    assert!(matches(&string_t, &integer));
    assert!(matches(&string_t, &real));
    assert!(!matches(&string_t, &binary));
    //  Integer accepts numerics, booleans, and numeric strings.
    assert!(matches(&integer_t, &real));
    assert!(matches(&integer_t, &boolean_t));
    assert!(matches(&integer_t, &numeric_string));
    assert!(!matches(&integer_t, &string));
    //  Real takes no strings at all.
    assert!(matches(&real_t, &integer));
    assert!(!matches(&real_t, &numeric_string));
    //  Boolean accepts "true"/"false" strings only.
    assert!(matches(&boolean_t, &integer));
    assert!(matches(&boolean_t, &LLSDValue::String("true".to_string())));
    assert!(!matches(&boolean_t, &LLSDValue::String("yes".to_string())));
    //  UUID accepts the canonical pattern only.
    assert!(matches(
        &uuid_t,
        &LLSDValue::String("550e8400-e29b-41d4-a716-446655440000".to_string())
    ));
    assert!(!matches(&uuid_t, &string));
    //  Date accepts ISO-8601 strings.
    assert!(matches(
        &date_t,
        &LLSDValue::String("2006-02-01T14:29:53Z".to_string())
    ));
    assert!(!matches(&date_t, &string));
    //  Binary accepts only Binary.
    assert!(matches(&binary_t, &binary));
    assert!(!matches(&binary_t, &string));
    //  URI accepts URI and String.
    assert!(matches(&uri_t, &string));
    assert!(!matches(&uri_t, &integer));
}

#[test]
fn template_matches_structure() {
    let mut template_map = LLSDMap::new();
    template_map.insert("name".to_string(), LLSDValue::String(String::new()));
    template_map.insert(
        "scores".to_string(),
        LLSDValue::Array(vec![LLSDValue::Integer(0)]),
    );
    let template = LLSDValue::Map(template_map);

    let mut ok_map = LLSDMap::new();
    ok_map.insert("name".to_string(), LLSDValue::String("x".to_string()));
    ok_map.insert(
        "scores".to_string(),
        LLSDValue::Array(vec![LLSDValue::Integer(1), LLSDValue::Integer(2)]),
    );
    ok_map.insert("extra".to_string(), LLSDValue::Boolean(true));
    assert!(matches(&template, &LLSDValue::Map(ok_map.clone())));

    //  Data array shorter than template fails.
    ok_map.insert("scores".to_string(), LLSDValue::Array(vec![]));
    assert!(!matches(&template, &LLSDValue::Map(ok_map.clone())));

    //  Missing template key fails.
    ok_map.swap_remove("name");
    assert!(!matches(&template, &LLSDValue::Map(ok_map)));
}

#[test]
fn filter_with_and_without_wildcard() {
    let mut data_map = LLSDMap::new();
    data_map.insert("name".to_string(), LLSDValue::String("John".to_string()));
    data_map.insert("age".to_string(), LLSDValue::Integer(25));
    data_map.insert("extra".to_string(), LLSDValue::Integer(7));
    data_map.insert("exclude".to_string(), LLSDValue::String("no".to_string()));
    let data = LLSDValue::Map(data_map);

    let mut template_map = LLSDMap::new();
    template_map.insert("name".to_string(), LLSDValue::String(String::new()));
    template_map.insert("age".to_string(), LLSDValue::Integer(0));

    //  Without a wildcard, only named keys survive.
    let narrowed = filter(&data, &LLSDValue::Map(template_map.clone()));
    let keys: Vec<&str> = narrowed.as_map().unwrap().keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["name", "age"]);

    //  The wildcard admits everything else, values untouched.
    template_map.insert("*".to_string(), LLSDValue::Integer(0));
    let admitted = filter(&data, &LLSDValue::Map(template_map));
    assert_eq!(admitted, data);
}

#[test]
fn clone_filter_applies_at_every_level() {
    let mut inner = LLSDMap::new();
    inner.insert("keep".to_string(), LLSDValue::Integer(1));
    inner.insert("secret".to_string(), LLSDValue::Integer(2));
    let mut outer = LLSDMap::new();
    outer.insert("keep".to_string(), LLSDValue::Map(inner));
    outer.insert("secret".to_string(), LLSDValue::Integer(3));
    let value = LLSDValue::Map(outer);

    let mut key_filter = IndexMap::new();
    key_filter.insert("keep".to_string(), true);
    key_filter.insert("secret".to_string(), false);
    let cloned = clone_with_filter(&value, &key_filter);
    let outer = cloned.as_map().unwrap();
    assert_eq!(outer.len(), 1);
    let inner = outer["keep"].as_map().unwrap();
    assert_eq!(inner.len(), 1);
    assert_eq!(inner["keep"], LLSDValue::Integer(1));

    //  "*" admits unspecified keys.
    let mut wildcard_filter = IndexMap::new();
    wildcard_filter.insert("secret".to_string(), false);
    wildcard_filter.insert("*".to_string(), true);
    let cloned = clone_with_filter(&value, &wildcard_filter);
    assert_eq!(cloned.as_map().unwrap().len(), 1);
    assert!(cloned.as_map().unwrap().contains_key("keep"));
}

#[test]
fn merge_overlays_recursively() {
    let mut base_inner = LLSDMap::new();
    base_inner.insert("a".to_string(), LLSDValue::Integer(1));
    base_inner.insert("b".to_string(), LLSDValue::Integer(2));
    let mut base_map = LLSDMap::new();
    base_map.insert("nested".to_string(), LLSDValue::Map(base_inner));
    base_map.insert(
        "list".to_string(),
        LLSDValue::Array(vec![LLSDValue::Integer(1), LLSDValue::Integer(2)]),
    );
    let base = LLSDValue::Map(base_map);

    let mut overlay_inner = LLSDMap::new();
    overlay_inner.insert("b".to_string(), LLSDValue::Integer(20));
    overlay_inner.insert("c".to_string(), LLSDValue::Integer(30));
    let mut overlay_map = LLSDMap::new();
    overlay_map.insert("nested".to_string(), LLSDValue::Map(overlay_inner));
    overlay_map.insert(
        "list".to_string(),
        LLSDValue::Array(vec![LLSDValue::Integer(9)]),
    );
    let overlay = LLSDValue::Map(overlay_map);

    let merged = merge(&base, &overlay);
    let nested = merged.as_map().unwrap()["nested"].as_map().unwrap();
    assert_eq!(nested["a"], LLSDValue::Integer(1));
    assert_eq!(nested["b"], LLSDValue::Integer(20));
    assert_eq!(nested["c"], LLSDValue::Integer(30));
    //  Arrays are replaced atomically, not merged.
    assert_eq!(
        merged.as_map().unwrap()["list"],
        LLSDValue::Array(vec![LLSDValue::Integer(9)])
    );
}

#[test]
fn bit_precision_equality() {
    let a = LLSDValue::Real(3.14159);
    let b = LLSDValue::Real(3.14160);
    assert!(equals(&a, &b, 10));
    assert!(!equals(&a, &b, 20));
    //  NaN is unequal to itself at any precision.
    let nan = LLSDValue::Real(f64::NAN);
    assert!(!equals(&nan, &nan, 0));
    assert!(!equals(&nan, &nan, 52));
    assert!(!equals(&nan, &nan, -1));
    //  One ulp apart fails bit-exact comparison, passes loose.
    let x = 1.75_f64;
    let next = f64::from_bits(x.to_bits() + 1);
    assert!(!equals(&LLSDValue::Real(x), &LLSDValue::Real(next), 52));
    assert!(equals(&LLSDValue::Real(x), &LLSDValue::Real(next), 10));
    assert!(equals(&LLSDValue::Real(x), &LLSDValue::Real(x), 10));
}

#[test]
fn deep_clone_is_independent() {
    let original = sample_tree();
    let mut cloned = original.clone();
    if let LLSDValue::Map(entries) = &mut cloned {
        if let Some(LLSDValue::Map(inner)) = entries.get_mut("region") {
            inner.insert("agents".to_string(), LLSDValue::Integer(999));
        }
    }
    //  The original still has the old value.
    assert_eq!(get_integer(&original, "region.agents"), Some(14));
    assert_eq!(get_integer(&cloned, "region.agents"), Some(999));
}

#[test]
fn canonical_uuid_shapes() {
    assert!(is_canonical_uuid("550e8400-e29b-41d4-a716-446655440000"));
    assert!(is_canonical_uuid("550E8400-E29B-41D4-A716-446655440000"));
    assert!(!is_canonical_uuid("550e8400e29b41d4a716446655440000"));
    assert!(!is_canonical_uuid("550e8400-e29b-41d4-a716-44665544000"));
    assert!(!is_canonical_uuid("550e8400-e29b-41d4-a716_446655440000"));
    assert!(!is_canonical_uuid(""));
}
