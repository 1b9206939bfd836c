//! Property tests for the column codec and path flattening.

use proptest::prelude::*;
use slotdb_codec::path::{expand, flatten};
use slotdb_codec::{deserialize, pack, serialize, truncate, unpack, Map, Value};

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1e20f64..1e20).prop_map(Value::Float),
        ".{0,40}".prop_map(Value::Text),
        any::<i64>().prop_map(Value::Date),
        "[A-Z][a-z]{0,8}#[a-z0-9]{1,12}".prop_map(Value::Ref),
        ("[A-Z][a-z]{0,8}", "[a-z0-9]{1,12}").prop_map(|(kind, id)| Value::Entity { kind, id }),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// What a top-level column value reads back as: integral floats come back
/// as integers.
fn as_stored(value: Value) -> Value {
    match value {
        #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
        Value::Float(f) if f.fract() == 0.0 && (-I64_LIMIT..I64_LIMIT).contains(&f) => {
            Value::Integer(f as i64)
        }
        other => other,
    }
}

fn map_strategy() -> impl Strategy<Value = Map> {
    prop::collection::btree_map("[a-z]{1,6}", value_strategy(), 0..5)
}

proptest! {
    #[test]
    fn column_roundtrip(value in value_strategy()) {
        let encoded = serialize(&value).unwrap();
        let decoded = deserialize(encoded.text.as_deref(), encoded.tag).unwrap();
        prop_assert_eq!(decoded, as_stored(value));
    }

    #[test]
    fn pack_roundtrip(value in value_strategy()) {
        let bytes = pack(&value).unwrap();
        prop_assert_eq!(unpack(&bytes).unwrap(), value);
    }

    #[test]
    fn integer_text_order_matches_numeric_order(a in any::<i64>(), b in any::<i64>()) {
        let ta = serialize(&Value::Integer(a)).unwrap().text.unwrap();
        let tb = serialize(&Value::Integer(b)).unwrap().text.unwrap();
        prop_assert_eq!(a.cmp(&b), ta.cmp(&tb));
    }

    #[test]
    fn float_text_order_matches_numeric_order(a in -1e20f64..1e20, b in -1e20f64..1e20) {
        prop_assume!(a != b);
        let ta = serialize(&Value::Float(a)).unwrap().text.unwrap();
        let tb = serialize(&Value::Float(b)).unwrap().text.unwrap();
        prop_assert_eq!(a < b, ta < tb);
    }

    #[test]
    fn mixed_number_order(a in -1_000_000i64..1_000_000, b in -1e6f64..1e6) {
        #[allow(clippy::cast_precision_loss)]
        let af = a as f64;
        prop_assume!(af != b);
        let ta = serialize(&Value::Integer(a)).unwrap().text.unwrap();
        let tb = serialize(&Value::Float(b)).unwrap().text.unwrap();
        prop_assert_eq!(af < b, ta < tb);
    }

    #[test]
    fn equal_numbers_share_text(n in -1_000_000_000i64..1_000_000_000) {
        #[allow(clippy::cast_precision_loss)]
        let f = n as f64;
        let ti = serialize(&Value::Integer(n)).unwrap();
        let tf = serialize(&Value::Float(f)).unwrap();
        prop_assert_eq!(ti, tf);
    }

    #[test]
    fn mixed_number_order_is_total(a in -1_000_000i64..1_000_000, b in -1e6f64..1e6) {
        #[allow(clippy::cast_precision_loss)]
        let af = a as f64;
        let ta = serialize(&Value::Integer(a)).unwrap().text.unwrap();
        let tb = serialize(&Value::Float(b)).unwrap().text.unwrap();
        prop_assert_eq!(af.partial_cmp(&b), Some(ta.cmp(&tb)));
    }

    #[test]
    fn truncate_is_a_char_boundary_prefix(s in ".{0,64}", max in 0usize..80) {
        let cut = truncate(&s, max);
        prop_assert!(cut.len() <= max);
        prop_assert!(s.starts_with(cut));
        // nothing longer would have fit
        if cut.len() < s.len() {
            let next = s[cut.len()..].chars().next().map_or(0, char::len_utf8);
            prop_assert!(cut.len() + next > max);
        }
    }

    #[test]
    fn expand_inverts_flatten(map in map_strategy()) {
        prop_assert_eq!(expand(flatten(&map)), map);
    }

    #[test]
    fn flattened_names_are_unique(map in map_strategy()) {
        let names: Vec<String> = flatten(&map).into_iter().map(|(name, _)| name).collect();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(names.len(), deduped.len());
    }
}
