//! Golden byte-output snapshots for the canonical encoder.
//!
//! These pin the exact UTF-8 bytes `CanonicalValue::encode` produces for a
//! handful of representative shapes, so a regression in key ordering,
//! string escaping, or separator placement is caught immediately rather
//! than only surfacing as a downstream hash mismatch.

use nooterra_crypto::CanonicalValue;

#[test]
fn object_keys_are_code_point_sorted_with_no_whitespace() {
    let value = CanonicalValue::object([
        ("b", CanonicalValue::Number(2)),
        ("a", CanonicalValue::String("hello".to_string())),
        ("Z", CanonicalValue::Bool(true)),
    ]);
    let encoded = String::from_utf8(value.encode()).unwrap();
    insta::assert_snapshot!(encoded, @r#"{"Z":true,"a":"hello","b":2}"#);
}

#[test]
fn nested_array_preserves_order_while_objects_sort() {
    let value = CanonicalValue::object([
        (
            "items",
            CanonicalValue::array([
                CanonicalValue::Number(3),
                CanonicalValue::Number(1),
                CanonicalValue::Number(2),
            ]),
        ),
        ("empty", CanonicalValue::Null),
    ]);
    let encoded = String::from_utf8(value.encode()).unwrap();
    insta::assert_snapshot!(encoded, @r#"{"empty":null,"items":[3,1,2]}"#);
}

#[test]
fn strings_with_control_and_quote_characters_escape_per_json_rules() {
    let value = CanonicalValue::object([(
        "note",
        CanonicalValue::String("line\nbreak \"quoted\" tab\tend".to_string()),
    )]);
    let encoded = String::from_utf8(value.encode()).unwrap();
    insta::assert_snapshot!(encoded, @r#"{"note":"line\nbreak \"quoted\" tab\tend"}"#);
}

#[test]
fn with_field_nulled_replaces_only_the_named_field() {
    let value = CanonicalValue::object([
        ("recordHash", CanonicalValue::String("deadbeef".to_string())),
        ("tenantId", CanonicalValue::String("tenant-1".to_string())),
    ]);
    let nulled = value.with_field_nulled("recordHash");
    let encoded = String::from_utf8(nulled.encode()).unwrap();
    insta::assert_snapshot!(encoded, @r#"{"recordHash":null,"tenantId":"tenant-1"}"#);
}
