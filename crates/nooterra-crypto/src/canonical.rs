//! Canonical JSON-like value and byte-exact encoder.
//!
//! [`CanonicalValue`] is the closed set of shapes every hashed record is
//! reduced to before encoding. Object keys live in a [`BTreeMap`], so
//! code-point-sorted key order falls out of the container rather than a
//! sort step at encode time. The encoder never consults `serde_json`'s
//! own (insertion- or map-ordered) `Value` serializer directly for the
//! hash path; `serde_json::Value` is only a bridge type at deserialization
//! boundaries, converted into `CanonicalValue` via [`ToCanonical`] before
//! anything is hashed.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use nooterra_error::{ErrorCode, NooterraError};
use serde_json::Value;

/// A value in the canonical encoding domain.
///
/// Every schema in this substrate is built from non-negative integers,
/// booleans, strings, arrays, and nested objects — no field defined by
/// any record needs a non-integer number, so [`CanonicalValue::Number`]
/// only represents the integer domain. `f64` is rejected at the boundary
/// (see [`ToCanonical for Value`]) rather than partially supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalValue {
    /// JSON `null`.
    Null,
    /// JSON `true`/`false`.
    Bool(bool),
    /// An integer, signed to allow negative cent amounts in refund contexts.
    Number(i64),
    /// A UTF-8 string, JSON-escaped on encode.
    String(String),
    /// An ordered array; order is preserved, not sorted.
    Array(Vec<CanonicalValue>),
    /// An object; keys are code-point sorted by virtue of the `BTreeMap`.
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Shorthand for building an object from an iterator of `(key, value)` pairs.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, CanonicalValue)>,
        K: Into<String>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Shorthand for building an array from an iterator of values.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = CanonicalValue>,
    {
        Self::Array(items.into_iter().collect())
    }

    /// Returns a clone of `self` as an object with `key` set to `null`,
    /// used to null out a record's own hash field before hashing it.
    ///
    /// # Panics
    /// Panics if `self` is not a [`CanonicalValue::Object`]; every signed
    /// record's canonical body is an object by construction.
    #[must_use]
    pub fn with_field_nulled(&self, key: &str) -> Self {
        let Self::Object(fields) = self else {
            panic!("with_field_nulled called on a non-object CanonicalValue");
        };
        let mut cloned = fields.clone();
        cloned.insert(key.to_string(), Self::Null);
        Self::Object(cloned)
    }

    /// Encode `self` into its canonical UTF-8 byte representation.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        self.write_to(&mut out);
        out.into_bytes()
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => {
                // Integers have exactly one canonical decimal form; no
                // trailing-zero or exponent ambiguity to resolve.
                let _ = write!(out, "{n}");
            }
            Self::String(s) => write_json_string(s, out),
            Self::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_to(out);
                }
                out.push(']');
            }
            Self::Object(fields) => {
                out.push('{');
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_json_string(k, out);
                    out.push(':');
                    v.write_to(out);
                }
                out.push('}');
            }
        }
    }
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Converts a typed value into the canonical encoding domain.
///
/// Every record type in `nooterra-records` and its sibling crates
/// implements this instead of deriving `serde::Serialize` and hoping
/// the JSON library's key order happens to match; the conversion is the
/// single place a record's hash-relevant shape is defined.
pub trait ToCanonical {
    /// Produce this value's canonical representation.
    fn to_canonical(&self) -> CanonicalValue;
}

impl ToCanonical for CanonicalValue {
    fn to_canonical(&self) -> CanonicalValue {
        self.clone()
    }
}

impl ToCanonical for str {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.to_string())
    }
}

impl ToCanonical for String {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.clone())
    }
}

impl ToCanonical for bool {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::Bool(*self)
    }
}

impl ToCanonical for i64 {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::Number(*self)
    }
}

impl ToCanonical for u64 {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::Number(i64::try_from(*self).unwrap_or(i64::MAX))
    }
}

impl<T: ToCanonical> ToCanonical for Option<T> {
    /// `None` and an absent key are the same thing everywhere in this
    /// codebase — there is no Rust `undefined` to disambiguate from
    /// `null`, so this is the one rule (Open Question i in SPEC_FULL.md).
    fn to_canonical(&self) -> CanonicalValue {
        match self {
            Some(v) => v.to_canonical(),
            None => CanonicalValue::Null,
        }
    }
}

impl<T: ToCanonical> ToCanonical for [T] {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::Array(self.iter().map(ToCanonical::to_canonical).collect())
    }
}

impl<T: ToCanonical> ToCanonical for Vec<T> {
    fn to_canonical(&self) -> CanonicalValue {
        self.as_slice().to_canonical()
    }
}

/// Converts an already-parsed, schema-agnostic JSON value (used only for
/// the explicitly free-form `metadata` fields several records carry).
///
/// Rejects non-finite numbers and non-integer numbers, since no field in
/// this substrate's schema ever needs one; rejects top-level or nested
/// values that are not plain JSON (arrays/objects/scalars) — which is
/// automatically true of anything that survived `serde_json` parsing, so
/// this impl mainly exists to enforce the integer-only number domain.
impl ToCanonical for Value {
    fn to_canonical(&self) -> CanonicalValue {
        json_value_to_canonical(self).unwrap_or(CanonicalValue::Null)
    }
}

/// Fallible counterpart of the blanket `Value` impl, for call sites that
/// need to report a normalization failure instead of silently nulling.
pub fn json_value_to_canonical(value: &Value) -> Result<CanonicalValue, NooterraError> {
    match value {
        Value::Null => Ok(CanonicalValue::Null),
        Value::Bool(b) => Ok(CanonicalValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(CanonicalValue::Number(i))
            } else if let Some(u) = n.as_u64() {
                Ok(CanonicalValue::Number(i64::try_from(u).map_err(|_| {
                    NooterraError::new(ErrorCode::NormalizeInvalid, "integer out of i64 range")
                })?))
            } else {
                Err(NooterraError::new(
                    ErrorCode::NormalizeInvalid,
                    "non-integer or non-finite number is not representable in canonical form",
                ))
            }
        }
        Value::String(s) => Ok(CanonicalValue::String(s.clone())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(json_value_to_canonical(item)?);
            }
            Ok(CanonicalValue::Array(out))
        }
        Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), json_value_to_canonical(v)?);
            }
            Ok(CanonicalValue::Object(out))
        }
    }
}

/// Encode any [`ToCanonical`] value to its canonical byte representation.
pub fn canonical_bytes<T: ToCanonical + ?Sized>(value: &T) -> Vec<u8> {
    value.to_canonical().encode()
}

#[cfg(test)]
mod tests {
    use super::{canonical_bytes, CanonicalValue};

    #[test]
    fn object_keys_are_sorted_regardless_of_insertion_order() {
        let a = CanonicalValue::object([
            ("zebra", CanonicalValue::Number(1)),
            ("alpha", CanonicalValue::Number(2)),
        ]);
        let b = CanonicalValue::object([
            ("alpha", CanonicalValue::Number(2)),
            ("zebra", CanonicalValue::Number(1)),
        ]);
        assert_eq!(a.encode(), b.encode());
        assert_eq!(
            String::from_utf8(a.encode()).unwrap(),
            r#"{"alpha":2,"zebra":1}"#
        );
    }

    #[test]
    fn strings_are_json_escaped() {
        let v = CanonicalValue::String("line\nbreak\t\"quote\"".to_string());
        assert_eq!(
            String::from_utf8(v.encode()).unwrap(),
            r#""line\nbreak\t\"quote\"""#
        );
    }

    #[test]
    fn arrays_preserve_order() {
        let v = CanonicalValue::array([
            CanonicalValue::Number(3),
            CanonicalValue::Number(1),
            CanonicalValue::Number(2),
        ]);
        assert_eq!(String::from_utf8(v.encode()).unwrap(), "[3,1,2]");
    }

    #[test]
    fn none_and_absent_key_are_identical() {
        let with_none: Option<i64> = None;
        assert_eq!(canonical_bytes(&with_none), b"null");
    }

    #[test]
    fn with_field_nulled_overwrites_only_that_key() {
        let obj = CanonicalValue::object([
            ("grantHash", CanonicalValue::String("abc".to_string())),
            ("tenantId", CanonicalValue::String("t1".to_string())),
        ]);
        let nulled = obj.with_field_nulled("grantHash");
        assert_eq!(
            String::from_utf8(nulled.encode()).unwrap(),
            r#"{"grantHash":null,"tenantId":"t1"}"#
        );
    }
}
