//! Field normalizers shared by every record schema.
//!
//! Normalize-before-hash is a global invariant of this substrate: every
//! schema builds its normalized form by calling these functions, then
//! canonicalizes, then hashes. Each normalizer either returns the
//! normalized value or fails with a [`NooterraError`] whose code
//! identifies the rule that was violated; none of them short-circuit a
//! caller's own multi-field validation pass — record builders call these
//! one field at a time and collect failures themselves via
//! `nooterra_error::ErrorAccumulator`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, SecondsFormat, Utc};
use nooterra_error::{ErrorCode, NooterraError};
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_.\-/]+$").expect("valid regex"));
static HEX_SHA256_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").expect("valid regex"));
static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{2,11}$").expect("valid regex"));

const DEFAULT_CURRENCY: &str = "USD";

fn invalid(code: ErrorCode, field: &str, detail: impl Into<String>) -> NooterraError {
    NooterraError::new(code, detail).with_context("field", field)
}

/// Non-empty string, trimmed, bounded to `max_len` Unicode scalar values.
pub fn non_empty_string(field: &str, raw: &str, max_len: usize) -> Result<String, NooterraError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(ErrorCode::NormalizeInvalid, field, "must not be empty"));
    }
    if trimmed.chars().count() > max_len {
        return Err(invalid(
            ErrorCode::NormalizeInvalid,
            field,
            format!("exceeds maximum length of {max_len}"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Identifier matching `^[A-Za-z0-9:_.\-/]+$`, bounded to `max_len`.
pub fn bounded_identifier(field: &str, raw: &str, max_len: usize) -> Result<String, NooterraError> {
    if raw.is_empty() || raw.chars().count() > max_len {
        return Err(invalid(
            ErrorCode::NormalizeInvalid,
            field,
            format!("must be 1..={max_len} characters"),
        ));
    }
    if !IDENTIFIER_RE.is_match(raw) {
        return Err(invalid(
            ErrorCode::NormalizeInvalid,
            field,
            "must match ^[A-Za-z0-9:_.-/]+$",
        ));
    }
    Ok(raw.to_string())
}

/// Parse an ISO-8601 date-time and re-serialize it to the platform's
/// canonical form (RFC 3339, millisecond precision, `Z` suffix).
pub fn iso_datetime(field: &str, raw: &str) -> Result<DateTime<Utc>, NooterraError> {
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
        invalid(ErrorCode::NormalizeInvalid, field, "must be an ISO-8601 date-time").with_source(e)
    })?;
    Ok(parsed.with_timezone(&Utc))
}

/// Re-serialize a parsed timestamp to the one canonical ISO string format
/// every producer and verifier in this workspace emits.
#[must_use]
pub fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Lowercased, regex-validated hex-SHA-256 string.
pub fn hex_sha256(field: &str, raw: &str) -> Result<String, NooterraError> {
    if !HEX_SHA256_RE.is_match(raw) {
        return Err(invalid(
            ErrorCode::NormalizeInvalid,
            field,
            "must be a 64-character hex string",
        ));
    }
    Ok(raw.to_ascii_lowercase())
}

/// Currency code matching `^[A-Z][A-Z0-9_]{2,11}$`; empty input normalizes
/// to the default `USD`.
pub fn currency(field: &str, raw: &str) -> Result<String, NooterraError> {
    let value = if raw.is_empty() { DEFAULT_CURRENCY } else { raw };
    if !CURRENCY_RE.is_match(value) {
        return Err(invalid(
            ErrorCode::NormalizeInvalid,
            field,
            "must match ^[A-Z][A-Z0-9_]{2,11}$",
        ));
    }
    Ok(value.to_string())
}

/// Positive (`> 0`) safe integer (fits in `i64` without precision loss).
pub fn positive_integer(field: &str, raw: i64) -> Result<i64, NooterraError> {
    if raw <= 0 {
        return Err(invalid(ErrorCode::NormalizeInvalid, field, "must be greater than zero"));
    }
    Ok(raw)
}

/// Non-negative (`>= 0`) safe integer.
pub fn non_negative_integer(field: &str, raw: i64) -> Result<i64, NooterraError> {
    if raw < 0 {
        return Err(invalid(ErrorCode::NormalizeInvalid, field, "must not be negative"));
    }
    Ok(raw)
}

/// Checks that a parsed [`serde_json::Value`] is a "plain object": an
/// object (map) or one of the JSON scalar types, never a bare array where
/// an object was expected.
pub fn plain_object(field: &str, value: &serde_json::Value) -> Result<(), NooterraError> {
    if matches!(value, serde_json::Value::Array(_)) {
        return Err(invalid(
            ErrorCode::NotPlainObject,
            field,
            "expected an object, found an array",
        ));
    }
    Ok(())
}

/// Validate `raw` against a closed set of allowed string values.
pub fn closed_enum<'a>(
    field: &str,
    raw: &str,
    allowed: &'a [&'a str],
) -> Result<&'a str, NooterraError> {
    allowed.iter().copied().find(|a| *a == raw).ok_or_else(|| {
        invalid(
            ErrorCode::NormalizeInvalid,
            field,
            format!("must be one of {allowed:?}"),
        )
    })
}

/// Deduplicate and code-point sort a list of strings, the ordering rule
/// every sequence field (allowlists, reason codes, capability tags) in
/// this substrate must follow.
#[must_use]
pub fn dedup_sorted(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = items.to_vec();
    out.sort();
    out.dedup();
    out
}

/// Like [`dedup_sorted`] but fails if the result is empty, for fields the
/// schema declares as non-empty (e.g. `scope.allowedRiskClasses`).
pub fn dedup_sorted_non_empty(field: &str, items: &[String]) -> Result<Vec<String>, NooterraError> {
    let out = dedup_sorted(items);
    if out.is_empty() {
        return Err(invalid(ErrorCode::NormalizeInvalid, field, "must not be empty"));
    }
    Ok(out)
}
