//! SHA-256 content hashing over the canonical byte encoding.

use sha2::{Digest, Sha256};

use crate::canonical::{CanonicalValue, ToCanonical};

/// Lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Raw 32-byte SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_raw(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// `sha256Hex(canonical(value))` — the one hashing path every record
/// builder and verifier goes through.
#[must_use]
pub fn hash_canonical<T: ToCanonical + ?Sized>(value: &T) -> String {
    sha256_hex(&value.to_canonical().encode())
}

/// Hash a [`CanonicalValue`] directly, for call sites that already built
/// the nulled-hash-field body via [`CanonicalValue::with_field_nulled`].
#[must_use]
pub fn hash_canonical_value(value: &CanonicalValue) -> String {
    sha256_hex(&value.encode())
}

/// `sha256(left || right)` over the raw bytes of two hex-decoded hashes,
/// the internal-node construction used by the identity transparency log's
/// Merkle tree. Returns the result as lowercase hex.
///
/// # Panics
/// Panics if `left` or `right` is not valid hex — both are expected to be
/// the output of [`sha256_hex`] or a prior call to this function.
#[must_use]
pub fn hash_pair_hex(left: &str, right: &str) -> String {
    let l = hex::decode(left).expect("left operand must be valid hex");
    let r = hex::decode(right).expect("right operand must be valid hex");
    let mut hasher = Sha256::new();
    hasher.update(&l);
    hasher.update(&r);
    hex::encode(hasher.finalize())
}
