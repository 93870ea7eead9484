//! Canonical encoding, SHA-256 content hashing, and Ed25519 signing
//! primitives shared by every signed record in the nooterra trust
//! substrate.
//!
//! This crate has no notion of *what* a record is — it only knows how to
//! turn a [`canonical::ToCanonical`] value into deterministic bytes, hash
//! those bytes, and sign/verify a hash. `nooterra-records` and its
//! siblings build record-specific hashing/signing on top of it.

#![deny(unsafe_code)]

pub mod canonical;
pub mod hash;
pub mod sign;
pub mod token;

pub use canonical::{canonical_bytes, json_value_to_canonical, CanonicalValue, ToCanonical};
pub use hash::{hash_canonical, hash_canonical_value, hash_pair_hex, sha256_hex, sha256_raw};
pub use sign::{derive_key_id, sign_ed25519, verify_ed25519, ALGORITHM_ED25519};
pub use token::{decode_token_bytes, encode_token};
