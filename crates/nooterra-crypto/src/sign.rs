//! Ed25519 signing, verification, and key-id derivation.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use nooterra_error::{ErrorCode, NooterraError};
use pkcs8::EncodePublicKey;

use crate::hash::sha256_hex;

/// Algorithm tag every [`crate`] signature envelope declares.
pub const ALGORITHM_ED25519: &str = "ed25519";

/// Sign the UTF-8 bytes of a hex-encoded content hash with an Ed25519
/// private key, returning the raw 64-byte signature base64-encoded
/// (standard alphabet, with padding).
///
/// The signature covers `hashHex` itself (its ASCII bytes), not the
/// record body directly — callers always pass the output of
/// [`crate::hash::hash_canonical`].
#[must_use]
pub fn sign_ed25519(hash_hex: &str, signing_key: &SigningKey) -> String {
    let signature: Signature = signing_key.sign(hash_hex.as_bytes());
    STANDARD.encode(signature.to_bytes())
}

/// Verify a base64 Ed25519 signature over `hashHex` against a verifying key.
#[tracing::instrument(skip(signature_base64, verifying_key))]
pub fn verify_ed25519(
    hash_hex: &str,
    signature_base64: &str,
    verifying_key: &VerifyingKey,
) -> Result<(), NooterraError> {
    let sig_bytes = STANDARD.decode(signature_base64).map_err(|e| {
        NooterraError::new(ErrorCode::SignatureInvalid, "signature is not valid base64")
            .with_source(e)
    })?;
    let sig_array: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| {
        NooterraError::new(ErrorCode::SignatureInvalid, "signature is not 64 bytes")
    })?;
    let signature = Signature::from_bytes(&sig_array);
    let result = verifying_key.verify(hash_hex.as_bytes(), &signature).map_err(|e| {
        NooterraError::new(ErrorCode::SignatureInvalid, "ed25519 verification failed")
            .with_source(e)
    });
    if result.is_err() {
        tracing::debug!(target: "nooterra_crypto", "ed25519 signature verification failed");
    }
    result
}

/// Stable, collision-resistant key identifier for a public key: the
/// SHA-256 hex digest of its DER-encoded SubjectPublicKeyInfo bytes.
///
/// This is the reference `deriveKeyId` definition (SPEC_FULL.md §9, Open
/// Question ii) — every producer and verifier in this workspace calls
/// this one function rather than hashing the raw 32-byte point, so two
/// implementations encoding the same key through different SPKI
/// parameter conventions would disagree; pinning to DER SPKI avoids that.
pub fn derive_key_id(verifying_key: &VerifyingKey) -> Result<String, NooterraError> {
    let der = verifying_key.to_public_key_der().map_err(|e| {
        NooterraError::new(ErrorCode::KeyMismatch, "failed to DER-encode public key")
            .with_source(std::io::Error::other(e.to_string()))
    })?;
    Ok(sha256_hex(der.as_bytes()))
}
