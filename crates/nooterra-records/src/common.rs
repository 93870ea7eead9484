//! Primitives shared by every record in the signed-record family:
//! artifact references, the signature envelope, and the risk-class
//! enumeration used throughout authority scoping.

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use nooterra_crypto::{
    canonical::ToCanonical, derive_key_id, hash_canonical, sha256_hex, sign_ed25519,
    verify_ed25519, CanonicalValue, ALGORITHM_ED25519,
};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::{canonical_timestamp, hex_sha256};
use serde::{Deserialize, Serialize};

/// A risk class an authority grant's scope may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Read-only access to data.
    Read,
    /// CPU/inference work with no external side effects.
    Compute,
    /// An action with external side effects (e.g. sending an email).
    Action,
    /// A financial transaction.
    Financial,
}

impl RiskClass {
    /// All variants, in the code-point-sorted order their serialized
    /// names would land in (used by tests and by callers building a
    /// closed-set allowlist).
    pub const ALL: [RiskClass; 4] = [
        RiskClass::Action,
        RiskClass::Compute,
        RiskClass::Financial,
        RiskClass::Read,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Compute => "compute",
            Self::Action => "action",
            Self::Financial => "financial",
        }
    }
}

impl ToCanonical for RiskClass {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// Content-addressed handle to an external payload.
///
/// Binding property: `hash_artifact_payload(payload) == artifact_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Always `"ArtifactRef.v1"`.
    pub schema_version: String,
    /// Opaque identifier for the artifact within its tenant.
    pub artifact_id: String,
    /// Hex-SHA-256 of the artifact's bytes.
    pub artifact_hash: String,
    /// Free-form artifact-type tag (e.g. `"diff"`, `"log"`).
    pub artifact_type: Option<String>,
    /// Owning tenant, if scoped.
    pub tenant_id: Option<String>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
}

impl ArtifactRef {
    /// Schema version tag for this record shape.
    pub const SCHEMA_VERSION: &'static str = "ArtifactRef.v1";

    /// Build an `ArtifactRef.v1` by hashing `payload` directly, so the
    /// binding property holds by construction.
    pub fn from_payload(
        artifact_id: impl Into<String>,
        payload: &[u8],
        artifact_type: Option<String>,
        tenant_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION.to_string(),
            artifact_id: artifact_id.into(),
            artifact_hash: hash_artifact_payload(payload),
            artifact_type,
            tenant_id,
            metadata,
        }
    }

    /// Verify the binding property against a candidate payload.
    pub fn verify_payload(&self, payload: &[u8]) -> Result<(), NooterraError> {
        let computed = hash_artifact_payload(payload);
        if computed != self.artifact_hash {
            return Err(NooterraError::new(
                ErrorCode::ArtifactHashMismatch,
                "payload does not hash to the declared artifactHash",
            )
            .with_context("expected", self.artifact_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }
}

impl ToCanonical for ArtifactRef {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", self.schema_version.to_canonical()),
            ("artifactId", self.artifact_id.to_canonical()),
            ("artifactHash", self.artifact_hash.to_canonical()),
            ("artifactType", self.artifact_type.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            (
                "metadata",
                self.metadata
                    .as_ref()
                    .map(ToCanonical::to_canonical)
                    .unwrap_or(CanonicalValue::Null),
            ),
        ])
    }
}

/// `sha256Hex(payload)` — the artifact-reference binding function.
#[must_use]
pub fn hash_artifact_payload(payload: &[u8]) -> String {
    sha256_hex(payload)
}

/// `{algorithm:"ed25519", keyId, signedAt, payloadHash, signatureBase64}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    /// Always `"ed25519"`.
    pub algorithm: String,
    /// `deriveKeyId(signerPublicKey)`.
    pub key_id: String,
    /// When the signature was produced.
    pub signed_at: String,
    /// Hex-SHA-256 of the record body the signature covers.
    pub payload_hash: String,
    /// Base64-encoded raw 64-byte Ed25519 signature.
    pub signature_base64: String,
}

impl ToCanonical for SignatureEnvelope {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("algorithm", self.algorithm.to_canonical()),
            ("keyId", self.key_id.to_canonical()),
            ("signedAt", self.signed_at.to_canonical()),
            ("payloadHash", self.payload_hash.to_canonical()),
            ("signatureBase64", self.signature_base64.to_canonical()),
        ])
    }
}

impl SignatureEnvelope {
    /// Produce a signature envelope over `payload_hash` with `signing_key`,
    /// stamping `signed_at` as the current instant.
    pub fn sign(
        payload_hash: &str,
        signing_key: &SigningKey,
        signed_at: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let key_id = derive_key_id(&signing_key.verifying_key())?;
        Ok(Self {
            algorithm: ALGORITHM_ED25519.to_string(),
            key_id,
            signed_at: canonical_timestamp(signed_at),
            payload_hash: payload_hash.to_string(),
            signature_base64: sign_ed25519(payload_hash, signing_key),
        })
    }

    /// Verify this envelope against a presented public key: recomputes
    /// the key id from `verifying_key` and compares it to the declared
    /// `keyId`, then verifies the Ed25519 signature over `payloadHash`.
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<(), NooterraError> {
        if self.algorithm != ALGORITHM_ED25519 {
            return Err(NooterraError::new(ErrorCode::AlgInvalid, "unsupported signature algorithm")
                .with_context("algorithm", self.algorithm.clone()));
        }
        let expected_key_id = derive_key_id(verifying_key)?;
        if expected_key_id != self.key_id {
            return Err(NooterraError::new(
                ErrorCode::KeyMismatch,
                "declared keyId does not match the presented public key",
            )
            .with_context("declared", self.key_id.clone())
            .with_context("computed", expected_key_id));
        }
        verify_ed25519(&self.payload_hash, &self.signature_base64, verifying_key)
    }
}

/// Validate a hex-SHA-256 payload hash field, wrapping
/// [`nooterra_normalize::hex_sha256`] with the record-hash error code
/// rather than the generic normalize code, since a malformed hash here
/// always means tampering, not a shape mistake by a well-behaved client.
pub(crate) fn require_hex_sha256(field: &str, raw: &str) -> Result<String, NooterraError> {
    hex_sha256(field, raw)
}

/// Compute `sha256Hex(canonical(body))` for a record whose canonical
/// body is `body` with its own hash field already nulled.
#[must_use]
pub fn compute_record_hash(body: &CanonicalValue) -> String {
    hash_canonical(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn artifact_ref_binds_to_its_payload() {
        let artifact = ArtifactRef::from_payload("art-1", b"hello world", None, None, None);
        artifact.verify_payload(b"hello world").unwrap();
        assert!(artifact.verify_payload(b"tampered").is_err());
    }

    #[test]
    fn signature_envelope_round_trips() {
        let key = SigningKey::generate(&mut OsRng);
        let payload_hash = sha256_hex(b"some record body");
        let envelope = SignatureEnvelope::sign(&payload_hash, &key, Utc::now()).unwrap();
        envelope.verify(&key.verifying_key()).unwrap();
    }

    #[test]
    fn signature_envelope_rejects_wrong_key() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let payload_hash = sha256_hex(b"some record body");
        let envelope = SignatureEnvelope::sign(&payload_hash, &key, Utc::now()).unwrap();
        assert!(envelope.verify(&other.verifying_key()).is_err());
    }
}
