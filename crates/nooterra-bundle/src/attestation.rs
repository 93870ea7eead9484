//! `BundleHeadAttestation.v1` — a signed pointer at the last event of
//! each stream embedded in a bundle, binding them to the bundle's
//! `manifestHash`.

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use nooterra_crypto::{canonical::ToCanonical, derive_key_id, hash_canonical, sign_ed25519, verify_ed25519, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// The last known position of one embedded stream (e.g. a negotiation
/// transcript or inbox channel) at the time a bundle was sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHead {
    /// A free-form tag naming the stream (e.g. `"inbox:channel-1"`).
    pub stream: String,
    /// The last event/entry id observed in that stream.
    pub last_event_id: String,
    /// The stream's own hash-chain value at that position.
    pub chain_hash: String,
}

impl ToCanonical for StreamHead {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("stream", self.stream.to_canonical()),
            ("lastEventId", self.last_event_id.to_canonical()),
            ("chainHash", self.chain_hash.to_canonical()),
        ])
    }
}

/// A signed attestation of a bundle's manifest hash plus the head
/// position of each stream embedded in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHeadAttestation {
    /// The bundle's kind (mirrors [`crate::manifest::ProofBundleManifest::kind`]).
    pub kind: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The bundle's scope (mirrors the manifest's `scope`).
    pub scope: String,
    /// When this attestation was generated.
    pub generated_at: DateTime<Utc>,
    /// The `manifestHash` this attestation binds to.
    pub manifest_hash: String,
    /// The head position of each embedded stream.
    pub heads: Vec<StreamHead>,
    /// When this attestation was signed; equal to `generatedAt`.
    pub signed_at: DateTime<Utc>,
    /// `deriveKeyId(signerPublicKey)`.
    pub signer_key_id: String,
    /// Content hash (identity), computed with the raw signature bytes excluded.
    pub attestation_hash: String,
    /// Base64 Ed25519 signature over `attestationHash`.
    pub signature: String,
}

impl BundleHeadAttestation {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "BundleHeadAttestation.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", Self::SCHEMA_VERSION.to_canonical()),
            ("kind", self.kind.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("scope", self.scope.to_canonical()),
            ("generatedAt", canonical_timestamp(self.generated_at).to_canonical()),
            ("manifestHash", self.manifest_hash.to_canonical()),
            (
                "heads",
                CanonicalValue::array(self.heads.iter().map(ToCanonical::to_canonical)),
            ),
            ("signedAt", canonical_timestamp(self.signed_at).to_canonical()),
            ("signerKeyId", self.signer_key_id.to_canonical()),
            (
                "attestationHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `attestationHash` from the attestation's current fields
    /// (the raw `signature` bytes are not part of the hash domain).
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `attestationHash` matches the current fields,
    /// and that `signature` is a valid Ed25519 signature over it by
    /// `verifying_key`.
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.attestation_hash {
            return Err(NooterraError::new(
                ErrorCode::BundleManifestHashMismatch,
                "recomputed attestationHash does not match the declared value",
            )
            .with_context("expected", self.attestation_hash.clone())
            .with_context("computed", computed));
        }
        let expected_key_id = derive_key_id(verifying_key)?;
        if expected_key_id != self.signer_key_id {
            return Err(NooterraError::new(
                ErrorCode::KeyMismatch,
                "declared signerKeyId does not match the presented public key",
            )
            .with_context("declared", self.signer_key_id.clone())
            .with_context("computed", expected_key_id));
        }
        verify_ed25519(&self.attestation_hash, &self.signature, verifying_key)
    }

    /// Build, hash, and sign a head attestation over `manifest_hash` and
    /// `heads`.
    pub fn build(
        kind: impl Into<String>,
        tenant_id: impl Into<String>,
        scope: impl Into<String>,
        manifest_hash: impl Into<String>,
        heads: Vec<StreamHead>,
        generated_at: DateTime<Utc>,
        signing_key: &SigningKey,
    ) -> Result<Self, NooterraError> {
        let kind = bounded_identifier("kind", &kind.into(), MAX_ID_LEN)?;
        let tenant_id = bounded_identifier("tenantId", &tenant_id.into(), MAX_ID_LEN)?;
        let scope = bounded_identifier("scope", &scope.into(), MAX_ID_LEN)?;
        let signer_key_id = derive_key_id(&signing_key.verifying_key())?;

        let mut attestation = Self {
            kind,
            tenant_id,
            scope,
            generated_at,
            manifest_hash: manifest_hash.into(),
            heads,
            signed_at: generated_at,
            signer_key_id,
            attestation_hash: String::new(),
            signature: String::new(),
        };
        attestation.attestation_hash = attestation.compute_hash();
        attestation.signature = sign_ed25519(&attestation.attestation_hash, signing_key);
        Ok(attestation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn attestation_round_trips() {
        let key = SigningKey::generate(&mut OsRng);
        let heads = vec![StreamHead {
            stream: "inbox:channel-1".to_string(),
            last_event_id: "aimsg_abc_000000000001".to_string(),
            chain_hash: "f".repeat(64),
        }];
        let attestation = BundleHeadAttestation::build(
            "session",
            "tenant-1",
            "scope-1",
            "0".repeat(64),
            heads,
            dt("2025-01-01T00:00:00Z"),
            &key,
        )
        .unwrap();
        attestation.verify(&key.verifying_key()).unwrap();
    }

    #[test]
    fn attestation_rejects_wrong_key() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let attestation = BundleHeadAttestation::build(
            "session", "tenant-1", "scope-1", "0".repeat(64), vec![],
            dt("2025-01-01T00:00:00Z"), &key,
        )
        .unwrap();
        assert!(attestation.verify(&other.verifying_key()).is_err());
    }
}
