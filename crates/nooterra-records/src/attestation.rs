//! `CapabilityAttestation.v1`: a signed claim that an agent holds some
//! capability, at a self-claimed, attested, or certified level of trust.

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorAccumulator, ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, non_negative_integer};
use serde::{Deserialize, Serialize};

use crate::common::SignatureEnvelope;
use crate::grant::Validity;

const MAX_ID_LEN: usize = 128;

/// Degree of trust behind a capability claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationLevel {
    /// The subject asserts this capability itself, unverified.
    SelfClaim,
    /// A third party attested to this capability.
    Attested,
    /// A certification authority certified this capability.
    Certified,
}

impl AttestationLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SelfClaim => "self_claim",
            Self::Attested => "attested",
            Self::Certified => "certified",
        }
    }
}

impl ToCanonical for AttestationLevel {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// The revocation sub-block for an attestation (mirrors [`crate::grant::Revocation`]
/// but without a `revocable` flag — an attestation is always revocable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttestationRevocation {
    /// When the attestation was revoked, if it has been.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Why the attestation was revoked.
    pub reason_code: Option<String>,
}

impl ToCanonical for AttestationRevocation {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("revokedAt", self.revoked_at.map(canonical_timestamp).to_canonical()),
            ("reasonCode", self.reason_code.to_canonical()),
        ])
    }
}

/// `CapabilityAttestation.v1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityAttestation {
    /// Unique identifier for this attestation.
    pub attestation_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The agent this attestation is about.
    pub subject_agent_id: String,
    /// The capability being claimed.
    pub capability: String,
    /// The trust level behind the claim.
    pub level: AttestationLevel,
    /// The agent issuing the attestation, if not a self-claim.
    pub issuer_agent_id: Option<String>,
    /// Validity window.
    pub validity: Validity,
    /// Signature covering the pre-bookkeeping signing payload.
    pub signature: SignatureEnvelope,
    /// Free-form description of how this was verified.
    pub verification_method: Option<String>,
    /// Supporting evidence references (artifact ids, urls, hashes).
    pub evidence_refs: Vec<String>,
    /// Revocation state.
    pub revocation: AttestationRevocation,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
    /// When the attestation was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the attestation was last mutated (e.g. revoked).
    pub updated_at: DateTime<Utc>,
    /// Monotonic revision counter, bumped on every mutation.
    pub revision: u32,
    /// Content hash over the whole record (identity).
    pub attestation_hash: String,
}

impl CapabilityAttestation {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "CapabilityAttestation.v1";

    /// The subset of fields the client signs *before* server bookkeeping
    /// (`attestationHash`, `createdAt`, `updatedAt`, `revision`) is known.
    fn signing_body(
        attestation_id: &str,
        tenant_id: &str,
        subject_agent_id: &str,
        capability: &str,
        level: AttestationLevel,
        issuer_agent_id: Option<&str>,
        validity: &Validity,
        verification_method: Option<&str>,
        evidence_refs: &[String],
        revocation: &AttestationRevocation,
        metadata: Option<&serde_json::Value>,
    ) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("attestationId", attestation_id.to_canonical()),
            ("tenantId", tenant_id.to_canonical()),
            ("subjectAgentId", subject_agent_id.to_canonical()),
            ("capability", capability.to_canonical()),
            ("level", level.to_canonical()),
            ("issuerAgentId", issuer_agent_id.map(str::to_string).to_canonical()),
            ("validity", validity.to_canonical()),
            ("verificationMethod", verification_method.map(str::to_string).to_canonical()),
            ("evidenceRefs", evidence_refs.to_vec().to_canonical()),
            ("revocation", revocation.to_canonical()),
            ("metadata", metadata.cloned().to_canonical()),
        ])
    }

    /// Compute the signature payload hash for a not-yet-built attestation.
    #[must_use]
    pub fn compute_signing_payload_hash(
        attestation_id: &str,
        tenant_id: &str,
        subject_agent_id: &str,
        capability: &str,
        level: AttestationLevel,
        issuer_agent_id: Option<&str>,
        validity: &Validity,
        verification_method: Option<&str>,
        evidence_refs: &[String],
        revocation: &AttestationRevocation,
        metadata: Option<&serde_json::Value>,
    ) -> String {
        hash_canonical(&Self::signing_body(
            attestation_id,
            tenant_id,
            subject_agent_id,
            capability,
            level,
            issuer_agent_id,
            validity,
            verification_method,
            evidence_refs,
            revocation,
            metadata,
        ))
    }

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("attestationId", self.attestation_id.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("subjectAgentId", self.subject_agent_id.to_canonical()),
            ("capability", self.capability.to_canonical()),
            ("level", self.level.to_canonical()),
            ("issuerAgentId", self.issuer_agent_id.to_canonical()),
            ("validity", self.validity.to_canonical()),
            ("signature", self.signature.to_canonical()),
            ("verificationMethod", self.verification_method.to_canonical()),
            ("evidenceRefs", self.evidence_refs.to_canonical()),
            ("revocation", self.revocation.to_canonical()),
            ("metadata", self.metadata.to_canonical()),
            ("createdAt", canonical_timestamp(self.created_at).to_canonical()),
            ("updatedAt", canonical_timestamp(self.updated_at).to_canonical()),
            ("revision", i64::from(self.revision).to_canonical()),
            (
                "attestationHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `attestationHash` from the record's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `attestationHash` and the signature over the
    /// declared `signature.payloadHash`, and that the declared payload
    /// hash still matches what the pre-bookkeeping fields recompute to.
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<(), NooterraError> {
        let expected_payload_hash = Self::compute_signing_payload_hash(
            &self.attestation_id,
            &self.tenant_id,
            &self.subject_agent_id,
            &self.capability,
            self.level,
            self.issuer_agent_id.as_deref(),
            &self.validity,
            self.verification_method.as_deref(),
            &self.evidence_refs,
            &self.revocation,
            self.metadata.as_ref(),
        );
        if expected_payload_hash != self.signature.payload_hash {
            return Err(NooterraError::new(
                ErrorCode::AttestationHashMismatch,
                "signature payload hash does not match the recomputed pre-bookkeeping body",
            ));
        }
        self.signature.verify(verifying_key)?;

        let computed = self.compute_hash();
        if computed != self.attestation_hash {
            return Err(NooterraError::new(
                ErrorCode::AttestationHashMismatch,
                "recomputed attestationHash does not match the declared value",
            )
            .with_context("expected", self.attestation_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Build a freshly signed attestation at revision 0.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(signing_key, metadata, evidence_refs))]
    pub fn build_and_sign(
        attestation_id: impl Into<String>,
        tenant_id: impl Into<String>,
        subject_agent_id: impl Into<String>,
        capability: impl Into<String>,
        level: AttestationLevel,
        issuer_agent_id: Option<String>,
        validity: Validity,
        verification_method: Option<String>,
        evidence_refs: Vec<String>,
        metadata: Option<serde_json::Value>,
        signing_key: &SigningKey,
        now: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let mut acc = ErrorAccumulator::new();
        let attestation_id = acc
            .absorb(bounded_identifier("attestationId", &attestation_id.into(), MAX_ID_LEN))
            .unwrap_or_default();
        let tenant_id = acc
            .absorb(bounded_identifier("tenantId", &tenant_id.into(), MAX_ID_LEN))
            .unwrap_or_default();
        let subject_agent_id = acc
            .absorb(bounded_identifier("subjectAgentId", &subject_agent_id.into(), MAX_ID_LEN))
            .unwrap_or_default();
        acc.finish()?;

        let capability = capability.into();
        let revocation = AttestationRevocation::default();
        let payload_hash = Self::compute_signing_payload_hash(
            &attestation_id,
            &tenant_id,
            &subject_agent_id,
            &capability,
            level,
            issuer_agent_id.as_deref(),
            &validity,
            verification_method.as_deref(),
            &evidence_refs,
            &revocation,
            metadata.as_ref(),
        );
        let signature = SignatureEnvelope::sign(&payload_hash, signing_key, now)?;

        let mut attestation = Self {
            attestation_id,
            tenant_id,
            subject_agent_id,
            capability,
            level,
            issuer_agent_id,
            validity,
            signature,
            verification_method,
            evidence_refs,
            revocation,
            metadata,
            created_at: now,
            updated_at: now,
            revision: 0,
            attestation_hash: String::new(),
        };
        attestation.attestation_hash = attestation.compute_hash();
        Ok(attestation)
    }

    /// Produce a new attestation with only the `revocation` block replaced
    /// (and bookkeeping bumped): `updatedAt`, `revision`, and `attestationHash`.
    /// The original signature is preserved untouched, since it covers the
    /// pre-bookkeeping body, which revocation does not change.
    #[must_use]
    #[tracing::instrument(skip(self, reason_code), fields(attestation_id = %self.attestation_id))]
    pub fn revoke(&self, revoked_at: DateTime<Utc>, reason_code: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.revocation.revoked_at = Some(revoked_at);
        next.revocation.reason_code = Some(reason_code.into());
        next.updated_at = now;
        next.revision += 1;
        next.attestation_hash = next.compute_hash();
        tracing::debug!(target: "nooterra_records", attestation_id = %self.attestation_id, revision = next.revision, "capability attestation revoked");
        next
    }

    /// Convenience wrapper around [`nooterra_normalize::non_negative_integer`]
    /// for revision fields deserialized from an untyped source.
    pub fn validate_revision(revision: i64) -> Result<i64, NooterraError> {
        non_negative_integer("revision", revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sample_validity() -> Validity {
        Validity {
            issued_at: dt("2025-01-01T00:00:00Z"),
            not_before: dt("2025-01-01T00:00:00Z"),
            expires_at: dt("2026-01-01T00:00:00Z"),
        }
    }

    #[test]
    fn build_and_verify_round_trips() {
        let key = SigningKey::generate(&mut OsRng);
        let attestation = CapabilityAttestation::build_and_sign(
            "attest-1",
            "tenant-1",
            "agent-1",
            "code-review",
            AttestationLevel::SelfClaim,
            None,
            sample_validity(),
            None,
            vec![],
            None,
            &key,
            dt("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        attestation.verify(&key.verifying_key()).unwrap();
        assert_eq!(attestation.revision, 0);
    }

    #[test]
    fn revoke_preserves_signature_but_changes_hash() {
        let key = SigningKey::generate(&mut OsRng);
        let attestation = CapabilityAttestation::build_and_sign(
            "attest-1",
            "tenant-1",
            "agent-1",
            "code-review",
            AttestationLevel::SelfClaim,
            None,
            sample_validity(),
            None,
            vec![],
            None,
            &key,
            dt("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        let revoked = attestation.revoke(dt("2025-06-01T00:00:00Z"), "ADMIN_REQUEST", dt("2025-06-01T00:00:00Z"));
        assert_ne!(revoked.attestation_hash, attestation.attestation_hash);
        assert_eq!(revoked.revision, 1);
        revoked.verify(&key.verifying_key()).unwrap();
    }

    #[test]
    fn tampering_capability_breaks_verification() {
        let key = SigningKey::generate(&mut OsRng);
        let mut attestation = CapabilityAttestation::build_and_sign(
            "attest-1",
            "tenant-1",
            "agent-1",
            "code-review",
            AttestationLevel::SelfClaim,
            None,
            sample_validity(),
            None,
            vec![],
            None,
            &key,
            dt("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        attestation.capability = "deploy-prod".to_string();
        assert!(attestation.verify(&key.verifying_key()).is_err());
    }
}
