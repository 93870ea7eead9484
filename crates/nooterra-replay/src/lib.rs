//! `SessionReplayPack.v1` and `VerifiedInteractionGraphPack.v1`: hashed,
//! optionally-signed wrappers that bundle a session's (or a derived
//! interaction graph's) history into one content-addressed, auditable
//! container.
//!
//! Both follow the canonicalize/compute-hash/verify-hash split used
//! throughout the record family: a pack's own hash field is nulled while
//! computing the hash it identifies, and a signature (when present)
//! binds to that hash rather than the pack's raw bytes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp};
use nooterra_records::{ArtifactRef, SignatureEnvelope};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

fn chain_hash(hashes: &[String]) -> String {
    let mut acc: Option<String> = None;
    for h in hashes {
        acc = Some(match acc {
            None => h.clone(),
            Some(prev) => hash_canonical(&CanonicalValue::array([prev.to_canonical(), h.to_canonical()])),
        });
    }
    acc.unwrap_or_else(|| hash_canonical(&CanonicalValue::array(Vec::<CanonicalValue>::new())))
}

/// A content-addressed bundle of a session's event history, hash-chained
/// and optionally signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReplayPack {
    /// Owning tenant.
    pub tenant_id: String,
    /// The session this pack replays.
    pub session_id: String,
    /// The session's events, each bound to its payload by content hash.
    pub events: Vec<ArtifactRef>,
    /// Hash chain folding `events[i].artifactHash` left to right.
    pub event_chain_hash: String,
    /// Hash over `{tenantId, sessionId, events, eventChainHash}`, the
    /// deterministic core of the session independent of when the pack
    /// was generated.
    pub session_hash: String,
    /// Arbitrary caller-supplied verification metadata (e.g. which
    /// checks were run to produce this pack).
    pub verification_metadata: Option<serde_json::Value>,
    /// When this pack was generated.
    pub generated_at: DateTime<Utc>,
    /// An optional signature binding to `packHash`.
    pub signature: Option<SignatureEnvelope>,
    /// Content hash (identity), computed with `signature` excluded.
    pub pack_hash: String,
}

impl SessionReplayPack {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "SessionReplayPack.v1";

    fn session_hash_of(tenant_id: &str, session_id: &str, events: &[ArtifactRef], event_chain_hash: &str) -> String {
        let body = CanonicalValue::object([
            ("tenantId", tenant_id.to_canonical()),
            ("sessionId", session_id.to_canonical()),
            ("events", CanonicalValue::array(events.iter().map(ToCanonical::to_canonical))),
            ("eventChainHash", event_chain_hash.to_canonical()),
        ]);
        hash_canonical(&body)
    }

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", Self::SCHEMA_VERSION.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("sessionId", self.session_id.to_canonical()),
            ("events", CanonicalValue::array(self.events.iter().map(ToCanonical::to_canonical))),
            ("eventChainHash", self.event_chain_hash.to_canonical()),
            ("sessionHash", self.session_hash.to_canonical()),
            (
                "verificationMetadata",
                self.verification_metadata
                    .as_ref()
                    .map_or(CanonicalValue::Null, ToCanonical::to_canonical),
            ),
            ("generatedAt", canonical_timestamp(self.generated_at).to_canonical()),
            ("signature", CanonicalValue::Null),
            (
                "packHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `packHash` from the pack's current fields (`signature`
    /// is excluded from the hash domain).
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `packHash` matches the current fields.
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.pack_hash {
            return Err(NooterraError::new(
                ErrorCode::PayloadInvalid,
                "recomputed packHash does not match the declared value",
            )
            .with_context("expected", self.pack_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Build and hash a new replay pack over `events`, in order.
    #[tracing::instrument(skip(events, verification_metadata), fields(event_count = events.len()))]
    pub fn build(
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
        events: Vec<ArtifactRef>,
        verification_metadata: Option<serde_json::Value>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let tenant_id = bounded_identifier("tenantId", &tenant_id.into(), MAX_ID_LEN)?;
        let session_id = bounded_identifier("sessionId", &session_id.into(), MAX_ID_LEN)?;

        let hashes: Vec<String> = events.iter().map(|e| e.artifact_hash.clone()).collect();
        let event_chain_hash = chain_hash(&hashes);
        let session_hash = Self::session_hash_of(&tenant_id, &session_id, &events, &event_chain_hash);

        let mut pack = Self {
            tenant_id,
            session_id,
            events,
            event_chain_hash,
            session_hash,
            verification_metadata,
            generated_at,
            signature: None,
            pack_hash: String::new(),
        };
        pack.pack_hash = pack.compute_hash();
        Ok(pack)
    }

    /// Sign this pack's `packHash`, attaching the resulting envelope.
    pub fn sign(&mut self, signing_key: &SigningKey, signed_at: DateTime<Utc>) -> Result<(), NooterraError> {
        self.signature = Some(SignatureEnvelope::sign(&self.pack_hash, signing_key, signed_at)?);
        Ok(())
    }

    /// Verify the attached signature against `verifying_key`, checking
    /// both that it covers this pack's `packHash` and that the Ed25519
    /// signature itself is valid.
    pub fn verify_signature(&self, verifying_key: &VerifyingKey) -> Result<(), NooterraError> {
        let signature = self.signature.as_ref().ok_or_else(|| {
            NooterraError::new(ErrorCode::SignatureInvalid, "replay pack carries no signature to verify")
        })?;
        if signature.payload_hash != self.pack_hash {
            return Err(NooterraError::new(
                ErrorCode::SessionReplayPackSignaturePayloadHashMismatch,
                "signature payloadHash does not match packHash",
            )
            .with_context("packHash", self.pack_hash.clone())
            .with_context("payloadHash", signature.payload_hash.clone()));
        }
        signature.verify(verifying_key)
    }
}

/// A directed relationship discovered between two agents, with its
/// supporting evidence bound by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRelationship {
    /// The agent the relationship originates from.
    pub from_agent_id: String,
    /// The agent the relationship points to.
    pub to_agent_id: String,
    /// A free-form tag for the kind of relationship (e.g. `"delegates_to"`).
    pub relation_type: String,
    /// The evidence this relationship was derived from.
    pub evidence: ArtifactRef,
}

impl ToCanonical for InteractionRelationship {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("fromAgentId", self.from_agent_id.to_canonical()),
            ("toAgentId", self.to_agent_id.to_canonical()),
            ("relationType", self.relation_type.to_canonical()),
            ("evidence", self.evidence.to_canonical()),
        ])
    }
}

/// A content-addressed bundle of the interaction graph derived from a
/// tenant's sessions: the relationships found, plus a caller-supplied
/// summary, hashed and optionally signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedInteractionGraphPack {
    /// Owning tenant.
    pub tenant_id: String,
    /// Opaque identifier for this graph snapshot.
    pub graph_id: String,
    /// The relationships discovered.
    pub relationships: Vec<InteractionRelationship>,
    /// A caller-supplied summary (e.g. counts, notable findings).
    pub summary: serde_json::Value,
    /// When this graph snapshot was generated.
    pub generated_at: DateTime<Utc>,
    /// An optional signature binding to `graphHash`.
    pub signature: Option<SignatureEnvelope>,
    /// Content hash (identity), computed with `signature` excluded.
    pub graph_hash: String,
}

impl VerifiedInteractionGraphPack {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "VerifiedInteractionGraphPack.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", Self::SCHEMA_VERSION.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("graphId", self.graph_id.to_canonical()),
            (
                "relationships",
                CanonicalValue::array(self.relationships.iter().map(ToCanonical::to_canonical)),
            ),
            ("summary", self.summary.to_canonical()),
            ("generatedAt", canonical_timestamp(self.generated_at).to_canonical()),
            ("signature", CanonicalValue::Null),
            (
                "graphHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `graphHash` from the pack's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `graphHash` matches the current fields.
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.graph_hash {
            return Err(NooterraError::new(
                ErrorCode::GraphPackHashMismatch,
                "recomputed graphHash does not match the declared value",
            )
            .with_context("expected", self.graph_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Build and hash a new interaction graph pack.
    #[tracing::instrument(skip(relationships, summary), fields(relationship_count = relationships.len()))]
    pub fn build(
        tenant_id: impl Into<String>,
        graph_id: impl Into<String>,
        relationships: Vec<InteractionRelationship>,
        summary: serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let tenant_id = bounded_identifier("tenantId", &tenant_id.into(), MAX_ID_LEN)?;
        let graph_id = bounded_identifier("graphId", &graph_id.into(), MAX_ID_LEN)?;

        let mut pack = Self {
            tenant_id,
            graph_id,
            relationships,
            summary,
            generated_at,
            signature: None,
            graph_hash: String::new(),
        };
        pack.graph_hash = pack.compute_hash();
        Ok(pack)
    }

    /// Sign this pack's `graphHash`, attaching the resulting envelope.
    pub fn sign(&mut self, signing_key: &SigningKey, signed_at: DateTime<Utc>) -> Result<(), NooterraError> {
        self.signature = Some(SignatureEnvelope::sign(&self.graph_hash, signing_key, signed_at)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn artifact(id: &str, payload: &[u8]) -> ArtifactRef {
        ArtifactRef::from_payload(id, payload, None, None, None)
    }

    #[test]
    fn replay_pack_hash_is_reproducible() {
        let events = vec![artifact("e0", b"first"), artifact("e1", b"second")];
        let pack = SessionReplayPack::build("tenant-1", "session-1", events, None, dt("2025-01-01T00:00:00Z")).unwrap();
        pack.verify_hash().unwrap();
    }

    #[test]
    fn replay_pack_signature_binds_to_pack_hash() {
        let events = vec![artifact("e0", b"first")];
        let mut pack = SessionReplayPack::build("tenant-1", "session-1", events, None, dt("2025-01-01T00:00:00Z")).unwrap();
        let key = SigningKey::generate(&mut OsRng);
        pack.sign(&key, dt("2025-01-01T00:05:00Z")).unwrap();
        pack.verify_signature(&key.verifying_key()).unwrap();

        let other = SigningKey::generate(&mut OsRng);
        assert!(pack.verify_signature(&other.verifying_key()).is_err());
    }

    #[test]
    fn reordering_events_changes_the_chain_hash() {
        let a = artifact("e0", b"first");
        let b = artifact("e1", b"second");
        let forward = SessionReplayPack::build("t", "s", vec![a.clone(), b.clone()], None, dt("2025-01-01T00:00:00Z")).unwrap();
        let reversed = SessionReplayPack::build("t", "s", vec![b, a], None, dt("2025-01-01T00:00:00Z")).unwrap();
        assert_ne!(forward.event_chain_hash, reversed.event_chain_hash);
        assert_ne!(forward.pack_hash, reversed.pack_hash);
    }

    #[test]
    fn graph_pack_hash_is_reproducible() {
        let rel = InteractionRelationship {
            from_agent_id: "agent-a".to_string(),
            to_agent_id: "agent-b".to_string(),
            relation_type: "delegates_to".to_string(),
            evidence: artifact("ev-1", b"evidence"),
        };
        let pack = VerifiedInteractionGraphPack::build(
            "tenant-1",
            "graph-1",
            vec![rel],
            serde_json::json!({"relationshipCount": 1}),
            dt("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        pack.verify_hash().unwrap();
    }

    #[test]
    fn tampered_graph_pack_fails_verification() {
        let pack = VerifiedInteractionGraphPack::build(
            "tenant-1",
            "graph-1",
            vec![],
            serde_json::json!({}),
            dt("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        let mut tampered = pack.clone();
        tampered.summary = serde_json::json!({"tampered": true});
        assert!(tampered.verify_hash().is_err());
    }
}
