//! `IdentityLogProof.v1` — an inclusion proof binding one entry to a
//! checkpoint's root hash.

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::canonical_timestamp;
use serde::{Deserialize, Serialize};

use crate::checkpoint::IdentityLogCheckpoint;
use crate::entry::IdentityLogEntry;
use crate::merkle::{build_inclusion_proof, verify_inclusion_proof};

/// An inclusion proof for a single entry against a checkpoint's root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLogProof {
    /// Always `"IdentityLogProof.v1"`.
    pub schema: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The entry this proof is about.
    pub entry_id: String,
    /// The entry itself.
    pub entry: IdentityLogEntry,
    /// Number of entries the proof's Merkle tree was built over.
    pub tree_size: u64,
    /// The entry's position within the tree.
    pub leaf_index: u64,
    /// The entry's `entryHash` (repeated here for convenience).
    pub leaf_hash: String,
    /// Ordered sibling hashes, root-ward.
    pub siblings: Vec<String>,
    /// The recomputed Merkle root.
    pub root_hash: String,
    /// The checkpoint this proof was generated against.
    pub checkpoint: IdentityLogCheckpoint,
    /// When this proof was generated.
    pub generated_at: DateTime<Utc>,
    /// A caller-trusted checkpoint to additionally cross-check, if any.
    pub trusted_checkpoint: Option<IdentityLogCheckpoint>,
    /// Content hash (identity).
    pub proof_hash: String,
}

impl IdentityLogProof {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "IdentityLogProof.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", Self::SCHEMA_VERSION.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("entryId", self.entry_id.to_canonical()),
            ("entry", self.entry.to_canonical()),
            ("treeSize", (self.tree_size as i64).to_canonical()),
            ("leafIndex", (self.leaf_index as i64).to_canonical()),
            ("leafHash", self.leaf_hash.to_canonical()),
            (
                "siblings",
                CanonicalValue::array(self.siblings.iter().map(ToCanonical::to_canonical)),
            ),
            ("rootHash", self.root_hash.to_canonical()),
            ("checkpointHash", self.checkpoint.checkpoint_hash.to_canonical()),
            ("generatedAt", canonical_timestamp(self.generated_at).to_canonical()),
            (
                "trustedCheckpointHash",
                self.trusted_checkpoint
                    .as_ref()
                    .map_or(CanonicalValue::Null, |c| c.checkpoint_hash.to_canonical()),
            ),
            (
                "proofHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `proofHash` from the proof's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Build an inclusion proof for `entries[leaf_index]` against
    /// `checkpoint`, which must have been built over the same `entries`.
    #[tracing::instrument(skip(entries, checkpoint, trusted_checkpoint), fields(leaf_index))]
    pub fn build(
        entries: &[IdentityLogEntry],
        leaf_index: usize,
        checkpoint: &IdentityLogCheckpoint,
        trusted_checkpoint: Option<IdentityLogCheckpoint>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let entry = entries.get(leaf_index).ok_or_else(|| {
            NooterraError::new(ErrorCode::PayloadInvalid, "leafIndex is out of range for entries")
        })?;

        let leaves: Vec<String> = entries.iter().map(|e| e.entry_hash.clone()).collect();
        let siblings = build_inclusion_proof(&leaves, leaf_index);

        let mut proof = Self {
            schema: Self::SCHEMA_VERSION.to_string(),
            tenant_id: entry.tenant_id.clone(),
            entry_id: entry.entry_id.clone(),
            entry: entry.clone(),
            tree_size: entries.len() as u64,
            leaf_index: leaf_index as u64,
            leaf_hash: entry.entry_hash.clone(),
            siblings,
            root_hash: checkpoint.root_hash.clone(),
            checkpoint: checkpoint.clone(),
            generated_at,
            trusted_checkpoint,
            proof_hash: String::new(),
        };
        proof.proof_hash = proof.compute_hash();
        Ok(proof)
    }

    /// Verify this proof: the Merkle inclusion math, the cross-field
    /// equalities binding the entry/checkpoint/proof together, and (if
    /// present) the trusted-checkpoint equivocation/rollback checks.
    #[tracing::instrument(skip(self), fields(entry_id = %self.entry_id, tree_size = self.tree_size))]
    pub fn verify(&self) -> Result<(), NooterraError> {
        if self.entry_id != self.entry.entry_id {
            return Err(NooterraError::new(ErrorCode::ProofEntryMismatch, "entryId does not match entry.entryId"));
        }
        if self.leaf_index != self.entry.log_index {
            return Err(NooterraError::new(ErrorCode::ProofEntryMismatch, "leafIndex does not match entry.logIndex"));
        }
        if self.leaf_hash != self.entry.entry_hash {
            return Err(NooterraError::new(ErrorCode::ProofEntryMismatch, "leafHash does not match entry.entryHash"));
        }
        if self.tree_size != self.checkpoint.tree_size {
            return Err(NooterraError::new(ErrorCode::ProofEntryMismatch, "treeSize does not match checkpoint.treeSize"));
        }
        if self.root_hash != self.checkpoint.root_hash {
            return Err(NooterraError::new(ErrorCode::ProofEntryMismatch, "rootHash does not match checkpoint.rootHash"));
        }

        self.checkpoint.verify_hash()?;

        if !verify_inclusion_proof(
            &self.leaf_hash,
            self.leaf_index as usize,
            self.tree_size as usize,
            &self.siblings,
            &self.root_hash,
        ) {
            return Err(NooterraError::new(
                ErrorCode::ProofMerkleInvalid,
                "inclusion proof does not recompute to the declared rootHash",
            ));
        }

        if let Some(trusted) = &self.trusted_checkpoint {
            crate::checkpoint::check_for_equivocation(trusted, &self.checkpoint)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{validate_log, EntryEventType};

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn log_of_four() -> Vec<IdentityLogEntry> {
        let mut entries = Vec::new();
        let mut prev: Option<String> = None;
        for i in 0..4u64 {
            let e = IdentityLogEntry::build(
                format!("e{i}"),
                "tenant-1",
                "agent-1",
                EntryEventType::CapabilityClaimChange,
                i,
                prev.clone(),
                None,
                None,
                None,
                None,
                vec![format!("cap-{i}")],
                vec![format!("cap-{}", i + 1)],
                None,
                None,
                dt("2025-01-01T00:00:00Z"),
                dt("2025-01-01T00:00:00Z"),
                None,
            )
            .unwrap();
            prev = Some(e.entry_hash.clone());
            entries.push(e);
        }
        validate_log(&entries).unwrap()
    }

    #[test]
    fn proof_verifies_for_each_index() {
        let log = log_of_four();
        let checkpoint = IdentityLogCheckpoint::build("tenant-1", &log, dt("2025-01-02T00:00:00Z"));
        for i in 0..log.len() {
            let proof = IdentityLogProof::build(&log, i, &checkpoint, None, dt("2025-01-02T00:00:00Z")).unwrap();
            proof.verify().unwrap();
        }
    }

    #[test]
    fn tampered_sibling_fails_merkle_check() {
        let log = log_of_four();
        let checkpoint = IdentityLogCheckpoint::build("tenant-1", &log, dt("2025-01-02T00:00:00Z"));
        let mut proof = IdentityLogProof::build(&log, 1, &checkpoint, None, dt("2025-01-02T00:00:00Z")).unwrap();
        proof.siblings[0] = "0".repeat(64);
        let err = proof.verify().unwrap_err();
        assert_eq!(err.code, ErrorCode::ProofMerkleInvalid);
    }

    #[test]
    fn trusted_checkpoint_rollback_is_rejected() {
        let log = log_of_four();
        let small_checkpoint = IdentityLogCheckpoint::build("tenant-1", &log[..2], dt("2025-01-01T12:00:00Z"));
        let full_checkpoint = IdentityLogCheckpoint::build("tenant-1", &log, dt("2025-01-02T00:00:00Z"));
        // a trusted checkpoint from a *larger* tree than what's observed is a rollback.
        let proof = IdentityLogProof::build(
            &log[..2],
            0,
            &small_checkpoint,
            Some(full_checkpoint),
            dt("2025-01-01T12:00:00Z"),
        )
        .unwrap();
        let err = proof.verify().unwrap_err();
        assert_eq!(err.code, ErrorCode::CheckpointRollback);
    }
}
