//! `IdentityLogCheckpoint.v1` — a signed-root summary of a tenant's
//! identity log at a point in time.

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::canonical_timestamp;
use serde::{Deserialize, Serialize};

use crate::entry::IdentityLogEntry;
use crate::merkle::build_merkle_root;

/// A Merkle-root summary of a tenant's identity log at `treeSize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLogCheckpoint {
    /// Always `"IdentityLogCheckpoint.v1"`.
    pub schema: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Number of entries the root was computed over.
    pub tree_size: u64,
    /// The Merkle root over `entryHash` values in `logIndex` order.
    pub root_hash: String,
    /// The `entryId` of the last entry (`logIndex == treeSize - 1`).
    pub head_entry_id: String,
    /// The `entryHash` of the last entry.
    pub head_entry_hash: String,
    /// When this checkpoint was generated.
    pub generated_at: DateTime<Utc>,
    /// Content hash (identity).
    pub checkpoint_hash: String,
}

impl IdentityLogCheckpoint {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "IdentityLogCheckpoint.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", Self::SCHEMA_VERSION.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("treeSize", (self.tree_size as i64).to_canonical()),
            ("rootHash", self.root_hash.to_canonical()),
            ("headEntryId", self.head_entry_id.to_canonical()),
            ("headEntryHash", self.head_entry_hash.to_canonical()),
            ("generatedAt", canonical_timestamp(self.generated_at).to_canonical()),
            (
                "checkpointHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `checkpointHash` from the checkpoint's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `checkpointHash` matches the current fields.
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.checkpoint_hash {
            return Err(NooterraError::new(
                ErrorCode::CheckpointHashMismatch,
                "recomputed checkpointHash does not match the declared value",
            )
            .with_context("expected", self.checkpoint_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Build a checkpoint over `entries`, which must already be a
    /// validated, sorted log (see [`crate::entry::validate_log`]).
    ///
    /// # Panics
    ///
    /// Panics if `entries` is empty; a checkpoint always summarizes at
    /// least one entry.
    #[tracing::instrument(skip(entries), fields(tree_size = entries.len()))]
    pub fn build(
        tenant_id: impl Into<String>,
        entries: &[IdentityLogEntry],
        generated_at: DateTime<Utc>,
    ) -> Self {
        assert!(!entries.is_empty(), "cannot checkpoint an empty log");
        let leaves: Vec<String> = entries.iter().map(|e| e.entry_hash.clone()).collect();
        let root_hash = build_merkle_root(&leaves);
        let head = entries.last().expect("non-empty entries");

        let mut checkpoint = Self {
            schema: Self::SCHEMA_VERSION.to_string(),
            tenant_id: tenant_id.into(),
            tree_size: entries.len() as u64,
            root_hash,
            head_entry_id: head.entry_id.clone(),
            head_entry_hash: head.entry_hash.clone(),
            generated_at,
            checkpoint_hash: String::new(),
        };
        checkpoint.checkpoint_hash = checkpoint.compute_hash();
        checkpoint
    }
}

/// Cross-check a caller-trusted checkpoint against one freshly observed
/// from the log, guarding against two failure modes: equivocation (the
/// log signed two different roots for the same `treeSize`) and rollback
/// (the trusted checkpoint is for a larger tree than the one observed).
///
/// Bookkeeping of which `(tenantId, treeSize)` pairs have been seen
/// before is left to the caller; this only compares the two checkpoints
/// handed to it.
pub fn check_for_equivocation(
    trusted: &IdentityLogCheckpoint,
    observed: &IdentityLogCheckpoint,
) -> Result<(), NooterraError> {
    if trusted.tenant_id != observed.tenant_id {
        return Err(NooterraError::new(
            ErrorCode::PayloadInvalid,
            "trusted and observed checkpoints belong to different tenants",
        ));
    }

    if trusted.tree_size == observed.tree_size && trusted.checkpoint_hash != observed.checkpoint_hash {
        return Err(NooterraError::new(
            ErrorCode::Equivocation,
            "two different checkpoints were observed for the same treeSize",
        )
        .with_context("treeSize", trusted.tree_size.to_string()));
    }

    if trusted.tree_size > observed.tree_size {
        return Err(NooterraError::new(
            ErrorCode::CheckpointRollback,
            "trusted checkpoint is ahead of the observed checkpoint",
        )
        .with_context("trustedTreeSize", trusted.tree_size.to_string())
        .with_context("observedTreeSize", observed.tree_size.to_string()));
    }

    Ok(())
}
