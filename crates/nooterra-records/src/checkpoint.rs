//! `StateCheckpoint.v1` and its linear lineage: `LineageCompaction.v1` /
//! `LineageRestore.v1`.

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorAccumulator, ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, non_negative_integer};
use serde::{Deserialize, Serialize};

use crate::common::ArtifactRef;

const MAX_ID_LEN: usize = 128;

/// `StateCheckpoint.v1` — a content-addressed snapshot of session state,
/// optionally chained to a parent checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCheckpoint {
    /// Unique identifier for this checkpoint.
    pub checkpoint_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Session this checkpoint belongs to.
    pub session_id: String,
    /// Content-addressed reference to the full state snapshot.
    pub state_ref: ArtifactRef,
    /// Ordered references to the diffs since the parent checkpoint.
    pub diff_refs: Vec<ArtifactRef>,
    /// The checkpoint this one was derived from, if any.
    pub parent_checkpoint_id: Option<String>,
    /// Monotonic revision within the lineage; 0 at the root.
    pub revision: u32,
    /// When this checkpoint was recorded.
    pub created_at: DateTime<Utc>,
    /// Content hash (identity).
    pub checkpoint_hash: String,
}

impl StateCheckpoint {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "StateCheckpoint.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("checkpointId", self.checkpoint_id.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("sessionId", self.session_id.to_canonical()),
            ("stateRef", self.state_ref.to_canonical()),
            ("diffRefs", CanonicalValue::array(self.diff_refs.iter().map(ToCanonical::to_canonical))),
            ("parentCheckpointId", self.parent_checkpoint_id.to_canonical()),
            ("revision", i64::from(self.revision).to_canonical()),
            ("createdAt", canonical_timestamp(self.created_at).to_canonical()),
            (
                "checkpointHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `checkpointHash` from the record's current fields.
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

    /// Build a root checkpoint (`revision = 0`, no parent).
    pub fn build_root(
        checkpoint_id: impl Into<String>,
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
        state_ref: ArtifactRef,
        now: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        Self::build(checkpoint_id, tenant_id, session_id, state_ref, Vec::new(), None, 0, now)
    }

    /// Build a checkpoint chained onto `parent`, carrying `diff_refs`
    /// since the parent's state.
    pub fn build_child(
        checkpoint_id: impl Into<String>,
        parent: &StateCheckpoint,
        state_ref: ArtifactRef,
        diff_refs: Vec<ArtifactRef>,
        now: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        Self::build(
            checkpoint_id,
            parent.tenant_id.clone(),
            parent.session_id.clone(),
            state_ref,
            diff_refs,
            Some(parent.checkpoint_id.clone()),
            parent.revision + 1,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        checkpoint_id: impl Into<String>,
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
        state_ref: ArtifactRef,
        diff_refs: Vec<ArtifactRef>,
        parent_checkpoint_id: Option<String>,
        revision: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let mut acc = ErrorAccumulator::new();
        let checkpoint_id = acc
            .absorb(bounded_identifier("checkpointId", &checkpoint_id.into(), MAX_ID_LEN))
            .unwrap_or_default();
        let tenant_id = acc
            .absorb(bounded_identifier("tenantId", &tenant_id.into(), MAX_ID_LEN))
            .unwrap_or_default();
        let session_id = acc
            .absorb(bounded_identifier("sessionId", &session_id.into(), MAX_ID_LEN))
            .unwrap_or_default();
        acc.finish()?;

        let mut checkpoint = Self {
            checkpoint_id,
            tenant_id,
            session_id,
            state_ref,
            diff_refs,
            parent_checkpoint_id,
            revision,
            created_at: now,
            checkpoint_hash: String::new(),
        };
        checkpoint.checkpoint_hash = checkpoint.compute_hash();
        Ok(checkpoint)
    }
}

/// `LineageCompaction.v1` — a record of collapsing a run of checkpoints
/// `[from_checkpoint_id ..= to_checkpoint_id]` into a single compacted
/// state, used to bound lineage length without losing auditability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageCompaction {
    /// The checkpoint lineage being compacted.
    pub session_id: String,
    /// First checkpoint absorbed by the compaction.
    pub from_checkpoint_id: String,
    /// Last checkpoint absorbed by the compaction.
    pub to_checkpoint_id: String,
    /// The resulting, newly-rooted checkpoint replacing the absorbed run.
    pub compacted_checkpoint_id: String,
    /// Number of checkpoints absorbed; must be `>= 2`.
    pub absorbed_count: i64,
    /// When the compaction was performed.
    pub compacted_at: DateTime<Utc>,
}

impl ToCanonical for LineageCompaction {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("sessionId", self.session_id.to_canonical()),
            ("fromCheckpointId", self.from_checkpoint_id.to_canonical()),
            ("toCheckpointId", self.to_checkpoint_id.to_canonical()),
            ("compactedCheckpointId", self.compacted_checkpoint_id.to_canonical()),
            ("absorbedCount", self.absorbed_count.to_canonical()),
            ("compactedAt", canonical_timestamp(self.compacted_at).to_canonical()),
        ])
    }
}

impl LineageCompaction {
    /// Build a compaction record, requiring at least two absorbed checkpoints.
    pub fn build(
        session_id: impl Into<String>,
        from_checkpoint_id: impl Into<String>,
        to_checkpoint_id: impl Into<String>,
        compacted_checkpoint_id: impl Into<String>,
        absorbed_count: i64,
        compacted_at: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        if absorbed_count < 2 {
            return Err(NooterraError::new(
                ErrorCode::PayloadInvalid,
                "a compaction must absorb at least two checkpoints",
            )
            .with_context("field", "absorbedCount"));
        }
        Ok(Self {
            session_id: session_id.into(),
            from_checkpoint_id: from_checkpoint_id.into(),
            to_checkpoint_id: to_checkpoint_id.into(),
            compacted_checkpoint_id: compacted_checkpoint_id.into(),
            absorbed_count,
            compacted_at,
        })
    }
}

/// `LineageRestore.v1` — a record of rolling a session back to an earlier
/// checkpoint, discarding any checkpoints after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRestore {
    /// The session whose lineage is being restored.
    pub session_id: String,
    /// The checkpoint restored to.
    pub restored_checkpoint_id: String,
    /// The checkpoint that was current before the restore.
    pub discarded_from_checkpoint_id: String,
    /// When the restore was performed.
    pub restored_at: DateTime<Utc>,
}

impl ToCanonical for LineageRestore {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("sessionId", self.session_id.to_canonical()),
            ("restoredCheckpointId", self.restored_checkpoint_id.to_canonical()),
            ("discardedFromCheckpointId", self.discarded_from_checkpoint_id.to_canonical()),
            ("restoredAt", canonical_timestamp(self.restored_at).to_canonical()),
        ])
    }
}

/// Validate that `candidate_parent_id` is indeed the direct, linear
/// ancestor of `checkpoint` (no branching is permitted: each checkpoint
/// has at most one child it was actually extended by at append time).
pub fn validate_linear_parent(checkpoint: &StateCheckpoint, candidate_parent_id: &str) -> Result<(), NooterraError> {
    match &checkpoint.parent_checkpoint_id {
        Some(parent) if parent == candidate_parent_id => Ok(()),
        _ => Err(NooterraError::new(
            ErrorCode::PayloadInvalid,
            "checkpoint does not declare the expected parent",
        )
        .with_context("field", "parentCheckpointId")),
    }
}

/// Normalize a prospective revision counter read from an untyped source.
pub fn validate_revision(revision: i64) -> Result<i64, NooterraError> {
    non_negative_integer("revision", revision)
}
