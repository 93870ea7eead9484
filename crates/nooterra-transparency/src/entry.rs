//! `IdentityLogEntry.v1` and the append-only sequencing rules that bind a
//! run of entries into a valid log.

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorAccumulator, ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, closed_enum, dedup_sorted};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// The kind of identity change an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryEventType {
    /// An agent identity was first registered.
    Create,
    /// An agent's signing key was rotated.
    Rotate,
    /// An agent was revoked.
    Revoke,
    /// An agent's capability claims changed.
    CapabilityClaimChange,
}

impl EntryEventType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Rotate => "rotate",
            Self::Revoke => "revoke",
            Self::CapabilityClaimChange => "capability-claim-change",
        }
    }
}

impl ToCanonical for EntryEventType {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// An agent's lifecycle status as recorded by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// In good standing.
    Active,
    /// Temporarily disabled.
    Suspended,
    /// Permanently disabled.
    Revoked,
}

const AGENT_STATUS_VALUES: &[&str] = &["active", "suspended", "revoked"];

impl AgentStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }

    fn parse(raw: &str) -> Result<Self, NooterraError> {
        match closed_enum("statusAfter", raw, AGENT_STATUS_VALUES)? {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "revoked" => Ok(Self::Revoked),
            _ => unreachable!("closed_enum only returns values from AGENT_STATUS_VALUES"),
        }
    }
}

impl ToCanonical for AgentStatus {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// A single append-only record in an agent's identity transparency log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLogEntry {
    /// Unique identifier for this entry.
    pub entry_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The agent this entry is about.
    pub agent_id: String,
    /// What kind of identity change this entry records.
    pub event_type: EntryEventType,
    /// Position of this entry within the tenant's log, starting at 0.
    pub log_index: u64,
    /// The previous entry's `entryHash`, or `None` at `logIndex == 0`.
    pub prev_entry_hash: Option<String>,
    /// The signing key id before this change, if applicable.
    pub key_id_before: Option<String>,
    /// The signing key id after this change, if applicable.
    pub key_id_after: Option<String>,
    /// The agent's status before this change, if applicable.
    pub status_before: Option<AgentStatus>,
    /// The agent's status after this change, if applicable.
    pub status_after: Option<AgentStatus>,
    /// Capability tags held before this change.
    pub capabilities_before: Vec<String>,
    /// Capability tags held after this change.
    pub capabilities_after: Vec<String>,
    /// A fixed reason code for this change, if any.
    pub reason_code: Option<String>,
    /// A free-text reason for this change, if any.
    pub reason: Option<String>,
    /// When the underlying event actually happened.
    pub occurred_at: DateTime<Utc>,
    /// When this entry was appended to the log.
    pub recorded_at: DateTime<Utc>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
    /// Content hash (identity).
    pub entry_hash: String,
}

impl IdentityLogEntry {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "IdentityLogEntry.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", Self::SCHEMA_VERSION.to_canonical()),
            ("entryId", self.entry_id.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("agentId", self.agent_id.to_canonical()),
            ("eventType", self.event_type.to_canonical()),
            ("logIndex", (self.log_index as i64).to_canonical()),
            ("prevEntryHash", self.prev_entry_hash.to_canonical()),
            ("keyIdBefore", self.key_id_before.to_canonical()),
            ("keyIdAfter", self.key_id_after.to_canonical()),
            (
                "statusBefore",
                self.status_before.map_or(CanonicalValue::Null, |s| s.to_canonical()),
            ),
            (
                "statusAfter",
                self.status_after.map_or(CanonicalValue::Null, |s| s.to_canonical()),
            ),
            (
                "capabilitiesBefore",
                CanonicalValue::array(self.capabilities_before.iter().map(ToCanonical::to_canonical)),
            ),
            (
                "capabilitiesAfter",
                CanonicalValue::array(self.capabilities_after.iter().map(ToCanonical::to_canonical)),
            ),
            ("reasonCode", self.reason_code.to_canonical()),
            ("reason", self.reason.to_canonical()),
            ("occurredAt", canonical_timestamp(self.occurred_at).to_canonical()),
            ("recordedAt", canonical_timestamp(self.recorded_at).to_canonical()),
            (
                "metadata",
                self.metadata.as_ref().map_or(CanonicalValue::Null, ToCanonical::to_canonical),
            ),
            (
                "entryHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `entryHash` from the entry's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// The entry's full canonical form, with `entryHash` filled in
    /// (unlike [`IdentityLogEntry::compute_hash`]'s internal body, which
    /// nulls it). Used to embed an already-hashed entry inside another
    /// record's canonical body, such as an [`crate::proof::IdentityLogProof`].
    #[must_use]
    pub fn to_canonical(&self) -> CanonicalValue {
        self.canonical_body(Some(&self.entry_hash))
    }

    /// Verify the declared `entryHash` matches the current fields, and
    /// that the per-event-type shape rules hold.
    pub fn verify(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.entry_hash {
            return Err(NooterraError::new(
                ErrorCode::PayloadInvalid,
                "recomputed entryHash does not match the declared value",
            )
            .with_context("entryId", self.entry_id.clone())
            .with_context("expected", self.entry_hash.clone())
            .with_context("computed", computed));
        }
        self.verify_event_shape()
    }

    fn verify_event_shape(&self) -> Result<(), NooterraError> {
        let invalid = |field: &str| {
            NooterraError::new(
                ErrorCode::PayloadInvalid,
                format!("entry does not satisfy the {:?} shape rule for its eventType", self.event_type),
            )
            .with_context("entryId", self.entry_id.clone())
            .with_context("field", field.to_string())
        };

        match self.event_type {
            EntryEventType::Create => {
                if self.key_id_after.is_none() {
                    return Err(invalid("keyIdAfter"));
                }
                if self.status_after.is_none() {
                    return Err(invalid("statusAfter"));
                }
            }
            EntryEventType::Rotate => {
                if self.key_id_before.is_none() || self.key_id_after.is_none() {
                    return Err(invalid("keyIdBefore/keyIdAfter"));
                }
                if self.key_id_before == self.key_id_after {
                    return Err(invalid("keyIdAfter must differ from keyIdBefore"));
                }
            }
            EntryEventType::Revoke => {
                if self.status_after != Some(AgentStatus::Revoked) {
                    return Err(invalid("statusAfter"));
                }
            }
            EntryEventType::CapabilityClaimChange => {
                if self.capabilities_before == self.capabilities_after {
                    return Err(invalid("capabilitiesBefore/capabilitiesAfter must differ"));
                }
            }
        }
        Ok(())
    }

    /// Build and hash a new entry, normalizing identifiers and
    /// capability lists and validating the per-event-type shape rules.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        entry_id: impl Into<String>,
        tenant_id: impl Into<String>,
        agent_id: impl Into<String>,
        event_type: EntryEventType,
        log_index: u64,
        prev_entry_hash: Option<String>,
        key_id_before: Option<String>,
        key_id_after: Option<String>,
        status_before: Option<&str>,
        status_after: Option<&str>,
        capabilities_before: Vec<String>,
        capabilities_after: Vec<String>,
        reason_code: Option<String>,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, NooterraError> {
        let mut acc = ErrorAccumulator::new();
        let entry_id = acc.absorb(bounded_identifier("entryId", &entry_id.into(), MAX_ID_LEN)).unwrap_or_default();
        let tenant_id = acc.absorb(bounded_identifier("tenantId", &tenant_id.into(), MAX_ID_LEN)).unwrap_or_default();
        let agent_id = acc.absorb(bounded_identifier("agentId", &agent_id.into(), MAX_ID_LEN)).unwrap_or_default();
        let status_before = status_before.and_then(|s| acc.absorb(AgentStatus::parse(s)));
        let status_after = status_after.and_then(|s| acc.absorb(AgentStatus::parse(s)));
        acc.finish()?;

        let mut entry = Self {
            entry_id,
            tenant_id,
            agent_id,
            event_type,
            log_index,
            prev_entry_hash,
            key_id_before,
            key_id_after,
            status_before,
            status_after,
            capabilities_before: dedup_sorted(&capabilities_before),
            capabilities_after: dedup_sorted(&capabilities_after),
            reason_code,
            reason,
            occurred_at,
            recorded_at,
            metadata,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();
        entry.verify_event_shape()?;
        Ok(entry)
    }
}

/// Validate that `entries` form a legal append-only log: each entry
/// verifies standalone, no `entryId` repeats with a different
/// `entryHash` (equivocation), indices run `0..n` without gaps, and each
/// entry's `prevEntryHash` chains to its predecessor.
///
/// Returns the entries sorted by `(logIndex, entryId)` on success.
#[tracing::instrument(skip(entries), fields(entry_count = entries.len()))]
pub fn validate_log(entries: &[IdentityLogEntry]) -> Result<Vec<IdentityLogEntry>, NooterraError> {
    use std::collections::HashMap;

    for entry in entries {
        entry.verify()?;
    }

    let mut seen: HashMap<&str, &str> = HashMap::new();
    for entry in entries {
        match seen.get(entry.entry_id.as_str()) {
            Some(hash) if *hash != entry.entry_hash => {
                tracing::warn!(target: "nooterra_transparency", entry_id = %entry.entry_id, "equivocation detected in identity log");
                return Err(NooterraError::new(
                    ErrorCode::Equivocation,
                    "entryId repeats with a different entryHash",
                )
                .with_context("entryId", entry.entry_id.clone()));
            }
            Some(_) => {
                return Err(NooterraError::new(
                    ErrorCode::DuplicateEntryId,
                    "entryId appears more than once in the log",
                )
                .with_context("entryId", entry.entry_id.clone()));
            }
            None => {
                seen.insert(&entry.entry_id, &entry.entry_hash);
            }
        }
    }

    let mut sorted: Vec<IdentityLogEntry> = entries.to_vec();
    sorted.sort_by(|a, b| a.log_index.cmp(&b.log_index).then_with(|| a.entry_id.cmp(&b.entry_id)));

    for (i, entry) in sorted.iter().enumerate() {
        let expected_index = i as u64;
        if entry.log_index < expected_index {
            tracing::warn!(target: "nooterra_transparency", entry_id = %entry.entry_id, "equivocation detected in identity log");
            return Err(NooterraError::new(
                ErrorCode::Equivocation,
                "logIndex repeats one already claimed by an earlier entry",
            )
            .with_context("entryId", entry.entry_id.clone())
            .with_context("logIndex", entry.log_index.to_string())
            .with_context("expected", expected_index.to_string()));
        }
        if entry.log_index > expected_index {
            return Err(NooterraError::new(
                ErrorCode::IndexGap,
                "logIndex does not run contiguously from zero",
            )
            .with_context("entryId", entry.entry_id.clone())
            .with_context("logIndex", entry.log_index.to_string())
            .with_context("expected", expected_index.to_string()));
        }

        match (i, &entry.prev_entry_hash) {
            (0, None) => {}
            (0, Some(_)) => {
                return Err(NooterraError::new(
                    ErrorCode::PayloadInvalid,
                    "the first entry in a log must not declare a prevEntryHash",
                )
                .with_context("entryId", entry.entry_id.clone()));
            }
            (_, Some(prev)) if *prev == sorted[i - 1].entry_hash => {}
            _ => {
                return Err(NooterraError::new(
                    ErrorCode::PayloadInvalid,
                    "prevEntryHash does not chain to the preceding entry",
                )
                .with_context("entryId", entry.entry_id.clone()));
            }
        }
    }

    Ok(sorted)
}
