//! Stable error-code taxonomy for the nooterra trust substrate.
//!
//! Every fallible operation across the `nooterra-*` crates returns a
//! [`NooterraError`] carrying one [`ErrorCode`] variant. Each variant
//! serializes to the exact `SCREAMING_SNAKE_CASE` code string two
//! independent implementations must agree on byte-for-byte, via
//! `#[serde(rename_all = "SCREAMING_SNAKE_CASE")]` rather than a hand
//! written `as_str` table.
//!
//! Codes are grouped into eight categories: shape, integrity, binding,
//! state machine, policy, crypto, transparency, external I/O. Pure
//! evaluators (trust, governance, session policy) never return a
//! `NooterraError` — they return an outcome value with its own reason
//! code, per the values-vs-errors split.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad family an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input shape violations.
    Shape,
    /// Recomputed hash or Merkle root mismatches.
    Integrity,
    /// Cross-field / cross-record mismatches.
    Binding,
    /// Forbidden state transitions.
    StateMachine,
    /// Allowed-but-denied policy/trust outcomes.
    Policy,
    /// Signature or key mismatches.
    Crypto,
    /// Transparency-log append-only violations.
    Transparency,
    /// The one network path (JWKS fetch).
    ExternalIo,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Shape => "shape",
            Self::Integrity => "integrity",
            Self::Binding => "binding",
            Self::StateMachine => "state_machine",
            Self::Policy => "policy",
            Self::Crypto => "crypto",
            Self::Transparency => "transparency",
            Self::ExternalIo => "external_io",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code.
///
/// Each variant serializes to the `SCREAMING_SNAKE_CASE` string named in
/// the wire contract; that string is guaranteed not to change across
/// patch releases and is what two implementations compare to agree a
/// record was rejected for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Shape --
    /// General-purpose shape violation; prefer a more specific code when one exists.
    PayloadInvalid,
    /// A value failed JSON-Schema-equivalent validation.
    SchemaInvalid,
    /// A field failed a normalizer's rule (non-empty, bounded identifier, etc).
    NormalizeInvalid,
    /// An object carried unknown fields that the schema does not allow.
    UnknownFieldRejected,
    /// A plain-object value was an array, or carried a non-plain prototype equivalent.
    NotPlainObject,

    // -- Integrity --
    /// `AuthorityGrant.v1` recomputed hash does not match the declared `grantHash`.
    AuthorityGrantHashMismatch,
    /// `CapabilityAttestation.v1` recomputed hash does not match `attestationHash`.
    AttestationHashMismatch,
    /// `IntentContract.v1` recomputed hash does not match `intentHash`.
    IntentContractHashMismatch,
    /// An `IntentContract.v1` was tampered with after hashing.
    IntentContractHashTampered,
    /// `SubAgentWorkOrder.v1` / `SubAgentCompletionReceipt.v1` hash mismatch.
    WorkOrderHashMismatch,
    /// `StateCheckpoint.v1` recomputed hash does not match `checkpointHash`.
    CheckpointHashMismatch,
    /// `SessionReplayPack.v1` signature payload hash does not match the recomputed hash.
    SessionReplayPackSignaturePayloadHashMismatch,
    /// `VerifiedInteractionGraphPack.v1` hash mismatch.
    GraphPackHashMismatch,
    /// `PaidToolManifest` hash mismatch.
    ManifestHashMismatch,
    /// `ProofBundleManifest.v1` manifest hash mismatch.
    BundleManifestHashMismatch,
    /// A Merkle inclusion proof failed to recompute to the declared root.
    ProofMerkleInvalid,
    /// An `ArtifactRef.v1` payload hash does not match `artifactHash`.
    ArtifactHashMismatch,

    // -- Binding --
    /// `intentId` on a negotiation event does not match the bound contract.
    IntentIdMismatch,
    /// `negotiationId` on a negotiation event does not match the bound contract.
    NegotiationIdMismatch,
    /// `intentHash` on a negotiation event does not match the bound contract's `intentHash`.
    EventIntentHashMismatch,
    /// A negotiation event's `prevEventHash` does not equal the prior event's `eventHash`.
    PrevEventHashMismatch,
    /// A negotiation event's `reasonCode` is not the fixed code for its `eventType`.
    ReasonCodeInvalid,
    /// A cursor's `channel` does not match the channel it was presented against.
    CursorChannelMismatch,
    /// An inclusion proof's cross-field equalities do not hold against its entry/checkpoint.
    ProofEntryMismatch,
    /// A settlement quote exceeds the work order's `constraints.maxCostCents`.
    SettlementExceedsCostCap,

    // -- State machine --
    /// A negotiation transition is not reachable from the current state.
    TransitionInvalid,
    /// A negotiation transcript already holding an `accept` event was extended.
    EventAfterAccept,
    /// The first event in a negotiation transcript was not `propose`.
    ProposeRequired,
    /// An inbox ack cursor's `seq` is behind the stored checkpoint.
    AckCursorRegression,
    /// An inbox ack cursor's `seq` skips ahead of the stored checkpoint by more than one.
    AckOutOfOrder,
    /// An inbox ack cursor named a message that does not exist at that `seq`.
    AckCursorNotFound,
    /// A list cursor does not resolve to a stored message.
    CursorNotFound,
    /// Two publish calls under the same idempotency key carried different payloads.
    IdempotencyConflict,

    // -- Policy / trust --
    /// `revokedAt` is present without a `revocationReasonCode`.
    RevocationReasonRequired,
    /// Spend exceeds the governance template's per-action cap.
    PerActionLimitExceeded,
    /// Spend exceeds the governance template's monthly cap.
    MonthlyLimitExceeded,
    /// `dataClass` is not in the template's allow-list.
    DataClassNotAllowed,
    /// An external transfer was requested but not allowed by the template.
    ExternalTransferNotAllowed,
    /// No approval tier covers the requested amount with the approvals provided.
    ApprovalTierNotSatisfied,
    /// The risk level requires at least one approval that was not provided.
    ApprovalRequiredForRiskLevel,
    /// The risk level is in the template's auto-block set.
    RiskLevelBlocked,
    /// A historical read was requested without supplying `evidenceAt`.
    HistoricalReadEvidenceRequired,
    /// The supplied `evidenceAt` falls outside the grant's revocation window.
    HistoricalReadOutsideWindow,
    /// An interaction direction is not permitted by the interaction matrix.
    InteractionDirectionDenied,
    /// A session-memory read is not permitted by the declared visibility/relation.
    SessionMemoryAccessDenied,

    // -- Crypto --
    /// Ed25519 signature did not verify.
    SignatureInvalid,
    /// The presented public key's derived `keyId` does not match the declared `keyId`.
    KeyMismatch,
    /// A JWS `kid` was not found in the resolved JWKS.
    UnknownKid,
    /// A JWS `alg` was not `EdDSA`.
    AlgInvalid,
    /// A JWS token's `exp` has already passed.
    TokenExpired,
    /// A JWS token's `iat` is too far in the future.
    TokenNotYetValid,

    // -- Transparency --
    /// Two entries share an `entryId` but carry different `entryHash` values.
    Equivocation,
    /// A trusted checkpoint is ahead of an observed checkpoint for the same tree size.
    CheckpointRollback,
    /// An identity log entry's `logIndex` skips a value.
    IndexGap,
    /// Two identity log entries share the same `entryId`.
    DuplicateEntryId,

    // -- External I/O --
    /// A JWKS URL failed the scheme/host safety check.
    JwksUrlUnsafe,
    /// The JWKS fetch failed (network error, non-2xx, or timed out).
    JwksFetchFailed,
    /// The JWKS response body exceeded the configured size cap.
    JwksBodyTooLarge,
    /// The JWKS response body was not valid JSON.
    JwksJsonInvalid,
    /// The JWKS response did not contain the expected `keys` array.
    JwksKeysMissing,
    /// An I/O operation was cancelled or exceeded its timeout.
    Timeout,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        use ErrorCode::{
            AckCursorNotFound, AckCursorRegression, AckOutOfOrder, AlgInvalid,
            ApprovalRequiredForRiskLevel, ApprovalTierNotSatisfied, ArtifactHashMismatch,
            AttestationHashMismatch, AuthorityGrantHashMismatch, BundleManifestHashMismatch,
            CheckpointHashMismatch, CheckpointRollback, CursorChannelMismatch, CursorNotFound,
            DataClassNotAllowed, DuplicateEntryId, Equivocation, EventAfterAccept,
            ExternalTransferNotAllowed, GraphPackHashMismatch, HistoricalReadEvidenceRequired,
            HistoricalReadOutsideWindow, IdempotencyConflict, IndexGap,
            InteractionDirectionDenied, IntentContractHashMismatch, IntentContractHashTampered,
            EventIntentHashMismatch, IntentIdMismatch, JwksBodyTooLarge, JwksFetchFailed,
            JwksJsonInvalid, JwksKeysMissing, JwksUrlUnsafe, KeyMismatch, ManifestHashMismatch,
            MonthlyLimitExceeded, NegotiationIdMismatch, NormalizeInvalid, NotPlainObject,
            PayloadInvalid, PerActionLimitExceeded, PrevEventHashMismatch, ProofEntryMismatch,
            ProofMerkleInvalid, ProposeRequired, ReasonCodeInvalid, RevocationReasonRequired,
            RiskLevelBlocked, SchemaInvalid,
            SessionMemoryAccessDenied, SessionReplayPackSignaturePayloadHashMismatch,
            SettlementExceedsCostCap, SignatureInvalid, Timeout, TokenExpired, TokenNotYetValid,
            TransitionInvalid, UnknownFieldRejected, UnknownKid, WorkOrderHashMismatch,
        };
        match self {
            PayloadInvalid | SchemaInvalid | NormalizeInvalid | UnknownFieldRejected
            | NotPlainObject => ErrorCategory::Shape,

            AuthorityGrantHashMismatch
            | AttestationHashMismatch
            | IntentContractHashMismatch
            | IntentContractHashTampered
            | WorkOrderHashMismatch
            | CheckpointHashMismatch
            | SessionReplayPackSignaturePayloadHashMismatch
            | GraphPackHashMismatch
            | ManifestHashMismatch
            | BundleManifestHashMismatch
            | ProofMerkleInvalid
            | ArtifactHashMismatch => ErrorCategory::Integrity,

            IntentIdMismatch
            | NegotiationIdMismatch
            | EventIntentHashMismatch
            | PrevEventHashMismatch
            | ReasonCodeInvalid
            | CursorChannelMismatch
            | ProofEntryMismatch
            | SettlementExceedsCostCap => ErrorCategory::Binding,

            TransitionInvalid
            | EventAfterAccept
            | ProposeRequired
            | AckCursorRegression
            | AckOutOfOrder
            | AckCursorNotFound
            | CursorNotFound
            | IdempotencyConflict => ErrorCategory::StateMachine,

            RevocationReasonRequired
            | PerActionLimitExceeded
            | MonthlyLimitExceeded
            | DataClassNotAllowed
            | ExternalTransferNotAllowed
            | ApprovalTierNotSatisfied
            | ApprovalRequiredForRiskLevel
            | RiskLevelBlocked
            | HistoricalReadEvidenceRequired
            | HistoricalReadOutsideWindow
            | InteractionDirectionDenied
            | SessionMemoryAccessDenied => ErrorCategory::Policy,

            SignatureInvalid | KeyMismatch | UnknownKid | AlgInvalid | TokenExpired
            | TokenNotYetValid => ErrorCategory::Crypto,

            Equivocation | CheckpointRollback | IndexGap | DuplicateEntryId => {
                ErrorCategory::Transparency
            }

            JwksUrlUnsafe | JwksFetchFailed | JwksBodyTooLarge | JwksJsonInvalid
            | JwksKeysMissing | Timeout => ErrorCategory::ExternalIo,
        }
    }

    /// Stable `&'static str` representation, e.g. `"AUTHORITY_GRANT_HASH_MISMATCH"`.
    ///
    /// Equivalent to `serde_json::to_value(self)` but without the
    /// allocation, for call sites that only need the code string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        // `serde_json` already knows this mapping via `rename_all`; this
        // mirrors it as a direct match so the hot path (error construction)
        // never touches serde.
        match self {
            Self::PayloadInvalid => "PAYLOAD_INVALID",
            Self::SchemaInvalid => "SCHEMA_INVALID",
            Self::NormalizeInvalid => "NORMALIZE_INVALID",
            Self::UnknownFieldRejected => "UNKNOWN_FIELD_REJECTED",
            Self::NotPlainObject => "NOT_PLAIN_OBJECT",
            Self::AuthorityGrantHashMismatch => "AUTHORITY_GRANT_HASH_MISMATCH",
            Self::AttestationHashMismatch => "ATTESTATION_HASH_MISMATCH",
            Self::IntentContractHashMismatch => "INTENT_CONTRACT_HASH_MISMATCH",
            Self::IntentContractHashTampered => "INTENT_CONTRACT_HASH_TAMPERED",
            Self::WorkOrderHashMismatch => "WORK_ORDER_HASH_MISMATCH",
            Self::CheckpointHashMismatch => "CHECKPOINT_HASH_MISMATCH",
            Self::SessionReplayPackSignaturePayloadHashMismatch => {
                "SESSION_REPLAY_PACK_SIGNATURE_PAYLOAD_HASH_MISMATCH"
            }
            Self::GraphPackHashMismatch => "GRAPH_PACK_HASH_MISMATCH",
            Self::ManifestHashMismatch => "MANIFEST_HASH_MISMATCH",
            Self::BundleManifestHashMismatch => "BUNDLE_MANIFEST_HASH_MISMATCH",
            Self::ProofMerkleInvalid => "PROOF_MERKLE_INVALID",
            Self::ArtifactHashMismatch => "ARTIFACT_HASH_MISMATCH",
            Self::IntentIdMismatch => "INTENT_ID_MISMATCH",
            Self::NegotiationIdMismatch => "NEGOTIATION_ID_MISMATCH",
            Self::EventIntentHashMismatch => "EVENT_INTENT_HASH_MISMATCH",
            Self::PrevEventHashMismatch => "PREV_EVENT_HASH_MISMATCH",
            Self::ReasonCodeInvalid => "REASON_CODE_INVALID",
            Self::CursorChannelMismatch => "CURSOR_CHANNEL_MISMATCH",
            Self::ProofEntryMismatch => "PROOF_ENTRY_MISMATCH",
            Self::SettlementExceedsCostCap => "SETTLEMENT_EXCEEDS_COST_CAP",
            Self::TransitionInvalid => "TRANSITION_INVALID",
            Self::EventAfterAccept => "EVENT_AFTER_ACCEPT",
            Self::ProposeRequired => "PROPOSE_REQUIRED",
            Self::AckCursorRegression => "ACK_CURSOR_REGRESSION",
            Self::AckOutOfOrder => "ACK_OUT_OF_ORDER",
            Self::AckCursorNotFound => "ACK_CURSOR_NOT_FOUND",
            Self::CursorNotFound => "CURSOR_NOT_FOUND",
            Self::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            Self::RevocationReasonRequired => "REVOCATION_REASON_REQUIRED",
            Self::PerActionLimitExceeded => "PER_ACTION_LIMIT_EXCEEDED",
            Self::MonthlyLimitExceeded => "MONTHLY_LIMIT_EXCEEDED",
            Self::DataClassNotAllowed => "DATA_CLASS_NOT_ALLOWED",
            Self::ExternalTransferNotAllowed => "EXTERNAL_TRANSFER_NOT_ALLOWED",
            Self::ApprovalTierNotSatisfied => "APPROVAL_TIER_NOT_SATISFIED",
            Self::ApprovalRequiredForRiskLevel => "APPROVAL_REQUIRED_FOR_RISK_LEVEL",
            Self::RiskLevelBlocked => "RISK_LEVEL_BLOCKED",
            Self::HistoricalReadEvidenceRequired => "HISTORICAL_READ_EVIDENCE_REQUIRED",
            Self::HistoricalReadOutsideWindow => "HISTORICAL_READ_OUTSIDE_WINDOW",
            Self::InteractionDirectionDenied => "INTERACTION_DIRECTION_DENIED",
            Self::SessionMemoryAccessDenied => "SESSION_MEMORY_ACCESS_DENIED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::KeyMismatch => "KEY_MISMATCH",
            Self::UnknownKid => "UNKNOWN_KID",
            Self::AlgInvalid => "ALG_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenNotYetValid => "TOKEN_NOT_YET_VALID",
            Self::Equivocation => "EQUIVOCATION",
            Self::CheckpointRollback => "CHECKPOINT_ROLLBACK",
            Self::IndexGap => "INDEX_GAP",
            Self::DuplicateEntryId => "DUPLICATE_ENTRY_ID",
            Self::JwksUrlUnsafe => "JWKS_URL_UNSAFE",
            Self::JwksFetchFailed => "JWKS_FETCH_FAILED",
            Self::JwksBodyTooLarge => "JWKS_BODY_TOO_LARGE",
            Self::JwksJsonInvalid => "JWKS_JSON_INVALID",
            Self::JwksKeysMissing => "JWKS_KEYS_MISSING",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified nooterra error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context
/// (field name, offending value, etc).
#[derive(Error)]
#[error("[{code}] {message}")]
pub struct NooterraError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics, deterministically ordered.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl NooterraError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if
    /// serialization fails the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for NooterraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("NooterraError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

/// Convenience alias for `Result<T, NooterraError>`.
pub type NooterraResult<T> = Result<T, NooterraError>;

/// An accumulation of [`NooterraError`] values produced by a validation
/// pass that does not short-circuit on the first failure.
///
/// Record builders collect every normalization failure before returning,
/// so a caller can fix every problem in one round trip instead of one
/// per submission.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<NooterraError>,
}

impl ErrorAccumulator {
    /// Start with an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure without stopping the caller's validation pass.
    pub fn push(&mut self, error: NooterraError) {
        self.errors.push(error);
    }

    /// Record a failure only if `result` is `Err`, returning the `Ok` value
    /// (if any) for further use; swallows the error into the accumulator.
    pub fn absorb<T>(&mut self, result: Result<T, NooterraError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    /// True if no errors have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of errors recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Consume the accumulator: `Ok(())` if empty, else the first error
    /// with the remaining ones preserved in its context under `"also"`.
    pub fn finish(self) -> Result<(), NooterraError> {
        let mut iter = self.errors.into_iter();
        let Some(first) = iter.next() else {
            return Ok(());
        };
        let rest: Vec<String> = iter.map(|e| e.to_string()).collect();
        if rest.is_empty() {
            Err(first)
        } else {
            Err(first.with_context("also", rest))
        }
    }

    /// Consume the accumulator, returning every recorded error.
    #[must_use]
    pub fn into_vec(self) -> Vec<NooterraError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCategory, ErrorCode, ErrorAccumulator, NooterraError};

    #[test]
    fn code_serializes_to_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::AuthorityGrantHashMismatch).unwrap();
        assert_eq!(json, "\"AUTHORITY_GRANT_HASH_MISMATCH\"");
        assert_eq!(
            ErrorCode::AuthorityGrantHashMismatch.as_str(),
            "AUTHORITY_GRANT_HASH_MISMATCH"
        );
    }

    #[test]
    fn as_str_matches_serde_for_every_variant() {
        // Spot-check representative variants from each category rather than
        // every one; a mismatch here would mean the hand-written match in
        // `as_str` drifted from the derive.
        let pairs = [
            (ErrorCode::PayloadInvalid, "PAYLOAD_INVALID"),
            (ErrorCode::ProofMerkleInvalid, "PROOF_MERKLE_INVALID"),
            (ErrorCode::CursorChannelMismatch, "CURSOR_CHANNEL_MISMATCH"),
            (ErrorCode::EventAfterAccept, "EVENT_AFTER_ACCEPT"),
            (ErrorCode::RiskLevelBlocked, "RISK_LEVEL_BLOCKED"),
            (ErrorCode::SignatureInvalid, "SIGNATURE_INVALID"),
            (ErrorCode::Equivocation, "EQUIVOCATION"),
            (ErrorCode::JwksBodyTooLarge, "JWKS_BODY_TOO_LARGE"),
        ];
        for (code, expected) in pairs {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{expected}\""));
            assert_eq!(code.as_str(), expected);
        }
    }

    #[test]
    fn category_groups_are_stable() {
        assert_eq!(
            ErrorCode::AuthorityGrantHashMismatch.category(),
            ErrorCategory::Integrity
        );
        assert_eq!(ErrorCode::EventAfterAccept.category(), ErrorCategory::StateMachine);
        assert_eq!(ErrorCode::JwksFetchFailed.category(), ErrorCategory::ExternalIo);
        assert_eq!(ErrorCode::Equivocation.category(), ErrorCategory::Transparency);
    }

    #[test]
    fn builder_attaches_context_and_displays_code() {
        let err = NooterraError::new(ErrorCode::KeyMismatch, "declared keyId does not match")
            .with_context("expected", "abc123")
            .with_context("actual", "def456");
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.to_string(), "[KEY_MISMATCH] declared keyId does not match");
    }

    #[test]
    fn accumulator_collects_every_error() {
        let mut acc = ErrorAccumulator::new();
        acc.push(NooterraError::new(ErrorCode::PayloadInvalid, "a"));
        acc.push(NooterraError::new(ErrorCode::SchemaInvalid, "b"));
        assert_eq!(acc.len(), 2);
        let err = acc.finish().unwrap_err();
        assert_eq!(err.code, ErrorCode::PayloadInvalid);
        assert!(err.context.contains_key("also"));
    }

    #[test]
    fn empty_accumulator_finishes_ok() {
        assert!(ErrorAccumulator::new().finish().is_ok());
    }
}
