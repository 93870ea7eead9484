//! The signed-record family: authority grants, capability attestations,
//! intent contracts, sub-agent work orders, state checkpoints (with
//! linear lineage), paid-tool manifests, and provider publish proofs.
//!
//! Every record here follows the same uniform algorithm
//! (SPEC_FULL.md §4.3): normalize each field, compose the canonical body
//! with its own hash field nulled, hash, optionally sign, emit. Builders
//! live next to the struct they build; verification is always the
//! builder's dual, recomputing the hash and comparing.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attestation;
pub mod checkpoint;
pub mod common;
pub mod grant;
pub mod intent;
pub mod paid_tool;
pub mod publish_proof;
pub mod work_order;

pub use common::{
    hash_artifact_payload, compute_record_hash, ArtifactRef, RiskClass, SignatureEnvelope,
};

pub use grant::{
    evaluate_trust, AuthorityGrant, AuthorityGrantBuilder, ChainBinding, GrantScope, Operation,
    PrincipalRef, PrincipalType, Revocation, SpendEnvelope, TrustDecision, TrustState, Validity,
};

pub use attestation::{
    AttestationLevel, AttestationRevocation, CapabilityAttestation,
};

pub use intent::{
    ExpectedDeterminism, IntentBody, IntentContract, IntentContractBuilder, SpendLimit,
};

pub use work_order::{
    CompletionStatus, EvidencePolicy, Pricing, PricingModel, ProgressEvent, Settlement,
    SettlementQuote, SubAgentCompletionReceipt, SubAgentWorkOrder, SubAgentWorkOrderBuilder,
    WorkOrderConstraints, WorkOrderStatus,
};

pub use checkpoint::{
    validate_linear_parent, validate_revision, LineageCompaction, LineageRestore, StateCheckpoint,
};

pub use paid_tool::{
    Idempotency, ManifestDefaults, PaidToolManifest, PaidToolManifestBuilder, RequestBinding,
    RiskLevel, SignatureMode, ToolClass, ToolEntry, ToolEntryBuilder, ToolPricing, ToolSecurity,
    ToolV2Extras,
};

pub use publish_proof::{
    encode_publish_proof, verify_publish_proof, KeyResolver, PublishProofExpectations,
    PublishProofHeader, PublishProofPayload,
};

#[cfg(feature = "jwks")]
pub use publish_proof::{fetch_jwks_key_resolver, JwksFetchConfig, StaticKeyResolver};
