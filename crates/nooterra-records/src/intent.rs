//! `IntentContract.v1`: the bilateral agreement a negotiation transcript
//! (owned by `nooterra-negotiation`) and a sub-agent work order bind to.

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorAccumulator, ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, currency, non_negative_integer};
use serde::{Deserialize, Serialize};

use crate::common::RiskClass;

const MAX_ID_LEN: usize = 128;
const MIN_NONCE_LEN: usize = 8;

/// How deterministic the proposer expects the resulting work to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedDeterminism {
    /// Same inputs always produce the same outputs.
    Deterministic,
    /// Outputs vary within a bounded, characterized range.
    BoundedNondeterministic,
    /// Outputs may vary arbitrarily.
    OpenNondeterministic,
}

impl ExpectedDeterminism {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::BoundedNondeterministic => "bounded_nondeterministic",
            Self::OpenNondeterministic => "open_nondeterministic",
        }
    }
}

impl ToCanonical for ExpectedDeterminism {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// Spend ceiling for the work an intent contract covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendLimit {
    /// Currency the limit is denominated in.
    pub currency: String,
    /// Maximum amount, in cents.
    pub max_amount_cents: i64,
}

impl ToCanonical for SpendLimit {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("currency", self.currency.to_canonical()),
            ("maxAmountCents", self.max_amount_cents.to_canonical()),
        ])
    }
}

/// The task-shaped body of an intent: what is being asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentBody {
    /// Caller-defined task type tag.
    pub task_type: String,
    /// The capability id this task requires.
    pub capability_id: String,
    /// Risk class of the task.
    pub risk_class: RiskClass,
    /// How deterministic the result is expected to be.
    pub expected_determinism: ExpectedDeterminism,
    /// Whether the task has side effects.
    pub side_effecting: bool,
    /// Maximum acceptable loss in cents if the task fails badly.
    pub max_loss_cents: i64,
    /// Spend ceiling for the task.
    pub spend_limit: SpendLimit,
    /// Optional hash of out-of-band parameters.
    pub parameters_hash: Option<String>,
    /// Optional free-form constraints.
    pub constraints: Option<serde_json::Value>,
}

impl ToCanonical for IntentBody {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("taskType", self.task_type.to_canonical()),
            ("capabilityId", self.capability_id.to_canonical()),
            ("riskClass", self.risk_class.to_canonical()),
            ("expectedDeterminism", self.expected_determinism.to_canonical()),
            ("sideEffecting", self.side_effecting.to_canonical()),
            ("maxLossCents", self.max_loss_cents.to_canonical()),
            ("spendLimit", self.spend_limit.to_canonical()),
            ("parametersHash", self.parameters_hash.to_canonical()),
            ("constraints", self.constraints.to_canonical()),
        ])
    }
}

/// `IntentContract.v1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentContract {
    /// Unique identifier for this intent.
    pub intent_id: String,
    /// The negotiation this intent is the subject of.
    pub negotiation_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The agent proposing the task.
    pub proposer_agent_id: String,
    /// The agent expected to respond/perform the task.
    pub responder_agent_id: String,
    /// What is being asked for.
    pub intent: IntentBody,
    /// Client-supplied idempotency key for this proposal.
    pub idempotency_key: String,
    /// Random nonce, at least 8 characters.
    pub nonce: String,
    /// When this intent expires if not accepted.
    pub expires_at: DateTime<Utc>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
    /// When the intent was first created.
    pub created_at: DateTime<Utc>,
    /// When the intent was last updated.
    pub updated_at: DateTime<Utc>,
    /// Content hash (identity).
    pub intent_hash: String,
}

impl IntentContract {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "IntentContract.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("intentId", self.intent_id.to_canonical()),
            ("negotiationId", self.negotiation_id.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("proposerAgentId", self.proposer_agent_id.to_canonical()),
            ("responderAgentId", self.responder_agent_id.to_canonical()),
            ("intent", self.intent.to_canonical()),
            ("idempotencyKey", self.idempotency_key.to_canonical()),
            ("nonce", self.nonce.to_canonical()),
            ("expiresAt", canonical_timestamp(self.expires_at).to_canonical()),
            ("metadata", self.metadata.to_canonical()),
            ("createdAt", canonical_timestamp(self.created_at).to_canonical()),
            ("updatedAt", canonical_timestamp(self.updated_at).to_canonical()),
            (
                "intentHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `intentHash` from the record's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `intentHash` matches the current fields;
    /// distinguishes a first-build mismatch from post-hash tampering by
    /// the caller's choice of which error to surface is left to the
    /// caller, since both share the same recomputation path here.
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.intent_hash {
            return Err(NooterraError::new(
                ErrorCode::IntentContractHashTampered,
                "recomputed intentHash does not match the declared value",
            )
            .with_context("expected", self.intent_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }
}

/// Accumulating builder for [`IntentContract`].
#[derive(Debug, Default)]
pub struct IntentContractBuilder {
    intent_id: Option<String>,
    negotiation_id: Option<String>,
    tenant_id: Option<String>,
    proposer_agent_id: Option<String>,
    responder_agent_id: Option<String>,
    task_type: Option<String>,
    capability_id: Option<String>,
    risk_class: Option<RiskClass>,
    expected_determinism: Option<ExpectedDeterminism>,
    side_effecting: bool,
    max_loss_cents: i64,
    spend_currency: String,
    spend_max_amount_cents: i64,
    parameters_hash: Option<String>,
    constraints: Option<serde_json::Value>,
    idempotency_key: Option<String>,
    nonce: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    metadata: Option<serde_json::Value>,
}

impl IntentContractBuilder {
    /// Start a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the intent id.
    #[must_use]
    pub fn intent_id(mut self, v: impl Into<String>) -> Self {
        self.intent_id = Some(v.into());
        self
    }

    /// Set the negotiation id.
    #[must_use]
    pub fn negotiation_id(mut self, v: impl Into<String>) -> Self {
        self.negotiation_id = Some(v.into());
        self
    }

    /// Set the tenant id.
    #[must_use]
    pub fn tenant_id(mut self, v: impl Into<String>) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Set the proposer agent id.
    #[must_use]
    pub fn proposer_agent_id(mut self, v: impl Into<String>) -> Self {
        self.proposer_agent_id = Some(v.into());
        self
    }

    /// Set the responder agent id.
    #[must_use]
    pub fn responder_agent_id(mut self, v: impl Into<String>) -> Self {
        self.responder_agent_id = Some(v.into());
        self
    }

    /// Set the task shape.
    #[must_use]
    pub fn task(
        mut self,
        task_type: impl Into<String>,
        capability_id: impl Into<String>,
        risk_class: RiskClass,
        expected_determinism: ExpectedDeterminism,
        side_effecting: bool,
        max_loss_cents: i64,
    ) -> Self {
        self.task_type = Some(task_type.into());
        self.capability_id = Some(capability_id.into());
        self.risk_class = Some(risk_class);
        self.expected_determinism = Some(expected_determinism);
        self.side_effecting = side_effecting;
        self.max_loss_cents = max_loss_cents;
        self
    }

    /// Set the spend limit.
    #[must_use]
    pub fn spend_limit(mut self, currency: impl Into<String>, max_amount_cents: i64) -> Self {
        self.spend_currency = currency.into();
        self.spend_max_amount_cents = max_amount_cents;
        self
    }

    /// Set an optional out-of-band parameters hash.
    #[must_use]
    pub fn parameters_hash(mut self, v: impl Into<String>) -> Self {
        self.parameters_hash = Some(v.into());
        self
    }

    /// Set optional free-form constraints.
    #[must_use]
    pub fn constraints(mut self, v: serde_json::Value) -> Self {
        self.constraints = Some(v);
        self
    }

    /// Set the idempotency key.
    #[must_use]
    pub fn idempotency_key(mut self, v: impl Into<String>) -> Self {
        self.idempotency_key = Some(v.into());
        self
    }

    /// Set the nonce.
    #[must_use]
    pub fn nonce(mut self, v: impl Into<String>) -> Self {
        self.nonce = Some(v.into());
        self
    }

    /// Set the expiry instant.
    #[must_use]
    pub fn expires_at(mut self, v: DateTime<Utc>) -> Self {
        self.expires_at = Some(v);
        self
    }

    /// Attach arbitrary metadata.
    #[must_use]
    pub fn metadata(mut self, v: serde_json::Value) -> Self {
        self.metadata = Some(v);
        self
    }

    /// Normalize, validate, and hash the accumulated fields, stamping
    /// `createdAt == updatedAt == now`.
    pub fn build(self, now: DateTime<Utc>) -> Result<IntentContract, NooterraError> {
        let mut acc = ErrorAccumulator::new();

        let intent_id = acc
            .absorb(self.intent_id.ok_or_else(|| missing("intentId")))
            .and_then(|v| acc.absorb(bounded_identifier("intentId", &v, MAX_ID_LEN)));
        let negotiation_id = acc
            .absorb(self.negotiation_id.ok_or_else(|| missing("negotiationId")))
            .and_then(|v| acc.absorb(bounded_identifier("negotiationId", &v, MAX_ID_LEN)));
        let tenant_id = acc
            .absorb(self.tenant_id.ok_or_else(|| missing("tenantId")))
            .and_then(|v| acc.absorb(bounded_identifier("tenantId", &v, MAX_ID_LEN)));
        let proposer_agent_id = acc
            .absorb(self.proposer_agent_id.ok_or_else(|| missing("proposerAgentId")))
            .and_then(|v| acc.absorb(bounded_identifier("proposerAgentId", &v, MAX_ID_LEN)));
        let responder_agent_id = acc
            .absorb(self.responder_agent_id.ok_or_else(|| missing("responderAgentId")))
            .and_then(|v| acc.absorb(bounded_identifier("responderAgentId", &v, MAX_ID_LEN)));

        let task_type = acc.absorb(self.task_type.ok_or_else(|| missing("intent.taskType")));
        let capability_id = acc.absorb(self.capability_id.ok_or_else(|| missing("intent.capabilityId")));
        let risk_class = acc.absorb(self.risk_class.ok_or_else(|| missing("intent.riskClass")));
        let expected_determinism = acc.absorb(
            self.expected_determinism
                .ok_or_else(|| missing("intent.expectedDeterminism")),
        );
        let max_loss_cents = acc.absorb(non_negative_integer("intent.maxLossCents", self.max_loss_cents));
        let spend_currency = acc.absorb(currency("intent.spendLimit.currency", &self.spend_currency));
        let spend_max = acc.absorb(non_negative_integer(
            "intent.spendLimit.maxAmountCents",
            self.spend_max_amount_cents,
        ));

        let idempotency_key = acc
            .absorb(self.idempotency_key.ok_or_else(|| missing("idempotencyKey")))
            .and_then(|v| acc.absorb(bounded_identifier("idempotencyKey", &v, MAX_ID_LEN)));
        let nonce = acc.absorb(self.nonce.ok_or_else(|| missing("nonce"))).and_then(|v| {
            if v.chars().count() < MIN_NONCE_LEN {
                acc.push(missing_field("nonce", "must be at least 8 characters"));
                None
            } else {
                Some(v)
            }
        });
        let expires_at = acc.absorb(self.expires_at.ok_or_else(|| missing("expiresAt")));

        acc.finish()?;

        let intent = IntentBody {
            task_type: task_type.unwrap(),
            capability_id: capability_id.unwrap(),
            risk_class: risk_class.unwrap(),
            expected_determinism: expected_determinism.unwrap(),
            side_effecting: self.side_effecting,
            max_loss_cents: max_loss_cents.unwrap(),
            spend_limit: SpendLimit { currency: spend_currency.unwrap(), max_amount_cents: spend_max.unwrap() },
            parameters_hash: self.parameters_hash,
            constraints: self.constraints,
        };

        let mut contract = IntentContract {
            intent_id: intent_id.unwrap(),
            negotiation_id: negotiation_id.unwrap(),
            tenant_id: tenant_id.unwrap(),
            proposer_agent_id: proposer_agent_id.unwrap(),
            responder_agent_id: responder_agent_id.unwrap(),
            intent,
            idempotency_key: idempotency_key.unwrap(),
            nonce: nonce.unwrap(),
            expires_at: expires_at.unwrap(),
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
            intent_hash: String::new(),
        };
        contract.intent_hash = contract.compute_hash();
        Ok(contract)
    }
}

fn missing(field: &str) -> NooterraError {
    missing_field(field, "is required")
}

fn missing_field(field: &str, detail: &str) -> NooterraError {
    NooterraError::new(ErrorCode::PayloadInvalid, detail).with_context("field", field)
}
