//! `SubAgentWorkOrder.v1` and `SubAgentCompletionReceipt.v1`: the pricing
//! and completion contract for delegating a task to a sub-agent.

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorAccumulator, ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, currency, non_negative_integer, positive_integer};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// Pricing model a work order bills under. `Fixed` is the only model this
/// substrate defines today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    /// A flat amount, regardless of actual resource use.
    Fixed,
}

impl PricingModel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
        }
    }
}

impl ToCanonical for PricingModel {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// Pricing block a work order carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// Pricing model.
    pub model: PricingModel,
    /// Amount billed, in cents; must be `>= 1`.
    pub amount_cents: i64,
    /// Currency the amount is denominated in.
    pub currency: String,
}

impl ToCanonical for Pricing {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("model", self.model.to_canonical()),
            ("amountCents", self.amount_cents.to_canonical()),
            ("currency", self.currency.to_canonical()),
        ])
    }
}

/// Optional spend/evidence constraints a work order enforces on its
/// eventual completion receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkOrderConstraints {
    /// Maximum settlement amount, in cents, the completion receipt may quote.
    pub max_cost_cents: Option<i64>,
    /// Maximum wall-clock duration allowed, in seconds.
    pub max_duration_seconds: Option<i64>,
}

impl ToCanonical for WorkOrderConstraints {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("maxCostCents", self.max_cost_cents.to_canonical()),
            ("maxDurationSeconds", self.max_duration_seconds.to_canonical()),
        ])
    }
}

/// Whether evidence must accompany completion, and what kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EvidencePolicy {
    /// Whether at least one evidence reference is required at completion.
    pub required: bool,
    /// Accepted evidence artifact types, if restricted.
    pub accepted_artifact_types: Option<Vec<String>>,
}

impl ToCanonical for EvidencePolicy {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("required", self.required.to_canonical()),
            (
                "acceptedArtifactTypes",
                self.accepted_artifact_types.clone().to_canonical(),
            ),
        ])
    }
}

/// Lifecycle status of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    /// Issued, awaiting acceptance or progress.
    Open,
    /// Accepted by the sub-agent and in progress.
    InProgress,
    /// Completed successfully.
    Completed,
    /// Completed unsuccessfully.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl WorkOrderStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl ToCanonical for WorkOrderStatus {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// A single append-only progress event attached to a work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// When the event was recorded.
    pub at: DateTime<Utc>,
    /// Free-form progress note.
    pub note: String,
}

impl ToCanonical for ProgressEvent {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("at", canonical_timestamp(self.at).to_canonical()),
            ("note", self.note.to_canonical()),
        ])
    }
}

/// Settlement outcome once a work order's completion receipt has been
/// accepted; `None` until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Final settled amount, in cents.
    pub settled_amount_cents: i64,
    /// When settlement was recorded.
    pub settled_at: DateTime<Utc>,
}

impl ToCanonical for Settlement {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("settledAmountCents", self.settled_amount_cents.to_canonical()),
            ("settledAt", canonical_timestamp(self.settled_at).to_canonical()),
        ])
    }
}

/// `SubAgentWorkOrder.v1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAgentWorkOrder {
    /// Unique identifier for this work order.
    pub work_order_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Intent this work order fulfills.
    pub intent_id: String,
    /// Agent delegating the task.
    pub delegator_agent_id: String,
    /// Agent performing the task.
    pub worker_agent_id: String,
    /// Pricing terms.
    pub pricing: Pricing,
    /// Optional spend/duration constraints.
    pub constraints: Option<WorkOrderConstraints>,
    /// Optional evidence policy.
    pub evidence_policy: Option<EvidencePolicy>,
    /// Current lifecycle status.
    pub status: WorkOrderStatus,
    /// Append-only progress log.
    pub progress_events: Vec<ProgressEvent>,
    /// Settlement outcome, once known.
    pub settlement: Option<Settlement>,
    /// When the work order was created.
    pub created_at: DateTime<Utc>,
    /// When the work order was last updated.
    pub updated_at: DateTime<Utc>,
    /// Content hash (identity).
    pub work_order_hash: String,
}

impl SubAgentWorkOrder {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "SubAgentWorkOrder.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("workOrderId", self.work_order_id.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("intentId", self.intent_id.to_canonical()),
            ("delegatorAgentId", self.delegator_agent_id.to_canonical()),
            ("workerAgentId", self.worker_agent_id.to_canonical()),
            ("pricing", self.pricing.to_canonical()),
            ("constraints", self.constraints.as_ref().map(ToCanonical::to_canonical).unwrap_or(CanonicalValue::Null)),
            (
                "evidencePolicy",
                self.evidence_policy.as_ref().map(ToCanonical::to_canonical).unwrap_or(CanonicalValue::Null),
            ),
            ("status", self.status.to_canonical()),
            (
                "progressEvents",
                CanonicalValue::array(self.progress_events.iter().map(ToCanonical::to_canonical)),
            ),
            (
                "settlement",
                self.settlement.as_ref().map(ToCanonical::to_canonical).unwrap_or(CanonicalValue::Null),
            ),
            ("createdAt", canonical_timestamp(self.created_at).to_canonical()),
            ("updatedAt", canonical_timestamp(self.updated_at).to_canonical()),
            (
                "workOrderHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `workOrderHash` from the record's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `workOrderHash` matches the current fields.
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.work_order_hash {
            return Err(NooterraError::new(
                ErrorCode::WorkOrderHashMismatch,
                "recomputed workOrderHash does not match the declared value",
            )
            .with_context("expected", self.work_order_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Append a progress event and advance to `in_progress` if still `open`,
    /// recomputing the hash.
    #[must_use]
    pub fn with_progress(&self, at: DateTime<Utc>, note: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.progress_events.push(ProgressEvent { at, note: note.into() });
        if next.status == WorkOrderStatus::Open {
            next.status = WorkOrderStatus::InProgress;
        }
        next.updated_at = now;
        next.work_order_hash = next.compute_hash();
        next
    }

    /// Accept a completion receipt, settling the work order. Fails if the
    /// work order is already in a terminal status, or if the receipt's
    /// quoted settlement exceeds `constraints.maxCostCents`.
    pub fn settle(
        &self,
        receipt: &SubAgentCompletionReceipt,
        now: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        if matches!(
            self.status,
            WorkOrderStatus::Completed | WorkOrderStatus::Failed | WorkOrderStatus::Cancelled
        ) {
            return Err(NooterraError::new(
                ErrorCode::TransitionInvalid,
                "cannot settle a work order that is already in a terminal status",
            )
            .with_context("status", self.status.as_str()));
        }
        if let Some(cap) = self.constraints.as_ref().and_then(|c| c.max_cost_cents) {
            if receipt.settlement_quote.amount_cents > cap {
                return Err(NooterraError::new(
                    ErrorCode::SettlementExceedsCostCap,
                    "completion receipt settlement quote exceeds workOrder.constraints.maxCostCents",
                )
                .with_context("cap", cap)
                .with_context("quoted", receipt.settlement_quote.amount_cents));
            }
        }
        let mut next = self.clone();
        next.status = match receipt.status {
            CompletionStatus::Success => WorkOrderStatus::Completed,
            CompletionStatus::Failed => WorkOrderStatus::Failed,
        };
        next.settlement = Some(Settlement {
            settled_amount_cents: receipt.settlement_quote.amount_cents,
            settled_at: now,
        });
        next.updated_at = now;
        next.work_order_hash = next.compute_hash();
        Ok(next)
    }
}

/// Accumulating builder for [`SubAgentWorkOrder`].
#[derive(Debug, Default)]
pub struct SubAgentWorkOrderBuilder {
    work_order_id: Option<String>,
    tenant_id: Option<String>,
    intent_id: Option<String>,
    delegator_agent_id: Option<String>,
    worker_agent_id: Option<String>,
    amount_cents: i64,
    currency: String,
    constraints: Option<WorkOrderConstraints>,
    evidence_policy: Option<EvidencePolicy>,
}

impl SubAgentWorkOrderBuilder {
    /// Start a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the work order id.
    #[must_use]
    pub fn work_order_id(mut self, v: impl Into<String>) -> Self {
        self.work_order_id = Some(v.into());
        self
    }

    /// Set the tenant id.
    #[must_use]
    pub fn tenant_id(mut self, v: impl Into<String>) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Set the fulfilled intent id.
    #[must_use]
    pub fn intent_id(mut self, v: impl Into<String>) -> Self {
        self.intent_id = Some(v.into());
        self
    }

    /// Set the delegating agent id.
    #[must_use]
    pub fn delegator_agent_id(mut self, v: impl Into<String>) -> Self {
        self.delegator_agent_id = Some(v.into());
        self
    }

    /// Set the performing agent id.
    #[must_use]
    pub fn worker_agent_id(mut self, v: impl Into<String>) -> Self {
        self.worker_agent_id = Some(v.into());
        self
    }

    /// Set fixed pricing terms.
    #[must_use]
    pub fn fixed_pricing(mut self, amount_cents: i64, currency: impl Into<String>) -> Self {
        self.amount_cents = amount_cents;
        self.currency = currency.into();
        self
    }

    /// Set spend/duration constraints.
    #[must_use]
    pub fn constraints(mut self, v: WorkOrderConstraints) -> Self {
        self.constraints = Some(v);
        self
    }

    /// Set the evidence policy.
    #[must_use]
    pub fn evidence_policy(mut self, v: EvidencePolicy) -> Self {
        self.evidence_policy = Some(v);
        self
    }

    /// Normalize, validate, and hash the accumulated fields into an
    /// [`SubAgentWorkOrder`] at `open` status.
    pub fn build(self, now: DateTime<Utc>) -> Result<SubAgentWorkOrder, NooterraError> {
        let mut acc = ErrorAccumulator::new();

        let work_order_id = acc
            .absorb(self.work_order_id.ok_or_else(|| missing("workOrderId")))
            .and_then(|v| acc.absorb(bounded_identifier("workOrderId", &v, MAX_ID_LEN)));
        let tenant_id = acc
            .absorb(self.tenant_id.ok_or_else(|| missing("tenantId")))
            .and_then(|v| acc.absorb(bounded_identifier("tenantId", &v, MAX_ID_LEN)));
        let intent_id = acc
            .absorb(self.intent_id.ok_or_else(|| missing("intentId")))
            .and_then(|v| acc.absorb(bounded_identifier("intentId", &v, MAX_ID_LEN)));
        let delegator_agent_id = acc
            .absorb(self.delegator_agent_id.ok_or_else(|| missing("delegatorAgentId")))
            .and_then(|v| acc.absorb(bounded_identifier("delegatorAgentId", &v, MAX_ID_LEN)));
        let worker_agent_id = acc
            .absorb(self.worker_agent_id.ok_or_else(|| missing("workerAgentId")))
            .and_then(|v| acc.absorb(bounded_identifier("workerAgentId", &v, MAX_ID_LEN)));
        let amount_cents = acc.absorb(positive_integer("pricing.amountCents", self.amount_cents));
        let currency_v = acc.absorb(currency("pricing.currency", &self.currency));

        acc.finish()?;

        let mut order = SubAgentWorkOrder {
            work_order_id: work_order_id.unwrap(),
            tenant_id: tenant_id.unwrap(),
            intent_id: intent_id.unwrap(),
            delegator_agent_id: delegator_agent_id.unwrap(),
            worker_agent_id: worker_agent_id.unwrap(),
            pricing: Pricing { model: PricingModel::Fixed, amount_cents: amount_cents.unwrap(), currency: currency_v.unwrap() },
            constraints: self.constraints,
            evidence_policy: self.evidence_policy,
            status: WorkOrderStatus::Open,
            progress_events: Vec::new(),
            settlement: None,
            created_at: now,
            updated_at: now,
            work_order_hash: String::new(),
        };
        order.work_order_hash = order.compute_hash();
        Ok(order)
    }
}

/// Outcome of the delegated task, as reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// The task completed successfully.
    Success,
    /// The task failed.
    Failed,
}

impl CompletionStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl ToCanonical for CompletionStatus {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// Settlement amount the completion receipt quotes for the delegator to
/// pay; bound-checked by [`SubAgentWorkOrder::settle`] against the
/// originating work order's `constraints.maxCostCents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementQuote {
    /// Quoted amount, in cents.
    pub amount_cents: i64,
    /// Currency the quote is denominated in.
    pub currency: String,
}

impl ToCanonical for SettlementQuote {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("amountCents", self.amount_cents.to_canonical()),
            ("currency", self.currency.to_canonical()),
        ])
    }
}

/// `SubAgentCompletionReceipt.v1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAgentCompletionReceipt {
    /// Unique identifier for this receipt.
    pub receipt_id: String,
    /// The work order this completes.
    pub work_order_id: String,
    /// Outcome of the delegated task.
    pub status: CompletionStatus,
    /// Supporting evidence references.
    pub evidence_refs: Vec<String>,
    /// Quoted settlement amount, bound by the work order's cost cap.
    pub settlement_quote: SettlementQuote,
    /// When the receipt was recorded.
    pub created_at: DateTime<Utc>,
    /// Content hash (identity).
    pub receipt_hash: String,
}

impl SubAgentCompletionReceipt {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "SubAgentCompletionReceipt.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("receiptId", self.receipt_id.to_canonical()),
            ("workOrderId", self.work_order_id.to_canonical()),
            ("status", self.status.to_canonical()),
            ("evidenceRefs", self.evidence_refs.to_canonical()),
            ("settlementQuote", self.settlement_quote.to_canonical()),
            ("createdAt", canonical_timestamp(self.created_at).to_canonical()),
            (
                "receiptHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `receiptHash` from the record's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Build a new completion receipt, requiring evidence if the work
    /// order's evidence policy demands it.
    pub fn build(
        receipt_id: impl Into<String>,
        work_order: &SubAgentWorkOrder,
        status: CompletionStatus,
        evidence_refs: Vec<String>,
        settlement_quote: SettlementQuote,
        now: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let mut acc = ErrorAccumulator::new();
        let receipt_id = acc
            .absorb(bounded_identifier("receiptId", &receipt_id.into(), MAX_ID_LEN))
            .unwrap_or_default();
        let amount = acc.absorb(non_negative_integer("settlementQuote.amountCents", settlement_quote.amount_cents));
        let currency_v = acc.absorb(currency("settlementQuote.currency", &settlement_quote.currency));

        if work_order.evidence_policy.as_ref().is_some_and(|p| p.required) && evidence_refs.is_empty() {
            acc.push(
                NooterraError::new(ErrorCode::PayloadInvalid, "evidence is required by the work order's evidence policy")
                    .with_context("field", "evidenceRefs"),
            );
        }
        acc.finish()?;

        let mut receipt = Self {
            receipt_id,
            work_order_id: work_order.work_order_id.clone(),
            status,
            evidence_refs,
            settlement_quote: SettlementQuote { amount_cents: amount.unwrap(), currency: currency_v.unwrap() },
            created_at: now,
            receipt_hash: String::new(),
        };
        receipt.receipt_hash = receipt.compute_hash();
        Ok(receipt)
    }
}

fn missing(field: &str) -> NooterraError {
    NooterraError::new(ErrorCode::PayloadInvalid, "is required").with_context("field", field)
}
