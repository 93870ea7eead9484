//! `AuthorityGrant.v1`: the root authorization record every delegated
//! action in the substrate traces back to, plus the pure trust evaluator
//! that turns a grant + timestamp into an allow/deny decision.

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorAccumulator, ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, currency, non_negative_integer};
use serde::{Deserialize, Serialize};

use crate::common::RiskClass;

const MAX_ID_LEN: usize = 128;

/// The kind of entity a grant's authority ultimately traces back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    /// A human user.
    Human,
    /// An organization.
    Org,
    /// An automated service account.
    Service,
    /// An autonomous agent.
    Agent,
}

impl PrincipalType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Org => "org",
            Self::Service => "service",
            Self::Agent => "agent",
        }
    }
}

impl ToCanonical for PrincipalType {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// The entity on whose behalf a grant's authority originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRef {
    /// Kind of principal.
    pub principal_type: PrincipalType,
    /// Identifier of the principal within its namespace.
    pub principal_id: String,
}

impl ToCanonical for PrincipalRef {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("principalType", self.principal_type.to_canonical()),
            ("principalId", self.principal_id.to_canonical()),
        ])
    }
}

/// What a grant's grantee is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantScope {
    /// Risk classes covered by this grant; non-empty, deduped, code-point sorted.
    pub allowed_risk_classes: Vec<RiskClass>,
    /// Whether the grantee may take side-effecting actions at all.
    pub side_effecting_allowed: bool,
    /// Optional allow-list of provider ids this grant is restricted to.
    pub allowed_provider_ids: Option<Vec<String>>,
    /// Optional allow-list of tool ids this grant is restricted to.
    pub allowed_tool_ids: Option<Vec<String>>,
}

impl ToCanonical for GrantScope {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            (
                "allowedRiskClasses",
                CanonicalValue::array(self.allowed_risk_classes.iter().map(ToCanonical::to_canonical)),
            ),
            ("sideEffectingAllowed", self.side_effecting_allowed.to_canonical()),
            ("allowedProviderIds", self.allowed_provider_ids.to_canonical()),
            ("allowedToolIds", self.allowed_tool_ids.to_canonical()),
        ])
    }
}

/// Per-call and total spend caps a grant authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendEnvelope {
    /// ISO 4217-shaped currency code.
    pub currency: String,
    /// Maximum cents spendable in a single call.
    pub max_per_call_cents: i64,
    /// Maximum cents spendable across the grant's lifetime.
    pub max_total_cents: i64,
}

impl ToCanonical for SpendEnvelope {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("currency", self.currency.to_canonical()),
            ("maxPerCallCents", self.max_per_call_cents.to_canonical()),
            ("maxTotalCents", self.max_total_cents.to_canonical()),
        ])
    }
}

/// Delegation-chain position of a grant: where it sits relative to its
/// root and its immediate parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBinding {
    /// Hash of the root grant of this delegation chain.
    pub root_grant_hash: String,
    /// Hash of the immediate parent grant, or `None` at depth 0.
    pub parent_grant_hash: Option<String>,
    /// Depth of this grant within its delegation chain (0 = root).
    pub depth: u32,
    /// Maximum delegation depth this chain permits; must be `>= depth`.
    pub max_delegation_depth: u32,
}

impl ToCanonical for ChainBinding {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("rootGrantHash", self.root_grant_hash.to_canonical()),
            ("parentGrantHash", self.parent_grant_hash.to_canonical()),
            ("depth", i64::from(self.depth).to_canonical()),
            ("maxDelegationDepth", i64::from(self.max_delegation_depth).to_canonical()),
        ])
    }
}

/// The window of time during which a grant is, absent revocation, valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    /// When the grant was issued.
    pub issued_at: DateTime<Utc>,
    /// Earliest instant the grant may be relied on.
    pub not_before: DateTime<Utc>,
    /// Instant at which the grant stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl ToCanonical for Validity {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("issuedAt", canonical_timestamp(self.issued_at).to_canonical()),
            ("notBefore", canonical_timestamp(self.not_before).to_canonical()),
            ("expiresAt", canonical_timestamp(self.expires_at).to_canonical()),
        ])
    }
}

/// The revocation sub-block, kept as its own small value type so a grant
/// or attestation can mutate only this block when revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Revocation {
    /// Whether this record may ever be revoked.
    pub revocable: bool,
    /// When the record was revoked, if it has been.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Why the record was revoked, required whenever `revoked_at` is set.
    pub revocation_reason_code: Option<String>,
}

impl ToCanonical for Revocation {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("revocable", self.revocable.to_canonical()),
            (
                "revokedAt",
                self.revoked_at.map(canonical_timestamp).to_canonical(),
            ),
            ("revocationReasonCode", self.revocation_reason_code.to_canonical()),
        ])
    }
}

/// `AuthorityGrant.v1` — the root authorization record for delegated action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityGrant {
    /// Unique identifier for this grant.
    pub grant_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The entity this grant's authority ultimately comes from.
    pub principal_ref: PrincipalRef,
    /// The agent this grant authorizes to act.
    pub grantee_agent_id: String,
    /// What the grantee is allowed to do.
    pub scope: GrantScope,
    /// Spend caps.
    pub spend_envelope: SpendEnvelope,
    /// Delegation-chain position.
    pub chain_binding: ChainBinding,
    /// Validity window.
    pub validity: Validity,
    /// Revocation state.
    pub revocation: Revocation,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
    /// When this grant record was created.
    pub created_at: DateTime<Utc>,
    /// Content hash of this grant (identity).
    pub grant_hash: String,
}

impl AuthorityGrant {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "AuthorityGrant.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("grantId", self.grant_id.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("principalRef", self.principal_ref.to_canonical()),
            ("granteeAgentId", self.grantee_agent_id.to_canonical()),
            ("scope", self.scope.to_canonical()),
            ("spendEnvelope", self.spend_envelope.to_canonical()),
            ("chainBinding", self.chain_binding.to_canonical()),
            ("validity", self.validity.to_canonical()),
            ("revocation", self.revocation.to_canonical()),
            ("metadata", self.metadata.to_canonical()),
            ("createdAt", canonical_timestamp(self.created_at).to_canonical()),
            (
                "grantHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `grantHash` from the record's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify `grantHash` matches the record's current fields.
    #[tracing::instrument(skip(self), fields(grant_id = %self.grant_id))]
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.grant_hash {
            tracing::debug!(target: "nooterra_records", grant_id = %self.grant_id, "grantHash mismatch");
            return Err(NooterraError::new(
                ErrorCode::AuthorityGrantHashMismatch,
                "recomputed grantHash does not match the declared value",
            )
            .with_context("expected", self.grant_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Compute the root-grant seed hash for a depth-0 grant:
    /// `sha256(canonical({schema:"AuthorityGrantRootSeed.v1", tenantId, grantId, principalRef, granteeAgentId}))`.
    #[must_use]
    pub fn root_seed_hash(
        tenant_id: &str,
        grant_id: &str,
        principal_ref: &PrincipalRef,
        grantee_agent_id: &str,
    ) -> String {
        let body = CanonicalValue::object([
            ("schema", "AuthorityGrantRootSeed.v1".to_canonical()),
            ("tenantId", tenant_id.to_canonical()),
            ("grantId", grant_id.to_canonical()),
            ("principalRef", principal_ref.to_canonical()),
            ("granteeAgentId", grantee_agent_id.to_canonical()),
        ]);
        hash_canonical(&body)
    }

    /// Produce a new grant with only the `revocation` block replaced,
    /// recomputing `grantHash`. Every other field is untouched.
    #[must_use]
    #[tracing::instrument(skip(self, reason_code), fields(grant_id = %self.grant_id))]
    pub fn revoke(&self, revoked_at: DateTime<Utc>, reason_code: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.revocation.revoked_at = Some(revoked_at);
        next.revocation.revocation_reason_code = Some(reason_code.into());
        next.grant_hash = next.compute_hash();
        tracing::debug!(target: "nooterra_records", grant_id = %self.grant_id, "authority grant revoked");
        next
    }
}

/// Accumulating builder for [`AuthorityGrant`].
#[derive(Debug, Default)]
pub struct AuthorityGrantBuilder {
    grant_id: Option<String>,
    tenant_id: Option<String>,
    principal_ref: Option<PrincipalRef>,
    grantee_agent_id: Option<String>,
    allowed_risk_classes: Vec<RiskClass>,
    side_effecting_allowed: bool,
    allowed_provider_ids: Option<Vec<String>>,
    allowed_tool_ids: Option<Vec<String>>,
    currency: String,
    max_per_call_cents: i64,
    max_total_cents: i64,
    parent: Option<(String, u32)>,
    max_delegation_depth: u32,
    issued_at: Option<DateTime<Utc>>,
    not_before: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    revocable: bool,
    metadata: Option<serde_json::Value>,
}

impl AuthorityGrantBuilder {
    /// Start a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self { side_effecting_allowed: false, revocable: true, ..Default::default() }
    }

    /// Set the grant id.
    #[must_use]
    pub fn grant_id(mut self, v: impl Into<String>) -> Self {
        self.grant_id = Some(v.into());
        self
    }

    /// Set the tenant id.
    #[must_use]
    pub fn tenant_id(mut self, v: impl Into<String>) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Set the principal this grant's authority comes from.
    #[must_use]
    pub fn principal_ref(mut self, v: PrincipalRef) -> Self {
        self.principal_ref = Some(v);
        self
    }

    /// Set the agent this grant authorizes.
    #[must_use]
    pub fn grantee_agent_id(mut self, v: impl Into<String>) -> Self {
        self.grantee_agent_id = Some(v.into());
        self
    }

    /// Add an allowed risk class.
    #[must_use]
    pub fn allow_risk_class(mut self, rc: RiskClass) -> Self {
        self.allowed_risk_classes.push(rc);
        self
    }

    /// Set whether side-effecting actions are allowed.
    #[must_use]
    pub fn side_effecting_allowed(mut self, v: bool) -> Self {
        self.side_effecting_allowed = v;
        self
    }

    /// Restrict this grant to a set of provider ids.
    #[must_use]
    pub fn allowed_provider_ids(mut self, v: Vec<String>) -> Self {
        self.allowed_provider_ids = Some(v);
        self
    }

    /// Restrict this grant to a set of tool ids.
    #[must_use]
    pub fn allowed_tool_ids(mut self, v: Vec<String>) -> Self {
        self.allowed_tool_ids = Some(v);
        self
    }

    /// Set the spend envelope.
    #[must_use]
    pub fn spend_envelope(mut self, currency: impl Into<String>, max_per_call_cents: i64, max_total_cents: i64) -> Self {
        self.currency = currency.into();
        self.max_per_call_cents = max_per_call_cents;
        self.max_total_cents = max_total_cents;
        self
    }

    /// Bind this grant as a delegation child of `parent_grant_hash` at `depth`.
    #[must_use]
    pub fn delegated_from(mut self, parent_grant_hash: impl Into<String>, depth: u32) -> Self {
        self.parent = Some((parent_grant_hash.into(), depth));
        self
    }

    /// Maximum delegation depth this chain permits.
    #[must_use]
    pub fn max_delegation_depth(mut self, v: u32) -> Self {
        self.max_delegation_depth = v;
        self
    }

    /// Set the validity window.
    #[must_use]
    pub fn validity(mut self, issued_at: DateTime<Utc>, not_before: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self.not_before = Some(not_before);
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether this grant may ever be revoked.
    #[must_use]
    pub fn revocable(mut self, v: bool) -> Self {
        self.revocable = v;
        self
    }

    /// Attach arbitrary metadata.
    #[must_use]
    pub fn metadata(mut self, v: serde_json::Value) -> Self {
        self.metadata = Some(v);
        self
    }

    /// Normalize, validate, and hash the accumulated fields into an
    /// [`AuthorityGrant`], stamping `created_at` as `now`.
    pub fn build(self, now: DateTime<Utc>) -> Result<AuthorityGrant, NooterraError> {
        let mut acc = ErrorAccumulator::new();

        let grant_id = acc
            .absorb(self.grant_id.ok_or_else(|| missing("grantId")))
            .and_then(|v| acc.absorb(bounded_identifier("grantId", &v, MAX_ID_LEN)));
        let tenant_id = acc
            .absorb(self.tenant_id.ok_or_else(|| missing("tenantId")))
            .and_then(|v| acc.absorb(bounded_identifier("tenantId", &v, MAX_ID_LEN)));
        let grantee_agent_id = acc
            .absorb(self.grantee_agent_id.ok_or_else(|| missing("granteeAgentId")))
            .and_then(|v| acc.absorb(bounded_identifier("granteeAgentId", &v, MAX_ID_LEN)));
        let principal_ref = acc.absorb(self.principal_ref.ok_or_else(|| missing("principalRef")));

        let mut risk_codes: Vec<String> = self
            .allowed_risk_classes
            .iter()
            .map(|rc| serde_json::to_value(rc).unwrap().as_str().unwrap().to_string())
            .collect();
        risk_codes.sort();
        risk_codes.dedup();
        if risk_codes.is_empty() {
            acc.push(missing_field("scope.allowedRiskClasses", "must not be empty"));
        }
        let allowed_risk_classes: Vec<RiskClass> = risk_codes
            .iter()
            .map(|code| serde_json::from_value(serde_json::Value::String(code.clone())).unwrap())
            .collect();

        let currency_v = acc.absorb(currency("spendEnvelope.currency", &self.currency));
        let max_per_call = acc.absorb(non_negative_integer("spendEnvelope.maxPerCallCents", self.max_per_call_cents));
        let max_total = acc.absorb(non_negative_integer("spendEnvelope.maxTotalCents", self.max_total_cents));

        let issued_at = acc.absorb(self.issued_at.ok_or_else(|| missing("validity.issuedAt")));
        let not_before = acc.absorb(self.not_before.ok_or_else(|| missing("validity.notBefore")));
        let expires_at = acc.absorb(self.expires_at.ok_or_else(|| missing("validity.expiresAt")));
        if let (Some(i), Some(n), Some(e)) = (issued_at, not_before, expires_at) {
            if !(i <= n && n < e) {
                acc.push(missing_field(
                    "validity",
                    "must satisfy issuedAt <= notBefore < expiresAt",
                ));
            }
        }

        let depth = self.parent.as_ref().map_or(0, |(_, d)| *d);
        if self.max_delegation_depth < depth {
            acc.push(missing_field(
                "chainBinding.maxDelegationDepth",
                "must be >= depth",
            ));
        }
        if depth == 0 && self.parent.is_some() {
            acc.push(missing_field("chainBinding.parentGrantHash", "must be null at depth 0"));
        }

        acc.finish()?;

        let grant_id = grant_id.unwrap();
        let tenant_id = tenant_id.unwrap();
        let grantee_agent_id = grantee_agent_id.unwrap();
        let principal_ref = principal_ref.unwrap();
        let root_grant_hash = AuthorityGrant::root_seed_hash(&tenant_id, &grant_id, &principal_ref, &grantee_agent_id);
        let (parent_grant_hash, parent_depth) = match self.parent {
            Some((hash, d)) => (Some(hash), d),
            None => (None, 0),
        };
        let _ = parent_depth;

        let mut grant = AuthorityGrant {
            grant_id,
            tenant_id,
            principal_ref,
            grantee_agent_id,
            scope: GrantScope {
                allowed_risk_classes,
                side_effecting_allowed: self.side_effecting_allowed,
                allowed_provider_ids: self.allowed_provider_ids,
                allowed_tool_ids: self.allowed_tool_ids,
            },
            spend_envelope: SpendEnvelope {
                currency: currency_v.unwrap(),
                max_per_call_cents: max_per_call.unwrap(),
                max_total_cents: max_total.unwrap(),
            },
            chain_binding: ChainBinding {
                root_grant_hash,
                parent_grant_hash,
                depth,
                max_delegation_depth: self.max_delegation_depth,
            },
            validity: Validity {
                issued_at: issued_at.unwrap(),
                not_before: not_before.unwrap(),
                expires_at: expires_at.unwrap(),
            },
            revocation: Revocation { revocable: self.revocable, revoked_at: None, revocation_reason_code: None },
            metadata: self.metadata,
            created_at: now,
            grant_hash: String::new(),
        };
        grant.grant_hash = grant.compute_hash();
        Ok(grant)
    }
}

fn missing(field: &str) -> NooterraError {
    missing_field(field, "is required")
}

fn missing_field(field: &str, detail: &str) -> NooterraError {
    NooterraError::new(ErrorCode::PayloadInvalid, detail).with_context("field", field)
}

/// Outcome of evaluating whether an operation an agent is attempting is
/// covered by a grant at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// A read-only operation.
    Read,
    /// An operation with write/side effects.
    Write,
}

/// The lifecycle state of a grant at the evaluated instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustState {
    /// Revoked without a reason code: an ambiguous, inherently-invalid state.
    Ambiguous,
    /// Currently valid and unrevoked.
    Active,
    /// Valid window has not yet started.
    NotYetActive,
    /// Valid window has ended.
    Expired,
    /// Revoked, and the revocation has already taken effect.
    Revoked,
    /// Revoked, but the revocation instant is still in the future.
    RevokedPending,
}

impl TrustState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ambiguous => "AMBIGUOUS",
            Self::Active => "ACTIVE",
            Self::NotYetActive => "NOT_YET_ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::RevokedPending => "REVOKED_PENDING",
        }
    }
}

/// Outcome of [`evaluate_trust`]: a value, never an error, per the
/// policy/trust values-vs-errors split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecision {
    /// Lifecycle state of the grant at the evaluated instant.
    pub trust_state: TrustState,
    /// Stable reason code explaining the decision.
    pub reason_code: String,
    /// Whether a read is currently allowed.
    pub read_allowed: bool,
    /// Whether a write is currently allowed.
    pub write_allowed: bool,
    /// Whether any allowed read is only a historical-verification read.
    pub historical_verification_only: bool,
}

/// Evaluate a grant's trust state and the read/write rights it implies at
/// instant `at`, per SPEC_FULL.md §4.3.
#[must_use]
pub fn evaluate_trust(
    grant: &AuthorityGrant,
    at: DateTime<Utc>,
    evidence_at: Option<DateTime<Utc>>,
    operation: Operation,
) -> TrustDecision {
    let revocation = &grant.revocation;
    let validity = &grant.validity;

    if revocation.revoked_at.is_some() && revocation.revocation_reason_code.is_none() {
        return TrustDecision {
            trust_state: TrustState::Ambiguous,
            reason_code: "REVOCATION_REASON_REQUIRED".to_string(),
            read_allowed: false,
            write_allowed: false,
            historical_verification_only: false,
        };
    }

    let trust_state = if revocation.revoked_at.is_some_and(|r| r <= at) {
        TrustState::Revoked
    } else if at < validity.not_before {
        TrustState::NotYetActive
    } else if at >= validity.expires_at {
        TrustState::Expired
    } else if revocation.revoked_at.is_some() {
        TrustState::RevokedPending
    } else {
        TrustState::Active
    };

    let write_allowed = matches!(trust_state, TrustState::Active | TrustState::RevokedPending);
    let mut read_allowed = write_allowed;
    let mut historical_verification_only = false;
    let mut reason_code = trust_state.as_str().to_string();

    if operation == Operation::Read && !write_allowed {
        let window_end = [Some(validity.expires_at), revocation.revoked_at, Some(at)]
            .into_iter()
            .flatten()
            .min()
            .unwrap();
        match evidence_at {
            Some(ev) if validity.not_before <= ev && ev < window_end => {
                read_allowed = true;
                historical_verification_only = true;
                reason_code = "HISTORICAL_READ_ALLOWED".to_string();
            }
            Some(_) => {
                reason_code = "HISTORICAL_READ_OUTSIDE_WINDOW".to_string();
            }
            None => {
                reason_code = "HISTORICAL_READ_EVIDENCE_REQUIRED".to_string();
            }
        }
    }

    TrustDecision {
        trust_state,
        reason_code,
        read_allowed,
        write_allowed,
        historical_verification_only,
    }
}
