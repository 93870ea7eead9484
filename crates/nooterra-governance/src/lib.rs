//! Pure governance policy template evaluator: `(template, request) ->
//! allow/challenge/deny`.
//!
//! Every check in [`evaluate`] runs to completion and contributes a
//! [`ReasonCode`] to a single accumulated `Vec` before classification —
//! the same accumulate-then-classify shape `nooterra-error`'s
//! `ErrorAccumulator` uses for record validation, reapplied here to a
//! pure outcome *value* rather than a `Result`, since governance
//! decisions are recoverable policy outcomes, never contract
//! violations (SPEC_FULL.md §7). A fixed subset of the collected codes
//! forces `deny`; any other blocking issue yields `challenge`; an empty
//! accumulation yields `allow`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::dedup_sorted;
use serde::{Deserialize, Serialize};

/// A monotonic approval tier: amounts up to `max_amount_usd_cents`
/// require at least `required_approvers` approvals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTier {
    /// Upper bound (inclusive) this tier covers, in USD cents.
    pub max_amount_usd_cents: i64,
    /// Minimum number of approvals an action at this amount requires.
    pub required_approvers: u32,
}

/// A normalized governance policy template.
///
/// Tiers are kept sorted by `max_amount_usd_cents` ascending so the
/// first tier whose bound is `>= amount` is always the tightest one
/// that applies; risk-level sets and data classes are deduped and
/// code-point sorted per the workspace-wide sequence-ordering rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceTemplate {
    /// Maximum spend allowed for a single action, in USD cents.
    pub per_action_usd_cents: i64,
    /// Maximum cumulative spend allowed in a rolling month, in USD cents.
    pub monthly_usd_cents: i64,
    /// Data classes a request is permitted to touch.
    pub allowed_data_classes: Vec<String>,
    /// Whether external transfers are permitted at all.
    pub allow_external_transfer: bool,
    /// Ascending approval tiers by spend amount.
    pub approval_tiers: Vec<ApprovalTier>,
    /// Risk levels that require at least one approval.
    pub require_approval_for_risk_levels: Vec<String>,
    /// Risk levels that are never allowed, regardless of approvals.
    pub auto_block_risk_levels: Vec<String>,
}

impl GovernanceTemplate {
    /// Normalize a raw template: dedup/sort the set-valued fields and
    /// sort approval tiers by ascending bound.
    pub fn normalize(mut self) -> Result<Self, NooterraError> {
        self.allowed_data_classes = dedup_sorted(&self.allowed_data_classes);
        self.require_approval_for_risk_levels = dedup_sorted(&self.require_approval_for_risk_levels);
        self.auto_block_risk_levels = dedup_sorted(&self.auto_block_risk_levels);
        self.approval_tiers.sort_by_key(|t| t.max_amount_usd_cents);
        Ok(self)
    }
}

/// A single governance request to be evaluated against a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceRequest {
    /// Spend amount of this single action, in USD cents.
    pub amount_usd_cents: i64,
    /// Spend already consumed this month, prior to this action.
    pub monthly_spend_usd_cents: i64,
    /// Data class this request touches.
    pub data_class: String,
    /// Whether this request is an external transfer.
    pub external_transfer: bool,
    /// Risk level this request is classified at.
    pub risk_level: String,
    /// Number of approvals already collected for this request.
    pub approvals_provided: u32,
}

/// A stable reason code a blocking check contributed to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Single-action spend exceeded `perActionUsdCents`.
    PerActionLimitExceeded,
    /// Cumulative monthly spend would exceed `monthlyUsdCents`.
    MonthlyLimitExceeded,
    /// `dataClass` is not in the template's allow-list.
    DataClassNotAllowed,
    /// External transfer requested but not permitted.
    ExternalTransferNotAllowed,
    /// No approval tier is satisfied by the amount and approvals provided.
    ApprovalTierNotSatisfied,
    /// Risk level requires at least one approval that was not provided.
    ApprovalRequiredForRiskLevel,
    /// Risk level is in the template's auto-block set.
    RiskLevelBlocked,
}

impl ReasonCode {
    /// The reason codes that force a `deny` outcome regardless of
    /// whatever else was also collected. Everything else that blocks is
    /// a `challenge`.
    const DENY_CODES: &'static [ReasonCode] =
        &[ReasonCode::RiskLevelBlocked, ReasonCode::ExternalTransferNotAllowed];

    fn is_deny_class(self) -> bool {
        Self::DENY_CODES.contains(&self)
    }

    /// The matching [`ErrorCode`] in the shared taxonomy, for callers
    /// that want to surface this as a typed error rather than a value.
    #[must_use]
    pub const fn error_code(self) -> ErrorCode {
        match self {
            Self::PerActionLimitExceeded => ErrorCode::PerActionLimitExceeded,
            Self::MonthlyLimitExceeded => ErrorCode::MonthlyLimitExceeded,
            Self::DataClassNotAllowed => ErrorCode::DataClassNotAllowed,
            Self::ExternalTransferNotAllowed => ErrorCode::ExternalTransferNotAllowed,
            Self::ApprovalTierNotSatisfied => ErrorCode::ApprovalTierNotSatisfied,
            Self::ApprovalRequiredForRiskLevel => ErrorCode::ApprovalRequiredForRiskLevel,
            Self::RiskLevelBlocked => ErrorCode::RiskLevelBlocked,
        }
    }
}

/// The three-way outcome of a governance evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No blocking issues were found.
    Allow,
    /// At least one blocking issue was found, none of them deny-class.
    Challenge,
    /// At least one deny-class blocking issue was found.
    Deny,
}

/// Full result of [`evaluate`]: the verdict plus every reason code that
/// contributed to it, in the order the checks ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceDecision {
    /// The three-way verdict.
    pub verdict: Verdict,
    /// Every blocking reason code collected, in check order.
    pub reasons: Vec<ReasonCode>,
}

/// Evaluate `request` against `template`, collecting every blocking
/// issue before classifying. Deterministic for the same inputs.
#[must_use]
#[tracing::instrument(skip(template, request))]
pub fn evaluate(template: &GovernanceTemplate, request: &GovernanceRequest) -> GovernanceDecision {
    let mut reasons = Vec::new();

    if request.amount_usd_cents > template.per_action_usd_cents {
        reasons.push(ReasonCode::PerActionLimitExceeded);
    }
    if request.monthly_spend_usd_cents + request.amount_usd_cents > template.monthly_usd_cents {
        reasons.push(ReasonCode::MonthlyLimitExceeded);
    }
    if !template
        .allowed_data_classes
        .iter()
        .any(|c| c == &request.data_class)
    {
        reasons.push(ReasonCode::DataClassNotAllowed);
    }
    if request.external_transfer && !template.allow_external_transfer {
        reasons.push(ReasonCode::ExternalTransferNotAllowed);
    }

    let tier_satisfied = template
        .approval_tiers
        .iter()
        .find(|t| request.amount_usd_cents <= t.max_amount_usd_cents)
        .is_some_and(|t| request.approvals_provided >= t.required_approvers);
    if !tier_satisfied {
        reasons.push(ReasonCode::ApprovalTierNotSatisfied);
    }

    if template
        .require_approval_for_risk_levels
        .iter()
        .any(|r| r == &request.risk_level)
        && request.approvals_provided < 1
    {
        reasons.push(ReasonCode::ApprovalRequiredForRiskLevel);
    }

    if template
        .auto_block_risk_levels
        .iter()
        .any(|r| r == &request.risk_level)
    {
        reasons.push(ReasonCode::RiskLevelBlocked);
    }

    let verdict = if reasons.iter().any(|r| r.is_deny_class()) {
        Verdict::Deny
    } else if reasons.is_empty() {
        Verdict::Allow
    } else {
        Verdict::Challenge
    };

    tracing::debug!(target: "nooterra_governance", ?verdict, reason_count = reasons.len(), "governance decision computed");
    GovernanceDecision { verdict, reasons }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> GovernanceTemplate {
        GovernanceTemplate {
            per_action_usd_cents: 10_000,
            monthly_usd_cents: 100_000,
            allowed_data_classes: vec!["public".to_string(), "internal".to_string()],
            allow_external_transfer: false,
            approval_tiers: vec![
                ApprovalTier { max_amount_usd_cents: 1_000, required_approvers: 0 },
                ApprovalTier { max_amount_usd_cents: 10_000, required_approvers: 1 },
            ],
            require_approval_for_risk_levels: vec!["medium".to_string()],
            auto_block_risk_levels: vec!["critical".to_string()],
        }
        .normalize()
        .unwrap()
    }

    fn request() -> GovernanceRequest {
        GovernanceRequest {
            amount_usd_cents: 500,
            monthly_spend_usd_cents: 0,
            data_class: "public".to_string(),
            external_transfer: false,
            risk_level: "low".to_string(),
            approvals_provided: 0,
        }
    }

    #[test]
    fn clean_request_is_allowed() {
        let decision = evaluate(&template(), &request());
        assert_eq!(decision.verdict, Verdict::Allow);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn auto_block_risk_level_is_a_deny() {
        let mut req = request();
        req.risk_level = "critical".to_string();
        let decision = evaluate(&template(), &req);
        assert_eq!(decision.verdict, Verdict::Deny);
        assert!(decision.reasons.contains(&ReasonCode::RiskLevelBlocked));
    }

    #[test]
    fn external_transfer_without_permission_is_a_deny() {
        let mut req = request();
        req.external_transfer = true;
        let decision = evaluate(&template(), &req);
        assert_eq!(decision.verdict, Verdict::Deny);
        assert!(decision.reasons.contains(&ReasonCode::ExternalTransferNotAllowed));
    }

    #[test]
    fn over_per_action_limit_without_deny_class_is_a_challenge() {
        let mut req = request();
        req.amount_usd_cents = 50_000;
        let decision = evaluate(&template(), &req);
        assert_eq!(decision.verdict, Verdict::Challenge);
        assert!(decision.reasons.contains(&ReasonCode::PerActionLimitExceeded));
        assert!(decision.reasons.contains(&ReasonCode::ApprovalTierNotSatisfied));
    }

    #[test]
    fn monthly_limit_is_checked_against_prior_spend_plus_amount() {
        let mut req = request();
        req.monthly_spend_usd_cents = 99_900;
        req.amount_usd_cents = 200;
        let decision = evaluate(&template(), &req);
        assert!(decision.reasons.contains(&ReasonCode::MonthlyLimitExceeded));
    }

    #[test]
    fn data_class_outside_allow_list_blocks() {
        let mut req = request();
        req.data_class = "restricted".to_string();
        let decision = evaluate(&template(), &req);
        assert!(decision.reasons.contains(&ReasonCode::DataClassNotAllowed));
    }

    #[test]
    fn medium_risk_requires_at_least_one_approval() {
        let mut req = request();
        req.risk_level = "medium".to_string();
        req.approvals_provided = 0;
        let decision = evaluate(&template(), &req);
        assert!(decision.reasons.contains(&ReasonCode::ApprovalRequiredForRiskLevel));

        req.approvals_provided = 1;
        let decision = evaluate(&template(), &req);
        assert!(!decision.reasons.contains(&ReasonCode::ApprovalRequiredForRiskLevel));
    }

    #[test]
    fn approval_tier_requires_matching_approver_count() {
        let mut req = request();
        req.amount_usd_cents = 5_000;
        req.approvals_provided = 0;
        let decision = evaluate(&template(), &req);
        assert!(decision.reasons.contains(&ReasonCode::ApprovalTierNotSatisfied));

        req.approvals_provided = 1;
        let decision = evaluate(&template(), &req);
        assert!(!decision.reasons.contains(&ReasonCode::ApprovalTierNotSatisfied));
    }

    #[test]
    fn decisions_are_deterministic() {
        let t = template();
        let r = request();
        assert_eq!(evaluate(&t, &r), evaluate(&t, &r));
    }
}
