//! A paid-tool invocation scenario spanning the interaction matrix and the
//! governance evaluator: an agent may only address a service (`nooterra-matrix`),
//! and the spend it proposes must clear the tenant's governance template
//! (`nooterra-governance`) before the call is allowed to proceed.

use nooterra_governance::{evaluate, ApprovalTier, GovernanceRequest, GovernanceTemplate, Verdict};
use nooterra_matrix::{is_interaction_allowed, EntityType};

fn template() -> GovernanceTemplate {
    GovernanceTemplate {
        per_action_usd_cents: 10_000,
        monthly_usd_cents: 200_000,
        allowed_data_classes: vec!["public".to_string(), "internal".to_string()],
        allow_external_transfer: false,
        approval_tiers: vec![ApprovalTier { max_amount_usd_cents: 5_000, required_approvers: 1 }],
        require_approval_for_risk_levels: vec!["medium".to_string()],
        auto_block_risk_levels: vec!["critical".to_string()],
    }
    .normalize()
    .expect("template normalizes")
}

#[test]
fn an_agent_may_address_a_service_and_a_modest_spend_is_allowed() {
    assert!(is_interaction_allowed(EntityType::Agent, EntityType::Service));

    let decision = evaluate(
        &template(),
        &GovernanceRequest {
            amount_usd_cents: 4_000,
            monthly_spend_usd_cents: 10_000,
            data_class: "public".to_string(),
            external_transfer: false,
            risk_level: "low".to_string(),
            approvals_provided: 1,
        },
    );
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(decision.reasons.is_empty());
}

#[test]
fn a_service_may_not_address_another_service_regardless_of_governance() {
    assert!(!is_interaction_allowed(EntityType::Service, EntityType::Service));
}

#[test]
fn an_over_tier_spend_without_approval_is_a_challenge_not_a_deny() {
    let decision = evaluate(
        &template(),
        &GovernanceRequest {
            amount_usd_cents: 6_000,
            monthly_spend_usd_cents: 10_000,
            data_class: "public".to_string(),
            external_transfer: false,
            risk_level: "low".to_string(),
            approvals_provided: 0,
        },
    );
    assert_eq!(decision.verdict, Verdict::Challenge);
}

#[test]
fn an_external_transfer_the_template_disallows_is_always_a_deny() {
    let decision = evaluate(
        &template(),
        &GovernanceRequest {
            amount_usd_cents: 1_000,
            monthly_spend_usd_cents: 1_000,
            data_class: "public".to_string(),
            external_transfer: true,
            risk_level: "low".to_string(),
            approvals_provided: 0,
        },
    );
    assert_eq!(decision.verdict, Verdict::Deny);
}
