//! A delegated grantee reading a shared session memory, driven through a
//! real `AuthorityGrant` built with `nooterra-records` and evaluated by
//! `nooterra-session-policy` rather than a hand-rolled stand-in grant.

use chrono::{DateTime, TimeZone, Utc};
use nooterra_records::{AuthorityGrantBuilder, PrincipalRef, PrincipalType, RiskClass};
use nooterra_session_policy::{evaluate, AccessScope, RequesterRelation, Visibility};

fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

#[test]
fn a_delegated_grantee_reads_within_the_grant_window_then_loses_access_after_expiry() {
    let grant = AuthorityGrantBuilder::new()
        .grant_id("grant-analyst-access")
        .tenant_id("tenant-acme")
        .principal_ref(PrincipalRef {
            principal_type: PrincipalType::Human,
            principal_id: "owner-1".to_string(),
        })
        .grantee_agent_id("agent-analyst")
        .allow_risk_class(RiskClass::Read)
        .spend_envelope("USD", 100, 1000)
        .max_delegation_depth(0)
        .validity(dt(2025, 1, 1), dt(2025, 1, 1), dt(2025, 6, 1))
        .build(dt(2025, 1, 1))
        .expect("grant builds");

    let within_window = evaluate(
        RequesterRelation::DelegatedGrantee,
        Visibility::Delegated,
        Some(&grant),
        dt(2025, 3, 1),
        None,
    );
    assert!(within_window.allowed);
    assert_eq!(within_window.scope, AccessScope::DelegatedActive);

    // Past expiry, with no historical-verification evidence offered, the
    // same grant no longer authorizes a read.
    let after_expiry = evaluate(
        RequesterRelation::DelegatedGrantee,
        Visibility::Delegated,
        Some(&grant),
        dt(2025, 7, 1),
        None,
    );
    assert!(!after_expiry.allowed);

    // Offering evidence timestamped inside the original window still
    // supports a historical read after expiry.
    let historical = evaluate(
        RequesterRelation::DelegatedGrantee,
        Visibility::Delegated,
        Some(&grant),
        dt(2025, 7, 1),
        Some(dt(2025, 3, 1)),
    );
    assert!(historical.allowed);
    assert_eq!(historical.scope, AccessScope::DelegatedHistorical);
}

#[test]
fn an_unrelated_requester_never_reads_a_delegated_visibility_memory_without_a_grant() {
    let decision = evaluate(
        RequesterRelation::Unrelated,
        Visibility::Delegated,
        None,
        dt(2025, 3, 1),
        None,
    );
    assert!(!decision.allowed);
}
