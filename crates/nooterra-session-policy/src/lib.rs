//! Session-memory access policy evaluator: pure scope resolution for
//! personal / team / delegated reads (SPEC_FULL.md §4.10).
//!
//! Each visibility level names the least-privileged requester relation
//! that satisfies it; a more privileged relation always satisfies a
//! less demanding visibility. The delegated case is the one that
//! carries real authorization weight: it reuses
//! `nooterra_records::evaluate_trust` rather than re-deriving grant
//! lifecycle logic, so a delegated read is only allowed when the
//! presented grant both covers the `read` risk class and is currently
//! trust-state `ACTIVE` or historically verifiable.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use nooterra_records::{evaluate_trust, AuthorityGrant, Operation, RiskClass};
use serde::{Deserialize, Serialize};

/// The requester's relationship to the memory's owning agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequesterRelation {
    /// The requester is the memory's own owning agent.
    Owner,
    /// The requester is a member of the owner's team.
    TeamMember,
    /// The requester holds a delegated `AuthorityGrant` from the owner.
    DelegatedGrantee,
    /// No recognized relationship to the owner.
    Unrelated,
}

/// The visibility a session memory was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Readable only by the owning agent itself.
    Personal,
    /// Readable by the owning agent and its team members.
    Team,
    /// Readable by the above, plus a delegated grantee holding a valid grant.
    Delegated,
}

/// The scope a successful read was granted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    /// Unrestricted read as the memory's own owner.
    Full,
    /// Read as a team member of the owner.
    TeamShared,
    /// Read as a delegated grantee, currently within the grant's active window.
    DelegatedActive,
    /// Read as a delegated grantee, only via historical-verification evidence.
    DelegatedHistorical,
    /// No read was granted.
    None,
}

/// Outcome of [`evaluate`]: a value, never an error, per the
/// policy/trust values-vs-errors split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMemoryAccessDecision {
    /// Whether the read is permitted.
    pub allowed: bool,
    /// The scope the read was granted under.
    pub scope: AccessScope,
    /// Stable reason code explaining the decision.
    pub reason_code: String,
}

impl SessionMemoryAccessDecision {
    fn denied(reason_code: impl Into<String>) -> Self {
        Self { allowed: false, scope: AccessScope::None, reason_code: reason_code.into() }
    }
}

/// Evaluate whether `relation` may read a session memory declared with
/// `visibility`. For the `Delegated` visibility with a `DelegatedGrantee`
/// relation, `grant`/`at`/`evidence_at` drive a reused
/// [`evaluate_trust`] call; they are ignored for every other
/// relation/visibility combination.
#[must_use]
#[tracing::instrument(skip(grant, at, evidence_at), fields(?relation, ?visibility))]
pub fn evaluate(
    relation: RequesterRelation,
    visibility: Visibility,
    grant: Option<&AuthorityGrant>,
    at: DateTime<Utc>,
    evidence_at: Option<DateTime<Utc>>,
) -> SessionMemoryAccessDecision {
    if relation == RequesterRelation::Owner {
        return SessionMemoryAccessDecision {
            allowed: true,
            scope: AccessScope::Full,
            reason_code: "OWNER_READ_ALLOWED".to_string(),
        };
    }

    match visibility {
        Visibility::Personal => {
            SessionMemoryAccessDecision::denied("SESSION_MEMORY_ACCESS_DENIED")
        }
        Visibility::Team => {
            if relation == RequesterRelation::TeamMember {
                SessionMemoryAccessDecision {
                    allowed: true,
                    scope: AccessScope::TeamShared,
                    reason_code: "TEAM_READ_ALLOWED".to_string(),
                }
            } else {
                SessionMemoryAccessDecision::denied("SESSION_MEMORY_ACCESS_DENIED")
            }
        }
        Visibility::Delegated => match relation {
            RequesterRelation::TeamMember => SessionMemoryAccessDecision {
                allowed: true,
                scope: AccessScope::TeamShared,
                reason_code: "TEAM_READ_ALLOWED".to_string(),
            },
            RequesterRelation::DelegatedGrantee => {
                evaluate_delegated_read(grant, at, evidence_at)
            }
            RequesterRelation::Owner | RequesterRelation::Unrelated => {
                SessionMemoryAccessDecision::denied("SESSION_MEMORY_ACCESS_DENIED")
            }
        },
    }
}

fn evaluate_delegated_read(
    grant: Option<&AuthorityGrant>,
    at: DateTime<Utc>,
    evidence_at: Option<DateTime<Utc>>,
) -> SessionMemoryAccessDecision {
    let Some(grant) = grant else {
        return SessionMemoryAccessDecision::denied("DELEGATED_GRANT_REQUIRED");
    };

    if !grant.scope.allowed_risk_classes.contains(&RiskClass::Read) {
        return SessionMemoryAccessDecision::denied("DELEGATED_GRANT_MISSING_READ_SCOPE");
    }

    let trust = evaluate_trust(grant, at, evidence_at, Operation::Read);
    if !trust.read_allowed {
        return SessionMemoryAccessDecision::denied(trust.reason_code);
    }

    let scope = if trust.historical_verification_only {
        AccessScope::DelegatedHistorical
    } else {
        AccessScope::DelegatedActive
    };

    SessionMemoryAccessDecision { allowed: true, scope, reason_code: trust.reason_code }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nooterra_records::{
        AuthorityGrantBuilder, PrincipalRef, PrincipalType,
    };

    fn dt(s: &str) -> DateTime<Utc> {
        Utc.datetime_from_str(&format!("{s} 00:00:00"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn active_grant() -> AuthorityGrant {
        AuthorityGrantBuilder::new()
            .grant_id("g1")
            .tenant_id("t1")
            .principal_ref(PrincipalRef { principal_type: PrincipalType::Human, principal_id: "p1".to_string() })
            .grantee_agent_id("agent-1")
            .allow_risk_class(RiskClass::Read)
            .spend_envelope("USD", 100, 1000)
            .max_delegation_depth(0)
            .validity(dt("2025-01-01"), dt("2025-01-01"), dt("2026-01-01"))
            .build(dt("2025-01-01"))
            .expect("build grant")
    }

    #[test]
    fn owner_always_reads_regardless_of_visibility() {
        for visibility in [Visibility::Personal, Visibility::Team, Visibility::Delegated] {
            let decision =
                evaluate(RequesterRelation::Owner, visibility, None, dt("2025-06-01"), None);
            assert!(decision.allowed);
            assert_eq!(decision.scope, AccessScope::Full);
        }
    }

    #[test]
    fn personal_visibility_denies_everyone_but_owner() {
        for relation in
            [RequesterRelation::TeamMember, RequesterRelation::DelegatedGrantee, RequesterRelation::Unrelated]
        {
            let decision =
                evaluate(relation, Visibility::Personal, None, dt("2025-06-01"), None);
            assert!(!decision.allowed);
        }
    }

    #[test]
    fn team_visibility_allows_team_members_only() {
        let allowed =
            evaluate(RequesterRelation::TeamMember, Visibility::Team, None, dt("2025-06-01"), None);
        assert!(allowed.allowed);
        assert_eq!(allowed.scope, AccessScope::TeamShared);

        let denied =
            evaluate(RequesterRelation::Unrelated, Visibility::Team, None, dt("2025-06-01"), None);
        assert!(!denied.allowed);
    }

    #[test]
    fn delegated_visibility_requires_a_grant_for_delegated_grantee() {
        let missing_grant = evaluate(
            RequesterRelation::DelegatedGrantee,
            Visibility::Delegated,
            None,
            dt("2025-06-01"),
            None,
        );
        assert!(!missing_grant.allowed);
        assert_eq!(missing_grant.reason_code, "DELEGATED_GRANT_REQUIRED");
    }

    #[test]
    fn delegated_visibility_allows_active_grant_covering_read() {
        let grant = active_grant();
        let decision = evaluate(
            RequesterRelation::DelegatedGrantee,
            Visibility::Delegated,
            Some(&grant),
            dt("2025-06-01"),
            None,
        );
        assert!(decision.allowed);
        assert_eq!(decision.scope, AccessScope::DelegatedActive);
    }

    #[test]
    fn delegated_visibility_denies_expired_grant_without_evidence() {
        let grant = active_grant();
        let decision = evaluate(
            RequesterRelation::DelegatedGrantee,
            Visibility::Delegated,
            Some(&grant),
            dt("2027-01-01"),
            None,
        );
        assert!(!decision.allowed);
        assert_eq!(decision.reason_code, "HISTORICAL_READ_EVIDENCE_REQUIRED");
    }

    #[test]
    fn delegated_visibility_allows_historical_read_with_evidence() {
        let revoked = active_grant().revoke(dt("2025-04-01"), "ADMIN_REQUEST");
        let decision = evaluate(
            RequesterRelation::DelegatedGrantee,
            Visibility::Delegated,
            Some(&revoked),
            dt("2025-07-01"),
            Some(dt("2025-03-15")),
        );
        assert!(decision.allowed);
        assert_eq!(decision.scope, AccessScope::DelegatedHistorical);
    }

    #[test]
    fn delegated_visibility_denies_grant_without_read_scope() {
        let grant = AuthorityGrantBuilder::new()
            .grant_id("g2")
            .tenant_id("t1")
            .principal_ref(PrincipalRef { principal_type: PrincipalType::Human, principal_id: "p1".to_string() })
            .grantee_agent_id("agent-1")
            .allow_risk_class(RiskClass::Compute)
            .spend_envelope("USD", 100, 1000)
            .max_delegation_depth(0)
            .validity(dt("2025-01-01"), dt("2025-01-01"), dt("2026-01-01"))
            .build(dt("2025-01-01"))
            .expect("build grant");

        let decision = evaluate(
            RequesterRelation::DelegatedGrantee,
            Visibility::Delegated,
            Some(&grant),
            dt("2025-06-01"),
            None,
        );
        assert!(!decision.allowed);
        assert_eq!(decision.reason_code, "DELEGATED_GRANT_MISSING_READ_SCOPE");
    }
}
