//! Interaction-direction matrix: a closed, exhaustively-specified grid
//! over the substrate's entity types.
//!
//! A fixed lookup table, not a general-purpose permission system. The
//! grid itself is the authority — every cell is named in the unit test
//! below so nothing is left to inference.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// The closed set of entity kinds that participate in the substrate,
/// matching `AuthorityGrant.v1`'s `principalRef.principalType` values
/// plus the `agent` endpoint every grant ultimately authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A human user.
    Human,
    /// An organization.
    Org,
    /// An automated service account (e.g. a paid-tool provider).
    Service,
    /// An autonomous agent.
    Agent,
}

impl EntityType {
    /// All variants, for exhaustive iteration.
    pub const ALL: [EntityType; 4] =
        [EntityType::Human, EntityType::Org, EntityType::Service, EntityType::Agent];
}

/// Whether an interaction originating at `from` and directed at `to` is
/// permitted by the substrate's fixed direction grid.
///
/// Principals (`human`, `org`, `service`) may only direct an interaction
/// at an `agent` — they are the entities that grant authority, not
/// endpoints other principals address directly. An `agent` may direct an
/// interaction at another `agent` (negotiation, delegation) or at a
/// `service` (paid-tool invocation); it never directly addresses a
/// `human` or `org` (those are routed back through the principal's own
/// channel, outside this substrate).
#[must_use]
pub const fn is_interaction_allowed(from: EntityType, to: EntityType) -> bool {
    use EntityType::{Agent, Human, Org, Service};
    matches!(
        (from, to),
        (Human, Agent) | (Org, Agent) | (Service, Agent) | (Agent, Agent) | (Agent, Service)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityType::{Agent, Human, Org, Service};

    /// Every one of the 16 cells is named here, not just the allowed ones.
    #[test]
    fn every_cell_matches_the_fixed_grid() {
        let allowed: &[(EntityType, EntityType)] =
            &[(Human, Agent), (Org, Agent), (Service, Agent), (Agent, Agent), (Agent, Service)];

        for from in EntityType::ALL {
            for to in EntityType::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    is_interaction_allowed(from, to),
                    expected,
                    "cell ({from:?} -> {to:?}) did not match the fixed grid"
                );
            }
        }
    }

    #[test]
    fn principals_may_only_address_agents() {
        for principal in [Human, Org, Service] {
            assert!(is_interaction_allowed(principal, Agent));
            assert!(!is_interaction_allowed(principal, Human));
            assert!(!is_interaction_allowed(principal, Org));
        }
    }

    #[test]
    fn agents_never_address_humans_or_orgs_directly() {
        assert!(!is_interaction_allowed(Agent, Human));
        assert!(!is_interaction_allowed(Agent, Org));
    }

    #[test]
    fn agents_may_address_agents_and_services() {
        assert!(is_interaction_allowed(Agent, Agent));
        assert!(is_interaction_allowed(Agent, Service));
    }

    #[test]
    fn services_never_initiate_to_other_services() {
        assert!(!is_interaction_allowed(Service, Service));
    }
}
