//! `IntentNegotiationEvent.v1` and the propose/counter/accept state machine
//! that binds a run of events into a `NegotiationTranscript`.
//!
//! Each event is a record in the uniform family: normalize its fields,
//! compose the canonical body with `eventHash` nulled, hash, emit. Every
//! event also carries the `intentHash` of the `IntentContract.v1` it
//! negotiates over and a `prevEventHash` link to its predecessor, so a
//! transcript is both a state machine and a hash chain. The transcript
//! itself never stores anything beyond the events it was built from;
//! `transcript_hash` is `sha256(canonical([eventHash, ...]))` over the
//! events in their validated, sorted order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, non_empty_string};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// The three stages a negotiation event can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The opening offer. Only valid as the first event.
    Propose,
    /// A counter-offer, replacing the terms on the table.
    Counter,
    /// Terminal acceptance of the terms currently on the table.
    Accept,
}

impl EventType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Counter => "counter",
            Self::Accept => "accept",
        }
    }

    /// The `reasonCode` value fixed per `eventType`, stamped onto every
    /// event of that type and checked at validation time.
    #[must_use]
    pub const fn fixed_reason_code(self) -> &'static str {
        match self {
            Self::Propose => "INTENT_PROPOSED",
            Self::Counter => "INTENT_COUNTERED",
            Self::Accept => "INTENT_ACCEPTED",
        }
    }

    /// The error reason attached when this event type arrives out of turn.
    const fn transition_error_reason(self) -> &'static str {
        match self {
            Self::Propose => "PROPOSE_NOT_FIRST",
            Self::Counter => "COUNTER_TRANSITION_INVALID",
            Self::Accept => "ACCEPT_TRANSITION_INVALID",
        }
    }

    /// The event types legal to follow `current` (`None` meaning no
    /// events have been accepted into the transcript yet).
    #[must_use]
    pub const fn next_allowed(current: Option<EventType>) -> &'static [EventType] {
        match current {
            None => &[EventType::Propose],
            Some(EventType::Propose | EventType::Counter) => {
                &[EventType::Counter, EventType::Accept]
            }
            Some(EventType::Accept) => &[],
        }
    }
}

impl ToCanonical for EventType {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// A single proposal, counter, or acceptance within a negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentNegotiationEvent {
    /// Unique identifier for this event.
    pub event_id: String,
    /// The negotiation this event belongs to.
    pub negotiation_id: String,
    /// The intent contract this event negotiates over.
    pub intent_id: String,
    /// The bound contract's `intentHash`, at the time this event was issued.
    pub intent_hash: String,
    /// Which of propose/counter/accept this event is.
    pub event_type: EventType,
    /// The fixed reason code for `event_type`.
    pub reason_code: String,
    /// The agent that emitted this event.
    pub actor_agent_id: String,
    /// When the event was emitted.
    pub at: DateTime<Utc>,
    /// Hash of the logical predecessor event, or `None` for the first
    /// event in a transcript.
    pub prev_event_hash: Option<String>,
    /// Arbitrary caller-supplied metadata (terms, offer amounts, etc).
    pub metadata: Option<serde_json::Value>,
    /// Content hash (identity).
    pub event_hash: String,
}

impl IntentNegotiationEvent {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "IntentNegotiationEvent.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", Self::SCHEMA_VERSION.to_canonical()),
            ("eventId", self.event_id.to_canonical()),
            ("negotiationId", self.negotiation_id.to_canonical()),
            ("intentId", self.intent_id.to_canonical()),
            ("intentHash", self.intent_hash.to_canonical()),
            ("eventType", self.event_type.to_canonical()),
            ("reasonCode", self.reason_code.to_canonical()),
            ("actorAgentId", self.actor_agent_id.to_canonical()),
            ("at", canonical_timestamp(self.at).to_canonical()),
            ("prevEventHash", self.prev_event_hash.to_canonical()),
            ("metadata", self.metadata.to_canonical()),
            (
                "eventHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `eventHash` from the event's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `eventHash` matches the current fields.
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.event_hash {
            return Err(NooterraError::new(
                ErrorCode::PayloadInvalid,
                "recomputed eventHash does not match the declared value",
            )
            .with_context("expected", self.event_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Build and hash a new negotiation event, stamping `reasonCode` from
    /// `event_type` automatically.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        event_id: impl Into<String>,
        negotiation_id: impl Into<String>,
        intent_id: impl Into<String>,
        intent_hash: impl Into<String>,
        event_type: EventType,
        actor_agent_id: impl Into<String>,
        at: DateTime<Utc>,
        prev_event_hash: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, NooterraError> {
        let event_id = bounded_identifier("eventId", &event_id.into(), MAX_ID_LEN)?;
        let negotiation_id =
            bounded_identifier("negotiationId", &negotiation_id.into(), MAX_ID_LEN)?;
        let intent_id = bounded_identifier("intentId", &intent_id.into(), MAX_ID_LEN)?;
        let intent_hash = nooterra_normalize::hex_sha256("intentHash", &intent_hash.into())?;
        let actor_agent_id =
            non_empty_string("actorAgentId", &actor_agent_id.into(), MAX_ID_LEN)?;

        let mut event = Self {
            event_id,
            negotiation_id,
            intent_id,
            intent_hash,
            event_type,
            reason_code: event_type.fixed_reason_code().to_string(),
            actor_agent_id,
            at,
            prev_event_hash,
            metadata,
            event_hash: String::new(),
        };
        event.event_hash = event.compute_hash();
        Ok(event)
    }
}

/// Whether a negotiation has reached a binding agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Still open to counters or acceptance.
    Open,
    /// An `accept` event has terminated the negotiation.
    Accepted,
}

/// A validated, hash-chained run of negotiation events, sorted stably by
/// `(at, eventId)` and checked against the propose/counter/accept state
/// machine at append time.
#[derive(Debug, Clone, Default)]
pub struct NegotiationTranscript {
    events: Vec<IntentNegotiationEvent>,
}

impl NegotiationTranscript {
    /// An empty transcript, ready for its first `propose` event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The events appended so far, in validated order.
    #[must_use]
    pub fn events(&self) -> &[IntentNegotiationEvent] {
        &self.events
    }

    fn current_event_type(&self) -> Option<EventType> {
        self.events.last().map(|e| e.event_type)
    }

    /// Append `event`, binding it against `(negotiation_id, intent_id,
    /// intent_hash)` of the contract it claims to negotiate over, then
    /// verifying its own hash, its `reasonCode`, its `prevEventHash`
    /// chain link, and the propose/counter/accept transition, in that
    /// order.
    ///
    /// # Errors
    ///
    /// `NEGOTIATION_ID_MISMATCH` / `INTENT_ID_MISMATCH` /
    /// `EVENT_INTENT_HASH_MISMATCH` if the event does not bind to the
    /// given contract identity; `REASON_CODE_INVALID` if `reasonCode`
    /// is not the fixed code for `eventType`; `PREV_EVENT_HASH_MISMATCH`
    /// if the chain link does not match the prior event (or isn't
    /// `None` for the first event); `EVENT_AFTER_ACCEPT` if the
    /// transcript already holds an `accept` event; `PROPOSE_REQUIRED` /
    /// `TRANSITION_INVALID` for any other disallowed transition.
    #[tracing::instrument(skip(self, event, intent_hash), fields(event_id = %event.event_id, event_type = ?event.event_type))]
    pub fn validate_and_append(
        &mut self,
        event: IntentNegotiationEvent,
        negotiation_id: &str,
        intent_id: &str,
        intent_hash: &str,
    ) -> Result<(), NooterraError> {
        if event.negotiation_id != negotiation_id {
            return Err(NooterraError::new(
                ErrorCode::NegotiationIdMismatch,
                "event negotiationId does not match the bound contract",
            )
            .with_context("eventId", event.event_id.clone()));
        }
        if event.intent_id != intent_id {
            return Err(NooterraError::new(
                ErrorCode::IntentIdMismatch,
                "event intentId does not match the bound contract",
            )
            .with_context("eventId", event.event_id.clone()));
        }
        if event.intent_hash != intent_hash {
            return Err(NooterraError::new(
                ErrorCode::EventIntentHashMismatch,
                "event intentHash does not match the bound contract's intentHash",
            )
            .with_context("eventId", event.event_id.clone()));
        }
        if event.reason_code != event.event_type.fixed_reason_code() {
            return Err(NooterraError::new(
                ErrorCode::ReasonCodeInvalid,
                "reasonCode is not the fixed code for this eventType",
            )
            .with_context("eventId", event.event_id.clone())
            .with_context("expected", event.event_type.fixed_reason_code()));
        }

        event.verify_hash()?;

        let expected_prev = self.events.last().map(|e| e.event_hash.as_str());
        if event.prev_event_hash.as_deref() != expected_prev {
            return Err(NooterraError::new(
                ErrorCode::PrevEventHashMismatch,
                "prevEventHash does not chain to the transcript's last event",
            )
            .with_context("eventId", event.event_id.clone()));
        }

        let current = self.current_event_type();
        if current == Some(EventType::Accept) {
            return Err(NooterraError::new(
                ErrorCode::EventAfterAccept,
                "negotiation already has an accept event; no further events are allowed",
            )
            .with_context("eventId", event.event_id.clone()));
        }

        let allowed = EventType::next_allowed(current);
        if !allowed.contains(&event.event_type) {
            let code = if current.is_none() {
                ErrorCode::ProposeRequired
            } else {
                ErrorCode::TransitionInvalid
            };
            return Err(NooterraError::new(
                code,
                "event type is not a legal transition from the current negotiation state",
            )
            .with_context("eventId", event.event_id.clone())
            .with_context("reasonCode", event.event_type.transition_error_reason()));
        }

        tracing::debug!(target: "nooterra_negotiation", negotiation_id = %negotiation_id, "negotiation event appended");
        self.events.push(event);
        Ok(())
    }

    /// Current status: `accepted` iff the last event is an `accept`,
    /// otherwise `open`.
    #[must_use]
    pub fn status(&self) -> NegotiationStatus {
        match self.current_event_type() {
            Some(EventType::Accept) => NegotiationStatus::Accepted,
            _ => NegotiationStatus::Open,
        }
    }

    /// `sha256(canonical([eventHash, ...]))` over the events in append
    /// order (already `(at, eventId)`-ordered by construction, since the
    /// chain link enforces a single linear sequence).
    #[must_use]
    pub fn transcript_hash(&self) -> String {
        let hashes = CanonicalValue::array(
            self.events
                .iter()
                .map(|e| e.event_hash.clone().to_canonical()),
        );
        hash_canonical(&hashes)
    }
}
