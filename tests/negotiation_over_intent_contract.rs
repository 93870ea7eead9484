//! A negotiation transcript running over a real `IntentContract.v1`,
//! exercising `nooterra-records` and `nooterra-negotiation` together the
//! way a caller actually would: draft the contract, then drive
//! propose/counter/accept events that bind to its `intentId`/`intentHash`.

use chrono::{DateTime, Utc};
use nooterra_error::ErrorCode;
use nooterra_negotiation::{EventType, IntentNegotiationEvent, NegotiationStatus, NegotiationTranscript};
use nooterra_records::{ExpectedDeterminism, IntentContractBuilder, RiskClass};

fn dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[test]
fn propose_counter_accept_produces_an_accepted_transcript() {
    let contract = IntentContractBuilder::new()
        .intent_id("intent-1")
        .negotiation_id("neg-1")
        .tenant_id("tenant-1")
        .proposer_agent_id("agent-buyer")
        .responder_agent_id("agent-seller")
        .task(
            "summarize-report",
            "cap:summarize",
            RiskClass::Compute,
            ExpectedDeterminism::BoundedNondeterministic,
            false,
            500,
        )
        .spend_limit("USD", 500)
        .idempotency_key("idem-1")
        .nonce("nonce1234")
        .expires_at(dt("2025-12-31T00:00:00Z"))
        .build(dt("2025-01-01T00:00:00Z"))
        .expect("build intent contract");

    contract.verify_hash().expect("contract hash verifies");

    let propose = IntentNegotiationEvent::build(
        "ev-1",
        contract.negotiation_id.clone(),
        contract.intent_id.clone(),
        contract.intent_hash.clone(),
        EventType::Propose,
        "agent-buyer",
        dt("2025-01-01T00:01:00Z"),
        None,
        Some(serde_json::json!({"offerCents": 400})),
    )
    .unwrap();
    let propose_hash = propose.event_hash.clone();

    let counter = IntentNegotiationEvent::build(
        "ev-2",
        contract.negotiation_id.clone(),
        contract.intent_id.clone(),
        contract.intent_hash.clone(),
        EventType::Counter,
        "agent-seller",
        dt("2025-01-01T00:02:00Z"),
        Some(propose_hash),
        Some(serde_json::json!({"offerCents": 480})),
    )
    .unwrap();
    let counter_hash = counter.event_hash.clone();

    let accept = IntentNegotiationEvent::build(
        "ev-3",
        contract.negotiation_id.clone(),
        contract.intent_id.clone(),
        contract.intent_hash.clone(),
        EventType::Accept,
        "agent-buyer",
        dt("2025-01-01T00:03:00Z"),
        Some(counter_hash.clone()),
        Some(serde_json::json!({"offerCents": 480})),
    )
    .unwrap();
    let accept_hash = accept.event_hash.clone();

    let mut transcript = NegotiationTranscript::new();
    transcript
        .validate_and_append(
            propose,
            &contract.negotiation_id,
            &contract.intent_id,
            &contract.intent_hash,
        )
        .unwrap();
    transcript
        .validate_and_append(
            counter,
            &contract.negotiation_id,
            &contract.intent_id,
            &contract.intent_hash,
        )
        .unwrap();
    transcript
        .validate_and_append(
            accept,
            &contract.negotiation_id,
            &contract.intent_id,
            &contract.intent_hash,
        )
        .unwrap();

    assert_eq!(transcript.status(), NegotiationStatus::Accepted);
    assert_eq!(transcript.events().len(), 3);

    // S4: no further event may follow an accept.
    let late = IntentNegotiationEvent::build(
        "ev-4",
        contract.negotiation_id.clone(),
        contract.intent_id.clone(),
        contract.intent_hash.clone(),
        EventType::Counter,
        "agent-seller",
        dt("2025-01-01T00:04:00Z"),
        Some(accept_hash),
        Some(serde_json::json!({"offerCents": 490})),
    )
    .unwrap();
    let err = transcript
        .validate_and_append(
            late,
            &contract.negotiation_id,
            &contract.intent_id,
            &contract.intent_hash,
        )
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EventAfterAccept);
}

#[test]
fn counter_or_accept_as_first_event_is_rejected() {
    let mut transcript = NegotiationTranscript::new();
    let intent_hash = "ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12cd34ef56ab";
    let bad_first = IntentNegotiationEvent::build(
        "ev-1",
        "neg-1",
        "intent-1",
        intent_hash,
        EventType::Counter,
        "agent-seller",
        dt("2025-01-01T00:00:00Z"),
        None,
        None,
    )
    .unwrap();
    let err = transcript
        .validate_and_append(bad_first, "neg-1", "intent-1", intent_hash)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProposeRequired);
}

#[test]
fn event_quoting_a_stale_contract_hash_is_rejected() {
    let mut transcript = NegotiationTranscript::new();
    let intent_hash = "ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12cd34ef56ab";
    let stale_hash = "ff00000000000000000000000000000000000000000000000000000000ff";
    let propose = IntentNegotiationEvent::build(
        "ev-1",
        "neg-1",
        "intent-1",
        stale_hash,
        EventType::Propose,
        "agent-buyer",
        dt("2025-01-01T00:00:00Z"),
        None,
        None,
    )
    .unwrap();
    let err = transcript
        .validate_and_append(propose, "neg-1", "intent-1", intent_hash)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EventIntentHashMismatch);
}
