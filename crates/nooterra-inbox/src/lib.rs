//! The append-only agent inbox: idempotent publish, cursor-based listing,
//! and an at-most-once-advance ack.
//!
//! [`AgentInboxChannelState`] is a plain, caller-owned value with `&mut
//! self` methods — no interior mutability and no locking inside this
//! crate. Callers that need to share a channel across threads supply
//! their own synchronization around it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, decode_token_bytes, encode_token, hash_canonical, sha256_hex, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp, non_empty_string};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;
const MAX_PAGE_LIMIT: usize = 1000;

/// A durable, append-only message in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInboxMessage {
    /// Always `"AgentInboxMessage.v1"`.
    pub schema: String,
    /// The channel this message was published on.
    pub channel: String,
    /// Monotonic sequence number within the channel, starting at 1.
    pub seq: u64,
    /// `"aimsg_" + sha256Hex(channel)[0..16] + "_" + zero-padded(seq, 12)`.
    pub message_id: String,
    /// The caller-supplied idempotency key for this publish.
    pub idempotency_key: String,
    /// `sha256Hex(canonical(payload))`.
    pub payload_hash: String,
    /// The message body.
    pub payload: serde_json::Value,
    /// When this message was appended to the channel.
    pub published_at: DateTime<Utc>,
}

impl ToCanonical for AgentInboxMessage {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", self.schema.to_canonical()),
            ("channel", self.channel.to_canonical()),
            ("seq", (self.seq as i64).to_canonical()),
            ("messageId", self.message_id.to_canonical()),
            ("idempotencyKey", self.idempotency_key.to_canonical()),
            ("payloadHash", self.payload_hash.to_canonical()),
            ("payload", self.payload.to_canonical()),
            ("publishedAt", canonical_timestamp(self.published_at).to_canonical()),
        ])
    }
}

/// An opaque position within a channel's message stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInboxCursor {
    /// Always `"AgentInboxCursor.v1"`.
    pub schema: String,
    /// The channel this cursor is scoped to.
    pub channel: String,
    /// The sequence number the cursor points at.
    pub seq: u64,
    /// The message id at that sequence number, for drift detection.
    pub message_id: String,
    /// When the pointed-at message was published.
    pub published_at: DateTime<Utc>,
}

impl AgentInboxCursor {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "AgentInboxCursor.v1";

    fn to_canonical_value(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", self.schema.to_canonical()),
            ("channel", self.channel.to_canonical()),
            ("seq", (self.seq as i64).to_canonical()),
            ("messageId", self.message_id.to_canonical()),
            ("publishedAt", canonical_timestamp(self.published_at).to_canonical()),
        ])
    }

    /// Encode as an opaque, versioned token: `base64url(canonical({v:1, cursor}))`.
    #[must_use]
    pub fn encode(&self) -> String {
        let envelope = CanonicalValue::object([("v", 1i64.to_canonical()), ("cursor", self.to_canonical_value())]);
        encode_token(&envelope)
    }

    /// Decode a token previously produced by [`AgentInboxCursor::encode`].
    pub fn decode(token: &str) -> Result<Self, NooterraError> {
        let bytes = decode_token_bytes(token)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            NooterraError::new(ErrorCode::CursorNotFound, "cursor token is not valid JSON")
                .with_source(e)
        })?;
        let cursor = value.get("cursor").ok_or_else(|| {
            NooterraError::new(ErrorCode::CursorNotFound, "cursor token is missing its cursor field")
        })?;
        serde_json::from_value(cursor.clone()).map_err(|e| {
            NooterraError::new(ErrorCode::CursorNotFound, "cursor token does not decode to AgentInboxCursor.v1")
                .with_source(e)
        })
    }
}

/// The outcome of [`AgentInboxChannelState::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The message as stored (whether newly appended or an idempotent replay).
    pub message: AgentInboxMessage,
    /// `true` if this call returned a previously-published message rather
    /// than appending a new one.
    pub deduped: bool,
}

/// A page of messages returned by [`AgentInboxChannelState::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    /// The messages in this page, in ascending `seq` order.
    pub messages: Vec<AgentInboxMessage>,
    /// A cursor positioned at the last message returned, if any were
    /// returned; callers pass this back in as `after` to continue.
    pub next_cursor: Option<AgentInboxCursor>,
}

/// The outcome of [`AgentInboxChannelState::ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    /// `true` if the presented cursor was already the stored ack position
    /// (a repeat ack), `false` if it advanced the position.
    pub noop: bool,
}

#[derive(Debug, Clone)]
struct IdempotencyEntry {
    payload_hash: String,
    seq: u64,
}

/// The durable state of a single channel: its published messages, next
/// sequence counter, idempotency ledger, and last-acked position.
#[derive(Debug, Clone, Default)]
pub struct AgentInboxChannelState {
    channel: String,
    messages: Vec<AgentInboxMessage>,
    next_seq: u64,
    idempotency: HashMap<String, IdempotencyEntry>,
    acked_seq: Option<u64>,
}

impl AgentInboxChannelState {
    /// An empty channel, with `next_seq` starting at 1.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            messages: Vec::new(),
            next_seq: 1,
            idempotency: HashMap::new(),
            acked_seq: None,
        }
    }

    /// The channel name this state is scoped to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The last sequence number acked by a consumer, if any.
    #[must_use]
    pub fn acked_seq(&self) -> Option<u64> {
        self.acked_seq
    }

    fn build_message_id(channel: &str, seq: u64) -> String {
        let prefix = &sha256_hex(channel.as_bytes())[0..16];
        format!("aimsg_{prefix}_{seq:012}")
    }

    /// Publish `payload` under `idempotency_key`.
    ///
    /// A repeated `idempotency_key` with the same payload replays the
    /// original message (`deduped = true`); a repeated key with a
    /// different payload is rejected as `IDEMPOTENCY_CONFLICT`.
    #[tracing::instrument(skip(self, payload), fields(channel = %self.channel))]
    pub fn publish(
        &mut self,
        idempotency_key: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome, NooterraError> {
        let idempotency_key = non_empty_string("idempotencyKey", &idempotency_key.into(), MAX_ID_LEN)?;
        let payload_hash = hash_canonical(&payload);

        if let Some(existing) = self.idempotency.get(&idempotency_key) {
            if existing.payload_hash != payload_hash {
                tracing::debug!(target: "nooterra_inbox", channel = %self.channel, %idempotency_key, "idempotency conflict on publish");
                return Err(NooterraError::new(
                    ErrorCode::IdempotencyConflict,
                    "idempotencyKey was already used with a different payload",
                )
                .with_context("idempotencyKey", idempotency_key));
            }
            let message = self
                .messages
                .iter()
                .find(|m| m.seq == existing.seq)
                .cloned()
                .expect("idempotency ledger entry without a backing message");
            return Ok(PublishOutcome { message, deduped: true });
        }

        let seq = self.next_seq;
        let message = AgentInboxMessage {
            schema: "AgentInboxMessage.v1".to_string(),
            channel: self.channel.clone(),
            seq,
            message_id: Self::build_message_id(&self.channel, seq),
            idempotency_key: idempotency_key.clone(),
            payload_hash: payload_hash.clone(),
            payload,
            published_at: now,
        };
        self.messages.push(message.clone());
        self.next_seq += 1;
        self.idempotency.insert(idempotency_key, IdempotencyEntry { payload_hash, seq });

        tracing::debug!(target: "nooterra_inbox", channel = %self.channel, seq, "message published");
        Ok(PublishOutcome { message, deduped: false })
    }

    /// List messages after `after` (or from the start if `None`), up to
    /// `limit` (clamped to `1..=1000`).
    ///
    /// # Errors
    ///
    /// Returns `CURSOR_NOT_FOUND` if `after` does not resolve to a real
    /// `(channel, seq, messageId)` triple in this channel's history.
    pub fn list(
        &self,
        after: Option<&AgentInboxCursor>,
        limit: usize,
    ) -> Result<ListPage, NooterraError> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let start_seq = match after {
            None => 0,
            Some(cursor) => {
                let resolved = self
                    .messages
                    .iter()
                    .find(|m| m.channel == cursor.channel && m.seq == cursor.seq && m.message_id == cursor.message_id);
                match resolved {
                    Some(_) => cursor.seq,
                    None => {
                        return Err(NooterraError::new(
                            ErrorCode::CursorNotFound,
                            "cursor does not resolve to a known (channel, seq, messageId) triple",
                        )
                        .with_context("channel", cursor.channel.clone())
                        .with_context("seq", cursor.seq.to_string()));
                    }
                }
            }
        };

        let messages: Vec<AgentInboxMessage> = self
            .messages
            .iter()
            .filter(|m| m.seq > start_seq)
            .take(limit)
            .cloned()
            .collect();

        let next_cursor = messages.last().map(|m| AgentInboxCursor {
            schema: AgentInboxCursor::SCHEMA_VERSION.to_string(),
            channel: m.channel.clone(),
            seq: m.seq,
            message_id: m.message_id.clone(),
            published_at: m.published_at,
        });

        Ok(ListPage { messages, next_cursor })
    }

    /// Advance the ack position to `cursor`, enforcing at-most-once
    /// advance: the new `seq` must be exactly one past the current ack
    /// position (or equal to it, which is a no-op repeat ack).
    ///
    /// # Errors
    ///
    /// - `CURSOR_CHANNEL_MISMATCH` if `cursor.channel` does not match
    ///   this channel.
    /// - `ACK_CURSOR_NOT_FOUND` if `cursor.seq` has no backing message.
    /// - `ACK_CURSOR_REGRESSION` if `cursor.seq` is behind the current
    ///   ack position.
    /// - `ACK_OUT_OF_ORDER` if `cursor.seq` skips ahead of the next
    ///   unacked message.
    #[tracing::instrument(skip(self, cursor), fields(channel = %self.channel, ack_seq = cursor.seq))]
    pub fn ack(&mut self, cursor: &AgentInboxCursor) -> Result<AckOutcome, NooterraError> {
        if cursor.channel != self.channel {
            return Err(NooterraError::new(
                ErrorCode::CursorChannelMismatch,
                "ack cursor's channel does not match this inbox channel",
            )
            .with_context("expected", self.channel.clone())
            .with_context("actual", cursor.channel.clone()));
        }

        let existing_seq = self.acked_seq.unwrap_or(0);

        if cursor.seq < existing_seq {
            tracing::warn!(target: "nooterra_inbox", channel = %self.channel, existing_seq, ack_seq = cursor.seq, "ack cursor regression rejected");
            return Err(NooterraError::new(
                ErrorCode::AckCursorRegression,
                "ack cursor regresses behind the current ack position",
            )
            .with_context("currentSeq", existing_seq.to_string())
            .with_context("ackSeq", cursor.seq.to_string()));
        }

        if cursor.seq == existing_seq {
            return Ok(AckOutcome { noop: true });
        }

        if cursor.seq > existing_seq + 1 {
            return Err(NooterraError::new(
                ErrorCode::AckOutOfOrder,
                "ack cursor skips ahead of the next unacked message",
            )
            .with_context("currentSeq", existing_seq.to_string())
            .with_context("ackSeq", cursor.seq.to_string()));
        }

        if !self.messages.iter().any(|m| m.seq == cursor.seq && m.message_id == cursor.message_id) {
            return Err(NooterraError::new(
                ErrorCode::AckCursorNotFound,
                "ack cursor does not resolve to a known message at that sequence number",
            )
            .with_context("channel", cursor.channel.clone())
            .with_context("seq", cursor.seq.to_string()));
        }

        self.acked_seq = Some(cursor.seq);
        Ok(AckOutcome { noop: false })
    }

    /// Build an ack cursor pointing at `seq`, for convenience in callers
    /// that track sequence numbers rather than full cursor tokens.
    #[must_use]
    pub fn cursor_at(&self, seq: u64) -> Option<AgentInboxCursor> {
        self.messages.iter().find(|m| m.seq == seq).map(|m| AgentInboxCursor {
            schema: AgentInboxCursor::SCHEMA_VERSION.to_string(),
            channel: m.channel.clone(),
            seq: m.seq,
            message_id: m.message_id.clone(),
            published_at: m.published_at,
        })
    }
}
