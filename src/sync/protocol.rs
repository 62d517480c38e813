//! Wire frames exchanged between clients and the hub.
//!
//! All frames are JSON text with a `type` discriminator and camelCase
//! fields. Record payloads inside frames are themselves codec-encoded
//! text, so the frame layer never inspects record contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::error::SyncError;
use crate::record::Record;

/// Identity of one hub connection, assigned at accept time and announced
/// to the client in the `welcome` frame.
pub type ConnectionId = Uuid;

/// Originator used for events the hub publishes on its own behalf
/// (e.g. a reset after a bulk load). Never collides with the random
/// per-connection ids.
pub const HUB_ORIGIN: ConnectionId = Uuid::nil();

/// The five remote procedures a client may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Update,
    Find,
    FindAll,
    Destroy,
}

/// Broadcast event names as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Created,
    Updated,
    Destroyed,
    ResetItems,
}

/// A state change announced to observers, carrying the post-mutation
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    Created(Record),
    Updated(Record),
    Destroyed(Record),
    Reset(Vec<Record>),
}

impl BroadcastEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BroadcastEvent::Created(_) => EventKind::Created,
            BroadcastEvent::Updated(_) => EventKind::Updated,
            BroadcastEvent::Destroyed(_) => EventKind::Destroyed,
            BroadcastEvent::Reset(_) => EventKind::ResetItems,
        }
    }

    /// Codec-encoded payload for the wire form of this event.
    pub fn payload(&self) -> String {
        match self {
            BroadcastEvent::Created(r)
            | BroadcastEvent::Updated(r)
            | BroadcastEvent::Destroyed(r) => codec::encode_record(Some(r)),
            BroadcastEvent::Reset(rs) => codec::encode_records(rs),
        }
    }

    fn from_wire(kind: EventKind, payload: &str) -> Result<Self, SyncError> {
        Ok(match kind {
            EventKind::Created => BroadcastEvent::Created(codec::decode(payload)?),
            EventKind::Updated => BroadcastEvent::Updated(codec::decode(payload)?),
            EventKind::Destroyed => BroadcastEvent::Destroyed(codec::decode(payload)?),
            EventKind::ResetItems => BroadcastEvent::Reset(codec::decode_records(payload)?),
        })
    }
}

/// A broadcast event together with its originator, as carried through
/// the fan-out channel.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub originator: ConnectionId,
    pub published_at: DateTime<Utc>,
    pub event: BroadcastEvent,
}

impl Envelope {
    pub fn new(originator: ConnectionId, event: BroadcastEvent) -> Self {
        Self {
            originator,
            published_at: Utc::now(),
            event,
        }
    }

    /// An envelope published by the hub itself rather than on behalf of
    /// a connection.
    pub fn from_hub(event: BroadcastEvent) -> Self {
        Self::new(HUB_ORIGIN, event)
    }

    /// Rebuild an envelope from its wire fields on the receiving side.
    pub fn from_wire(
        kind: EventKind,
        originator: ConnectionId,
        payload: &str,
    ) -> Result<Self, SyncError> {
        Ok(Self::new(originator, BroadcastEvent::from_wire(kind, payload)?))
    }
}

/// Frames a client sends to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Invoke one of the five remote procedures. `payload` is omitted
    /// for `findAll`.
    #[serde(rename_all = "camelCase")]
    Invoke {
        id: u64,
        action: Action,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
    },
}

/// Frames the hub sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// First frame on every connection; announces the connection's
    /// identity for origin-aware reconciliation.
    #[serde(rename_all = "camelCase")]
    Welcome { connection_id: ConnectionId },

    /// Response to one `invoke`. Exactly one of `payload`/`error` is set.
    #[serde(rename_all = "camelCase")]
    Reply {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Unsolicited broadcast of a state change.
    #[serde(rename_all = "camelCase")]
    Event {
        name: EventKind,
        originator: ConnectionId,
        payload: String,
    },
}

impl ServerFrame {
    pub fn reply_ok(id: u64, payload: String) -> Self {
        ServerFrame::Reply {
            id,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn reply_err(id: u64, error: &SyncError) -> Self {
        ServerFrame::Reply {
            id,
            payload: None,
            error: Some(error.wire_message()),
        }
    }

    pub fn event(envelope: &Envelope) -> Self {
        ServerFrame::Event {
            name: envelope.event.kind(),
            originator: envelope.originator,
            payload: envelope.event.payload(),
        }
    }
}
