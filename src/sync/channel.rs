//! In-process fan-out for broadcast events.
//!
//! The hub publishes every post-mutation event here; each connection's
//! forwarding task holds a subscription. Delivery is fire-and-forget
//! relative to the RPC that triggered the event: the RPC replies without
//! waiting for any observer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::protocol::{ConnectionId, Envelope};

/// Buffered events per subscriber before a slow observer starts losing
/// the oldest ones (tokio broadcast lag semantics).
const CHANNEL_CAPACITY: usize = 1024;

/// Who receives a published event.
///
/// `Everyone` delivers to all connections including the originator,
/// relying on idempotent client-side merging; `ExceptOriginator`
/// suppresses the echo at dispatch time so the originating connection
/// never sees its own event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastPolicy {
    #[default]
    Everyone,
    ExceptOriginator,
}

impl BroadcastPolicy {
    /// Whether `envelope` should be forwarded to `observer`.
    pub fn delivers(self, envelope: &Envelope, observer: ConnectionId) -> bool {
        match self {
            BroadcastPolicy::Everyone => true,
            BroadcastPolicy::ExceptOriginator => envelope.originator != observer,
        }
    }
}

/// Publish/subscribe channel carrying [`Envelope`]s to all current
/// observers.
#[derive(Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<Arc<Envelope>>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.tx.subscribe()
    }

    /// Deliver an envelope to every current subscriber. Returns the
    /// number of observers it reached; zero observers is not an error.
    pub fn publish(&self, envelope: Envelope) -> usize {
        self.tx.send(Arc::new(envelope)).unwrap_or(0)
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::sync::protocol::BroadcastEvent;
    use uuid::Uuid;

    fn created(id: u64) -> BroadcastEvent {
        let mut record = Record::new();
        record.set_id(id);
        BroadcastEvent::Created(record)
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let channel = BroadcastChannel::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        let reached = channel.publish(Envelope::from_hub(created(1)));
        assert_eq!(reached, 2);

        let got_a = a.recv().await.unwrap();
        let got_b = b.recv().await.unwrap();
        assert_eq!(got_a.event, got_b.event);
    }

    #[tokio::test]
    async fn publish_without_observers_is_silent() {
        let channel = BroadcastChannel::new();
        assert_eq!(channel.publish(Envelope::from_hub(created(1))), 0);
    }

    #[test]
    fn policy_suppression_targets_only_the_originator() {
        let origin = Uuid::new_v4();
        let other = Uuid::new_v4();
        let envelope = Envelope::new(origin, created(1));

        assert!(BroadcastPolicy::Everyone.delivers(&envelope, origin));
        assert!(BroadcastPolicy::Everyone.delivers(&envelope, other));
        assert!(!BroadcastPolicy::ExceptOriginator.delivers(&envelope, origin));
        assert!(BroadcastPolicy::ExceptOriginator.delivers(&envelope, other));
    }
}
