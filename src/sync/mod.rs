pub mod channel;
pub mod client;
pub mod protocol;
pub mod reconciler;

pub use channel::{BroadcastChannel, BroadcastPolicy};
pub use client::{HubClient, SyncRequest, SyncResponse};
pub use protocol::{Action, BroadcastEvent, ConnectionId, Envelope, EventKind};
pub use reconciler::{Collection, EchoPolicy, Reconciler};

// Synchronization layer: wire frames, the hub's fan-out channel, and the
// client-side adapter/reconciler pair that keeps local collections
// consistent with broadcast state changes.
