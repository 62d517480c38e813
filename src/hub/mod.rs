pub mod api;
pub mod service;

use std::sync::Arc;

use anyhow::Result;

use crate::store::MemoryStore;
use crate::sync::channel::BroadcastPolicy;

pub use api::{serve, AppState};
pub use service::{ConnectionContext, Hub};

/// Start a hub backed by a fresh in-memory store.
pub async fn start(port: u16, policy: BroadcastPolicy) -> Result<()> {
    let hub = Arc::new(Hub::new(Arc::new(MemoryStore::new())));
    api::serve(port, hub, policy).await
}
