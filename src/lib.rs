//! # Modelhub - Real-Time Record Synchronization Hub
//!
//! Keeps local caches of records ("collections") consistent with a shared
//! server-side store and with each other by routing every mutation through
//! a central broadcast hub instead of point-to-point calls.
//!
//! ## Features
//!
//! - **CRUD over WebSocket**: `create`, `update`, `find`, `findAll`,
//!   `destroy` as hub-invoked remote procedures
//! - **Broadcast fan-out**: every successful mutation is re-announced to
//!   all connected observers
//! - **Idempotent reconciliation**: clients merge broadcasts into local
//!   collections without duplicates or lost updates, in any arrival order
//! - **Pluggable stores**: override only the persistence hooks you need
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use modelhub::{Collection, HubClient, Record, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reconciler = Reconciler::default();
//!     let items = Arc::new(Collection::new());
//!     reconciler.attach(items.clone());
//!
//!     let client = HubClient::connect("ws://localhost:3000/ws", reconciler).await?;
//!
//!     let mut task = Record::new();
//!     task.set("name", "write docs");
//!     let created = client.create(&task).await?;
//!     println!("assigned id: {:?}", created.id());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod hub;
pub mod record;
pub mod store;
pub mod sync;

// Re-export main types for library consumers
pub use error::{Result, StoreError, SyncError};
pub use hub::{ConnectionContext, Hub};
pub use record::Record;
pub use store::{MemoryStore, ModelStore};
pub use sync::{
    Action, BroadcastChannel, BroadcastEvent, BroadcastPolicy, Collection, ConnectionId,
    EchoPolicy, Envelope, EventKind, HubClient, Reconciler, SyncRequest, SyncResponse,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
