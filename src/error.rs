//! Error types for the synchronization protocol.
//!
//! Not-found is not an error anywhere in the protocol: a `find` or
//! `destroy` that misses returns the empty-object sentinel as a success,
//! which keeps the client-side merge rules idempotent.

use thiserror::Error;

/// Result alias used throughout the protocol layer.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures surfaced by the hub, the transport, or the wire codec.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A wire payload could not be parsed into a record or record set.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// The connection dropped before a reply arrived.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The hub reported the operation as failed.
    #[error("hub error: {0}")]
    Rpc(String),

    /// A model store hook failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The client was shut down and accepts no further calls.
    #[error("connection closed")]
    Closed,
}

impl SyncError {
    pub fn decode(err: impl std::fmt::Display) -> Self {
        SyncError::Decode(err.to_string())
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        SyncError::Transport(err.to_string())
    }

    /// The message carried in a reply frame when this error fails an RPC.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }
}

/// Failure raised by a [`ModelStore`](crate::store::ModelStore) hook.
///
/// The hub catches this at the operation boundary: the RPC reports
/// failure and no broadcast is emitted.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
