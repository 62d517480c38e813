//! The hub's RPC operations.
//!
//! Each operation is stateless per invocation: decode the payload, run
//! the store hook, serialize the result, and, for successful mutations
//! only, publish the matching broadcast. A store failure fails the RPC
//! and publishes nothing; broadcasting never precedes the store.

use std::sync::Arc;

use uuid::Uuid;

use crate::codec;
use crate::error::{Result, SyncError};
use crate::record::Record;
use crate::store::ModelStore;
use crate::sync::channel::BroadcastChannel;
use crate::sync::protocol::{Action, BroadcastEvent, ConnectionId, Envelope};

/// Per-connection context threaded through every hub call; the hub
/// itself holds no client state.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionContext {
    pub id: ConnectionId,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The server-side RPC endpoint: five operations over a pluggable
/// [`ModelStore`], re-broadcasting successful mutations to observers.
pub struct Hub {
    store: Arc<dyn ModelStore>,
    channel: BroadcastChannel,
}

impl Hub {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self {
            store,
            channel: BroadcastChannel::new(),
        }
    }

    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    pub fn store(&self) -> &Arc<dyn ModelStore> {
        &self.store
    }

    /// Route one invocation to its operation. A missing payload is the
    /// empty-object sentinel; `findAll` takes none at all.
    pub async fn dispatch(
        &self,
        ctx: &ConnectionContext,
        action: Action,
        payload: Option<&str>,
    ) -> Result<String> {
        let payload = payload.unwrap_or("{}");
        match action {
            Action::Create => self.create(ctx, payload).await,
            Action::Update => self.update(ctx, payload).await,
            Action::Find => self.find(payload).await,
            Action::FindAll => self.find_all().await,
            Action::Destroy => self.destroy(ctx, payload).await,
        }
    }

    /// Persist a new record and announce it as `created`.
    pub async fn create(&self, ctx: &ConnectionContext, data: &str) -> Result<String> {
        let record = codec::decode(data)?;
        let record = self.store.create_model(record).await?;
        let result = codec::encode_record(Some(&record));
        self.publish(ctx, BroadcastEvent::Created(record));
        Ok(result)
    }

    /// Persist changes and announce them as `updated`.
    pub async fn update(&self, ctx: &ConnectionContext, data: &str) -> Result<String> {
        let record = codec::decode(data)?;
        let record = self.store.update_model(record).await?;
        let result = codec::encode_record(Some(&record));
        self.publish(ctx, BroadcastEvent::Updated(record));
        Ok(result)
    }

    /// Look up by id. A miss is the `{}` sentinel, not a failure.
    pub async fn find(&self, data: &str) -> Result<String> {
        let record = codec::decode(data)?;
        let found = self.store.find_model(record).await?;
        Ok(codec::encode_record(found.as_ref()))
    }

    /// The full snapshot as a record-set payload.
    pub async fn find_all(&self) -> Result<String> {
        let records = self.store.find_models().await?;
        Ok(codec::encode_records(&records))
    }

    /// Delete by id and announce `destroyed`, but only when the store
    /// actually deleted something. A miss returns `{}` silently.
    pub async fn destroy(&self, ctx: &ConnectionContext, data: &str) -> Result<String> {
        let record = codec::decode(data)?;
        match self.store.delete_model(record).await? {
            Some(deleted) => {
                let result = codec::encode_record(Some(&deleted));
                self.publish(ctx, BroadcastEvent::Destroyed(deleted));
                Ok(result)
            }
            None => Ok(codec::encode_record(None)),
        }
    }

    /// Replace every observer's collection membership with `records`.
    ///
    /// Published on the hub's own behalf after bulk loads; not part of
    /// the client-invocable surface. Returns the observer count.
    pub fn reset_items(&self, records: &[Record]) -> usize {
        self.channel
            .publish(Envelope::from_hub(BroadcastEvent::Reset(records.to_vec())))
    }

    fn publish(&self, ctx: &ConnectionContext, event: BroadcastEvent) {
        let envelope = Envelope::new(ctx.id, event);
        let kind = envelope.event.kind();
        let at = envelope.published_at;
        let reached = self.channel.publish(envelope);
        tracing::debug!(?kind, observers = reached, %at, "broadcast published");
    }
}
