//! WebSocket client: maps local CRUD intents onto hub procedures.
//!
//! The adapter owns the socket, a map of in-flight invocations, and the
//! [`Reconciler`] that inbound events are fed into. It never mutates a
//! collection itself: every state change, including the caller's own,
//! flows through the reconciler so there is a single code path for all
//! origins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::codec;
use crate::error::{Result, SyncError};
use crate::record::Record;
use super::protocol::{Action, ClientFrame, ConnectionId, Envelope, ServerFrame};
use super::reconciler::Reconciler;

/// The four abstract intents a local data layer produces.
///
/// `Read` with an identified record maps to `find`; `Read` without one
/// maps to `findAll`.
#[derive(Debug, Clone)]
pub enum SyncRequest {
    Create(Record),
    Read(Option<Record>),
    Update(Record),
    Delete(Record),
}

/// Decoded outcome of a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncResponse {
    Record(Record),
    Records(Vec<Record>),
    /// The empty-payload sentinel: find or destroy missed.
    Missing,
}

type PendingReply = oneshot::Sender<Result<Option<String>>>;

/// A live connection to a hub.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    next_id: AtomicU64,
    pending: DashMap<u64, PendingReply>,
    out: mpsc::UnboundedSender<Message>,
    connection_id: parking_lot::RwLock<Option<ConnectionId>>,
    reconciler: Reconciler,
    closed: AtomicBool,
}

impl HubClient {
    /// Connect to a hub and wait for its welcome frame.
    ///
    /// Inbound events are applied to `reconciler` for the lifetime of
    /// the connection.
    pub async fn connect(url: &str, reconciler: Reconciler) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| SyncError::Transport(format!("invalid ws url: {e}")))?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(SyncError::transport)?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let inner = Arc::new(ClientInner {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            out,
            connection_id: parking_lot::RwLock::new(None),
            reconciler,
            closed: AtomicBool::new(false),
        });

        // Writer: single task owns the sink half.
        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Reader: replies resolve pending invocations, events feed the
        // reconciler, everything else is logged and skipped.
        let (welcome_tx, welcome_rx) = oneshot::channel::<ConnectionId>();
        let reader_inner = inner.clone();
        tokio::spawn(async move {
            let mut welcome_tx = Some(welcome_tx);
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        reader_inner.handle_frame(text.as_str(), &mut welcome_tx);
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(%err, "socket read failed");
                        break;
                    }
                }
            }
            reader_inner.shut_down();
        });

        let connection_id = welcome_rx
            .await
            .map_err(|_| SyncError::Transport("connection closed during handshake".into()))?;
        tracing::debug!(%connection_id, "connected to hub");

        Ok(Self { inner })
    }

    /// The identity the hub assigned this connection.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        *self.inner.connection_id.read()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Ask the hub to close the connection. Pending calls resolve with a
    /// transport error once the socket drops.
    pub fn close(&self) {
        let _ = self.inner.out.send(Message::Close(None));
    }

    /// Dispatch one of the four abstract intents.
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncResponse> {
        match request {
            SyncRequest::Create(record) => self.create(&record).await.map(SyncResponse::Record),
            SyncRequest::Update(record) => self.update(&record).await.map(SyncResponse::Record),
            SyncRequest::Delete(record) => Ok(self
                .destroy(&record)
                .await?
                .map_or(SyncResponse::Missing, SyncResponse::Record)),
            SyncRequest::Read(Some(record)) if record.id().is_some() => Ok(self
                .find(&record)
                .await?
                .map_or(SyncResponse::Missing, SyncResponse::Record)),
            SyncRequest::Read(_) => self.find_all().await.map(SyncResponse::Records),
        }
    }

    /// Persist a new record; the reply carries the canonical record with
    /// its assigned id.
    pub async fn create(&self, record: &Record) -> Result<Record> {
        let reply = self
            .call(Action::Create, Some(codec::encode_record(Some(record))))
            .await?;
        codec::decode(reply.as_deref().unwrap_or("{}"))
    }

    pub async fn update(&self, record: &Record) -> Result<Record> {
        let reply = self
            .call(Action::Update, Some(codec::encode_record(Some(record))))
            .await?;
        codec::decode(reply.as_deref().unwrap_or("{}"))
    }

    /// Look up by id. `None` when the hub returned the `{}` sentinel.
    pub async fn find(&self, record: &Record) -> Result<Option<Record>> {
        let reply = self
            .call(Action::Find, Some(codec::encode_record(Some(record))))
            .await?;
        let found = codec::decode(reply.as_deref().unwrap_or("{}"))?;
        Ok((!found.is_empty()).then_some(found))
    }

    /// Fetch the full server-side snapshot.
    pub async fn find_all(&self) -> Result<Vec<Record>> {
        let reply = self.call(Action::FindAll, None).await?;
        codec::decode_records(reply.as_deref().unwrap_or("[]"))
    }

    /// Delete by id. `None` when nothing was deleted server-side.
    pub async fn destroy(&self, record: &Record) -> Result<Option<Record>> {
        let reply = self
            .call(Action::Destroy, Some(codec::encode_record(Some(record))))
            .await?;
        let deleted = codec::decode(reply.as_deref().unwrap_or("{}"))?;
        Ok((!deleted.is_empty()).then_some(deleted))
    }

    async fn call(&self, action: Action, payload: Option<String>) -> Result<Option<String>> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);

        // Recheck after insert: a teardown racing this call has already
        // drained the map, so the entry would otherwise never resolve.
        if self.is_closed() {
            self.inner.pending.remove(&id);
            return Err(SyncError::Closed);
        }

        let frame = ClientFrame::Invoke {
            id,
            action,
            payload,
        };
        let text = serde_json::to_string(&frame).map_err(SyncError::transport)?;
        if self.inner.out.send(Message::Text(text.into())).is_err() {
            self.inner.pending.remove(&id);
            return Err(SyncError::Transport("connection closed".into()));
        }

        rx.await
            .map_err(|_| SyncError::Transport("connection closed before reply".into()))?
    }
}

impl ClientInner {
    fn handle_frame(&self, text: &str, welcome_tx: &mut Option<oneshot::Sender<ConnectionId>>) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::Welcome { connection_id }) => {
                *self.connection_id.write() = Some(connection_id);
                self.reconciler.set_local_id(connection_id);
                if let Some(tx) = welcome_tx.take() {
                    let _ = tx.send(connection_id);
                }
            }
            Ok(ServerFrame::Reply { id, payload, error }) => {
                if let Some((_, tx)) = self.pending.remove(&id) {
                    let result = match error {
                        Some(message) => Err(SyncError::Rpc(message)),
                        None => Ok(payload),
                    };
                    let _ = tx.send(result);
                }
            }
            Ok(ServerFrame::Event {
                name,
                originator,
                payload,
            }) => match Envelope::from_wire(name, originator, &payload) {
                Ok(envelope) => self.reconciler.apply(&envelope),
                Err(err) => tracing::warn!(%err, "dropping undecodable event"),
            },
            Err(err) => tracing::debug!(%err, "ignoring unrecognized frame"),
        }
    }

    /// Resolve every in-flight call with a transport error; a pending
    /// operation must never be left unresolved.
    fn shut_down(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let stranded: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in stranded {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(SyncError::Transport(
                    "connection closed before reply".into(),
                )));
            }
        }
        tracing::debug!("hub connection closed");
    }
}
