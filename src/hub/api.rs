use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::Query,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    routing::get,
};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::record::Record;
use crate::sync::channel::BroadcastPolicy;
use crate::sync::protocol::{ClientFrame, ServerFrame};
use super::service::{ConnectionContext, Hub};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub policy: BroadcastPolicy,
}

/// Run the hub on `port` until the task is cancelled.
///
/// `/ws` carries the sync protocol; the remaining routes are read-only
/// diagnostics and never a sync transport.
pub async fn serve(port: u16, hub: Arc<Hub>, policy: BroadcastPolicy) -> Result<()> {
    let state = AppState { hub, policy };

    let app = Router::new()
        .route("/", get(|| async { "Modelhub Sync Server" }))
        .route("/health", get(|| async { Json("OK") }))
        .route("/records", get(get_records))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    println!(
        "{} Hub listening at {}",
        "✓".green(),
        format!("http://{}", addr).bright_blue()
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state, socket))
}

async fn handle_ws(state: AppState, socket: WebSocket) {
    let ctx = ConnectionContext::new();
    tracing::debug!(connection = %ctx.id, "connection opened");

    let (mut sender, mut receiver) = socket.split();

    // Replies and events share one writer task owning the sink half.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();

    // Announce identity first so origin-aware clients can reconcile.
    let _ = out_tx.send(ServerFrame::Welcome {
        connection_id: ctx.id,
    });

    let write_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::error!(%err, "frame serialization failed"),
            }
        }
    });

    // Forward broadcasts this connection should observe. Fire-and-forget
    // from the publisher's side; a lagged observer just loses the oldest
    // events and self-heals on the next merge.
    let mut events = state.hub.channel().subscribe();
    let fwd_tx = out_tx.clone();
    let policy = state.policy;
    let observer = ctx.id;
    let forward_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => {
                    if !policy.delivers(&envelope, observer) {
                        continue;
                    }
                    if fwd_tx.send(ServerFrame::event(&envelope)).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(connection = %observer, skipped, "observer lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // RPC loop: decode invocations, dispatch, reply. A hub error becomes
    // the reply's error side; the connection itself stays healthy.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(ClientFrame::Invoke {
                    id,
                    action,
                    payload,
                }) => {
                    let reply = match state.hub.dispatch(&ctx, action, payload.as_deref()).await {
                        Ok(payload) => ServerFrame::reply_ok(id, payload),
                        Err(err) => {
                            tracing::debug!(connection = %ctx.id, %err, "invoke failed");
                            ServerFrame::reply_err(id, &err)
                        }
                    };
                    if out_tx.send(reply).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(connection = %ctx.id, %err, "ignoring unrecognized frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    forward_task.abort();
    drop(out_tx);
    let _ = write_task.await;
    tracing::debug!(connection = %ctx.id, "connection closed");
}

#[derive(Deserialize)]
struct RecordsQuery {
    limit: Option<usize>,
}

async fn get_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<Record>>, axum::http::StatusCode> {
    match state.hub.store().find_models().await {
        Ok(records) => {
            let limit = query.limit.unwrap_or(records.len());
            Ok(Json(records.into_iter().take(limit).collect()))
        }
        Err(err) => {
            tracing::error!(%err, "snapshot failed");
            Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
