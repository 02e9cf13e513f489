// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! axum WebSocket adapter: implements [`DuplexChannel`] over a split
//! `axum::extract::ws::WebSocket`, and the two upgrade handlers (upstream
//! glasses connection, downstream app connection).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::registry::SessionRegistry;
use crate::transport::{DuplexChannel, OpenFlag, TransportError};

/// Concrete [`DuplexChannel`] backed by an axum WebSocket split sink, driven
/// by a background task owned by the handler functions below.
pub struct WsChannel {
    out_tx: mpsc::UnboundedSender<WsMessage>,
    open: OpenFlag,
}

impl WsChannel {
    fn new(out_tx: mpsc::UnboundedSender<WsMessage>) -> Arc<Self> {
        Arc::new(Self { out_tx, open: OpenFlag::new_open() })
    }

    fn mark_closed(&self) {
        self.open.close();
    }
}

impl DuplexChannel for WsChannel {
    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn send_text(
        &self,
        value: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            let text = serde_json::to_string(&value).map_err(|e| TransportError(e.to_string()))?;
            self.out_tx
                .send(WsMessage::Text(text.into()))
                .map_err(|_| TransportError("channel closed".to_owned()))
        })
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            self.out_tx
                .send(WsMessage::Ping(Vec::new().into()))
                .map_err(|_| TransportError("channel closed".to_owned()))
        })
    }

    fn close(
        &self,
        code: u16,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            self.mark_closed();
            let frame = axum::extract::ws::CloseFrame { code, reason: reason.into() };
            let _ = self.out_tx.send(WsMessage::Close(Some(frame)));
            Ok(())
        })
    }
}

/// Query parameters for the upstream (glasses) WebSocket upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamWsQuery {
    pub user_id: String,
    pub session_id: Option<String>,
}

/// `GET /ws/glasses` — upstream glasses connection upgrade.
pub async fn upstream_ws_handler(
    State(registry): State<Arc<SessionRegistry>>,
    Query(query): Query<UpstreamWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_upstream_socket(socket, registry, query.user_id))
}

async fn handle_upstream_socket(socket: WebSocket, registry: Arc<SessionRegistry>, user_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
    let channel = WsChannel::new(out_tx);

    let session = registry.create_or_replace(user_id.clone(), Arc::clone(&channel) as Arc<dyn DuplexChannel>).await;
    let cancel = session.cancellation_token();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        if ws_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        session.dispatch_upstream_text(&text).await;
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        session.dispatch_upstream_binary(bytes.into()).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(user_id = %user_id, %err, "upstream WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    channel.mark_closed();
    session.handle_upstream_closed().await;
}

/// Query parameters for the downstream app WebSocket upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct AppWsQuery {
    pub user_id: String,
    pub package_name: String,
}

/// `GET /ws/app/{package_name}` — downstream third-party app connection upgrade.
pub async fn app_ws_handler(
    State(registry): State<Arc<SessionRegistry>>,
    Path(package_name): Path<String>,
    Query(query): Query<AppWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let _ = package_name;
    ws.on_upgrade(move |socket| handle_app_socket(socket, registry, query.user_id, query.package_name))
}

async fn handle_app_socket(
    socket: WebSocket,
    registry: Arc<SessionRegistry>,
    user_id: String,
    package_name: String,
) {
    let Some(session) = registry.get(&user_id).await else {
        return;
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
    let channel = WsChannel::new(out_tx);

    let Some(app) = session.attach_app(&package_name, Arc::clone(&channel) as Arc<dyn DuplexChannel>).await else {
        let _ = ws_tx
            .send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                code: 1008,
                reason: "PACKAGE_NOT_FOUND".into(),
            })))
            .await;
        return;
    };
    let cancel = session.cancellation_token();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        if ws_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        session.dispatch_app_text(&package_name, &text).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%package_name, %err, "app WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    channel.mark_closed();
    app.handle_channel_closed().await;
}
