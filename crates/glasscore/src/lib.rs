// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user cloud-side session core for a pair of glasses and its
//! third-party apps: one [`session::Session`] per connected user, holding
//! the upstream (glasses) channel, every downstream app's
//! [`app_session::AppSession`], and the managers that translate
//! subscription facts into device commands.

pub mod app_dispatch;
pub mod app_session;
pub mod calendar;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod location;
pub mod microphone;
pub mod photo;
pub mod registry;
pub mod resource;
pub mod session;
pub mod streaming;
pub mod subscription;
pub mod transcription;
pub mod transport;
pub mod upstream_dispatch;

mod messages;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::routing::get;
use axum::Router;

use crate::config::CoreConfig;
use crate::registry::SessionRegistry;
use crate::session::{AppCatalog, StaticAppCatalog};

/// Milliseconds since the Unix epoch, used for every timestamp this core
/// stamps on an outgoing frame or records in a history entry.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Build the axum router: glasses and app WebSocket upgrade endpoints backed
/// by a shared [`SessionRegistry`].
pub fn router(catalog: Arc<dyn AppCatalog>, config: &CoreConfig) -> Router {
    let registry = SessionRegistry::new(catalog, config.timings.clone());
    Router::new()
        .route("/ws/glasses", get(transport::ws::upstream_ws_handler))
        .route("/ws/app/{package_name}", get(transport::ws::app_ws_handler))
        .with_state(registry)
}

/// Bind and serve the core on `config.host:config.port` until the process is
/// signalled to stop. The app catalog is a placeholder in this standalone
/// binary; a real deployment wires in the external service named in spec §1.
pub async fn run(config: CoreConfig) -> anyhow::Result<()> {
    let catalog: Arc<dyn AppCatalog> = Arc::new(StaticAppCatalog::new());
    let app = router(catalog, &config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "glasscore listening");
    axum::serve(listener, app).await?;
    Ok(())
}
