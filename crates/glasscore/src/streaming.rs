// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RTMP streaming extensions (spec §4.5/§4.6): a "managed" extension (the
//! core owns the RTMP destination, e.g. a built-in relay) and an
//! "unmanaged" one (the app supplies its own RTMP URL). Both react to
//! `RTMP_STREAM_STATUS`/`KEEP_ALIVE_ACK` from upstream and accept
//! `RTMP_STREAM_REQUEST`/`STOP`/`MANAGED_STREAM_*`/`STREAM_STATUS_CHECK`
//! from apps.
//!
//! Retained precedence rule (spec §9 open question): when both extensions
//! have claimed a stream for the same request, the managed extension's
//! status wins and only one `STREAM_STATUS_CHECK_RESPONSE` is ever forwarded.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use crate::error::CoreError;

/// One active (or recently active) RTMP stream, keyed by `packageName`.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub package_name: String,
    pub status: String,
}

/// A streaming extension: claims ownership of status updates for streams it
/// started, and answers status-check requests from apps.
///
/// Object-safe so the upstream dispatcher can hold both extensions as
/// `Box<dyn StreamExtension>` without committing to managed vs. unmanaged.
pub trait StreamExtension: Send + Sync + 'static {
    /// Attempt to claim an `RTMP_STREAM_STATUS` update. Returns `true` if
    /// this extension owns the stream referenced in `payload` (and has
    /// recorded the update); `false` if the dispatcher should try the next
    /// extension in line.
    fn try_claim_status<'a>(
        &'a self,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// `KEEP_ALIVE_ACK` is delivered to every extension unconditionally;
    /// each filters by its own known streams.
    fn handle_keep_alive_ack<'a>(
        &'a self,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// Current cached status for `package_name`, if this extension owns it.
    fn status_for<'a>(
        &'a self,
        package_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<StreamState>> + Send + 'a>>;
}

/// Core-owned RTMP relay: the app requests a stream and the core supplies
/// the destination URL.
#[derive(Default)]
pub struct ManagedStreamExtension {
    streams: RwLock<HashMap<String, StreamState>>,
}

impl ManagedStreamExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self, package_name: &str) -> Result<(), CoreError> {
        self.streams.write().await.insert(
            package_name.to_owned(),
            StreamState { package_name: package_name.to_owned(), status: "starting".to_owned() },
        );
        Ok(())
    }

    pub async fn stop(&self, package_name: &str) {
        self.streams.write().await.remove(package_name);
    }
}

impl StreamExtension for ManagedStreamExtension {
    fn try_claim_status<'a>(
        &'a self,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let Some(package_name) = payload.get("packageName").and_then(|v| v.as_str()) else {
                return false;
            };
            let mut streams = self.streams.write().await;
            let Some(entry) = streams.get_mut(package_name) else { return false };
            if let Some(status) = payload.get("status").and_then(|v| v.as_str()) {
                entry.status = status.to_owned();
            }
            true
        })
    }

    fn handle_keep_alive_ack<'a>(
        &'a self,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(package_name) = payload.get("packageName").and_then(|v| v.as_str()) else { return };
            let mut streams = self.streams.write().await;
            if let Some(entry) = streams.get_mut(package_name) {
                entry.status = "alive".to_owned();
            }
        })
    }

    fn status_for<'a>(
        &'a self,
        package_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<StreamState>> + Send + 'a>> {
        Box::pin(async move { self.streams.read().await.get(package_name).cloned() })
    }
}

/// App-supplied RTMP destination; the core just relays status.
#[derive(Default)]
pub struct UnmanagedStreamExtension {
    streams: RwLock<HashMap<String, StreamState>>,
}

impl UnmanagedStreamExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self, package_name: &str, _rtmp_url: &str) -> Result<(), CoreError> {
        self.streams.write().await.insert(
            package_name.to_owned(),
            StreamState { package_name: package_name.to_owned(), status: "starting".to_owned() },
        );
        Ok(())
    }

    pub async fn stop(&self, package_name: &str) {
        self.streams.write().await.remove(package_name);
    }
}

impl StreamExtension for UnmanagedStreamExtension {
    fn try_claim_status<'a>(
        &'a self,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let Some(package_name) = payload.get("packageName").and_then(|v| v.as_str()) else {
                return false;
            };
            let mut streams = self.streams.write().await;
            let Some(entry) = streams.get_mut(package_name) else { return false };
            if let Some(status) = payload.get("status").and_then(|v| v.as_str()) {
                entry.status = status.to_owned();
            }
            true
        })
    }

    fn handle_keep_alive_ack<'a>(
        &'a self,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(package_name) = payload.get("packageName").and_then(|v| v.as_str()) else { return };
            let mut streams = self.streams.write().await;
            if let Some(entry) = streams.get_mut(package_name) {
                entry.status = "alive".to_owned();
            }
        })
    }

    fn status_for<'a>(
        &'a self,
        package_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<StreamState>> + Send + 'a>> {
        Box::pin(async move { self.streams.read().await.get(package_name).cloned() })
    }
}

/// Resolve a single `STREAM_STATUS_CHECK_RESPONSE` for `package_name`,
/// preferring the managed extension when both have a status (spec §9).
pub async fn resolve_status_precedence(
    managed: &ManagedStreamExtension,
    unmanaged: &UnmanagedStreamExtension,
    package_name: &str,
) -> Option<StreamState> {
    if let Some(state) = managed.status_for(package_name).await {
        return Some(state);
    }
    unmanaged.status_for(package_name).await
}

/// `RTMP_STREAM_STATUS`: try the managed extension first; if unclaimed, the
/// unmanaged extension.
pub async fn dispatch_stream_status(
    managed: &ManagedStreamExtension,
    unmanaged: &UnmanagedStreamExtension,
    payload: &serde_json::Value,
) {
    if managed.try_claim_status(payload).await {
        return;
    }
    unmanaged.try_claim_status(payload).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn managed_precedence_wins_when_both_present() {
        let managed = ManagedStreamExtension::new();
        let unmanaged = UnmanagedStreamExtension::new();
        managed.start("app.a").await.unwrap();
        unmanaged.start("app.a", "rtmp://example").await.unwrap();

        let resolved = resolve_status_precedence(&managed, &unmanaged, "app.a").await;
        assert_eq!(resolved.unwrap().status, "starting");
    }

    #[tokio::test]
    async fn falls_back_to_unmanaged_when_unclaimed_by_managed() {
        let managed = ManagedStreamExtension::new();
        let unmanaged = UnmanagedStreamExtension::new();
        unmanaged.start("app.b", "rtmp://example").await.unwrap();

        let payload = serde_json::json!({"packageName": "app.b", "status": "live"});
        dispatch_stream_status(&managed, &unmanaged, &payload).await;

        let resolved = resolve_status_precedence(&managed, &unmanaged, "app.b").await;
        assert_eq!(resolved.unwrap().status, "live");
    }
}
