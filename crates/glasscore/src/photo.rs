// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! At-most-one-in-flight photo request coordinator (spec §4.4).
//!
//! Open Question (spec §9) resolved: a timed-out request is delivered to the
//! originating app as a typed `DATA_STREAM` carrying a `photo_response` with
//! an error field, rather than silently dropped — callers observe a result
//! either way, matching the "exactly one response delivery per request"
//! invariant in spec §8.

use std::collections::HashMap;
use std::sync::Weak;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::resource::ResourceTracker;
use crate::session::Session;

struct PendingPhoto {
    package_name: String,
    cancel_timeout: CancellationToken,
}

/// Per-session coordinator: `requestId -> (packageName, timeoutHandle)`.
pub struct PhotoManager {
    session: Weak<Session>,
    pending: RwLock<HashMap<String, PendingPhoto>>,
    resources: ResourceTracker,
    timeout: std::time::Duration,
}

/// Arguments to `requestPhoto` (spec §4.4).
#[derive(Debug, Clone)]
pub struct PhotoRequestArgs {
    pub package_name: String,
    pub request_id: String,
    pub save_to_gallery: bool,
    pub webhook_url: Option<String>,
}

/// Response delivered by the glasses for a photo request.
#[derive(Debug, Clone)]
pub struct PhotoResponseArgs {
    pub request_id: String,
    pub photo_url: String,
    pub saved_to_gallery: bool,
}

impl PhotoManager {
    pub fn new(session: Weak<Session>, timeout: std::time::Duration) -> Self {
        Self { session, pending: RwLock::new(HashMap::new()), resources: ResourceTracker::new(), timeout }
    }

    /// `requestPhoto`: fails if the upstream channel is not open; otherwise
    /// records a pending entry, arms a 30s timeout, and dispatches
    /// `PHOTO_REQUEST` upstream.
    pub async fn request_photo(self: &std::sync::Arc<Self>, args: PhotoRequestArgs) -> Result<String, CoreError> {
        let Some(session) = self.session.upgrade() else { return Err(CoreError::InternalError) };
        if !session.upstream_open().await {
            return Err(CoreError::InternalError);
        }

        let cancel_timeout = CancellationToken::new();
        self.pending.write().await.insert(
            args.request_id.clone(),
            PendingPhoto { package_name: args.package_name.clone(), cancel_timeout: cancel_timeout.clone() },
        );

        self.arm_timeout(args.request_id.clone(), cancel_timeout);

        let frame = serde_json::json!({
            "type": "PHOTO_REQUEST",
            "sessionId": session.session_id(),
            "requestId": args.request_id,
            "appId": args.package_name,
            "webhookUrl": args.webhook_url,
            "saveToGallery": args.save_to_gallery,
            "timestamp": crate::epoch_ms(),
        });

        if let Err(err) = session.send_upstream(frame).await {
            self.pending.write().await.remove(&args.request_id);
            tracing::debug!(%err, request_id = %args.request_id, "photo request send failed");
            return Err(CoreError::InternalError);
        }

        Ok(args.request_id)
    }

    fn arm_timeout(self: &std::sync::Arc<Self>, request_id: String, cancel: CancellationToken) {
        let this = std::sync::Arc::clone(self);
        let duration = self.timeout;
        self.resources.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    this.fire_timeout(request_id).await;
                }
            }
        });
    }

    async fn fire_timeout(&self, request_id: String) {
        let entry = self.pending.write().await.remove(&request_id);
        let Some(entry) = entry else { return };
        let Some(session) = self.session.upgrade() else { return };

        let frame = serde_json::json!({
            "type": "DATA_STREAM",
            "sessionId": session.sub_session_id(&entry.package_name),
            "streamType": "photo_response",
            "data": {
                "requestId": request_id,
                "error": "PHOTO_REQUEST_TIMEOUT",
            },
            "timestamp": crate::epoch_ms(),
        });
        session.send_to_app(&entry.package_name, frame).await;
    }

    /// `handlePhotoResponse`: unknown `requestId` (timed out or already
    /// processed) is logged and dropped.
    pub async fn handle_photo_response(&self, args: PhotoResponseArgs) {
        let entry = self.pending.write().await.remove(&args.request_id);
        let Some(entry) = entry else {
            tracing::debug!(request_id = %args.request_id, "photo response for unknown/expired request");
            return;
        };
        entry.cancel_timeout.cancel();

        let Some(session) = self.session.upgrade() else { return };
        let frame = serde_json::json!({
            "type": "DATA_STREAM",
            "sessionId": session.sub_session_id(&entry.package_name),
            "streamType": "photo_response",
            "data": {
                "requestId": args.request_id,
                "photoUrl": args.photo_url,
                "savedToGallery": args.saved_to_gallery,
            },
            "timestamp": crate::epoch_ms(),
        });
        session.send_to_app(&entry.package_name, frame).await;
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn has_pending(&self, request_id: &str) -> bool {
        self.pending.read().await.contains_key(request_id)
    }
}

#[cfg(test)]
#[path = "photo_tests.rs"]
mod tests;
