// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user cloud-side object owning the upstream channel, all AppSessions,
//! and the managers (spec §3, §4.1-4.6 via the two dispatch modules).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::app_dispatch;
use crate::app_session::AppSession;
use crate::calendar::CalendarManager;
use crate::config::Timings;
use crate::dashboard::{DashboardManager, DisplayManager};
use crate::error::CoreError;
use crate::location::LocationManager;
use crate::microphone::MicrophoneManager;
use crate::photo::PhotoManager;
use crate::resource::ResourceTracker;
use crate::streaming::{ManagedStreamExtension, UnmanagedStreamExtension};
use crate::subscription::{StreamKey, SubscriptionManager};
use crate::transcription::TranscriptionManager;
use crate::transport::{DuplexChannel, TransportError};
use crate::upstream_dispatch;

/// Permission an app may require before a privileged action is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Camera,
}

/// External app-catalog lookup (spec §1: persistence is out of scope; the
/// core consumes it only through this interface).
pub trait AppCatalog: Send + Sync + 'static {
    fn package_exists<'a>(&'a self, package_name: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    fn has_permission<'a>(
        &'a self,
        package_name: &'a str,
        permission: Permission,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// In-memory app catalog, standing in for the external service in tests and
/// as a conservative default (no app has any permission unless registered).
#[derive(Default)]
pub struct StaticAppCatalog {
    packages: std::collections::HashSet<String>,
    permissions: std::collections::HashSet<(String, Permission)>,
}

impl StaticAppCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, package_name: impl Into<String>) -> &mut Self {
        self.packages.insert(package_name.into());
        self
    }

    pub fn grant(&mut self, package_name: impl Into<String>, permission: Permission) -> &mut Self {
        self.permissions.insert((package_name.into(), permission));
        self
    }
}

impl AppCatalog for StaticAppCatalog {
    fn package_exists<'a>(&'a self, package_name: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move { self.packages.contains(package_name) })
    }

    fn has_permission<'a>(
        &'a self,
        package_name: &'a str,
        permission: Permission,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move { self.permissions.contains(&(package_name.to_owned(), permission)) })
    }
}

struct PendingLanguageDebounce {
    cancel: CancellationToken,
}

/// Per-user session: owns the upstream channel, all AppSessions, and every
/// manager. Managers hold `Weak<Session>` back-references (spec §3).
pub struct Session {
    pub user_id: String,
    session_id: String,
    upstream: RwLock<Option<Arc<dyn DuplexChannel>>>,
    apps: RwLock<IndexMap<String, Arc<AppSession>>>,
    subscriptions: Arc<SubscriptionManager>,
    pub microphone: Arc<MicrophoneManager>,
    pub photo: Arc<PhotoManager>,
    pub transcription: TranscriptionManager,
    pub location: LocationManager,
    pub calendar: CalendarManager,
    pub display: DisplayManager,
    pub dashboard: DashboardManager,
    pub managed_stream: ManagedStreamExtension,
    pub unmanaged_stream: UnmanagedStreamExtension,
    /// `AUDIO_PLAY_REQUEST requestId -> originating packageName`, so the
    /// matching `AUDIO_PLAY_RESPONSE` routes back to the right app.
    audio_play_origin: RwLock<HashMap<String, String>>,
    /// Last datetime value observed from upstream, handed to an app the
    /// moment it subscribes to `custom_message` (spec §3, §4.6).
    last_datetime: RwLock<Option<serde_json::Value>>,
    catalog: Arc<dyn AppCatalog>,
    timings: Timings,
    resources: ResourceTracker,
    user_offline: AtomicBool,
    /// WiFi connectivity as last reported by an external signal (spec §6/§7
    /// `WIFI_NOT_CONNECTED`); defaults to connected absent any report.
    wifi_connected: AtomicBool,
    language_debounce: Mutex<Option<PendingLanguageDebounce>>,
}

impl Session {
    /// Construct a new Session and wire up every manager's `Weak<Session>`
    /// back-reference via `Arc::new_cyclic`.
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        channel: Arc<dyn DuplexChannel>,
        catalog: Arc<dyn AppCatalog>,
        timings: Timings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Session>| Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            upstream: RwLock::new(Some(channel)),
            apps: RwLock::new(IndexMap::new()),
            subscriptions: Arc::new(SubscriptionManager::new()),
            microphone: Arc::new(MicrophoneManager::new(weak.clone(), timings.clone())),
            photo: Arc::new(PhotoManager::new(weak.clone(), timings.photo_timeout())),
            transcription: TranscriptionManager::new(weak.clone()),
            location: LocationManager::new(weak.clone()),
            calendar: CalendarManager::new(),
            display: DisplayManager::new(weak.clone()),
            dashboard: DashboardManager::new(weak.clone()),
            managed_stream: ManagedStreamExtension::new(),
            unmanaged_stream: UnmanagedStreamExtension::new(),
            audio_play_origin: RwLock::new(HashMap::new()),
            last_datetime: RwLock::new(None),
            catalog,
            timings,
            resources: ResourceTracker::new(),
            user_offline: AtomicBool::new(false),
            wifi_connected: AtomicBool::new(true),
            language_debounce: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Per-(session, package) sub-session id stamped onto every frame an app
    /// receives (spec §4.5), so two apps on the same session never see the
    /// same `sessionId` on a fanned-out frame.
    pub fn sub_session_id(&self, package_name: &str) -> String {
        format!("{}:{}", self.session_id, package_name)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.resources.token()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn catalog(&self) -> &Arc<dyn AppCatalog> {
        &self.catalog
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub async fn upstream_open(&self) -> bool {
        self.upstream.read().await.as_ref().map(|c| c.is_open()).unwrap_or(false)
    }

    pub async fn set_user_offline(&self, offline: bool) {
        self.user_offline.store(offline, Ordering::SeqCst);
    }

    pub async fn is_user_offline(&self) -> bool {
        self.user_offline.load(Ordering::SeqCst)
    }

    pub fn is_wifi_connected(&self) -> bool {
        self.wifi_connected.load(Ordering::SeqCst)
    }

    pub fn set_wifi_connected(&self, connected: bool) {
        self.wifi_connected.store(connected, Ordering::SeqCst);
    }

    /// Replace the upstream channel on (re)connect, without disturbing any
    /// AppSession state — `GLASSES_CONNECTION_STATE` / reconnect logic lives
    /// in the upstream dispatcher and `MicrophoneManager`.
    pub async fn attach_upstream(&self, channel: Arc<dyn DuplexChannel>) {
        *self.upstream.write().await = Some(channel);
    }

    pub async fn send_upstream(&self, value: serde_json::Value) -> Result<(), TransportError> {
        let channel = self.upstream.read().await.clone();
        match channel {
            Some(ch) if ch.is_open() => ch.send_text(value).await,
            _ => Err(TransportError("upstream not open".to_owned())),
        }
    }

    /// Register (or replace) an AppSession for `package_name`, creating it
    /// in `STOPPED` state if it doesn't exist yet (mirrors `startApp` lazily
    /// on first connect, since the core has no separate webhook dispatcher).
    pub async fn app(&self, package_name: &str) -> Option<Arc<AppSession>> {
        self.apps.read().await.get(package_name).cloned()
    }

    pub async fn apps_snapshot(&self) -> Vec<Arc<AppSession>> {
        self.apps.read().await.values().cloned().collect()
    }

    /// Attach a channel from a connecting app, creating its AppSession if
    /// this is the first connection. Returns `None` if the catalog does not
    /// know the package (spec §4.6 `PACKAGE_NOT_FOUND`).
    pub async fn attach_app(
        self: &Arc<Self>,
        package_name: &str,
        channel: Arc<dyn DuplexChannel>,
    ) -> Option<Arc<AppSession>> {
        if !self.catalog.package_exists(package_name).await {
            return None;
        }

        let app = {
            let mut apps = self.apps.write().await;
            apps.entry(package_name.to_owned())
                .or_insert_with(|| AppSession::new(package_name, Arc::downgrade(self), self.timings.clone()))
                .clone()
        };
        app.handle_connect(channel).await;
        Some(app)
    }

    pub async fn send_to_app(&self, package_name: &str, value: serde_json::Value) {
        let Some(app) = self.apps.read().await.get(package_name).cloned() else { return };
        if !app.send(value).await {
            tracing::debug!(%package_name, "send_to_app failed, channel not open");
        }
    }

    /// Fan-out delivery: one `DATA_STREAM` per recipient subscribed to
    /// `stream_key`, stamped with that app's matching subscription key.
    pub async fn relay_to_apps(&self, stream_key: &StreamKey, data: serde_json::Value) {
        let recipients = self.subscriptions.get_subscribed_apps(stream_key).await;
        for package_name in recipients {
            let frame = serde_json::json!({
                "type": "DATA_STREAM",
                "sessionId": self.sub_session_id(&package_name),
                "streamType": stream_key.to_string(),
                "data": data,
                "timestamp": crate::epoch_ms(),
            });
            self.send_to_app(&package_name, frame).await;
        }
    }

    /// Relay `TOUCH_EVENT` to the union of base and gesture-qualified
    /// subscribers (spec §4.5, §8 scenario 6).
    pub async fn relay_touch_event(&self, gesture: &str, data: serde_json::Value) {
        let key = StreamKey::Gesture { base: crate::subscription::BaseStream::TouchEvent, gesture: gesture.to_owned() };
        self.relay_to_apps(&key, data).await;
    }

    pub async fn record_audio_play_origin(&self, request_id: &str, package_name: &str) {
        self.audio_play_origin.write().await.insert(request_id.to_owned(), package_name.to_owned());
    }

    pub async fn take_audio_play_origin(&self, request_id: &str) -> Option<String> {
        self.audio_play_origin.write().await.remove(request_id)
    }

    pub async fn record_datetime(&self, value: serde_json::Value) {
        *self.last_datetime.write().await = Some(value);
    }

    pub async fn cached_datetime(&self) -> Option<serde_json::Value> {
        self.last_datetime.read().await.clone()
    }

    /// Called from `AppSession::update_subscriptions` after the set is
    /// replaced locally: applies the change into the session-wide
    /// `SubscriptionManager`, then schedules the mic/language side effects
    /// (spec §4.2, §4.3, §4.6).
    pub async fn on_subscriptions_changed(
        self: &Arc<Self>,
        package_name: &str,
        old: &IndexSet<StreamKey>,
        new: &IndexSet<StreamKey>,
    ) {
        let language_changed = self.subscriptions.apply(package_name, old, new).await;
        self.microphone.handle_subscription_change().await;

        if language_changed {
            self.schedule_language_debounce().await;
        }

        self.notify_app_state_change(package_name).await;
    }

    /// 500ms debounced notification to the mic manager on language-set
    /// change, coalesced per-session (spec §4.6).
    async fn schedule_language_debounce(self: &Arc<Self>) {
        let mut guard = self.language_debounce.lock().await;
        if let Some(pending) = guard.take() {
            pending.cancel.cancel();
        }
        let cancel = CancellationToken::new();
        *guard = Some(PendingLanguageDebounce { cancel: cancel.clone() });
        drop(guard);

        let this = Arc::clone(self);
        let delay = self.timings.language_debounce();
        self.resources.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    this.microphone.handle_subscription_change().await;
                }
            }
        });
    }

    async fn notify_app_state_change(&self, package_name: &str) {
        let frame = serde_json::json!({
            "type": "APP_STATE_CHANGE",
            "sessionId": self.session_id,
            "packageName": package_name,
            "timestamp": crate::epoch_ms(),
        });
        let _ = self.send_upstream(frame).await;
    }

    /// Raw upstream text frame, entry point from the transport layer.
    pub async fn dispatch_upstream_text(self: &Arc<Self>, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(%err, "malformed upstream frame");
                return;
            }
        };
        upstream_dispatch::dispatch(self, value).await;
    }

    pub async fn dispatch_upstream_binary(self: &Arc<Self>, _bytes: bytes::Bytes) {
        self.microphone.on_audio_received().await;
    }

    /// Upstream channel closed: every RUNNING AppSession independently
    /// enters GRACE_PERIOD (spec §7 "no explicit glasses-lost frame").
    pub async fn handle_upstream_closed(self: &Arc<Self>) {
        *self.upstream.write().await = None;
        for app in self.apps_snapshot().await {
            if app.state().await == crate::app_session::AppState::Running {
                app.handle_channel_closed().await;
            }
        }
    }

    pub async fn dispatch_app_text(self: &Arc<Self>, package_name: &str, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                self.send_connection_error(package_name, CoreError::MalformedMessage, "invalid JSON").await;
                return;
            }
        };
        app_dispatch::dispatch(self, package_name, value).await;
    }

    /// Send `CONNECTION_ERROR` and, if the error code requires it, close the
    /// channel with code 1008 (spec §7).
    pub async fn send_connection_error(&self, package_name: &str, error: CoreError, message: impl Into<String>) {
        let body = error.to_connection_error(message, crate::epoch_ms());
        let frame = serde_json::json!({
            "type": "CONNECTION_ERROR",
            "code": body.code,
            "message": body.message,
            "timestamp": body.timestamp,
        });
        self.send_to_app(package_name, frame).await;
        if error.closes_channel() {
            if let Some(app) = self.app(package_name).await {
                app.close_connection(1008, error.as_str()).await;
            }
        }
    }

    pub async fn resurrect_app(self: &Arc<Self>, package_name: &str) {
        tracing::info!(%package_name, "resurrecting app (webhook dispatch is an external collaborator)");
    }

    pub async fn dispose(self: &Arc<Self>) {
        for app in self.apps_snapshot().await {
            app.dispose().await;
        }
        if let Some(channel) = self.upstream.write().await.take() {
            let _ = channel.close(1000, "session replaced".to_owned()).await;
        }
        self.resources.dispose();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
