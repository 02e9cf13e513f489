// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-`(userId, packageName)` state machine, subscription set, heartbeat,
//! and grace/resurrection timer (spec §3, §4.1).
//!
//! `enqueue` is the ordering primitive: every subscription update and every
//! lifecycle transition that must not race with it runs as a boxed future
//! pushed onto a single-consumer channel, so two overlapping updates for the
//! same app always apply in arrival order, regardless of which task noticed
//! them first.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::Timings;
use crate::error::CoreError;
use crate::resource::ResourceTracker;
use crate::session::Session;
use crate::subscription::{LanguageTag, StreamKey};
use crate::transport::DuplexChannel;

/// AppSession lifecycle states (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Connecting,
    Running,
    GracePeriod,
    Dormant,
    Resurrecting,
    Stopping,
    Stopped,
}

/// Per-AppSession cardinal location update rate (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationRate {
    Standard,
    High,
    Realtime,
    TenMeters,
    HundredMeters,
    Kilometer,
    ThreeKilometers,
    Reduced,
}

impl LocationRate {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "standard" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            "realtime" => Ok(Self::Realtime),
            "tenMeters" => Ok(Self::TenMeters),
            "hundredMeters" => Ok(Self::HundredMeters),
            "kilometer" => Ok(Self::Kilometer),
            "threeKilometers" => Ok(Self::ThreeKilometers),
            "reduced" => Ok(Self::Reduced),
            _ => Err(CoreError::MalformedMessage),
        }
    }
}

/// A bounded history record of a subscription change, kept for diagnostics
/// (spec §4.1: "record a bounded (≤50 entries) history record").
#[derive(Debug, Clone)]
pub struct SubscriptionHistoryEntry {
    pub at_ms: u64,
    pub old: IndexSet<StreamKey>,
    pub new: IndexSet<StreamKey>,
}

const MAX_HISTORY: usize = 50;

/// Result of an `updateSubscriptions` call (spec §4.1).
#[derive(Debug, Clone)]
pub struct SubscriptionUpdateOutcome {
    pub applied: bool,
    pub reason: Option<&'static str>,
}

type BoxedOp = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct Inner {
    state: AppState,
    channel: Option<Arc<dyn DuplexChannel>>,
    subscriptions: IndexSet<StreamKey>,
    location_rate: Option<LocationRate>,
    connected_at_ms: Option<u64>,
    disconnected_at_ms: Option<u64>,
    last_reconnect_ms: Option<u64>,
    ownership_released: bool,
    history: VecDeque<SubscriptionHistoryEntry>,
    pending_connect: Option<oneshot::Sender<()>>,
    grace_cancel: Option<CancellationToken>,
}

/// Per-app state holder managed by the [`Session`].
pub struct AppSession {
    pub package_name: String,
    session: Weak<Session>,
    inner: RwLock<Inner>,
    resources: ResourceTracker,
    timings: Timings,
    op_tx: mpsc::UnboundedSender<BoxedOp>,
    disposed: AtomicBool,
    /// Guards `handleConnect` re-entry so repeated calls are idempotent.
    connect_lock: Mutex<()>,
}

impl AppSession {
    pub fn new(package_name: impl Into<String>, session: Weak<Session>, timings: Timings) -> Arc<Self> {
        let (op_tx, op_rx) = mpsc::unbounded_channel::<BoxedOp>();
        let app = Arc::new(Self {
            package_name: package_name.into(),
            session,
            inner: RwLock::new(Inner {
                state: AppState::Stopped,
                channel: None,
                subscriptions: IndexSet::new(),
                location_rate: None,
                connected_at_ms: None,
                disconnected_at_ms: None,
                last_reconnect_ms: None,
                ownership_released: false,
                history: VecDeque::new(),
                pending_connect: None,
                grace_cancel: None,
            }),
            resources: ResourceTracker::new(),
            timings,
            op_tx,
            disposed: AtomicBool::new(false),
            connect_lock: Mutex::new(()),
        });

        let token = app.resources.token();
        app.resources.spawn(run_op_queue(op_rx, token));
        app
    }

    pub async fn state(&self) -> AppState {
        self.inner.read().await.state
    }

    pub async fn subscriptions(&self) -> IndexSet<StreamKey> {
        self.inner.read().await.subscriptions.clone()
    }

    pub async fn location_rate(&self) -> Option<LocationRate> {
        self.inner.read().await.location_rate
    }

    pub async fn is_open(&self) -> bool {
        match self.inner.read().await.channel.as_ref() {
            Some(ch) => ch.is_open(),
            None => false,
        }
    }

    /// Serialize `op` behind this AppSession's single-consumer queue (spec
    /// §4.1 `enqueue`). The future runs on the queue's background task, so
    /// two overlapping calls apply in the order they were enqueued; this
    /// call's failure (queue disposed) never blocks a later enqueue.
    pub async fn enqueue<F, T>(&self, op: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Pin<Box<dyn Future<Output = T> + Send>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let boxed: BoxedOp = Box::new(move || {
            Box::pin(async move {
                let result = op().await;
                let _ = tx.send(result);
            })
        });
        self.op_tx.send(boxed).map_err(|_| CoreError::InternalError)?;
        rx.await.map_err(|_| CoreError::InternalError)
    }

    /// Attach an open channel. Idempotent: re-entry while already `Running`
    /// just replaces the channel handle.
    pub async fn handle_connect(self: &Arc<Self>, channel: Arc<dyn DuplexChannel>) {
        let _guard = self.connect_lock.lock().await;
        let now = crate::epoch_ms();

        {
            let mut inner = self.inner.write().await;
            inner.channel = Some(channel);
            inner.state = AppState::Running;
            inner.connected_at_ms = Some(now);
            inner.disconnected_at_ms = None;
            inner.last_reconnect_ms = Some(now);
            inner.ownership_released = false;
            if let Some(cancel) = inner.grace_cancel.take() {
                cancel.cancel();
            }
            if let Some(tx) = inner.pending_connect.take() {
                let _ = tx.send(());
            }
        }

        self.spawn_heartbeat();
    }

    fn spawn_heartbeat(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let token = self.resources.child_token();
        let interval = self.timings.heartbeat();
        self.resources.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {
                        let channel = this.inner.read().await.channel.clone();
                        match channel {
                            Some(ch) if ch.is_open() => {
                                if let Err(err) = ch.ping().await {
                                    tracing::debug!(package = %this.package_name, %err, "heartbeat ping failed");
                                }
                            }
                            _ => return,
                        }
                    }
                }
            }
        });
    }

    /// Replace the subscription set. Rejected (without mutating state) if
    /// `new_list` is empty and the last reconnect was within the subscription
    /// grace window (spec §4.1).
    ///
    /// Routed through [`Self::enqueue`] so that two overlapping updates for
    /// this app, the state mutation and the downstream mic/language side
    /// effects, always apply in the order they arrived (the Issue 008 race
    /// fix named in spec §4.1/§8).
    pub async fn update_subscriptions(
        self: &Arc<Self>,
        new_list: IndexSet<StreamKey>,
        location_rate: Option<LocationRate>,
    ) -> SubscriptionUpdateOutcome {
        let this = Arc::clone(self);
        self.enqueue(move || Box::pin(async move { this.apply_subscription_update(new_list, location_rate).await }))
            .await
            .unwrap_or(SubscriptionUpdateOutcome { applied: false, reason: Some("app session disposed") })
    }

    async fn apply_subscription_update(
        self: &Arc<Self>,
        new_list: IndexSet<StreamKey>,
        location_rate: Option<LocationRate>,
    ) -> SubscriptionUpdateOutcome {
        let now = crate::epoch_ms();
        let mut inner = self.inner.write().await;

        if new_list.is_empty() {
            if let Some(last) = inner.last_reconnect_ms {
                let window_ms = self.timings.subscription_grace().as_millis() as u64;
                if now.saturating_sub(last) < window_ms {
                    return SubscriptionUpdateOutcome {
                        applied: false,
                        reason: Some("within subscription grace window"),
                    };
                }
            }
        }

        let old = inner.subscriptions.clone();
        inner.subscriptions = new_list.clone();
        if new_list.iter().any(|k| k.base() == crate::subscription::BaseStream::LocationStream) {
            inner.location_rate = location_rate;
        } else {
            inner.location_rate = None;
        }
        inner.history.push_back(SubscriptionHistoryEntry { at_ms: now, old: old.clone(), new: new_list.clone() });
        while inner.history.len() > MAX_HISTORY {
            inner.history.pop_front();
        }
        drop(inner);

        if let Some(session) = self.session.upgrade() {
            session.on_subscriptions_changed(&self.package_name, &old, &new_list).await;
        }

        SubscriptionUpdateOutcome { applied: true, reason: None }
    }

    /// Send a JSON value over the channel. Returns `false` if not open.
    pub async fn send(&self, value: serde_json::Value) -> bool {
        let channel = self.inner.read().await.channel.clone();
        match channel {
            Some(ch) if ch.is_open() => ch.send_text(value).await.is_ok(),
            _ => false,
        }
    }

    pub async fn close_connection(&self, code: u16, reason: impl Into<String>) {
        let channel = self.inner.write().await.channel.take();
        if let Some(ch) = channel {
            let _ = ch.close(code, reason.into()).await;
        }
    }

    /// Mark this app as released from ownership (spec §4.6 `OWNERSHIP_RELEASE`):
    /// the next close transitions to `DORMANT` rather than arming grace.
    pub async fn mark_ownership_released(&self) {
        self.inner.write().await.ownership_released = true;
    }

    /// Channel closed. Transitions per spec §4.1: `DORMANT` if ownership was
    /// released or the Session reports the user offline, else `GRACE_PERIOD`
    /// with a 5 s timer to `RESURRECTING`.
    pub async fn handle_channel_closed(self: &Arc<Self>) {
        let now = crate::epoch_ms();
        let (prior_state, ownership_released) = {
            let mut inner = self.inner.write().await;
            let prior = inner.state;
            inner.channel = None;
            inner.disconnected_at_ms = Some(now);
            (prior, inner.ownership_released)
        };

        if matches!(prior_state, AppState::Stopping | AppState::Stopped) {
            self.set_state(AppState::Stopped).await;
            return;
        }

        if ownership_released {
            self.set_state(AppState::Dormant).await;
            return;
        }

        self.set_state(AppState::GracePeriod).await;
        self.arm_grace_timer().await;
    }

    async fn arm_grace_timer(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let token = self.resources.child_token();
        self.inner.write().await.grace_cancel = Some(token.clone());
        let grace = self.timings.grace();
        self.resources.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    if this.state().await == AppState::GracePeriod {
                        this.fire_grace_expiry().await;
                    }
                }
            }
        });
    }

    async fn fire_grace_expiry(self: &Arc<Self>) {
        let user_offline = match self.session.upgrade() {
            Some(session) => session.is_user_offline().await,
            None => true,
        };

        if user_offline {
            self.set_state(AppState::Dormant).await;
            return;
        }

        self.set_state(AppState::Resurrecting).await;
        if let Some(session) = self.session.upgrade() {
            session.resurrect_app(&self.package_name).await;
        }
    }

    /// User/system-initiated stop.
    pub async fn stop(self: &Arc<Self>, code: u16, reason: impl Into<String>) {
        self.set_state(AppState::Stopping).await;
        self.close_connection(code, reason).await;
        self.set_state(AppState::Stopped).await;
    }

    async fn set_state(&self, state: AppState) {
        self.inner.write().await.state = state;
    }

    /// Idempotent teardown: cancels timers, clears subscriptions, rejects any
    /// pending connection promise.
    pub async fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let subs = {
            let mut inner = self.inner.write().await;
            inner.state = AppState::Stopped;
            inner.channel = None;
            if let Some(tx) = inner.pending_connect.take() {
                drop(tx);
            }
            std::mem::take(&mut inner.subscriptions)
        };

        if let Some(session) = self.session.upgrade() {
            session.subscriptions().clear(&self.package_name, &subs).await;
        }

        self.resources.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// A promise-like handle that resolves when `handle_connect` is next
    /// called, for callers awaiting the app's webhook-driven connect.
    pub async fn await_connect(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.write().await.pending_connect = Some(tx);
        rx
    }

    pub async fn history(&self) -> Vec<SubscriptionHistoryEntry> {
        self.inner.read().await.history.iter().cloned().collect()
    }
}

/// Background task that drains `rx` one boxed op at a time, in order.
async fn run_op_queue(mut rx: mpsc::UnboundedReceiver<BoxedOp>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            op = rx.recv() => {
                match op {
                    Some(op) => op().await,
                    None => return,
                }
            }
        }
    }
}

/// Canonicalize a raw wire list of `LanguageTag`-bearing subscription strings
/// before handing off to `SubscriptionManager::parse_list` — kept here so
/// app_dispatch can validate without importing subscription internals.
pub fn validate_language_tag(raw: &str) -> Result<LanguageTag, CoreError> {
    LanguageTag::parse(raw)
}

#[cfg(test)]
#[path = "app_session_tests.rs"]
mod tests;
