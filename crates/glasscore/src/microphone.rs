// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced policy engine translating subscription facts into a
//! "required-data" command sent to the glasses (spec §4.3).
//!
//! All sends are best-effort: a failed send is logged and the next
//! keep-alive or subscription change retries the same (idempotent) policy.

use std::collections::BTreeSet;
use std::sync::Weak;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::Timings;
use crate::resource::ResourceTracker;
use crate::session::Session;
use crate::subscription::MediaSnapshot;

/// Component of `requiredData` the glasses should stream (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredData {
    Pcm,
    Transcription,
    PcmOrTranscription,
}

/// Last-sent `(enabled, requiredData)` tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SentState {
    enabled: bool,
    required_data: BTreeSet<RequiredData>,
}

struct Inner {
    last_sent: Option<SentState>,
    snapshot: MediaSnapshot,
    snapshot_at_ms: u64,
    hold_down: Option<CancellationToken>,
    keep_alive_armed: bool,
    /// Pending debounced `update_state` timer; canceled and replaced on every
    /// overlapping call so only the last one in a window actually sends.
    pending_update: Option<CancellationToken>,
    /// Latest desired `(enabled, requiredData)` requested while a debounce
    /// timer is pending; the timer sends this value, not the one captured at
    /// schedule time (spec §4.3 "send only the final value").
    desired: Option<SentState>,
    /// Pending debounced `handle_subscription_change` recompute timer.
    subscription_debounce: Option<CancellationToken>,
}

/// Drives `MICROPHONE_STATE_CHANGE` frames to the glasses from the session's
/// subscription facts, surviving rapid churn and reconnects.
pub struct MicrophoneManager {
    session: Weak<Session>,
    timings: Timings,
    inner: RwLock<Inner>,
    resources: ResourceTracker,
    unauthorized_guard: RwLock<Option<CancellationToken>>,
}

impl MicrophoneManager {
    pub fn new(session: Weak<Session>, timings: Timings) -> Self {
        Self {
            session,
            timings,
            inner: RwLock::new(Inner {
                last_sent: None,
                snapshot: MediaSnapshot { has_pcm: false, has_transcription: false, has_media: false },
                snapshot_at_ms: 0,
                hold_down: None,
                keep_alive_armed: false,
                pending_update: None,
                desired: None,
                subscription_debounce: None,
            }),
            resources: ResourceTracker::new(),
            unauthorized_guard: RwLock::new(None),
        }
    }

    /// `updateState(enabled, requiredData, delay)` (spec §4.3). The first
    /// call in a quiet period sends immediately; subsequent calls within
    /// `delay` cancel and replace the pending timer, so only the last call's
    /// value is sent once the window elapses.
    pub async fn update_state(
        self: &std::sync::Arc<Self>,
        enabled: bool,
        required_data: BTreeSet<RequiredData>,
        delay: std::time::Duration,
    ) {
        let required_data = if enabled { required_data } else { BTreeSet::new() };
        let desired = SentState { enabled, required_data };

        let should_send_immediately = {
            let mut inner = self.inner.write().await;
            let immediate = inner.last_sent.is_none();
            inner.desired = Some(desired.clone());
            immediate
        };

        if should_send_immediately {
            self.send_now(desired.enabled, desired.required_data).await;
            return;
        }

        let token = CancellationToken::new();
        let previous = self.inner.write().await.pending_update.replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let this = std::sync::Arc::clone(self);
        self.resources.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let desired = {
                        let mut inner = this.inner.write().await;
                        inner.pending_update = None;
                        inner.desired.take()
                    };
                    if let Some(desired) = desired {
                        this.send_if_changed(desired.enabled, desired.required_data).await;
                    }
                }
            }
        });
    }

    async fn send_if_changed(&self, enabled: bool, required_data: BTreeSet<RequiredData>) {
        let differs = {
            let inner = self.inner.read().await;
            match &inner.last_sent {
                Some(last) => last.enabled != enabled || last.required_data != required_data,
                None => true,
            }
        };
        if differs {
            self.send_now(enabled, required_data).await;
        }
    }

    async fn send_now(&self, enabled: bool, required_data: BTreeSet<RequiredData>) {
        let bypass_vad = self.inner.read().await.snapshot.has_pcm;
        self.inner.write().await.last_sent = Some(SentState { enabled, required_data: required_data.clone() });

        let Some(session) = self.session.upgrade() else { return };
        let frame = serde_json::json!({
            "type": "MICROPHONE_STATE_CHANGE",
            "isMicrophoneEnabled": enabled,
            "requiredData": required_data.iter().collect::<Vec<_>>(),
            "bypassVad": bypass_vad,
            "timestamp": crate::epoch_ms(),
        });
        if let Err(err) = session.send_upstream(frame).await {
            tracing::debug!(%err, "mic state send failed, will retry on next recompute");
        }
    }

    /// `handleSubscriptionChange()`: debounced 100ms recompute. Overlapping
    /// calls within the debounce window cancel and replace the pending timer
    /// (same pattern as [`Self::arm_hold_down`]), so N calls in one window
    /// produce exactly one `recompute_and_apply`. Arms a 3s hold-down before
    /// actually disabling the mic, absorbing transient reconnect churn.
    pub async fn handle_subscription_change(self: &std::sync::Arc<Self>) {
        let token = CancellationToken::new();
        let previous = self.inner.write().await.subscription_debounce.replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let this = std::sync::Arc::clone(self);
        let debounce = self.timings.mic_debounce();
        self.resources.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(debounce) => {
                    this.inner.write().await.subscription_debounce = None;
                    this.recompute_and_apply().await;
                }
            }
        });
    }

    async fn recompute_and_apply(self: &std::sync::Arc<Self>) {
        let Some(session) = self.session.upgrade() else { return };
        let snapshot = session.subscriptions().snapshot().await;
        self.refresh_snapshot(snapshot).await;

        if snapshot.has_media {
            if let Some(cancel) = self.inner.write().await.hold_down.take() {
                cancel.cancel();
            }
            self.turn_mic_on(snapshot).await;
        } else {
            self.arm_hold_down().await;
        }
    }

    async fn turn_mic_on(self: &std::sync::Arc<Self>, snapshot: MediaSnapshot) {
        let mut required = BTreeSet::new();
        if snapshot.has_pcm {
            required.insert(RequiredData::Pcm);
        }
        if snapshot.has_transcription {
            required.insert(RequiredData::Transcription);
        }
        if required.is_empty() {
            required.insert(RequiredData::PcmOrTranscription);
        }
        self.update_state(true, required, self.timings.mic_send_debounce()).await;
        self.ensure_keep_alive();
    }

    async fn arm_hold_down(self: &std::sync::Arc<Self>) {
        let this = std::sync::Arc::clone(self);
        let token = CancellationToken::new();
        self.inner.write().await.hold_down = Some(token.clone());
        let holddown = self.timings.mic_holddown();

        self.resources.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(holddown) => {
                    let still_off = {
                        let Some(session) = this.session.upgrade() else { return };
                        !session.subscriptions().has_media().await
                    };
                    if still_off {
                        this.update_state(false, BTreeSet::new(), this.timings.mic_send_debounce()).await;
                    }
                }
            }
        });
    }

    fn ensure_keep_alive(self: &std::sync::Arc<Self>) {
        let this = std::sync::Arc::clone(self);
        let interval = self.timings.mic_keepalive();
        self.resources.spawn(async move {
            {
                let mut inner = this.inner.write().await;
                if inner.keep_alive_armed {
                    return;
                }
                inner.keep_alive_armed = true;
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = this.session.upgrade() else { break };
                let snapshot = session.subscriptions().snapshot().await;
                this.refresh_snapshot(snapshot).await;

                if !snapshot.has_media {
                    this.inner.write().await.keep_alive_armed = false;
                    break;
                }

                let drifted = {
                    let inner = this.inner.read().await;
                    match &inner.last_sent {
                        Some(last) => last.enabled != snapshot.has_media,
                        None => true,
                    }
                };
                if drifted {
                    this.handle_connection_state_change(ConnectionEvent::Reconnected).await;
                } else {
                    this.turn_mic_on(snapshot).await;
                }
            }
        });
    }

    /// `handleConnectionStateChange("CONNECTED"|"RECONNECTED")`: force resync,
    /// bypassing debounce.
    pub async fn handle_connection_state_change(self: &std::sync::Arc<Self>, _event: ConnectionEvent) {
        let Some(session) = self.session.upgrade() else { return };
        let snapshot = session.subscriptions().snapshot().await;
        self.refresh_snapshot(snapshot).await;

        if snapshot.has_media {
            let mut required = BTreeSet::new();
            if snapshot.has_pcm {
                required.insert(RequiredData::Pcm);
            }
            if snapshot.has_transcription {
                required.insert(RequiredData::Transcription);
            }
            if required.is_empty() {
                required.insert(RequiredData::PcmOrTranscription);
            }
            self.send_now(true, required).await;
            self.ensure_keep_alive();
        } else {
            self.send_now(false, BTreeSet::new()).await;
        }
    }

    /// `onAudioReceived()`: unauthorized-audio guard.
    pub async fn on_audio_received(self: &std::sync::Arc<Self>) {
        let Some(session) = self.session.upgrade() else { return };
        let has_media = session.subscriptions().has_media().await;
        let enabled = self.inner.read().await.last_sent.as_ref().map(|s| s.enabled).unwrap_or(false);

        if !has_media {
            if self.unauthorized_guard.read().await.is_some() {
                return;
            }
            self.send_now(false, BTreeSet::new()).await;
            let token = CancellationToken::new();
            *self.unauthorized_guard.write().await = Some(token.clone());
            let this = std::sync::Arc::clone(self);
            let guard_window = self.timings.unauthorized_audio_guard();
            self.resources.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(guard_window) => {
                        *this.unauthorized_guard.write().await = None;
                    }
                }
            });
        } else if !enabled {
            self.handle_connection_state_change(ConnectionEvent::Reconnected).await;
        }
    }

    async fn refresh_snapshot(&self, snapshot: MediaSnapshot) {
        let mut inner = self.inner.write().await;
        inner.snapshot = snapshot;
        inner.snapshot_at_ms = crate::epoch_ms();
    }

    pub async fn snapshot(&self) -> (MediaSnapshot, u64) {
        let inner = self.inner.read().await;
        (inner.snapshot, inner.snapshot_at_ms)
    }

    pub async fn is_enabled(&self) -> bool {
        self.inner.read().await.last_sent.as_ref().map(|s| s.enabled).unwrap_or(false)
    }
}

/// The two connection events that force a mic resync (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Reconnected,
}

#[cfg(test)]
#[path = "microphone_tests.rs"]
mod tests;
