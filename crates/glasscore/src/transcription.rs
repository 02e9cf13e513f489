// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcription/VAD bookkeeping (spec §4.5 `VAD`/`LOCAL_TRANSCRIPTION` rows).
//!
//! The core does not transcribe audio itself; it tracks which language
//! tuples are currently "active" upstream so a `VAD:false` can finalize
//! pending tokens and tear down idle streams while preserving translation
//! subscriptions for a later resume.

use std::collections::HashSet;
use std::sync::Weak;

use tokio::sync::RwLock;

use crate::session::Session;
use crate::subscription::LanguageTuple;

/// Tracks which transcription streams are currently considered "active"
/// upstream, independent of the subscription set (which survives a
/// `VAD:false` teardown so the app doesn't need to resubscribe).
pub struct TranscriptionManager {
    session: Weak<Session>,
    active: RwLock<HashSet<LanguageTuple>>,
}

impl TranscriptionManager {
    pub fn new(session: Weak<Session>) -> Self {
        Self { session, active: RwLock::new(HashSet::new()) }
    }

    /// `VAD:true` — ensure a transcription (and translation, if requested)
    /// stream exists for every currently subscribed language tuple.
    pub async fn ensure_streams_active(&self) {
        let Some(session) = self.session.upgrade() else { return };
        let tuples = session.subscriptions().minimal_language_subscriptions().await;
        *self.active.write().await = tuples.into_iter().collect();
    }

    /// `VAD:false` — finalize pending tokens and tear down idle streams.
    /// Translation subscriptions themselves are untouched; only the
    /// "active upstream stream" bookkeeping is cleared, so a later
    /// `VAD:true` re-derives exactly the same set from subscriptions.
    pub async fn teardown_idle_streams(&self) {
        self.active.write().await.clear();
    }

    pub async fn active_tuples(&self) -> Vec<LanguageTuple> {
        self.active.read().await.iter().cloned().collect()
    }

    /// `LOCAL_TRANSCRIPTION`: fan out the transcript to subscribed apps. The
    /// caller (upstream dispatcher) already resolved the stream key; this
    /// just forwards the already-shaped payload.
    pub async fn relay_transcript(&self, stream_key: &crate::subscription::StreamKey, payload: serde_json::Value) {
        let Some(session) = self.session.upgrade() else { return };
        session.relay_to_apps(stream_key, payload).await;
    }
}
