// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `CALENDAR_EVENT` hand-off (spec §4.5). Unlike `VAD`/`LOCAL_TRANSCRIPTION`,
//! calendar events are not automatically fanned out to subscribed apps — the
//! dispatch table hands them to this manager with no fan-out side effect, so
//! it exists as a named seam (caching recent events) for a future policy
//! without touching the upstream dispatcher.

use std::collections::VecDeque;

use tokio::sync::RwLock;

const MAX_HISTORY: usize = 20;

pub struct CalendarManager {
    history: RwLock<VecDeque<serde_json::Value>>,
}

impl CalendarManager {
    pub fn new() -> Self {
        Self { history: RwLock::new(VecDeque::new()) }
    }

    pub async fn handle_calendar_event(&self, payload: serde_json::Value) {
        let mut history = self.history.write().await;
        history.push_back(payload);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    pub async fn latest_event(&self) -> Option<serde_json::Value> {
        self.history.read().await.back().cloned()
    }

    /// Most-recent-last view of the bounded history, for display/dashboard
    /// consumers that want more than just the latest event.
    pub async fn history(&self) -> Vec<serde_json::Value> {
        self.history.read().await.iter().cloned().collect()
    }
}

impl Default for CalendarManager {
    fn default() -> Self {
        Self::new()
    }
}
