// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `DisplayManager` (raw layout/content rendering on the glasses) and
//! `DashboardManager` (always-on dashboard content cycling), both fed by
//! `DISPLAY_REQUEST` variants from apps (spec §4.6) and by `HEAD_POSITION`
//! from the glasses (spec §4.5).

use std::sync::Weak;

use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::session::Session;

/// Forwards app display requests upstream as-is; the core does not
/// interpret layout content, only gates and stamps them.
pub struct DisplayManager {
    session: Weak<Session>,
}

impl DisplayManager {
    pub fn new(session: Weak<Session>) -> Self {
        Self { session }
    }

    /// `DISPLAY_REQUEST`: re-emit upstream, stamped with the requesting
    /// app's identity. Fails if the upstream channel is not open.
    pub async fn handle_display_request(
        &self,
        package_name: &str,
        layout: serde_json::Value,
    ) -> Result<(), CoreError> {
        let session = self.session.upgrade().ok_or(CoreError::InternalError)?;
        if !session.upstream_open().await {
            return Err(CoreError::InternalError);
        }
        let frame = serde_json::json!({
            "type": "DISPLAY_REQUEST",
            "sessionId": session.session_id(),
            "packageName": package_name,
            "layout": layout,
            "timestamp": crate::epoch_ms(),
        });
        session.send_upstream(frame).await.map_err(|_| CoreError::InternalError)
    }
}

/// Rotates a small set of always-on dashboard "cards" (time, weather,
/// notifications, …) whenever `HEAD_POSITION` reports "up" — the glasses'
/// signal that the user just looked toward the display.
pub struct DashboardManager {
    session: Weak<Session>,
    cards: RwLock<Vec<serde_json::Value>>,
    cursor: RwLock<usize>,
}

impl DashboardManager {
    pub fn new(session: Weak<Session>) -> Self {
        Self { session, cards: RwLock::new(Vec::new()), cursor: RwLock::new(0) }
    }

    pub async fn set_cards(&self, cards: Vec<serde_json::Value>) {
        *self.cards.write().await = cards;
        *self.cursor.write().await = 0;
    }

    /// `HEAD_POSITION == "up"`: advance to the next card and push it
    /// upstream as a dashboard content update, if any cards are registered.
    pub async fn cycle_content(&self) {
        let cards = self.cards.read().await;
        if cards.is_empty() {
            return;
        }
        let mut cursor = self.cursor.write().await;
        let card = cards[*cursor % cards.len()].clone();
        *cursor = (*cursor + 1) % cards.len();
        drop(cursor);
        drop(cards);

        let Some(session) = self.session.upgrade() else { return };
        let frame = serde_json::json!({
            "type": "DISPLAY_REQUEST",
            "sessionId": session.session_id(),
            "packageName": "system.dashboard",
            "layout": card,
            "timestamp": crate::epoch_ms(),
        });
        let _ = session.send_upstream(frame).await;
    }

    /// `DISPLAY_REQUEST` dashboard variant from an app: register/replace one
    /// card rather than push immediately, so it takes effect on next cycle.
    pub async fn handle_dashboard_request(&self, card: serde_json::Value) {
        self.cards.write().await.push(card);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    #[tokio::test]
    async fn cycle_wraps_around_cards() {
        let mgr = DashboardManager::new(Weak::new());
        mgr.set_cards(vec![serde_json::json!({"card": 1}), serde_json::json!({"card": 2})]).await;
        assert_eq!(*mgr.cursor.read().await, 0);
        mgr.cycle_content().await;
        assert_eq!(*mgr.cursor.read().await, 1);
        mgr.cycle_content().await;
        assert_eq!(*mgr.cursor.read().await, 0);
    }

    #[tokio::test]
    async fn cycle_is_a_no_op_with_no_cards() {
        let mgr = DashboardManager::new(Weak::new());
        mgr.cycle_content().await;
        assert_eq!(*mgr.cursor.read().await, 0);
    }
}
