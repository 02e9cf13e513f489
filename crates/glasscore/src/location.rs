// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Location update fan-out, rate-limited per app (spec §3 `LocationRate`,
//! §4.5 `LOCATION_UPDATE`, §4.6 `LOCATION_POLL_REQUEST`).
//!
//! Unlike most upstream events, `LOCATION_UPDATE` is *not* automatically
//! relayed through `SubscriptionManager::get_subscribed_apps` — each
//! subscribed app's `LocationRate` decides whether this particular update is
//! due yet, so the manager tracks a last-sent timestamp per app.

use std::collections::HashMap;
use std::sync::Weak;

use tokio::sync::RwLock;

use crate::app_session::LocationRate;
use crate::session::Session;
use crate::subscription::{BaseStream, StreamKey};

fn min_interval_ms(rate: LocationRate) -> u64 {
    match rate {
        LocationRate::Realtime => 0,
        LocationRate::High => 1_000,
        LocationRate::Standard => 5_000,
        LocationRate::TenMeters | LocationRate::HundredMeters => 5_000,
        LocationRate::Kilometer | LocationRate::ThreeKilometers => 30_000,
        LocationRate::Reduced => 60_000,
    }
}

struct Inner {
    last_location: Option<serde_json::Value>,
    last_sent_ms: HashMap<String, u64>,
}

/// Per-session location fan-out policy.
pub struct LocationManager {
    session: Weak<Session>,
    inner: RwLock<Inner>,
}

impl LocationManager {
    pub fn new(session: Weak<Session>) -> Self {
        Self { session, inner: RwLock::new(Inner { last_location: None, last_sent_ms: HashMap::new() }) }
    }

    /// `LOCATION_UPDATE`: decide, per subscribed app, whether this update is
    /// due given its configured rate.
    pub async fn handle_location_update(&self, payload: serde_json::Value) {
        let Some(session) = self.session.upgrade() else { return };
        self.inner.write().await.last_location = Some(payload.clone());

        let key = StreamKey::Base(BaseStream::LocationStream);
        let apps = session.subscriptions().get_subscribed_apps(&key).await;
        let now = crate::epoch_ms();

        for package_name in apps {
            let Some(app) = session.app(&package_name).await else { continue };
            let rate = app.location_rate().await.unwrap_or(LocationRate::Standard);
            let min_interval = min_interval_ms(rate);

            let due = {
                let inner = self.inner.read().await;
                match inner.last_sent_ms.get(&package_name) {
                    Some(last) => now.saturating_sub(*last) >= min_interval,
                    None => true,
                }
            };
            if !due {
                continue;
            }

            self.inner.write().await.last_sent_ms.insert(package_name.clone(), now);
            let frame = serde_json::json!({
                "type": "DATA_STREAM",
                "sessionId": session.sub_session_id(&package_name),
                "streamType": "location_stream",
                "data": payload,
                "timestamp": now,
            });
            session.send_to_app(&package_name, frame).await;
        }
    }

    /// `handlePollRequestFromApp`: reply to exactly the requesting app with
    /// the last known fix, bypassing its configured rate, or a
    /// `NOT_AVAILABLE`-shaped empty payload if no fix has arrived yet.
    pub async fn handle_poll_request_from_app(&self, package_name: &str) {
        let Some(session) = self.session.upgrade() else { return };
        let location = self.inner.read().await.last_location.clone();

        let Some(location) = location else {
            let frame = serde_json::json!({
                "type": "DATA_STREAM",
                "sessionId": session.sub_session_id(package_name),
                "streamType": "location_stream",
                "data": { "status": "NOT_AVAILABLE" },
                "timestamp": crate::epoch_ms(),
            });
            session.send_to_app(package_name, frame).await;
            return;
        };

        self.inner.write().await.last_sent_ms.insert(package_name.to_owned(), crate::epoch_ms());
        let frame = serde_json::json!({
            "type": "DATA_STREAM",
            "sessionId": session.sub_session_id(package_name),
            "streamType": "location_stream",
            "data": location,
            "timestamp": crate::epoch_ms(),
        });
        session.send_to_app(package_name, frame).await;
    }
}
