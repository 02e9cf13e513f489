// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide map `userId -> Session` (spec §4.7).

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Timings;
use crate::session::{AppCatalog, Session};
use crate::transport::DuplexChannel;

pub struct SessionRegistry {
    sessions: RwLock<indexmap::IndexMap<String, Arc<Session>>>,
    catalog: Arc<dyn AppCatalog>,
    timings: Timings,
}

impl SessionRegistry {
    pub fn new(catalog: Arc<dyn AppCatalog>, timings: Timings) -> Arc<Self> {
        Arc::new(Self { sessions: RwLock::new(indexmap::IndexMap::new()), catalog, timings })
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// If an existing session is present, dispose it (and every AppSession
    /// it owns) before installing the new one (spec §4.7).
    pub async fn create_or_replace(&self, user_id: String, channel: Arc<dyn DuplexChannel>) -> Arc<Session> {
        let prior = self.sessions.write().await.shift_remove(&user_id);
        if let Some(prior) = prior {
            prior.dispose().await;
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(user_id.clone(), session_id, channel, Arc::clone(&self.catalog), self.timings.clone());
        self.sessions.write().await.insert(user_id, Arc::clone(&session));
        session
    }

    pub async fn remove(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.shift_remove(user_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
