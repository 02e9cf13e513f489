// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a recording mock channel and session builders.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::config::Timings;
use crate::session::{Permission, Session, StaticAppCatalog};
use crate::transport::{DuplexChannel, OpenFlag, TransportError};

/// A [`DuplexChannel`] that records every outgoing frame instead of writing
/// to a socket, so tests can assert on exactly what would have been sent.
pub struct MockChannel {
    open: OpenFlag,
    sent: Mutex<Vec<serde_json::Value>>,
    pings: Mutex<u32>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { open: OpenFlag::new_open(), sent: Mutex::new(Vec::new()), pings: Mutex::new(0) })
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn close_from_peer(&self) {
        self.open.close();
    }
}

impl DuplexChannel for MockChannel {
    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn send_text(
        &self,
        value: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(TransportError("closed".to_owned()));
            }
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(value);
            Ok(())
        })
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            *self.pings.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            Ok(())
        })
    }

    fn close(
        &self,
        _code: u16,
        _reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            self.open.close();
            Ok(())
        })
    }
}

/// Build a `Session` with fast timings, a catalog that knows `package_name`
/// and (optionally) grants it camera permission, and a fresh `MockChannel`
/// as its upstream.
pub fn session_with_package(package_name: &str, camera: bool) -> (Arc<Session>, Arc<MockChannel>) {
    let mut catalog = StaticAppCatalog::new();
    catalog.register(package_name);
    if camera {
        catalog.grant(package_name, Permission::Camera);
    }
    let channel = MockChannel::new();
    let session = Session::new("user-1", "session-1", Arc::clone(&channel) as Arc<dyn DuplexChannel>, Arc::new(catalog), Timings::fast_for_tests());
    (session, channel)
}
