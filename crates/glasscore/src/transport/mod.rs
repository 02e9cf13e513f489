// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duplex, framed, text+binary channel abstraction (spec §2.1) plus the axum
//! WebSocket adapter that implements it for upstream (glasses) and downstream
//! (app) connections.

pub mod ws;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

/// An I/O error from a [`DuplexChannel`] operation. The core never inspects
/// the cause, only whether the send/close/ping succeeded.
#[derive(Debug, Clone)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

/// A duplex, framed channel: JSON text frames, binary audio frames, pings,
/// and a readiness flag. Object-safe so `AppSession`/`Session` can hold
/// `Arc<dyn DuplexChannel>` without committing to a transport.
pub trait DuplexChannel: Send + Sync + 'static {
    /// Whether the channel is currently open for writes.
    fn is_open(&self) -> bool;

    /// Send a JSON value as a text frame.
    fn send_text(
        &self,
        value: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;

    /// Send a ping frame (heartbeat).
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;

    /// Close the channel with a WebSocket close code and reason.
    fn close(
        &self,
        code: u16,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;
}

/// Serialize `value` to a JSON value for `send_text`, panicking-free: a
/// serialization failure becomes a `TransportError`.
pub fn to_json_value<T: Serialize>(value: &T) -> Result<serde_json::Value, TransportError> {
    serde_json::to_value(value).map_err(|err| TransportError(err.to_string()))
}

/// Shared open/closed flag a concrete transport can embed and flip on its
/// socket-close path, read cheaply by `is_open`.
#[derive(Debug, Default)]
pub struct OpenFlag(AtomicBool);

impl OpenFlag {
    pub fn new_open() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }
}
