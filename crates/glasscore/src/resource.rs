// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped resource tracker: the single teardown path for timers, intervals,
//! and background tasks owned by an [`AppSession`](crate::app_session::AppSession)
//! or a [`Session`](crate::session::Session).
//!
//! Re-architecture note (spec §9): rather than relying on listener/finalizer
//! graphs, every spawned task is registered here and `dispose()` aborts them
//! all in one idempotent pass. A [`tokio_util::sync::CancellationToken`] is
//! handed out too, for tasks (like the heartbeat loop) that prefer to check
//! cooperatively rather than be hard-aborted mid-send.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tracks spawned tasks and a cancellation token for a single owner
/// (an `AppSession` or a `Session`). `dispose()` is idempotent.
pub struct ResourceTracker {
    cancel: CancellationToken,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self { cancel: CancellationToken::new(), handles: std::sync::Mutex::new(Vec::new()) }
    }

    /// Cooperative cancellation token. Cloned into every spawned task so it
    /// can check `cancelled()` in its select loop.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A child token, for a sub-scope that should be cancelled when this
    /// tracker disposes but can also be cancelled independently.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Spawn a future and register its handle for abort-on-dispose.
    pub fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle);
        } else {
            handle.abort();
        }
    }

    /// Whether `dispose()` has already run.
    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the cooperative token and abort every tracked task. Safe to
    /// call more than once; the second call is a no-op.
    pub fn dispose(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}
