// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process configuration and the literal timeouts from spec §5.
//!
//! Every duration the core relies on is a field here rather than a buried
//! constant, so tests can shrink them to millisecond scale without touching
//! the managers themselves.

use std::time::Duration;

/// Top-level process configuration.
#[derive(Debug, Clone, clap::Args)]
pub struct CoreConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "GLASSCORE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8787, env = "GLASSCORE_PORT")]
    pub port: u16,

    /// Log level (passed through to `tracing_subscriber::EnvFilter`).
    #[arg(long, default_value = "info", env = "GLASSCORE_LOG_LEVEL")]
    pub log_level: String,

    #[command(flatten)]
    pub timings: Timings,
}

/// Literal timeouts from spec §5, reproduced exactly as production defaults.
#[derive(Debug, Clone, clap::Args)]
pub struct Timings {
    /// AppSession heartbeat ping interval.
    #[arg(long, default_value_t = 10_000, env = "GLASSCORE_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Grace period after upstream-facing channel close before resurrection.
    #[arg(long, default_value_t = 5_000, env = "GLASSCORE_GRACE_MS")]
    pub grace_ms: u64,

    /// Window after reconnect during which an empty subscription update is ignored.
    #[arg(long, default_value_t = 8_000, env = "GLASSCORE_SUBSCRIPTION_GRACE_MS")]
    pub subscription_grace_ms: u64,

    /// Debounce before the mic policy recomputes after a subscription change.
    #[arg(long, default_value_t = 100, env = "GLASSCORE_MIC_DEBOUNCE_MS")]
    pub mic_debounce_ms: u64,

    /// Debounce before a language-set change notifies the mic manager.
    #[arg(long, default_value_t = 500, env = "GLASSCORE_LANGUAGE_DEBOUNCE_MS")]
    pub language_debounce_ms: u64,

    /// Default coalescing window for `MicrophoneManager::update_state`.
    #[arg(long, default_value_t = 1_000, env = "GLASSCORE_MIC_SEND_DEBOUNCE_MS")]
    pub mic_send_debounce_ms: u64,

    /// Mic keep-alive resend interval.
    #[arg(long, default_value_t = 10_000, env = "GLASSCORE_MIC_KEEPALIVE_MS")]
    pub mic_keepalive_ms: u64,

    /// Hold-down before actually turning the mic off.
    #[arg(long, default_value_t = 3_000, env = "GLASSCORE_MIC_HOLDDOWN_MS")]
    pub mic_holddown_ms: u64,

    /// Unauthorized-audio guard debounce.
    #[arg(long, default_value_t = 5_000, env = "GLASSCORE_UNAUTH_AUDIO_GUARD_MS")]
    pub unauthorized_audio_guard_ms: u64,

    /// Max age of the mic manager's cached subscription snapshot.
    #[arg(long, default_value_t = 5_000, env = "GLASSCORE_SUBSCRIPTION_CACHE_MAX_AGE_MS")]
    pub subscription_cache_max_age_ms: u64,

    /// Photo request timeout.
    #[arg(long, default_value_t = 30_000, env = "GLASSCORE_PHOTO_TIMEOUT_MS")]
    pub photo_timeout_ms: u64,
}

impl Timings {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn subscription_grace(&self) -> Duration {
        Duration::from_millis(self.subscription_grace_ms)
    }

    pub fn mic_debounce(&self) -> Duration {
        Duration::from_millis(self.mic_debounce_ms)
    }

    pub fn language_debounce(&self) -> Duration {
        Duration::from_millis(self.language_debounce_ms)
    }

    pub fn mic_send_debounce(&self) -> Duration {
        Duration::from_millis(self.mic_send_debounce_ms)
    }

    pub fn mic_keepalive(&self) -> Duration {
        Duration::from_millis(self.mic_keepalive_ms)
    }

    pub fn mic_holddown(&self) -> Duration {
        Duration::from_millis(self.mic_holddown_ms)
    }

    pub fn unauthorized_audio_guard(&self) -> Duration {
        Duration::from_millis(self.unauthorized_audio_guard_ms)
    }

    pub fn subscription_cache_max_age(&self) -> Duration {
        Duration::from_millis(self.subscription_cache_max_age_ms)
    }

    pub fn photo_timeout(&self) -> Duration {
        Duration::from_millis(self.photo_timeout_ms)
    }

    /// Timings scaled down for fast, deterministic tests. Ratios between
    /// values are preserved so ordering-sensitive behavior (e.g. hold-down
    /// vs. keep-alive) still holds.
    #[cfg(test)]
    pub fn fast_for_tests() -> Self {
        Self {
            heartbeat_ms: 30,
            grace_ms: 40,
            subscription_grace_ms: 60,
            mic_debounce_ms: 10,
            language_debounce_ms: 15,
            mic_send_debounce_ms: 20,
            mic_keepalive_ms: 50,
            mic_holddown_ms: 30,
            unauthorized_audio_guard_ms: 30,
            subscription_cache_max_age_ms: 40,
            photo_timeout_ms: 60,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            heartbeat_ms: 10_000,
            grace_ms: 5_000,
            subscription_grace_ms: 8_000,
            mic_debounce_ms: 100,
            language_debounce_ms: 500,
            mic_send_debounce_ms: 1_000,
            mic_keepalive_ms: 10_000,
            mic_holddown_ms: 3_000,
            unauthorized_audio_guard_ms: 5_000,
            subscription_cache_max_age_ms: 5_000,
            photo_timeout_ms: 30_000,
        }
    }
}
