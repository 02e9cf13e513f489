// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-visible error vocabulary and the envelope the app dispatcher wraps
//! them in. Mirrors the codes in spec §6/§7: a protocol/authorization error
//! always closes the offending app's channel; a precondition error (upstream
//! not open) and `WIFI_NOT_CONNECTED` do not.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire-visible error codes for the app-facing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreError {
    /// JWT presented at connect time failed validation. Never constructed by
    /// the core itself (auth is an external collaborator) but carried in the
    /// shared vocabulary so an auth layer can reuse this envelope.
    InvalidJwt,
    JwtSignatureFailed,
    PackageNotFound,
    InvalidApiKey,
    SessionNotFound,
    MalformedMessage,
    PermissionDenied,
    InternalError,
    WifiNotConnected,
}

impl CoreError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJwt => "INVALID_JWT",
            Self::JwtSignatureFailed => "JWT_SIGNATURE_FAILED",
            Self::PackageNotFound => "PACKAGE_NOT_FOUND",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::MalformedMessage => "MALFORMED_MESSAGE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::WifiNotConnected => "WIFI_NOT_CONNECTED",
        }
    }

    /// Whether the app dispatcher must close the channel (code 1008) after
    /// delivering this error, per spec §7's taxonomy.
    pub fn closes_channel(&self) -> bool {
        matches!(
            self,
            Self::InvalidJwt
                | Self::JwtSignatureFailed
                | Self::PackageNotFound
                | Self::InvalidApiKey
                | Self::SessionNotFound
                | Self::MalformedMessage
                | Self::PermissionDenied
        )
    }

    pub fn to_connection_error(&self, message: impl Into<String>, timestamp: u64) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into(), timestamp }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for CoreError {}

/// Wire body for a `CONNECTION_ERROR` frame (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub timestamp: u64,
}
