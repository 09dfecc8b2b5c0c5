// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Error Types
//!
//! Error types for framing, transport and relay session operations.

use thiserror::Error;

use crate::trust::TrustError;

/// Network and transport error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Header field {field} too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Content length mismatch: header declares {declared}, content has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Trust check failed: {0}")]
    Trust(#[from] TrustError),
}

impl NetworkError {
    /// Returns true if the transport cannot be reused after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            NetworkError::InvalidState(_)
                | NetworkError::FieldTooLong { .. }
                | NetworkError::LengthMismatch { .. }
        )
    }
}
