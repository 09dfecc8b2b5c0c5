// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Credentials and Token Events

use std::fmt;

use thiserror::Error;
use tokio::sync::broadcast;

/// An address plus the auth token to present for it.
///
/// Handed out by value at call time; holders never see later token changes.
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub address: String,
    pub auth_token: String,
}

impl UserCredentials {
    pub fn new(address: impl Into<String>, auth_token: impl Into<String>) -> Self {
        UserCredentials {
            address: address.into(),
            auth_token: auth_token.into(),
        }
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("address", &self.address)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Failure reported by a token provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("token unavailable: {0}")]
pub struct TokenError(pub String);

impl TokenError {
    pub fn new(reason: impl Into<String>) -> Self {
        TokenError(reason.into())
    }
}

/// Token lifecycle notification.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// A fresh token is available.
    New(String),
    /// The provider could not produce a token.
    Error(TokenError),
}

impl fmt::Debug for TokenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenEvent::New(_) => f.write_str("New(<redacted>)"),
            TokenEvent::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

/// Source of auth tokens, e.g. a login or refresh flow.
pub trait TokenProvider: Send + Sync {
    /// Subscribes to token events.
    ///
    /// Events sent before the call are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<TokenEvent>;

    /// Marks the current token as rejected so the provider obtains a new one.
    fn invalidate_token(&self);
}
