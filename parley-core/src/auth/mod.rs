// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Authentication
//!
//! Credentials handed to relay and HTTP calls, and the token manager that
//! queues and retries work pending a valid token.

mod credentials;
mod token_manager;

pub use credentials::{TokenError, TokenEvent, TokenProvider, UserCredentials};
pub use token_manager::{AuthFailure, AuthTokenManager, BindError, MAX_AUTH_RETRIES};
