// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP Status Convention
//!
//! Shared mapping from unexpected HTTP statuses to errors, used by every
//! request/response client talking to Parley services.

use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::AuthFailure;

/// Errors from REST calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401: the auth token was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// 5xx from the server.
    #[error("server error: HTTP {0}")]
    ServerError(u16),

    /// Any other status the caller did not expect.
    #[error("unexpected response: HTTP {0}")]
    UnexpectedResponse(u16),

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
}

impl AuthFailure for ApiError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

/// Returns `Ok` if `status` is one of `expected`, otherwise the matching error.
pub fn check_status(status: StatusCode, expected: &[StatusCode]) -> Result<(), ApiError> {
    if expected.contains(&status) {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if status.is_server_error() {
        return Err(ApiError::ServerError(status.as_u16()));
    }
    Err(ApiError::UnexpectedResponse(status.as_u16()))
}
