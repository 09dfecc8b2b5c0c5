// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Parley Core Library
//!
//! Relay protocol engine for the Parley messenger: a framed binary protocol
//! over TLS with CRL-checked trust, a connection lifecycle state machine and
//! token-gated authenticated work. Message content is opaque ciphertext
//! throughout.

pub mod auth;
pub mod clock;
pub mod config;
pub mod http;
pub mod network;
pub mod trust;

pub use auth::{
    AuthFailure, AuthTokenManager, BindError, TokenError, TokenEvent, TokenProvider,
    UserCredentials, MAX_AUTH_RETRIES,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_root_certificate, ConfigError, RelayClientConfig};
pub use http::{check_status, ApiError};
pub use network::{
    Command, ConnectionEvent, ConnectionState, Connector, FrameDecoder, Header, LifecycleEvent,
    MockConnector, NetworkError, RelayAddress, RelayClient, RelayConnection, RelayMessage,
    TlsRelayConnector,
};
pub use trust::{CrlCache, CrlFetcher, CrlValidator, HttpCrlFetcher, TrustError};
