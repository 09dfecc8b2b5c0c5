//! Transport Traits
//!
//! Platform-agnostic abstraction for relay connections. A [`Connector`]
//! establishes connections and reports their lifecycle as a stream of
//! [`ConnectionEvent`]s; a [`RelayConnection`] is the send/disconnect handle
//! of one established connection.

use std::fmt;

use tokio::sync::mpsc;

use super::error::NetworkError;
use super::message::RelayMessage;
use crate::auth::UserCredentials;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, NetworkError>;

/// Relay client lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected to any server.
    Disconnected,
    /// TCP connection in progress.
    Connecting,
    /// TLS handshake and revocation checks in progress.
    TlsHandshaking,
    /// REGISTER sent, waiting for the server's verdict.
    Authenticating,
    /// Authenticated and ready to exchange messages.
    Connected,
    /// Tearing down the transport.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::TlsHandshaking => "tls-handshaking",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Host and port of a relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAddress {
    pub host: String,
    pub port: u16,
}

impl RelayAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        RelayAddress {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for RelayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Send/disconnect handle of an established connection.
pub trait RelayConnection: Send + Sync {
    /// Queues one message for transmission.
    ///
    /// Each message is encoded into a single buffer and written atomically,
    /// in call order.
    fn send(&self, message: &RelayMessage) -> TransportResult<()>;

    /// Closes the connection and stops further events.
    ///
    /// Safe to call more than once.
    fn disconnect(&self);
}

/// Lifecycle event emitted by a connector for one connection attempt.
pub enum ConnectionEvent {
    /// TCP is up; TLS handshake and revocation checks are running.
    Handshaking,
    /// The connection is ready for the REGISTER exchange.
    Established(Box<dyn RelayConnection>),
    /// The attempt or the connection failed; no further events follow.
    Failed(NetworkError),
    /// A complete inbound message.
    Message(RelayMessage),
    /// The peer closed the connection; no further events follow.
    Lost,
}

impl fmt::Debug for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Handshaking => f.write_str("Handshaking"),
            ConnectionEvent::Established(_) => f.write_str("Established(..)"),
            ConnectionEvent::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
            ConnectionEvent::Message(m) => f.debug_tuple("Message").field(&m.header).finish(),
            ConnectionEvent::Lost => f.write_str("Lost"),
        }
    }
}

/// Establishes relay connections.
///
/// `connect` returns immediately; the attempt runs in the background and
/// reports through the returned channel. Implementations that spawn tasks
/// must be called from within a tokio runtime.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        address: &RelayAddress,
        credentials: &UserCredentials,
    ) -> mpsc::Receiver<ConnectionEvent>;
}
