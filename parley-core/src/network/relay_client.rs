// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Client
//!
//! Connection lifecycle state machine: connect, authenticate with REGISTER,
//! exchange messages, keep-alive with clock sync, disconnect.
//!
//! ```text
//! Disconnected -connect()-> Connecting -Handshaking-> TlsHandshaking
//! Connecting|TlsHandshaking -Established/send REGISTER-> Authenticating
//! Authenticating -REGISTER_SUCCESSFUL-> Connected
//! Authenticating -anything else-> Disconnected (auth failure)
//! Connected -Lost-> Disconnected
//! Connected -disconnect()-> Disconnecting -> Disconnected
//! ```
//!
//! The client never reconnects or times out on its own; both are caller
//! policy layered on the lifecycle events.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::error::NetworkError;
use super::header::{Command, Header};
use super::message::{new_message_id, split_payload, MessageId, RelayMessage, MAX_PART_SIZE};
use super::transport::{
    ConnectionEvent, ConnectionState, Connector, RelayAddress, RelayConnection, TransportResult,
};
use crate::auth::UserCredentials;
use crate::clock::{Clock, SystemClock};

/// Capacity of the lifecycle broadcast channel.
const LIFECYCLE_CHANNEL_CAPACITY: usize = 256;

/// Observable side effects of the relay client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The client moved between states.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A message was handed to the transport.
    MessageSent(Header),
    /// A message arrived from the relay.
    MessageReceived(Header),
    /// A PING/PONG round trip produced a new clock offset (ms, server - local).
    ClockDifference(i64),
    /// The relay did not accept our REGISTER.
    AuthenticationFailed(String),
    /// The transport dropped while connected.
    ConnectionLost,
}

/// Relay client for one logical connection at a time.
///
/// # Example
///
/// ```ignore
/// use parley_core::network::{RelayClient, RelayAddress, TlsRelayConnector};
///
/// let mut client = RelayClient::new(connector, RelayAddress::new("relay.parley.chat", 443));
/// client.connect(credentials).await?;
/// client.send_payload("bob@parley", &ciphertext)?;
/// while let Some(message) = client.next_message().await? {
///     // hand message.content to the session layer
/// }
/// ```
pub struct RelayClient<C: Connector> {
    connector: C,
    address: RelayAddress,
    clock: Arc<dyn Clock>,
    state: ConnectionState,
    credentials: Option<UserCredentials>,
    connection: Option<Box<dyn RelayConnection>>,
    events: Option<mpsc::Receiver<ConnectionEvent>>,
    /// Local send time of the single outstanding PING.
    outstanding_ping: Option<i64>,
    clock_difference: Option<i64>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl<C: Connector> RelayClient<C> {
    /// Creates a disconnected client using the system clock.
    pub fn new(connector: C, address: RelayAddress) -> Self {
        Self::with_clock(connector, address, Arc::new(SystemClock))
    }

    /// Creates a disconnected client reading time from `clock`.
    pub fn with_clock(connector: C, address: RelayAddress, clock: Arc<dyn Clock>) -> Self {
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        RelayClient {
            connector,
            address,
            clock,
            state: ConnectionState::Disconnected,
            credentials: None,
            connection: None,
            events: None,
            outstanding_ping: None,
            clock_difference: None,
            lifecycle,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true if authenticated and ready.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Last measured clock offset in milliseconds (server minus local).
    pub fn clock_difference(&self) -> Option<i64> {
        self.clock_difference
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Returns the relay address.
    pub fn address(&self) -> &RelayAddress {
        &self.address
    }

    /// Returns the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Starts a connection attempt without waiting for it.
    ///
    /// Drive the attempt with [`RelayClient::handle_event`] or use
    /// [`RelayClient::connect`] to wait for the outcome.
    pub fn begin_connect(&mut self, credentials: UserCredentials) -> TransportResult<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(NetworkError::InvalidState(format!(
                "connect called while {}",
                self.state
            )));
        }

        info!(relay = %self.address, user = %credentials.address, "connecting to relay");
        self.transition(ConnectionState::Connecting);
        self.events = Some(self.connector.connect(&self.address, &credentials));
        self.credentials = Some(credentials);
        Ok(())
    }

    /// Connects and authenticates, returning once `Connected` or failed.
    ///
    /// Wrap in `tokio::time::timeout` to bound the wait; on timeout call
    /// [`RelayClient::disconnect`].
    pub async fn connect(&mut self, credentials: UserCredentials) -> TransportResult<()> {
        self.begin_connect(credentials)?;

        while self.state != ConnectionState::Connected {
            let event = self.recv_event().await;
            self.handle_event(event)?;
            if self.state == ConnectionState::Disconnected {
                return Err(NetworkError::ConnectionClosed);
            }
        }
        Ok(())
    }

    /// Waits for the next application message.
    ///
    /// Returns `Ok(None)` once the client is no longer connected, which
    /// includes the peer closing the connection.
    pub async fn next_message(&mut self) -> TransportResult<Option<RelayMessage>> {
        while self.state == ConnectionState::Connected {
            let event = self.recv_event().await;
            if let Some(message) = self.handle_event(event)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Applies one connector event to the state machine.
    ///
    /// Returns the message if it should be dispatched to the application.
    pub fn handle_event(
        &mut self,
        event: ConnectionEvent,
    ) -> TransportResult<Option<RelayMessage>> {
        match (self.state, event) {
            (ConnectionState::Disconnected | ConnectionState::Disconnecting, event) => {
                debug!(?event, "ignoring event while disconnected");
                release_stray(event);
                Ok(None)
            }

            (ConnectionState::Connecting, ConnectionEvent::Handshaking) => {
                self.transition(ConnectionState::TlsHandshaking);
                Ok(None)
            }

            (
                ConnectionState::Connecting | ConnectionState::TlsHandshaking,
                ConnectionEvent::Established(connection),
            ) => self.on_established(connection).map(|_| None),

            (
                ConnectionState::Connecting | ConnectionState::TlsHandshaking,
                ConnectionEvent::Failed(e),
            ) => {
                warn!(relay = %self.address, error = %e, "relay connection failed");
                self.teardown();
                Err(e)
            }

            (
                ConnectionState::Connecting | ConnectionState::TlsHandshaking,
                ConnectionEvent::Lost,
            ) => {
                warn!(relay = %self.address, "relay closed connection during setup");
                self.teardown();
                Err(NetworkError::ConnectionClosed)
            }

            (ConnectionState::Connecting | ConnectionState::TlsHandshaking, event) => {
                self.teardown();
                Err(NetworkError::ProtocolViolation(format!(
                    "unexpected {:?} before connection established",
                    event
                )))
            }

            (ConnectionState::Authenticating, ConnectionEvent::Message(message)) => {
                self.emit(LifecycleEvent::MessageReceived(message.header.clone()));
                if message.command() == Command::RegisterSuccessful {
                    info!(relay = %self.address, "authenticated with relay");
                    self.transition(ConnectionState::Connected);
                    Ok(None)
                } else {
                    Err(self.fail_authentication(format!(
                        "expected REGISTER_SUCCESSFUL, got {:?}",
                        message.command()
                    )))
                }
            }

            (ConnectionState::Authenticating, ConnectionEvent::Lost) => {
                Err(self.fail_authentication("connection lost during authentication".into()))
            }

            (ConnectionState::Authenticating, ConnectionEvent::Failed(e)) => {
                Err(self.fail_authentication(e.to_string()))
            }

            (ConnectionState::Authenticating, event) => {
                let reason = format!("unexpected {:?} during authentication", event);
                release_stray(event);
                Err(self.fail_authentication(reason))
            }

            (ConnectionState::Connected, ConnectionEvent::Message(message)) => {
                self.emit(LifecycleEvent::MessageReceived(message.header.clone()));
                self.on_message(message)
            }

            (ConnectionState::Connected, ConnectionEvent::Lost) => {
                warn!(relay = %self.address, "relay connection lost");
                self.teardown();
                self.emit(LifecycleEvent::ConnectionLost);
                Ok(None)
            }

            (ConnectionState::Connected, ConnectionEvent::Failed(e)) => {
                warn!(relay = %self.address, error = %e, "relay connection failed");
                self.teardown();
                Err(e)
            }

            (ConnectionState::Connected, event) => {
                debug!(?event, "ignoring connector event while connected");
                release_stray(event);
                Ok(None)
            }
        }
    }

    /// Sends a message. Only allowed while connected.
    pub fn send(&mut self, message: RelayMessage) -> TransportResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(NetworkError::InvalidState(format!(
                "cannot send while {}",
                self.state
            )));
        }
        self.transmit(&message)
    }

    /// Sends `payload` to `to`, split into parts if needed.
    ///
    /// Returns the message id shared by all parts.
    pub fn send_payload(&mut self, to: &str, payload: &[u8]) -> TransportResult<MessageId> {
        let from = self
            .credentials
            .as_ref()
            .map(|c| c.address.clone())
            .unwrap_or_default();
        let message_id = new_message_id();
        let parts = split_payload(
            &from,
            to,
            &message_id,
            payload,
            MAX_PART_SIZE,
            self.clock.unix_millis(),
        )?;
        for part in parts {
            self.send(part)?;
        }
        Ok(message_id)
    }

    /// Sends a PING and remembers its send time for clock sync.
    ///
    /// A newer ping replaces any outstanding one.
    pub fn ping(&mut self) -> TransportResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(NetworkError::InvalidState(format!(
                "cannot ping while {}",
                self.state
            )));
        }
        let now = self.clock.unix_millis();
        self.transmit(&RelayMessage::control(Command::Ping, now))?;
        self.outstanding_ping = Some(now);
        Ok(())
    }

    /// Closes the connection. Idempotent; valid from any state.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!(relay = %self.address, "disconnecting from relay");
        self.transition(ConnectionState::Disconnecting);
        self.teardown();
    }

    async fn recv_event(&mut self) -> ConnectionEvent {
        match self.events.as_mut() {
            Some(events) => events.recv().await.unwrap_or(ConnectionEvent::Lost),
            None => ConnectionEvent::Lost,
        }
    }

    fn on_established(&mut self, connection: Box<dyn RelayConnection>) -> TransportResult<()> {
        let register = match &self.credentials {
            Some(credentials) => RelayMessage::register(credentials, self.clock.unix_millis()),
            None => {
                connection.disconnect();
                self.teardown();
                return Err(NetworkError::AuthenticationFailed(
                    "no credentials for REGISTER".into(),
                ));
            }
        };

        self.connection = Some(connection);
        if let Err(e) = self.transmit(&register) {
            self.teardown();
            return Err(e);
        }
        self.transition(ConnectionState::Authenticating);
        Ok(())
    }

    fn on_message(&mut self, message: RelayMessage) -> TransportResult<Option<RelayMessage>> {
        match message.command() {
            Command::Pong => {
                self.on_pong(&message.header);
                Ok(None)
            }
            Command::Ping => {
                let pong = RelayMessage::control(Command::Pong, self.clock.unix_millis());
                self.transmit(&pong)?;
                Ok(None)
            }
            Command::SendMessage => Ok(Some(message)),
            Command::Register | Command::RegisterSuccessful | Command::RegisterFailed => {
                debug!(command = ?message.command(), "ignoring registration frame while connected");
                Ok(None)
            }
        }
    }

    fn on_pong(&mut self, header: &Header) {
        let Some(sent_at) = self.outstanding_ping.take() else {
            debug!("ignoring PONG without outstanding PING");
            return;
        };
        let received_at = self.clock.unix_millis();
        let Some(difference) = clock_difference(sent_at, received_at, header.timestamp) else {
            debug!(server_time = header.timestamp, "ignoring PONG with out-of-range timestamp");
            return;
        };
        debug!(
            round_trip_ms = received_at - sent_at,
            difference_ms = difference,
            "clock difference updated"
        );
        self.clock_difference = Some(difference);
        self.emit(LifecycleEvent::ClockDifference(difference));
    }

    fn fail_authentication(&mut self, reason: String) -> NetworkError {
        warn!(relay = %self.address, %reason, "relay authentication failed");
        self.teardown();
        self.emit(LifecycleEvent::AuthenticationFailed(reason.clone()));
        NetworkError::AuthenticationFailed(reason)
    }

    fn transmit(&mut self, message: &RelayMessage) -> TransportResult<()> {
        let connection = self.connection.as_ref().ok_or(NetworkError::ConnectionClosed)?;
        connection.send(message)?;
        debug!(command = ?message.command(), len = message.content.len(), "frame sent");
        self.emit(LifecycleEvent::MessageSent(message.header.clone()));
        Ok(())
    }

    /// Releases the transport and returns to `Disconnected`.
    fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.disconnect();
        }
        self.events = None;
        self.outstanding_ping = None;
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(%from, %to, "relay state changed");
        self.emit(LifecycleEvent::StateChanged { from, to });
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.lifecycle.send(event);
    }
}

impl<C: Connector> Drop for RelayClient<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.disconnect();
        }
    }
}

/// Closes a connection that arrived after the client stopped expecting one.
fn release_stray(event: ConnectionEvent) {
    if let ConnectionEvent::Established(connection) = event {
        debug!("closing unexpected connection");
        connection.disconnect();
    }
}

/// Offset of the server clock from the local clock, in milliseconds.
///
/// The server's timestamp is assumed to be taken at the midpoint of the
/// round trip: `server - (sent + received) / 2`. Returns `None` if the
/// offset does not fit in an `i64`; `server_time` comes from the peer.
pub fn clock_difference(sent_at: i64, received_at: i64, server_time: i64) -> Option<i64> {
    let (sent_at, received_at) = (i128::from(sent_at), i128::from(received_at));
    let midpoint = sent_at + (received_at - sent_at) / 2;
    i64::try_from(i128::from(server_time) - midpoint).ok()
}
