//! Mock Connector
//!
//! In-memory implementation of [`Connector`] for testing the relay client
//! without sockets.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::error::NetworkError;
use super::message::RelayMessage;
use super::transport::{
    ConnectionEvent, Connector, RelayAddress, RelayConnection, TransportResult,
};
use crate::auth::UserCredentials;

const MOCK_CHANNEL_CAPACITY: usize = 64;

/// Event to replay as soon as `connect` is called.
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Handshaking,
    Establish,
    Fail(NetworkError),
    Deliver(RelayMessage),
    Lose,
}

#[derive(Default)]
struct MockState {
    events: Option<mpsc::Sender<ConnectionEvent>>,
    script: VecDeque<ScriptedEvent>,
    sent: Vec<RelayMessage>,
    connect_calls: Vec<(RelayAddress, String)>,
    disconnects: usize,
    closed: bool,
    send_error: Option<NetworkError>,
}

/// Mock connector for testing.
///
/// Records connect calls and sent messages, and lets tests inject lifecycle
/// events either up front (a script replayed on `connect`) or afterwards.
///
/// # Example
///
/// ```ignore
/// use parley_core::network::{MockConnector, ScriptedEvent};
///
/// let connector = MockConnector::with_script(vec![
///     ScriptedEvent::Establish,
///     ScriptedEvent::Deliver(RelayMessage::control(Command::RegisterSuccessful, 0)),
/// ]);
/// ```
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Creates a connector with no scripted events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector replaying `script` on the next `connect`.
    pub fn with_script(script: Vec<ScriptedEvent>) -> Self {
        let connector = Self::new();
        connector.script(script);
        connector
    }

    /// Replaces the events replayed on the next `connect`.
    pub fn script(&self, script: Vec<ScriptedEvent>) {
        self.state.lock().script = script.into();
    }

    /// Emits `Established` with a fresh mock connection.
    pub fn establish(&self) {
        let connection = self.connection();
        self.emit(ConnectionEvent::Established(Box::new(connection)));
    }

    /// Emits `Handshaking`.
    pub fn handshaking(&self) {
        self.emit(ConnectionEvent::Handshaking);
    }

    /// Emits an inbound message.
    pub fn deliver(&self, message: RelayMessage) {
        self.emit(ConnectionEvent::Message(message));
    }

    /// Emits `Lost`.
    pub fn lose(&self) {
        self.emit(ConnectionEvent::Lost);
    }

    /// Emits `Failed`.
    pub fn fail(&self, error: NetworkError) {
        self.emit(ConnectionEvent::Failed(error));
    }

    /// Makes every following send fail with `error`.
    pub fn fail_sends(&self, error: NetworkError) {
        self.state.lock().send_error = Some(error);
    }

    /// Returns all messages sent through connections of this connector.
    pub fn sent_messages(&self) -> Vec<RelayMessage> {
        self.state.lock().sent.clone()
    }

    /// Clears the sent messages buffer.
    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// Returns `(address, credentials address)` for each connect call.
    pub fn connect_calls(&self) -> Vec<(RelayAddress, String)> {
        self.state.lock().connect_calls.clone()
    }

    /// Number of times a connection was disconnected.
    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnects
    }

    fn connection(&self) -> MockConnection {
        self.state.lock().closed = false;
        MockConnection {
            state: Arc::clone(&self.state),
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let sender = self.state.lock().events.clone();
        if let Some(sender) = sender {
            // Receiver may be gone after a disconnect; that is expected.
            let _ = sender.try_send(event);
        }
    }

    fn to_event(&self, scripted: ScriptedEvent) -> ConnectionEvent {
        match scripted {
            ScriptedEvent::Handshaking => ConnectionEvent::Handshaking,
            ScriptedEvent::Establish => ConnectionEvent::Established(Box::new(self.connection())),
            ScriptedEvent::Fail(e) => ConnectionEvent::Failed(e),
            ScriptedEvent::Deliver(m) => ConnectionEvent::Message(m),
            ScriptedEvent::Lose => ConnectionEvent::Lost,
        }
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        address: &RelayAddress,
        credentials: &UserCredentials,
    ) -> mpsc::Receiver<ConnectionEvent> {
        let (tx, rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
        let script: Vec<ScriptedEvent> = {
            let mut state = self.state.lock();
            state
                .connect_calls
                .push((address.clone(), credentials.address.clone()));
            state.events = Some(tx.clone());
            state.script.drain(..).collect()
        };

        for scripted in script {
            let _ = tx.try_send(self.to_event(scripted));
        }
        rx
    }
}

/// Connection handle handed out by [`MockConnector`].
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl RelayConnection for MockConnection {
    fn send(&self, message: &RelayMessage) -> TransportResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(NetworkError::ConnectionClosed);
        }
        if let Some(error) = state.send_error.clone() {
            return Err(error);
        }
        state.sent.push(message.clone());
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.disconnects += 1;
        }
        state.events = None;
    }
}
