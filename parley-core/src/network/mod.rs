// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network + Transport Layer
//!
//! Wire protocol, framing and the relay connection lifecycle.
//!
//! # Architecture
//!
//! The network layer consists of:
//! - **Header codec**: fixed-size big-endian frame header
//! - **Protocol layer**: frame encoding and incremental decoding
//! - **Transport traits**: connector and connection abstractions
//! - **TLS transport**: tokio + rustls connector with CRL checking
//! - **Relay client**: connect/authenticate/ping state machine
//!
//! # Example
//!
//! ```ignore
//! use parley_core::network::{MockConnector, RelayAddress, RelayClient, ScriptedEvent};
//!
//! let connector = MockConnector::with_script(vec![ScriptedEvent::Establish]);
//! let mut client = RelayClient::new(connector.clone(), RelayAddress::new("relay.test", 443));
//! client.begin_connect(credentials)?;
//! ```

mod error;
mod header;
mod message;
mod mock;
mod protocol;
mod relay_client;
mod tls;
mod transport;

// Error types
pub use error::NetworkError;

// Wire format
pub use header::{
    Command, Header, ADDRESS_WIDTH, AUTH_TOKEN_WIDTH, HEADER_SIZE, MESSAGE_ID_WIDTH,
    PROTOCOL_VERSION,
};
pub use message::{
    new_message_id, split_payload, AssembledPayload, MessageId, PartReassembler, RelayMessage,
    MAX_BUFFERED_PAYLOAD_BYTES, MAX_PART_SIZE, MAX_PENDING_PAYLOADS,
};
pub use protocol::{encode_frame, encode_frame_with_limit, FrameDecoder, MAX_MESSAGE_SIZE};

// Transport abstraction
pub use transport::{
    ConnectionEvent, ConnectionState, Connector, RelayAddress, RelayConnection, TransportResult,
};

// Mock transport for testing
pub use mock::{MockConnection, MockConnector, ScriptedEvent};

// TLS transport for production
pub use tls::{TlsConnection, TlsRelayConnector};

// Relay client
pub use relay_client::{clock_difference, LifecycleEvent, RelayClient};
