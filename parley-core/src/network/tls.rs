// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! TLS Relay Transport
//!
//! Production [`Connector`]: TCP via tokio, TLS 1.2 via rustls with a single
//! pinned root, then a CRL check of the peer chain before the connection is
//! reported as established.
//!
//! Each connection runs two tasks. The reader feeds a [`FrameDecoder`] and
//! forwards complete messages as events; the writer drains a queue of
//! pre-encoded frames, writing each one whole and in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use super::error::NetworkError;
use super::message::RelayMessage;
use super::protocol::{encode_frame_with_limit, FrameDecoder, MAX_MESSAGE_SIZE};
use super::transport::{
    ConnectionEvent, Connector, RelayAddress, RelayConnection, TransportResult,
};
use crate::auth::UserCredentials;
use crate::config::{ConfigError, RelayClientConfig, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::trust::{CrlCache, CrlValidator, HttpCrlFetcher};

const READ_BUFFER_SIZE: usize = 16 * 1024;

type RelayStream = TlsStream<TcpStream>;

/// Connects to relays over CRL-checked TLS.
#[derive(Clone)]
pub struct TlsRelayConnector {
    tls: TlsConnector,
    validator: CrlValidator,
    max_content_length: usize,
    channel_capacity: usize,
}

impl TlsRelayConnector {
    /// Creates a connector trusting only `validator`'s root.
    pub fn new(validator: CrlValidator) -> Result<Self, NetworkError> {
        let config = client_config(validator.root().clone())?;
        Ok(TlsRelayConnector {
            tls: TlsConnector::from(Arc::new(config)),
            validator,
            max_content_length: MAX_MESSAGE_SIZE,
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        })
    }

    /// Builds a connector from configuration, with an HTTP CRL fetcher and a
    /// fresh CRL cache.
    pub fn from_config(config: &RelayClientConfig) -> Result<Self, ConfigError> {
        let root = config.root_certificate()?;
        let fetcher = HttpCrlFetcher::new(config.crl_fetch_timeout)
            .map_err(|e| ConfigError::Setup(e.to_string()))?;
        let cache = Arc::new(CrlCache::new(Arc::new(fetcher)));

        let connector = Self::new(CrlValidator::new(root, cache))
            .map_err(|e| ConfigError::Setup(e.to_string()))?;
        Ok(connector
            .with_max_content_length(config.max_content_length)
            .with_channel_capacity(config.event_channel_capacity))
    }

    /// Sets the largest frame content accepted or sent.
    pub fn with_max_content_length(mut self, max_content_length: usize) -> Self {
        self.max_content_length = max_content_length;
        self
    }

    /// Sets the event channel capacity per connection.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// The CRL validator applied to every handshake.
    pub fn validator(&self) -> &CrlValidator {
        &self.validator
    }
}

impl Connector for TlsRelayConnector {
    fn connect(
        &self,
        address: &RelayAddress,
        _credentials: &UserCredentials,
    ) -> mpsc::Receiver<ConnectionEvent> {
        let (events, receiver) = mpsc::channel(self.channel_capacity);
        tokio::spawn(run_connection(self.clone(), address.clone(), events));
        receiver
    }
}

/// rustls client config: TLS 1.2 only, `root` as the only trust anchor.
fn client_config(root: CertificateDer<'static>) -> Result<ClientConfig, NetworkError> {
    let mut roots = RootCertStore::empty();
    roots
        .add(root)
        .map_err(|e| NetworkError::ConnectionFailed(format!("Invalid root certificate: {}", e)))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12])
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS setup failed: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

/// Handle to one established TLS relay connection.
pub struct TlsConnection {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    shutdown: Arc<Notify>,
    closed: AtomicBool,
    max_content_length: usize,
}

impl RelayConnection for TlsConnection {
    fn send(&self, message: &RelayMessage) -> TransportResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetworkError::ConnectionClosed);
        }
        let frame = encode_frame_with_limit(message, self.max_content_length)?;
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| NetworkError::ConnectionClosed)
    }

    fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.outgoing.send(Outgoing::Close);
        self.shutdown.notify_one();
    }
}

async fn run_connection(
    connector: TlsRelayConnector,
    address: RelayAddress,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let stream = match open_stream(&connector, &address, &events).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(relay = %address, error = %e, "relay connection attempt failed");
            let _ = events.send(ConnectionEvent::Failed(e)).await;
            return;
        }
    };

    let (reader, writer) = tokio::io::split(stream);
    let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
    let shutdown = Arc::new(Notify::new());
    tokio::spawn(write_frames(writer, outgoing_rx));

    let connection = TlsConnection {
        outgoing: outgoing.clone(),
        shutdown: Arc::clone(&shutdown),
        closed: AtomicBool::new(false),
        max_content_length: connector.max_content_length,
    };
    if events
        .send(ConnectionEvent::Established(Box::new(connection)))
        .await
        .is_err()
    {
        let _ = outgoing.send(Outgoing::Close);
        return;
    }

    let decoder = FrameDecoder::with_max_content_length(connector.max_content_length);
    read_frames(reader, decoder, &events, &shutdown).await;
    let _ = outgoing.send(Outgoing::Close);
}

/// TCP connect, TLS handshake, then the CRL check of the peer chain.
async fn open_stream(
    connector: &TlsRelayConnector,
    address: &RelayAddress,
    events: &mpsc::Sender<ConnectionEvent>,
) -> Result<RelayStream, NetworkError> {
    let tcp = TcpStream::connect((address.host.as_str(), address.port))
        .await
        .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", address, e)))?;
    if let Err(e) = tcp.set_nodelay(true) {
        debug!(error = %e, "could not disable Nagle");
    }

    events
        .send(ConnectionEvent::Handshaking)
        .await
        .map_err(|_| NetworkError::ConnectionClosed)?;

    let server_name = ServerName::try_from(address.host.clone()).map_err(|_| {
        NetworkError::ConnectionFailed(format!("Invalid server name: {}", address.host))
    })?;
    let stream = connector
        .tls
        .connect(server_name, tcp)
        .await
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS handshake failed: {}", e)))?;

    let chain: Vec<CertificateDer<'static>> = stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|certs| certs.to_vec())
        .unwrap_or_default();
    connector.validator.validate_chain(&chain).await?;

    info!(relay = %address, certificates = chain.len(), "TLS established");
    Ok(stream)
}

async fn read_frames(
    mut reader: ReadHalf<RelayStream>,
    mut decoder: FrameDecoder,
    events: &mpsc::Sender<ConnectionEvent>,
    shutdown: &Notify,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = tokio::select! {
            _ = shutdown.notified() => {
                debug!("relay connection closed locally");
                return;
            }
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                debug!(partial = decoder.has_partial_frame(), "relay closed connection");
                let _ = events.send(ConnectionEvent::Lost).await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "relay read failed");
                let _ = events.send(ConnectionEvent::Lost).await;
                return;
            }
        };

        decoder.push(&buf[..n]);
        loop {
            match decoder.next_message() {
                Ok(Some(message)) => {
                    debug!(
                        command = ?message.command(),
                        len = message.content.len(),
                        "frame received"
                    );
                    if events.send(ConnectionEvent::Message(message)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "undecodable frame, dropping connection");
                    let _ = events.send(ConnectionEvent::Failed(e)).await;
                    return;
                }
            }
        }
    }
}

async fn write_frames(
    mut writer: WriteHalf<RelayStream>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(item) = outgoing.recv().await {
        let frame = match item {
            Outgoing::Frame(frame) => frame,
            Outgoing::Close => break,
        };
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(error = %e, "relay write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
