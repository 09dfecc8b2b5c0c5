// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Messages
//!
//! A relay message is one header plus opaque content. Payloads larger than
//! [`MAX_PART_SIZE`] travel as several frames sharing a message id.

use std::collections::HashMap;

use tracing::warn;

use super::error::NetworkError;
use super::header::{Command, Header, PROTOCOL_VERSION};
use crate::auth::UserCredentials;

/// Unique message identifier (UUID v4).
pub type MessageId = String;

/// Largest content carried by a single SEND_MESSAGE frame.
pub const MAX_PART_SIZE: usize = 64 * 1024;

/// Incomplete multi-part messages kept by a [`PartReassembler`].
pub const MAX_PENDING_PAYLOADS: usize = 64;

/// Content bytes a [`PartReassembler`] buffers across incomplete messages.
pub const MAX_BUFFERED_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub header: Header,
    pub content: Vec<u8>,
}

impl RelayMessage {
    /// Creates a message, setting the header's content length from `content`.
    pub fn new(mut header: Header, content: Vec<u8>) -> Result<Self, NetworkError> {
        header.content_length =
            u32::try_from(content.len()).map_err(|_| NetworkError::FrameTooLarge {
                size: content.len(),
                max: u32::MAX as usize,
            })?;
        Ok(RelayMessage { header, content })
    }

    /// Creates a content-free control message.
    pub fn control(command: Command, timestamp: i64) -> Self {
        RelayMessage {
            header: Header::control(command, timestamp),
            content: Vec::new(),
        }
    }

    /// Creates the REGISTER message authenticating `credentials`.
    pub fn register(credentials: &UserCredentials, timestamp: i64) -> Self {
        let mut message = Self::control(Command::Register, timestamp);
        message.header.auth_token = credentials.auth_token.clone();
        message.header.from = credentials.address.clone();
        message
    }

    /// Returns the command of this message.
    pub fn command(&self) -> Command {
        self.header.command
    }
}

/// Creates a fresh message id.
pub fn new_message_id() -> MessageId {
    uuid::Uuid::new_v4().to_string()
}

/// Splits `payload` into SEND_MESSAGE frames of at most `max_part_size` bytes.
///
/// An empty payload still produces one (empty) frame.
pub fn split_payload(
    from: &str,
    to: &str,
    message_id: &str,
    payload: &[u8],
    max_part_size: usize,
    timestamp: i64,
) -> Result<Vec<RelayMessage>, NetworkError> {
    let max_part_size = max_part_size.max(1);
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[][..]]
    } else {
        payload.chunks(max_part_size).collect()
    };

    let part_count = u16::try_from(chunks.len()).map_err(|_| NetworkError::FrameTooLarge {
        size: payload.len(),
        max: max_part_size * u16::MAX as usize,
    })?;

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let header = Header {
                version: PROTOCOL_VERSION,
                content_length: 0,
                auth_token: String::new(),
                from: from.to_string(),
                to: to.to_string(),
                message_id: message_id.to_string(),
                part_index: index as u16,
                part_count,
                timestamp,
                command: Command::SendMessage,
            };
            RelayMessage::new(header, chunk.to_vec())
        })
        .collect()
}

/// A logical message rebuilt from all of its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPayload {
    pub from: String,
    pub message_id: MessageId,
    pub content: Vec<u8>,
}

struct PartialPayload {
    parts: Vec<Option<Vec<u8>>>,
    received: usize,
    bytes: usize,
    /// Arrival order of the first part, for eviction.
    seq: u64,
}

type PartialKey = (String, MessageId);

/// Collects SEND_MESSAGE frames until every part of a message has arrived.
///
/// Incomplete messages are bounded in number and in buffered bytes; when
/// either bound is hit the oldest incomplete message is dropped.
pub struct PartReassembler {
    partial: HashMap<PartialKey, PartialPayload>,
    max_pending: usize,
    max_buffered_bytes: usize,
    buffered_bytes: usize,
    next_seq: u64,
}

impl Default for PartReassembler {
    fn default() -> Self {
        Self::with_limits(MAX_PENDING_PAYLOADS, MAX_BUFFERED_PAYLOAD_BYTES)
    }
}

impl PartReassembler {
    /// Creates an empty reassembler with the default bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty reassembler keeping at most `max_pending` incomplete
    /// messages and `max_buffered_bytes` of their content.
    pub fn with_limits(max_pending: usize, max_buffered_bytes: usize) -> Self {
        PartReassembler {
            partial: HashMap::new(),
            max_pending: max_pending.max(1),
            max_buffered_bytes,
            buffered_bytes: 0,
            next_seq: 0,
        }
    }

    /// Adds one frame; returns the payload once its last missing part arrives.
    ///
    /// Duplicate parts are ignored. A frame whose part count disagrees with
    /// earlier parts of the same message, or a part that cannot fit in the
    /// buffer, is a protocol violation.
    pub fn add(
        &mut self,
        message: RelayMessage,
    ) -> Result<Option<AssembledPayload>, NetworkError> {
        let header = &message.header;
        let count = header.part_count.max(1) as usize;
        let index = header.part_index as usize;
        if index >= count {
            return Err(NetworkError::ProtocolViolation(format!(
                "part {} of {} for message {}",
                index, count, header.message_id
            )));
        }

        if count == 1 {
            return Ok(Some(AssembledPayload {
                from: header.from.clone(),
                message_id: header.message_id.clone(),
                content: message.content,
            }));
        }

        let key = (header.from.clone(), header.message_id.clone());
        let size = message.content.len();
        if size > self.max_buffered_bytes {
            self.remove(&key);
            return Err(NetworkError::ProtocolViolation(format!(
                "part of {} bytes exceeds reassembly buffer for message {}",
                size, key.1
            )));
        }

        if !self.partial.contains_key(&key) {
            while self.partial.len() >= self.max_pending && self.evict_oldest(&key) {}
            let seq = self.next_seq;
            self.next_seq += 1;
            self.partial.insert(
                key.clone(),
                PartialPayload {
                    parts: vec![None; count],
                    received: 0,
                    bytes: 0,
                    seq,
                },
            );
        }

        let (expected, have_part) = match self.partial.get(&key) {
            Some(entry) => (
                entry.parts.len(),
                entry.parts.get(index).is_some_and(Option::is_some),
            ),
            None => return Ok(None),
        };
        if expected != count {
            self.remove(&key);
            return Err(NetworkError::ProtocolViolation(format!(
                "inconsistent part count for message {}",
                key.1
            )));
        }
        if have_part {
            return Ok(None);
        }

        while self.buffered_bytes + size > self.max_buffered_bytes && self.evict_oldest(&key) {}
        if self.buffered_bytes + size > self.max_buffered_bytes {
            self.remove(&key);
            return Err(NetworkError::ProtocolViolation(format!(
                "reassembly buffer full for message {}",
                key.1
            )));
        }

        let Some(entry) = self.partial.get_mut(&key) else {
            return Ok(None);
        };
        entry.parts[index] = Some(message.content);
        entry.received += 1;
        entry.bytes += size;
        self.buffered_bytes += size;
        if entry.received < count {
            return Ok(None);
        }

        let Some(done) = self.remove(&key) else {
            return Ok(None);
        };
        let content = done.parts.into_iter().flatten().flatten().collect();
        Ok(Some(AssembledPayload {
            from: key.0,
            message_id: key.1,
            content,
        }))
    }

    /// Number of messages still waiting for parts.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Content bytes held for incomplete messages.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    fn remove(&mut self, key: &PartialKey) -> Option<PartialPayload> {
        let entry = self.partial.remove(key)?;
        self.buffered_bytes -= entry.bytes;
        Some(entry)
    }

    /// Drops the oldest incomplete message other than `keep`.
    fn evict_oldest(&mut self, keep: &PartialKey) -> bool {
        let oldest = self
            .partial
            .iter()
            .filter(|(key, _)| *key != keep)
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| key.clone());
        let Some(key) = oldest else {
            return false;
        };
        if let Some(entry) = self.remove(&key) {
            warn!(
                from = %key.0,
                message_id = %key.1,
                received = entry.received,
                of = entry.parts.len(),
                "dropping incomplete message"
            );
        }
        true
    }
}
