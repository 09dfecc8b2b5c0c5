// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Header Codec
//!
//! Fixed-layout binary header prefixed to every relay frame. All integers are
//! big-endian. String fields are a one-byte length followed by a zero-padded
//! fixed-width slot, so the header size never depends on its contents:
//!
//! ```text
//! version        u16
//! content_length u32
//! auth_token     u8 len + 128 bytes
//! from           u8 len + 64 bytes
//! to             u8 len + 64 bytes
//! message_id     u8 len + 40 bytes
//! part_index     u16
//! part_count     u16
//! timestamp      i64 (ms since Unix epoch)
//! command        u16
//! ```

use super::error::NetworkError;

/// Wire protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Width of the auth token slot.
pub const AUTH_TOKEN_WIDTH: usize = 128;

/// Width of the from/to address slots.
pub const ADDRESS_WIDTH: usize = 64;

/// Width of the message id slot (fits a hyphenated UUID).
pub const MESSAGE_ID_WIDTH: usize = 40;

/// Encoded header size in bytes.
pub const HEADER_SIZE: usize = 2
    + 4
    + (1 + AUTH_TOKEN_WIDTH)
    + (1 + ADDRESS_WIDTH)
    + (1 + ADDRESS_WIDTH)
    + (1 + MESSAGE_ID_WIDTH)
    + 2
    + 2
    + 8
    + 2;

/// Relay command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    /// Keep-alive / clock sync request.
    Ping = 1,
    /// Keep-alive / clock sync reply.
    Pong = 2,
    /// Client authentication request.
    Register = 3,
    /// Server accepted the registration.
    RegisterSuccessful = 4,
    /// Server rejected the registration.
    RegisterFailed = 5,
    /// Ciphertext payload addressed from one user to another.
    SendMessage = 6,
}

impl Command {
    /// Returns the wire code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Returns true for commands that never carry content.
    pub fn is_control(self) -> bool {
        !matches!(self, Command::SendMessage)
    }
}

impl TryFrom<u16> for Command {
    type Error = NetworkError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Command::Ping),
            2 => Ok(Command::Pong),
            3 => Ok(Command::Register),
            4 => Ok(Command::RegisterSuccessful),
            5 => Ok(Command::RegisterFailed),
            6 => Ok(Command::SendMessage),
            other => Err(NetworkError::MalformedHeader(format!(
                "unknown command code {}",
                other
            ))),
        }
    }
}

/// Control structure prefixed to every relay frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Protocol version of the sender.
    pub version: u16,
    /// Number of content bytes following the header.
    pub content_length: u32,
    /// Auth token; empty except on REGISTER.
    pub auth_token: String,
    /// Sender address; empty for client-to-server control frames.
    pub from: String,
    /// Recipient address; empty unless relaying to another user.
    pub to: String,
    /// Logical message id; empty for control frames.
    pub message_id: String,
    /// Index of this frame within a multi-part message.
    pub part_index: u16,
    /// Total frames in the logical message.
    pub part_count: u16,
    /// Sender-local send time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Command code.
    pub command: Command,
}

impl Header {
    /// Creates a control header with no addressing and no content.
    pub fn control(command: Command, timestamp: i64) -> Self {
        Header {
            version: PROTOCOL_VERSION,
            content_length: 0,
            auth_token: String::new(),
            from: String::new(),
            to: String::new(),
            message_id: String::new(),
            part_index: 0,
            part_count: 1,
            timestamp,
            command,
        }
    }

    /// Serializes the header into its fixed-size wire form.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE], NetworkError> {
        let mut out = [0u8; HEADER_SIZE];
        let mut w = Writer {
            buf: &mut out,
            pos: 0,
        };

        w.put(&self.version.to_be_bytes());
        w.put(&self.content_length.to_be_bytes());
        w.put_str("auth_token", &self.auth_token, AUTH_TOKEN_WIDTH)?;
        w.put_str("from", &self.from, ADDRESS_WIDTH)?;
        w.put_str("to", &self.to, ADDRESS_WIDTH)?;
        w.put_str("message_id", &self.message_id, MESSAGE_ID_WIDTH)?;
        w.put(&self.part_index.to_be_bytes());
        w.put(&self.part_count.to_be_bytes());
        w.put(&self.timestamp.to_be_bytes());
        w.put(&self.command.code().to_be_bytes());

        debug_assert_eq!(w.pos, HEADER_SIZE);
        Ok(out)
    }

    /// Parses a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, NetworkError> {
        if bytes.len() < HEADER_SIZE {
            return Err(NetworkError::MalformedHeader(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut r = Reader {
            buf: &bytes[..HEADER_SIZE],
            pos: 0,
        };

        let version = u16::from_be_bytes(r.take());
        let content_length = u32::from_be_bytes(r.take());
        let auth_token = r.take_str("auth_token", AUTH_TOKEN_WIDTH)?;
        let from = r.take_str("from", ADDRESS_WIDTH)?;
        let to = r.take_str("to", ADDRESS_WIDTH)?;
        let message_id = r.take_str("message_id", MESSAGE_ID_WIDTH)?;
        let part_index = u16::from_be_bytes(r.take());
        let part_count = u16::from_be_bytes(r.take());
        let timestamp = i64::from_be_bytes(r.take());
        let command = Command::try_from(u16::from_be_bytes(r.take()))?;

        Ok(Header {
            version,
            content_length,
            auth_token,
            from,
            to,
            message_id,
            part_index,
            part_count,
            timestamp,
            command,
        })
    }
}

struct Writer<'a> {
    buf: &'a mut [u8; HEADER_SIZE],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_str(
        &mut self,
        field: &'static str,
        value: &str,
        width: usize,
    ) -> Result<(), NetworkError> {
        let bytes = value.as_bytes();
        if bytes.len() > width {
            return Err(NetworkError::FieldTooLong {
                field,
                len: bytes.len(),
                max: width,
            });
        }
        // width <= u8::MAX for every slot
        self.buf[self.pos] = bytes.len() as u8;
        self.pos += 1;
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += width;
        Ok(())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn take_str(&mut self, field: &str, width: usize) -> Result<String, NetworkError> {
        let len = self.buf[self.pos] as usize;
        self.pos += 1;
        if len > width {
            return Err(NetworkError::MalformedHeader(format!(
                "{} length {} exceeds slot width {}",
                field, len, width
            )));
        }
        let raw = &self.buf[self.pos..self.pos + len];
        self.pos += width;
        String::from_utf8(raw.to_vec())
            .map_err(|_| NetworkError::MalformedHeader(format!("{} is not valid UTF-8", field)))
    }
}
