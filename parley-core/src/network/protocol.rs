// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol Layer
//!
//! Frame encoding and a restartable, push-driven frame decoder.
//!
//! Frame format: `[header: HEADER_SIZE bytes] [content: header.content_length bytes]`

use super::error::NetworkError;
use super::header::{Header, HEADER_SIZE};
use super::message::RelayMessage;

/// Maximum content size of one frame (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Serializes a message into one contiguous frame.
///
/// The returned buffer is meant to be handed to the transport in a single
/// write so frames from different senders never interleave.
pub fn encode_frame(message: &RelayMessage) -> Result<Vec<u8>, NetworkError> {
    encode_frame_with_limit(message, MAX_MESSAGE_SIZE)
}

/// Like [`encode_frame`] with an explicit content size limit.
pub fn encode_frame_with_limit(
    message: &RelayMessage,
    max_content_length: usize,
) -> Result<Vec<u8>, NetworkError> {
    let declared = message.header.content_length as usize;
    if declared != message.content.len() {
        return Err(NetworkError::LengthMismatch {
            declared,
            actual: message.content.len(),
        });
    }
    if declared > max_content_length {
        return Err(NetworkError::FrameTooLarge {
            size: declared,
            max: max_content_length,
        });
    }

    let header = message.header.encode()?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + declared);
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&message.content);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Bytes are pushed in whatever chunk sizes the transport delivers;
/// [`FrameDecoder::next_message`] yields complete messages as soon as they are
/// buffered and returns `Ok(None)` when more input is needed. It never blocks.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    pending_header: Option<Header>,
    max_content_length: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder with the default [`MAX_MESSAGE_SIZE`] limit.
    pub fn new() -> Self {
        Self::with_max_content_length(MAX_MESSAGE_SIZE)
    }

    /// Creates a decoder rejecting frames larger than `max_content_length`.
    pub fn with_max_content_length(max_content_length: usize) -> Self {
        FrameDecoder {
            buffer: Vec::new(),
            pending_header: None,
            max_content_length,
        }
    }

    /// Appends received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete message, if one is fully buffered.
    ///
    /// A malformed or oversized header is fatal: the stream is desynchronized
    /// and the connection must be dropped.
    pub fn next_message(&mut self) -> Result<Option<RelayMessage>, NetworkError> {
        if self.pending_header.is_none() {
            if self.buffer.len() < HEADER_SIZE {
                return Ok(None);
            }
            let header = Header::decode(&self.buffer[..HEADER_SIZE])?;
            let size = header.content_length as usize;
            if size > self.max_content_length {
                return Err(NetworkError::FrameTooLarge {
                    size,
                    max: self.max_content_length,
                });
            }
            self.buffer.drain(..HEADER_SIZE);
            self.pending_header = Some(header);
        }

        let needed = self
            .pending_header
            .as_ref()
            .map_or(0, |h| h.content_length as usize);
        if self.buffer.len() < needed {
            return Ok(None);
        }

        let Some(header) = self.pending_header.take() else {
            return Ok(None);
        };
        let content: Vec<u8> = self.buffer.drain(..needed).collect();
        Ok(Some(RelayMessage { header, content }))
    }

    /// Pushes `chunk` and drains every message it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<RelayMessage>, NetworkError> {
        self.push(chunk);
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Returns true if a frame has been started but not finished.
    pub fn has_partial_frame(&self) -> bool {
        self.pending_header.is_some() || !self.buffer.is_empty()
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
