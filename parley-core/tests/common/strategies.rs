// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies

use parley_core::network::{
    Command, Header, ADDRESS_WIDTH, AUTH_TOKEN_WIDTH, MESSAGE_ID_WIDTH, PROTOCOL_VERSION,
};
use parley_core::RelayMessage;
use proptest::prelude::*;

/// Any command code the protocol defines.
pub fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Ping),
        Just(Command::Pong),
        Just(Command::Register),
        Just(Command::RegisterSuccessful),
        Just(Command::RegisterFailed),
        Just(Command::SendMessage),
    ]
}

/// ASCII strings that fit a header slot of `width` bytes.
pub fn slot_string_strategy(width: usize) -> impl Strategy<Value = String> {
    proptest::string::string_regex(&format!("[a-zA-Z0-9@._-]{{0,{}}}", width))
        .expect("valid regex")
}

/// Arbitrary well-formed headers (content length left at zero).
pub fn header_strategy() -> impl Strategy<Value = Header> {
    (
        slot_string_strategy(AUTH_TOKEN_WIDTH),
        slot_string_strategy(ADDRESS_WIDTH),
        slot_string_strategy(ADDRESS_WIDTH),
        slot_string_strategy(MESSAGE_ID_WIDTH),
        any::<u16>(),
        any::<u16>(),
        any::<i64>(),
        command_strategy(),
    )
        .prop_map(
            |(auth_token, from, to, message_id, part_index, part_count, timestamp, command)| {
                Header {
                    version: PROTOCOL_VERSION,
                    content_length: 0,
                    auth_token,
                    from,
                    to,
                    message_id,
                    part_index,
                    part_count,
                    timestamp,
                    command,
                }
            },
        )
}

/// Messages with up to 4 KiB of content.
pub fn message_strategy() -> impl Strategy<Value = RelayMessage> {
    (header_strategy(), prop::collection::vec(any::<u8>(), 0..4096))
        .prop_map(|(header, content)| RelayMessage::new(header, content).expect("fits u32"))
}
