//! The 32-bit message header.
//!
//! ```text
//!  31    28 27        18 17          10 9    8 7            0
//! +--------+------------+--------------+------+--------------+
//! |reserved|   token    | protocol id  | type |  message id  |
//! +--------+------------+--------------+------+--------------+
//! ```

use std::fmt;

use crate::bits::BitField;

pub const RESERVED: BitField = BitField::new(31, 28);
pub const TOKEN: BitField = BitField::new(27, 18);
pub const PROTOCOL_ID: BitField = BitField::new(17, 10);
pub const MESSAGE_TYPE: BitField = BitField::new(9, 8);
pub const MESSAGE_ID: BitField = BitField::new(7, 0);

/// Largest token value (10 bits).
pub const TOKEN_MAX: u16 = 0x3FF;

/// Kind of message carried by a header.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Command sent by the agent; the synchronous response reuses this type.
    Command = 0,
    /// Completion of a command issued in asynchronous mode.
    DelayedResponse = 2,
    /// Platform-initiated notification.
    Notification = 3,
}

impl MessageType {
    pub fn from_u32(val: u32) -> Option<Self> {
        Some(match val {
            0 => MessageType::Command,
            2 => MessageType::DelayedResponse,
            3 => MessageType::Notification,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Command => write!(f, "command"),
            MessageType::DelayedResponse => write!(f, "delayed response"),
            MessageType::Notification => write!(f, "notification"),
        }
    }
}

/// Decoded message header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Header {
    pub reserved: u8,
    pub token: u16,
    pub protocol_id: u8,
    pub message_type: MessageType,
    pub message_id: u8,
}

impl Header {
    /// A command header with token 0.
    pub fn command(protocol_id: u8, message_id: u8) -> Self {
        Self {
            reserved: 0,
            token: 0,
            protocol_id,
            message_type: MessageType::Command,
            message_id,
        }
    }

    /// Same header with another token (truncated to 10 bits).
    pub fn with_token(mut self, token: u16) -> Self {
        self.token = token & TOKEN_MAX;
        self
    }

    /// Pack into the wire word.
    pub fn encode(&self) -> u32 {
        let word = RESERVED.set_truncating(0, self.reserved as u32);
        let word = TOKEN.set_truncating(word, self.token as u32);
        let word = PROTOCOL_ID.set_truncating(word, self.protocol_id as u32);
        let word = MESSAGE_TYPE.set_truncating(word, self.message_type.as_u32());
        MESSAGE_ID.set_truncating(word, self.message_id as u32)
    }

    /// Unpack a wire word.
    pub fn decode(word: u32) -> Result<Self, HeaderError> {
        let raw_type = MESSAGE_TYPE.get(word);
        let message_type =
            MessageType::from_u32(raw_type).ok_or(HeaderError::InvalidMessageType(raw_type))?;
        Ok(Self {
            reserved: RESERVED.get(word) as u8,
            token: TOKEN.get(word) as u16,
            protocol_id: PROTOCOL_ID.get(word) as u8,
            message_type,
            message_id: MESSAGE_ID.get(word) as u8,
        })
    }

    /// True when `other` answers this command (same protocol and message id).
    pub fn matches(&self, other: &Header) -> bool {
        self.protocol_id == other.protocol_id && self.message_id == other.message_id
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} protocol={:#04x} message={:#04x} token={}",
            self.message_type, self.protocol_id, self.message_id, self.token
        )
    }
}

/// Pack header fields into a wire word.
///
/// `token` is truncated to 10 bits; the reserved nibble is always zero.
pub fn encode_header(
    protocol_id: u8,
    message_type: MessageType,
    message_id: u8,
    token: u16,
) -> u32 {
    Header {
        reserved: 0,
        token: token & TOKEN_MAX,
        protocol_id,
        message_type,
        message_id,
    }
    .encode()
}

/// Error decoding a header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// Message type bits hold a value outside {0, 2, 3}.
    InvalidMessageType(u32),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::InvalidMessageType(v) => write!(f, "invalid message type: {}", v),
        }
    }
}

impl std::error::Error for HeaderError {}
