//! Mailbox shared-memory buffer layout.
//!
//! ```text
//! 0x00  reserved                 4
//! 0x04  channel status           4
//! 0x08  implementation defined   8
//! 0x10  flags                    4   bit0 = completion by interrupt
//! 0x14  length                   4   = 4 (header) + 4 * payload words
//! 0x18  message header           4
//! 0x1C  message payload          N * 4
//! ```
//!
//! All fields are little-endian. A response uses the identical layout; its
//! payload starts with the status word followed by the return words.
//! Notifications have no status word: the payload is the event data.

use std::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};

use crate::header::{Header, HeaderError, MessageType};

/// Total size of the shared buffer in bytes.
pub const MAILBOX_SIZE: usize = 0x80;

pub const CHANNEL_STATUS_OFFSET: usize = 0x04;
pub const FLAGS_OFFSET: usize = 0x10;
pub const LENGTH_OFFSET: usize = 0x14;
pub const HEADER_OFFSET: usize = 0x18;
pub const PAYLOAD_OFFSET: usize = 0x1C;

/// Largest payload that fits after the header, in 32-bit words.
pub const MAX_PAYLOAD_WORDS: usize = (MAILBOX_SIZE - PAYLOAD_OFFSET) / 4;

/// Largest number of return words in a response (payload minus status).
pub const MAX_RETURN_WORDS: usize = MAX_PAYLOAD_WORDS - 1;

const _: () = assert!(MAX_PAYLOAD_WORDS == 25);

bitflags! {
    /// Mailbox flags word (offset 0x10).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MailboxFlags: u32 {
        /// Platform signals completion with an interrupt (doorbell).
        const COMPLETION_INTERRUPT = 1 << 0;
    }
}

bitflags! {
    /// Channel status word (offset 0x04).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ChannelStatus: u32 {
        /// Channel is owned by the agent.
        const FREE = 1 << 0;
        /// Platform reported a channel error.
        const ERROR = 1 << 1;
    }
}

/// A decoded response: header, signed status and return words.
///
/// Returned by value from every transport call; it stays valid for as long
/// as the caller keeps it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub header: Header,
    pub status: i32,
    pub returns: Vec<u32>,
}

impl Response {
    pub fn new(header: Header, status: i32, returns: Vec<u32>) -> Self {
        Self {
            header,
            status,
            returns,
        }
    }

    /// A response carrying only a status.
    pub fn status_only(header: Header, status: i32) -> Self {
        Self::new(header, status, Vec::new())
    }

    /// Return word at `offset`, if the platform sent that many.
    pub fn word(&self, offset: usize) -> Option<u32> {
        self.returns.get(offset).copied()
    }

    pub fn return_count(&self) -> usize {
        self.returns.len()
    }
}

/// Serialize a command into a mailbox buffer.
pub fn encode_command(header: &Header, params: &[u32]) -> Result<Vec<u8>, FrameError> {
    if params.len() > MAX_PAYLOAD_WORDS {
        return Err(FrameError::TooManyWords {
            count: params.len(),
            max: MAX_PAYLOAD_WORDS,
        });
    }
    Ok(encode_buffer(ChannelStatus::empty(), header, params))
}

/// Parse a command out of a mailbox buffer (platform side).
pub fn decode_command(buf: &[u8]) -> Result<(Header, Vec<u32>), FrameError> {
    let (header, words) = decode_buffer(buf)?;
    Ok((header, words))
}

/// Serialize a response (platform side). The status word leads the payload,
/// except for notifications, whose payload is written as-is.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, FrameError> {
    if response.header.message_type == MessageType::Notification {
        return encode_notification(&response.header, &response.returns);
    }
    if response.returns.len() > MAX_RETURN_WORDS {
        return Err(FrameError::TooManyWords {
            count: response.returns.len(),
            max: MAX_RETURN_WORDS,
        });
    }
    let mut payload = Vec::with_capacity(response.returns.len() + 1);
    payload.push(response.status as u32);
    payload.extend_from_slice(&response.returns);
    Ok(encode_buffer(ChannelStatus::FREE, &response.header, &payload))
}

/// Serialize a platform notification.
pub fn encode_notification(header: &Header, payload: &[u32]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_WORDS {
        return Err(FrameError::TooManyWords {
            count: payload.len(),
            max: MAX_PAYLOAD_WORDS,
        });
    }
    Ok(encode_buffer(ChannelStatus::FREE, header, payload))
}

/// Parse a response: header, then status, then return words, in that order.
///
/// A notification decodes with a SUCCESS status and its whole payload as
/// return words.
pub fn decode_response(buf: &[u8]) -> Result<Response, FrameError> {
    let (header, words) = decode_buffer(buf)?;
    if header.message_type == MessageType::Notification {
        return Ok(Response::new(header, 0, words));
    }
    let Some((&status, returns)) = words.split_first() else {
        return Err(FrameError::MissingStatus);
    };
    Ok(Response::new(header, status as i32, returns.to_vec()))
}

/// Message type of a buffer, read without consuming or validating the payload.
pub fn message_type(buf: &[u8]) -> Option<MessageType> {
    let mut cursor = buf.get(HEADER_OFFSET..HEADER_OFFSET + 4)?;
    Header::decode(cursor.get_u32_le())
        .ok()
        .map(|header| header.message_type)
}

/// Length field value for a payload of `words` 32-bit words.
pub const fn length_for(words: usize) -> u32 {
    (4 + 4 * words) as u32
}

fn encode_buffer(channel_status: ChannelStatus, header: &Header, payload: &[u32]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(MAILBOX_SIZE);
    buf.put_u32_le(0);
    buf.put_u32_le(channel_status.bits());
    buf.put_u64_le(0);
    buf.put_u32_le(MailboxFlags::COMPLETION_INTERRUPT.bits());
    buf.put_u32_le(length_for(payload.len()));
    buf.put_u32_le(header.encode());
    for &word in payload {
        buf.put_u32_le(word);
    }
    buf.resize(MAILBOX_SIZE, 0);
    buf.to_vec()
}

fn decode_buffer(buf: &[u8]) -> Result<(Header, Vec<u32>), FrameError> {
    if buf.len() < PAYLOAD_OFFSET {
        return Err(FrameError::Truncated {
            len: buf.len(),
            need: PAYLOAD_OFFSET,
        });
    }

    let mut cursor = &buf[LENGTH_OFFSET..];
    let length = cursor.get_u32_le() as usize;
    if length < 4 || length % 4 != 0 {
        return Err(FrameError::BadLength(length as u32));
    }
    let words = (length - 4) / 4;
    let need = PAYLOAD_OFFSET + words * 4;
    if need > buf.len() {
        return Err(FrameError::Truncated {
            len: buf.len(),
            need,
        });
    }

    let header = Header::decode(cursor.get_u32_le()).map_err(FrameError::Header)?;
    let mut payload = Vec::with_capacity(words);
    for _ in 0..words {
        payload.push(cursor.get_u32_le());
    }
    Ok((header, payload))
}

/// Read the channel status word of a buffer.
pub fn channel_status(buf: &[u8]) -> Option<ChannelStatus> {
    let mut cursor = buf.get(CHANNEL_STATUS_OFFSET..CHANNEL_STATUS_OFFSET + 4)?;
    Some(ChannelStatus::from_bits_truncate(cursor.get_u32_le()))
}

/// Errors framing or parsing a mailbox buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// More payload words than fit in the buffer.
    TooManyWords { count: usize, max: usize },
    /// Buffer shorter than the layout requires.
    Truncated { len: usize, need: usize },
    /// Length field below 4 or not word aligned.
    BadLength(u32),
    /// Response payload has no status word.
    MissingStatus,
    /// Header word does not decode.
    Header(HeaderError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooManyWords { count, max } => {
                write!(f, "{} payload words exceed the mailbox limit of {}", count, max)
            }
            FrameError::Truncated { len, need } => {
                write!(f, "mailbox buffer is {} bytes, layout needs {}", len, need)
            }
            FrameError::BadLength(len) => write!(f, "invalid length field: {}", len),
            FrameError::MissingStatus => write!(f, "response carries no status word"),
            FrameError::Header(e) => write!(f, "bad message header: {}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Header(e) => Some(e),
            _ => None,
        }
    }
}
