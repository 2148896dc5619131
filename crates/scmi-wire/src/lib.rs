//! Wire types for SCMI-style command/response messages.
//!
//! - [`header`]: the fixed 32-bit message header
//! - [`bits`]: typed bit-field accessors and `extract_bits`
//! - [`status`]: the protocol status taxonomy
//! - [`layout`]: explicit per-message payload field tables
//! - [`mailbox`]: the shared-memory mailbox buffer framing
//! - [`messages`]: message ids and layouts of the built-in protocols

#![deny(unsafe_code)]

pub mod bits;
pub mod header;
pub mod layout;
pub mod mailbox;
pub mod messages;
pub mod status;

pub use bits::{BitField, BitFieldError, check_reserved_zero, extract_bits};
pub use header::{Header, HeaderError, MessageType, TOKEN_MAX, encode_header};
pub use layout::{Field, MessageLayout, string_to_words, words_to_string};
pub use mailbox::{FrameError, MAX_PAYLOAD_WORDS, MAX_RETURN_WORDS, Response};
pub use status::{ExpectedStatus, STATUS_UNSPECIFIED, Status, UnknownStatus, status_name};

/// Protocol identifiers.
pub mod protocol_id {
    pub const BASE: u8 = crate::messages::base::PROTOCOL_ID;
    pub const POWER: u8 = crate::messages::power::PROTOCOL_ID;
    pub const SYSTEM_POWER: u8 = 0x12;
    pub const PERFORMANCE: u8 = 0x13;
    pub const CLOCK: u8 = 0x14;
    pub const SENSOR: u8 = 0x15;
}
