//! Message identifiers and return layouts for the built-in protocols.
//!
//! Shared by the platform model and the conformance tables so both read
//! payload offsets from the same table.

use crate::bits::BitField;
use crate::layout::{Field, MessageLayout};

/// Fixed-width name and vendor strings are 16 bytes.
pub const NAME_WORDS: usize = 4;

/// Messages every protocol implements.
pub mod common {
    use super::*;

    pub const PROTOCOL_VERSION: u8 = 0x0;
    pub const PROTOCOL_ATTRIBUTES: u8 = 0x1;
    pub const PROTOCOL_MESSAGE_ATTRIBUTES: u8 = 0x2;

    pub const VERSION: MessageLayout = MessageLayout::new(
        "protocol version",
        &[
            Field::bits("minor", 0, BitField::new(15, 0)),
            Field::bits("major", 0, BitField::new(31, 16)),
        ],
    );

    pub const MESSAGE_ATTRIBUTES: MessageLayout =
        MessageLayout::new("message attributes", &[Field::word("attributes", 0)]);

    /// Pack a `major.minor` version word.
    pub const fn version(major: u16, minor: u16) -> u32 {
        (major as u32) << 16 | minor as u32
    }
}

/// Base protocol (0x10).
pub mod base {
    use super::*;

    pub const PROTOCOL_ID: u8 = 0x10;

    pub const DISCOVER_VENDOR: u8 = 0x3;
    pub const DISCOVER_SUB_VENDOR: u8 = 0x4;
    pub const DISCOVER_IMPLEMENTATION_VERSION: u8 = 0x5;
    pub const DISCOVER_LIST_PROTOCOLS: u8 = 0x6;
    pub const DISCOVER_AGENT: u8 = 0x7;

    /// Highest message id the base protocol defines here.
    pub const LAST_MESSAGE_ID: u8 = DISCOVER_AGENT;

    pub const NUM_PROTOCOLS: BitField = BitField::new(7, 0);
    pub const NUM_AGENTS: BitField = BitField::new(15, 8);

    pub const ATTRIBUTES: MessageLayout = MessageLayout::new(
        "base protocol attributes",
        &[
            Field::bits("num_protocols", 0, NUM_PROTOCOLS),
            Field::bits("num_agents", 0, NUM_AGENTS),
            Field::bits("reserved", 0, BitField::new(31, 16)),
        ],
    );

    pub const VENDOR: MessageLayout = MessageLayout::new(
        "discover vendor",
        &[Field::string("vendor_identifier", 0, NAME_WORDS)],
    );

    pub const IMPLEMENTATION_VERSION: MessageLayout = MessageLayout::new(
        "discover implementation version",
        &[Field::word("implementation_version", 0)],
    );

    /// Word 0 is the count; protocol ids follow packed four per word.
    pub const LIST_PROTOCOLS: MessageLayout = MessageLayout::new(
        "discover list protocols",
        &[Field::word("num_protocols", 0)],
    );

    pub const AGENT: MessageLayout = MessageLayout::new(
        "discover agent",
        &[
            Field::word("agent_id", 0),
            Field::string("name", 1, NAME_WORDS),
        ],
    );

    /// Pack protocol ids four per word, least significant byte first.
    pub fn pack_protocols(ids: &[u8]) -> Vec<u32> {
        ids.chunks(4)
            .map(|chunk| {
                let mut bytes = [0u8; 4];
                bytes[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(bytes)
            })
            .collect()
    }

    /// Unpack `count` protocol ids from packed words.
    pub fn unpack_protocols(words: &[u32], count: usize) -> Vec<u8> {
        words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .take(count)
            .collect()
    }
}

/// Power domain management protocol (0x11).
pub mod power {
    use super::*;

    pub const PROTOCOL_ID: u8 = 0x11;

    pub const DOMAIN_ATTRIBUTES: u8 = 0x3;
    pub const STATE_SET: u8 = 0x4;
    pub const STATE_GET: u8 = 0x5;
    pub const STATE_NOTIFY: u8 = 0x6;

    /// Notification message id for a power state change.
    pub const STATE_CHANGED: u8 = 0x0;

    pub const LAST_MESSAGE_ID: u8 = STATE_NOTIFY;

    /// `flags` parameter of STATE_SET: bit 0 requests asynchronous completion.
    pub const SET_ASYNC: BitField = BitField::bit(0);

    pub const STATE_ON: u32 = 0x0000_0000;
    pub const STATE_OFF: u32 = 0x4000_0000;

    pub const NUM_DOMAINS: BitField = BitField::new(15, 0);

    pub const ATTRIBUTES: MessageLayout = MessageLayout::new(
        "power protocol attributes",
        &[
            Field::bits("num_domains", 0, NUM_DOMAINS),
            Field::bits("reserved", 0, BitField::new(31, 16)),
            Field::word("stats_address_low", 1),
            Field::word("stats_address_high", 2),
            Field::word("stats_length", 3),
        ],
    );

    pub const NOTIFY_SUPPORT: BitField = BitField::bit(31);
    pub const ASYNC_SUPPORT: BitField = BitField::bit(30);
    pub const SYNC_SUPPORT: BitField = BitField::bit(29);

    pub const DOMAIN_ATTRIBUTES_LAYOUT: MessageLayout = MessageLayout::new(
        "power domain attributes",
        &[
            Field::bits("state_change_notification", 0, NOTIFY_SUPPORT),
            Field::bits("async_support", 0, ASYNC_SUPPORT),
            Field::bits("sync_support", 0, SYNC_SUPPORT),
            Field::bits("reserved", 0, BitField::new(28, 0)),
            Field::string("name", 1, NAME_WORDS),
        ],
    );

    pub const STATE: MessageLayout =
        MessageLayout::new("power state get", &[Field::word("power_state", 0)]);

    /// Payload of a POWER_STATE_CHANGED notification.
    pub const STATE_CHANGED_LAYOUT: MessageLayout = MessageLayout::new(
        "power state changed",
        &[
            Field::word("agent_id", 0),
            Field::word("domain_id", 1),
            Field::word("power_state", 2),
        ],
    );

    /// Delayed response to an asynchronous STATE_SET.
    pub const STATE_SET_COMPLETE: MessageLayout = MessageLayout::new(
        "power state set complete",
        &[Field::word("domain_id", 0), Field::word("power_state", 1)],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_packing() {
        let ids = [0x11, 0x12, 0x13, 0x14, 0x15, 0x16];
        let words = base::pack_protocols(&ids);
        assert_eq!(words, vec![0x1413_1211, 0x0000_1615]);
        assert_eq!(base::unpack_protocols(&words, 6), ids.to_vec());
        assert_eq!(base::unpack_protocols(&words, 2), vec![0x11, 0x12]);
    }

    #[test]
    fn layouts_fit_payload() {
        let layouts = [
            common::VERSION,
            common::MESSAGE_ATTRIBUTES,
            base::ATTRIBUTES,
            base::VENDOR,
            base::IMPLEMENTATION_VERSION,
            base::LIST_PROTOCOLS,
            base::AGENT,
            power::ATTRIBUTES,
            power::DOMAIN_ATTRIBUTES_LAYOUT,
            power::STATE,
            power::STATE_SET_COMPLETE,
        ];
        for layout in layouts {
            for field in layout.fields {
                assert!(field.fits_payload(), "{}: {}", layout.name, field.name);
            }
        }
    }

    #[test]
    fn version_word() {
        let word = common::version(2, 1);
        assert_eq!(common::VERSION.field("major").unwrap().read(&[word]), Some(2));
        assert_eq!(common::VERSION.field("minor").unwrap().read(&[word]), Some(1));
    }
}
