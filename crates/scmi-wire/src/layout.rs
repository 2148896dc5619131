//! Explicit per-message payload layouts.
//!
//! Each message declares an ordered list of named fields with a word offset
//! and an optional bit range. Both the codec and the expected-return
//! descriptors read offsets from these tables.

use crate::bits::BitField;
use crate::mailbox::MAX_RETURN_WORDS;

/// One named field of a message payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Offset in 32-bit words from the first return word.
    pub offset: usize,
    /// Sub-word range; `None` means the whole word.
    pub bits: Option<BitField>,
    /// Width in words for string fields; 1 otherwise.
    pub words: usize,
}

impl Field {
    pub const fn word(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            bits: None,
            words: 1,
        }
    }

    pub const fn bits(name: &'static str, offset: usize, bits: BitField) -> Self {
        Self {
            name,
            offset,
            bits: Some(bits),
            words: 1,
        }
    }

    /// A fixed-width string spanning `words` consecutive words.
    pub const fn string(name: &'static str, offset: usize, words: usize) -> Self {
        Self {
            name,
            offset,
            bits: None,
            words,
        }
    }

    /// Range actually read from the word at `offset`.
    pub fn range(&self) -> BitField {
        self.bits.unwrap_or(BitField::WORD)
    }

    /// Extract this field from a return-word slice. `None` when the platform
    /// returned fewer words than the field needs.
    pub fn read(&self, returns: &[u32]) -> Option<u32> {
        returns.get(self.offset).map(|&w| self.range().get(w))
    }

    /// Decode a NUL-padded little-endian string field.
    pub fn read_string(&self, returns: &[u32]) -> Option<String> {
        let words = returns.get(self.offset..self.offset + self.words)?;
        Some(words_to_string(words))
    }

    /// Offsets of every word this field touches are inside the payload limit.
    pub const fn fits_payload(&self) -> bool {
        self.words >= 1 && self.offset + self.words <= MAX_RETURN_WORDS
    }
}

/// Layout of a message's return payload.
#[derive(Clone, Copy, Debug)]
pub struct MessageLayout {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl MessageLayout {
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self { name, fields }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Number of words the layout spans.
    pub fn span(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.offset + f.words)
            .max()
            .unwrap_or(0)
    }
}

/// Decode NUL-padded ASCII packed little-endian into words.
pub fn words_to_string(words: &[u32]) -> String {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Pack a string into `words` little-endian words, NUL padded and truncated.
pub fn string_to_words(s: &str, words: usize) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(words * 4, 0);
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRIBUTES: MessageLayout = MessageLayout::new(
        "protocol attributes",
        &[
            Field::bits("num_protocols", 0, BitField::new(7, 0)),
            Field::bits("num_agents", 0, BitField::new(15, 8)),
            Field::bits("reserved", 0, BitField::new(31, 16)),
        ],
    );

    #[test]
    fn field_lookup_and_read() {
        let field = ATTRIBUTES.field("num_agents").unwrap();
        assert_eq!(field.read(&[0x0000_0206]), Some(2));
        assert_eq!(ATTRIBUTES.field("num_protocols").unwrap().read(&[0x0206]), Some(6));
        assert!(ATTRIBUTES.field("missing").is_none());
        assert_eq!(field.read(&[]), None);
        assert_eq!(ATTRIBUTES.span(), 1);
    }

    #[test]
    fn string_roundtrip_and_padding() {
        let words = string_to_words("arm", 4);
        assert_eq!(words.len(), 4);
        assert_eq!(words_to_string(&words), "arm");

        let field = Field::string("vendor", 0, 4);
        assert_eq!(field.read_string(&words).as_deref(), Some("arm"));
        assert_eq!(field.read_string(&words[..2]), None);

        let full = string_to_words("0123456789abcdefXYZ", 4);
        assert_eq!(words_to_string(&full), "0123456789abcdef");
    }

    #[test]
    fn fits_payload() {
        assert!(Field::word("a", 0).fits_payload());
        assert!(Field::word("last", MAX_RETURN_WORDS - 1).fits_payload());
        assert!(!Field::word("past", MAX_RETURN_WORDS).fits_payload());
        assert!(!Field::string("long", MAX_RETURN_WORDS - 2, 4).fits_payload());
    }
}
