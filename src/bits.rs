//! Byte <-> bit conversion, plus grouping bits into palette symbol codes.
//!
//! Bits are always most-significant first, 8 per byte.

use std::collections::BTreeSet;

use crate::classifier::Cell;
use crate::palette::Arity;

pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1 == 1);
        }
    }
    bits
}

/// Packs bits back into bytes. A trailing run shorter than 8 bits is dropped.
pub fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0_u8, |acc, &bit| (acc << 1) | bit as u8))
        .collect()
}

/// Text that survived the 8-bits-per-character rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Admitted {
    pub bytes: Vec<u8>,

    /// Characters that need more than one UTF-8 byte, and so were left out.
    pub skipped: BTreeSet<char>,
}

/// Keeps every character that fits in a single octet, skipping (and recording) the rest.
pub fn admit_text(text: &str) -> Admitted {
    let mut admitted = Admitted::default();
    for c in text.chars() {
        if c.len_utf8() == 1 {
            admitted.bytes.push(c as u8);
        } else {
            admitted.skipped.insert(c);
        }
    }
    admitted
}

/// Each byte is read back as the character with that code.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Groups bits into `arity`-bit codes, MSB first. The last group is padded with zero bits.
pub fn bits_to_symbols(bits: &[bool], arity: Arity) -> Vec<u8> {
    let width = arity.bits();
    bits.chunks(width)
        .map(|group| {
            let code = group.iter().fold(0_u8, |acc, &bit| (acc << 1) | bit as u8);
            code << (width - group.len())
        })
        .collect()
}

/// Concatenates the code bits of every data cell. Background cells contribute nothing.
pub fn symbols_to_bits<'a>(cells: impl IntoIterator<Item = &'a Cell>, arity: Arity) -> Vec<bool> {
    let width = arity.bits();
    let mut bits = vec![];
    for cell in cells {
        if let Cell::Symbol(code) = *cell {
            for shift in (0..width).rev() {
                bits.push((code >> shift) & 1 == 1);
            }
        }
    }
    bits
}

#[cfg(test)]
mod t {
    use super::*;

    use pretty_assertions::assert_eq;

    fn parse(s: &str) -> Vec<bool> {
        s.chars().filter(|c| !c.is_whitespace()).map(|c| c == '1').collect()
    }

    #[test]
    fn check_hi_bits() {
        assert_eq!(bytes_to_bits(b"Hi"), parse("01001000 01101001"));
        assert_eq!(bits_to_bytes(&parse("01001000 01101001")), b"Hi".to_vec());
    }

    #[test]
    fn check_empty() {
        assert_eq!(bytes_to_bits(&[]), Vec::<bool>::new());
        assert_eq!(bits_to_bytes(&[]), Vec::<u8>::new());
    }

    #[test]
    fn check_partial_byte_dropped() {
        // 13 bits -> 1 byte, the 5 bit remainder is not a character
        let bits = parse("01001000 01101");
        assert_eq!(bits.len(), 13);
        assert_eq!(bits_to_bytes(&bits), b"H".to_vec());
        assert_eq!(bits_to_bytes(&parse("1010101")), Vec::<u8>::new());
    }

    #[test]
    fn check_admit_text_skips_wide_chars() {
        let admitted = admit_text("héllo ☃ world");
        assert_eq!(admitted.bytes, b"hllo  world".to_vec());
        assert_eq!(admitted.skipped, BTreeSet::from(['é', '☃']));

        let admitted = admit_text("plain ascii");
        assert_eq!(admitted.bytes, b"plain ascii".to_vec());
        assert!(admitted.skipped.is_empty());
    }

    #[test]
    fn check_bytes_to_text() {
        assert_eq!(bytes_to_text(b"Hi there"), "Hi there");
    }

    #[test]
    fn check_symbols_color_pads_last_group() {
        // 8 bits -> 101 100 10(0)
        let codes = bits_to_symbols(&parse("10110010"), Arity::Color);
        assert_eq!(codes, vec![0b101, 0b100, 0b100]);
    }

    #[test]
    fn check_symbols_monochrome() {
        let codes = bits_to_symbols(&parse("0110"), Arity::Monochrome);
        assert_eq!(codes, vec![0, 1, 1, 0]);
    }

    #[test]
    fn check_symbols_to_bits_skips_background() {
        let cells = [
            Cell::Symbol(0b101),
            Cell::Symbol(0b011),
            Cell::Background,
            Cell::Background,
        ];
        assert_eq!(symbols_to_bits(&cells, Arity::Color), parse("101011"));

        let cells = [Cell::Symbol(1), Cell::Symbol(0), Cell::Background];
        assert_eq!(symbols_to_bits(&cells, Arity::Monochrome), parse("10"));
    }
}
