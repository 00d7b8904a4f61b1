//! The RFC 7932 static dictionary: word access, lookup indexes and
//! transform-aware matching.
//!
//! Word data comes from `brotli-decompressor`, so the encoder and every
//! decoder agree on it byte for byte.

pub mod matcher;
pub mod transform;

pub use matcher::{find_all_matches, DictionaryMatches, MAX_STATIC_DICTIONARY_MATCH_LEN};
pub use transform::{transform_word, CUTOFF_TRANSFORMS, NUM_TRANSFORMS, TRANSFORMS};

use std::sync::OnceLock;

use brotli_decompressor::dictionary::{
    kBrotliDictionary, kBrotliDictionaryOffsetsByLength, kBrotliDictionarySizeBitsByLength,
};

pub const MIN_WORD_LENGTH: usize = 4;
pub const MAX_WORD_LENGTH: usize = 24;

/// Multiplier shared by the 32-bit multiplicative hashes
pub const HASH_MUL32: u32 = 0x1E35_A7BD;

/// Bits of the hash that selects a lookup bucket
const LOOKUP_HASH_BITS: u32 = 14;

/// Base-2 logarithm of the number of words of length `len`
#[inline]
pub fn size_bits(len: usize) -> u32 {
    kBrotliDictionarySizeBitsByLength[len] as u32
}

#[inline]
pub fn num_words(len: usize) -> usize {
    if (MIN_WORD_LENGTH..=MAX_WORD_LENGTH).contains(&len) {
        1 << size_bits(len)
    } else {
        0
    }
}

/// Word `idx` of length `len`
#[inline]
pub fn word(len: usize, idx: usize) -> &'static [u8] {
    let offset = kBrotliDictionaryOffsetsByLength[len] as usize + len * idx;
    &kBrotliDictionary[offset..offset + len]
}

#[inline]
pub(crate) fn load_u32(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// 14-bit hash of the first four bytes of `data`
#[inline]
pub fn hash14(data: &[u8]) -> usize {
    (load_u32(data).wrapping_mul(HASH_MUL32) >> (32 - LOOKUP_HASH_BITS)) as usize
}

/// Two candidate words per 14-bit hash of their first four bytes, as
/// `len | idx << 5` (0 = empty)
///
/// Longer words claim slots first, so the first slot holds the longest
/// word of its bucket.
pub struct LookupTable {
    pub(crate) items: Vec<u16>,
}

impl LookupTable {
    fn build() -> Self {
        let mut items = vec![0u16; 2 << LOOKUP_HASH_BITS];
        for len in (MIN_WORD_LENGTH..=MAX_WORD_LENGTH).rev() {
            for idx in 0..num_words(len) {
                let key = hash14(word(len, idx)) << 1;
                let item = (len | (idx << 5)) as u16;
                if items[key] == 0 {
                    items[key] = item;
                } else if items[key + 1] == 0 {
                    items[key + 1] = item;
                }
            }
        }
        Self { items }
    }

    /// Candidate at slot `slot` (0 or 1) of the bucket of `data`
    #[inline]
    pub fn item(&self, data: &[u8], slot: usize) -> u16 {
        self.items[(hash14(data) << 1) + slot]
    }
}

/// Shared lookup table, built on first use
pub fn lookup_table() -> &'static LookupTable {
    static TABLE: OnceLock<LookupTable> = OnceLock::new();
    TABLE.get_or_init(LookupTable::build)
}
