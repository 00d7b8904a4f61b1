//! Transform-aware dictionary matching for optimal parsing.
//!
//! Every transformed word is a prefix, a transformed core and a suffix.
//! Cores (identity, upper-cased and "omit first N" variants of each word)
//! are indexed by a hash of their first four bytes; a lookup tries each
//! prefix that matches the input, then every core in the bucket, then the
//! suffixes of the transforms sharing that prefix and core kind.

use std::sync::OnceLock;

use super::transform::{transform_core, WordTransform, NUM_TRANSFORMS, TRANSFORMS};
use super::{load_u32, num_words, size_bits, word, HASH_MUL32, MAX_WORD_LENGTH, MIN_WORD_LENGTH};

/// Longest transformed word: " the " + 24 bytes + " of the "
pub const MAX_STATIC_DICTIONARY_MATCH_LEN: usize = 37;

/// Marker for "no match of this length"
pub const INVALID_MATCH: u32 = 0x0FFF_FFFF;

/// Best match per length: `(word_idx + (transform << size_bits)) << 5 | word_len`
pub type DictionaryMatches = [u32; MAX_STATIC_DICTIONARY_MATCH_LEN + 1];

const CORE_HASH_BITS: u32 = 15;

#[inline]
fn core_hash(data: &[u8]) -> usize {
    (load_u32(data).wrapping_mul(HASH_MUL32) >> (32 - CORE_HASH_BITS)) as usize
}

#[derive(Clone, Copy, Debug)]
struct CoreEntry {
    word_len: u8,
    kind: u8,
    word_idx: u16,
}

#[derive(Clone, Copy, Debug)]
struct Variant {
    omit_last: u8,
    suffix: &'static [u8],
    transform_id: u8,
}

#[derive(Debug)]
struct PrefixGroup {
    prefix: &'static [u8],
    /// Variants per core kind
    variants: Vec<Vec<Variant>>,
}

struct TransformIndex {
    core_kinds: Vec<WordTransform>,
    groups: Vec<PrefixGroup>,
    bucket_start: Vec<u32>,
    entries: Vec<CoreEntry>,
}

/// Core kind a transform builds on; "omit last" shares the identity core
fn core_kind_of(kind: WordTransform) -> WordTransform {
    match kind {
        WordTransform::OmitLast(_) => WordTransform::Identity,
        other => other,
    }
}

impl TransformIndex {
    fn build() -> Self {
        let mut core_kinds: Vec<WordTransform> = Vec::new();
        let mut groups: Vec<PrefixGroup> = Vec::new();
        for (id, tr) in TRANSFORMS.iter().enumerate() {
            let core = core_kind_of(tr.kind);
            let kind_ix = match core_kinds.iter().position(|&k| k == core) {
                Some(ix) => ix,
                None => {
                    core_kinds.push(core);
                    core_kinds.len() - 1
                }
            };
            let group_ix = match groups.iter().position(|g| g.prefix == tr.prefix) {
                Some(ix) => ix,
                None => {
                    groups.push(PrefixGroup { prefix: tr.prefix, variants: Vec::new() });
                    groups.len() - 1
                }
            };
            let variants = &mut groups[group_ix].variants;
            if variants.len() <= kind_ix {
                variants.resize(kind_ix + 1, Vec::new());
            }
            let omit_last = match tr.kind {
                WordTransform::OmitLast(n) => n,
                _ => 0,
            };
            variants[kind_ix].push(Variant { omit_last, suffix: tr.suffix, transform_id: id as u8 });
        }
        for g in &mut groups {
            g.variants.resize(core_kinds.len(), Vec::new());
        }
        debug_assert!(NUM_TRANSFORMS <= u8::MAX as usize);

        // Counting sort of all cores of at least four bytes by hash.
        let mut keyed: Vec<(u32, CoreEntry)> = Vec::new();
        let mut core = Vec::with_capacity(MAX_WORD_LENGTH);
        for len in MIN_WORD_LENGTH..=MAX_WORD_LENGTH {
            for idx in 0..num_words(len) {
                let w = word(len, idx);
                for (kind_ix, &kind) in core_kinds.iter().enumerate() {
                    core.clear();
                    transform_core(w, kind, &mut core);
                    if core.len() < 4 {
                        continue;
                    }
                    let entry = CoreEntry { word_len: len as u8, kind: kind_ix as u8, word_idx: idx as u16 };
                    keyed.push((core_hash(&core) as u32, entry));
                }
            }
        }
        let mut bucket_start = vec![0u32; (1 << CORE_HASH_BITS) + 1];
        for &(key, _) in &keyed {
            bucket_start[key as usize + 1] += 1;
        }
        for i in 1..bucket_start.len() {
            bucket_start[i] += bucket_start[i - 1];
        }
        let mut fill = bucket_start.clone();
        let mut entries = vec![CoreEntry { word_len: 0, kind: 0, word_idx: 0 }; keyed.len()];
        for (key, entry) in keyed {
            entries[fill[key as usize] as usize] = entry;
            fill[key as usize] += 1;
        }

        Self { core_kinds, groups, bucket_start, entries }
    }

    fn bucket(&self, key: usize) -> &[CoreEntry] {
        &self.entries[self.bucket_start[key] as usize..self.bucket_start[key + 1] as usize]
    }
}

fn transform_index() -> &'static TransformIndex {
    static INDEX: OnceLock<TransformIndex> = OnceLock::new();
    INDEX.get_or_init(TransformIndex::build)
}

/// Find, for every length in `min_length..=max_length`, the cheapest
/// dictionary reference whose expansion is a prefix of `data`
///
/// Returns whether any match was found. `data` must hold at least
/// `max_length` bytes.
pub fn find_all_matches(data: &[u8], min_length: usize, max_length: usize, matches: &mut DictionaryMatches) -> bool {
    matches.fill(INVALID_MATCH);
    let max_length = max_length.min(MAX_STATIC_DICTIONARY_MATCH_LEN).min(data.len());
    let data = &data[..max_length];
    let index = transform_index();
    let mut found = false;
    let mut core = Vec::with_capacity(MAX_WORD_LENGTH);

    for group in &index.groups {
        if !data.starts_with(group.prefix) {
            continue;
        }
        let rest = &data[group.prefix.len()..];
        if rest.len() < 4 {
            continue;
        }
        for entry in index.bucket(core_hash(rest)) {
            let variants = &group.variants[entry.kind as usize];
            if variants.is_empty() {
                continue;
            }
            let len = entry.word_len as usize;
            core.clear();
            transform_core(word(len, entry.word_idx as usize), index.core_kinds[entry.kind as usize], &mut core);
            let matched = core.iter().zip(rest).take_while(|(a, b)| a == b).count();
            if matched < 4 {
                continue;
            }
            for v in variants {
                let Some(core_len) = core.len().checked_sub(v.omit_last as usize) else {
                    continue;
                };
                if matched < core_len || !rest[core_len..].starts_with(v.suffix) {
                    continue;
                }
                let total = group.prefix.len() + core_len + v.suffix.len();
                if total < min_length {
                    continue;
                }
                let dist = entry.word_idx as u32 + ((v.transform_id as u32) << size_bits(len));
                let code = (dist << 5) | len as u32;
                if code < matches[total] {
                    matches[total] = code;
                    found = true;
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::transform_word;

    /// Expand a match code back into bytes
    fn expand(code: u32) -> Vec<u8> {
        let len = (code & 31) as usize;
        let dist = (code >> 5) as usize;
        let idx = dist & (num_words(len) - 1);
        let transform_id = dist >> size_bits(len);
        let mut out = Vec::new();
        transform_word(word(len, idx), transform_id, &mut out);
        out
    }

    fn check_all(data: &[u8]) -> usize {
        let mut matches = [0u32; MAX_STATIC_DICTIONARY_MATCH_LEN + 1];
        find_all_matches(data, 4, data.len(), &mut matches);
        let mut n = 0;
        for (len, &code) in matches.iter().enumerate() {
            if code != INVALID_MATCH {
                assert_eq!(expand(code), &data[..len], "length {}", len);
                n += 1;
            }
        }
        n
    }

    #[test]
    fn test_identity_and_suffix_matches() {
        let mut matches = [0u32; MAX_STATIC_DICTIONARY_MATCH_LEN + 1];
        assert!(find_all_matches(b"time the end", 4, 12, &mut matches));
        assert_ne!(matches[4], INVALID_MATCH);
        // "time" + " the " suffix
        assert_eq!(expand(matches[9]), b"time the ");
        check_all(b"time the end");
    }

    #[test]
    fn test_prefix_transforms() {
        assert!(check_all(b" the time of the year") > 0);
        assert!(check_all(b".com/index.html") > 0);
        assert!(check_all(b"TIME after time") > 0);
    }

    #[test]
    fn test_no_match_in_binary() {
        let mut matches = [0u32; MAX_STATIC_DICTIONARY_MATCH_LEN + 1];
        assert!(!find_all_matches(&[0xFFu8, 0xFE, 0x00, 0x01, 0x02, 0x03], 4, 6, &mut matches));
        assert!(matches.iter().all(|&m| m == INVALID_MATCH));
    }
}
