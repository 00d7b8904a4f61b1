//! Match finders over the ring buffer.
//!
//! Every strategy indexes previously seen positions by a hash of the next
//! few bytes and reports the best scoring backward match for a cursor. The
//! concrete hasher is a deterministic function of the encoder parameters
//! (see [`choose_hasher`]) and is driven through the [`Hasher`] enum.

pub mod binary_tree;
pub mod forgetful;
pub mod longest;
pub mod quick;
pub mod rolling;
pub mod static_dict;

pub use binary_tree::{BackwardMatch, BinaryTreeHasher, MAX_TREE_COMP_LENGTH};
pub use forgetful::ForgetfulChainHasher;
pub use longest::LongestMatchHasher;
pub use quick::QuickHasher;
pub use rolling::RollingHasher;
pub use static_dict::DictionaryStats;

use crate::params::EncoderParams;

/// 64-bit multiplier of the quick hashers
pub const HASH_MUL64: u64 = 0x1E35_A7BD_1E35_A7BD;

/// 64-bit multiplier of the masked long hash
pub const HASH_MUL64_LONG: u64 = 0x1FE3_5A7B_D357_9BD3;

const LITERAL_BYTE_SCORE: usize = 135;
const DISTANCE_BIT_PENALTY: usize = 30;

/// Score offset that keeps every valid reference score positive
pub const SCORE_BASE: usize = DISTANCE_BIT_PENALTY * 8 * std::mem::size_of::<usize>();

/// Minimum score of a reference worth emitting
pub const MIN_SCORE: usize = SCORE_BASE + 100;

/// Hasher selection and tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct HasherParams {
    /// Strategy id (2, 3, 4, 5, 6, 10, 35, 40, 41, 42, 54, 55, 65)
    pub kind: u32,
    pub bucket_bits: u32,
    pub block_bits: u32,
    pub hash_len: u32,
    pub num_last_distances_to_check: u32,
}

/// Pick the match finder for the quality, window and size hint
pub fn choose_hasher(params: &EncoderParams) -> HasherParams {
    let q = params.quality;
    let mut hp = HasherParams::default();
    let last_distances = if q < 7 {
        4
    } else if q < 9 {
        10
    } else {
        16
    };
    if q > 9 {
        hp.kind = 10;
    } else if q == 4 && params.size_hint >= (1 << 20) {
        hp.kind = 54;
    } else if q < 5 {
        hp.kind = q;
    } else if params.lgwin <= 16 {
        hp.kind = if q < 7 {
            40
        } else if q < 9 {
            41
        } else {
            42
        };
    } else if params.size_hint >= (1 << 20) && params.lgwin >= 19 {
        hp.kind = 6;
        hp.block_bits = q - 1;
        hp.bucket_bits = 15;
        hp.hash_len = 5;
        hp.num_last_distances_to_check = last_distances;
    } else {
        hp.kind = 5;
        hp.block_bits = q - 1;
        hp.bucket_bits = if q < 7 { 14 } else { 15 };
        hp.num_last_distances_to_check = last_distances;
    }

    // Large windows pair the fast hashers with a rolling hash for far
    // matches.
    if params.lgwin > 24 {
        hp.kind = match hp.kind {
            3 => 35,
            54 => 55,
            6 => 65,
            k => k,
        };
    }
    log::trace!("hasher H{} for quality {} lgwin {}", hp.kind, q, params.lgwin);
    hp
}

/// Best match found so far for one position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HasherSearchResult {
    pub len: usize,
    /// Difference between the length code and `len` (dictionary matches)
    pub len_code_delta: i32,
    pub distance: usize,
    pub score: usize,
}

impl HasherSearchResult {
    pub fn new(len: usize, score: usize) -> Self {
        Self { len, len_code_delta: 0, distance: 0, score }
    }
}

#[inline]
pub(crate) fn log2_floor_non_zero(v: usize) -> usize {
    (usize::BITS - 1 - v.leading_zeros()) as usize
}

/// Score of a `copy_length` match `backward_offset` bytes back: longer is
/// better, each distance bit costs a little
#[inline]
pub fn backward_reference_score(copy_length: usize, backward_offset: usize) -> usize {
    SCORE_BASE + LITERAL_BYTE_SCORE * copy_length - DISTANCE_BIT_PENALTY * log2_floor_non_zero(backward_offset)
}

/// Score of a match reusing the last distance
#[inline]
pub fn backward_reference_score_using_last_distance(copy_length: usize) -> usize {
    LITERAL_BYTE_SCORE * copy_length + SCORE_BASE + 15
}

/// Penalty for reusing a cache slot other than the last distance
#[inline]
pub fn backward_reference_penalty_using_last_distance(distance_short_code: usize) -> usize {
    39 + ((0x1CA10 >> (distance_short_code & 0xE)) & 0xE)
}

/// Length of the common prefix of `s1` and `s2`, at most `limit`
#[inline]
pub fn find_match_length_with_limit(s1: &[u8], s2: &[u8], limit: usize) -> usize {
    let limit = limit.min(s1.len()).min(s2.len());
    let mut matched = 0;
    while matched + 8 <= limit {
        let diff = load_u64(s1, matched) ^ load_u64(s2, matched);
        if diff != 0 {
            return matched + (diff.trailing_zeros() / 8) as usize;
        }
        matched += 8;
    }
    while matched < limit && s1[matched] == s2[matched] {
        matched += 1;
    }
    matched
}

#[inline]
pub(crate) fn load_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn load_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Expand the four cached distances with near variants of the last two
///
/// Slots 4-9 hold last distance -1, +1, -2, +2, -3, +3; slots 10-15 the
/// same around the second-to-last distance.
pub fn prepare_distance_cache(distance_cache: &mut [i32; 16], num_distances: usize) {
    const OFFSETS: [i32; 6] = [-1, 1, -2, 2, -3, 3];
    if num_distances > 4 {
        let last = distance_cache[0];
        for (slot, off) in distance_cache[4..10].iter_mut().zip(OFFSETS) {
            *slot = last + off;
        }
        if num_distances > 10 {
            let next_last = distance_cache[1];
            for (slot, off) in distance_cache[10..16].iter_mut().zip(OFFSETS) {
                *slot = next_last + off;
            }
        }
    }
}

/// Arguments of one longest-match query
#[derive(Clone, Copy, Debug)]
pub struct MatchQuery<'a> {
    /// Ring buffer, including the mirrored tail
    pub data: &'a [u8],
    pub mask: usize,
    pub cur_ix: usize,
    pub max_length: usize,
    /// Furthest back an in-window match may reach
    pub max_backward: usize,
    /// Distance that dictionary word 0 maps to, minus one
    pub dictionary_distance: usize,
    /// Largest distance the distance code can express
    pub max_distance: usize,
}

/// The configured match finder
pub enum Hasher {
    Quick(QuickHasher),
    Longest(LongestMatchHasher),
    Forgetful(ForgetfulChainHasher),
    BinaryTree(BinaryTreeHasher),
    /// A fast hasher backed by a rolling hash for far matches
    Composite(Box<Hasher>, RollingHasher),
}

impl Hasher {
    /// Allocate the hasher described by `params.hasher`
    ///
    /// `one_shot` streams size binary-tree storage by `input_size`.
    pub fn new(params: &EncoderParams, one_shot: bool, input_size: usize) -> Self {
        let hp = params.hasher;
        match hp.kind {
            2 | 3 | 4 | 54 => Hasher::Quick(QuickHasher::new(hp.kind)),
            5 | 6 => Hasher::Longest(LongestMatchHasher::new(&hp)),
            40 | 41 | 42 => Hasher::Forgetful(ForgetfulChainHasher::new(hp.kind)),
            10 => Hasher::BinaryTree(BinaryTreeHasher::new(params.lgwin, one_shot, input_size)),
            35 => Hasher::Composite(Box::new(Hasher::Quick(QuickHasher::new(3))), RollingHasher::new(4)),
            55 => Hasher::Composite(Box::new(Hasher::Quick(QuickHasher::new(54))), RollingHasher::new(4)),
            65 => {
                let h6 = HasherParams { kind: 6, ..hp };
                Hasher::Composite(Box::new(Hasher::Longest(LongestMatchHasher::new(&h6))), RollingHasher::new(1))
            }
            // Remaining qualities behave like the single-slot quick hasher
            _ => Hasher::Quick(QuickHasher::new(2)),
        }
    }

    /// Bytes hashed per position
    pub fn hash_type_length(&self) -> usize {
        match self {
            Hasher::Quick(h) => h.hash_type_length(),
            Hasher::Longest(h) => h.hash_type_length(),
            Hasher::Forgetful(_) => 4,
            Hasher::BinaryTree(_) => 4,
            Hasher::Composite(a, b) => a.hash_type_length().max(b.hash_type_length()),
        }
    }

    /// Bytes that must follow a position before it can be stored
    pub fn store_lookahead(&self) -> usize {
        match self {
            Hasher::Quick(h) => h.hash_type_length(),
            Hasher::Longest(h) => h.hash_type_length(),
            Hasher::Forgetful(_) => 4,
            Hasher::BinaryTree(_) => MAX_TREE_COMP_LENGTH,
            Hasher::Composite(a, b) => a.store_lookahead().max(b.hash_type_length()),
        }
    }

    /// Seed per-stream state from the first bytes of the input
    pub fn prepare(&mut self, data: &[u8], input_size: usize) {
        if let Hasher::Composite(a, b) = self {
            a.prepare(data, input_size);
            b.prepare(data, input_size);
        }
    }

    pub fn store(&mut self, data: &[u8], mask: usize, ix: usize) {
        match self {
            Hasher::Quick(h) => h.store(data, mask, ix),
            Hasher::Longest(h) => h.store(data, mask, ix),
            Hasher::Forgetful(h) => h.store(data, mask, ix),
            Hasher::BinaryTree(h) => h.store(data, mask, ix),
            Hasher::Composite(a, _) => a.store(data, mask, ix),
        }
    }

    pub fn store_range(&mut self, data: &[u8], mask: usize, ix_start: usize, ix_end: usize) {
        match self {
            Hasher::BinaryTree(h) => h.store_range(data, mask, ix_start, ix_end),
            Hasher::Composite(a, _) => a.store_range(data, mask, ix_start, ix_end),
            _ => {
                for ix in ix_start..ix_end {
                    self.store(data, mask, ix);
                }
            }
        }
    }

    /// Store the last positions of the previous block, whose hashes needed
    /// bytes of the new block
    pub fn stitch_to_previous_block(&mut self, num_bytes: usize, position: usize, data: &[u8], mask: usize) {
        match self {
            Hasher::BinaryTree(h) => h.stitch_to_previous_block(num_bytes, position, data, mask),
            Hasher::Composite(a, b) => {
                a.stitch_to_previous_block(num_bytes, position, data, mask);
                b.stitch_to_previous_block(num_bytes, position, data, mask);
            }
            _ => {
                if num_bytes + 1 >= self.hash_type_length() && position >= 3 {
                    self.store(data, mask, position - 3);
                    self.store(data, mask, position - 2);
                    self.store(data, mask, position - 1);
                }
            }
        }
    }

    /// Fill the near-distance slots of the cache this hasher checks
    pub fn prepare_distance_cache(&self, distance_cache: &mut [i32; 16]) {
        match self {
            Hasher::Longest(h) => prepare_distance_cache(distance_cache, h.num_last_distances_to_check()),
            Hasher::Forgetful(h) => prepare_distance_cache(distance_cache, h.num_last_distances_to_check()),
            Hasher::Composite(a, _) => a.prepare_distance_cache(distance_cache),
            _ => {}
        }
    }

    /// Improve `out` with the best match at `query.cur_ix` and store the
    /// position
    ///
    /// `out.len` and `out.score` carry the bar a new match must beat.
    pub fn find_longest_match(&mut self, query: &MatchQuery<'_>, distance_cache: &[i32; 16], out: &mut HasherSearchResult) {
        match self {
            Hasher::Quick(h) => h.find_longest_match(query, distance_cache, out),
            Hasher::Longest(h) => h.find_longest_match(query, distance_cache, out),
            Hasher::Forgetful(h) => h.find_longest_match(query, distance_cache, out),
            Hasher::BinaryTree(h) => {
                // Built for the optimal parser; a plain query takes the best
                // scoring of all matches.
                let mut matches = Vec::new();
                h.find_all_matches(query, 16, &mut matches);
                for m in matches.iter().filter(|m| m.len_code() == m.length()) {
                    let len = m.length();
                    if len >= 4 {
                        let score = backward_reference_score(len, m.distance as usize);
                        if score > out.score {
                            *out = HasherSearchResult { len, len_code_delta: 0, distance: m.distance as usize, score };
                        }
                    }
                }
            }
            Hasher::Composite(a, b) => {
                a.find_longest_match(query, distance_cache, out);
                b.find_longest_match(query, out);
            }
        }
    }
}
