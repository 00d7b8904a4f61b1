//! Forgetful chain hashers (H40, H41, H42) for small windows.
//!
//! Positions are linked per bucket through banks of 16-bit delta nodes;
//! once a bank is full the oldest nodes are silently reused.

use super::static_dict::search_in_static_dictionary;
use super::{
    backward_reference_penalty_using_last_distance, backward_reference_score,
    backward_reference_score_using_last_distance, find_match_length_with_limit, load_u32, DictionaryStats,
    HasherSearchResult, MatchQuery,
};
use crate::dictionary::HASH_MUL32;

const BUCKET_BITS: u32 = 15;
const BUCKET_SIZE: usize = 1 << BUCKET_BITS;

/// Address that no real position reaches within a window
const INVALID_ADDR: u32 = 0xCCCC_CCCC;

#[derive(Clone, Copy, Default)]
struct Slot {
    delta: u16,
    next: u16,
}

pub struct ForgetfulChainHasher {
    num_banks: usize,
    bank_size: usize,
    max_hops: usize,
    num_last_distances_to_check: usize,
    addr: Vec<u32>,
    head: Vec<u16>,
    /// Low byte of the hash of every position, for quick rejection of
    /// distance-cache candidates
    tiny_hash: Vec<u8>,
    banks: Vec<Slot>,
    free_slot_idx: Vec<u16>,
    dict_stats: DictionaryStats,
}

impl ForgetfulChainHasher {
    pub fn new(kind: u32) -> Self {
        // (banks, bank bits, hops, cached distances)
        let (num_banks, bank_bits, max_hops, last_distances) = match kind {
            41 => (1, 16, 16, 10),
            42 => (512, 9, 32, 16),
            _ => (1, 16, 16, 4),
        };
        let bank_size = 1usize << bank_bits;
        Self {
            num_banks,
            bank_size,
            max_hops,
            num_last_distances_to_check: last_distances,
            addr: vec![INVALID_ADDR; BUCKET_SIZE],
            head: vec![0; BUCKET_SIZE],
            tiny_hash: vec![0; 1 << 16],
            banks: vec![Slot::default(); num_banks * bank_size],
            free_slot_idx: vec![0; num_banks],
            dict_stats: DictionaryStats::default(),
        }
    }

    pub fn num_last_distances_to_check(&self) -> usize {
        self.num_last_distances_to_check
    }

    #[inline]
    fn hash_bytes(data: &[u8], at: usize) -> usize {
        (load_u32(data, at).wrapping_mul(HASH_MUL32) >> (32 - BUCKET_BITS)) as usize
    }

    fn insert(&mut self, key: usize, ix: usize) {
        let bank = key & (self.num_banks - 1);
        let idx = self.free_slot_idx[bank] as usize & (self.bank_size - 1);
        self.free_slot_idx[bank] = self.free_slot_idx[bank].wrapping_add(1);
        let delta = (ix as u32).wrapping_sub(self.addr[key]).min(0xFFFF);
        self.tiny_hash[ix & 0xFFFF] = key as u8;
        self.banks[bank * self.bank_size + idx] = Slot { delta: delta as u16, next: self.head[key] };
        self.addr[key] = ix as u32;
        self.head[key] = idx as u16;
    }

    pub fn store(&mut self, data: &[u8], mask: usize, ix: usize) {
        let key = Self::hash_bytes(data, ix & mask);
        self.insert(key, ix);
    }

    pub fn find_longest_match(&mut self, q: &MatchQuery<'_>, distance_cache: &[i32; 16], out: &mut HasherSearchResult) {
        let data = q.data;
        let mask = q.mask;
        let cur_ix = q.cur_ix;
        let cur_ix_masked = cur_ix & mask;
        let min_score = out.score;
        let mut best_score = out.score;
        let mut best_len = out.len;
        let key = Self::hash_bytes(data, cur_ix_masked);
        let tiny_hash = key as u8;
        out.len = 0;
        out.len_code_delta = 0;

        for (i, &cached) in distance_cache.iter().enumerate().take(self.num_last_distances_to_check) {
            let backward = cached as usize;
            let prev_ix = cur_ix.wrapping_sub(backward);
            // two-byte matches are fine for the last distance
            if i > 0 && self.tiny_hash[prev_ix & 0xFFFF] != tiny_hash {
                continue;
            }
            if prev_ix >= cur_ix || backward > q.max_backward {
                continue;
            }
            let prev_ix = prev_ix & mask;
            let len = find_match_length_with_limit(&data[prev_ix..], &data[cur_ix_masked..], q.max_length);
            if len >= 2 {
                let mut score = backward_reference_score_using_last_distance(len);
                if best_score < score {
                    if i != 0 {
                        score -= backward_reference_penalty_using_last_distance(i);
                    }
                    if best_score < score {
                        best_score = score;
                        best_len = len;
                        out.len = len;
                        out.distance = backward;
                        out.score = score;
                    }
                }
            }
        }

        let bank = key & (self.num_banks - 1);
        let mut backward = 0usize;
        let mut delta = (cur_ix as u32).wrapping_sub(self.addr[key]) as usize;
        let mut slot = self.head[key] as usize;
        for _ in 0..self.max_hops {
            let last = slot;
            backward += delta;
            if backward > q.max_backward {
                break;
            }
            let prev_ix = cur_ix.wrapping_sub(backward) & mask;
            let node = self.banks[bank * self.bank_size + last];
            slot = node.next as usize;
            delta = node.delta as usize;
            if cur_ix_masked + best_len > mask
                || prev_ix + best_len > mask
                || data[cur_ix_masked + best_len] != data[prev_ix + best_len]
            {
                continue;
            }
            let len = find_match_length_with_limit(&data[prev_ix..], &data[cur_ix_masked..], q.max_length);
            if len >= 4 {
                let score = backward_reference_score(len, backward);
                if best_score < score {
                    best_score = score;
                    best_len = len;
                    out.len = len;
                    out.distance = backward;
                    out.score = score;
                }
            }
        }
        self.insert(key, cur_ix);

        if out.score == min_score {
            search_in_static_dictionary(
                &mut self.dict_stats,
                &data[cur_ix_masked..],
                q.max_length,
                q.dictionary_distance,
                q.max_distance,
                out,
                false,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::MIN_SCORE;

    #[test]
    fn test_chain_walk_finds_older_match() {
        let text = b"needle_one, hay hay hay, needle_two, more hay, needle_one";
        let mut data = text.to_vec();
        data.resize(text.len() + 16, 0);
        let mask = (1 << 12) - 1;
        for kind in [40, 41, 42] {
            let mut h = ForgetfulChainHasher::new(kind);
            let cur = text.len() - 10;
            for ix in 0..cur {
                h.store(&data, mask, ix);
            }
            let q = MatchQuery {
                data: &data,
                mask,
                cur_ix: cur,
                max_length: 10,
                max_backward: cur,
                dictionary_distance: cur,
                max_distance: 1 << 26,
            };
            let mut out = HasherSearchResult::new(0, MIN_SCORE);
            h.find_longest_match(&q, &[1000, 1000, 1000, 1000, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], &mut out);
            assert_eq!(out.len, 10, "H{}", kind);
            assert_eq!(out.distance, cur, "H{}", kind);
        }
    }
}
