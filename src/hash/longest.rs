//! Multi-slot hashers (H5, H6): each bucket is a small ring of the most
//! recent positions with that hash.

use super::static_dict::search_in_static_dictionary;
use super::{
    backward_reference_penalty_using_last_distance, backward_reference_score,
    backward_reference_score_using_last_distance, find_match_length_with_limit, load_u32, load_u64, DictionaryStats,
    HasherParams, HasherSearchResult, MatchQuery, HASH_MUL64_LONG,
};
use crate::dictionary::HASH_MUL32;

pub struct LongestMatchHasher {
    bucket_bits: u32,
    block_bits: u32,
    /// 64-bit masked hash of `hash_len` bytes instead of a 4-byte hash
    long_hash: Option<u64>,
    num_last_distances_to_check: usize,
    num: Vec<u16>,
    buckets: Vec<u32>,
    dict_stats: DictionaryStats,
}

impl LongestMatchHasher {
    pub fn new(hp: &HasherParams) -> Self {
        let long_hash = (hp.kind == 6).then(|| u64::MAX >> (64 - 8 * hp.hash_len.clamp(4, 8)));
        Self {
            bucket_bits: hp.bucket_bits,
            block_bits: hp.block_bits,
            long_hash,
            num_last_distances_to_check: hp.num_last_distances_to_check as usize,
            num: vec![0; 1 << hp.bucket_bits],
            buckets: vec![0; 1 << (hp.bucket_bits + hp.block_bits)],
            dict_stats: DictionaryStats::default(),
        }
    }

    pub fn hash_type_length(&self) -> usize {
        if self.long_hash.is_some() {
            8
        } else {
            4
        }
    }

    pub fn num_last_distances_to_check(&self) -> usize {
        self.num_last_distances_to_check
    }

    #[inline]
    fn block_size(&self) -> usize {
        1 << self.block_bits
    }

    #[inline]
    fn block_mask(&self) -> usize {
        self.block_size() - 1
    }

    #[inline]
    fn hash_bytes(&self, data: &[u8], at: usize) -> usize {
        match self.long_hash {
            Some(mask) => ((load_u64(data, at) & mask).wrapping_mul(HASH_MUL64_LONG) >> (64 - self.bucket_bits)) as usize,
            None => (load_u32(data, at).wrapping_mul(HASH_MUL32) >> (32 - self.bucket_bits)) as usize,
        }
    }

    #[inline]
    fn insert(&mut self, key: usize, ix: usize) {
        let minor_ix = self.num[key] as usize & self.block_mask();
        self.buckets[(key << self.block_bits) + minor_ix] = ix as u32;
        self.num[key] = self.num[key].wrapping_add(1);
    }

    pub fn store(&mut self, data: &[u8], mask: usize, ix: usize) {
        let key = self.hash_bytes(data, ix & mask);
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
        out.len = 0;
        out.len_code_delta = 0;

        // Cached distances first.
        for (i, &cached) in distance_cache.iter().enumerate().take(self.num_last_distances_to_check) {
            let backward = cached as usize;
            let prev_ix = cur_ix.wrapping_sub(backward);
            if prev_ix >= cur_ix || backward > q.max_backward {
                continue;
            }
            let prev_ix = prev_ix & mask;
            if cur_ix_masked + best_len > mask
                || prev_ix + best_len > mask
                || data[cur_ix_masked + best_len] != data[prev_ix + best_len]
            {
                continue;
            }
            let len = find_match_length_with_limit(&data[prev_ix..], &data[cur_ix_masked..], q.max_length);
            if len >= 3 || (len == 2 && i < 2) {
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

        let key = self.hash_bytes(data, cur_ix_masked);
        let bucket_start = key << self.block_bits;
        let count = self.num[key] as usize;
        let down = count.saturating_sub(self.block_size());
        let mut i = count;
        while i > down {
            i -= 1;
            let prev_ix = self.buckets[bucket_start + (i & self.block_mask())] as usize;
            let backward = cur_ix.wrapping_sub(prev_ix);
            if backward > q.max_backward {
                break;
            }
            let prev_ix = prev_ix & mask;
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

        if min_score == out.score {
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
