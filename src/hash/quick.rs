//! Single-bucket hashers (H2, H3, H4, H54): one hash lookup, a sweep of
//! 1 to 4 slots, and a last-distance check.

use super::static_dict::search_in_static_dictionary;
use super::{
    backward_reference_score, backward_reference_score_using_last_distance, find_match_length_with_limit, load_u64,
    DictionaryStats, HasherSearchResult, MatchQuery, HASH_MUL64,
};

pub struct QuickHasher {
    bucket_bits: u32,
    sweep_bits: u32,
    hash_len: u32,
    use_dictionary: bool,
    buckets: Vec<u32>,
    dict_stats: DictionaryStats,
}

impl QuickHasher {
    pub fn new(kind: u32) -> Self {
        let (bucket_bits, sweep_bits, hash_len, use_dictionary) = match kind {
            3 => (16, 1, 5, false),
            4 => (17, 2, 5, true),
            54 => (20, 2, 7, false),
            _ => (16, 0, 5, true),
        };
        let sweep = 1usize << sweep_bits;
        Self {
            bucket_bits,
            sweep_bits,
            hash_len,
            use_dictionary,
            buckets: vec![0; (1usize << bucket_bits) + sweep],
            dict_stats: DictionaryStats::default(),
        }
    }

    pub fn hash_type_length(&self) -> usize {
        8
    }

    #[inline]
    fn hash_bytes(&self, data: &[u8], at: usize) -> usize {
        let h = (load_u64(data, at) << (64 - 8 * self.hash_len)).wrapping_mul(HASH_MUL64);
        (h >> (64 - self.bucket_bits)) as usize
    }

    #[inline]
    fn sweep_mask(&self) -> usize {
        (1 << self.sweep_bits) - 1
    }

    pub fn store(&mut self, data: &[u8], mask: usize, ix: usize) {
        let key = self.hash_bytes(data, ix & mask);
        let off = (ix >> 3) & self.sweep_mask();
        self.buckets[key + off] = ix as u32;
    }

    pub fn find_longest_match(&mut self, q: &MatchQuery<'_>, distance_cache: &[i32; 16], out: &mut HasherSearchResult) {
        let data = q.data;
        let cur_ix = q.cur_ix;
        let cur_ix_masked = cur_ix & q.mask;
        let best_len_in = out.len;
        let key = self.hash_bytes(data, cur_ix_masked);
        let min_score = out.score;
        let mut best_score = out.score;
        let mut best_len = best_len_in;
        let mut compare_char = data[cur_ix_masked + best_len_in];
        let single_slot = self.sweep_bits == 0;
        out.len_code_delta = 0;

        let cached_backward = distance_cache[0] as usize;
        let prev_ix = cur_ix.wrapping_sub(cached_backward);
        if prev_ix < cur_ix {
            let prev_ix = prev_ix & q.mask;
            if compare_char == data[prev_ix + best_len] {
                let len = find_match_length_with_limit(&data[prev_ix..], &data[cur_ix_masked..], q.max_length);
                if len >= 4 {
                    let score = backward_reference_score_using_last_distance(len);
                    if best_score < score {
                        out.len = len;
                        out.distance = cached_backward;
                        out.score = score;
                        if single_slot {
                            self.buckets[key] = cur_ix as u32;
                            return;
                        }
                        best_len = len;
                        best_score = score;
                        compare_char = data[cur_ix_masked + len];
                    }
                }
            }
        }

        if single_slot {
            let prev_ix = self.buckets[key] as usize;
            self.buckets[key] = cur_ix as u32;
            let backward = cur_ix.wrapping_sub(prev_ix);
            let prev_ix = prev_ix & q.mask;
            if compare_char != data[prev_ix + best_len_in] || backward == 0 || backward > q.max_backward {
                return;
            }
            let len = find_match_length_with_limit(&data[prev_ix..], &data[cur_ix_masked..], q.max_length);
            if len >= 4 {
                let score = backward_reference_score(len, backward);
                if best_score < score {
                    out.len = len;
                    out.distance = backward;
                    out.score = score;
                    return;
                }
            }
        } else {
            for i in 0..=self.sweep_mask() {
                let prev_ix = self.buckets[key + i] as usize;
                let backward = cur_ix.wrapping_sub(prev_ix);
                let prev_ix = prev_ix & q.mask;
                if compare_char != data[prev_ix + best_len] || backward == 0 || backward > q.max_backward {
                    continue;
                }
                let len = find_match_length_with_limit(&data[prev_ix..], &data[cur_ix_masked..], q.max_length);
                if len >= 4 {
                    let score = backward_reference_score(len, backward);
                    if best_score < score {
                        best_len = len;
                        best_score = score;
                        compare_char = data[cur_ix_masked + len];
                        out.len = len;
                        out.score = score;
                        out.distance = backward;
                    }
                }
            }
        }

        if self.use_dictionary && min_score == out.score {
            search_in_static_dictionary(
                &mut self.dict_stats,
                &data[cur_ix_masked..],
                q.max_length,
                q.dictionary_distance,
                q.max_distance,
                out,
                true,
            );
        }
        let off = (cur_ix >> 3) & self.sweep_mask();
        self.buckets[key + off] = cur_ix as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::MIN_SCORE;

    fn ring(text: &[u8]) -> Vec<u8> {
        let mut data = text.to_vec();
        data.resize(text.len() + 64, 0);
        data
    }

    fn query(data: &[u8], cur_ix: usize, end: usize) -> MatchQuery<'_> {
        MatchQuery {
            data,
            mask: usize::MAX >> 1,
            cur_ix,
            max_length: end - cur_ix,
            max_backward: cur_ix,
            dictionary_distance: cur_ix,
            max_distance: 1 << 26,
        }
    }

    #[test]
    fn test_finds_repeat() {
        let text = b"0123456789abcdef--0123456789abcdef";
        let data = ring(text);
        for kind in [2, 3, 4, 54] {
            let mut h = QuickHasher::new(kind);
            for ix in 0..18 {
                h.store(&data, usize::MAX >> 1, ix);
            }
            let mut out = HasherSearchResult::new(0, MIN_SCORE);
            h.find_longest_match(&query(&data, 18, text.len()), &[1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], &mut out);
            assert_eq!(out.len, 16, "H{}", kind);
            assert_eq!(out.distance, 18, "H{}", kind);
        }
    }

    #[test]
    fn test_last_distance_preferred() {
        let text = b"abcdefgh_abcdefgh_abcdefgh";
        let data = ring(text);
        let mut h = QuickHasher::new(2);
        let mut cache = [0i32; 16];
        cache[0] = 9;
        let mut out = HasherSearchResult::new(0, MIN_SCORE);
        h.find_longest_match(&query(&data, 18, text.len()), &cache, &mut out);
        assert_eq!(out.distance, 9);
        assert_eq!(out.len, 8);
    }
}
