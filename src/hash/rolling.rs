//! Rolling hash over 32-byte chunks, paired with a short-match hasher for
//! very large windows.

use super::{backward_reference_score, find_match_length_with_limit, HasherSearchResult, MatchQuery};

const CHUNK_LEN: usize = 32;
const HASH_MUL: u32 = 69069;
const NUM_BUCKETS: u32 = 16_777_216;
/// Only states below `NUM_BUCKETS` are stored, one in 64 on average
const MASK: u32 = NUM_BUCKETS * 64 - 1;
const INVALID_POS: u32 = 0xFFFF_FFFF;

#[inline]
fn hash_byte(b: u8) -> u32 {
    b as u32 + 1
}

pub struct RollingHasher {
    jump: usize,
    state: u32,
    table: Vec<u32>,
    next_ix: usize,
    factor: u32,
    /// `factor` raised to the number of bytes in a chunk
    factor_remove: u32,
}

impl RollingHasher {
    pub fn new(jump: usize) -> Self {
        let factor = HASH_MUL;
        let factor_remove = (0..CHUNK_LEN).step_by(jump).fold(1u32, |acc, _| acc.wrapping_mul(factor));
        Self {
            jump,
            state: 0,
            table: vec![INVALID_POS; NUM_BUCKETS as usize],
            next_ix: 0,
            factor,
            factor_remove,
        }
    }

    pub fn hash_type_length(&self) -> usize {
        CHUNK_LEN
    }

    pub fn prepare(&mut self, data: &[u8], input_size: usize) {
        if input_size < CHUNK_LEN {
            return;
        }
        self.state = (0..CHUNK_LEN)
            .step_by(self.jump)
            .fold(0u32, |state, i| self.factor.wrapping_mul(state).wrapping_add(hash_byte(data[i])));
    }

    pub fn stitch_to_previous_block(&mut self, num_bytes: usize, mut position: usize, data: &[u8], mask: usize) {
        let mut available = num_bytes;
        let misalign = position & (self.jump - 1);
        if misalign != 0 {
            let diff = self.jump - misalign;
            available = num_bytes.saturating_sub(diff);
            position += diff;
        }
        let position_masked = position & mask;
        available = available.min(mask - position_masked);
        self.prepare(&data[position_masked..], available);
        self.next_ix = position;
    }

    #[inline]
    fn roll(&self, add: u8, rem: u8) -> u32 {
        self.factor
            .wrapping_mul(self.state)
            .wrapping_add(hash_byte(add))
            .wrapping_sub(self.factor_remove.wrapping_mul(hash_byte(rem)))
    }

    /// Advance the hash up to `q.cur_ix`, recording sampled positions, and
    /// report a match if the chunk at `q.cur_ix` was seen before
    pub fn find_longest_match(&mut self, q: &MatchQuery<'_>, out: &mut HasherSearchResult) {
        let cur_ix = q.cur_ix;
        if cur_ix & (self.jump - 1) != 0 || q.max_length < CHUNK_LEN {
            return;
        }
        let data = q.data;
        let mut pos = self.next_ix;
        while pos <= cur_ix {
            let code = self.state & MASK;
            self.state = self.roll(data[(pos + CHUNK_LEN) & q.mask], data[pos & q.mask]);
            if code < NUM_BUCKETS {
                let found_ix = std::mem::replace(&mut self.table[code as usize], pos as u32);
                if pos == cur_ix && found_ix != INVALID_POS {
                    let backward = (cur_ix as u32).wrapping_sub(found_ix) as usize;
                    if backward <= q.max_backward {
                        let len = find_match_length_with_limit(
                            &data[found_ix as usize & q.mask..],
                            &data[cur_ix & q.mask..],
                            q.max_length,
                        );
                        if len >= 4 && len > out.len {
                            let score = backward_reference_score(len, backward);
                            if score > out.score {
                                out.len = len;
                                out.distance = backward;
                                out.score = score;
                                out.len_code_delta = 0;
                            }
                        }
                    }
                }
            }
            pos += self.jump;
        }
        self.next_ix = cur_ix + self.jump;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::MIN_SCORE;

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (x >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn test_finds_repeated_chunk() {
        let period = 2000;
        let chunk = pseudo_random(period, 7);
        let mut data = chunk.clone();
        data.extend_from_slice(&chunk);
        let total = data.len();
        data.resize(total + CHUNK_LEN + 8, 0);
        let mask = (1usize << 16) - 1;

        let mut h = RollingHasher::new(1);
        h.prepare(&data, total);
        let mut found = Vec::new();
        for cur_ix in 0..total - CHUNK_LEN {
            let q = MatchQuery {
                data: &data,
                mask,
                cur_ix,
                max_length: total - cur_ix,
                max_backward: cur_ix,
                dictionary_distance: cur_ix,
                max_distance: cur_ix,
            };
            let mut out = HasherSearchResult::new(0, MIN_SCORE);
            h.find_longest_match(&q, &mut out);
            if out.len > 0 {
                found.push((cur_ix, out.distance, out.len));
            }
        }
        assert!(!found.is_empty());
        for (cur_ix, distance, len) in found {
            assert!(cur_ix >= period);
            assert_eq!(distance, period);
            assert_eq!(len, total - cur_ix);
        }
    }

    #[test]
    fn test_skips_unaligned_positions() {
        let data = vec![b'a'; 256];
        let mut h = RollingHasher::new(4);
        h.prepare(&data, 200);
        let q = MatchQuery {
            data: &data,
            mask: 255,
            cur_ix: 3,
            max_length: 100,
            max_backward: 3,
            dictionary_distance: 3,
            max_distance: 3,
        };
        let mut out = HasherSearchResult::new(0, MIN_SCORE);
        h.find_longest_match(&q, &mut out);
        assert_eq!(h.next_ix, 0);
        assert_eq!(out.len, 0);
    }
}
