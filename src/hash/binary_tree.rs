//! Binary-tree hasher (H10) for the optimal parser.
//!
//! Each bucket holds a binary search tree of earlier positions ordered by
//! the bytes that follow them. Every insertion walks the tree from the
//! root, collects matches of increasing length on the way, and re-roots
//! the tree at the new position.

use super::{find_match_length_with_limit, load_u32, MatchQuery};
use crate::constants::WINDOW_GAP;
use crate::dictionary::{find_all_matches as find_dictionary_matches, HASH_MUL32, MAX_STATIC_DICTIONARY_MATCH_LEN};
use crate::dictionary::matcher::INVALID_MATCH;

const BUCKET_BITS: u32 = 17;
const MAX_TREE_SEARCH_DEPTH: usize = 64;

/// Bytes compared when ordering tree nodes
pub const MAX_TREE_COMP_LENGTH: usize = 128;

/// A candidate match; dictionary matches also carry the length code of
/// the transformed word
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackwardMatch {
    pub distance: u32,
    length_and_code: u32,
}

impl BackwardMatch {
    pub fn new(distance: usize, length: usize) -> Self {
        Self { distance: distance as u32, length_and_code: (length as u32) << 5 }
    }

    pub fn dictionary(distance: usize, length: usize, len_code: usize) -> Self {
        let code = if length == len_code { 0 } else { len_code as u32 };
        Self { distance: distance as u32, length_and_code: ((length as u32) << 5) | code }
    }

    #[inline]
    pub fn length(&self) -> usize {
        (self.length_and_code >> 5) as usize
    }

    /// Length used to pick the copy length code
    #[inline]
    pub fn len_code(&self) -> usize {
        match self.length_and_code & 31 {
            0 => self.length(),
            code => code as usize,
        }
    }
}

pub struct BinaryTreeHasher {
    window_mask: usize,
    invalid_pos: u32,
    buckets: Vec<u32>,
    /// Left and right child of every window position
    forest: Vec<u32>,
}

impl BinaryTreeHasher {
    pub fn new(lgwin: u32, one_shot: bool, input_size: usize) -> Self {
        let window_mask = (1usize << lgwin) - 1;
        let invalid_pos = 0u32.wrapping_sub(window_mask as u32);
        let num_nodes = if one_shot && input_size < (1 << lgwin) { input_size.max(1) } else { 1 << lgwin };
        Self {
            window_mask,
            invalid_pos,
            buckets: vec![invalid_pos; 1 << BUCKET_BITS],
            forest: vec![0; 2 * num_nodes],
        }
    }

    #[inline]
    fn hash_bytes(data: &[u8], at: usize) -> usize {
        (load_u32(data, at).wrapping_mul(HASH_MUL32) >> (32 - BUCKET_BITS)) as usize
    }

    #[inline]
    fn left_child_index(&self, pos: usize) -> usize {
        2 * (pos & self.window_mask)
    }

    #[inline]
    fn right_child_index(&self, pos: usize) -> usize {
        2 * (pos & self.window_mask) + 1
    }

    /// Insert `cur_ix` into its tree; when `matches` is given, push every
    /// match longer than `best_len` found on the way
    fn store_and_find_matches(
        &mut self,
        data: &[u8],
        cur_ix: usize,
        mask: usize,
        max_length: usize,
        max_backward: usize,
        best_len: &mut usize,
        mut matches: Option<&mut Vec<BackwardMatch>>,
    ) {
        let cur_ix_masked = cur_ix & mask;
        let max_comp_len = max_length.min(MAX_TREE_COMP_LENGTH);
        let should_reroot_tree = max_length >= MAX_TREE_COMP_LENGTH;
        let key = Self::hash_bytes(data, cur_ix_masked);
        let mut prev_ix = self.buckets[key] as usize;
        let mut node_left = self.left_child_index(cur_ix);
        let mut node_right = self.right_child_index(cur_ix);
        let mut best_len_left = 0usize;
        let mut best_len_right = 0usize;
        if should_reroot_tree {
            self.buckets[key] = cur_ix as u32;
        }
        let mut depth_remaining = MAX_TREE_SEARCH_DEPTH;
        loop {
            let backward = (cur_ix as u32).wrapping_sub(prev_ix as u32) as usize;
            let prev_ix_masked = prev_ix & mask;
            if backward == 0 || backward > max_backward || depth_remaining == 0 {
                if should_reroot_tree {
                    self.forest[node_left] = self.invalid_pos;
                    self.forest[node_right] = self.invalid_pos;
                }
                break;
            }
            let cur_len = best_len_left.min(best_len_right);
            let len = cur_len
                + find_match_length_with_limit(
                    &data[cur_ix_masked + cur_len..],
                    &data[prev_ix_masked + cur_len..],
                    max_length - cur_len,
                );
            if let Some(out) = matches.as_deref_mut() {
                if len > *best_len {
                    *best_len = len;
                    out.push(BackwardMatch::new(backward, len));
                }
            }
            if len >= max_comp_len || cur_ix_masked + len >= data.len() || prev_ix_masked + len >= data.len() {
                if should_reroot_tree {
                    self.forest[node_left] = self.forest[self.left_child_index(prev_ix)];
                    self.forest[node_right] = self.forest[self.right_child_index(prev_ix)];
                }
                break;
            }
            if data[cur_ix_masked + len] > data[prev_ix_masked + len] {
                best_len_left = len;
                if should_reroot_tree {
                    self.forest[node_left] = prev_ix as u32;
                }
                node_left = self.right_child_index(prev_ix);
                prev_ix = self.forest[node_left] as usize;
            } else {
                best_len_right = len;
                if should_reroot_tree {
                    self.forest[node_right] = prev_ix as u32;
                }
                node_right = self.left_child_index(prev_ix);
                prev_ix = self.forest[node_right] as usize;
            }
            depth_remaining -= 1;
        }
    }

    /// Every match at `q.cur_ix` that is longer than all shorter-distance
    /// ones, plus dictionary matches for the remaining lengths, sorted by
    /// increasing length
    ///
    /// Distances up to `short_match_max_backward` are scanned directly for
    /// two- and three-byte matches.
    pub fn find_all_matches(&mut self, q: &MatchQuery<'_>, short_match_max_backward: usize, matches: &mut Vec<BackwardMatch>) {
        let data = q.data;
        let mask = q.mask;
        let cur_ix = q.cur_ix;
        let cur_ix_masked = cur_ix & mask;
        let mut best_len = 1usize;
        let stop = cur_ix.saturating_sub(short_match_max_backward);
        let mut i = cur_ix.wrapping_sub(1);
        while i > stop && best_len <= 2 {
            let backward = cur_ix.wrapping_sub(i);
            if backward > q.max_backward {
                break;
            }
            let prev_ix = i & mask;
            if data[cur_ix_masked] == data[prev_ix] && data[cur_ix_masked + 1] == data[prev_ix + 1] {
                let len = find_match_length_with_limit(&data[prev_ix..], &data[cur_ix_masked..], q.max_length);
                if len > best_len {
                    best_len = len;
                    matches.push(BackwardMatch::new(backward, len));
                }
            }
            i -= 1;
        }
        if best_len < q.max_length {
            self.store_and_find_matches(data, cur_ix, mask, q.max_length, q.max_backward, &mut best_len, Some(matches));
        }

        let mut dict_matches = [INVALID_MATCH; MAX_STATIC_DICTIONARY_MATCH_LEN + 1];
        let minlen = 4.max(best_len + 1);
        let maxlen = MAX_STATIC_DICTIONARY_MATCH_LEN.min(q.max_length);
        if minlen <= maxlen
            && find_dictionary_matches(&data[cur_ix_masked..cur_ix_masked + maxlen], minlen, maxlen, &mut dict_matches)
        {
            for (l, &dict_id) in dict_matches.iter().enumerate().take(maxlen + 1).skip(minlen) {
                if dict_id < INVALID_MATCH {
                    let distance = q.dictionary_distance + (dict_id >> 5) as usize + 1;
                    if distance <= q.max_distance {
                        matches.push(BackwardMatch::dictionary(distance, l, (dict_id & 31) as usize));
                    }
                }
            }
        }
    }

    pub fn store(&mut self, data: &[u8], mask: usize, ix: usize) {
        let max_backward = self.window_mask - WINDOW_GAP + 1;
        let mut unused = 0;
        self.store_and_find_matches(data, ix, mask, MAX_TREE_COMP_LENGTH, max_backward, &mut unused, None);
    }

    /// Store `ix_start..ix_end`; long ranges only get every eighth
    /// position except for the last 63
    pub fn store_range(&mut self, data: &[u8], mask: usize, ix_start: usize, ix_end: usize) {
        let mut i = ix_start;
        let mut j = ix_start;
        if ix_start + 63 <= ix_end {
            i = ix_end - 63;
        }
        if ix_start + 512 <= ix_end {
            while j < i {
                self.store(data, mask, j);
                j += 8;
            }
        }
        for ix in i..ix_end {
            self.store(data, mask, ix);
        }
    }

    /// Store the positions of the previous block whose comparison window
    /// reached into the new one
    pub fn stitch_to_previous_block(&mut self, num_bytes: usize, position: usize, data: &[u8], mask: usize) {
        if num_bytes + 1 >= 4 && position >= MAX_TREE_COMP_LENGTH {
            let i_start = position - MAX_TREE_COMP_LENGTH + 1;
            let i_end = position.min(i_start + num_bytes);
            for i in i_start..i_end {
                // stay inside the window as seen from the next block start
                let max_backward = self.window_mask - (WINDOW_GAP - 1).max(position - i);
                let mut unused = 0;
                self.store_and_find_matches(data, i, mask, MAX_TREE_COMP_LENGTH, max_backward, &mut unused, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(text: &[u8]) -> (Vec<u8>, usize) {
        let mut data = text.to_vec();
        data.resize(text.len() + MAX_TREE_COMP_LENGTH + 8, 0);
        (data, (1 << 16) - 1)
    }

    fn query(data: &[u8], mask: usize, cur_ix: usize, max_length: usize) -> MatchQuery<'_> {
        MatchQuery {
            data,
            mask,
            cur_ix,
            max_length,
            max_backward: cur_ix,
            dictionary_distance: cur_ix,
            max_distance: 1 << 26,
        }
    }

    #[test]
    fn test_matches_have_increasing_length() {
        let text = b"xyzab_xyzabc_xyzabcd_xyzabcde_xyzabcdef";
        let (data, mask) = setup(text);
        let mut h = BinaryTreeHasher::new(16, false, 0);
        let cur = text.len() - 9;
        for ix in 0..cur {
            h.store(&data, mask, ix);
        }
        let mut matches = Vec::new();
        h.find_all_matches(&query(&data, mask, cur, 9), 16, &mut matches);
        let lengths: Vec<usize> = matches.iter().map(|m| m.length()).collect();
        assert!(lengths.windows(2).all(|w| w[0] < w[1]), "{:?}", lengths);
        let best = matches.iter().filter(|m| m.len_code() == m.length()).last().expect("match");
        assert_eq!(best.length(), 8);
        assert_eq!(best.distance, 9);
    }

    #[test]
    fn test_short_matches_found_nearby() {
        let text = b"xab__ab";
        let (data, mask) = setup(text);
        let mut h = BinaryTreeHasher::new(16, true, text.len());
        let mut matches = Vec::new();
        h.find_all_matches(&query(&data, mask, 5, 2), 16, &mut matches);
        assert_eq!(matches, vec![BackwardMatch::new(4, 2)]);
    }

    #[test]
    fn test_dictionary_matches_reported() {
        let text = b"0123456789time the end";
        let (data, mask) = setup(text);
        let mut h = BinaryTreeHasher::new(16, false, 0);
        let cur = 10;
        let mut matches = Vec::new();
        h.find_all_matches(&query(&data, mask, cur, text.len() - cur), 16, &mut matches);
        assert!(matches.iter().any(|m| m.distance as usize > cur), "{:?}", matches);
    }

    #[test]
    fn test_dictionary_match_length_code() {
        let m = BackwardMatch::dictionary(100, 9, 4);
        assert_eq!((m.length(), m.len_code()), (9, 4));
        let m = BackwardMatch::dictionary(100, 6, 6);
        assert_eq!((m.length(), m.len_code()), (6, 6));
    }
}
