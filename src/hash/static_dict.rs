//! Static dictionary fallback for the greedy match finders.

use super::{backward_reference_score, find_match_length_with_limit, HasherSearchResult};
use crate::dictionary::{lookup_table, size_bits, word, CUTOFF_TRANSFORMS};

/// Lookup bookkeeping; lookups stop paying off when fewer than one in
/// 128 finds a word
#[derive(Clone, Copy, Debug, Default)]
pub struct DictionaryStats {
    pub num_lookups: usize,
    pub num_matches: usize,
}

/// Test one dictionary word against `data`, accepting "omit last N"
/// truncations of it
fn test_static_dictionary_item(
    len: usize,
    word_idx: usize,
    data: &[u8],
    max_length: usize,
    dictionary_distance: usize,
    max_distance: usize,
    out: &mut HasherSearchResult,
) -> bool {
    if len > max_length {
        return false;
    }
    let matchlen = find_match_length_with_limit(data, word(len, word_idx), len);
    if matchlen + CUTOFF_TRANSFORMS.len() <= len || matchlen == 0 {
        return false;
    }
    let cut = len - matchlen;
    let transform_id = CUTOFF_TRANSFORMS[cut] as usize;
    let backward = dictionary_distance + 1 + word_idx + (transform_id << size_bits(len));
    if backward > max_distance {
        return false;
    }
    let score = backward_reference_score(matchlen, backward);
    if score < out.score {
        return false;
    }
    out.len = matchlen;
    out.len_code_delta = len as i32 - matchlen as i32;
    out.distance = backward;
    out.score = score;
    true
}

/// Look `data` up in the static dictionary, improving `out` on success
///
/// `shallow` checks only the longest candidate of the bucket.
pub fn search_in_static_dictionary(
    stats: &mut DictionaryStats,
    data: &[u8],
    max_length: usize,
    dictionary_distance: usize,
    max_distance: usize,
    out: &mut HasherSearchResult,
    shallow: bool,
) {
    if stats.num_matches < (stats.num_lookups >> 7) || data.len() < 4 {
        return;
    }
    let table = lookup_table();
    let slots = if shallow { 1 } else { 2 };
    for slot in 0..slots {
        stats.num_lookups += 1;
        let item = table.item(data, slot) as usize;
        if item != 0
            && test_static_dictionary_item(
                item & 31,
                item >> 5,
                data,
                max_length,
                dictionary_distance,
                max_distance,
                out,
            )
        {
            stats.num_matches += 1;
        }
    }
}
