//! Greedy parsing with lazy matching.

use super::{compute_distance_code, push_distance, CommandStream};
use crate::command::Command;
use crate::hash::{Hasher, HasherSearchResult, MatchQuery, MIN_SCORE};
use crate::params::{max_backward_limit, EncoderParams};

/// Score a delayed match must gain over the current one
const COST_DIFF_LAZY: usize = 175;

/// Matches delayed in a row before the current one is taken
const MAX_DELAYED_REFERENCES: usize = 4;

/// Lowest quality that does not seed the lazy search with the current
/// match length
const MIN_QUALITY_FOR_EXTENSIVE_REFERENCE_SEARCH: u32 = 5;

/// Parse `num_bytes` bytes at `position` into commands appended to `out`
///
/// `dist_cache` holds the last four distances (plus derived candidates
/// filled in for the hasher) and is updated with every new explicit
/// distance. Pending literals are carried in `out.last_insert_len`.
#[allow(clippy::too_many_arguments)]
pub fn create_backward_references(
    num_bytes: usize,
    mut position: usize,
    ringbuffer: &[u8],
    mask: usize,
    params: &EncoderParams,
    hasher: &mut Hasher,
    dist_cache: &mut [i32; 16],
    out: &mut CommandStream,
) {
    let max_backward = max_backward_limit(params.lgwin);
    let max_distance_code = params.dist.max_distance;
    let mut insert_length = out.last_insert_len;
    let pos_end = position + num_bytes;
    let hash_len = hasher.hash_type_length();
    let lookahead = hasher.store_lookahead();
    let store_end = if num_bytes >= lookahead { position + num_bytes - lookahead + 1 } else { position };
    let random_heuristics_window_size = params.literal_spree_length_for_sparse_search();
    let mut apply_random_heuristics = position + random_heuristics_window_size;

    hasher.prepare_distance_cache(dist_cache);

    while position + hash_len < pos_end {
        let mut max_length = pos_end - position;
        let mut query = MatchQuery {
            data: ringbuffer,
            mask,
            cur_ix: position,
            max_length,
            max_backward: position.min(max_backward),
            dictionary_distance: position.min(max_backward),
            max_distance: max_distance_code,
        };
        let mut sr = HasherSearchResult::new(0, MIN_SCORE);
        hasher.find_longest_match(&query, dist_cache, &mut sr);
        if sr.score > MIN_SCORE {
            let mut delayed_in_row = 0;
            max_length -= 1;
            loop {
                let mut sr2 = HasherSearchResult::new(0, MIN_SCORE);
                if params.quality < MIN_QUALITY_FOR_EXTENSIVE_REFERENCE_SEARCH {
                    sr2.len = (sr.len - 1).min(max_length);
                }
                query.cur_ix = position + 1;
                query.max_length = max_length;
                query.max_backward = (position + 1).min(max_backward);
                query.dictionary_distance = (position + 1).min(max_backward);
                hasher.find_longest_match(&query, dist_cache, &mut sr2);
                if sr2.score >= sr.score + COST_DIFF_LAZY {
                    // the match one byte later is clearly better: emit a
                    // literal instead
                    position += 1;
                    insert_length += 1;
                    sr = sr2;
                    delayed_in_row += 1;
                    if delayed_in_row < MAX_DELAYED_REFERENCES && position + hash_len < pos_end {
                        max_length -= 1;
                        continue;
                    }
                }
                break;
            }
            apply_random_heuristics = position + 2 * sr.len + random_heuristics_window_size;
            let dictionary_start = position.min(max_backward);
            let distance_code = compute_distance_code(sr.distance, dictionary_start, &dist_cache[..]);
            if sr.distance <= dictionary_start && distance_code > 0 {
                push_distance(dist_cache, sr.distance);
                hasher.prepare_distance_cache(dist_cache);
            }
            out.commands.push(Command::new(&params.dist, insert_length, sr.len, sr.len_code_delta, distance_code));
            out.num_literals += insert_length;
            insert_length = 0;

            // Positions inside the copy are stored without searching;
            // for short distances only the tail is worth it.
            let mut range_start = position + 2;
            let range_end = (position + sr.len).min(store_end);
            if sr.distance < sr.len >> 2 {
                range_start = range_end.min(range_start.max(position + sr.len - (sr.distance << 2)));
            }
            hasher.store_range(ringbuffer, mask, range_start, range_end);
            position += sr.len;
        } else {
            insert_length += 1;
            position += 1;
            // Long stretches without matches are probably incompressible:
            // search only every second or fourth position.
            if position > apply_random_heuristics {
                let (stride, span, margin) = if position > apply_random_heuristics + 4 * random_heuristics_window_size {
                    (4, 16, (lookahead - 1).max(4))
                } else {
                    (2, 8, (lookahead - 1).max(2))
                };
                let pos_jump = (position + span).min(pos_end.saturating_sub(margin));
                while position < pos_jump {
                    hasher.store(ringbuffer, mask, position);
                    insert_length += stride;
                    position += stride;
                }
            }
        }
    }
    insert_length += pos_end - position;
    out.last_insert_len = insert_length;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::test_util::verify_commands;
    use crate::constants::INITIAL_DISTANCE_CACHE;
    use crate::hash::choose_hasher;

    fn prepared(quality: u32) -> EncoderParams {
        let mut p = EncoderParams::default().with_quality(quality).with_window_bits(18);
        p.sanitize();
        p.compute_lgblock();
        p.choose_distance_params();
        p.hasher = choose_hasher(&p);
        p
    }

    fn run(quality: u32, input: &[u8]) -> (CommandStream, [i32; 16]) {
        let params = prepared(quality);
        let mut ringbuffer = input.to_vec();
        ringbuffer.resize(input.len() + 1024, 0);
        let mask = (1usize << 19) - 1;
        let mut hasher = Hasher::new(&params, true, input.len());
        hasher.prepare(&ringbuffer, input.len());
        let mut cache = [0i32; 16];
        cache[..4].copy_from_slice(&INITIAL_DISTANCE_CACHE);
        let mut out = CommandStream::default();
        create_backward_references(input.len(), 0, &ringbuffer, mask, &params, &mut hasher, &mut cache, &mut out);
        verify_commands(input, &out, &params.dist);
        (out, cache)
    }

    #[test]
    fn test_repetitive_input_becomes_copies() {
        let input = b"abcdefghij".repeat(200);
        for quality in [2, 3, 4, 5, 7, 9] {
            let (out, cache) = run(quality, &input);
            assert!(!out.commands.is_empty(), "quality {}", quality);
            assert!(out.num_literals < 64, "quality {}: {} literals", quality, out.num_literals);
            assert_eq!(cache[0], 10, "quality {}", quality);
        }
    }

    #[test]
    fn test_random_input_stays_literal() {
        let mut x = 12345u32;
        let input: Vec<u8> = (0..20000)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (x >> 16) as u8
            })
            .collect();
        let (out, _) = run(5, &input);
        assert!(out.num_literals + out.last_insert_len > 19000);
    }

    #[test]
    fn test_short_input_is_pending_literals() {
        let (out, _) = run(5, b"abc");
        assert!(out.commands.is_empty());
        assert_eq!(out.last_insert_len, 3);
    }
}
