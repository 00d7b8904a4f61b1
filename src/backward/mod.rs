//! Backward references: turning a byte range into insert-and-copy
//! commands.
//!
//! Qualities 2 to 9 use [`create_backward_references`], a greedy parser
//! with lazy matching. Qualities 10 and 11 use the Zopfli optimal parser,
//! which finds a cheapest path through all candidate matches under a bit
//! cost model.

pub mod greedy;
pub mod literal_cost;
pub mod zopfli;

pub use greedy::create_backward_references;
pub use literal_cost::estimate_bit_costs_for_literals;
pub use zopfli::{create_hq_zopfli_backward_references, create_zopfli_backward_references};

use crate::command::Command;
use crate::constants::NUM_DISTANCE_SHORT_CODES;

/// Commands produced for the meta-block being assembled
#[derive(Clone, Debug, Default)]
pub struct CommandStream {
    pub commands: Vec<Command>,
    /// Literals after the last command, carried into the next one
    pub last_insert_len: usize,
    pub num_literals: usize,
}

impl CommandStream {
    pub fn clear(&mut self) {
        self.commands.clear();
        self.last_insert_len = 0;
        self.num_literals = 0;
    }
}

/// Distance code for `distance`: a short code when it is one of (or close
/// to) the last two distances or equal to the third or fourth, otherwise
/// the distance plus 15
pub fn compute_distance_code(distance: usize, max_distance: usize, dist_cache: &[i32]) -> usize {
    if distance <= max_distance {
        let distance_plus_3 = distance + 3;
        let offset0 = distance_plus_3.wrapping_sub(dist_cache[0] as usize);
        let offset1 = distance_plus_3.wrapping_sub(dist_cache[1] as usize);
        if distance == dist_cache[0] as usize {
            return 0;
        } else if distance == dist_cache[1] as usize {
            return 1;
        } else if offset0 < 7 {
            return (0x0975_0468 >> (4 * offset0)) & 0xF;
        } else if offset1 < 7 {
            return (0x0FDB_1ACE >> (4 * offset1)) & 0xF;
        } else if distance == dist_cache[2] as usize {
            return 2;
        } else if distance == dist_cache[3] as usize {
            return 3;
        }
    }
    distance + NUM_DISTANCE_SHORT_CODES - 1
}

/// Shift `distance` into the front of the four-entry cache
#[inline]
pub(crate) fn push_distance(dist_cache: &mut [i32], distance: usize) {
    dist_cache.copy_within(0..3, 1);
    dist_cache[0] = distance as i32;
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::CommandStream;
    use crate::command::DistanceParams;
    use crate::constants::INITIAL_DISTANCE_CACHE;

    const CACHE_INDEX: [usize; 16] = [0, 1, 2, 3, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
    const CACHE_OFFSET: [i64; 16] = [0, 0, 0, 0, -1, 1, -2, 2, -3, 3, -1, 1, -2, 2, -3, 3];

    /// Resolve every distance the way a decoder does and check that each
    /// in-window copy reproduces the input; dictionary references are
    /// only checked for being out of the window. Returns the number of
    /// dictionary references.
    pub fn verify_commands(input: &[u8], out: &CommandStream, dist: &DistanceParams) -> usize {
        let mut dictionary_refs = 0;
        let mut cache = INITIAL_DISTANCE_CACHE.map(|d| d as i64);
        let mut pos = 0usize;
        for cmd in &out.commands {
            pos += cmd.insert_len as usize;
            let len = cmd.copy_len() as usize;
            let code = if cmd.uses_implicit_distance() { 0 } else { cmd.restore_distance_code(dist) as usize };
            let distance = if code < 16 {
                cache[CACHE_INDEX[code]] + CACHE_OFFSET[code]
            } else {
                (code - 15) as i64
            };
            assert!(distance > 0, "distance code {} at {}", code, pos);
            let distance = distance as usize;
            if distance <= pos {
                assert_eq!(&input[pos..pos + len], &input[pos - distance..pos - distance + len], "copy at {}", pos);
                if code != 0 {
                    cache.copy_within(0..3, 1);
                    cache[0] = distance as i64;
                }
            } else {
                dictionary_refs += 1;
            }
            pos += len;
        }
        assert_eq!(pos + out.last_insert_len, input.len());
        dictionary_refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_code_short_codes() {
        let cache = [4, 11, 15, 16];
        assert_eq!(compute_distance_code(4, 100, &cache), 0);
        assert_eq!(compute_distance_code(11, 100, &cache), 1);
        assert_eq!(compute_distance_code(15, 100, &cache), 2);
        assert_eq!(compute_distance_code(16, 100, &cache), 3);
        // last distance - 1 and + 1
        assert_eq!(compute_distance_code(3, 100, &cache), 4);
        assert_eq!(compute_distance_code(5, 100, &cache), 5);
        // second-to-last distance + 3
        assert_eq!(compute_distance_code(14, 100, &cache), 15);
    }

    #[test]
    fn test_distance_code_plain_and_dictionary() {
        let cache = [4, 11, 15, 16];
        assert_eq!(compute_distance_code(1000, 5000, &cache), 1015);
        // beyond the dictionary start only the plain code applies
        assert_eq!(compute_distance_code(4, 3, &cache), 4 + 15);
    }

    #[test]
    fn test_push_distance() {
        let mut cache = [4, 11, 15, 16, 0, 0];
        push_distance(&mut cache, 99);
        assert_eq!(cache[..4], [99, 4, 11, 15]);
    }
}
