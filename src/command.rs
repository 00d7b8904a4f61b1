//! Insert-and-copy commands and the prefix codes that describe them.

use crate::constants::{
    LARGE_MAX_DISTANCE_BITS, MAX_ALLOWED_DISTANCE, MAX_DISTANCE_BITS, MAX_NPOSTFIX, NUM_DISTANCE_SHORT_CODES,
};

/// Insert length codes 0-23: (base, extra_bits)
pub const INSERT_LENGTH_TABLE: [(u32, u32); 24] = [
    (0, 0),      // 0
    (1, 0),      // 1
    (2, 0),      // 2
    (3, 0),      // 3
    (4, 0),      // 4
    (5, 0),      // 5
    (6, 1),      // 6
    (8, 1),      // 7
    (10, 2),     // 8
    (14, 2),     // 9
    (18, 3),     // 10
    (26, 3),     // 11
    (34, 4),     // 12
    (50, 4),     // 13
    (66, 5),     // 14
    (98, 5),     // 15
    (130, 6),    // 16
    (194, 7),    // 17
    (322, 8),    // 18
    (578, 9),    // 19
    (1090, 10),  // 20
    (2114, 12),  // 21
    (6210, 14),  // 22
    (22594, 24), // 23
];

/// Copy length codes 0-23: (base, extra_bits)
pub const COPY_LENGTH_TABLE: [(u32, u32); 24] = [
    (2, 0),     // 0
    (3, 0),     // 1
    (4, 0),     // 2
    (5, 0),     // 3
    (6, 0),     // 4
    (7, 0),     // 5
    (8, 0),     // 6
    (9, 0),     // 7
    (10, 1),    // 8
    (12, 1),    // 9
    (14, 2),    // 10
    (18, 2),    // 11
    (22, 3),    // 12
    (30, 3),    // 13
    (38, 4),    // 14
    (54, 4),    // 15
    (70, 5),    // 16
    (102, 5),   // 17
    (134, 6),   // 18
    (198, 7),   // 19
    (326, 8),   // 20
    (582, 9),   // 21
    (1094, 10), // 22
    (2118, 24), // 23
];

#[inline]
pub(crate) fn log2_floor_non_zero(n: usize) -> u32 {
    debug_assert!(n != 0);
    usize::BITS - 1 - n.leading_zeros()
}

/// Insert length code for `insert_len`
pub fn insert_length_code(insert_len: usize) -> u16 {
    if insert_len < 6 {
        insert_len as u16
    } else if insert_len < 130 {
        let nbits = log2_floor_non_zero(insert_len - 2) - 1;
        ((nbits << 1) as usize + ((insert_len - 2) >> nbits) + 2) as u16
    } else if insert_len < 2114 {
        (log2_floor_non_zero(insert_len - 66) + 10) as u16
    } else if insert_len < 6210 {
        21
    } else if insert_len < 22594 {
        22
    } else {
        23
    }
}

/// Copy length code for `copy_len` (at least 2)
pub fn copy_length_code(copy_len: usize) -> u16 {
    if copy_len < 10 {
        (copy_len - 2) as u16
    } else if copy_len < 134 {
        let nbits = log2_floor_non_zero(copy_len - 6) - 1;
        ((nbits << 1) as usize + ((copy_len - 6) >> nbits) + 4) as u16
    } else if copy_len < 2118 {
        (log2_floor_non_zero(copy_len - 70) + 12) as u16
    } else {
        23
    }
}

/// Combine insert and copy codes into the 704-symbol command alphabet
///
/// Commands that reuse the last distance with short lengths get the
/// implicit-distance cells 0-127.
pub fn combine_length_codes(ins_code: u16, copy_code: u16, use_last_distance: bool) -> u16 {
    let bits64 = (copy_code & 0x7) | ((ins_code & 0x7) << 3);
    if use_last_distance && ins_code < 8 && copy_code < 16 {
        if copy_code < 8 {
            bits64
        } else {
            bits64 | 64
        }
    } else {
        // Cell order of the 3x3 grid: 128 * [2, 3, 6, 4, 5, 8, 7, 9, 10] / 2,
        // packed as 2-bit deltas in 0x520D40.
        let mut offset: u32 = 2 * ((copy_code as u32 >> 3) + 3 * (ins_code as u32 >> 3));
        offset = (offset << 5) + 0x40 + ((0x0052_0D40u32 >> offset) & 0xC0);
        offset as u16 | bits64
    }
}

/// Command prefix for an (insert, copy) pair
pub fn length_code(insert_len: usize, copy_len: usize, use_last_distance: bool) -> u16 {
    combine_length_codes(insert_length_code(insert_len), copy_length_code(copy_len), use_last_distance)
}

#[inline]
pub fn insert_base(code: u16) -> u32 {
    INSERT_LENGTH_TABLE[code as usize].0
}

#[inline]
pub fn insert_extra(code: u16) -> u32 {
    INSERT_LENGTH_TABLE[code as usize].1
}

#[inline]
pub fn copy_base(code: u16) -> u32 {
    COPY_LENGTH_TABLE[code as usize].0
}

#[inline]
pub fn copy_extra(code: u16) -> u32 {
    COPY_LENGTH_TABLE[code as usize].1
}

/// Encode a distance code into (symbol with extra-bit count, extra bits)
///
/// The returned symbol carries the distance symbol in its low 10 bits and
/// the number of extra bits in the high 6 bits.
pub fn prefix_encode_copy_distance(distance_code: usize, num_direct_codes: usize, postfix_bits: u32) -> (u16, u32) {
    if distance_code < NUM_DISTANCE_SHORT_CODES + num_direct_codes {
        return (distance_code as u16, 0);
    }
    let dist = (1usize << (postfix_bits + 2)) + (distance_code - NUM_DISTANCE_SHORT_CODES - num_direct_codes);
    let bucket = log2_floor_non_zero(dist) - 1;
    let postfix_mask = (1usize << postfix_bits) - 1;
    let postfix = dist & postfix_mask;
    let prefix = (dist >> bucket) & 1;
    let offset = (2 + prefix) << bucket;
    let nbits = (bucket - postfix_bits) as usize;
    let symbol = NUM_DISTANCE_SHORT_CODES + num_direct_codes + ((2 * (nbits - 1) + prefix) << postfix_bits) + postfix;
    (((nbits << 10) | symbol) as u16, ((dist - offset) >> postfix_bits) as u32)
}

/// Distance coding parameters (NPOSTFIX / NDIRECT) for one stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistanceParams {
    pub postfix_bits: u32,
    pub num_direct_codes: u32,
    pub alphabet_size: u32,
    pub max_distance: usize,
}

/// Size of the distance alphabet for the given parameters
pub fn distance_alphabet_size(postfix_bits: u32, num_direct_codes: u32, max_nbits: u32) -> u32 {
    NUM_DISTANCE_SHORT_CODES as u32 + num_direct_codes + (max_nbits << (postfix_bits + 1))
}

impl DistanceParams {
    pub fn new(postfix_bits: u32, num_direct_codes: u32, large_window: bool) -> Self {
        let mut alphabet_size = distance_alphabet_size(postfix_bits, num_direct_codes, MAX_DISTANCE_BITS);
        let mut max_distance = num_direct_codes as usize + (1usize << (MAX_DISTANCE_BITS + postfix_bits + 2))
            - (1usize << (postfix_bits + 2));

        if large_window {
            const BOUND: [u32; MAX_NPOSTFIX as usize + 1] = [0, 4, 12, 28];
            let bound = BOUND[postfix_bits as usize];
            let postfix = 1u32 << postfix_bits;
            alphabet_size = distance_alphabet_size(postfix_bits, num_direct_codes, LARGE_MAX_DISTANCE_BITS);
            // No symbol may encode a distance above MAX_ALLOWED_DISTANCE with
            // all of its extra bits set.
            max_distance = if num_direct_codes < bound {
                MAX_ALLOWED_DISTANCE - (bound - num_direct_codes) as usize
            } else if num_direct_codes >= bound + postfix {
                (3usize << 29) - 4 + (num_direct_codes - bound) as usize
            } else {
                MAX_ALLOWED_DISTANCE
            };
        }

        Self { postfix_bits, num_direct_codes, alphabet_size, max_distance }
    }
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self::new(0, 0, false)
    }
}

/// One insert-and-copy command
///
/// `copy_len` keeps the copy length in its low 25 bits and the signed
/// difference between the length used for the length code and the real
/// length in the high 7 bits (non-zero only for dictionary matches whose
/// transformed length differs).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Command {
    pub insert_len: u32,
    pub copy_len: u32,
    pub dist_extra: u32,
    pub cmd_prefix: u16,
    pub dist_prefix: u16,
}

impl Command {
    pub fn new(
        dist: &DistanceParams,
        insert_len: usize,
        copy_len: usize,
        copy_len_code_delta: i32,
        distance_code: usize,
    ) -> Self {
        let delta = (copy_len_code_delta as i8) as u8 as u32;
        let (dist_prefix, dist_extra) =
            prefix_encode_copy_distance(distance_code, dist.num_direct_codes as usize, dist.postfix_bits);
        let cmd_prefix = length_code(
            insert_len,
            (copy_len as i64 + copy_len_code_delta as i64) as usize,
            (dist_prefix & 0x3FF) == 0,
        );
        Self { insert_len: insert_len as u32, copy_len: copy_len as u32 | (delta << 25), dist_extra, cmd_prefix, dist_prefix }
    }

    /// Command carrying only literals (copy part is never read)
    pub fn insert_only(insert_len: usize) -> Self {
        Self {
            insert_len: insert_len as u32,
            copy_len: 4 << 25,
            dist_extra: 0,
            dist_prefix: NUM_DISTANCE_SHORT_CODES as u16,
            cmd_prefix: length_code(insert_len, 4, false),
        }
    }

    #[inline]
    pub fn copy_len(&self) -> u32 {
        self.copy_len & 0x1FF_FFFF
    }

    /// Length used to pick the copy length code
    #[inline]
    pub fn copy_len_code(&self) -> u32 {
        let modifier = self.copy_len >> 25;
        let delta = ((modifier | ((modifier & 0x40) << 1)) as u8) as i8 as i32;
        (self.copy_len() as i32 + delta) as u32
    }

    /// Distance symbol (low 10 bits of the distance prefix)
    #[inline]
    pub fn distance_symbol(&self) -> u16 {
        self.dist_prefix & 0x3FF
    }

    /// Distance context (0-3) used to select a distance histogram
    #[inline]
    pub fn distance_context(&self) -> u32 {
        let r = (self.cmd_prefix >> 6) as u32;
        let c = (self.cmd_prefix & 7) as u32;
        if (r == 0 || r == 2 || r == 4 || r == 7) && c <= 2 {
            c
        } else {
            3
        }
    }

    /// Recover the distance code (short code or distance + 15) from the
    /// stored prefix and extra bits
    pub fn restore_distance_code(&self, dist: &DistanceParams) -> u32 {
        let dcode = self.distance_symbol() as u32;
        let short_and_direct = NUM_DISTANCE_SHORT_CODES as u32 + dist.num_direct_codes;
        if dcode < short_and_direct {
            return dcode;
        }
        let nbits = (self.dist_prefix >> 10) as u32;
        let extra = self.dist_extra;
        let postfix_mask = (1u32 << dist.postfix_bits) - 1;
        let hcode = (dcode - short_and_direct) >> dist.postfix_bits;
        let lcode = (dcode - short_and_direct) & postfix_mask;
        let offset = ((2 + (hcode & 1)) << nbits) - 4;
        ((offset + extra) << dist.postfix_bits) + lcode + short_and_direct
    }

    /// Whether the command uses the implicit last-distance form
    #[inline]
    pub fn uses_implicit_distance(&self) -> bool {
        self.cmd_prefix < 128
    }
}
