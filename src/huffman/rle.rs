//! Run-length coding of Huffman code lengths.

/// Repeat the previous non-zero code length (2 extra bits)
pub const REPEAT_PREVIOUS_CODE_LENGTH: u8 = 16;

/// Repeat a zero code length (3 extra bits)
pub const REPEAT_ZERO_CODE_LENGTH: u8 = 17;

/// Code length assumed before the first non-zero length
pub const INITIAL_REPEATED_CODE_LENGTH: u8 = 8;

/// Code-length symbols plus their extra-bit payloads
#[derive(Clone, Debug, Default)]
pub struct CodeLengthRle {
    pub symbols: Vec<u8>,
    pub extra_bits: Vec<u8>,
}

impl CodeLengthRle {
    pub fn clear(&mut self) {
        self.symbols.clear();
        self.extra_bits.clear();
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[inline]
    fn push(&mut self, symbol: u8, extra: u8) {
        self.symbols.push(symbol);
        self.extra_bits.push(extra);
    }

    /// Emit a chain of repeat codes for `repetitions` (already reduced by 3)
    ///
    /// Each repeat code multiplies the pending count by 4 (or 8 for zeros)
    /// in the decoder, so the digits are produced least significant first
    /// and then reversed.
    fn push_repeat_chain(&mut self, code: u8, mut repetitions: usize, shift: u32) {
        let start = self.symbols.len();
        let mask = (1usize << shift) - 1;
        loop {
            self.push(code, (repetitions & mask) as u8);
            repetitions >>= shift;
            if repetitions == 0 {
                break;
            }
            repetitions -= 1;
        }
        self.symbols[start..].reverse();
        self.extra_bits[start..].reverse();
    }

    fn push_repetitions(&mut self, previous_value: u8, value: u8, mut repetitions: usize) {
        debug_assert!(repetitions > 0);
        if previous_value != value {
            self.push(value, 0);
            repetitions -= 1;
        }
        if repetitions == 7 {
            self.push(value, 0);
            repetitions -= 1;
        }
        if repetitions < 3 {
            for _ in 0..repetitions {
                self.push(value, 0);
            }
        } else {
            self.push_repeat_chain(REPEAT_PREVIOUS_CODE_LENGTH, repetitions - 3, 2);
        }
    }

    fn push_zero_repetitions(&mut self, mut repetitions: usize) {
        if repetitions == 11 {
            self.push(0, 0);
            repetitions -= 1;
        }
        if repetitions < 3 {
            for _ in 0..repetitions {
                self.push(0, 0);
            }
        } else {
            self.push_repeat_chain(REPEAT_ZERO_CODE_LENGTH, repetitions - 3, 3);
        }
    }
}

/// Decide whether runs of zero and non-zero lengths are long enough to
/// benefit from repeat codes. Returns `(use_rle_for_non_zero, use_rle_for_zero)`.
fn decide_over_rle_use(depth: &[u8]) -> (bool, bool) {
    let mut total_reps_zero = 0usize;
    let mut total_reps_non_zero = 0usize;
    let mut count_reps_zero = 1usize;
    let mut count_reps_non_zero = 1usize;

    let mut i = 0;
    while i < depth.len() {
        let value = depth[i];
        let reps = depth[i..].iter().take_while(|&&d| d == value).count();
        if reps >= 3 && value == 0 {
            total_reps_zero += reps;
            count_reps_zero += 1;
        }
        if reps >= 4 && value != 0 {
            total_reps_non_zero += reps;
            count_reps_non_zero += 1;
        }
        i += reps;
    }

    (total_reps_non_zero > count_reps_non_zero * 2, total_reps_zero > count_reps_zero * 2)
}

/// Run-length encode a sequence of code lengths into `out`
///
/// Trailing zeros are dropped, the decoder fills them in.
pub fn write_huffman_tree(depth: &[u8], out: &mut CodeLengthRle) {
    let new_length = depth.len() - depth.iter().rev().take_while(|&&d| d == 0).count();
    let depth_used = &depth[..new_length];

    // Shorter codes rarely benefit from repeat codes
    let (use_rle_for_non_zero, use_rle_for_zero) =
        if depth.len() > 50 { decide_over_rle_use(depth_used) } else { (false, false) };

    let mut previous_value = INITIAL_REPEATED_CODE_LENGTH;
    let mut i = 0;
    while i < new_length {
        let value = depth_used[i];
        let reps = if (value != 0 && use_rle_for_non_zero) || (value == 0 && use_rle_for_zero) {
            depth_used[i..].iter().take_while(|&&d| d == value).count()
        } else {
            1
        };

        if value == 0 {
            out.push_zero_repetitions(reps);
        } else {
            out.push_repetitions(previous_value, value, reps);
            previous_value = value;
        }
        i += reps;
    }
}

/// Smooth a histogram so that its code lengths run-length encode better
///
/// Counts inside long near-constant stretches are replaced by their
/// average. `good_for_rle` is scratch space of at least `counts.len()`.
pub fn optimize_huffman_counts_for_rle(counts: &mut [u32], good_for_rle: &mut [bool]) {
    const STREAK_LIMIT: usize = 1240;

    let nonzero_count = counts.iter().filter(|&&c| c != 0).count();
    if nonzero_count < 16 {
        return;
    }

    let mut length = counts.len();
    while length != 0 && counts[length - 1] == 0 {
        length -= 1;
    }
    if length == 0 {
        return;
    }

    {
        let mut nonzeros = 0usize;
        let mut smallest_nonzero = 1u32 << 30;
        for &c in &counts[..length] {
            if c != 0 {
                nonzeros += 1;
                smallest_nonzero = smallest_nonzero.min(c);
            }
        }
        if nonzeros < 5 {
            return;
        }
        if smallest_nonzero < 4 {
            let zeros = length - nonzeros;
            if zeros < 6 {
                for i in 1..length - 1 {
                    if counts[i - 1] != 0 && counts[i] == 0 && counts[i + 1] != 0 {
                        counts[i] = 1;
                    }
                }
            }
        }
        if nonzeros < 28 {
            return;
        }
    }

    // Mark stretches that are already RLE friendly.
    good_for_rle[..length].iter_mut().for_each(|g| *g = false);
    {
        let mut symbol = counts[0];
        let mut step = 0usize;
        for i in 0..=length {
            if i == length || counts[i] != symbol {
                if (symbol == 0 && step >= 5) || (symbol != 0 && step >= 7) {
                    for k in 0..step {
                        good_for_rle[i - k - 1] = true;
                    }
                }
                step = 1;
                if i != length {
                    symbol = counts[i];
                }
            } else {
                step += 1;
            }
        }
    }

    // Replace population counts that lead to more RLE codes.
    let mut stride = 0usize;
    let mut limit = 256 * (counts[0] as usize + counts[1] as usize + counts[2] as usize) / 3 + 420;
    let mut sum = 0usize;
    for i in 0..=length {
        let breaks_stride = i == length
            || good_for_rle[i]
            || (i != 0 && good_for_rle[i - 1])
            || (256 * counts[i] as usize).wrapping_sub(limit).wrapping_add(STREAK_LIMIT) >= 2 * STREAK_LIMIT;
        if breaks_stride {
            if stride >= 4 || (stride >= 3 && sum == 0) {
                let mut count = (sum + stride / 2) / stride;
                if count == 0 {
                    count = 1;
                }
                if sum == 0 {
                    count = 0;
                }
                for k in 0..stride {
                    counts[i - k - 1] = count as u32;
                }
            }
            stride = 0;
            sum = 0;
            limit = if i + 2 < length {
                256 * (counts[i] as usize + counts[i + 1] as usize + counts[i + 2] as usize) / 3 + 420
            } else if i < length {
                256 * counts[i] as usize
            } else {
                0
            };
        }
        stride += 1;
        if i != length {
            sum += counts[i] as usize;
            if stride >= 4 {
                limit = (256 * sum + stride / 2) / stride;
            }
            if stride == 4 {
                limit += 120;
            }
        }
    }
}
