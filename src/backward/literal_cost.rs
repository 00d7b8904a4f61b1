//! Per-position literal cost estimates for the first Zopfli pass.

use crate::entropy::fast_log2;
use crate::metablock::literal_context::is_mostly_utf8_masked;

/// UTF8 class of byte `c` following `last`: 0 for ASCII and trailing
/// bytes of two-byte sequences, 1 for lead bytes, 2 for later
/// continuation bytes; clamped to `clamp`
fn utf8_position(last: usize, c: usize, clamp: usize) -> usize {
    if c < 128 {
        0
    } else if c >= 192 {
        clamp.min(1)
    } else if last < 0xE0 {
        0
    } else {
        clamp.min(2)
    }
}

/// Highest UTF8 class with enough samples to get its own histogram
fn decide_multi_byte_stats_level(data: &[u8], pos: usize, len: usize, mask: usize) -> usize {
    let mut counts = [0usize; 3];
    let mut last_c = 0usize;
    for i in 0..len {
        let c = data[(pos + i) & mask] as usize;
        counts[utf8_position(last_c, c, 2)] += 1;
        last_c = c;
    }
    if counts[1] + counts[2] < 25 {
        0
    } else {
        1
    }
}

fn finish_cost(mut lit_cost: f64) -> f64 {
    if lit_cost < 1.0 {
        lit_cost = lit_cost * 0.5 + 0.5;
    }
    lit_cost
}

fn estimate_utf8(data: &[u8], pos: usize, len: usize, mask: usize, cost: &mut [f32]) {
    const WINDOW_HALF: usize = 495;
    let max_utf8 = decide_multi_byte_stats_level(data, pos, len, mask);
    let byte_at = |i: usize| data[(pos + i) & mask] as usize;
    let mut histogram = [[0usize; 256]; 3];
    let mut in_window_utf8 = [0usize; 3];

    let mut last_c = 0usize;
    let mut utf8_pos = 0usize;
    for i in 0..WINDOW_HALF.min(len) {
        let c = byte_at(i);
        histogram[utf8_pos][c] += 1;
        in_window_utf8[utf8_pos] += 1;
        utf8_pos = utf8_position(last_c, c, max_utf8);
        last_c = c;
    }

    for i in 0..len {
        if i >= WINDOW_HALF {
            // remove the byte leaving the window on the left
            let c = if i < WINDOW_HALF + 1 { 0 } else { byte_at(i - WINDOW_HALF - 1) };
            let last_c = if i < WINDOW_HALF + 2 { 0 } else { byte_at(i - WINDOW_HALF - 2) };
            let utf8_pos2 = utf8_position(last_c, c, max_utf8);
            histogram[utf8_pos2][byte_at(i - WINDOW_HALF)] -= 1;
            in_window_utf8[utf8_pos2] -= 1;
        }
        if i + WINDOW_HALF < len {
            // add the byte entering on the right
            let c = byte_at(i + WINDOW_HALF - 1);
            let last_c = byte_at(i + WINDOW_HALF - 2);
            let utf8_pos2 = utf8_position(last_c, c, max_utf8);
            histogram[utf8_pos2][byte_at(i + WINDOW_HALF)] += 1;
            in_window_utf8[utf8_pos2] += 1;
        }
        let c = if i < 1 { 0 } else { byte_at(i - 1) };
        let last_c = if i < 2 { 0 } else { byte_at(i - 2) };
        let utf8_pos = utf8_position(last_c, c, max_utf8);
        let histo = histogram[utf8_pos][byte_at(i)].max(1);
        let mut lit_cost = finish_cost(fast_log2(in_window_utf8[utf8_pos]) - fast_log2(histo) + 0.02905);
        if i < 2000 {
            // the first bytes pay for the yet unknown statistics
            lit_cost += 0.7 - ((2000 - i) as f64 / 2000.0 * 0.35);
        }
        cost[i] = lit_cost as f32;
    }
}

/// Estimated bits of the literal at every position of
/// `data[pos..pos + len]` (masked), from byte frequencies in a sliding
/// window around it
pub fn estimate_bit_costs_for_literals(data: &[u8], pos: usize, len: usize, mask: usize, cost: &mut [f32]) {
    if is_mostly_utf8_masked(data, pos, mask, len) {
        estimate_utf8(data, pos, len, mask, cost);
        return;
    }
    const WINDOW_HALF: usize = 2000;
    let byte_at = |i: usize| data[(pos + i) & mask] as usize;
    let mut histogram = [0usize; 256];
    let mut in_window = WINDOW_HALF.min(len);
    for i in 0..in_window {
        histogram[byte_at(i)] += 1;
    }
    for i in 0..len {
        if i >= WINDOW_HALF {
            histogram[byte_at(i - WINDOW_HALF)] -= 1;
            in_window -= 1;
        }
        if i + WINDOW_HALF < len {
            histogram[byte_at(i + WINDOW_HALF)] += 1;
            in_window += 1;
        }
        let histo = histogram[byte_at(i)].max(1);
        cost[i] = finish_cost(fast_log2(in_window) - fast_log2(histo) + 0.029) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rare_bytes_cost_more() {
        let mut data = vec![b'a'; 3000];
        data[1500] = 0xFF;
        data[1501] = 0x00;
        let mut cost = vec![0f32; data.len()];
        estimate_bit_costs_for_literals(&data, 0, data.len(), usize::MAX >> 1, &mut cost);
        assert!(cost[1500] > 8.0);
        assert!(cost[10] < 1.0);
        assert!(cost.iter().all(|&c| c >= 0.5));
    }

    #[test]
    fn test_utf8_text_costs() {
        let text = "Über große Straßen fährt ein Bär. ".repeat(60);
        let data = text.as_bytes();
        let mut cost = vec![0f32; data.len()];
        estimate_bit_costs_for_literals(data, 0, data.len(), usize::MAX >> 1, &mut cost);
        assert!(cost.iter().all(|c| c.is_finite() && *c > 0.0));
    }

    #[test]
    fn test_masked_positions_wrap() {
        let data: Vec<u8> = (0..64u8).collect();
        let mut wrapped = vec![0f32; 32];
        let mut flat = vec![0f32; 32];
        estimate_bit_costs_for_literals(&data, 48, 32, 63, &mut wrapped);
        let rotated: Vec<u8> = data[48..].iter().chain(&data[..16]).copied().collect();
        estimate_bit_costs_for_literals(&rotated, 0, 32, 63, &mut flat);
        assert_eq!(wrapped, flat);
    }
}
