//! Storage of prefix codes (RFC 7932 section 3.4 and 3.5).

use crate::bits::BitWriter;
use crate::constants::{CODE_LENGTH_CODES, CODE_LENGTH_CODE_ORDER};
use crate::huffman::rle::{REPEAT_PREVIOUS_CODE_LENGTH, REPEAT_ZERO_CODE_LENGTH};
use crate::huffman::tree::{MAX_CODE_DEPTH, MAX_CODE_LENGTH_CODE_DEPTH};
use crate::huffman::{convert_bit_depths_to_symbols, create_huffman_tree, write_huffman_tree, CodeLengthRle, HuffmanTree};

/// Depth limit of the codes built on the fast path
const MAX_FAST_CODE_DEPTH: u8 = 14;

/// Fixed code used for the code-length code depths, indexed by depth 0-5
const CODE_LENGTH_DEPTH_LENGTHS: [u32; 6] = [2, 4, 3, 2, 2, 4];
const CODE_LENGTH_DEPTH_SYMBOLS: [u64; 6] = [0, 7, 3, 2, 1, 15];

/// Bits needed to write any symbol below `alphabet_size`
fn symbol_bits(alphabet_size: usize) -> u32 {
    usize::BITS - alphabet_size.saturating_sub(1).leading_zeros()
}

fn store_code_length_code(num_codes: usize, code_length_bitdepth: &[u8; CODE_LENGTH_CODES], writer: &mut BitWriter) {
    let mut codes_to_store = CODE_LENGTH_CODES;
    if num_codes > 1 {
        while codes_to_store > 0 && code_length_bitdepth[CODE_LENGTH_CODE_ORDER[codes_to_store - 1]] == 0 {
            codes_to_store -= 1;
        }
    }
    let mut skip_some = 0;
    if code_length_bitdepth[CODE_LENGTH_CODE_ORDER[0]] == 0 && code_length_bitdepth[CODE_LENGTH_CODE_ORDER[1]] == 0 {
        skip_some = 2;
        if code_length_bitdepth[CODE_LENGTH_CODE_ORDER[2]] == 0 {
            skip_some = 3;
        }
    }
    writer.write_bits(2, skip_some as u64);
    for &symbol in &CODE_LENGTH_CODE_ORDER[skip_some..codes_to_store] {
        let l = code_length_bitdepth[symbol] as usize;
        writer.write_bits(CODE_LENGTH_DEPTH_LENGTHS[l], CODE_LENGTH_DEPTH_SYMBOLS[l]);
    }
}

/// Store a complex prefix code given the code lengths of its symbols
pub fn store_huffman_tree(depths: &[u8], pool: &mut Vec<HuffmanTree>, writer: &mut BitWriter) {
    let mut rle = CodeLengthRle::default();
    write_huffman_tree(depths, &mut rle);

    let mut histogram = [0u32; CODE_LENGTH_CODES];
    for &symbol in &rle.symbols {
        histogram[symbol as usize] += 1;
    }
    let mut num_codes = 0;
    let mut code = 0;
    for (i, &count) in histogram.iter().enumerate() {
        if count != 0 {
            if num_codes == 0 {
                code = i;
                num_codes = 1;
            } else {
                num_codes = 2;
                break;
            }
        }
    }

    let mut code_length_bitdepth = [0u8; CODE_LENGTH_CODES];
    let mut code_length_bits = [0u16; CODE_LENGTH_CODES];
    create_huffman_tree(&histogram, MAX_CODE_LENGTH_CODE_DEPTH, pool, &mut code_length_bitdepth);
    convert_bit_depths_to_symbols(&code_length_bitdepth, &mut code_length_bits);

    store_code_length_code(num_codes, &code_length_bitdepth, writer);
    if num_codes == 1 {
        // a lone code-length symbol takes zero bits
        code_length_bitdepth[code] = 0;
    }

    for (&symbol, &extra) in rle.symbols.iter().zip(&rle.extra_bits) {
        let ix = symbol as usize;
        writer.write_bits(code_length_bitdepth[ix] as u32, code_length_bits[ix] as u64);
        if symbol == REPEAT_PREVIOUS_CODE_LENGTH {
            writer.write_bits(2, extra as u64);
        } else if symbol == REPEAT_ZERO_CODE_LENGTH {
            writer.write_bits(3, extra as u64);
        }
    }
}

/// Store a code of 2-4 symbols in the simple form
fn store_simple_huffman_tree(depths: &[u8], symbols: &mut [usize], max_bits: u32, writer: &mut BitWriter) {
    let num_symbols = symbols.len();
    writer.write_bits(2, 1);
    writer.write_bits(2, (num_symbols - 1) as u64);
    // shallowest first; the decoder assigns lengths in listed order
    for i in 0..num_symbols {
        for j in i + 1..num_symbols {
            if depths[symbols[j]] < depths[symbols[i]] {
                symbols.swap(i, j);
            }
        }
    }
    for &symbol in symbols.iter() {
        writer.write_bits(max_bits, symbol as u64);
    }
    if num_symbols == 4 {
        // tree-select: 1-2-3-3 rather than 2-2-2-2
        writer.write_bit(depths[symbols[0]] == 1);
    }
}

/// Build a prefix code for `histogram` and store it
///
/// `depth` and `bits` receive the code of every symbol below
/// `histogram.len()`. `alphabet_size` sets the width of symbols in the
/// simple form. A histogram with at most one used symbol is stored as a
/// zero-bit code.
pub fn build_and_store_huffman_tree(
    histogram: &[u32],
    alphabet_size: usize,
    pool: &mut Vec<HuffmanTree>,
    depth: &mut [u8],
    bits: &mut [u16],
    writer: &mut BitWriter,
) {
    build_and_store(histogram, alphabet_size, MAX_CODE_DEPTH, pool, depth, bits, writer);
}

/// Variant of [`build_and_store_huffman_tree`] for the fastest qualities
///
/// Codes are limited to 14 bits and `max_bits` is given directly.
pub fn build_and_store_huffman_tree_fast(
    histogram: &[u32],
    max_bits: u32,
    pool: &mut Vec<HuffmanTree>,
    depth: &mut [u8],
    bits: &mut [u16],
    writer: &mut BitWriter,
) {
    build_and_store(histogram, 1 << max_bits, MAX_FAST_CODE_DEPTH, pool, depth, bits, writer);
}

fn build_and_store(
    histogram: &[u32],
    alphabet_size: usize,
    tree_limit: u8,
    pool: &mut Vec<HuffmanTree>,
    depth: &mut [u8],
    bits: &mut [u16],
    writer: &mut BitWriter,
) {
    let length = histogram.len();
    let mut count = 0usize;
    let mut s4 = [0usize; 4];
    for (i, &c) in histogram.iter().enumerate() {
        if c != 0 {
            if count < 4 {
                s4[count] = i;
            } else if count > 4 {
                break;
            }
            count += 1;
        }
    }

    let max_bits = symbol_bits(alphabet_size);

    depth[..length].fill(0);
    if count <= 1 {
        writer.write_bits(4, 1);
        writer.write_bits(max_bits, s4[0] as u64);
        bits[s4[0]] = 0;
        return;
    }

    create_huffman_tree(histogram, tree_limit, pool, &mut depth[..length]);
    convert_bit_depths_to_symbols(&depth[..length], &mut bits[..length]);

    if count <= 4 {
        store_simple_huffman_tree(depth, &mut s4[..count], max_bits, writer);
    } else {
        store_huffman_tree(&depth[..length], pool, writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(histogram: &[u32], alphabet_size: usize) -> (Vec<u8>, Vec<u16>, BitWriter) {
        let mut depth = vec![0u8; histogram.len()];
        let mut bits = vec![0u16; histogram.len()];
        let mut writer = BitWriter::new();
        build_and_store_huffman_tree(histogram, alphabet_size, &mut Vec::new(), &mut depth, &mut bits, &mut writer);
        (depth, bits, writer)
    }

    #[test]
    fn test_symbol_bits() {
        assert_eq!(symbol_bits(256), 8);
        assert_eq!(symbol_bits(704), 10);
        assert_eq!(symbol_bits(26), 5);
        assert_eq!(symbol_bits(1), 0);
    }

    #[test]
    fn test_single_symbol_is_zero_bit_code() {
        let mut histogram = vec![0u32; 256];
        histogram[b'a' as usize] = 40;
        let (depth, _, writer) = store(&histogram, 256);
        assert!(depth.iter().all(|&d| d == 0));
        // HSKIP = 1, NSYM - 1 = 0, 8-bit symbol
        assert_eq!(writer.bit_len(), 4 + 8);
    }

    #[test]
    fn test_simple_code_sizes() {
        let mut histogram = vec![0u32; 256];
        histogram[1] = 10;
        histogram[7] = 1;
        histogram[9] = 1;
        let (depth, _, writer) = store(&histogram, 256);
        assert_eq!((depth[1], depth[7], depth[9]), (1, 2, 2));
        assert_eq!(writer.bit_len(), 4 + 3 * 8);

        histogram[200] = 1;
        let (_, _, writer) = store(&histogram, 256);
        assert_eq!(writer.bit_len(), 4 + 4 * 8 + 1);
    }

    #[test]
    fn test_complex_code_is_prefix_free() {
        let histogram: Vec<u32> = (0..256u32).map(|i| if i % 3 == 0 { 0 } else { 1 + i % 17 }).collect();
        let (depth, bits, writer) = store(&histogram, 256);
        assert!(writer.bit_len() > 0);
        let kraft: f64 = depth.iter().filter(|&&d| d > 0).map(|&d| 2f64.powi(-(d as i32))).sum();
        assert!((kraft - 1.0).abs() < 1e-9);
        assert!(depth.iter().all(|&d| d <= MAX_CODE_DEPTH));
        let mut codes: Vec<(u8, u16)> =
            depth.iter().zip(&bits).filter(|(&d, _)| d > 0).map(|(&d, &b)| (d, b)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), histogram.iter().filter(|&&c| c > 0).count());
    }

    #[test]
    fn test_fast_code_depth_limit() {
        let mut histogram = vec![0u32; 256];
        let (mut a, mut b) = (1u32, 1u32);
        for h in histogram.iter_mut().take(24) {
            *h = a;
            let next = a + b;
            a = b;
            b = next;
        }
        let mut depth = vec![0u8; 256];
        let mut bits = vec![0u16; 256];
        let mut writer = BitWriter::new();
        build_and_store_huffman_tree_fast(&histogram, 8, &mut Vec::new(), &mut depth, &mut bits, &mut writer);
        assert!(depth.iter().all(|&d| d <= MAX_FAST_CODE_DEPTH));
        assert_eq!(depth.iter().filter(|&&d| d > 0).count(), 24);
    }
}
