//! Block switch commands and context maps.

use super::huffman::build_and_store_huffman_tree;
use super::store_var_len_uint8;
use crate::bits::BitWriter;
use crate::constants::{MAX_BLOCK_TYPE_SYMBOLS, NUM_BLOCK_LEN_SYMBOLS};
use crate::entropy::Histogram;
use crate::huffman::HuffmanTree;

/// `(offset, extra bits)` of each block length prefix code
const BLOCK_LENGTH_PREFIX_CODE: [(u32, u32); NUM_BLOCK_LEN_SYMBOLS] = [
    (1, 2),
    (5, 2),
    (9, 2),
    (13, 2),
    (17, 3),
    (25, 3),
    (33, 3),
    (41, 3),
    (49, 4),
    (65, 4),
    (81, 4),
    (97, 4),
    (113, 5),
    (145, 5),
    (177, 5),
    (209, 5),
    (241, 6),
    (305, 6),
    (369, 7),
    (497, 8),
    (753, 9),
    (1265, 10),
    (2289, 11),
    (4337, 12),
    (8433, 13),
    (16625, 24),
];

/// Largest alphabet of a context map: 256 clusters plus 16 run-length codes
const MAX_CONTEXT_MAP_SYMBOLS: usize = 272;

/// Run-length prefixes the context map coder may use
const MAX_RUN_LENGTH_PREFIX: u32 = 6;

/// Bits of a packed context map symbol holding the symbol itself
const SYMBOL_BITS: u32 = 9;
const SYMBOL_MASK: u32 = (1 << SYMBOL_BITS) - 1;

/// Prefix code of a block length
pub fn block_length_prefix_code(len: u32) -> usize {
    let mut code = if len >= 177 {
        if len >= 753 {
            20
        } else {
            14
        }
    } else if len >= 41 {
        7
    } else {
        0
    };
    while code < NUM_BLOCK_LEN_SYMBOLS - 1 && len >= BLOCK_LENGTH_PREFIX_CODE[code + 1].0 {
        code += 1;
    }
    code
}

/// Tracks the last two block types to produce block type codes
#[derive(Clone, Copy, Debug)]
pub struct BlockTypeCodeCalculator {
    last_type: usize,
    second_last_type: usize,
}

impl Default for BlockTypeCodeCalculator {
    fn default() -> Self {
        Self { last_type: 1, second_last_type: 0 }
    }
}

impl BlockTypeCodeCalculator {
    /// Code of `block_type`: 1 for "last + 1", 0 for "second last",
    /// otherwise the type plus 2
    pub fn next_code(&mut self, block_type: usize) -> usize {
        let code = if block_type == self.last_type + 1 {
            1
        } else if block_type == self.second_last_type {
            0
        } else {
            block_type + 2
        };
        self.second_last_type = self.last_type;
        self.last_type = block_type;
        code
    }
}

/// Prefix codes for the block type and block length of one category
#[derive(Clone)]
pub struct BlockSplitCode {
    calculator: BlockTypeCodeCalculator,
    type_depths: [u8; MAX_BLOCK_TYPE_SYMBOLS],
    type_bits: [u16; MAX_BLOCK_TYPE_SYMBOLS],
    length_depths: [u8; NUM_BLOCK_LEN_SYMBOLS],
    length_bits: [u16; NUM_BLOCK_LEN_SYMBOLS],
}

impl Default for BlockSplitCode {
    fn default() -> Self {
        Self {
            calculator: BlockTypeCodeCalculator::default(),
            type_depths: [0; MAX_BLOCK_TYPE_SYMBOLS],
            type_bits: [0; MAX_BLOCK_TYPE_SYMBOLS],
            length_depths: [0; NUM_BLOCK_LEN_SYMBOLS],
            length_bits: [0; NUM_BLOCK_LEN_SYMBOLS],
        }
    }
}

impl BlockSplitCode {
    /// Write a block switch; the first block of a meta-block carries only
    /// its length
    pub fn store_block_switch(&mut self, block_len: u32, block_type: usize, is_first_block: bool, writer: &mut BitWriter) {
        let type_code = self.calculator.next_code(block_type);
        if !is_first_block {
            writer.write_bits(self.type_depths[type_code] as u32, self.type_bits[type_code] as u64);
        }
        let len_code = block_length_prefix_code(block_len);
        let (offset, nextra) = BLOCK_LENGTH_PREFIX_CODE[len_code];
        writer.write_bits(self.length_depths[len_code] as u32, self.length_bits[len_code] as u64);
        writer.write_bits(nextra, (block_len - offset) as u64);
    }

    /// Store NBLTYPES, the type and length codes and the first block length
    pub fn build_and_store(
        &mut self,
        types: &[u8],
        lengths: &[u32],
        num_types: usize,
        pool: &mut Vec<HuffmanTree>,
        writer: &mut BitWriter,
    ) {
        let mut type_histo = [0u32; MAX_BLOCK_TYPE_SYMBOLS];
        let mut length_histo = [0u32; NUM_BLOCK_LEN_SYMBOLS];
        let mut calculator = BlockTypeCodeCalculator::default();
        for (i, (&block_type, &len)) in types.iter().zip(lengths).enumerate() {
            let type_code = calculator.next_code(block_type as usize);
            if i != 0 {
                type_histo[type_code] += 1;
            }
            length_histo[block_length_prefix_code(len)] += 1;
        }
        store_var_len_uint8(num_types - 1, writer);
        if num_types > 1 {
            build_and_store_huffman_tree(
                &type_histo[..num_types + 2],
                num_types + 2,
                pool,
                &mut self.type_depths,
                &mut self.type_bits,
                writer,
            );
            build_and_store_huffman_tree(
                &length_histo,
                NUM_BLOCK_LEN_SYMBOLS,
                pool,
                &mut self.length_depths,
                &mut self.length_bits,
                writer,
            );
            self.store_block_switch(lengths[0], types[0] as usize, true, writer);
        }
    }
}

/// Writes the symbols of one category, switching blocks as the split
/// dictates
pub struct BlockEncoder<'a> {
    histogram_length: usize,
    block_types: &'a [u8],
    block_lengths: &'a [u32],
    split_code: BlockSplitCode,
    block_ix: usize,
    block_len: u32,
    entropy_ix: usize,
    depths: Vec<u8>,
    bits: Vec<u16>,
}

impl<'a> BlockEncoder<'a> {
    pub fn new(histogram_length: usize, block_types: &'a [u8], block_lengths: &'a [u32]) -> Self {
        Self {
            histogram_length,
            block_types,
            block_lengths,
            split_code: BlockSplitCode::default(),
            block_ix: 0,
            block_len: block_lengths.first().copied().unwrap_or(0),
            entropy_ix: 0,
            depths: Vec::new(),
            bits: Vec::new(),
        }
    }

    pub fn build_and_store_block_switch_codes(
        &mut self,
        num_types: usize,
        pool: &mut Vec<HuffmanTree>,
        writer: &mut BitWriter,
    ) {
        self.split_code.build_and_store(self.block_types, self.block_lengths, num_types, pool, writer);
    }

    /// Build and store one prefix code per histogram
    ///
    /// Only the first `histogram_length` symbols of each histogram are
    /// coded; `alphabet_size` sets the symbol width of simple codes.
    pub fn build_and_store_entropy_codes<const N: usize>(
        &mut self,
        histograms: &[Histogram<N>],
        alphabet_size: usize,
        pool: &mut Vec<HuffmanTree>,
        writer: &mut BitWriter,
    ) {
        let len = self.histogram_length;
        self.depths = vec![0; histograms.len() * len];
        self.bits = vec![0; histograms.len() * len];
        for (i, histogram) in histograms.iter().enumerate() {
            let ix = i * len;
            build_and_store_huffman_tree(
                &histogram.data[..len],
                alphabet_size,
                pool,
                &mut self.depths[ix..ix + len],
                &mut self.bits[ix..ix + len],
                writer,
            );
        }
    }

    /// Advance to the next block if the current one is used up, returning
    /// its type
    #[inline]
    fn next_block(&mut self, writer: &mut BitWriter) -> Option<usize> {
        if self.block_len != 0 {
            return None;
        }
        self.block_ix += 1;
        let block_type = self.block_types[self.block_ix] as usize;
        self.block_len = self.block_lengths[self.block_ix];
        self.split_code.store_block_switch(self.block_len, block_type, false, writer);
        Some(block_type)
    }

    /// Write `symbol` with the code of the current block type
    #[inline]
    pub fn store_symbol(&mut self, symbol: usize, writer: &mut BitWriter) {
        if let Some(block_type) = self.next_block(writer) {
            self.entropy_ix = block_type * self.histogram_length;
        }
        self.block_len -= 1;
        let ix = self.entropy_ix + symbol;
        writer.write_bits(self.depths[ix] as u32, self.bits[ix] as u64);
    }

    /// Write `symbol` with the code the context map assigns to `context`
    /// within the current block type
    #[inline]
    pub fn store_symbol_with_context(
        &mut self,
        symbol: usize,
        context: usize,
        context_map: &[u32],
        context_bits: u32,
        writer: &mut BitWriter,
    ) {
        if let Some(block_type) = self.next_block(writer) {
            self.entropy_ix = block_type << context_bits;
        }
        self.block_len -= 1;
        let histo_ix = context_map[self.entropy_ix + context] as usize;
        let ix = histo_ix * self.histogram_length + symbol;
        writer.write_bits(self.depths[ix] as u32, self.bits[ix] as u64);
    }
}

/// Context map in which every context of type `i` uses histogram `i`
pub fn store_trivial_context_map(
    num_types: usize,
    context_bits: u32,
    pool: &mut Vec<HuffmanTree>,
    writer: &mut BitWriter,
) {
    store_var_len_uint8(num_types - 1, writer);
    if num_types <= 1 {
        return;
    }
    let repeat_code = context_bits as usize - 1;
    let repeat_bits = (1u64 << repeat_code) - 1;
    let alphabet_size = num_types + repeat_code;
    let mut histogram = [0u32; MAX_CONTEXT_MAP_SYMBOLS];
    let mut depths = [0u8; MAX_CONTEXT_MAP_SYMBOLS];
    let mut bits = [0u16; MAX_CONTEXT_MAP_SYMBOLS];

    // RLEMAX
    writer.write_bits(1, 1);
    writer.write_bits(4, (repeat_code - 1) as u64);
    histogram[repeat_code] = num_types as u32;
    histogram[0] = 1;
    for h in &mut histogram[context_bits as usize..alphabet_size] {
        *h = 1;
    }
    build_and_store_huffman_tree(&histogram[..alphabet_size], alphabet_size, pool, &mut depths, &mut bits, writer);
    for i in 0..num_types {
        let code = if i == 0 { 0 } else { i + context_bits as usize - 1 };
        writer.write_bits(depths[code] as u32, bits[code] as u64);
        writer.write_bits(depths[repeat_code] as u32, bits[repeat_code] as u64);
        writer.write_bits(repeat_code as u32, repeat_bits);
    }
    // IMTF
    writer.write_bits(1, 1);
}

fn move_to_front_transform(input: &[u32]) -> Vec<u32> {
    let Some(&max_value) = input.iter().max() else {
        return Vec::new();
    };
    let mut mtf: Vec<u32> = (0..=max_value).collect();
    input
        .iter()
        .map(|&value| {
            let index = mtf.iter().position(|&v| v == value).unwrap_or(0);
            mtf[..=index].rotate_right(1);
            index as u32
        })
        .collect()
}

/// Replace runs of zeros with run-length prefix codes
///
/// Non-zero values are shifted up by the chosen prefix count. Each output
/// symbol packs the extra bits above [`SYMBOL_BITS`]. Returns the packed
/// symbols and the largest prefix used, at most `max_prefix`.
fn run_length_code_zeros(values: &[u32], max_prefix: u32) -> (Vec<u32>, u32) {
    let mut max_reps = 0u32;
    let mut i = 0;
    while i < values.len() {
        while i < values.len() && values[i] != 0 {
            i += 1;
        }
        let mut reps = 0u32;
        while i < values.len() && values[i] == 0 {
            reps += 1;
            i += 1;
        }
        max_reps = max_reps.max(reps);
    }
    let max_prefix = if max_reps > 0 { (31 - max_reps.leading_zeros()).min(max_prefix) } else { 0 };

    let mut out = Vec::with_capacity(values.len());
    let mut i = 0;
    while i < values.len() {
        if values[i] != 0 {
            out.push(values[i] + max_prefix);
            i += 1;
            continue;
        }
        let mut reps = values[i..].iter().take_while(|&&v| v == 0).count() as u32;
        i += reps as usize;
        while reps != 0 {
            if reps < (2 << max_prefix) {
                let prefix = 31 - reps.leading_zeros();
                let extra = reps - (1 << prefix);
                out.push(prefix + (extra << SYMBOL_BITS));
                break;
            }
            let extra = (1 << max_prefix) - 1;
            out.push(max_prefix + (extra << SYMBOL_BITS));
            reps -= (2 << max_prefix) - 1;
        }
    }
    (out, max_prefix)
}

/// Store a context map mapping to `num_clusters` histograms, using
/// move-to-front and zero run-length coding
pub fn encode_context_map(context_map: &[u32], num_clusters: usize, pool: &mut Vec<HuffmanTree>, writer: &mut BitWriter) {
    store_var_len_uint8(num_clusters - 1, writer);
    if num_clusters == 1 {
        return;
    }

    let mtf = move_to_front_transform(context_map);
    let (rle_symbols, max_prefix) = run_length_code_zeros(&mtf, MAX_RUN_LENGTH_PREFIX);
    let mut histogram = [0u32; MAX_CONTEXT_MAP_SYMBOLS];
    for &s in &rle_symbols {
        histogram[(s & SYMBOL_MASK) as usize] += 1;
    }

    let use_rle = max_prefix > 0;
    writer.write_bit(use_rle);
    if use_rle {
        writer.write_bits(4, (max_prefix - 1) as u64);
    }

    let alphabet_size = num_clusters + max_prefix as usize;
    let mut depths = [0u8; MAX_CONTEXT_MAP_SYMBOLS];
    let mut bits = [0u16; MAX_CONTEXT_MAP_SYMBOLS];
    build_and_store_huffman_tree(&histogram[..alphabet_size], alphabet_size, pool, &mut depths, &mut bits, writer);
    for &s in &rle_symbols {
        let symbol = s & SYMBOL_MASK;
        let extra = s >> SYMBOL_BITS;
        writer.write_bits(depths[symbol as usize] as u32, bits[symbol as usize] as u64);
        if symbol > 0 && symbol <= max_prefix {
            writer.write_bits(symbol, extra as u64);
        }
    }
    // IMTF
    writer.write_bits(1, 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_length_prefix_code() {
        assert_eq!(block_length_prefix_code(1), 0);
        assert_eq!(block_length_prefix_code(4), 0);
        assert_eq!(block_length_prefix_code(5), 1);
        assert_eq!(block_length_prefix_code(40), 6);
        assert_eq!(block_length_prefix_code(752), 19);
        assert_eq!(block_length_prefix_code(753), 20);
        assert_eq!(block_length_prefix_code(1 << 24), 25);
        for len in 1..20000u32 {
            let code = block_length_prefix_code(len);
            let (offset, nbits) = BLOCK_LENGTH_PREFIX_CODE[code];
            assert!(len >= offset && len - offset < 1 << nbits, "len {}", len);
        }
    }

    #[test]
    fn test_block_type_codes() {
        let mut calc = BlockTypeCodeCalculator::default();
        assert_eq!(calc.next_code(0), 0);
        assert_eq!(calc.next_code(1), 1);
        assert_eq!(calc.next_code(0), 0);
        assert_eq!(calc.next_code(5), 7);
        assert_eq!(calc.next_code(6), 1);
    }

    #[test]
    fn test_move_to_front() {
        assert_eq!(move_to_front_transform(&[1, 1, 0, 2, 2, 0]), vec![1, 0, 1, 2, 0, 1]);
        assert!(move_to_front_transform(&[]).is_empty());
    }

    #[test]
    fn test_run_length_code_zeros() {
        // runs of 1, 3 and 9 zeros
        let values = [0, 5, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let (out, max_prefix) = run_length_code_zeros(&values, MAX_RUN_LENGTH_PREFIX);
        assert_eq!(max_prefix, 3);
        let decoded: Vec<(u32, u32)> = out.iter().map(|&s| (s & SYMBOL_MASK, s >> SYMBOL_BITS)).collect();
        assert_eq!(decoded, vec![(0, 0), (8, 0), (1, 1), (8, 0), (3, 1)]);
    }

    #[test]
    fn test_run_length_prefix_is_capped() {
        let values = vec![0u32; 300];
        let (out, max_prefix) = run_length_code_zeros(&values, 6);
        assert_eq!(max_prefix, 6);
        let total: u32 = out.iter().map(|&s| (1 << (s & SYMBOL_MASK)) + (s >> SYMBOL_BITS)).sum();
        assert_eq!(total, 300);
    }
}
