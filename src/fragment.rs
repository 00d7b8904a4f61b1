//! Fragment compressors for qualities 0 and 1.
//!
//! Each fragment (one input block) is parsed on its own: references never
//! reach before the start of the fragment, and the hash table is reset for
//! every call. The fragment is emitted as a series of meta-blocks of at most
//! [`FRAGMENT_BLOCK_SIZE`] bytes. Quality 0 stores each of them with quickly
//! built depth-limited codes; quality 1 collects the commands first, skips
//! compression for literal-heavy blocks of high entropy and builds full codes.

use crate::bit_stream::{
    store_empty_last_meta_block, store_meta_block_fast, store_meta_block_trivial, store_uncompressed_meta_block,
};
use crate::bits::BitWriter;
use crate::command::{Command, DistanceParams};
use crate::constants::NUM_DISTANCE_SHORT_CODES;
use crate::entropy::bits_entropy;
use crate::hash::{find_match_length_with_limit, load_u32, load_u64, HASH_MUL64};

/// Largest meta-block a fragment compressor emits
pub const FRAGMENT_BLOCK_SIZE: usize = 1 << 17;

/// Bytes at the end of a block that are always emitted as literals
const INPUT_MARGIN_BYTES: usize = 16;

/// Blocks shorter than this are not searched for matches
const MIN_MATCHING_BLOCK_LEN: usize = 32;

const MIN_MATCH_LEN: usize = 4;

/// Only literal-heavy blocks with at most this fraction of match bytes are
/// checked for incompressibility
const MIN_LITERAL_RATIO: f64 = 0.98;

/// Stride of the literal sample used by the incompressibility check
const LITERAL_SAMPLE_RATE: usize = 43;

/// Greedy single-hash compressor for the two fastest qualities
pub struct FragmentCompressor {
    two_pass: bool,
    table: Vec<u32>,
    commands: Vec<Command>,
    dist: DistanceParams,
}

/// Meta-blocks written by one [`FragmentCompressor::compress`] call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FragmentBlocks {
    pub meta_blocks: u64,
    /// Blocks that fell back to raw storage
    pub uncompressed: u64,
}

impl FragmentCompressor {
    pub fn new(two_pass: bool) -> Self {
        Self { two_pass, table: Vec::new(), commands: Vec::new(), dist: DistanceParams::default() }
    }

    fn max_table_bits(&self) -> u32 {
        if self.two_pass {
            17
        } else {
            15
        }
    }

    /// Compress `input` into `writer`, matching at most `max_backward`
    /// bytes back
    pub fn compress(
        &mut self,
        input: &[u8],
        is_last: bool,
        max_backward: usize,
        writer: &mut BitWriter,
    ) -> FragmentBlocks {
        let mut blocks = FragmentBlocks::default();
        if input.is_empty() {
            if is_last {
                store_empty_last_meta_block(writer);
                blocks.meta_blocks = 1;
            }
            return blocks;
        }

        let mut table_bits = 8;
        while table_bits < self.max_table_bits() && (1usize << table_bits) < input.len() {
            table_bits += 1;
        }
        self.table.clear();
        self.table.resize(1 << table_bits, 0);
        let hash_len = if self.two_pass && table_bits > 15 { 6 } else { 5 };

        let mut last_distance = None;
        let mut block_start = 0;
        while block_start < input.len() {
            let block_end = (block_start + FRAGMENT_BLOCK_SIZE).min(input.len());
            let is_last_block = is_last && block_end == input.len();
            let saved_distance = last_distance;
            let num_literals =
                self.parse_block(input, block_start, block_end, table_bits, hash_len, max_backward, &mut last_distance);

            let block = &input[block_start..block_end];
            let mark = writer.bit_len();
            let compress = !self.two_pass || should_compress(block, num_literals);
            if compress {
                if self.two_pass {
                    store_meta_block_trivial(
                        input,
                        block_start,
                        block.len(),
                        usize::MAX,
                        is_last_block,
                        &self.dist,
                        &self.commands,
                        writer,
                    );
                } else {
                    store_meta_block_fast(
                        input,
                        block_start,
                        block.len(),
                        usize::MAX,
                        is_last_block,
                        &self.dist,
                        &self.commands,
                        writer,
                    );
                }
            }
            if !compress || writer.bit_len() - mark > 8 * block.len() + 32 {
                writer.rewind(mark);
                store_uncompressed_meta_block(is_last_block, input, block_start, usize::MAX, block.len(), writer);
                // the decoder never sees the distances of a raw block
                last_distance = saved_distance;
                blocks.uncompressed += 1;
            }
            blocks.meta_blocks += 1;
            block_start = block_end;
        }
        blocks
    }

    #[inline]
    fn hash(data: &[u8], at: usize, hash_len: u32, table_bits: u32) -> usize {
        let h = (load_u64(data, at) << (64 - 8 * hash_len)).wrapping_mul(HASH_MUL64);
        (h >> (64 - table_bits)) as usize
    }

    /// Greedy parse of `input[start..end]` into `self.commands`, returning
    /// the number of literals
    #[allow(clippy::too_many_arguments)]
    fn parse_block(
        &mut self,
        input: &[u8],
        start: usize,
        end: usize,
        table_bits: u32,
        hash_len: u32,
        max_backward: usize,
        last_distance: &mut Option<usize>,
    ) -> usize {
        self.commands.clear();
        let mut num_literals = 0;
        let mut next_emit = start;
        let mut ip = start;
        if end - start >= MIN_MATCHING_BLOCK_LEN {
            let ip_limit = end - INPUT_MARGIN_BYTES;
            let mut skip = 32usize;
            while ip < ip_limit {
                let key = Self::hash(input, ip, hash_len, table_bits);
                let candidate = self.table[key] as usize;
                self.table[key] = ip as u32;

                let word = load_u32(input, ip);
                let mut found = None;
                if let Some(d) = *last_distance {
                    if d <= ip && load_u32(input, ip - d) == word {
                        found = Some(d);
                    }
                }
                if found.is_none() && candidate < ip && ip - candidate <= max_backward && load_u32(input, candidate) == word
                {
                    found = Some(ip - candidate);
                }

                let Some(distance) = found else {
                    ip += skip >> 5;
                    skip += 1;
                    continue;
                };
                skip = 32;

                let matched = MIN_MATCH_LEN
                    + find_match_length_with_limit(
                        &input[ip - distance + MIN_MATCH_LEN..],
                        &input[ip + MIN_MATCH_LEN..],
                        end - ip - MIN_MATCH_LEN,
                    );
                let insert = ip - next_emit;
                let distance_code =
                    if *last_distance == Some(distance) { 0 } else { distance + NUM_DISTANCE_SHORT_CODES - 1 };
                self.commands.push(Command::new(&self.dist, insert, matched, 0, distance_code));
                num_literals += insert;
                *last_distance = Some(distance);

                ip += matched;
                next_emit = ip;
                // keep the table warm inside the copy
                if ip < ip_limit {
                    for p in [ip - 2, ip - 1] {
                        let key = Self::hash(input, p, hash_len, table_bits);
                        self.table[key] = p as u32;
                    }
                }
            }
        }
        if next_emit < end {
            self.commands.push(Command::insert_only(end - next_emit));
            num_literals += end - next_emit;
        }
        num_literals
    }
}

/// Whether a block with `num_literals` literals is worth entropy coding
///
/// Blocks that are nearly all literals are sampled; they are stored raw
/// when the literal entropy is close to eight bits per byte.
fn should_compress(input: &[u8], num_literals: usize) -> bool {
    let corpus_size = input.len() as f64;
    if (num_literals as f64) < MIN_LITERAL_RATIO * corpus_size {
        return true;
    }
    let mut literal_histo = [0u32; 256];
    for &b in input.iter().step_by(LITERAL_SAMPLE_RATE) {
        literal_histo[b as usize] += 1;
    }
    let max_total_bit_cost = corpus_size * 8.0 * MIN_LITERAL_RATIO / LITERAL_SAMPLE_RATE as f64;
    bits_entropy(&literal_histo) < max_total_bit_cost
}
