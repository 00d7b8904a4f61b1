//! One-pass greedy block splitting for the middle qualities.
//!
//! Symbols are accumulated into a block until it reaches the target size;
//! the block then either starts a new block type, joins the second-to-last
//! type, or is merged into the last one, whichever the entropy estimate
//! favours.

use super::{BlockSplit, LiteralContextModel, MetaBlockSplit};
use crate::command::{Command, DistanceParams};
use crate::constants::{MAX_NUMBER_OF_BLOCK_TYPES, NUM_COMMAND_SYMBOLS, NUM_HISTOGRAM_DISTANCE_SYMBOLS, NUM_LITERAL_SYMBOLS};
use crate::context::{ContextLut, NUM_LITERAL_CONTEXTS};
use crate::entropy::{bits_entropy, Histogram};

/// Entropy gain (bits) below which a block merges back into the
/// second-to-last type instead of the last
const SECOND_LAST_MERGE_MARGIN: f64 = 20.0;

/// Greedy splitter over `num_contexts` parallel histograms per block type
struct BlockSplitter<const N: usize> {
    alphabet_size: usize,
    num_contexts: usize,
    max_block_types: usize,
    min_block_size: usize,
    split_threshold: f64,
    split: BlockSplit,
    histograms: Vec<Histogram<N>>,
    target_block_size: usize,
    block_size: usize,
    curr_histogram_ix: usize,
    last_histogram_ix: [usize; 2],
    /// Per context: entropy of the last and second-to-last type
    last_entropy: Vec<f64>,
    merge_last_count: usize,
}

impl<const N: usize> BlockSplitter<N> {
    fn new(alphabet_size: usize, num_contexts: usize, min_block_size: usize, split_threshold: f64, num_symbols: usize) -> Self {
        let max_block_types = MAX_NUMBER_OF_BLOCK_TYPES / num_contexts;
        let max_num_blocks = num_symbols / min_block_size + 1;
        let max_num_types = max_num_blocks.min(max_block_types + 1);
        let mut split = BlockSplit::default();
        split.types.reserve(max_num_blocks);
        split.lengths.reserve(max_num_blocks);
        Self {
            alphabet_size: alphabet_size.min(N),
            num_contexts,
            max_block_types,
            min_block_size,
            split_threshold,
            split,
            histograms: vec![Histogram::new(); max_num_types * num_contexts],
            target_block_size: min_block_size,
            block_size: 0,
            curr_histogram_ix: 0,
            last_histogram_ix: [0, 0],
            last_entropy: vec![0.0; 2 * num_contexts],
            merge_last_count: 0,
        }
    }

    #[inline]
    fn entropy(&self, histogram: &Histogram<N>) -> f64 {
        bits_entropy(&histogram.data[..self.alphabet_size])
    }

    #[inline]
    fn add_symbol(&mut self, symbol: usize, context: usize) {
        self.histograms[self.curr_histogram_ix + context].add(symbol);
        self.block_size += 1;
        if self.block_size == self.target_block_size {
            self.finish_block(false);
        }
    }

    /// Make the histograms of the next block type available and empty
    fn open_next_histograms(&mut self) {
        let end = self.curr_histogram_ix + self.num_contexts;
        if self.histograms.len() < end {
            self.histograms.resize(end, Histogram::new());
        }
        self.histograms[self.curr_histogram_ix..end].iter_mut().for_each(Histogram::clear);
    }

    fn finish_block(&mut self, is_final: bool) {
        let num_contexts = self.num_contexts;
        // The final block keeps its real length; every other block reached
        // its target, which is at least the minimum.
        let block_len = self.block_size;
        if !is_final {
            self.block_size = self.block_size.max(self.min_block_size);
        }

        if self.split.num_blocks() == 0 {
            self.split.lengths.push(block_len as u32);
            self.split.types.push(0);
            for i in 0..num_contexts {
                let e = self.entropy(&self.histograms[i]);
                self.last_entropy[i] = e;
                self.last_entropy[num_contexts + i] = e;
            }
            self.split.num_types += 1;
            self.curr_histogram_ix += num_contexts;
            self.open_next_histograms();
            self.block_size = 0;
        } else if self.block_size > 0 {
            let mut entropy = vec![0.0; num_contexts];
            let mut combined = Vec::with_capacity(2 * num_contexts);
            let mut combined_entropy = vec![0.0; 2 * num_contexts];
            let mut diff = [0.0f64; 2];
            for j in 0..2 {
                for i in 0..num_contexts {
                    let mut histo = self.histograms[self.curr_histogram_ix + i].clone();
                    histo.add_histogram(&self.histograms[self.last_histogram_ix[j] + i]);
                    combined.push(histo);
                }
            }
            for i in 0..num_contexts {
                entropy[i] = self.entropy(&self.histograms[self.curr_histogram_ix + i]);
                for j in 0..2 {
                    let jx = j * num_contexts + i;
                    combined_entropy[jx] = self.entropy(&combined[jx]);
                    diff[j] += combined_entropy[jx] - entropy[i] - self.last_entropy[jx];
                }
            }

            if self.split.num_types < self.max_block_types
                && diff[0] > self.split_threshold
                && diff[1] > self.split_threshold
            {
                // New block type
                self.split.lengths.push(block_len as u32);
                self.split.types.push(self.split.num_types as u8);
                self.last_histogram_ix[1] = self.last_histogram_ix[0];
                self.last_histogram_ix[0] = self.split.num_types * num_contexts;
                for i in 0..num_contexts {
                    self.last_entropy[num_contexts + i] = self.last_entropy[i];
                    self.last_entropy[i] = entropy[i];
                }
                self.split.num_types += 1;
                self.curr_histogram_ix += num_contexts;
                self.open_next_histograms();
                self.target_block_size = self.min_block_size;
                self.merge_last_count = 0;
            } else if diff[1] < diff[0] - SECOND_LAST_MERGE_MARGIN {
                // Same type as the second-to-last block
                let n = self.split.num_blocks();
                self.split.lengths.push(block_len as u32);
                self.split.types.push(self.split.types[n - 2]);
                self.last_histogram_ix.swap(0, 1);
                for (i, histo) in combined.drain(num_contexts..).enumerate() {
                    self.histograms[self.last_histogram_ix[0] + i] = histo;
                    self.last_entropy[num_contexts + i] = self.last_entropy[i];
                    self.last_entropy[i] = combined_entropy[num_contexts + i];
                    self.histograms[self.curr_histogram_ix + i].clear();
                }
                self.target_block_size = self.min_block_size;
                self.merge_last_count = 0;
            } else {
                // Extend the last block
                if let Some(last) = self.split.lengths.last_mut() {
                    *last += block_len as u32;
                }
                for (i, histo) in combined.drain(..num_contexts).enumerate() {
                    self.histograms[self.last_histogram_ix[0] + i] = histo;
                    self.last_entropy[i] = combined_entropy[i];
                    if self.split.num_types == 1 {
                        self.last_entropy[num_contexts + i] = self.last_entropy[i];
                    }
                    self.histograms[self.curr_histogram_ix + i].clear();
                }
                self.merge_last_count += 1;
                if self.merge_last_count > 1 {
                    self.target_block_size += self.min_block_size;
                }
            }
            self.block_size = 0;
        }

        if is_final {
            self.histograms.truncate(self.split.num_types * num_contexts);
        }
    }

    fn finish(mut self) -> (BlockSplit, Vec<Histogram<N>>) {
        self.finish_block(true);
        (self.split, self.histograms)
    }
}

/// Expand a static context map into one 64-entry row per block type
fn map_static_contexts(num_types: usize, model: &LiteralContextModel, static_map: &[u32; NUM_LITERAL_CONTEXTS]) -> Vec<u32> {
    let mut map = vec![0u32; num_types * NUM_LITERAL_CONTEXTS];
    for (i, row) in map.chunks_exact_mut(NUM_LITERAL_CONTEXTS).enumerate() {
        let offset = (i * model.num_contexts) as u32;
        for (slot, &ctx) in row.iter_mut().zip(static_map) {
            *slot = offset + ctx;
        }
    }
    map
}

/// Split literals, commands and distances of one meta-block greedily
///
/// With a static context model the literal histograms are indexed by
/// (block type, static context) and the context map is filled in.
#[allow(clippy::too_many_arguments)]
pub fn build_meta_block_greedy(
    ringbuffer: &[u8],
    mut pos: usize,
    mask: usize,
    mut prev_byte: u8,
    mut prev_byte2: u8,
    literal_lut: &ContextLut,
    model: &LiteralContextModel,
    dist: &DistanceParams,
    commands: &[Command],
) -> MetaBlockSplit {
    let num_literals: usize = commands.iter().map(|c| c.insert_len as usize).sum();
    let static_map = model.map.filter(|_| model.num_contexts > 1);
    let num_contexts = if static_map.is_some() { model.num_contexts } else { 1 };

    let mut lit_blocks = BlockSplitter::<NUM_LITERAL_SYMBOLS>::new(NUM_LITERAL_SYMBOLS, num_contexts, 512, 400.0, num_literals);
    let mut cmd_blocks =
        BlockSplitter::<NUM_COMMAND_SYMBOLS>::new(NUM_COMMAND_SYMBOLS, 1, 1024, 500.0, commands.len());
    let mut dist_blocks = BlockSplitter::<NUM_HISTOGRAM_DISTANCE_SYMBOLS>::new(
        dist.alphabet_size as usize,
        1,
        512,
        100.0,
        commands.len(),
    );

    for cmd in commands {
        cmd_blocks.add_symbol(cmd.cmd_prefix as usize, 0);
        for _ in 0..cmd.insert_len {
            let literal = ringbuffer[pos & mask];
            let context = match static_map {
                Some(map) => map[literal_lut.context(prev_byte, prev_byte2)] as usize,
                None => 0,
            };
            lit_blocks.add_symbol(literal as usize, context);
            prev_byte2 = prev_byte;
            prev_byte = literal;
            pos += 1;
        }
        let copy_len = cmd.copy_len() as usize;
        pos += copy_len;
        if copy_len != 0 {
            prev_byte2 = ringbuffer[(pos - 2) & mask];
            prev_byte = ringbuffer[(pos - 1) & mask];
            if cmd.cmd_prefix >= 128 {
                dist_blocks.add_symbol(cmd.distance_symbol() as usize, 0);
            }
        }
    }

    let (literal_split, literal_histograms) = lit_blocks.finish();
    let (command_split, command_histograms) = cmd_blocks.finish();
    let (distance_split, distance_histograms) = dist_blocks.finish();

    let literal_context_map = match static_map {
        Some(map) => map_static_contexts(literal_split.num_types, model, map),
        None => Vec::new(),
    };

    MetaBlockSplit {
        literal_split,
        command_split,
        distance_split,
        literal_context_map,
        distance_context_map: Vec::new(),
        literal_histograms,
        command_histograms,
        distance_histograms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextMode;
    use crate::metablock::test_util::periodic_commands;

    fn covered(split: &BlockSplit) -> usize {
        split.lengths.iter().map(|&l| l as usize).sum()
    }

    fn alternating_data(len: usize) -> Vec<u8> {
        // Alternate between a lower-case text region and a binary region
        let mut data = Vec::with_capacity(len);
        let mut seed = 12345u32;
        while data.len() < len {
            for _ in 0..4096 {
                data.push(b'a' + (data.len() % 7) as u8);
            }
            for _ in 0..4096 {
                seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
                data.push((seed >> 16) as u8);
            }
        }
        data.truncate(len);
        data
    }

    #[test]
    fn test_literal_only_stream() {
        let data = alternating_data(1 << 16);
        let cmds = vec![Command::insert_only(data.len())];
        let lut = ContextLut::new(ContextMode::Utf8);
        let mb = build_meta_block_greedy(
            &data,
            0,
            usize::MAX,
            0,
            0,
            &lut,
            &LiteralContextModel::default(),
            &DistanceParams::default(),
            &cmds,
        );
        assert_eq!(covered(&mb.literal_split), data.len());
        assert!(mb.literal_split.num_types >= 2, "{}", mb.literal_split.num_types);
        assert_eq!(mb.literal_histograms.len(), mb.literal_split.num_types);
        assert!(mb.literal_context_map.is_empty());
        assert_eq!(covered(&mb.command_split), 1);
        assert_eq!(mb.command_histograms.len(), 1);
        let total: usize = mb.literal_histograms.iter().map(|h| h.total_count).sum();
        assert_eq!(total, data.len());
    }

    #[test]
    fn test_commands_and_distances_are_covered() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let cmds = periodic_commands(data.len(), 40, 60);
        let lut = ContextLut::new(ContextMode::Utf8);
        let mb = build_meta_block_greedy(
            &data,
            0,
            usize::MAX,
            0,
            0,
            &lut,
            &LiteralContextModel::default(),
            &DistanceParams::default(),
            &cmds,
        );
        let num_literals: usize = cmds.iter().map(|c| c.insert_len as usize).sum();
        let num_distances = cmds.iter().filter(|c| c.copy_len() != 0 && c.cmd_prefix >= 128).count();
        assert_eq!(covered(&mb.literal_split), num_literals);
        assert_eq!(covered(&mb.command_split), cmds.len());
        assert_eq!(covered(&mb.distance_split), num_distances);
        for split in [&mb.literal_split, &mb.command_split, &mb.distance_split] {
            assert!(split.num_types <= MAX_NUMBER_OF_BLOCK_TYPES);
            assert!(split.types.iter().all(|&t| (t as usize) < split.num_types));
        }
    }

    #[test]
    fn test_static_context_map_layout() {
        let text = "Привет, мир! Hello world. Ещё немного текста. ".repeat(800);
        let data = text.as_bytes();
        let cmds = vec![Command::insert_only(data.len())];
        let lut = ContextLut::new(ContextMode::Utf8);
        let model = crate::metablock::decide_over_literal_context_modeling(data, 0, data.len(), usize::MAX, 9, 0);
        assert!(!model.is_trivial());
        let mb = build_meta_block_greedy(
            data,
            0,
            usize::MAX,
            0,
            0,
            &lut,
            &model,
            &DistanceParams::default(),
            &cmds,
        );
        let num_types = mb.literal_split.num_types;
        assert_eq!(mb.literal_context_map.len(), num_types * NUM_LITERAL_CONTEXTS);
        assert_eq!(mb.literal_histograms.len(), num_types * model.num_contexts);
        assert!(mb.literal_context_map.iter().all(|&c| (c as usize) < mb.literal_histograms.len()));
        assert_eq!(covered(&mb.literal_split), data.len());
    }
}
