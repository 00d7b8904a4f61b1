//! Meta-block construction: block splitting, context maps and clustered
//! histograms for one run of commands.

pub mod builder;
pub mod greedy;
pub mod literal_context;
pub mod splitter;

pub use builder::{build_meta_block, optimize_histograms};
pub use greedy::build_meta_block_greedy;
pub use literal_context::{choose_context_mode, decide_over_literal_context_modeling, LiteralContextModel};
pub use splitter::split_block;

use crate::entropy::{HistogramCommand, HistogramDistance, HistogramLiteral};

/// Partition of one symbol stream into typed blocks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockSplit {
    pub num_types: usize,
    pub types: Vec<u8>,
    pub lengths: Vec<u32>,
}

impl BlockSplit {
    pub fn num_blocks(&self) -> usize {
        self.types.len()
    }

    pub fn clear(&mut self) {
        self.num_types = 0;
        self.types.clear();
        self.lengths.clear();
    }

    /// Single block covering `length` symbols
    pub(crate) fn single(length: usize) -> Self {
        Self { num_types: 1, types: vec![0], lengths: vec![length as u32] }
    }
}

/// Walks a [`BlockSplit`] one symbol at a time
pub struct BlockSplitIterator<'a> {
    split: &'a BlockSplit,
    idx: usize,
    pub block_type: usize,
    length: u32,
}

impl<'a> BlockSplitIterator<'a> {
    pub fn new(split: &'a BlockSplit) -> Self {
        let length = split.lengths.first().copied().unwrap_or(0);
        Self { split, idx: 0, block_type: 0, length }
    }

    /// Advance by one symbol, moving to the next block when the current one
    /// is exhausted
    #[inline]
    pub fn next_symbol(&mut self) {
        if self.length == 0 {
            self.idx += 1;
            self.block_type = self.split.types[self.idx] as usize;
            self.length = self.split.lengths[self.idx];
        }
        self.length -= 1;
    }
}

/// Everything the meta-block writer needs besides the commands
#[derive(Clone, Debug, Default)]
pub struct MetaBlockSplit {
    pub literal_split: BlockSplit,
    pub command_split: BlockSplit,
    pub distance_split: BlockSplit,
    /// 64 entries per literal block type; empty means one histogram per type
    pub literal_context_map: Vec<u32>,
    /// 4 entries per distance block type; empty means one histogram per type
    pub distance_context_map: Vec<u32>,
    pub literal_histograms: Vec<HistogramLiteral>,
    pub command_histograms: Vec<HistogramCommand>,
    pub distance_histograms: Vec<HistogramDistance>,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_split_iterator() {
        let split = BlockSplit { num_types: 2, types: vec![0, 1, 0], lengths: vec![2, 1, 3] };
        let mut it = BlockSplitIterator::new(&split);
        let mut seen = Vec::new();
        for _ in 0..6 {
            it.next_symbol();
            seen.push(it.block_type);
        }
        assert_eq!(seen, vec![0, 0, 1, 0, 0, 0]);
    }
}
