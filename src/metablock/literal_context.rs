//! Literal context selection: context mode for the iterative splitter and
//! static context maps for the greedy splitter.

use crate::context::{is_mostly_utf8, ContextLut, ContextMode, MIN_UTF8_RATIO, NUM_LITERAL_CONTEXTS};
use crate::entropy::shannon_entropy;
use crate::params::{EncoderParams, Quality};

/// Number of contexts of the largest static map
pub const MAX_STATIC_CONTEXTS: usize = 13;

/// Two contexts: ASCII vs. UTF8 lead byte
static SIMPLE_UTF8_MAP: [u32; NUM_LITERAL_CONTEXTS] = {
    let mut map = [0u32; NUM_LITERAL_CONTEXTS];
    map[2] = 1;
    map[3] = 1;
    map
};

/// Three contexts: ASCII, UTF8 lead byte, UTF8 continuation
static CONTINUATION_MAP: [u32; NUM_LITERAL_CONTEXTS] = {
    let mut map = [0u32; NUM_LITERAL_CONTEXTS];
    map[0] = 1;
    map[1] = 1;
    map[2] = 2;
    map[3] = 2;
    map
};

static COMPLEX_UTF8_MAP: [u32; NUM_LITERAL_CONTEXTS] = [
    11, 11, 12, 12, // special
    0, 0, 0, 0, // line feed
    1, 1, 9, 9, // space
    2, 2, 2, 2, // !
    1, 1, 1, 1, // "
    8, 3, 3, 3, // %
    1, 1, 1, 1, // ({[
    2, 2, 2, 2, // }])
    8, 4, 4, 4, // :;
    8, 7, 4, 4, // .
    8, 0, 0, 0, // >
    3, 3, 3, 3, // 0-9
    5, 5, 10, 5, // A-Z
    5, 5, 10, 5, //
    6, 6, 6, 6, // a-z
    6, 6, 6, 6, //
];

/// Literal contexts of a greedy meta-block: one histogram set, or a fixed
/// map from the 64 UTF8 contexts onto `num_contexts` groups
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiteralContextModel {
    pub num_contexts: usize,
    pub map: Option<&'static [u32; NUM_LITERAL_CONTEXTS]>,
}

impl Default for LiteralContextModel {
    fn default() -> Self {
        Self { num_contexts: 1, map: None }
    }
}

impl LiteralContextModel {
    pub fn is_trivial(&self) -> bool {
        self.num_contexts == 1
    }
}

/// Context mode for the iterative splitter: signed for data that does
/// not look like UTF8 text
pub fn choose_context_mode(params: &EncoderParams, data: &[u8], pos: usize, mask: usize, length: usize) -> ContextMode {
    if params.quality >= Quality::MIN_HQ_BLOCK_SPLITTING && !is_mostly_utf8_masked(data, pos, mask, length) {
        return ContextMode::Signed;
    }
    ContextMode::Utf8
}

pub(crate) fn is_mostly_utf8_masked(data: &[u8], pos: usize, mask: usize, length: usize) -> bool {
    let start = pos & mask;
    if start + length <= mask + 1 {
        is_mostly_utf8(&data[start..start + length], MIN_UTF8_RATIO)
    } else {
        let bytes: Vec<u8> = (0..length).map(|i| data[(pos + i) & mask]).collect();
        is_mostly_utf8(&bytes, MIN_UTF8_RATIO)
    }
}

/// Entropy per symbol of a population
fn entropy_bits(population: &[u32]) -> f64 {
    shannon_entropy(population).0
}

/// Pick among 1, 2 or 3 contexts from a histogram of (prev, cur) byte
/// classes (ASCII, continuation, lead)
fn choose_context_map(quality: u32, bigram_histo: &[u32; 9]) -> LiteralContextModel {
    let mut monogram_histo = [0u32; 3];
    let mut two_prefix_histo = [0u32; 6];
    for (i, &count) in bigram_histo.iter().enumerate() {
        monogram_histo[i % 3] += count;
        two_prefix_histo[i % 6] += count;
    }
    let total: u32 = monogram_histo.iter().sum();
    if total == 0 {
        return LiteralContextModel::default();
    }
    let scale = 1.0 / total as f64;
    let entropy1 = entropy_bits(&monogram_histo) * scale;
    let entropy2 = (entropy_bits(&two_prefix_histo[..3]) + entropy_bits(&two_prefix_histo[3..])) * scale;
    let mut entropy3 = bigram_histo.chunks(3).map(entropy_bits).sum::<f64>() * scale;
    if quality < Quality::MIN_HQ_CONTEXT_MODELING {
        // three contexts decode slower; not worth it at lower qualities
        entropy3 = entropy1 * 10.0;
    }

    if entropy1 - entropy2 < 0.2 && entropy1 - entropy3 < 0.2 {
        LiteralContextModel::default()
    } else if entropy2 - entropy3 < 0.02 {
        LiteralContextModel { num_contexts: 2, map: Some(&SIMPLE_UTF8_MAP) }
    } else {
        LiteralContextModel { num_contexts: 3, map: Some(&CONTINUATION_MAP) }
    }
}

/// 13-context map for long text, tried on 64-byte strides every 4 KiB
fn complex_static_context_map(
    input: &[u8],
    mut start_pos: usize,
    length: usize,
    mask: usize,
    size_hint: usize,
) -> Option<LiteralContextModel> {
    if size_hint < (1 << 20) {
        return None;
    }
    let end_pos = start_pos + length;
    let lut = ContextLut::new(ContextMode::Utf8);
    let mut combined_histo = [0u32; 32];
    let mut context_histo = [[0u32; 32]; MAX_STATIC_CONTEXTS];
    let mut total = 0u32;
    while start_pos + 64 <= end_pos {
        let mut prev2 = input[start_pos & mask];
        let mut prev1 = input[(start_pos + 1) & mask];
        for pos in start_pos + 2..start_pos + 64 {
            let literal = input[pos & mask];
            let context = COMPLEX_UTF8_MAP[lut.context(prev1, prev2)] as usize;
            total += 1;
            combined_histo[(literal >> 3) as usize] += 1;
            context_histo[context][(literal >> 3) as usize] += 1;
            prev2 = prev1;
            prev1 = literal;
        }
        start_pos += 4096;
    }
    if total == 0 {
        return None;
    }
    let scale = 1.0 / total as f64;
    let entropy1 = entropy_bits(&combined_histo) * scale;
    let entropy2 = context_histo.iter().map(|h| entropy_bits(h)).sum::<f64>() * scale;
    // poorly compressible input, or less than 0.2 bits saved per symbol
    if entropy2 > 3.0 || entropy1 - entropy2 < 0.2 {
        None
    } else {
        Some(LiteralContextModel { num_contexts: MAX_STATIC_CONTEXTS, map: Some(&COMPLEX_UTF8_MAP) })
    }
}

/// Static literal context model for a greedy meta-block
pub fn decide_over_literal_context_modeling(
    input: &[u8],
    mut start_pos: usize,
    length: usize,
    mask: usize,
    quality: u32,
    size_hint: usize,
) -> LiteralContextModel {
    if quality < Quality::MIN_CONTEXT_MODELING || length < 64 {
        return LiteralContextModel::default();
    }
    if let Some(model) = complex_static_context_map(input, start_pos, length, mask, size_hint) {
        return model;
    }
    const CLASS: [usize; 4] = [0, 0, 1, 2];
    let end_pos = start_pos + length;
    let mut bigram_prefix_histo = [0u32; 9];
    while start_pos + 64 <= end_pos {
        let mut prev = CLASS[(input[start_pos & mask] >> 6) as usize] * 3;
        for pos in start_pos + 1..start_pos + 64 {
            let class = CLASS[(input[pos & mask] >> 6) as usize];
            bigram_prefix_histo[prev + class] += 1;
            prev = class * 3;
        }
        start_pos += 4096;
    }
    choose_context_map(quality, &bigram_prefix_histo)
}
