//! Encoder configuration and the quality thresholds that drive it.

use crate::command::DistanceParams;
use crate::constants::{
    LARGE_MAX_WINDOW_BITS, MAX_INPUT_BLOCK_BITS, MAX_NDIRECT, MAX_NPOSTFIX, MAX_QUALITY, MAX_WINDOW_BITS,
    MIN_INPUT_BLOCK_BITS, MIN_WINDOW_BITS, WINDOW_GAP,
};
use crate::error::{Error, Result};
use crate::hash::HasherParams;

/// Quality levels at which encoder features switch on
pub struct Quality;

impl Quality {
    pub const FAST_ONE_PASS: u32 = 0;
    pub const FAST_TWO_PASS: u32 = 1;
    pub const ZOPFLIFICATION: u32 = 10;
    pub const HQ_ZOPFLIFICATION: u32 = 11;
    /// Highest quality storing meta-blocks with fast static/quick codes
    pub const MAX_STATIC_ENTROPY_CODES: u32 = 2;
    /// Lowest quality with block splitting (below it a single trivial code)
    pub const MIN_BLOCK_SPLIT: u32 = 4;
    pub const MIN_OPTIMIZE_HISTOGRAMS: u32 = 4;
    pub const MIN_NONZERO_DISTANCE_PARAMS: u32 = 4;
    pub const MIN_CONTEXT_MODELING: u32 = 5;
    pub const MIN_HQ_CONTEXT_MODELING: u32 = 7;
    pub const MIN_HQ_BLOCK_SPLITTING: u32 = 10;
}

/// Hint about the input, used to tune distance coding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EncoderMode {
    #[default]
    Generic,
    /// UTF-8 text
    Text,
    /// WOFF 2.0 font data
    Font,
}

/// Configuration for one compression stream
#[derive(Clone, Debug)]
pub struct EncoderParams {
    /// Input hint
    pub mode: EncoderMode,
    /// Quality (0-11), higher is slower and denser
    pub quality: u32,
    /// Base-2 logarithm of the sliding window size
    pub lgwin: u32,
    /// Base-2 logarithm of the input block size (0 = derived from quality)
    pub lgblock: u32,
    /// Expected total input size (0 = unknown)
    pub size_hint: usize,
    /// Use one literal histogram per block type
    pub disable_literal_context_modeling: bool,
    /// Allow windows up to 1 GiB (non-standard stream)
    pub large_window: bool,
    pub(crate) hasher: HasherParams,
    pub(crate) dist: DistanceParams,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            mode: EncoderMode::Generic,
            quality: MAX_QUALITY,
            lgwin: 22,
            lgblock: 0,
            size_hint: 0,
            disable_literal_context_modeling: false,
            large_window: false,
            hasher: HasherParams::default(),
            dist: DistanceParams::default(),
        }
    }
}

impl EncoderParams {
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_window_bits(mut self, lgwin: u32) -> Self {
        self.lgwin = lgwin;
        self
    }

    pub fn with_block_bits(mut self, lgblock: u32) -> Self {
        self.lgblock = lgblock;
        self
    }

    pub fn with_mode(mut self, mode: EncoderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_size_hint(mut self, size_hint: usize) -> Self {
        self.size_hint = size_hint;
        self
    }

    pub fn with_large_window(mut self, large_window: bool) -> Self {
        self.large_window = large_window;
        self
    }

    pub fn with_literal_context_modeling(mut self, enabled: bool) -> Self {
        self.disable_literal_context_modeling = !enabled;
        self
    }

    /// Reject values outside the ranges the format supports
    pub fn validate(&self) -> Result<()> {
        if self.quality > MAX_QUALITY {
            return Err(Error::InvalidParameter { name: "quality", value: self.quality as i64 });
        }
        let max_lgwin = if self.large_window { LARGE_MAX_WINDOW_BITS } else { MAX_WINDOW_BITS };
        if !(MIN_WINDOW_BITS..=max_lgwin).contains(&self.lgwin) {
            return Err(Error::InvalidParameter { name: "lgwin", value: self.lgwin as i64 });
        }
        if self.lgblock != 0 && !(MIN_INPUT_BLOCK_BITS..=MAX_INPUT_BLOCK_BITS).contains(&self.lgblock) {
            return Err(Error::InvalidParameter { name: "lgblock", value: self.lgblock as i64 });
        }
        Ok(())
    }

    /// Clamp quality and window into range; the two fastest qualities
    /// never use the large window
    pub(crate) fn sanitize(&mut self) {
        self.quality = self.quality.min(MAX_QUALITY);
        if self.quality <= Quality::FAST_TWO_PASS {
            self.large_window = false;
        }
        let max_lgwin = if self.large_window { LARGE_MAX_WINDOW_BITS } else { MAX_WINDOW_BITS };
        self.lgwin = self.lgwin.clamp(MIN_WINDOW_BITS, max_lgwin);
    }

    /// Derive the input block size from quality and window
    pub(crate) fn compute_lgblock(&mut self) {
        let q = self.quality;
        self.lgblock = if q == Quality::FAST_ONE_PASS || q == Quality::FAST_TWO_PASS {
            self.lgwin
        } else if q < Quality::MIN_BLOCK_SPLIT {
            14
        } else if self.lgblock == 0 {
            let mut lgblock = 16;
            if q >= 9 && self.lgwin > lgblock {
                lgblock = self.lgwin.min(18);
            }
            lgblock
        } else {
            self.lgblock.clamp(MIN_INPUT_BLOCK_BITS, MAX_INPUT_BLOCK_BITS)
        };
    }

    /// Pick NPOSTFIX / NDIRECT; fonts benefit from a postfix bit and
    /// direct codes
    pub(crate) fn choose_distance_params(&mut self) {
        let (mut postfix, mut ndirect) = (0u32, 0u32);
        if self.quality >= Quality::MIN_NONZERO_DISTANCE_PARAMS && self.mode == EncoderMode::Font {
            postfix = 1;
            ndirect = 12;
        }
        let ndirect_msb = (ndirect >> postfix) & 0x0F;
        if postfix > MAX_NPOSTFIX || ndirect > MAX_NDIRECT || (ndirect_msb << postfix) != ndirect {
            postfix = 0;
            ndirect = 0;
        }
        self.dist = DistanceParams::new(postfix, ndirect, self.large_window);
    }

    pub fn distance_params(&self) -> &DistanceParams {
        &self.dist
    }

    /// Ring buffer size bits: the window or one input block, plus one
    pub(crate) fn ring_buffer_bits(&self) -> u32 {
        1 + self.lgwin.max(self.lgblock)
    }

    /// Largest meta-block the encoder assembles
    pub(crate) fn max_metablock_size(&self) -> usize {
        1 << self.ring_buffer_bits().min(MAX_INPUT_BLOCK_BITS)
    }

    /// Longest run of literals after which match search turns sparse
    pub(crate) fn literal_spree_length_for_sparse_search(&self) -> usize {
        if self.quality < 9 {
            64
        } else {
            512
        }
    }

    pub(crate) fn max_zopfli_len(&self) -> usize {
        if self.quality <= 10 {
            150
        } else {
            325
        }
    }

    pub(crate) fn max_zopfli_candidates(&self) -> usize {
        if self.quality <= 10 {
            1
        } else {
            5
        }
    }
}

/// Farthest distance an in-window match may reach
#[inline]
pub fn max_backward_limit(lgwin: u32) -> usize {
    (1usize << lgwin) - WINDOW_GAP
}
