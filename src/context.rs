//! Literal context modeling (RFC 7932 section 7.1).

/// How the two previous bytes select a literal context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ContextMode {
    Lsb6 = 0,
    Msb6 = 1,
    #[default]
    Utf8 = 2,
    Signed = 3,
}

/// Number of literal contexts per block type
pub const NUM_LITERAL_CONTEXTS: usize = 64;

/// Number of distance contexts per block type
pub const NUM_DISTANCE_CONTEXTS: usize = 4;

/// UTF8 mode, contribution of the last byte
const UTF8_LUT0: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 4, 4, 0, 0, 4, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    8, 12, 16, 12, 12, 20, 12, 16, 24, 28, 12, 12, 32, 12, 36, 12, // punctuation
    44, 44, 44, 44, 44, 44, 44, 44, 44, 44, 32, 32, 24, 40, 28, 12, // digits
    12, 48, 52, 52, 52, 48, 52, 52, 52, 48, 52, 52, 52, 52, 52, 48, // upper case
    52, 52, 52, 52, 52, 48, 52, 52, 52, 52, 52, 24, 12, 28, 12, 12, //
    12, 56, 60, 60, 60, 56, 60, 60, 60, 56, 60, 60, 60, 60, 60, 56, // lower case
    60, 60, 60, 60, 60, 56, 60, 60, 60, 60, 60, 24, 12, 28, 12, 0, //
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, // continuation bytes
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, //
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, //
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, //
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, // lead bytes
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, //
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, //
    2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, //
];

/// UTF8 mode, contribution of the second-to-last byte
const UTF8_LUT1: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, //
    1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, //
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, //
    1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, //
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 1, 1, 1, 1, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, //
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, //
];

/// Signed mode bucket of a byte: 0, 1-15, 16-63, 64-127, 128-191,
/// 192-239, 240-254, 255
const fn signed_bucket(b: u8) -> u8 {
    match b {
        0 => 0,
        1..=15 => 1,
        16..=63 => 2,
        64..=127 => 3,
        128..=191 => 4,
        192..=239 => 5,
        240..=254 => 6,
        255 => 7,
    }
}

/// Per-mode lookup: `lut[p1] | lut[256 + p2]` is the context
#[derive(Clone)]
pub struct ContextLut {
    table: [u8; 512],
}

impl ContextLut {
    pub fn new(mode: ContextMode) -> Self {
        let mut table = [0u8; 512];
        for i in 0..256usize {
            let b = i as u8;
            let (first, second) = match mode {
                ContextMode::Lsb6 => (b & 0x3F, 0),
                ContextMode::Msb6 => (b >> 2, 0),
                ContextMode::Utf8 => (UTF8_LUT0[i], UTF8_LUT1[i]),
                ContextMode::Signed => (signed_bucket(b) << 3, signed_bucket(b)),
            };
            table[i] = first;
            table[256 + i] = second;
        }
        Self { table }
    }

    /// Context id (0-63) of the literal following `p1` (last byte) and
    /// `p2` (byte before it)
    #[inline]
    pub fn context(&self, p1: u8, p2: u8) -> usize {
        (self.table[p1 as usize] | self.table[256 + p2 as usize]) as usize
    }
}

impl std::fmt::Debug for ContextLut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLut").finish_non_exhaustive()
    }
}

/// Length of the UTF8 sequence starting at `data[0]`, returning
/// `(code_point, length)`; invalid sequences count as one byte with
/// code point 0x110000
fn parse_as_utf8(data: &[u8]) -> (u32, usize) {
    let b0 = data[0] as u32;
    if b0 & 0x80 == 0 && b0 > 0 {
        return (b0, 1);
    }
    if data.len() > 1 && b0 & 0xE0 == 0xC0 && data[1] & 0xC0 == 0x80 {
        let symbol = ((b0 & 0x1F) << 6) | (data[1] as u32 & 0x3F);
        if symbol > 0x7F {
            return (symbol, 2);
        }
    }
    if data.len() > 2 && b0 & 0xF0 == 0xE0 && data[1] & 0xC0 == 0x80 && data[2] & 0xC0 == 0x80 {
        let symbol = ((b0 & 0x0F) << 12) | ((data[1] as u32 & 0x3F) << 6) | (data[2] as u32 & 0x3F);
        if symbol > 0x7FF {
            return (symbol, 3);
        }
    }
    if data.len() > 3
        && b0 & 0xF8 == 0xF0
        && data[1] & 0xC0 == 0x80
        && data[2] & 0xC0 == 0x80
        && data[3] & 0xC0 == 0x80
    {
        let symbol = ((b0 & 0x07) << 18)
            | ((data[1] as u32 & 0x3F) << 12)
            | ((data[2] as u32 & 0x3F) << 6)
            | (data[3] as u32 & 0x3F);
        if symbol > 0xFFFF && symbol <= 0x10FFFF {
            return (symbol, 4);
        }
    }
    (0x110000 | b0, 1)
}

/// Minimum share of bytes in valid UTF8 sequences for text treatment
pub const MIN_UTF8_RATIO: f64 = 0.75;

/// Whether at least `min_fraction` of `data` parses as UTF8
pub fn is_mostly_utf8(data: &[u8], min_fraction: f64) -> bool {
    let mut size_utf8 = 0usize;
    let mut i = 0usize;
    while i < data.len() {
        let (symbol, bytes_read) = parse_as_utf8(&data[i..]);
        i += bytes_read;
        if symbol < 0x110000 {
            size_utf8 += bytes_read;
        }
    }
    size_utf8 as f64 > min_fraction * data.len() as f64
}
