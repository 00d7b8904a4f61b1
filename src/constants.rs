/// Number of literal symbols
pub const NUM_LITERAL_SYMBOLS: usize = 256;

/// Number of insert-and-copy length symbols
pub const NUM_COMMAND_SYMBOLS: usize = 704;

/// Number of block length prefix codes
pub const NUM_BLOCK_LEN_SYMBOLS: usize = 26;

/// Block type codes: 0, 1 plus one per type
pub const MAX_BLOCK_TYPE_SYMBOLS: usize = 258;

/// Format limit on distinct block types per category
pub const MAX_NUMBER_OF_BLOCK_TYPES: usize = 256;

/// Distance symbols referencing the distance cache
pub const NUM_DISTANCE_SHORT_CODES: usize = 16;

pub const MAX_NPOSTFIX: u32 = 3;
pub const MAX_NDIRECT: u32 = 120;

/// Largest distance bits for the regular format
pub const MAX_DISTANCE_BITS: u32 = 24;

/// Largest distance bits for the large-window extension
pub const LARGE_MAX_DISTANCE_BITS: u32 = 62;

/// Largest distance representable with the large-window extension
pub const MAX_ALLOWED_DISTANCE: usize = 0x7FFF_FFFC;

/// Size of distance histograms (covers every symbol of NPOSTFIX=3, NDIRECT=120)
pub const NUM_HISTOGRAM_DISTANCE_SYMBOLS: usize = 544;

/// Code-length code alphabet size (lengths 0-15 plus repeat codes 16, 17)
pub const CODE_LENGTH_CODES: usize = 18;

/// Literal context modes
pub const LITERAL_CONTEXT_BITS: u32 = 6;
pub const DISTANCE_CONTEXT_BITS: u32 = 2;

/// Bytes at the end of the window the format reserves
pub const WINDOW_GAP: usize = 16;

pub const MIN_WINDOW_BITS: u32 = 10;
pub const MAX_WINDOW_BITS: u32 = 24;
pub const LARGE_MAX_WINDOW_BITS: u32 = 30;
pub const MIN_INPUT_BLOCK_BITS: u32 = 16;
pub const MAX_INPUT_BLOCK_BITS: u32 = 24;

pub const MIN_QUALITY: u32 = 0;
pub const MAX_QUALITY: u32 = 11;

/// Largest meta-block payload (MLEN is at most 24 bits)
pub const MAX_METABLOCK_LENGTH: usize = 1 << 24;

/// Initial contents of the distance cache
pub const INITIAL_DISTANCE_CACHE: [i32; 4] = [4, 11, 15, 16];

/// Order in which code-length code depths are stored
pub const CODE_LENGTH_CODE_ORDER: [usize; CODE_LENGTH_CODES] =
    [1, 2, 3, 4, 0, 5, 17, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15];
