pub mod rle;
pub mod tree;

pub use rle::{optimize_huffman_counts_for_rle, write_huffman_tree, CodeLengthRle};
pub use tree::{convert_bit_depths_to_symbols, create_huffman_tree, HuffmanTree};
