//! Brotli (RFC 7932) compressor.
//!
//! The pipeline runs hash-based match finding ([`hash`]), backward-reference
//! selection ([`backward`]), block splitting and histogram clustering
//! ([`metablock`], [`entropy`]), Huffman code construction ([`huffman`]) and
//! bitstream assembly ([`bit_stream`]). [`Encoder`] drives it incrementally;
//! [`BrotliWriter`] and [`compress`] are the convenient entry points.

pub mod backward;
pub mod bit_stream;
pub mod bits;
pub mod command;
pub mod constants;
pub mod context;
pub mod dictionary;
pub mod encoder;
pub mod entropy;
pub mod error;
pub mod fragment;
pub mod hash;
pub mod huffman;
pub mod metablock;
pub mod params;

pub use encoder::{compress, wrap_position, BrotliWriter, Encoder, EncoderStats, StreamState};
pub use error::{Error, Result};
pub use params::{EncoderMode, EncoderParams, Quality};
