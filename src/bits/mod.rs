pub mod writer;

pub use writer::BitWriter;
