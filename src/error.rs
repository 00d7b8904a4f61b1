use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Parameter errors
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: i64 },

    // Stream state errors
    #[error("Stream already finished, no more input accepted")]
    StreamFinished,

    #[error("Metadata block too large: {size} bytes exceeds maximum {max}")]
    MetadataTooLarge { size: usize, max: usize },

    #[error("Metadata block in progress: expected {expected} more bytes, got {found}")]
    MetadataPending { expected: u32, found: usize },

    // Decompression errors (CLI round trip)
    #[error("Corrupt Brotli stream: {0}")]
    CorruptStream(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidInput, other),
        }
    }
}
