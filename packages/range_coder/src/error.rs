use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Faults reported by the range encoder and decoder.
///
/// Both coders keep the first fault they hit and report it through
/// `status()`; a stream that recorded a fault must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Range coder buffer exhausted: {storage} bytes available")]
    BufferFull { storage: usize },

    #[error("Cannot patch {nbits} initial bits: not enough data has been encoded")]
    PatchInitialBits { nbits: u32 },

    #[error("Decoded value {value} exceeds maximum {max}, stream corrupt")]
    Corrupt { value: u32, max: u32 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
