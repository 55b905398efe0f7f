//! Error types for mesh decoding.

use thiserror::Error;

/// Result type for mesh decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Why a mesh asset could not be decoded
///
/// Every variant is recoverable at the document level: the caller swaps in a
/// placeholder cube and records one asset diagnostic.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to read mesh: {0}")]
    IoError(#[from] std::io::Error),

    #[error("truncated data at offset {offset}: {needed} more byte(s) needed")]
    Truncated { offset: usize, needed: usize },

    #[error("bad header: {0}")]
    BadHeader(String),

    #[error("unsupported mesh version '{0}'")]
    UnsupportedVersion(String),

    #[error("unexpected chunk 0x{id:04X} at offset {offset}")]
    UnknownChunk { id: u16, offset: usize },

    #[error("declared {0} overflows")]
    Overflow(&'static str),

    #[error("index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },

    #[error("Failed to parse mesh XML: {0}")]
    XmlError(String),

    #[error("malformed mesh: {0}")]
    Malformed(String),
}
