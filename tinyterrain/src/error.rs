//! Error types for the terrain codec and storage engine.

use thiserror::Error;

/// Everything that can go wrong while encoding, decoding, or storing terrain.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("value {value} out of range for {field} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        expected: &'static str,
    },

    #[error("malformed input: {0}")]
    Malformed(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("terrain file already exists")]
    AlreadyExists,

    #[error("terrain file does not exist")]
    Missing,
}

pub type Result<T> = std::result::Result<T, TerrainError>;
