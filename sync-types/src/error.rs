//! Error types for tictactoe-sync records.

use thiserror::Error;

/// Errors from encoding, decoding or validating records.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Board dimension other than 3 or 5
    #[error("unsupported board size: {0}")]
    UnsupportedBoardSize(u8),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
