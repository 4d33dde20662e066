//! Error types for Kirole Sync

use thiserror::Error;

/// Errors surfaced to callers of the sync core.
///
/// Link noise (bad checksums, short buffers, unknown event codes) never
/// shows up here; those units are dropped and logged instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid chunk size: max_chunk_size must be greater than zero")]
    InvalidChunkSize,

    #[error("Payload too large: {len} bytes would need more than {max} fragments")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
