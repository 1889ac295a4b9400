//! Queue-boundary error type.

use thiserror::Error;

use crate::features::FormatError;
use crate::store::StoreError;

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The caller supplied a malformed requirement or offer descriptor; the
    /// queue was left untouched.
    #[error("invalid feature descriptor: {0}")]
    Format(#[from] FormatError),

    /// A store primitive failed; not retried by the engine.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// A requirement or configuration record could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
