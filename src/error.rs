//! Error types for the demux pipeline.
//!
//! Delivery failures (timeouts, non-2xx responses) are not errors; they are
//! recorded as terminal delivery statuses and surfaced through the ledger.
//! Only structurally invalid input or a broken collaborator produces a
//! `DemuxError`.

use uuid::Uuid;

/// Demux pipeline error variants.
#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    /// An occurrence is missing required identity fields.
    #[error("invalid occurrence: {0}")]
    InvalidOccurrence(String),

    /// No signal factory is registered for the occurrence's signal class.
    #[error("unknown signal class: {0}")]
    UnknownSignalClass(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("delivery not found: {0}")]
    DeliveryNotFound(Uuid),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type DemuxResult<T> = Result<T, DemuxError>;
