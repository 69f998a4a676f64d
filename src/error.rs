//! Error types for the drift monitor.
//!
//! One flat enum covers the whole crate. Variants fall into four classes
//! with different handling at the orchestrator boundary:
//!
//! - Malformed input (`MissingObjectId`, `DuplicateObjectId`): an upstream
//!   data-shape violation, never retryable, never silently coerced.
//! - Fetch (`Fetch`): the retrieval collaborator failed; the current check
//!   aborts cleanly and the next scheduled interval retries.
//! - Storage (`Io`, `Serialization`, `Deserialization`, `Corruption`,
//!   `ChecksumMismatch`, `InvalidFormat`, `Locked`): persistence failed;
//!   fatal for the current check and surfaced loudly.
//! - Explanation (`Explanation`): best-effort collaborator; recovered with
//!   a placeholder and never aborts a snapshot write.

use crate::types::{ObjectId, ObjectType};
use thiserror::Error;

/// Main error type for monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object of type {object_type} has no usable id")]
    MissingObjectId { object_type: ObjectType },

    #[error("Duplicate id {id} within one {object_type} collection")]
    DuplicateObjectId { object_type: ObjectType, id: ObjectId },

    #[error("Fetch failed for {object_type}: {reason}")]
    Fetch { object_type: ObjectType, reason: String },

    #[error("Explanation failed: {0}")]
    Explanation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("A check is already running")]
    CheckInProgress,
}

impl MonitorError {
    /// True for the malformed-input class (upstream data-shape violation).
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            MonitorError::MissingObjectId { .. } | MonitorError::DuplicateObjectId { .. }
        )
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for MonitorError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        MonitorError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MonitorError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        MonitorError::Deserialization(e.to_string())
    }
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
