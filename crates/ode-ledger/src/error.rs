use thiserror::Error;

/// Entry shape or range violations. A draft that fails validation never
/// reaches storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("agent_id must not be empty")]
    MissingAgentId,

    #[error("invalid entry_type {entry_type:?}")]
    InvalidEntryType { entry_type: String },

    #[error("confidence {confidence} outside [0.0, 1.0]")]
    ConfidenceOutOfRange { confidence: f64 },

    #[error("payload must be a JSON object")]
    PayloadNotObject,
}

/// Durable read/write failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger storage lock poisoned")]
    LockPoisoned,

    #[error("ledger opened read-only")]
    ReadOnly,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Errors returned by [`crate::Ledger::append`].
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}
