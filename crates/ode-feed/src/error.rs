use ode_ledger::StorageError;
use thiserror::Error;

use crate::SubscriberId;

/// Errors from live feed operations.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("ledger read failed: {0}")]
    Storage(#[from] StorageError),

    #[error("delivery to subscriber {0} failed: connection closed")]
    SubscriberDelivery(SubscriberId),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}
