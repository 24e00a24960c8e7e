use std::time::Duration;

use ode_ledger::LedgerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by a [`crate::Producer`].
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("producer error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ProducerError {
    fn from(e: reqwest::Error) -> Self {
        ProducerError::Upstream(e.to_string())
    }
}

/// Runner construction errors.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("invalid runner configuration: {0}")]
    Config(String),
}

/// Why a cycle attempt did not record an entry.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Producer(#[from] ProducerError),

    #[error("producer did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Coarse classification of a failed cycle, for status reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Producer,
    Timeout,
    Validation,
    Storage,
}

impl CycleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleError::Producer(ProducerError::Timeout(_)) => FailureKind::Timeout,
            CycleError::Producer(_) => FailureKind::Producer,
            CycleError::Timeout(_) => FailureKind::Timeout,
            CycleError::Ledger(LedgerError::Validation(_)) => FailureKind::Validation,
            CycleError::Ledger(LedgerError::Storage(_)) => FailureKind::Storage,
        }
    }
}
