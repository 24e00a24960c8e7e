use ode_ledger::LedgerEntry;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Messages pushed to feed clients.
///
/// `{"type": "init", "entries": [...]}` once on connect, then
/// `{"type": "new", "entry": {...}}` per appended entry, in order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    Init { entries: Vec<LedgerEntry> },
    New { entry: LedgerEntry },
}

impl FeedMessage {
    pub fn to_json(&self) -> Result<String, FeedError> {
        Ok(serde_json::to_string(self)?)
    }
}
