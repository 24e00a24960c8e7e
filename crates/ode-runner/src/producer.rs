use async_trait::async_trait;
use ode_ledger::EntryDraft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProducerError;

/// Candidate entry content yielded by a producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entry_type: String,
    pub payload: Value,
    pub confidence: f64,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Observation {
    pub fn into_draft(self, agent_id: &str) -> EntryDraft {
        EntryDraft::new(agent_id, self.entry_type, self.payload, self.confidence)
            .with_references(self.references)
    }
}

/// Source of entry content. The runner knows nothing about how an
/// observation is obtained; every error is handled the same way.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn produce(&self, agent_id: &str) -> Result<Observation, ProducerError>;
}
