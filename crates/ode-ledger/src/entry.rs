use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Classification of a ledger entry. The set is closed; anything else is
/// rejected before it can be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Observation,
    Hypothesis,
    Challenge,
    RiskAssessment,
    ProposedAction,
    ExecutionLog,
}

impl EntryType {
    pub const ALL: [EntryType; 6] = [
        EntryType::Observation,
        EntryType::Hypothesis,
        EntryType::Challenge,
        EntryType::RiskAssessment,
        EntryType::ProposedAction,
        EntryType::ExecutionLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Observation => "OBSERVATION",
            EntryType::Hypothesis => "HYPOTHESIS",
            EntryType::Challenge => "CHALLENGE",
            EntryType::RiskAssessment => "RISK_ASSESSMENT",
            EntryType::ProposedAction => "PROPOSED_ACTION",
            EntryType::ExecutionLog => "EXECUTION_LOG",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidEntryType {
                entry_type: s.to_string(),
            })
    }
}

/// Entry identity: a hybrid clock reading `(physical_ms, logical)`.
///
/// Totally ordered: physical, then logical. The string form zero-pads both
/// components so lexicographic order agrees with `Ord`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntryId {
    pub physical: u64,
    pub logical: u32,
}

impl EntryId {
    /// Largest logical value that still fits the fixed-width string form.
    pub const MAX_LOGICAL: u32 = 999_999;

    pub fn new(physical: u64, logical: u32) -> Self {
        Self { physical, logical }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt_{:013}_{:06}", self.physical, self.logical)
    }
}

/// Error parsing an [`EntryId`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed entry id {0:?}")]
pub struct ParseEntryIdError(pub String);

impl FromStr for EntryId {
    type Err = ParseEntryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEntryIdError(s.to_string());
        let rest = s.strip_prefix("evt_").ok_or_else(err)?;
        match rest.split_once('_') {
            Some((physical, logical)) => Ok(EntryId {
                physical: physical.parse().map_err(|_| err())?,
                logical: logical.parse().map_err(|_| err())?,
            }),
            // Legacy millisecond-only ids.
            None => Ok(EntryId {
                physical: rest.parse().map_err(|_| err())?,
                logical: 0,
            }),
        }
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntryId {
    type Error = ParseEntryIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One immutable record of agent activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub entry_type: EntryType,
    pub payload: Map<String, Value>,
    pub confidence: f64,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Parse an ISO 8601 timestamp. Timestamps without an offset are taken
/// to be UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(e) => raw
            .parse::<NaiveDateTime>()
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|_| e),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Producer-supplied content of an entry before validation.
///
/// `entry_type` and `payload` are kept raw so that the validator, not the
/// type system of the caller, decides what is admissible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub agent_id: String,
    pub entry_type: String,
    pub payload: Value,
    pub confidence: f64,
    #[serde(default)]
    pub references: Vec<String>,
}

impl EntryDraft {
    pub fn new(
        agent_id: impl Into<String>,
        entry_type: impl Into<String>,
        payload: Value,
        confidence: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            entry_type: entry_type.into(),
            payload,
            confidence,
            references: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_with_and_without_offset() {
        let utc = parse_timestamp("2024-03-01T12:00:00.123456Z").unwrap();
        let offset = parse_timestamp("2024-03-01T13:00:00.123456+01:00").unwrap();
        let naive = parse_timestamp("2024-03-01T12:00:00.123456").unwrap();
        assert_eq!(utc, offset);
        assert_eq!(utc, naive);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn legacy_record_deserializes() {
        let line = r#"{"id": "evt_1700000000123", "timestamp": "2024-03-01T12:00:00.123456", "agent_id": "obs_01", "entry_type": "OBSERVATION", "payload": {"source": "simulated_web_scan"}, "confidence": 0.95, "references": ["https://example.com/ai-news"]}"#;
        let entry: LedgerEntry = serde_json::from_str(line).unwrap();
        assert_eq!(entry.id, EntryId::new(1_700_000_000_123, 0));
        assert_eq!(entry.timestamp, parse_timestamp("2024-03-01T12:00:00.123456Z").unwrap());
        assert_eq!(entry.entry_type, EntryType::Observation);
    }

    #[test]
    fn entry_type_wire_names() {
        for t in EntryType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<EntryType>().unwrap(), t);
        }
    }

    #[test]
    fn entry_type_rejects_unknown_and_lowercase() {
        assert!("BOGUS".parse::<EntryType>().is_err());
        assert!("observation".parse::<EntryType>().is_err());
        assert!(serde_json::from_str::<EntryType>("\"BOGUS\"").is_err());
    }

    #[test]
    fn entry_id_string_order_matches_ord() {
        let ids = [
            EntryId::new(999, 5),
            EntryId::new(1000, 0),
            EntryId::new(1000, 1),
            EntryId::new(1_700_000_000_000, 0),
            EntryId::new(1_700_000_000_000, 12),
        ];
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].to_string() < pair[1].to_string());
        }
    }

    #[test]
    fn entry_id_parses_both_forms() {
        let id: EntryId = "evt_1700000000123_000004".parse().unwrap();
        assert_eq!(id, EntryId::new(1_700_000_000_123, 4));

        let legacy: EntryId = "evt_1700000000123".parse().unwrap();
        assert_eq!(legacy, EntryId::new(1_700_000_000_123, 0));

        assert!("1700000000123".parse::<EntryId>().is_err());
        assert!("evt_abc".parse::<EntryId>().is_err());
    }

    #[test]
    fn entry_serializes_id_and_timestamp_as_strings() {
        let entry = LedgerEntry {
            id: EntryId::new(1_700_000_000_000, 1),
            timestamp: "2024-03-01T12:00:00Z".parse().unwrap(),
            agent_id: "obs_01".into(),
            entry_type: EntryType::RiskAssessment,
            payload: Map::new(),
            confidence: 0.5,
            references: vec![],
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["id"], "evt_1700000000000_000001");
        assert_eq!(value["timestamp"], "2024-03-01T12:00:00Z");
        assert_eq!(value["entry_type"], "RISK_ASSESSMENT");
    }
}
