//! Entry validation.
//!
//! Validation is a pure function over an [`EntryDraft`]: it never touches
//! storage, so a rejected draft has no observable effect on the ledger.

use crate::entry::{EntryDraft, EntryType};
use crate::error::ValidationError;

/// Check a draft's shape and ranges, returning the parsed entry type.
///
/// Checks run in a fixed order: agent id, entry type, confidence, payload.
pub fn validate(draft: &EntryDraft) -> Result<EntryType, ValidationError> {
    if draft.agent_id.trim().is_empty() {
        return Err(ValidationError::MissingAgentId);
    }

    let entry_type: EntryType = draft.entry_type.parse()?;

    // NaN fails the range check as well.
    if !(0.0..=1.0).contains(&draft.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange {
            confidence: draft.confidence,
        });
    }

    if !draft.payload.is_object() {
        return Err(ValidationError::PayloadNotObject);
    }

    Ok(entry_type)
}
