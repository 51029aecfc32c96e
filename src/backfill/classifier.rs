use serde_json::Value;

use crate::ledger::models::{LedgerReason, LedgerSourceType};

/// Ledger attribution derived from a legacy (provider, model) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub reason: LedgerReason,
    pub source_type: LedgerSourceType,
}

/// Map a legacy usage event's provider/model to a ledger reason and source.
///
/// Rules are checked in order; anything unmatched is a generation job.
pub fn classify(provider: &str, model: Option<&str>) -> Classification {
    match (provider, model) {
        ("stripe", Some("payment")) => Classification {
            reason: LedgerReason::Payment,
            source_type: LedgerSourceType::Payment,
        },
        ("system", Some("refund")) => Classification {
            reason: LedgerReason::Refund,
            source_type: LedgerSourceType::System,
        },
        _ => Classification {
            reason: LedgerReason::Job,
            source_type: LedgerSourceType::Job,
        },
    }
}

/// `paymentId` from event metadata, coerced to a string.
pub fn source_id(metadata: &Value) -> Option<String> {
    match metadata.get("paymentId")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
