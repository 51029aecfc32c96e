use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

use crate::error::ConversionError;

/// Why a ledger entry moved the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "ledger_reason", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerReason {
    Payment,
    Refund,
    Job,
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LedgerReason::Payment => "PAYMENT",
            LedgerReason::Refund => "REFUND",
            LedgerReason::Job => "JOB",
        };
        write!(f, "{}", s)
    }
}

/// What kind of record a ledger entry is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "ledger_source_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerSourceType {
    Payment,
    System,
    Job,
}

impl fmt::Display for LedgerSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LedgerSourceType::Payment => "PAYMENT",
            LedgerSourceType::System => "SYSTEM",
            LedgerSourceType::Job => "JOB",
        };
        write!(f, "{}", s)
    }
}

/// Legacy usage event - immutable pre-ledger record of a balance change.
///
/// `cost` is a positive magnitude for debits; credits were stored as
/// negative costs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageEvent {
    pub id: i64,
    pub user_id: String,
    pub provider: String,
    pub model: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    pub balance_after: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    /// Signed ledger delta for this event (positive = credit).
    pub fn ledger_delta(&self) -> Result<i64, ConversionError> {
        if !self.cost.fract().is_zero() {
            return Err(ConversionError::FractionalCost {
                event_id: self.id,
                cost: self.cost.to_string(),
            });
        }

        self.cost
            .to_i64()
            .and_then(i64::checked_neg)
            .ok_or_else(|| ConversionError::DeltaOverflow {
                event_id: self.id,
                cost: self.cost.to_string(),
            })
    }
}

/// Ledger entry entity - append-only signed balance change
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub delta: i64,
    pub balance_after: i64,
    pub reason: LedgerReason,
    pub source_type: LedgerSourceType,
    pub source_id: Option<String>,
    pub provider: String,
    pub model: Option<String>,
    pub metadata: serde_json::Value,
    pub migrated_from_usage_event_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Insert request for a ledger entry derived from a usage event
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub delta: i64,
    pub balance_after: i64,
    pub reason: LedgerReason,
    pub source_type: LedgerSourceType,
    pub source_id: Option<String>,
    pub provider: String,
    pub model: Option<String>,
    pub metadata: serde_json::Value,
    pub migrated_from_usage_event_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Cached balance for a user, owned by the live application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    pub user_id: String,
    pub balance: i64,
}
