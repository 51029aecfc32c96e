use async_trait::async_trait;
use uuid::Uuid;

use super::models::{LedgerEntry, NewLedgerEntry, UsageEvent, UserBalance};
use crate::error::AppResult;

/// Read side of the legacy usage-event table
#[async_trait]
pub trait UsageEventSource: Send + Sync {
    /// Events with `id > after_id`, ascending by id, at most `limit` rows.
    async fn fetch_after(&self, after_id: i64, limit: i64) -> AppResult<Vec<UsageEvent>>;
}

/// Append-only credit ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Ledger entry id migrated from `usage_event_id` for this user, if any.
    async fn find_migrated(&self, user_id: &str, usage_event_id: i64) -> AppResult<Option<Uuid>>;

    /// Insert unless an entry with the same migration marker exists.
    /// Returns `None` when the insert was suppressed by the marker.
    async fn insert_if_absent(&self, entry: NewLedgerEntry) -> AppResult<Option<LedgerEntry>>;

    /// Sum of all deltas for the user; zero when there are no entries.
    async fn sum_deltas(&self, user_id: &str) -> AppResult<i64>;
}

/// Cached user balances, read-only for this job
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Users with `id > after_user_id` (empty string = from start),
    /// ascending by id, at most `limit` rows.
    async fn users_after(&self, after_user_id: &str, limit: i64) -> AppResult<Vec<UserBalance>>;
}
