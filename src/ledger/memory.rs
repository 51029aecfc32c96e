use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::*;
use super::store::{BalanceSource, LedgerStore, UsageEventSource};
use crate::error::{AppError, AppResult};

/// In-memory stand-in for the Postgres repository
pub struct MemoryLedger {
    events: RwLock<BTreeMap<i64, UsageEvent>>,
    entries: RwLock<Vec<LedgerEntry>>,
    users: RwLock<BTreeMap<String, i64>>,
    fail_reads: RwLock<bool>,
    fail_writes: RwLock<bool>,
    fetch_calls: RwLock<usize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            entries: RwLock::new(Vec::new()),
            users: RwLock::new(BTreeMap::new()),
            fail_reads: RwLock::new(false),
            fail_writes: RwLock::new(false),
            fetch_calls: RwLock::new(0),
        }
    }

    pub async fn add_event(&self, event: UsageEvent) {
        self.events.write().await.insert(event.id, event);
    }

    pub async fn set_balance(&self, user_id: &str, balance: i64) {
        self.users.write().await.insert(user_id.to_string(), balance);
    }

    /// Append an entry the way the live credit paths do (no migration marker).
    pub async fn add_live_entry(&self, user_id: &str, delta: i64) {
        self.add_entry_with_metadata(user_id, delta, serde_json::json!({})).await;
    }

    /// Append an entry whose migration marker, if any, lives only in metadata.
    pub async fn add_entry_with_metadata(&self, user_id: &str, delta: i64, metadata: serde_json::Value) {
        self.entries.write().await.push(LedgerEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            delta,
            balance_after: 0,
            reason: LedgerReason::Job,
            source_type: LedgerSourceType::Job,
            source_id: None,
            provider: "flux".to_string(),
            model: None,
            metadata,
            migrated_from_usage_event_id: None,
            created_at: chrono::Utc::now(),
        });
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }

    pub async fn fail_reads(&self, fail: bool) {
        *self.fail_reads.write().await = fail;
    }

    pub async fn fail_writes(&self, fail: bool) {
        *self.fail_writes.write().await = fail;
    }

    pub async fn fetch_calls(&self) -> usize {
        *self.fetch_calls.read().await
    }
}

/// Marker as Postgres' `metadata->>'migratedFromUsageEventId'` would render it.
fn metadata_marker(metadata: &serde_json::Value) -> Option<String> {
    match metadata.get("migratedFromUsageEventId")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl UsageEventSource for MemoryLedger {
    async fn fetch_after(&self, after_id: i64, limit: i64) -> AppResult<Vec<UsageEvent>> {
        *self.fetch_calls.write().await += 1;
        if *self.fail_reads.read().await {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let events = self.events.read().await;
        Ok(events
            .range(after_id + 1..)
            .take(limit as usize)
            .map(|(_, e)| e.clone())
            .collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn find_migrated(&self, user_id: &str, usage_event_id: i64) -> AppResult<Option<Uuid>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|e| {
                e.user_id == user_id
                    && (e.migrated_from_usage_event_id == Some(usage_event_id)
                        || metadata_marker(&e.metadata) == Some(usage_event_id.to_string()))
            })
            .map(|e| e.id))
    }

    async fn insert_if_absent(&self, entry: NewLedgerEntry) -> AppResult<Option<LedgerEntry>> {
        if *self.fail_writes.read().await {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut entries = self.entries.write().await;
        let exists = entries.iter().any(|e| {
            e.user_id == entry.user_id
                && e.migrated_from_usage_event_id == Some(entry.migrated_from_usage_event_id)
        });
        if exists {
            return Ok(None);
        }

        let inserted = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            delta: entry.delta,
            balance_after: entry.balance_after,
            reason: entry.reason,
            source_type: entry.source_type,
            source_id: entry.source_id,
            provider: entry.provider,
            model: entry.model,
            metadata: entry.metadata,
            migrated_from_usage_event_id: Some(entry.migrated_from_usage_event_id),
            created_at: entry.created_at,
        };
        entries.push(inserted.clone());
        Ok(Some(inserted))
    }

    async fn sum_deltas(&self, user_id: &str) -> AppResult<i64> {
        if *self.fail_reads.read().await {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.delta)
            .sum())
    }
}

#[async_trait]
impl BalanceSource for MemoryLedger {
    async fn users_after(&self, after_user_id: &str, limit: i64) -> AppResult<Vec<UserBalance>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|(id, _)| id.as_str() > after_user_id)
            .take(limit as usize)
            .map(|(id, balance)| UserBalance {
                user_id: id.clone(),
                balance: *balance,
            })
            .collect())
    }
}
