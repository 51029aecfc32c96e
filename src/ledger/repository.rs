use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::*;
use super::store::{BalanceSource, LedgerStore, UsageEventSource};
use crate::error::AppResult;

/// Postgres-backed ledger repository shared by the scanner, migrator and reconciler
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageEventSource for LedgerRepository {
    async fn fetch_after(&self, after_id: i64, limit: i64) -> AppResult<Vec<UsageEvent>> {
        let events = sqlx::query_as::<_, UsageEvent>(
            r#"
            SELECT id, user_id, provider, model, cost, balance_after, metadata, created_at
            FROM usage_events
            WHERE id > $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    async fn find_migrated(&self, user_id: &str, usage_event_id: i64) -> AppResult<Option<Uuid>> {
        // Rows written before the marker column existed only carry it in metadata.
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM ledger_entries
            WHERE user_id = $1
                AND (
                    migrated_from_usage_event_id = $2
                    OR metadata->>'migratedFromUsageEventId' = $2::TEXT
                )
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(usage_event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_if_absent(&self, entry: NewLedgerEntry) -> AppResult<Option<LedgerEntry>> {
        // The partial unique index closes the gap between find_migrated and
        // this insert when two runs overlap.
        let inserted = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (
                id, user_id, delta, balance_after, reason, source_type, source_id,
                provider, model, metadata, migrated_from_usage_event_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id, migrated_from_usage_event_id)
                WHERE migrated_from_usage_event_id IS NOT NULL
            DO NOTHING
            RETURNING id, user_id, delta, balance_after, reason, source_type, source_id,
                provider, model, metadata, migrated_from_usage_event_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.user_id)
        .bind(entry.delta)
        .bind(entry.balance_after)
        .bind(entry.reason)
        .bind(entry.source_type)
        .bind(&entry.source_id)
        .bind(&entry.provider)
        .bind(&entry.model)
        .bind(&entry.metadata)
        .bind(entry.migrated_from_usage_event_id)
        .bind(entry.created_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn sum_deltas(&self, user_id: &str) -> AppResult<i64> {
        // SUM(bigint) is numeric in Postgres; cast back so it decodes as i64.
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(delta), 0)::BIGINT
            FROM ledger_entries
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }
}

#[async_trait]
impl BalanceSource for LedgerRepository {
    async fn users_after(&self, after_user_id: &str, limit: i64) -> AppResult<Vec<UserBalance>> {
        let users = sqlx::query_as::<_, UserBalance>(
            r#"
            SELECT id AS user_id, balance
            FROM users
            WHERE id > $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(after_user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}
