use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use super::classifier::{classify, source_id};
use super::scanner::{ScanCursor, Scanner};
use crate::error::AppResult;
use crate::ledger::models::{NewLedgerEntry, UsageEvent};
use crate::ledger::store::{LedgerStore, UsageEventSource};

/// Whether ledger writes are performed or only previewed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn from_apply(apply: bool) -> Self {
        if apply {
            RunMode::Apply
        } else {
            RunMode::DryRun
        }
    }
}

/// Running totals for one migration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    /// Every usage event scanned
    pub processed: u64,
    /// Ledger entries actually written
    pub inserted: u64,
    /// Events that already had a ledger entry
    pub skipped: u64,
    /// Events a dry run would have inserted
    pub pending: u64,
    pub pages: u64,
    pub last_id: i64,
}

/// What happened to a single usage event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    AlreadyMigrated,
    WouldInsert,
}

/// Copies legacy usage events into the ledger, at most once per event
pub struct Migrator<'a, E, L>
where
    E: UsageEventSource + ?Sized,
    L: LedgerStore + ?Sized,
{
    events: &'a E,
    ledger: &'a L,
    mode: RunMode,
    page_size: i64,
    migrated_at: DateTime<Utc>,
}

impl<'a, E, L> Migrator<'a, E, L>
where
    E: UsageEventSource + ?Sized,
    L: LedgerStore + ?Sized,
{
    pub fn new(events: &'a E, ledger: &'a L, mode: RunMode, page_size: i64) -> Self {
        Self {
            events,
            ledger,
            mode,
            page_size,
            migrated_at: Utc::now(),
        }
    }

    /// Scan from `start` to the end of the table. Any read or write failure
    /// aborts the pass; re-running is safe.
    pub async fn run(&self, start: ScanCursor) -> AppResult<MigrationStats> {
        let scanner = Scanner::new(self.events, self.page_size)?;
        let mut stats = MigrationStats {
            last_id: start.last_id,
            ..Default::default()
        };
        let mut cursor = start;

        info!(
            "🔄 Migrating usage events after id {} (mode={:?}, page_size={})",
            start.last_id, self.mode, self.page_size
        );

        loop {
            let page = scanner.next_page(cursor).await?;
            let Some(next) = page.next else { break };

            for event in &page.events {
                stats.processed += 1;
                match self.migrate_event(event).await? {
                    Outcome::Inserted => stats.inserted += 1,
                    Outcome::AlreadyMigrated => stats.skipped += 1,
                    Outcome::WouldInsert => stats.pending += 1,
                }
            }

            stats.pages += 1;
            stats.last_id = next.last_id;
            cursor = next;

            info!("processed={} inserted={}", stats.processed, stats.inserted);
        }

        Ok(stats)
    }

    pub async fn migrate_event(&self, event: &UsageEvent) -> AppResult<Outcome> {
        if let Some(entry_id) = self.ledger.find_migrated(&event.user_id, event.id).await? {
            debug!("Usage event {} already migrated as {}", event.id, entry_id);
            return Ok(Outcome::AlreadyMigrated);
        }

        // Build the entry in both modes so conversion errors surface in a dry run.
        let entry = self.build_entry(event)?;

        if self.mode == RunMode::DryRun {
            return Ok(Outcome::WouldInsert);
        }

        match self.ledger.insert_if_absent(entry).await? {
            Some(entry) => {
                debug!(
                    "Usage event {} migrated as {} entry {} (delta={})",
                    event.id, entry.reason, entry.id, entry.delta
                );
                Ok(Outcome::Inserted)
            }
            None => {
                debug!("Usage event {} migrated concurrently", event.id);
                Ok(Outcome::AlreadyMigrated)
            }
        }
    }

    fn build_entry(&self, event: &UsageEvent) -> AppResult<NewLedgerEntry> {
        let classification = classify(&event.provider, event.model.as_deref());

        Ok(NewLedgerEntry {
            user_id: event.user_id.clone(),
            delta: event.ledger_delta()?,
            balance_after: event.balance_after,
            reason: classification.reason,
            source_type: classification.source_type,
            source_id: source_id(&event.metadata),
            provider: event.provider.clone(),
            model: event.model.clone(),
            metadata: json!({
                "migratedFromUsageEventId": event.id,
                "migratedAt": self.migrated_at,
                "legacyMetadata": event.metadata,
            }),
            migrated_from_usage_event_id: event.id,
            created_at: event.created_at,
        })
    }
}
