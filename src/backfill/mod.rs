// Usage-event → credit-ledger backfill and balance reconciliation
pub mod classifier;
pub mod migrator;
pub mod reconciler;
pub mod scanner;

use tracing::{info, warn};

use crate::error::AppResult;
use crate::ledger::store::{BalanceSource, LedgerStore, UsageEventSource};
use migrator::{MigrationStats, Migrator, RunMode};
use reconciler::{BalanceReconciler, ReconcileReport, ReconcileScope};
use scanner::ScanCursor;

/// Options for one invocation of the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub mode: RunMode,
    pub page_size: i64,
    pub start_after: i64,
    pub reconcile: ReconcileScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub mode: RunMode,
    pub migration: MigrationStats,
    pub reconciliation: ReconcileReport,
}

/// Migrate every usage event, then reconcile balances.
pub async fn run_job<S>(store: &S, options: JobOptions) -> AppResult<JobSummary>
where
    S: UsageEventSource + LedgerStore + BalanceSource + ?Sized,
{
    let migrator = Migrator::new(store, store, options.mode, options.page_size);
    let migration = migrator.run(ScanCursor::after(options.start_after)).await?;

    let reconciliation = BalanceReconciler::new(store, store)
        .run(options.reconcile)
        .await?;

    let summary = JobSummary {
        mode: options.mode,
        migration,
        reconciliation,
    };
    log_summary(&summary);

    Ok(summary)
}

fn log_summary(summary: &JobSummary) {
    let m = &summary.migration;
    let r = &summary.reconciliation;

    info!(
        "✓ Backfill complete: mode={:?} processed={} inserted={} skipped={} pending={} last_id={} checked_users={} mismatches={}",
        summary.mode,
        m.processed,
        m.inserted,
        m.skipped,
        m.pending,
        m.last_id,
        r.checked,
        r.mismatches.len()
    );

    if summary.mode == RunMode::DryRun && m.pending > 0 {
        info!("Dry run: re-run with --apply to write {} ledger entries", m.pending);
    }
    if let Some(message) = coverage_warning(r) {
        warn!("{}", message);
    }
}

/// Warning for a sampled reconciliation that left users unchecked.
fn coverage_warning(report: &ReconcileReport) -> Option<String> {
    match report.scope {
        ReconcileScope::Sample(n) if n > 0 && !report.complete => Some(format!(
            "Reconciliation covered a sample of {} users only; use --reconcile-all for a full audit",
            report.checked
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::models::UsageEvent;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn ledger() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        let events = [
            (1, "alice", "stripe", "payment", dec!(-100)),
            (2, "alice", "flux", "flux-pro", dec!(20)),
            (3, "bob", "stripe", "payment", dec!(-50)),
            (4, "bob", "gemini", "imagen", dec!(10)),
        ];
        for (id, user, provider, model, cost) in events {
            ledger
                .add_event(UsageEvent {
                    id,
                    user_id: user.to_string(),
                    provider: provider.to_string(),
                    model: Some(model.to_string()),
                    cost,
                    balance_after: 0,
                    metadata: serde_json::json!({}),
                    created_at: Utc::now(),
                })
                .await;
        }
        ledger.set_balance("alice", 80).await;
        ledger.set_balance("bob", 100).await;
        ledger
    }

    fn options(mode: RunMode) -> JobOptions {
        JobOptions {
            mode,
            page_size: 3,
            start_after: 0,
            reconcile: ReconcileScope::Sample(50),
        }
    }

    #[tokio::test]
    async fn test_apply_then_reconcile() {
        let ledger = ledger().await;

        let summary = run_job(&ledger, options(RunMode::Apply)).await.unwrap();

        assert_eq!(summary.migration.inserted, 4);
        assert_eq!(summary.reconciliation.checked, 2);
        assert_eq!(summary.reconciliation.mismatches.len(), 1);
        assert_eq!(summary.reconciliation.mismatches[0].user_id, "bob");
        assert_eq!(summary.reconciliation.mismatches[0].ledger_sum, 40);
    }

    #[tokio::test]
    async fn test_dry_run_reports_unmigrated_ledger_as_drift() {
        let ledger = ledger().await;

        let summary = run_job(&ledger, options(RunMode::DryRun)).await.unwrap();

        assert_eq!(summary.migration.pending, 4);
        assert_eq!(summary.migration.inserted, 0);
        assert_eq!(summary.reconciliation.mismatches.len(), 2);
        assert!(ledger.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_after_skips_earlier_events() {
        let ledger = ledger().await;
        let mut opts = options(RunMode::Apply);
        opts.start_after = 2;
        opts.reconcile = ReconcileScope::Skip;

        let summary = run_job(&ledger, opts).await.unwrap();

        assert_eq!(summary.migration.processed, 2);
        assert_eq!(summary.migration.last_id, 4);
        assert_eq!(ledger.fetch_calls().await, 2);
    }

    fn report(scope: ReconcileScope, checked: u64, complete: bool) -> ReconcileReport {
        ReconcileReport {
            scope,
            checked,
            complete,
            mismatches: Vec::new(),
        }
    }

    #[test]
    fn test_coverage_warning_only_for_partial_samples() {
        assert!(coverage_warning(&report(ReconcileScope::Sample(50), 50, false)).is_some());
        assert!(coverage_warning(&report(ReconcileScope::Sample(50), 50, true)).is_none());
        assert!(coverage_warning(&report(ReconcileScope::Sample(0), 0, false)).is_none());
        assert!(coverage_warning(&report(ReconcileScope::All { page_size: 10 }, 3, true)).is_none());
        assert!(coverage_warning(&report(ReconcileScope::Skip, 0, false)).is_none());
    }

    #[tokio::test]
    async fn test_exact_fit_sample_reports_full_coverage() {
        let ledger = ledger().await;
        let mut opts = options(RunMode::Apply);
        opts.reconcile = ReconcileScope::Sample(2);

        let summary = run_job(&ledger, opts).await.unwrap();

        assert_eq!(summary.reconciliation.checked, 2);
        assert!(summary.reconciliation.complete);
        assert!(coverage_warning(&summary.reconciliation).is_none());
    }
}
