use tracing::{info, warn};

use crate::error::AppResult;
use crate::ledger::models::UserBalance;
use crate::ledger::store::{BalanceSource, LedgerStore};

pub const DEFAULT_SAMPLE_SIZE: i64 = 50;

/// Which users get their ledger sum checked against the cached balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileScope {
    /// The first `n` users by id
    Sample(i64),
    /// Every user, paged by id
    All { page_size: i64 },
    Skip,
}

/// A user whose ledger does not add up to their cached balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceMismatch {
    pub user_id: String,
    pub ledger_sum: i64,
    pub cached_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scope: ReconcileScope,
    pub checked: u64,
    /// Every user was checked
    pub complete: bool,
    pub mismatches: Vec<BalanceMismatch>,
}

/// Compares per-user ledger sums with cached balances. Advisory only: it
/// never writes balances and mismatches are not errors.
pub struct BalanceReconciler<'a, B, L>
where
    B: BalanceSource + ?Sized,
    L: LedgerStore + ?Sized,
{
    balances: &'a B,
    ledger: &'a L,
}

impl<'a, B, L> BalanceReconciler<'a, B, L>
where
    B: BalanceSource + ?Sized,
    L: LedgerStore + ?Sized,
{
    pub fn new(balances: &'a B, ledger: &'a L) -> Self {
        Self { balances, ledger }
    }

    pub async fn run(&self, scope: ReconcileScope) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport {
            scope,
            checked: 0,
            complete: false,
            mismatches: Vec::new(),
        };

        match scope {
            ReconcileScope::Skip => {
                info!("⏭️ Balance reconciliation skipped");
                return Ok(report);
            }
            ReconcileScope::Sample(n) => {
                info!("🔍 Reconciling balances for a sample of up to {} users", n);
                let users = if n > 0 {
                    self.balances.users_after("", n).await?
                } else {
                    Vec::new()
                };
                self.check_users(&users, &mut report).await?;

                // A sample that fits the whole table is a full audit.
                let after = users.last().map(|u| u.user_id.as_str()).unwrap_or("");
                report.complete = (users.len() as i64) < n
                    || self.balances.users_after(after, 1).await?.is_empty();
            }
            ReconcileScope::All { page_size } => {
                info!("🔍 Reconciling balances for all users");
                let page_size = page_size.max(1);
                let mut after = String::new();
                loop {
                    let users = self.balances.users_after(&after, page_size).await?;
                    let Some(last) = users.last() else { break };
                    after = last.user_id.clone();
                    self.check_users(&users, &mut report).await?;
                }
                report.complete = true;
            }
        }

        Ok(report)
    }

    async fn check_users(&self, users: &[UserBalance], report: &mut ReconcileReport) -> AppResult<()> {
        for user in users {
            report.checked += 1;
            if let Some(mismatch) = self.check_user(user).await? {
                report.mismatches.push(mismatch);
            }
        }
        Ok(())
    }

    pub async fn check_user(&self, user: &UserBalance) -> AppResult<Option<BalanceMismatch>> {
        let ledger_sum = self.ledger.sum_deltas(&user.user_id).await?;
        if ledger_sum == user.balance {
            return Ok(None);
        }

        warn!(
            "user={} ledger={} cached={}",
            user.user_id, ledger_sum, user.balance
        );
        Ok(Some(BalanceMismatch {
            user_id: user.user_id.clone(),
            ledger_sum,
            cached_balance: user.balance,
        }))
    }
}
