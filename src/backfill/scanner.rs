use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::ledger::models::UsageEvent;
use crate::ledger::store::UsageEventSource;

pub const DEFAULT_PAGE_SIZE: i64 = 1000;

/// Position in the usage-event table: every id at or below `last_id` has been seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanCursor {
    pub last_id: i64,
}

impl ScanCursor {
    pub fn after(last_id: i64) -> Self {
        Self { last_id }
    }
}

/// One page of the scan and the cursor to continue from
#[derive(Debug)]
pub struct Page {
    pub events: Vec<UsageEvent>,
    /// `None` once the table is exhausted
    pub next: Option<ScanCursor>,
}

/// Keyset pagination over usage events ordered by id.
///
/// Rows appended during the scan sort after the cursor, so they are picked
/// up by a later page instead of shifting an offset.
pub struct Scanner<'a, S: UsageEventSource + ?Sized> {
    source: &'a S,
    page_size: i64,
}

impl<'a, S: UsageEventSource + ?Sized> Scanner<'a, S> {
    pub fn new(source: &'a S, page_size: i64) -> AppResult<Self> {
        if page_size < 1 {
            return Err(AppError::Config(format!(
                "page size must be at least 1, got {}",
                page_size
            )));
        }
        Ok(Self { source, page_size })
    }

    pub async fn next_page(&self, cursor: ScanCursor) -> AppResult<Page> {
        let events = self
            .source
            .fetch_after(cursor.last_id, self.page_size)
            .await?;

        let next = events.last().map(|e| ScanCursor::after(e.id));
        debug!(
            "Fetched {} usage events after id {}",
            events.len(),
            cursor.last_id
        );

        Ok(Page { events, next })
    }
}
