//! Backward "load more" pagination

use crate::error::SyncResult;
use crate::store::Collection;
use ambient_types::Record;
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, warn};

/// Hard stop for a single gather loop
pub const MAX_GATHER_PAGES: usize = 50;

/// Throttle state of one backfilled collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backfill {
    more_data_available: bool,
    empty_scans: u32,
    max_empty_scans: u32,
}

impl Backfill {
    pub fn new(max_empty_scans: u32) -> Self {
        Self {
            more_data_available: true,
            empty_scans: 0,
            max_empty_scans: max_empty_scans.max(1),
        }
    }

    pub fn more_data_available(&self) -> bool {
        self.more_data_available
    }

    /// Oldest record time, or `now` for an empty collection
    pub fn cursor<T: Record>(collection: &Collection<T>, now: i64) -> i64 {
        collection.oldest_time().unwrap_or(now)
    }

    /// Feed the number of new unique records a scan produced
    pub fn record_scan(&mut self, unique_found: usize) {
        if unique_found > 0 {
            self.empty_scans = 0;
            return;
        }
        self.empty_scans += 1;
        if self.empty_scans >= self.max_empty_scans {
            debug!(scans = self.empty_scans, "Backfill exhausted");
            self.more_data_available = false;
        }
    }

    pub fn reset(&mut self) {
        self.more_data_available = true;
        self.empty_scans = 0;
    }
}

/// Records gathered by `gather_until`
#[derive(Debug, Clone)]
pub struct Gathered<T> {
    pub records: Vec<T>,
    pub pages: usize,
    /// A page fetch failed before the gather finished
    pub failed: bool,
}

/// Page backwards from `cursor` until `target` unseen records are gathered
///
/// Stops early on an empty page, a page with nothing new, or a failed fetch.
pub async fn gather_until<T, F, Fut>(
    mut cursor: i64,
    target: usize,
    mut seen: HashSet<T::Id>,
    mut fetch: F,
) -> Gathered<T>
where
    T: Record,
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = SyncResult<Vec<T>>>,
{
    let mut gathered = Gathered {
        records: Vec::new(),
        pages: 0,
        failed: false,
    };

    while gathered.records.len() < target && gathered.pages < MAX_GATHER_PAGES {
        let page = match fetch(cursor).await {
            Ok(page) => page,
            Err(e) => {
                warn!(cursor, error = %e, "Backfill page failed");
                gathered.failed = true;
                break;
            }
        };
        gathered.pages += 1;
        if page.is_empty() {
            break;
        }

        let unique: Vec<T> = page
            .into_iter()
            .filter(|r| seen.insert(r.identity()))
            .collect();
        if unique.is_empty() {
            break;
        }

        if let Some(oldest) = unique.iter().map(Record::record_time).min() {
            cursor = cursor.min(oldest);
        }
        gathered.records.extend(unique);
    }

    gathered
}
