//! Row expand/collapse state for a detail view, plus the decoded ledgers
//! behind the expanded rows.
//!
//! One controller belongs to one open detail view. It owns the
//! [`RecordCache`] and two decoded-ledger caches (current and previous
//! snapshot per record); [`ExpandController::reset_all`] drops all of them
//! when the record-to-row mapping changes (e.g. the view is re-sorted).
//!
//! Panel transitions are synchronous. Loading the previous snapshot is a
//! separate step:
//!
//! ```ignore
//! if controller.toggle_ledger(&row) {
//!     controller.load_previous(&row).await;
//! }
//! ```
//!
//! The previous ledger is decoded from whatever the cache holds, so a load
//! that was abandoned mid-flight still shows up once its request settles.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tracing::{debug, info};

use crate::cache::{FetchPreviousFn, RecordCache};
use crate::diff::{self, AlignedRow, LedgerDiffRow};
use crate::ledger::{decode, PriceLevelRow};
use crate::types::HoldRow;

/// Which row, if any, is expanded and in which panel. The two panels are
/// mutually exclusive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Expanded {
    #[default]
    None,
    /// Back/lay/traded ledger panel of a record.
    Ledger(u64),
    /// Last-price panel of a record.
    LastPrice(u64),
}

/// Outcome of [`ExpandController::prefetch_all`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefetchSummary {
    /// Upstream requests started by this call. Keys that joined a request
    /// already in flight are awaited but not counted.
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ViewState {
    expanded: Expanded,
    current: HashMap<u64, Vec<PriceLevelRow>>,
    previous: HashMap<u64, Vec<PriceLevelRow>>,
}

impl ViewState {
    fn current_for(&mut self, row: &HoldRow) -> &Vec<PriceLevelRow> {
        self.current
            .entry(row.record_id)
            .or_insert_with(|| decode(row.raw_data.as_deref()))
    }
}

#[derive(Debug)]
pub struct ExpandController {
    cache: RecordCache,
    view: Mutex<ViewState>,
}

impl ExpandController {
    pub fn new(fetch: Arc<FetchPreviousFn>) -> Self {
        Self::with_cache(RecordCache::new(fetch))
    }

    pub fn with_cache(cache: RecordCache) -> Self {
        Self {
            cache,
            view: Mutex::new(ViewState::default()),
        }
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Transitions -----------------------------------------------------

    /// Expand the ledger panel of `row`, or collapse it if already expanded.
    /// Closes any open last-price panel and decodes the current ledger.
    ///
    /// Returns `true` when the row is now expanded and its previous snapshot
    /// has not settled yet; the caller then drives
    /// [`load_previous`](Self::load_previous).
    pub fn toggle_ledger(&self, row: &HoldRow) -> bool {
        let key = row.record_id;
        {
            let mut view = self.view();
            if view.expanded == Expanded::Ledger(key) {
                view.expanded = Expanded::None;
                return false;
            }
            view.expanded = Expanded::Ledger(key);
            view.current_for(row);
        }
        !self.cache.contains(key)
    }

    /// Expand the last-price panel of `row`, or collapse it if already
    /// expanded. Closes any open ledger panel.
    pub fn toggle_last_price(&self, row: &HoldRow) {
        let key = row.record_id;
        let mut view = self.view();
        view.expanded = if view.expanded == Expanded::LastPrice(key) {
            Expanded::None
        } else {
            Expanded::LastPrice(key)
        };
    }

    /// Fetch the previous snapshot of `row` (at most once per record) and
    /// decode it. Returns `false` if the fetch failed.
    pub async fn load_previous(&self, row: &HoldRow) -> bool {
        let key = row.record_id;
        self.cache.fetch_previous(row.previous_query()).await;
        self.sync_previous(key);
        !self.cache.is_failed(key)
    }

    /// Fetch the previous snapshot of `row` again after a failure.
    pub async fn retry(&self, row: &HoldRow) -> bool {
        debug!(record_id = row.record_id, "retrying previous record");
        self.load_previous(row).await
    }

    /// Fetch previous snapshots for every row not yet cached, concurrently.
    /// A failing row does not stop the others; resolves once all settle.
    pub async fn prefetch_all(&self, rows: &[HoldRow]) -> PrefetchSummary {
        let mut seen = HashSet::new();
        let targets: Vec<&HoldRow> = rows
            .iter()
            .filter(|r| !self.cache.contains(r.record_id) && seen.insert(r.record_id))
            .collect();

        let outcomes = join_all(targets.iter().map(|row| self.prefetch_one(row))).await;

        let mut summary = PrefetchSummary::default();
        for (started, ok) in outcomes {
            if !started {
                continue;
            }
            summary.requested += 1;
            if ok {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }
        info!(
            requested = summary.requested,
            joined = targets.len() - summary.requested,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "prefetch complete"
        );
        summary
    }

    /// Returns whether this call started the request, and whether the key
    /// settled without failure.
    async fn prefetch_one(&self, row: &HoldRow) -> (bool, bool) {
        let key = row.record_id;
        let (_, started) = self.cache.fetch_tracked(row.previous_query()).await;
        self.sync_previous(key);
        (started, !self.cache.is_failed(key))
    }

    pub fn collapse_all(&self) {
        self.view().expanded = Expanded::None;
    }

    /// Collapse and drop every cached record and decoded ledger.
    pub fn reset_all(&self) {
        self.collapse_all();
        self.cache.clear_cache();
        let mut view = self.view();
        view.current.clear();
        view.previous.clear();
    }

    /// Decode the previous ledger of `key` from the cache entry, once. A
    /// confirmed absence or an empty payload leaves it undecoded.
    fn sync_previous(&self, key: u64) {
        if self.view().previous.contains_key(&key) {
            return;
        }
        let Some(raw) = self
            .cache
            .get(key)
            .flatten()
            .and_then(|record| record.raw_data)
            .filter(|raw| !raw.is_empty())
        else {
            return;
        };
        let ledger = decode(Some(&raw));
        self.view().previous.entry(key).or_insert(ledger);
    }

    // -- Accessors -------------------------------------------------------

    pub fn expanded(&self) -> Expanded {
        self.view().expanded
    }

    /// Record whose ledger panel is open.
    pub fn ledger_expanded(&self) -> Option<u64> {
        match self.view().expanded {
            Expanded::Ledger(key) => Some(key),
            _ => None,
        }
    }

    /// Record whose last-price panel is open.
    pub fn last_price_expanded(&self) -> Option<u64> {
        match self.view().expanded {
            Expanded::LastPrice(key) => Some(key),
            _ => None,
        }
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn is_loading(&self, key: u64) -> bool {
        self.cache.is_loading(key)
    }

    pub fn is_failed(&self, key: u64) -> bool {
        self.cache.is_failed(key)
    }

    /// Decode (once) and return the current ledger of `row` without touching
    /// the panel state.
    pub fn decode_current(&self, row: &HoldRow) -> Vec<PriceLevelRow> {
        self.view().current_for(row).clone()
    }

    pub fn current_ledger(&self, key: u64) -> Vec<PriceLevelRow> {
        self.view().current.get(&key).cloned().unwrap_or_default()
    }

    pub fn previous_ledger(&self, key: u64) -> Vec<PriceLevelRow> {
        self.sync_previous(key);
        self.view().previous.get(&key).cloned().unwrap_or_default()
    }

    /// New traded volume since the previous snapshot; empty unless both
    /// ledgers are known and non-empty.
    pub fn diff_ledger(&self, key: u64) -> Vec<LedgerDiffRow> {
        self.sync_previous(key);
        let view = self.view();
        match (view.current.get(&key), view.previous.get(&key)) {
            (Some(current), Some(previous)) if !current.is_empty() && !previous.is_empty() => {
                diff::traded_diff(current, previous)
            }
            _ => Vec::new(),
        }
    }

    pub fn aligned_rows(&self, key: u64) -> Vec<AlignedRow> {
        self.sync_previous(key);
        let view = self.view();
        let current = view.current.get(&key).map(Vec::as_slice).unwrap_or_default();
        let previous = view.previous.get(&key).map(Vec::as_slice).unwrap_or_default();
        diff::aligned_rows(current, previous)
    }

    /// See [`diff::is_heavily_traded`]. `false` until a previous snapshot has
    /// been loaded for `key`.
    pub fn is_heavily_traded(&self, key: u64, threshold: usize) -> bool {
        self.sync_previous(key);
        let view = self.view();
        let current = view.current.get(&key).map(Vec::as_slice).unwrap_or_default();
        diff::is_heavily_traded(current, view.previous.get(&key).map(Vec::as_slice), threshold)
    }
}
