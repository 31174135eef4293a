//! Lazy per-record cache of previous snapshots.
//!
//! Records are fetched on demand and kept until [`RecordCache::clear_cache`].
//! A settled key is never fetched again: both a found record and a
//! confirmed absence (`None`) are cached. Failures are not cached; they are
//! reported through the failed-key set so the caller can offer a retry.
//!
//! # Concurrency
//!
//! ```text
//!   fetch_previous(k) ──┐
//!   fetch_previous(k) ──┼──> pending[k]: Shared<..> ──> spawned task
//!   fetch_previous(k) ──┘                                 │  fetch fn
//!                                                         v
//!                                                   settle(k, result)
//!                                            entries / failed / loading
//! ```
//!
//! Concurrent callers for the same uncached key share one request. The
//! request runs on its own task, so the key is settled even if every caller
//! stops waiting. State sits behind a `std::sync::Mutex` that is never held
//! across an `.await`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{PreviousQuery, PreviousRecord};

/// Boxed future returned by a [`FetchPreviousFn`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Option<PreviousRecord>>> + Send>>;

/// Upstream lookup of the record preceding `query.record_id`.
/// `Ok(None)` means the upstream confirmed there is none.
pub type FetchPreviousFn = dyn Fn(PreviousQuery) -> FetchFuture + Send + Sync;

type Pending = Shared<BoxFuture<'static, Option<PreviousRecord>>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<u64, Option<PreviousRecord>>,
    loading: HashSet<u64>,
    failed: HashSet<u64>,
    pending: HashMap<u64, Pending>,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record the outcome of one upstream request.
fn settle(
    state: &Mutex<CacheState>,
    key: u64,
    result: Result<Option<PreviousRecord>>,
) -> Option<PreviousRecord> {
    let mut state = lock(state);
    state.loading.remove(&key);
    state.pending.remove(&key);
    match result {
        Ok(record) => {
            debug!(record_id = key, found = record.is_some(), "previous record settled");
            state.entries.insert(key, record.clone());
            record
        }
        Err(e) => {
            warn!(record_id = key, error = %e, "failed to fetch previous record");
            state.failed.insert(key);
            None
        }
    }
}

/// Settle `key` as failed without a result.
fn mark_failed(state: &Mutex<CacheState>, key: u64) {
    let mut state = lock(state);
    state.loading.remove(&key);
    state.pending.remove(&key);
    state.failed.insert(key);
}

pub struct RecordCache {
    fetch: Arc<FetchPreviousFn>,
    state: Arc<Mutex<CacheState>>,
}

impl RecordCache {
    pub fn new(fetch: Arc<FetchPreviousFn>) -> Self {
        Self {
            fetch,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Previous record for `query.record_id`, fetching it at most once.
    ///
    /// Returns `None` both when no previous record exists and when the fetch
    /// failed; [`is_failed`](Self::is_failed) tells the two apart.
    pub async fn fetch_previous(&self, query: PreviousQuery) -> Option<PreviousRecord> {
        self.fetch_tracked(query).await.0
    }

    /// Like [`fetch_previous`](Self::fetch_previous), also reporting whether
    /// this call started a new upstream request (as opposed to reading the
    /// cache or joining a request already in flight).
    pub(crate) async fn fetch_tracked(
        &self,
        query: PreviousQuery,
    ) -> (Option<PreviousRecord>, bool) {
        let key = query.record_id;
        let (pending, started) = {
            let mut state = lock(&self.state);
            if let Some(cached) = state.entries.get(&key) {
                debug!(record_id = key, "previous record cache hit");
                return (cached.clone(), false);
            }
            let in_flight = state.pending.get(&key).cloned();
            match in_flight {
                Some(pending) => {
                    debug!(record_id = key, "joining in-flight previous record request");
                    (pending, false)
                }
                None => {
                    state.loading.insert(key);
                    state.failed.remove(&key);
                    let pending = self.start_fetch(query);
                    state.pending.insert(key, pending.clone());
                    (pending, true)
                }
            }
        };
        (pending.await, started)
    }

    /// Spawn the request task. The fetch function is only invoked on that
    /// task, never under the state lock; a panic inside it settles the key
    /// as failed.
    fn start_fetch(&self, query: PreviousQuery) -> Pending {
        let key = query.record_id;
        let fetch = Arc::clone(&self.fetch);

        let task_state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let request = AssertUnwindSafe(async move { fetch(query).await });
            match request.catch_unwind().await {
                Ok(result) => settle(&task_state, key, result),
                Err(_) => {
                    warn!(record_id = key, "previous record fetch panicked");
                    mark_failed(&task_state, key);
                    None
                }
            }
        });

        let state = Arc::clone(&self.state);
        async move {
            match handle.await {
                Ok(record) => record,
                Err(e) => {
                    warn!(record_id = key, error = %e, "previous record task aborted");
                    mark_failed(&state, key);
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Empty the cache and the failed-key set. In-flight requests are not
    /// cancelled and will repopulate their key when they settle.
    pub fn clear_cache(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.failed.clear();
    }

    /// Whether `key` has settled (including a confirmed absence).
    pub fn contains(&self, key: u64) -> bool {
        lock(&self.state).entries.contains_key(&key)
    }

    /// Cached value for `key`: `None` if never settled, `Some(None)` if the
    /// upstream confirmed there is no previous record.
    pub fn get(&self, key: u64) -> Option<Option<PreviousRecord>> {
        lock(&self.state).entries.get(&key).cloned()
    }

    pub fn is_loading(&self, key: u64) -> bool {
        lock(&self.state).loading.contains(&key)
    }

    /// Keys with a request in flight, ascending.
    pub fn loading_keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = lock(&self.state).loading.iter().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn is_failed(&self, key: u64) -> bool {
        lock(&self.state).failed.contains(&key)
    }

    /// Keys whose last request failed, ascending.
    pub fn failed_keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = lock(&self.state).failed.iter().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of settled keys.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).entries.is_empty()
    }
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("RecordCache")
            .field("entries", &state.entries.len())
            .field("loading", &state.loading)
            .field("failed", &state.failed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Semaphore;

    use super::*;
    use crate::error::HoldbookError;

    /// Scripted upstream: records per key, keys that fail, and an optional
    /// gate that holds every request until permits are added.
    pub(crate) struct FakeUpstream {
        pub calls: Arc<AtomicUsize>,
        pub gate: Option<Arc<Semaphore>>,
        pub failing: HashSet<u64>,
        pub absent: HashSet<u64>,
        pub panicking: HashSet<u64>,
    }

    impl FakeUpstream {
        pub fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                gate: None,
                failing: HashSet::new(),
                absent: HashSet::new(),
                panicking: HashSet::new(),
            }
        }

        pub fn panicking(mut self, key: u64) -> Self {
            self.panicking.insert(key);
            self
        }

        pub fn failing(mut self, key: u64) -> Self {
            self.failing.insert(key);
            self
        }

        pub fn absent(mut self, key: u64) -> Self {
            self.absent.insert(key);
            self
        }

        pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn into_fetch(self) -> Arc<FetchPreviousFn> {
            let FakeUpstream {
                calls,
                gate,
                failing,
                absent,
                panicking,
            } = self;
            Arc::new(move |query: PreviousQuery| -> FetchFuture {
                calls.fetch_add(1, Ordering::SeqCst);
                if panicking.contains(&query.record_id) {
                    panic!("upstream blew up for {}", query.record_id);
                }
                let gate = gate.clone();
                let fails = failing.contains(&query.record_id);
                let missing = absent.contains(&query.record_id);
                Box::pin(async move {
                    if let Some(gate) = gate {
                        gate.acquire().await.expect("gate closed").forget();
                    }
                    if fails {
                        return Err(HoldbookError::Http {
                            status: 503,
                            message: "unavailable".into(),
                        });
                    }
                    if missing {
                        return Ok(None);
                    }
                    Ok(Some(record(query.record_id)))
                })
            })
        }
    }

    pub(crate) fn record(key: u64) -> PreviousRecord {
        PreviousRecord {
            record_id: key + 1000,
            raw_data: Some(format!(
                r#"{{"ex":{{"tradedVolume":[{{"price":2.0,"size":{key}}}]}}}}"#
            )),
            reference_time: "2025-03-01T12:00:00".into(),
            traded_delta: 0.0,
            last_odds: 2.0,
        }
    }

    fn query(key: u64) -> PreviousQuery {
        PreviousQuery::new(key, 1, 2, "2025-03-01T12:05:00")
    }

    async fn settle_tasks() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    // -- At-most-once ----------------------------------------------------

    #[tokio::test]
    async fn sequential_calls_fetch_once() {
        let upstream = FakeUpstream::new();
        let calls = Arc::clone(&upstream.calls);
        let cache = RecordCache::new(upstream.into_fetch());

        let first = cache.fetch_previous(query(7)).await;
        let second = cache.fetch_previous(query(7)).await;

        assert_eq!(first, Some(record(7)));
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(7));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn confirmed_absence_is_cached() {
        let upstream = FakeUpstream::new().absent(3);
        let calls = Arc::clone(&upstream.calls);
        let cache = RecordCache::new(upstream.into_fetch());

        assert_eq!(cache.fetch_previous(query(3)).await, None);
        assert_eq!(cache.fetch_previous(query(3)).await, None);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(3), Some(None));
        assert!(!cache.is_failed(3));
    }

    // -- Failure ---------------------------------------------------------

    #[tokio::test]
    async fn failure_is_not_cached_and_retries() {
        let upstream = FakeUpstream::new().failing(9);
        let calls = Arc::clone(&upstream.calls);
        let cache = RecordCache::new(upstream.into_fetch());

        assert_eq!(cache.fetch_previous(query(9)).await, None);
        assert!(!cache.contains(9));
        assert!(cache.is_failed(9));
        assert_eq!(cache.failed_keys(), vec![9]);
        assert!(!cache.is_loading(9));

        assert_eq!(cache.fetch_previous(query(9)).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn new_attempt_clears_failed_flag_while_loading() {
        let gate = Arc::new(Semaphore::new(0));
        let upstream = FakeUpstream::new().failing(4).gated(Arc::clone(&gate));
        let cache = Arc::new(RecordCache::new(upstream.into_fetch()));

        gate.add_permits(1);
        cache.fetch_previous(query(4)).await;
        assert!(cache.is_failed(4));

        let task = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.fetch_previous(query(4)).await }
        });
        settle_tasks().await;
        assert!(cache.is_loading(4));
        assert!(!cache.is_failed(4));

        gate.add_permits(1);
        task.await.unwrap();
        assert!(cache.is_failed(4));
        assert!(cache.loading_keys().is_empty());
    }

    #[tokio::test]
    async fn panicking_fetch_settles_as_failed() {
        let upstream = FakeUpstream::new().panicking(11);
        let calls = Arc::clone(&upstream.calls);
        let cache = RecordCache::new(upstream.into_fetch());

        assert_eq!(cache.fetch_previous(query(11)).await, None);
        assert!(!cache.is_loading(11));
        assert!(cache.is_failed(11));
        assert!(!cache.contains(11));

        cache.fetch_previous(query(11)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_fetch_settles_without_a_waiting_caller() {
        let upstream = FakeUpstream::new().panicking(12);
        let cache = RecordCache::new(upstream.into_fetch());

        // One poll starts the request, then the caller goes away.
        assert!(cache.fetch_previous(query(12)).now_or_never().is_none());
        assert!(cache.is_loading(12));
        settle_tasks().await;

        assert!(cache.loading_keys().is_empty());
        assert!(cache.is_failed(12));
    }

    #[tokio::test]
    async fn fetch_function_may_read_the_cache() {
        let slot: Arc<Mutex<Option<Arc<RecordCache>>>> = Arc::new(Mutex::new(None));
        let fetch: Arc<FetchPreviousFn> = {
            let slot = Arc::clone(&slot);
            Arc::new(move |query: PreviousQuery| -> FetchFuture {
                let cache = slot.lock().unwrap().clone().expect("cache installed");
                let loading = cache.is_loading(query.record_id);
                Box::pin(async move {
                    assert!(loading);
                    Ok(Some(record(query.record_id)))
                })
            })
        };
        let cache = Arc::new(RecordCache::new(fetch));
        *slot.lock().unwrap() = Some(Arc::clone(&cache));

        assert_eq!(cache.fetch_previous(query(13)).await, Some(record(13)));
        assert!(!cache.is_loading(13));
    }

    #[tokio::test]
    async fn tracked_fetch_reports_who_started_the_request() {
        let gate = Arc::new(Semaphore::new(0));
        let upstream = FakeUpstream::new().gated(Arc::clone(&gate));
        let cache = Arc::new(RecordCache::new(upstream.into_fetch()));

        let first = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.fetch_tracked(query(14)).await.1 }
        });
        settle_tasks().await;
        let second = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.fetch_tracked(query(14)).await.1 }
        });
        settle_tasks().await;

        gate.add_permits(1);
        assert!(first.await.unwrap());
        assert!(!second.await.unwrap());
        assert!(!cache.fetch_tracked(query(14)).await.1);
    }

    // -- Concurrency -----------------------------------------------------

    #[tokio::test]
    async fn concurrent_callers_share_one_request() {
        let gate = Arc::new(Semaphore::new(0));
        let upstream = FakeUpstream::new().gated(Arc::clone(&gate));
        let calls = Arc::clone(&upstream.calls);
        let cache = Arc::new(RecordCache::new(upstream.into_fetch()));

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.fetch_previous(query(5)).await })
            })
            .collect();
        settle_tasks().await;
        assert_eq!(cache.loading_keys(), vec![5]);

        gate.add_permits(1);
        for task in tasks {
            assert_eq!(task.await.unwrap(), Some(record(5)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_loading(5));
    }

    #[tokio::test]
    async fn request_settles_after_caller_gives_up() {
        let gate = Arc::new(Semaphore::new(0));
        let upstream = FakeUpstream::new().gated(Arc::clone(&gate));
        let cache = Arc::new(RecordCache::new(upstream.into_fetch()));

        let caller = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.fetch_previous(query(6)).await }
        });
        settle_tasks().await;
        caller.abort();

        gate.add_permits(1);
        settle_tasks().await;
        assert!(!cache.is_loading(6));
        assert_eq!(cache.get(6), Some(Some(record(6))));
    }

    // -- Clear -----------------------------------------------------------

    #[tokio::test]
    async fn clear_empties_entries_and_failures() {
        let upstream = FakeUpstream::new().failing(2);
        let calls = Arc::clone(&upstream.calls);
        let cache = RecordCache::new(upstream.into_fetch());

        cache.fetch_previous(query(1)).await;
        cache.fetch_previous(query(2)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.is_failed(2));

        cache.clear_cache();
        assert!(cache.is_empty());
        assert!(cache.failed_keys().is_empty());

        cache.fetch_previous(query(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn in_flight_request_repopulates_after_clear() {
        let gate = Arc::new(Semaphore::new(0));
        let upstream = FakeUpstream::new().gated(Arc::clone(&gate));
        let cache = Arc::new(RecordCache::new(upstream.into_fetch()));

        let task = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.fetch_previous(query(8)).await }
        });
        settle_tasks().await;
        cache.clear_cache();

        gate.add_permits(1);
        task.await.unwrap();
        assert!(cache.contains(8));
    }
}
