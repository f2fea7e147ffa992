use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::LockTimeout;
use crate::queue::duration_ms;

use super::cache::{StatKey, StatsCache};
use super::summary::StatusSummary;
use super::{FieldSet, SharedState};

const RESOURCE: &str = "shared_state";

#[derive(Debug, Default)]
struct StoreInner {
    state: SharedState,
    cache: StatsCache,
}

/// Lock-protected [`SharedState`] plus a TTL cache of derived statistics.
///
/// One lock guards both, and every acquisition is bounded by `lock_timeout`.
/// The lock is not re-entrant: a mutator passed to [`update`](Self::update)
/// gets `&mut SharedState` and must not call back into the store. If it does,
/// the nested call fails with [`LockTimeout`] instead of deadlocking.
///
/// Shutdown does not wake lock waiters. Closing the bus only wakes blocked
/// queue calls; a caller waiting here still returns within `lock_timeout`,
/// and the store stays readable after the consumer has stopped.
#[derive(Debug)]
pub struct SharedStateStore {
    inner: Mutex<StoreInner>,
    lock_timeout: Duration,
    stats_ttl: Duration,
}

impl SharedStateStore {
    #[must_use]
    pub fn new(lock_timeout: Duration, stats_ttl: Duration) -> Self {
        Self::with_state(SharedState::default(), lock_timeout, stats_ttl)
    }

    #[must_use]
    pub fn with_state(state: SharedState, lock_timeout: Duration, stats_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state,
                cache: StatsCache::default(),
            }),
            lock_timeout,
            stats_ttl,
        }
    }

    fn lock(&self, op: &'static str) -> Result<MutexGuard<'_, StoreInner>, LockTimeout> {
        self.inner.try_lock_for(self.lock_timeout).ok_or_else(|| {
            let timeout_ms = duration_ms(self.lock_timeout);
            warn!(op, timeout_ms, "shared state lock timed out");
            LockTimeout {
                resource: RESOURCE,
                timeout_ms,
            }
        })
    }

    /// Owned copy of the current state.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the lock is contended past the timeout.
    pub fn get_snapshot(&self) -> Result<SharedState, LockTimeout> {
        Ok(self.lock("get_snapshot")?.state.clone())
    }

    /// Applies `mutator` atomically and returns the fields it changed.
    ///
    /// The mutator works on a copy that is committed only if it returns, so a
    /// panicking mutator leaves the state untouched. Cache entries depending
    /// on any changed field are invalidated before the lock is released.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the lock is contended past the timeout.
    pub fn update<F>(&self, mutator: F) -> Result<FieldSet, LockTimeout>
    where
        F: FnOnce(&mut SharedState),
    {
        let mut guard = self.lock("update")?;
        let mut next = guard.state.clone();
        mutator(&mut next);

        let changed = guard.state.diff(&next);
        if changed.is_empty() {
            return Ok(changed);
        }
        guard.state = next;
        let invalidated = guard.cache.invalidate(changed);
        drop(guard);

        if invalidated > 0 {
            debug!(invalidated, "cached stats invalidated by state update");
        }
        Ok(changed)
    }

    /// Cached value for `key`, recomputed when missing, expired or invalidated.
    ///
    /// `compute` runs under the store lock, so concurrent callers missing the
    /// same key trigger exactly one computation; the others see its result.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the lock is contended past the timeout.
    pub fn get_cached_stat<T, F>(
        &self,
        key: &StatKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, LockTimeout>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&SharedState) -> T,
    {
        let mut guard = self.lock("get_cached_stat")?;
        let now = Instant::now();
        if let Some(hit) = guard.cache.get_fresh::<T>(key, now) {
            return Ok(hit);
        }

        let value = compute(&guard.state);
        guard.cache.insert(key, value.clone(), ttl, Instant::now());
        Ok(value)
    }

    /// The tray tooltip summary, cached with the store's default TTL.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the lock is contended past the timeout.
    pub fn status_summary(&self) -> Result<StatusSummary, LockTimeout> {
        self.get_cached_stat(&StatusSummary::KEY, self.stats_ttl, StatusSummary::from_state)
    }

    /// Drops every cached statistic, e.g. at a day boundary.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the lock is contended past the timeout.
    pub fn invalidate_all(&self) -> Result<usize, LockTimeout> {
        Ok(self.lock("invalidate_all")?.cache.clear())
    }

    /// Number of cached statistics, fresh or not.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the lock is contended past the timeout.
    pub fn cached_entry_count(&self) -> Result<usize, LockTimeout> {
        Ok(self.lock("cached_entry_count")?.cache.len())
    }

    /// Default TTL for cached statistics.
    #[must_use]
    pub const fn stats_ttl(&self) -> Duration {
        self.stats_ttl
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}
