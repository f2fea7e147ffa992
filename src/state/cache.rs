use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::FieldSet;

/// Names a cached statistic and the state fields it is derived from.
///
/// Any update touching one of `depends_on` invalidates the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatKey {
    name: Cow<'static, str>,
    depends_on: FieldSet,
}

impl StatKey {
    #[must_use]
    pub const fn new(name: &'static str, depends_on: FieldSet) -> Self {
        Self {
            name: Cow::Borrowed(name),
            depends_on,
        }
    }

    /// Key with a runtime-built name, e.g. per-day statistics.
    #[must_use]
    pub fn owned(name: impl Into<String>, depends_on: FieldSet) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            depends_on,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn depends_on(&self) -> FieldSet {
        self.depends_on
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    computed_at: Instant,
    ttl: Duration,
    depends_on: FieldSet,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.computed_at) < self.ttl
    }
}

/// Type-erased TTL cache. Not synchronized; lives inside the store's lock.
#[derive(Debug, Default)]
pub(crate) struct StatsCache {
    entries: HashMap<String, CacheEntry>,
}

impl StatsCache {
    /// Fresh value for `key`, if present and of type `T`.
    pub(crate) fn get_fresh<T>(&self, key: &StatKey, now: Instant) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = self.entries.get(key.name())?;
        if !entry.is_fresh(now) {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    pub(crate) fn insert<T>(&mut self, key: &StatKey, value: T, ttl: Duration, now: Instant)
    where
        T: Send + Sync + 'static,
    {
        self.entries.insert(
            key.name().to_string(),
            CacheEntry {
                value: Arc::new(value),
                computed_at: now,
                ttl,
                depends_on: key.depends_on(),
            },
        );
    }

    /// Drops entries depending on any of `changed`. Returns how many were dropped.
    pub(crate) fn invalidate(&mut self, changed: FieldSet) -> usize {
        if changed.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.depends_on.intersects(changed));
        before - self.entries.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateField;

    const ALERTS: StatKey =
        StatKey::new("alerts", FieldSet::EMPTY.with(StateField::AlertsToday));

    #[test]
    fn expired_entry_is_a_miss() {
        let mut cache = StatsCache::default();
        let t0 = Instant::now();
        cache.insert(&ALERTS, 7u32, Duration::from_secs(60), t0);

        assert_eq!(cache.get_fresh::<u32>(&ALERTS, t0 + Duration::from_secs(59)), Some(7));
        assert_eq!(cache.get_fresh::<u32>(&ALERTS, t0 + Duration::from_secs(60)), None);
    }

    #[test]
    fn type_mismatch_is_a_miss() {
        let mut cache = StatsCache::default();
        let now = Instant::now();
        cache.insert(&ALERTS, 7u32, Duration::from_secs(60), now);
        assert_eq!(cache.get_fresh::<String>(&ALERTS, now), None);
    }

    #[test]
    fn owned_key_shares_entry_with_static_key_of_same_name() {
        let mut cache = StatsCache::default();
        let now = Instant::now();
        let day = 14;
        let per_day = StatKey::owned(
            format!("alerts_{day}"),
            FieldSet::EMPTY.with(StateField::AlertsToday),
        );
        assert_eq!(per_day.name(), "alerts_14");

        cache.insert(&per_day, 3u32, Duration::from_secs(60), now);
        let same = StatKey::new("alerts_14", FieldSet::EMPTY.with(StateField::AlertsToday));
        assert_eq!(per_day, same);
        assert_eq!(cache.get_fresh::<u32>(&same, now), Some(3));
        assert_eq!(cache.get_fresh::<u32>(&StatKey::owned("alerts_15", FieldSet::ALL), now), None);

        assert_eq!(cache.invalidate(FieldSet::of(&[StateField::AlertsToday])), 1);
        assert_eq!(cache.get_fresh::<u32>(&per_day, now), None);
    }

    #[test]
    fn invalidate_only_dependent_entries() {
        let mut cache = StatsCache::default();
        let now = Instant::now();
        let conn = StatKey::new("conn", FieldSet::EMPTY.with(StateField::ConnectionState));
        cache.insert(&ALERTS, 1u32, Duration::from_secs(60), now);
        cache.insert(&conn, 2u32, Duration::from_secs(60), now);

        assert_eq!(cache.invalidate(FieldSet::of(&[StateField::AlertsToday])), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_fresh::<u32>(&conn, now), Some(2));
        assert_eq!(cache.invalidate(FieldSet::EMPTY), 0);
        assert_eq!(cache.clear(), 1);
    }
}
