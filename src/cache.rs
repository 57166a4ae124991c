//! In-memory exchange-rate cache with a single, cache-wide expiry.

use crate::error::CacheMiss;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// How long the whole cache stays valid after it was (re)started.
pub const STALENESS_WINDOW: TimeDelta = TimeDelta::hours(12);

/// Source of the current time for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Useful for exercising expiry.
///
/// ```
/// use chrono::TimeDelta;
/// use fxledger::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let before = clock.now();
/// clock.advance(TimeDelta::hours(13));
/// assert_eq!(clock.now() - before, TimeDelta::hours(13));
/// ```
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock(Mutex::new(start))
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct RateTable {
    created_at: DateTime<Utc>,
    rates: HashMap<String, HashMap<NaiveDate, f64>>,
}

impl RateTable {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - STALENESS_WINDOW > self.created_at
    }
}

/// Exchange rates previously fetched, keyed by currency descriptor and then
/// by effective date.
///
/// Expiry is all-or-nothing: once the cache is older than
/// [`STALENESS_WINDOW`], every read misses, and the next write discards all
/// entries and restarts the clock. Reads never evict.
///
/// The read path and the write path each check staleness under their own
/// lock acquisition. A reader can therefore see a fresh cache, a writer can
/// then wipe it, and later readers miss. The cache is advisory, so callers
/// always have the data source to fall back on.
pub struct RateCache {
    table: RwLock<RateTable>,
    clock: Arc<dyn Clock>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let created_at = clock.now();
        RateCache {
            table: RwLock::new(RateTable {
                created_at,
                rates: HashMap::new(),
            }),
            clock,
        }
    }

    /// Latest cached rate for `descriptor` effective strictly after `start`
    /// and strictly before `tx_date`.
    ///
    /// Misses when the cache is stale, when nothing is cached for the
    /// descriptor, or when no entry falls inside the open window.
    pub fn get(
        &self,
        descriptor: &str,
        start: NaiveDate,
        tx_date: NaiveDate,
    ) -> Result<(NaiveDate, f64), CacheMiss> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);

        if table.is_stale(self.clock.now()) {
            debug!("rate cache stale, miss for {descriptor}");
            return Err(CacheMiss);
        }

        let dates = table.rates.get(descriptor).ok_or(CacheMiss)?;

        let mut best: Option<(NaiveDate, f64)> = None;
        for (&date, &rate) in dates {
            if start < date && date < tx_date && best.is_none_or(|(found, _)| date > found) {
                best = Some((date, rate));
            }
        }

        match best {
            Some(hit) => {
                debug!("rate cache hit for {descriptor} at {}", hit.0);
                Ok(hit)
            }
            None => {
                debug!("rate cache has no {descriptor} rate in ({start}, {tx_date})");
                Err(CacheMiss)
            }
        }
    }

    /// Store `rate` for `descriptor` effective on `date`.
    ///
    /// If the cache has gone stale it is emptied and restarted first.
    pub fn set(&self, descriptor: &str, date: NaiveDate, rate: f64) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        if table.is_stale(now) {
            warn!(
                "rate cache expired, dropping {} descriptor(s)",
                table.rates.len()
            );
            table.rates.clear();
            table.created_at = now;
        }

        table
            .rates
            .entry(descriptor.to_string())
            .or_default()
            .insert(date, rate);
    }

    /// Number of cached (descriptor, date) entries, stale or not.
    pub fn len(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.rates.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time since the cache was last (re)started.
    pub fn age(&self) -> TimeDelta {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        self.clock.now() - table.created_at
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateCache")
            .field("entries", &self.len())
            .field("age", &self.age())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_bounds_are_exclusive() {
        let cache = RateCache::new();
        cache.set("Canada-Dollar", date(2023, 6, 30), 1.3);

        assert_eq!(
            cache.get("Canada-Dollar", date(2023, 6, 29), date(2023, 7, 1)),
            Ok((date(2023, 6, 30), 1.3))
        );
        assert_eq!(cache.get("Canada-Dollar", date(2023, 6, 30), date(2023, 7, 1)), Err(CacheMiss));
        assert_eq!(cache.get("Canada-Dollar", date(2023, 6, 1), date(2023, 6, 30)), Err(CacheMiss));
    }

    #[test]
    fn staleness_is_strictly_after_window() {
        let clock = Arc::new(ManualClock::default());
        let cache = RateCache::with_clock(clock.clone());
        cache.set("Canada-Dollar", date(2023, 6, 30), 1.3);

        clock.advance(STALENESS_WINDOW);
        assert!(cache.get("Canada-Dollar", date(2023, 1, 1), date(2023, 7, 1)).is_ok());

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(cache.get("Canada-Dollar", date(2023, 1, 1), date(2023, 7, 1)), Err(CacheMiss));
        // Reads do not evict.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn upsert_replaces_same_date() {
        let cache = RateCache::new();
        cache.set("Canada-Dollar", date(2023, 6, 30), 1.3);
        cache.set("Canada-Dollar", date(2023, 6, 30), 1.4);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("Canada-Dollar", date(2023, 1, 1), date(2023, 7, 1)),
            Ok((date(2023, 6, 30), 1.4))
        );
    }
}
