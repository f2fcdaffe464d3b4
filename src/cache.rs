//! Content-addressed memoization of pipeline stages.
//!
//! An entry is keyed by the stage, a fingerprint of the configuration and a
//! fingerprint of the input dataset's contents, so any change to the input
//! produces a different key and stale results are never returned.

use crate::data_models::{Dataset, Observation};
use crate::metrics::METRICS;
use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub stage: &'static str,
    pub config: u64,
    pub input: u64,
}

fn hash_float<H: Hasher>(value: Option<f64>, state: &mut H) {
    value.map(f64::to_bits).hash(state);
}

fn hash_observation<H: Hasher>(row: &Observation, state: &mut H) {
    row.no.hash(state);
    row.year.hash(state);
    row.month.hash(state);
    row.day.hash(state);
    row.hour.hash(state);
    row.timestamp.hash(state);
    row.station.hash(state);
    for value in [
        row.pm25,
        row.pm10,
        row.so2,
        row.no2,
        row.co,
        row.o3,
        row.temp,
        row.pres,
        row.dewp,
        row.rain,
        row.wspm,
        row.vehicle_pollution,
        row.industrial_pollution,
        row.aqi,
        row.pm25_lag1,
        row.aqi_lag1,
    ] {
        hash_float(value, state);
    }
    row.wd.hash(state);
    row.aqi_category.hash(state);
}

/// Fingerprint of a dataset's schema and every cell value.
pub fn fingerprint_dataset(dataset: &Dataset) -> u64 {
    let mut hasher = DefaultHasher::new();
    dataset.columns().hash(&mut hasher);
    dataset.len().hash(&mut hasher);
    for row in dataset.rows() {
        hash_observation(row, &mut hasher);
    }
    hasher.finish()
}

struct Entries<V> {
    values: HashMap<CacheKey, V>,
    order: VecDeque<CacheKey>,
}

/// Bounded cache with first-in first-out eviction. A capacity of zero
/// disables it.
pub struct StageCache<V> {
    capacity: usize,
    entries: Mutex<Entries<V>>,
}

impl<V: Clone> StageCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries { values: HashMap::new(), order: VecDeque::new() }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        let hit = self.entries.lock().values.get(key).cloned();
        let mut metrics = METRICS.lock();
        if hit.is_some() {
            debug!("Stage cache hit for '{}'", key.stage);
            metrics.record_cache_hit();
        } else {
            metrics.record_cache_miss();
        }
        hit
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.values.insert(key, value).is_none() {
            entries.order.push_back(key);
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.values.remove(&oldest);
                debug!("Evicted stage cache entry for '{}'", oldest.stage);
            }
        }
    }

    /// Cached value for `key`, computing and storing it on a miss.
    pub fn get_or_try_insert<E, F>(&self, key: CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.values.clear();
        entries.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn key(input: u64) -> CacheKey {
        CacheKey { stage: "transform", config: 1, input }
    }

    fn sample() -> Dataset {
        let row = Observation { station: Some("Wanliu".to_string()), pm25: Some(3.0), ..Default::default() };
        Dataset::new(vec![Column::Station, Column::Pm25], vec![row])
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let original = sample();
        let mut changed = sample();
        assert_eq!(fingerprint_dataset(&original), fingerprint_dataset(&changed));

        changed.rows_mut()[0].pm25 = Some(3.5);
        assert_ne!(fingerprint_dataset(&original), fingerprint_dataset(&changed));
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = StageCache::new(2);
        cache.insert(key(1), 10);
        cache.insert(key(2), 20);
        cache.insert(key(3), 30);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1)), None);
        assert_eq!(cache.get(&key(3)), Some(30));
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = StageCache::new(0);
        cache.insert(key(1), 10);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key(1)), None);
    }

    #[test]
    fn test_compute_runs_once_per_key() {
        let cache = StageCache::new(4);
        let mut calls = 0;
        for _ in 0..3 {
            let value: Result<i32, ()> = cache.get_or_try_insert(key(7), || {
                calls += 1;
                Ok(70)
            });
            assert_eq!(value, Ok(70));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: StageCache<i32> = StageCache::new(4);
        let failed: Result<i32, &str> = cache.get_or_try_insert(key(9), || Err("boom"));
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }
}
