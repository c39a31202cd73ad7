//! Bounded cache of reprojection transforms, keyed by `(from_srid, to_srid)`.
//!
//! Grounded on `src/api/features/crs.rs`'s `transform_geometry_sql` (decide
//! whether a transform is needed at all) generalized to an actual in-process
//! transform function, and on DESIGN NOTES §5's guidance that the CRS
//! transform cache is the only shared mutable state and "coarse locking is
//! fine — hit rate is high, critical section is short".

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::geom::Geometry;

/// A reprojection function from one SRID to another.
pub type ReprojectFn = std::sync::Arc<dyn Fn(&Geometry) -> Geometry + Send + Sync>;

const DEFAULT_CAPACITY: usize = 100;

struct CacheEntry {
    key: (i32, i32),
    transform: ReprojectFn,
}

/// LRU cache of `(from_srid, to_srid) -> ReprojectFn`. Entries are supplied
/// by the caller on miss (`get_or_insert_with`); this cache only owns
/// eviction policy, not transform construction.
pub struct TransformCache {
    capacity: usize,
    entries: Mutex<VecDeque<CacheEntry>>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TransformCache { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    /// Apply the transform for `(from_srid, to_srid)`, constructing it via
    /// `build` on a cache miss.
    pub fn apply_or_build(
        &self,
        from_srid: i32,
        to_srid: i32,
        geometry: &Geometry,
        build: impl FnOnce() -> ReprojectFn,
    ) -> Geometry {
        if from_srid == to_srid {
            return geometry.clone();
        }
        let key = (from_srid, to_srid);
        let mut entries = self.entries.lock().expect("transform cache mutex poisoned");

        if let Some(pos) = entries.iter().position(|e| e.key == key) {
            let entry = entries.remove(pos).unwrap();
            let result = (entry.transform)(geometry);
            entries.push_front(entry);
            return result;
        }

        let transform = build();
        let result = (transform)(geometry);
        if entries.len() >= self.capacity {
            entries.pop_back();
        }
        entries.push_front(CacheEntry { key, transform });
        result
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("transform cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}
