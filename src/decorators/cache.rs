//! Predicate result cache
//!
//! Results are keyed by predicate identity and dropped wholesale after
//! every committed mutation.

use super::EditStage;
use crate::attr::Record;
use crate::collection::{Filter, Predicate, SearchableCollection};
use crate::editor::Modification;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Filter that remembers results of named predicates.
pub struct CachedFilter<R> {
    inner: Arc<dyn Filter<R>>,
    results: Mutex<AHashMap<u64, Vec<Arc<R>>>>,
}

impl<R: Record> CachedFilter<R> {
    pub fn new(inner: Arc<dyn Filter<R>>) -> Self {
        Self {
            inner,
            results: Mutex::new(AHashMap::new()),
        }
    }

    pub fn invalidate(&self) {
        self.results.lock().clear();
    }

    /// Number of cached result sets.
    pub fn cached(&self) -> usize {
        self.results.lock().len()
    }
}

impl<R: Record> Filter<R> for CachedFilter<R> {
    fn filter(&self, collection: &SearchableCollection<R>, predicate: &dyn Predicate<R>) -> Vec<Arc<R>> {
        let Some(id) = predicate.identity() else {
            return self.inner.filter(collection, predicate);
        };
        if let Some(hit) = self.results.lock().get(&id) {
            tracing::trace!(predicate = id, "cache hit");
            return hit.clone();
        }
        let fresh = self.inner.filter(collection, predicate);
        self.results.lock().insert(id, fresh.clone());
        fresh
    }
}

/// Invalidates the shared `CachedFilter` after each committed mutation.
pub struct CacheStage<R> {
    filter: Arc<CachedFilter<R>>,
}

impl<R: Record> CacheStage<R> {
    pub fn new(filter: Arc<CachedFilter<R>>) -> Self {
        Self { filter }
    }
}

impl<R: Record> EditStage<R> for CacheStage<R> {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn committed(&self, _modification: &Modification<R>) {
        self.filter.invalidate();
    }
}
