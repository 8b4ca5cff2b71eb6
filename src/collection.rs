//! Searchable Collection
//!
//! Primary store plus the registry of named indexes.
//!
//! Design:
//! - Records live in a slab of `u32` slots; indexes store slots, never records
//! - Each live slot remembers the keys it was indexed under, so removal never
//!   re-derives keys from a record that may have changed since
//! - The primary key index is a unique `LookupIndex`, addressable by its name
//! - Secondary indexes are kept in registration order; the editor walks them
//!   in that order and rolls back in reverse
//! - No internal locking: mutation goes through `&mut self`

use crate::attr::Record;
use crate::error::{RepoError, Result};
use crate::index::{KeyQuery, LookupIndex, RecordIndex};
use crate::value::{Value, ValueType};
use ahash::AHashMap;
use roaring::RoaringBitmap;
use std::sync::Arc;

/// A record test evaluated during full scans.
///
/// `identity` names the predicate for result caching; anonymous
/// predicates return `None` and are never cached.
pub trait Predicate<R>: Send + Sync {
    fn test(&self, record: &R) -> bool;

    fn identity(&self) -> Option<u64> {
        None
    }
}

impl<R, F> Predicate<R> for F
where
    F: Fn(&R) -> bool + Send + Sync,
{
    fn test(&self, record: &R) -> bool {
        self(record)
    }
}

/// Predicate with a stable identity, eligible for the result cache.
pub struct Named<P> {
    name: String,
    id: u64,
    inner: P,
}

impl<P> Named<P> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<R, P: Predicate<R>> Predicate<R> for Named<P> {
    fn test(&self, record: &R) -> bool {
        self.inner.test(record)
    }

    fn identity(&self) -> Option<u64> {
        Some(self.id)
    }
}

/// Give a predicate a name. Equal names share cached results.
pub fn named<P>(name: &str, predicate: P) -> Named<P> {
    Named {
        name: name.to_string(),
        id: seahash::hash(name.as_bytes()),
        inner: predicate,
    }
}

/// Evaluates predicates over a collection.
pub trait Filter<R>: Send + Sync {
    fn filter(&self, collection: &SearchableCollection<R>, predicate: &dyn Predicate<R>) -> Vec<Arc<R>>;
}

/// Uncached full scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanFilter;

impl<R: Record> Filter<R> for ScanFilter {
    fn filter(&self, collection: &SearchableCollection<R>, predicate: &dyn Predicate<R>) -> Vec<Arc<R>> {
        collection.scan(predicate)
    }
}

/// One live record and the keys it is indexed under.
pub(crate) struct Stored<R> {
    pub(crate) record: Arc<R>,
    pub(crate) primary: Value,
    /// One entry per secondary index, in registration order
    pub(crate) keys: Vec<Option<Value>>,
}

/// Primary store and named index registry.
pub struct SearchableCollection<R> {
    slots: Vec<Option<Stored<R>>>,
    free: Vec<u32>,
    live: RoaringBitmap,
    primary: LookupIndex<R>,
    indexes: Vec<Box<dyn RecordIndex<R>>>,
    names: AHashMap<String, usize>,
    filter: Arc<dyn Filter<R>>,
    remove_duplication: bool,
}

impl<R: Record> SearchableCollection<R> {
    /// Registry is fixed here; indexes cannot be added once records exist.
    pub(crate) fn new(
        primary: LookupIndex<R>,
        indexes: Vec<Box<dyn RecordIndex<R>>>,
        filter: Arc<dyn Filter<R>>,
        remove_duplication: bool,
    ) -> Result<Self> {
        let mut names = AHashMap::new();
        for (pos, index) in indexes.iter().enumerate() {
            if index.name() == primary.name() || names.insert(index.name().to_string(), pos).is_some() {
                return Err(RepoError::config(format!("index {} registered twice", index.name())));
            }
        }
        Ok(Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: RoaringBitmap::new(),
            primary,
            indexes,
            names,
            filter,
            remove_duplication,
        })
    }

    pub fn primary_key_name(&self) -> &str {
        self.primary.name()
    }

    /// Index names: the primary key first, then secondaries in registration order.
    pub fn index_names(&self) -> Vec<&str> {
        std::iter::once(self.primary.name())
            .chain(self.indexes.iter().map(|i| i.name()))
            .collect()
    }

    pub fn index(&self, name: &str) -> Option<&dyn RecordIndex<R>> {
        if name == self.primary.name() {
            return Some(&self.primary as &dyn RecordIndex<R>);
        }
        self.names.get(name).map(|&pos| self.indexes[pos].as_ref())
    }

    fn require(&self, name: &str) -> Result<&dyn RecordIndex<R>> {
        self.index(name).ok_or_else(|| RepoError::UnknownIndex(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.live.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Coerce a caller-supplied key to the index's declared key type.
    pub(crate) fn coerce_key(index: &dyn RecordIndex<R>, value: Value) -> Result<Value> {
        match index.key_type() {
            Some(ValueType::Any) | None => Ok(value),
            Some(ty) => value.coerce(ty),
        }
    }

    /// Caller-supplied primary key in stored form: coerced to the
    /// attribute's type, then passed through the primary's transform.
    pub(crate) fn primary_key(&self, key: Value) -> Result<Value> {
        let getter = self.primary.key_getter();
        let key = match getter.declared_type() {
            Some(ValueType::Any) | None => key,
            Some(ty) => key.coerce(ty)?,
        };
        Ok(getter.normalize(key))
    }

    /// Slot of the record stored under `key`.
    pub(crate) fn slot_of(&self, key: &Value) -> Option<u32> {
        self.primary.get_one(key)
    }

    pub(crate) fn stored(&self, slot: u32) -> Option<&Stored<R>> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    fn record(&self, slot: u32) -> Option<&Arc<R>> {
        self.stored(slot).map(|s| &s.record)
    }

    fn records(&self, slots: impl IntoIterator<Item = u32>) -> Vec<Arc<R>> {
        slots
            .into_iter()
            .filter_map(|slot| self.record(slot).cloned())
            .collect()
    }

    pub fn get(&self, key: &Value) -> Option<Arc<R>> {
        self.slot_of(key).and_then(|slot| self.record(slot).cloned())
    }

    /// Every record in slot order.
    pub fn all(&self) -> Vec<Arc<R>> {
        self.records(self.live.iter())
    }

    /// Records matching `query` on the named index.
    ///
    /// Bounds are coerced to the index's key type when it declares one.
    /// Transformed indexes compare against transformed keys as stored.
    pub fn query_by_index(&self, name: &str, query: KeyQuery) -> Result<Vec<Arc<R>>> {
        let index = self.require(name)?;
        let query = query.map_bounds(|v| Self::coerce_key(index, v))?;
        Ok(self.records(index.lookup(&query)?))
    }

    /// Records matching any of the `(index, query)` pairs, in pair order.
    /// Duplicates are dropped when the collection removes duplication.
    pub fn query_union(&self, queries: &[(&str, KeyQuery)]) -> Result<Vec<Arc<R>>> {
        let mut slots = Vec::new();
        let mut seen = RoaringBitmap::new();
        for (name, query) in queries {
            let index = self.require(name)?;
            let query = query.clone().map_bounds(|v| Self::coerce_key(index, v))?;
            for slot in index.lookup(&query)? {
                if !self.remove_duplication || seen.insert(slot) {
                    slots.push(slot);
                }
            }
        }
        Ok(self.records(slots))
    }

    /// Full scan through the configured filter (cached or not).
    pub fn query_by_predicate(&self, predicate: &dyn Predicate<R>) -> Vec<Arc<R>> {
        self.filter.filter(self, predicate)
    }

    /// Apply the named index's key transform to a bound.
    pub fn index_key(&self, name: &str, value: Value) -> Result<Value> {
        Ok(self.require(name)?.normalize(value))
    }

    pub fn index_len(&self, name: &str) -> Result<usize> {
        Ok(self.require(name)?.len())
    }

    /// Uncached scan over the live slots.
    #[cfg(not(feature = "parallel"))]
    pub fn scan(&self, predicate: &dyn Predicate<R>) -> Vec<Arc<R>> {
        self.live
            .iter()
            .filter_map(|slot| self.record(slot))
            .filter(|r| predicate.test(r))
            .cloned()
            .collect()
    }

    /// Uncached scan over the live slots, split across the Rayon pool.
    #[cfg(feature = "parallel")]
    pub fn scan(&self, predicate: &dyn Predicate<R>) -> Vec<Arc<R>> {
        use rayon::prelude::*;

        let slots: Vec<u32> = self.live.iter().collect();
        slots
            .into_par_iter()
            .filter_map(|slot| self.record(slot))
            .filter(|r| predicate.test(r))
            .cloned()
            .collect()
    }

    // ---- mutation, driven by the object editor ----

    pub(crate) fn primary_mut(&mut self) -> &mut LookupIndex<R> {
        &mut self.primary
    }

    pub(crate) fn primary_index(&self) -> &LookupIndex<R> {
        &self.primary
    }

    pub(crate) fn indexes(&self) -> &[Box<dyn RecordIndex<R>>] {
        &self.indexes
    }

    pub(crate) fn indexes_mut(&mut self) -> &mut [Box<dyn RecordIndex<R>>] {
        &mut self.indexes
    }

    /// Place a record in a free slot.
    pub(crate) fn allocate(&mut self, stored: Stored<R>) -> u32 {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(stored);
                slot
            }
            None => {
                self.slots.push(Some(stored));
                (self.slots.len() - 1) as u32
            }
        };
        self.live.insert(slot);
        slot
    }

    /// Swap the record held by a live slot.
    pub(crate) fn replace(&mut self, slot: u32, stored: Stored<R>) -> Option<Stored<R>> {
        self.slots.get_mut(slot as usize)?.replace(stored)
    }

    pub(crate) fn release(&mut self, slot: u32) -> Option<Stored<R>> {
        let stored = self.slots.get_mut(slot as usize)?.take()?;
        self.live.remove(slot);
        self.free.push(slot);
        Some(stored)
    }
}
