//! Search Index for O(log n) Range Queries
//!
//! Cache-friendly sorted array with binary search, ordered by the injected
//! comparator or the key's natural order. Records whose key is absent sit
//! in a separate bucket reachable only through `KeyQuery::Missing`.

use super::{Comparator, IndexKind, KeyGetter, KeyQuery, Order, RecordIndex, DEFAULT_BUCKET_SIZE};
use crate::attr::Record;
use crate::error::{RepoError, Result};
use crate::value::{Value, ValueType};
use std::cmp::Ordering;
use std::ops::Range;

/// Entry in the sorted index
#[derive(Clone, Debug)]
struct Entry {
    key: Value,
    slot: u32,
}

/// Ordered index, unique or not.
pub struct SearchIndex<R> {
    name: String,
    unique: bool,
    key: KeyGetter<R>,
    comparator: Option<Comparator>,
    /// Sorted by key; equal keys keep insertion order
    data: Vec<Entry>,
    /// Slots whose key is absent
    missing: Vec<u32>,
}

impl<R: Record> SearchIndex<R> {
    pub fn new(name: &str, key: KeyGetter<R>) -> Self {
        Self {
            name: name.to_string(),
            unique: false,
            key,
            comparator: None,
            data: Vec::with_capacity(DEFAULT_BUCKET_SIZE),
            missing: Vec::new(),
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn comparator(mut self, comparator: Option<Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Initial capacity of the sorted entry array.
    pub fn bucket_size(mut self, size: usize) -> Self {
        self.data.reserve(size.saturating_sub(self.data.len()));
        self
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match &self.comparator {
            Some(cmp) => cmp(a, b),
            None => a.cmp(b),
        }
    }

    /// First position whose key is not less than `key`
    fn lower_bound(&self, key: &Value) -> usize {
        self.data.partition_point(|e| self.compare(&e.key, key) == Ordering::Less)
    }

    /// First position whose key is greater than `key`
    fn upper_bound(&self, key: &Value) -> usize {
        self.data.partition_point(|e| self.compare(&e.key, key) != Ordering::Greater)
    }

    fn slots(&self, range: Range<usize>) -> Vec<u32> {
        if range.start >= range.end {
            return Vec::new();
        }
        self.data[range].iter().map(|e| e.slot).collect()
    }

    /// Keys in ascending order, absent keys excluded.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.data.iter().map(|e| &e.key)
    }
}

impl<R: Record> RecordIndex<R> for SearchIndex<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Search
    }

    fn is_unique(&self) -> bool {
        self.unique
    }

    fn key_type(&self) -> Option<ValueType> {
        if self.key.transform().is_some() {
            return None;
        }
        self.key.declared_type()
    }

    fn key_of(&self, record: &R) -> Option<Value> {
        self.key.derive(record)
    }

    fn normalize(&self, value: Value) -> Value {
        self.key.normalize(value)
    }

    fn insert(&mut self, slot: u32, key: Option<Value>) -> Result<()> {
        let Some(key) = key else {
            if !self.missing.contains(&slot) {
                self.missing.push(slot);
            }
            return Ok(());
        };

        let start = self.lower_bound(&key);
        let end = self.upper_bound(&key);
        if self.data[start..end].iter().any(|e| e.slot == slot) {
            return Ok(());
        }
        if self.unique && start < end {
            return Err(RepoError::DuplicateKey {
                index: self.name.clone(),
                key: key.to_string(),
            });
        }

        self.data.insert(end, Entry { key, slot });
        Ok(())
    }

    fn remove(&mut self, slot: u32, key: Option<&Value>) -> bool {
        let Some(key) = key else {
            let Some(pos) = self.missing.iter().position(|&s| s == slot) else { return false };
            self.missing.swap_remove(pos);
            return true;
        };

        let start = self.lower_bound(key);
        let end = self.upper_bound(key);
        match self.data[start..end].iter().position(|e| e.slot == slot) {
            Some(offset) => {
                self.data.remove(start + offset);
                true
            }
            None => false,
        }
    }

    fn lookup(&self, query: &KeyQuery) -> Result<Vec<u32>> {
        let len = self.data.len();
        let slots = match query {
            KeyQuery::Eq(k) => self.slots(self.lower_bound(k)..self.upper_bound(k)),
            KeyQuery::Gt(k) => self.slots(self.upper_bound(k)..len),
            KeyQuery::Ge(k) => self.slots(self.lower_bound(k)..len),
            KeyQuery::Lt(k) => self.slots(0..self.lower_bound(k)),
            KeyQuery::Le(k) => self.slots(0..self.upper_bound(k)),
            KeyQuery::Between(lo, hi) => self.slots(self.lower_bound(lo)..self.upper_bound(hi)),
            KeyQuery::Missing => self.missing.clone(),
            KeyQuery::All(Order::Ascending) => self.slots(0..len),
            KeyQuery::All(Order::Descending) => self.data.iter().rev().map(|e| e.slot).collect(),
        };
        Ok(slots)
    }

    fn len(&self) -> usize {
        self.data.len() + self.missing.len()
    }
}
