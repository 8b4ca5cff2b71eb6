//! Lookup Index for O(1) Equality Lookups
//!
//! Hash buckets keyed by the derived key (ahash). Buckets start at the
//! configured size and grow without bound.

use super::{IndexKind, KeyGetter, KeyQuery, RecordIndex, DEFAULT_BUCKET_SIZE};
use crate::attr::Record;
use crate::error::{RepoError, Result};
use crate::value::{Value, ValueType};
use ahash::AHashMap;

/// Exact-match index, unique or not.
pub struct LookupIndex<R> {
    name: String,
    unique: bool,
    bucket_size: usize,
    key: KeyGetter<R>,
    /// derived key -> slots
    buckets: AHashMap<Value, Vec<u32>>,
    count: usize,
}

impl<R: Record> LookupIndex<R> {
    pub fn new(name: &str, key: KeyGetter<R>) -> Self {
        Self {
            name: name.to_string(),
            unique: false,
            bucket_size: DEFAULT_BUCKET_SIZE,
            key,
            buckets: AHashMap::new(),
            count: 0,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn bucket_size(mut self, size: usize) -> Self {
        self.bucket_size = size.max(1);
        self
    }

    /// Slots stored under `key`.
    pub fn get(&self, key: &Value) -> &[u32] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First slot under `key`, for unique indexes.
    pub fn get_one(&self, key: &Value) -> Option<u32> {
        self.get(key).first().copied()
    }

    pub fn key_getter(&self) -> &KeyGetter<R> {
        &self.key
    }
}

impl<R: Record> RecordIndex<R> for LookupIndex<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Lookup
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
        // Absent keys are not indexed
        let Some(key) = key else { return Ok(()) };

        if let Some(bucket) = self.buckets.get(&key) {
            if bucket.contains(&slot) {
                return Ok(());
            }
            if self.unique && !bucket.is_empty() {
                return Err(RepoError::DuplicateKey {
                    index: self.name.clone(),
                    key: key.to_string(),
                });
            }
        }

        let bucket_size = self.bucket_size;
        self.buckets
            .entry(key)
            .or_insert_with(|| Vec::with_capacity(bucket_size))
            .push(slot);
        self.count += 1;
        Ok(())
    }

    fn remove(&mut self, slot: u32, key: Option<&Value>) -> bool {
        let Some(key) = key else { return false };
        let Some(bucket) = self.buckets.get_mut(key) else { return false };

        // swap with last for O(1)
        let Some(pos) = bucket.iter().position(|&s| s == slot) else { return false };
        bucket.swap_remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        self.count -= 1;
        true
    }

    fn lookup(&self, query: &KeyQuery) -> Result<Vec<u32>> {
        match query {
            KeyQuery::Eq(key) => Ok(self.get(key).to_vec()),
            other => Err(RepoError::UnsupportedQuery {
                index: self.name.clone(),
                query: other.op(),
            }),
        }
    }

    fn len(&self) -> usize {
        self.count
    }
}
