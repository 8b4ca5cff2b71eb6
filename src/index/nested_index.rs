//! Nested-key index: a search index keyed by a dotted attribute path.

use super::{Comparator, IndexKind, KeyGetter, KeyQuery, KeySource, RecordIndex, SearchIndex};
use crate::attr::{AccessMode, Accessor, Component, Record, Schema};
use crate::error::{RepoError, Result};
use crate::value::{Value, ValueType};
use smallvec::SmallVec;
use std::sync::Arc;

/// Resolved attribute path, e.g. `address.city.name`.
///
/// The first step is read through the record's accessor; later steps walk
/// the nested snapshots. A null link makes the whole key absent.
pub struct NestedPath<R> {
    root: Arc<dyn Accessor<R>>,
    steps: SmallVec<[String; 4]>,
    leaf: ValueType,
}

impl<R> Clone for NestedPath<R> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            steps: self.steps.clone(),
            leaf: self.leaf,
        }
    }
}

impl<R: Record> NestedPath<R> {
    /// Resolve a dotted path against `schema`, checking every step.
    pub fn resolve(schema: &Schema<R>, path: &str, mode: AccessMode, prefer_property: bool) -> Result<Self> {
        let mut parts = path.split('.');
        let head = parts.next().unwrap_or_default();
        let root = schema
            .accessor(head, mode, prefer_property)
            .ok_or_else(|| RepoError::config(format!("no attribute {head} on {}", schema.type_name())))?;

        let mut leaf = root.descriptor().ty;
        let mut component: Option<Component> = root.descriptor().component.clone();
        let mut steps = SmallVec::new();
        for step in parts {
            let Some(current) = component.take() else {
                return Err(RepoError::config(format!("{path}: attribute before {step} is not nested")));
            };
            let descriptor = current
                .attributes()?
                .iter()
                .find(|a| a.name == step)
                .ok_or_else(|| RepoError::config(format!("{path}: no attribute {step} on {}", current.type_name())))?;
            leaf = descriptor.ty;
            component = descriptor.component.clone();
            steps.push(step.to_string());
        }

        Ok(Self { root, steps, leaf })
    }

    /// Value at the end of the path; `None` when an intermediate link is null.
    pub fn walk(&self, record: &R) -> Option<Value> {
        let mut current = self.root.get(record);
        for step in &self.steps {
            if current.is_null() {
                return None;
            }
            current = current.get(step)?.clone();
        }
        Some(current)
    }

    /// Declared type of the last step.
    pub fn leaf_type(&self) -> ValueType {
        self.leaf
    }

    pub fn dotted(&self) -> String {
        let mut out = self.root.name().to_string();
        for step in &self.steps {
            out.push('.');
            out.push_str(step);
        }
        out
    }
}

/// Search index whose key is read through a `NestedPath`.
///
/// Records with a null link land in the missing bucket, reachable only
/// through `KeyQuery::Missing`.
pub struct NestedKeyIndex<R> {
    inner: SearchIndex<R>,
    leaf: ValueType,
    transformed: bool,
}

impl<R: Record> NestedKeyIndex<R> {
    pub fn new(name: &str, key: KeyGetter<R>) -> Result<Self> {
        let KeySource::Path(path) = key.source() else {
            return Err(RepoError::config(format!("nested index {name} needs a path key")));
        };
        Ok(Self {
            leaf: path.leaf_type(),
            transformed: key.transform().is_some(),
            inner: SearchIndex::new(name, key),
        })
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.inner = self.inner.unique(unique);
        self
    }

    pub fn comparator(mut self, comparator: Option<Comparator>) -> Self {
        self.inner = self.inner.comparator(comparator);
        self
    }

    pub fn bucket_size(mut self, size: usize) -> Self {
        self.inner = self.inner.bucket_size(size);
        self
    }
}

impl<R: Record> RecordIndex<R> for NestedKeyIndex<R> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Nested
    }

    fn is_unique(&self) -> bool {
        self.inner.is_unique()
    }

    fn key_type(&self) -> Option<ValueType> {
        (!self.transformed).then_some(self.leaf)
    }

    fn key_of(&self, record: &R) -> Option<Value> {
        self.inner.key_of(record)
    }

    fn normalize(&self, value: Value) -> Value {
        self.inner.normalize(value)
    }

    fn insert(&mut self, slot: u32, key: Option<Value>) -> Result<()> {
        self.inner.insert(slot, key)
    }

    fn remove(&mut self, slot: u32, key: Option<&Value>) -> bool {
        self.inner.remove(slot, key)
    }

    fn lookup(&self, query: &KeyQuery) -> Result<Vec<u32>> {
        self.inner.lookup(query)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
