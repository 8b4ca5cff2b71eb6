//! Type-hierarchy index
//!
//! Keyed by `Record::type_name`. Each concrete type owns a RoaringBitmap
//! of slots; a lookup by an ancestor returns the union of every
//! descendant's bitmap. Ancestry comes from an explicit child -> parent
//! table supplied at build time.

use super::{Comparator, IndexKind, KeyGetter, KeyQuery, KeySource, Order, RecordIndex, TYPE_INDEX};
use crate::attr::Record;
use crate::error::{RepoError, Result};
use crate::value::{Value, ValueType};
use ahash::{AHashMap, AHashSet};
use roaring::RoaringBitmap;
use std::cmp::Ordering;

/// Child type name -> parent type name.
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    parents: AHashMap<String, String>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` as a direct subtype of `parent`.
    pub fn with(mut self, child: impl Into<String>, parent: impl Into<String>) -> Self {
        self.parents.insert(child.into(), parent.into());
        self
    }

    pub fn parent(&self, name: &str) -> Option<&str> {
        self.parents.get(name).map(String::as_str)
    }

    /// Whether `name` equals `ancestor` or descends from it.
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        let mut seen = AHashSet::new();
        let mut current = name;
        loop {
            if current == ancestor {
                return true;
            }
            // cycle guard
            if !seen.insert(current) {
                return false;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn normalized(&self, f: impl Fn(&str) -> String) -> Self {
        Self {
            parents: self.parents.iter().map(|(c, p)| (f(c), f(p))).collect(),
        }
    }
}

/// Index over the runtime type of each record.
pub struct TypeHierarchyIndex<R> {
    key: KeyGetter<R>,
    hierarchy: TypeHierarchy,
    comparator: Option<Comparator>,
    /// concrete type name -> slots
    buckets: AHashMap<String, RoaringBitmap>,
    count: usize,
}

impl<R: Record> TypeHierarchyIndex<R> {
    pub fn new(hierarchy: TypeHierarchy) -> Self {
        Self::with_key(KeyGetter::new(KeySource::TypeName), hierarchy)
    }

    /// Type names in the table are normalized through `key`'s transform.
    pub fn with_key(key: KeyGetter<R>, hierarchy: TypeHierarchy) -> Self {
        let hierarchy = hierarchy.normalized(|name| text_of(key.normalize(Value::from(name))));
        Self {
            key,
            hierarchy,
            comparator: None,
            buckets: AHashMap::new(),
            count: 0,
        }
    }

    pub fn comparator(mut self, comparator: Option<Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// Concrete type names currently holding records.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    fn sorted_names(&self, order: Order) -> Vec<&String> {
        let mut names: Vec<&String> = self.buckets.keys().collect();
        names.sort_by(|a, b| match &self.comparator {
            Some(cmp) => cmp(&Value::from(a.as_str()), &Value::from(b.as_str())),
            None => a.cmp(b),
        });
        if order == Order::Descending {
            names.reverse();
        }
        names
    }
}

fn text_of(value: Value) -> String {
    match value {
        Value::Text(s) => s,
        other => other.to_string(),
    }
}

impl<R: Record> RecordIndex<R> for TypeHierarchyIndex<R> {
    fn name(&self) -> &str {
        TYPE_INDEX
    }

    fn kind(&self) -> IndexKind {
        IndexKind::TypeHierarchy
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn key_type(&self) -> Option<ValueType> {
        if self.key.transform().is_some() {
            return None;
        }
        Some(ValueType::Text)
    }

    fn key_of(&self, record: &R) -> Option<Value> {
        self.key.derive(record)
    }

    fn normalize(&self, value: Value) -> Value {
        self.key.normalize(value)
    }

    fn insert(&mut self, slot: u32, key: Option<Value>) -> Result<()> {
        let Some(key) = key else { return Ok(()) };
        if self.buckets.entry(text_of(key)).or_default().insert(slot) {
            self.count += 1;
        }
        Ok(())
    }

    fn remove(&mut self, slot: u32, key: Option<&Value>) -> bool {
        let Some(key) = key else { return false };
        let name = text_of(key.clone());
        let Some(bucket) = self.buckets.get_mut(&name) else { return false };
        if !bucket.remove(slot) {
            return false;
        }
        if bucket.is_empty() {
            self.buckets.remove(&name);
        }
        self.count -= 1;
        true
    }

    fn lookup(&self, query: &KeyQuery) -> Result<Vec<u32>> {
        match query {
            KeyQuery::Eq(ancestor) => {
                let ancestor = text_of(ancestor.clone());
                let mut hits = RoaringBitmap::new();
                for (name, bucket) in &self.buckets {
                    if self.hierarchy.is_a(name, &ancestor) {
                        hits |= bucket;
                    }
                }
                Ok(hits.iter().collect())
            }
            KeyQuery::All(order) => Ok(self
                .sorted_names(*order)
                .into_iter()
                .filter_map(|name| self.buckets.get(name))
                .flat_map(|bucket| bucket.iter())
                .collect()),
            KeyQuery::Missing => Ok(Vec::new()),
            other => Err(RepoError::UnsupportedQuery {
                index: TYPE_INDEX.to_string(),
                query: other.op(),
            }),
        }
    }

    fn len(&self) -> usize {
        self.count
    }
}

/// Order type names by depth first, then by name (used by `All` when a
/// caller wants ancestors before descendants).
pub fn depth_order(hierarchy: &TypeHierarchy) -> Comparator {
    let hierarchy = hierarchy.clone();
    std::sync::Arc::new(move |a: &Value, b: &Value| {
        let depth = |v: &Value| {
            let mut d = 0usize;
            let mut seen = AHashSet::new();
            let mut current = v.as_str().unwrap_or_default().to_string();
            while let Some(parent) = hierarchy.parent(&current) {
                if !seen.insert(current.clone()) {
                    break;
                }
                current = parent.to_string();
                d += 1;
            }
            d
        };
        match depth(a).cmp(&depth(b)) {
            Ordering::Equal => a.cmp(b),
            other => other,
        }
    })
}
