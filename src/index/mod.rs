//! Secondary Index Module
//!
//! Indexes map derived keys to record slots in the primary store.
//!
//! Design:
//! - LookupIndex: exact-match hash buckets (ahash)
//! - SearchIndex: sorted entries + binary search, range and ordered scans
//! - NestedKeyIndex: SearchIndex keyed by a dotted attribute path
//! - TypeHierarchyIndex: type name -> RoaringBitmap, queryable by ancestor
//! - No internal locking; mutated only through the object editor

mod hierarchy_index;
mod key;
mod lookup_index;
mod nested_index;
mod search_index;

pub use hierarchy_index::{depth_order, TypeHierarchy, TypeHierarchyIndex};
pub use key::{Comparator, KeyGetter, KeySource, KeyTransform};
pub use lookup_index::LookupIndex;
pub use nested_index::{NestedKeyIndex, NestedPath};
pub use search_index::SearchIndex;

use crate::error::Result;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

/// Buckets start with room for this many records unless configured.
pub const DEFAULT_BUCKET_SIZE: usize = 3;

/// Name the type hierarchy index is registered under.
pub const TYPE_INDEX: &str = "_type";

/// Index family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Exact match (O(1))
    Lookup,
    /// Ordered, range-capable (O(log n))
    Search,
    /// Ordered, keyed by an attribute path
    Nested,
    /// Keyed by runtime type, answers by ancestor
    TypeHierarchy,
}

/// Iteration order for `KeyQuery::All`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// A key or key range to look up.
///
/// Bounds are compared against transformed keys as stored; use
/// `Repository::index_key` to normalize a bound the way the index does.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyQuery {
    Eq(Value),
    Gt(Value),
    Ge(Value),
    Lt(Value),
    Le(Value),
    /// Inclusive on both ends
    Between(Value, Value),
    /// Records whose key is absent (e.g. a null link in a nested path)
    Missing,
    /// Every keyed record in key order
    All(Order),
}

impl KeyQuery {
    pub fn op(&self) -> &'static str {
        match self {
            KeyQuery::Eq(_) => "eq",
            KeyQuery::Gt(_) => "gt",
            KeyQuery::Ge(_) => "ge",
            KeyQuery::Lt(_) => "lt",
            KeyQuery::Le(_) => "le",
            KeyQuery::Between(..) => "between",
            KeyQuery::Missing => "missing",
            KeyQuery::All(_) => "all",
        }
    }

    /// Rewrite every bound through `f`.
    pub(crate) fn map_bounds(self, mut f: impl FnMut(Value) -> Result<Value>) -> Result<Self> {
        Ok(match self {
            KeyQuery::Eq(v) => KeyQuery::Eq(f(v)?),
            KeyQuery::Gt(v) => KeyQuery::Gt(f(v)?),
            KeyQuery::Ge(v) => KeyQuery::Ge(f(v)?),
            KeyQuery::Lt(v) => KeyQuery::Lt(f(v)?),
            KeyQuery::Le(v) => KeyQuery::Le(f(v)?),
            KeyQuery::Between(lo, hi) => KeyQuery::Between(f(lo)?, f(hi)?),
            other => other,
        })
    }
}

/// A secondary index over records of type `R`.
pub trait RecordIndex<R>: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> IndexKind;

    fn is_unique(&self) -> bool;

    /// Declared type of the indexed key, when known
    fn key_type(&self) -> Option<ValueType>;

    /// Derived, transformed key of a record; `None` when absent
    fn key_of(&self, record: &R) -> Option<Value>;

    /// Apply this index's key transform to a caller-supplied value
    fn normalize(&self, value: Value) -> Value;

    /// Index `slot` under `key`. Fails with `DuplicateKey` on a unique
    /// collision, leaving the index unchanged.
    fn insert(&mut self, slot: u32, key: Option<Value>) -> Result<()>;

    /// Drop `slot` from `key`'s bucket. Returns whether an entry existed.
    fn remove(&mut self, slot: u32, key: Option<&Value>) -> bool;

    /// Slots matching the query
    fn lookup(&self, query: &KeyQuery) -> Result<Vec<u32>>;

    /// Number of indexed entries (absent keys included)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
