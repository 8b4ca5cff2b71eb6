//! Repository builder
//!
//! Fluent configuration that resolves accessors, constructs indexes, the
//! collection, the editor and its decorator pipeline, and hands back a
//! finished `Repository`. Every configuration mistake surfaces here as
//! `RepoError::Configuration`; no repository is returned.
//!
//! # Example
//! ```ignore
//! let repo = RepoBuilder::<Employee>::new()
//!     .primary_key("id")
//!     .search_index("last_name")
//!     .lower_case_index("last_name")
//!     .nested_index("address.city.name")
//!     .use_cache(true)
//!     .build()?;
//! ```

use crate::attr::{AccessMode, Record, Schema, SchemaBuilder};
use crate::collection::{Filter, ScanFilter, SearchableCollection};
use crate::config::RepoConfig;
use crate::decorators::{
    CacheStage, CachedFilter, CloneStage, EditPipeline, EditStage, EventStage, ModificationListener, ValidateStage,
};
use crate::editor::ObjectEditor;
use crate::error::{RepoError, Result};
use crate::index::{
    Comparator, KeyGetter, KeySource, KeyTransform, LookupIndex, NestedKeyIndex, NestedPath, RecordIndex,
    SearchIndex, TypeHierarchy, TypeHierarchyIndex, TYPE_INDEX,
};
use crate::repo::Repository;
use crate::value::Value;
use ahash::AHashMap;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::Level;

type CustomKey<R> = Arc<dyn Fn(&R) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Lookup,
    Search,
    Nested,
}

#[derive(Debug, Clone)]
struct IndexSpec {
    name: String,
    family: Family,
    unique: bool,
}

/// Fluent builder for a `Repository<R>`.
pub struct RepoBuilder<R> {
    config: RepoConfig,
    primary_key: Option<String>,
    specs: Vec<IndexSpec>,
    hierarchy: Option<TypeHierarchy>,
    comparators: AHashMap<String, Comparator>,
    transforms: AHashMap<String, KeyTransform>,
    bucket_sizes: AHashMap<String, usize>,
    key_getters: AHashMap<String, CustomKey<R>>,
    listeners: Vec<Arc<dyn ModificationListener<R>>>,
    subtypes: Vec<Schema<R>>,
    filter: Option<Arc<dyn Filter<R>>>,
}

impl<R: Record> Default for RepoBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> RepoBuilder<R> {
    pub fn new() -> Self {
        Self {
            config: RepoConfig::default(),
            primary_key: None,
            specs: Vec::new(),
            hierarchy: None,
            comparators: AHashMap::new(),
            transforms: AHashMap::new(),
            bucket_sizes: AHashMap::new(),
            key_getters: AHashMap::new(),
            listeners: Vec::new(),
            subtypes: Vec::new(),
            filter: None,
        }
    }

    /// Replace every toggle with `config`.
    pub fn config(mut self, config: RepoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn primary_key(mut self, name: &str) -> Self {
        self.primary_key = Some(name.to_string());
        self
    }

    fn spec(mut self, name: &str, family: Family, unique: bool) -> Self {
        self.specs.push(IndexSpec {
            name: name.to_string(),
            family,
            unique,
        });
        self
    }

    // ---- lookup indexes ----

    pub fn lookup_index(self, name: &str) -> Self {
        self.spec(name, Family::Lookup, false)
    }

    pub fn unique_lookup_index(self, name: &str) -> Self {
        self.spec(name, Family::Lookup, true)
    }

    pub fn lookup_index_with(self, name: &str, unique: bool) -> Self {
        self.spec(name, Family::Lookup, unique)
    }

    // ---- search indexes ----

    pub fn search_index(self, name: &str) -> Self {
        self.spec(name, Family::Search, false)
    }

    pub fn unique_search_index(self, name: &str) -> Self {
        self.spec(name, Family::Search, true)
    }

    pub fn search_index_with(self, name: &str, unique: bool) -> Self {
        self.spec(name, Family::Search, unique)
    }

    /// Search index over a dotted path such as `address.city.name`.
    /// The dotted path is also the index name.
    pub fn nested_index(self, path: &str) -> Self {
        self.spec(path, Family::Nested, false)
    }

    pub fn nested_index_with(self, path: &str, unique: bool) -> Self {
        self.spec(path, Family::Nested, unique)
    }

    /// Index records by runtime type under `"_type"`, answering by ancestor.
    pub fn index_hierarchy(mut self, hierarchy: TypeHierarchy) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    // ---- per-index key shaping ----

    /// Ordering used by the named search index.
    pub fn collate(mut self, name: &str, comparator: impl Fn(&Value, &Value) -> Ordering + Send + Sync + 'static) -> Self {
        self.comparators.insert(name.to_string(), Arc::new(comparator));
        self
    }

    pub fn key_transform(mut self, name: &str, transform: KeyTransform) -> Self {
        self.transforms.insert(name.to_string(), transform);
        self
    }

    pub fn lower_case_index(self, name: &str) -> Self {
        self.key_transform(name, KeyTransform::Lower)
    }

    pub fn upper_case_index(self, name: &str) -> Self {
        self.key_transform(name, KeyTransform::Upper)
    }

    pub fn camel_case_index(self, name: &str) -> Self {
        self.key_transform(name, KeyTransform::CamelCase)
    }

    pub fn under_bar_case_index(self, name: &str) -> Self {
        self.key_transform(name, KeyTransform::UnderBarCase)
    }

    /// Initial bucket size of one index.
    pub fn bucket_size(mut self, name: &str, size: usize) -> Self {
        self.bucket_sizes.insert(name.to_string(), size);
        self
    }

    pub fn default_bucket_size(mut self, size: usize) -> Self {
        self.config.bucket_size = size;
        self
    }

    /// Derive the named index's key with `f` instead of its attribute.
    pub fn key_getter(mut self, name: &str, f: impl Fn(&R) -> Value + Send + Sync + 'static) -> Self {
        self.key_getters.insert(name.to_string(), Arc::new(f));
        self
    }

    // ---- access ----

    pub fn access(mut self, mode: AccessMode) -> Self {
        self.config.access = mode;
        self
    }

    /// Prefer getter/setter properties over plain fields.
    pub fn use_property_access(mut self, on: bool) -> Self {
        self.config.property_access = on;
        self
    }

    /// Merge a polymorphic variant's attributes into the record schema.
    pub fn subtype(mut self, schema: Schema<R>) -> Self {
        self.subtypes.push(schema);
        self
    }

    // ---- decorators ----

    pub fn use_cache(mut self, on: bool) -> Self {
        self.config.cache = on;
        self
    }

    pub fn clone_edits(mut self, on: bool) -> Self {
        self.config.clone_edits = on;
        self
    }

    pub fn null_checks(mut self, on: bool) -> Self {
        self.config.null_checks = on;
        self
    }

    pub fn logging(mut self, on: bool) -> Self {
        self.config.logging = on;
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.config.log_level = level.to_string();
        self
    }

    pub fn events(mut self, on: bool) -> Self {
        self.config.events = on;
        self
    }

    /// Register a listener; turns events on.
    pub fn listener(mut self, listener: impl ModificationListener<R> + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self.config.events = true;
        self
    }

    pub fn remove_duplication(mut self, on: bool) -> Self {
        self.config.remove_duplication = on;
        self
    }

    /// Log edit details at DEBUG, with or without `logging`.
    pub fn debug(mut self, on: bool) -> Self {
        self.config.debug = on;
        self
    }

    /// Predicate evaluator behind `Repository::query`. Wrapped by the
    /// result cache when caching is on. Defaults to `ScanFilter`.
    pub fn filter(mut self, filter: Arc<dyn Filter<R>>) -> Self {
        self.filter = Some(filter);
        self
    }

    // ---- build ----

    fn resolve_schema(&self) -> Result<Arc<Schema<R>>> {
        if self.subtypes.is_empty() {
            return Schema::<R>::of();
        }
        let mut builder = SchemaBuilder::new();
        R::describe(&mut builder);
        for subtype in &self.subtypes {
            builder.merge(subtype);
        }
        Ok(Arc::new(builder.build()?))
    }

    /// Every per-index setting must name a configured index.
    fn check_names(&self, primary: &str) -> Result<()> {
        let known = |name: &str| {
            name == primary
                || self.specs.iter().any(|s| s.name == name)
                || (name == TYPE_INDEX && self.hierarchy.is_some())
        };
        let configured = self
            .comparators
            .keys()
            .chain(self.transforms.keys())
            .chain(self.bucket_sizes.keys())
            .chain(self.key_getters.keys());
        for name in configured {
            if !known(name.as_str()) {
                return Err(RepoError::config(format!("setting for {name}, which is not an index")));
            }
        }
        Ok(())
    }

    fn key_for(&self, schema: &Schema<R>, name: &str, family: Family) -> Result<KeyGetter<R>> {
        let access = self.config.access;
        let prefer_property = self.config.property_access;

        let source = if let Some(f) = self.key_getters.get(name) {
            KeySource::Custom(Arc::clone(f))
        } else if family == Family::Nested {
            KeySource::Path(NestedPath::resolve(schema, name, access, prefer_property)?)
        } else {
            let accessor = schema.accessor(name, access, prefer_property).ok_or_else(|| {
                RepoError::config(format!("no attribute {name} on {} for index", schema.type_name()))
            })?;
            if access == AccessMode::Direct && !schema.has_direct(name, prefer_property) {
                tracing::debug!(attribute = name, "no direct backend, using reflective access");
            }
            KeySource::Attribute(accessor)
        };
        Ok(KeyGetter::new(source).with_transform(self.transforms.get(name).cloned()))
    }

    fn bucket_size_for(&self, name: &str) -> usize {
        self.bucket_sizes.get(name).copied().unwrap_or(self.config.bucket_size)
    }

    pub fn build(mut self) -> Result<Repository<R>> {
        let schema = self.resolve_schema()?;
        let primary_name = self
            .primary_key
            .clone()
            .ok_or_else(|| RepoError::config("no primary key configured"))?;
        self.check_names(&primary_name)?;

        let primary_key = self.key_for(&schema, &primary_name, Family::Lookup)?;
        let primary = LookupIndex::new(&primary_name, primary_key.clone())
            .unique(true)
            .bucket_size(self.bucket_size_for(&primary_name));

        let mut indexes: Vec<Box<dyn RecordIndex<R>>> = Vec::with_capacity(self.specs.len() + 1);
        for spec in &self.specs {
            if spec.name == primary_name {
                if spec.family == Family::Lookup {
                    tracing::debug!(index = %spec.name, "lookup on primary key served by the primary index");
                    continue;
                }
                return Err(RepoError::config(format!(
                    "index {} clashes with the primary key index",
                    spec.name
                )));
            }

            let key = self.key_for(&schema, &spec.name, spec.family)?;
            let comparator = self.comparators.get(&spec.name).cloned();
            let size = self.bucket_size_for(&spec.name);
            let index: Box<dyn RecordIndex<R>> = match spec.family {
                Family::Lookup => {
                    if comparator.is_some() {
                        tracing::warn!(index = %spec.name, "collation ignored on a lookup index");
                    }
                    Box::new(LookupIndex::new(&spec.name, key).unique(spec.unique).bucket_size(size))
                }
                Family::Search => Box::new(
                    SearchIndex::new(&spec.name, key)
                        .unique(spec.unique)
                        .comparator(comparator)
                        .bucket_size(size),
                ),
                Family::Nested => Box::new(
                    NestedKeyIndex::new(&spec.name, key)?
                        .unique(spec.unique)
                        .comparator(comparator)
                        .bucket_size(size),
                ),
            };
            tracing::debug!(index = %spec.name, kind = ?index.kind(), unique = spec.unique, "registered index");
            indexes.push(index);
        }

        if let Some(hierarchy) = self.hierarchy.take() {
            let key = KeyGetter::new(KeySource::TypeName).with_transform(self.transforms.get(TYPE_INDEX).cloned());
            let index = TypeHierarchyIndex::with_key(key, hierarchy).comparator(self.comparators.get(TYPE_INDEX).cloned());
            tracing::debug!(index = TYPE_INDEX, "registered type hierarchy index");
            indexes.push(Box::new(index));
        }

        let base: Arc<dyn Filter<R>> = self.filter.take().unwrap_or_else(|| Arc::new(ScanFilter));
        let cached = self.config.cache.then(|| Arc::new(CachedFilter::new(Arc::clone(&base))));
        let filter: Arc<dyn Filter<R>> = match &cached {
            Some(cached) => Arc::clone(cached) as Arc<dyn Filter<R>>,
            None => base,
        };
        let collection = SearchableCollection::new(primary, indexes, filter, self.config.remove_duplication)?;

        let mut stages: Vec<Box<dyn EditStage<R>>> = Vec::new();
        if self.config.null_checks || self.config.logging || self.config.debug {
            let required = schema
                .attributes()
                .filter(|d| !d.nullable && !d.is_static && d.name != primary_name)
                .filter_map(|d| schema.accessor(&d.name, self.config.access, self.config.property_access))
                .collect();
            let stage = ValidateStage::new(&primary_name, primary_key, required)
                .null_checks(self.config.null_checks)
                .logging(self.config.logging)
                .level(self.config.level())
                .debug(self.config.debug);
            stages.push(Box::new(stage));
        }
        if self.config.clone_edits {
            stages.push(Box::new(CloneStage));
        }
        if let Some(cached) = cached {
            stages.push(Box::new(CacheStage::new(cached)));
        }
        if self.config.events {
            if self.listeners.is_empty() {
                tracing::debug!("events enabled without listeners");
            }
            stages.push(Box::new(EventStage::new(std::mem::take(&mut self.listeners))));
        }

        let pipeline = EditPipeline::new(stages);
        tracing::debug!(
            record = schema.type_name(),
            primary = %primary_name,
            indexes = collection.index_names().len(),
            stages = ?pipeline.stage_names(),
            access = self.config.access.name(),
            "repository built"
        );
        Ok(Repository::new(schema, ObjectEditor::new(collection), pipeline, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;

    #[derive(Clone, Debug)]
    struct Item {
        sku: String,
        price: i64,
    }

    impl Record for Item {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field("sku", |i| &i.sku, |i| &mut i.sku)
                .field("price", |i| &i.price, |i| &mut i.price);
        }
    }

    fn config_error(result: Result<Repository<Item>>) -> bool {
        matches!(result, Err(RepoError::Configuration(_)))
    }

    #[test]
    fn test_missing_primary_key() {
        assert!(config_error(RepoBuilder::<Item>::new().search_index("price").build()));
        assert!(config_error(RepoBuilder::<Item>::new().primary_key("id").build()));
    }

    #[test]
    fn test_unknown_index_attribute() {
        assert!(config_error(RepoBuilder::<Item>::new().primary_key("sku").search_index("weight").build()));
        assert!(config_error(RepoBuilder::<Item>::new().primary_key("sku").nested_index("price.amount").build()));
    }

    #[test]
    fn test_setting_for_unconfigured_index() {
        let result = RepoBuilder::<Item>::new()
            .primary_key("sku")
            .lower_case_index("price")
            .build();
        assert!(config_error(result));
    }

    #[test]
    fn test_duplicate_index_name() {
        let result = RepoBuilder::<Item>::new()
            .primary_key("sku")
            .search_index("price")
            .lookup_index("price")
            .build();
        assert!(config_error(result));
    }

    #[test]
    fn test_primary_key_lookup_is_folded() {
        let repo = RepoBuilder::<Item>::new()
            .primary_key("sku")
            .unique_lookup_index("sku")
            .search_index("price")
            .build()
            .unwrap();
        assert_eq!(repo.index_names(), vec!["sku", "price"]);
        assert_eq!(repo.index_kind("price"), Some(IndexKind::Search));
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let repo = RepoBuilder::<Item>::new()
            .primary_key("sku")
            .events(true)
            .use_cache(true)
            .clone_edits(true)
            .logging(true)
            .build()
            .unwrap();
        assert_eq!(repo.stage_names(), vec!["validate", "clone", "cache", "events"]);
    }
}
