//! Repository facade
//!
//! Queries go to the searchable collection; edits go through the decorated
//! object editor. Every record handed out passes the pipeline's outbound
//! hooks (clone isolation, when enabled).

use crate::attr::{Record, Schema};
use crate::collection::Predicate;
use crate::config::RepoConfig;
use crate::decorators::EditPipeline;
use crate::editor::{Edit, ObjectEditor};
use crate::error::{RepoError, Result};
use crate::index::{IndexKind, KeyQuery};
use crate::value::Value;
use std::sync::Arc;

/// Indexed in-memory store of `R` records.
///
/// Mutation takes `&mut self`; share across threads behind a lock.
pub struct Repository<R> {
    schema: Arc<Schema<R>>,
    editor: ObjectEditor<R>,
    pipeline: EditPipeline<R>,
    config: RepoConfig,
}

impl<R: Record> Repository<R> {
    pub(crate) fn new(
        schema: Arc<Schema<R>>,
        editor: ObjectEditor<R>,
        pipeline: EditPipeline<R>,
        config: RepoConfig,
    ) -> Self {
        Self {
            schema,
            editor,
            pipeline,
            config,
        }
    }

    pub fn schema(&self) -> &Schema<R> {
        &self.schema
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    // ============ edits ============

    pub fn add(&mut self, record: R) -> Result<()> {
        self.pipeline.run(&mut self.editor, Edit::Add(record))?;
        Ok(())
    }

    /// Add records in order, stopping at the first failure. Records added
    /// before the failure stay.
    pub fn add_all(&mut self, records: impl IntoIterator<Item = R>) -> Result<usize> {
        let mut added = 0;
        for record in records {
            self.add(record)?;
            added += 1;
        }
        Ok(added)
    }

    /// Replace the record stored under `record`'s primary key.
    pub fn update(&mut self, record: R) -> Result<()> {
        self.pipeline.run(&mut self.editor, Edit::Update(record))?;
        Ok(())
    }

    /// Remove and return the record stored under `key`.
    pub fn remove(&mut self, key: impl Into<Value>) -> Result<Arc<R>> {
        let modification = self.pipeline.run(&mut self.editor, Edit::Remove(key.into()))?;
        let removed = modification.before.ok_or_else(|| RepoError::NotFound {
            key: modification.key.to_string(),
        })?;
        Ok(self.pipeline.outbound(removed))
    }

    /// Set one attribute of a stored record, coercing `value` to the
    /// declared type, then re-index through the normal update path.
    pub fn set_attribute(&mut self, key: impl Into<Value>, attribute: &str, value: impl Into<Value>) -> Result<()> {
        let key = self.editor.collection().primary_key(key.into())?;
        let current = self
            .editor
            .collection()
            .get(&key)
            .ok_or_else(|| RepoError::NotFound { key: key.to_string() })?;
        let accessor = self
            .schema
            .accessor(attribute, self.config.access, self.config.property_access)
            .ok_or_else(|| RepoError::config(format!("no attribute {attribute} on {}", self.schema.type_name())))?;

        let mut record = current.detach();
        accessor.set(&mut record, value.into())?;
        self.update(record)
    }

    /// Apply a document of attribute values to the record under `key`.
    pub fn apply_document(
        &mut self,
        key: impl Into<Value>,
        doc: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let key = self.editor.collection().primary_key(key.into())?;
        let current = self
            .editor
            .collection()
            .get(&key)
            .ok_or_else(|| RepoError::NotFound { key: key.to_string() })?;
        let record = self.schema.apply_document(&current, doc)?;
        self.update(record)
    }

    // ============ queries ============

    pub fn get(&self, key: impl Into<Value>) -> Option<Arc<R>> {
        let key = self.editor.collection().primary_key(key.into()).ok()?;
        self.editor.collection().get(&key).map(|r| self.pipeline.outbound(r))
    }

    pub fn contains(&self, key: impl Into<Value>) -> bool {
        let collection = self.editor.collection();
        collection
            .primary_key(key.into())
            .is_ok_and(|key| collection.get(&key).is_some())
    }

    pub fn len(&self) -> usize {
        self.editor.collection().len()
    }

    pub fn is_empty(&self) -> bool {
        self.editor.collection().is_empty()
    }

    pub fn all(&self) -> Vec<Arc<R>> {
        self.pipeline.outbound_all(self.editor.collection().all())
    }

    pub fn query_by_index(&self, index: &str, query: KeyQuery) -> Result<Vec<Arc<R>>> {
        let hits = self.editor.collection().query_by_index(index, query)?;
        Ok(self.pipeline.outbound_all(hits))
    }

    /// Full scan with `predicate`; cached when the repository caches and
    /// the predicate is `named`.
    pub fn query<P: Predicate<R>>(&self, predicate: P) -> Vec<Arc<R>> {
        let hits = self.editor.collection().query_by_predicate(&predicate);
        self.pipeline.outbound_all(hits)
    }

    pub fn query_union(&self, queries: &[(&str, KeyQuery)]) -> Result<Vec<Arc<R>>> {
        let hits = self.editor.collection().query_union(queries)?;
        Ok(self.pipeline.outbound_all(hits))
    }

    /// `value` as the named index stores it (key transform applied).
    /// Use it to shape query bounds for transformed indexes.
    pub fn index_key(&self, index: &str, value: impl Into<Value>) -> Result<Value> {
        self.editor.collection().index_key(index, value.into())
    }

    // ============ introspection ============

    pub fn index_names(&self) -> Vec<&str> {
        self.editor.collection().index_names()
    }

    pub fn primary_key_name(&self) -> &str {
        self.editor.collection().primary_key_name()
    }

    pub fn index_len(&self, index: &str) -> Result<usize> {
        self.editor.collection().index_len(index)
    }

    pub fn index_kind(&self, index: &str) -> Option<IndexKind> {
        self.editor.collection().index(index).map(|i| i.kind())
    }

    /// Decorator stages, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }

    /// Every record in portable document form.
    pub fn to_documents(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.editor
            .collection()
            .all()
            .iter()
            .map(|r| self.schema.to_document(r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::SchemaBuilder;
    use crate::builder::RepoBuilder;

    #[derive(Clone, Debug)]
    struct Task {
        id: i32,
        title: String,
        done: bool,
    }

    impl Record for Task {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field_ro("id", |t| &t.id)
                .field("title", |t| &t.title, |t| &mut t.title)
                .field("done", |t| &t.done, |t| &mut t.done);
        }
    }

    fn task(id: i32, title: &str) -> Task {
        Task { id, title: title.into(), done: false }
    }

    fn repo() -> Repository<Task> {
        RepoBuilder::new()
            .primary_key("id")
            .lookup_index("done")
            .build()
            .unwrap()
    }

    #[test]
    fn test_set_attribute_reindexes() {
        let mut r = repo();
        r.add(task(1, "write")).unwrap();
        r.set_attribute(1, "done", "true").unwrap();

        assert!(r.get(1).unwrap().done);
        assert_eq!(r.query_by_index("done", KeyQuery::Eq(Value::Bool(true))).unwrap().len(), 1);
        assert!(r.query_by_index("done", KeyQuery::Eq(Value::Bool(false))).unwrap().is_empty());
    }

    #[test]
    fn test_set_attribute_errors_leave_state() {
        let mut r = repo();
        r.add(task(1, "write")).unwrap();
        assert!(matches!(r.set_attribute(1, "id", 2), Err(RepoError::UnsupportedMutation { .. })));
        assert!(matches!(r.set_attribute(1, "done", "maybe"), Err(RepoError::Coercion { .. })));
        assert!(matches!(r.set_attribute(7, "done", true), Err(RepoError::NotFound { .. })));
        assert!(!r.get(1).unwrap().done);
    }

    #[test]
    fn test_remove_returns_record() {
        let mut r = repo();
        r.add_all([task(1, "a"), task(2, "b")]).unwrap();
        let removed = r.remove(2).unwrap();
        assert_eq!(removed.title, "b");
        assert_eq!(r.len(), 1);
        assert!(!r.contains(2));
        assert!(r.contains("1"));
    }

    #[test]
    fn test_documents() {
        let mut r = repo();
        r.add(task(1, "a")).unwrap();
        let patch = serde_json::json!({"title": "renamed", "done": true});
        r.apply_document(1, patch.as_object().unwrap()).unwrap();

        let docs = r.to_documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], serde_json::json!("renamed"));
        assert_eq!(docs[0]["done"], serde_json::json!(true));
        assert_eq!(docs[0]["id"], serde_json::json!(1));
    }
}
