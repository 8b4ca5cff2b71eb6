//! Object Editor
//!
//! The single mutation gateway. Every add/update/remove keeps the primary
//! store and every registered index in step, or leaves both untouched.
//!
//! A mutation moves Received -> Validated -> Applied -> Indexed -> Committed.
//! Any failure before Committed undoes what was applied, in reverse.

use crate::attr::Record;
use crate::collection::{SearchableCollection, Stored};
use crate::error::{RepoError, Result};
use crate::index::RecordIndex;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Kind of a committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationKind {
    Add,
    Update,
    Remove,
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModificationKind::Add => "add",
            ModificationKind::Update => "update",
            ModificationKind::Remove => "remove",
        })
    }
}

/// A committed mutation: `before` is set for update/remove, `after` for add/update.
#[derive(Debug)]
pub struct Modification<R> {
    pub kind: ModificationKind,
    pub key: Value,
    pub before: Option<Arc<R>>,
    pub after: Option<Arc<R>>,
}

impl<R> Clone for Modification<R> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            key: self.key.clone(),
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

/// A requested mutation, as it travels through the edit pipeline.
#[derive(Debug, Clone)]
pub enum Edit<R> {
    Add(R),
    Update(R),
    /// Primary key of the record to remove
    Remove(Value),
}

impl<R> Edit<R> {
    pub fn kind(&self) -> ModificationKind {
        match self {
            Edit::Add(_) => ModificationKind::Add,
            Edit::Update(_) => ModificationKind::Update,
            Edit::Remove(_) => ModificationKind::Remove,
        }
    }

    pub fn record(&self) -> Option<&R> {
        match self {
            Edit::Add(r) | Edit::Update(r) => Some(r),
            Edit::Remove(_) => None,
        }
    }
}

/// Base editor bound to its collection.
pub struct ObjectEditor<R> {
    collection: SearchableCollection<R>,
}

impl<R: Record> ObjectEditor<R> {
    pub fn new(collection: SearchableCollection<R>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &SearchableCollection<R> {
        &self.collection
    }

    pub fn apply(&mut self, edit: Edit<R>) -> Result<Modification<R>> {
        match edit {
            Edit::Add(record) => self.add(record),
            Edit::Update(record) => self.update(record),
            Edit::Remove(key) => self.remove(key),
        }
    }

    fn primary_of(&self, record: &R) -> Result<Value> {
        let primary = self.collection.primary_index();
        primary.key_of(record).ok_or_else(|| RepoError::NullKey {
            attribute: primary.name().to_string(),
        })
    }

    /// Insert into the store, then the primary key, then every secondary in
    /// registration order. A failing secondary rolls back everything before it.
    pub fn add(&mut self, record: R) -> Result<Modification<R>> {
        let key = self.primary_of(&record)?;
        if self.collection.slot_of(&key).is_some() {
            return Err(RepoError::DuplicateKey {
                index: self.collection.primary_key_name().to_string(),
                key: key.to_string(),
            });
        }

        let record = Arc::new(record);
        let keys: Vec<Option<Value>> = self
            .collection
            .indexes()
            .iter()
            .map(|index| index.key_of(&record))
            .collect();

        let slot = self.collection.allocate(Stored {
            record: Arc::clone(&record),
            primary: key.clone(),
            keys: keys.clone(),
        });
        if let Err(err) = self.collection.primary_mut().insert(slot, Some(key.clone())) {
            self.collection.release(slot);
            return Err(err);
        }

        for pos in 0..keys.len() {
            let inserted = self.collection.indexes_mut()[pos].insert(slot, keys[pos].clone());
            if let Err(err) = inserted {
                let indexes = self.collection.indexes_mut();
                for undo in (0..pos).rev() {
                    indexes[undo].remove(slot, keys[undo].as_ref());
                }
                self.collection.primary_mut().remove(slot, Some(&key));
                self.collection.release(slot);
                tracing::debug!(%key, error = %err, "add rolled back");
                return Err(err);
            }
        }

        Ok(Modification {
            kind: ModificationKind::Add,
            key,
            before: None,
            after: Some(record),
        })
    }

    /// Re-index only the keys that changed. The primary key locates the
    /// record and cannot itself change through update.
    pub fn update(&mut self, record: R) -> Result<Modification<R>> {
        let key = self.primary_of(&record)?;
        let slot = self
            .collection
            .slot_of(&key)
            .ok_or_else(|| RepoError::NotFound { key: key.to_string() })?;
        let old_keys = match self.collection.stored(slot) {
            Some(stored) => stored.keys.clone(),
            None => return Err(RepoError::NotFound { key: key.to_string() }),
        };

        let record = Arc::new(record);
        let new_keys: Vec<Option<Value>> = self
            .collection
            .indexes()
            .iter()
            .map(|index| index.key_of(&record))
            .collect();

        let indexes = self.collection.indexes_mut();
        let mut changed: Vec<usize> = Vec::new();
        for pos in 0..indexes.len() {
            if old_keys[pos] == new_keys[pos] {
                continue;
            }
            indexes[pos].remove(slot, old_keys[pos].as_ref());
            if let Err(err) = indexes[pos].insert(slot, new_keys[pos].clone()) {
                // restore this index, then every one already switched
                let log_restore = |restored: Result<()>| {
                    if let Err(failed) = restored {
                        tracing::error!(%key, error = %failed, "rollback could not restore an index key");
                    }
                };
                log_restore(indexes[pos].insert(slot, old_keys[pos].clone()));
                for &undo in changed.iter().rev() {
                    indexes[undo].remove(slot, new_keys[undo].as_ref());
                    log_restore(indexes[undo].insert(slot, old_keys[undo].clone()));
                }
                tracing::debug!(%key, error = %err, "update rolled back");
                return Err(err);
            }
            changed.push(pos);
        }

        let before = self.collection.replace(
            slot,
            Stored {
                record: Arc::clone(&record),
                primary: key.clone(),
                keys: new_keys,
            },
        );
        tracing::trace!(%key, reindexed = changed.len(), "update applied");

        Ok(Modification {
            kind: ModificationKind::Update,
            key,
            before: before.map(|s| s.record),
            after: Some(record),
        })
    }

    /// Drop the record from every index that holds it, then from the store.
    pub fn remove(&mut self, key: Value) -> Result<Modification<R>> {
        if key.is_null() {
            return Err(RepoError::NullKey {
                attribute: self.collection.primary_key_name().to_string(),
            });
        }
        let key = self.collection.primary_key(key)?;
        let slot = self
            .collection
            .slot_of(&key)
            .ok_or_else(|| RepoError::NotFound { key: key.to_string() })?;
        let stored = self
            .collection
            .release(slot)
            .ok_or_else(|| RepoError::NotFound { key: key.to_string() })?;

        for (index, old) in self.collection.indexes_mut().iter_mut().zip(&stored.keys) {
            index.remove(slot, old.as_ref());
        }
        self.collection.primary_mut().remove(slot, Some(&stored.primary));

        Ok(Modification {
            kind: ModificationKind::Remove,
            key,
            before: Some(stored.record),
            after: None,
        })
    }
}
