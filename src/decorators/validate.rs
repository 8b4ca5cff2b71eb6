//! Null checks and edit logging.

use super::{log_at, EditStage};
use crate::attr::{Accessor, Record};
use crate::editor::{Edit, Modification, ModificationKind};
use crate::error::{RepoError, Result};
use crate::index::KeyGetter;
use std::sync::Arc;
use tracing::Level;

/// Rejects null primary keys and nulls in non-nullable attributes, and
/// logs every edit at a configurable level. Debug mode adds a DEBUG line
/// per received, committed and rejected edit.
pub struct ValidateStage<R> {
    primary_name: String,
    primary: KeyGetter<R>,
    /// Non-nullable, non-static attributes
    required: Vec<Arc<dyn Accessor<R>>>,
    null_checks: bool,
    logging: bool,
    level: Level,
    debug: bool,
}

impl<R: Record> ValidateStage<R> {
    pub fn new(primary_name: &str, primary: KeyGetter<R>, required: Vec<Arc<dyn Accessor<R>>>) -> Self {
        Self {
            primary_name: primary_name.to_string(),
            primary,
            required,
            null_checks: true,
            logging: true,
            level: Level::TRACE,
            debug: false,
        }
    }

    pub fn null_checks(mut self, on: bool) -> Self {
        self.null_checks = on;
        self
    }

    pub fn logging(mut self, on: bool) -> Self {
        self.logging = on;
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    fn key_of(&self, edit: &Edit<R>) -> String {
        match edit {
            Edit::Add(record) | Edit::Update(record) => match self.primary.derive(record) {
                Some(key) => key.to_string(),
                None => "null".to_string(),
            },
            Edit::Remove(key) => key.to_string(),
        }
    }

    fn null_key(&self) -> RepoError {
        RepoError::NullKey {
            attribute: self.primary_name.clone(),
        }
    }

    fn check(&self, record: &R) -> Result<()> {
        if self.primary.derive(record).is_none() {
            return Err(self.null_key());
        }
        if let Some(attr) = self.required.iter().find(|a| a.get(record).is_null()) {
            return Err(RepoError::NullValue {
                attribute: attr.name().to_string(),
            });
        }
        Ok(())
    }
}

impl<R: Record> EditStage<R> for ValidateStage<R> {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn inbound(&self, edit: Edit<R>) -> Result<Edit<R>> {
        if self.null_checks {
            match &edit {
                Edit::Add(record) | Edit::Update(record) => self.check(record)?,
                Edit::Remove(key) if key.is_null() => return Err(self.null_key()),
                Edit::Remove(_) => {}
            }
        }
        if self.logging || self.debug {
            let key = self.key_of(&edit);
            if self.logging {
                log_at(self.level, edit.kind(), &key, "edit received");
            }
            if self.debug {
                tracing::debug!(kind = %edit.kind(), key = %key, null_checks = self.null_checks, "debug: edit received");
            }
        }
        Ok(edit)
    }

    fn committed(&self, modification: &Modification<R>) {
        if self.logging {
            log_at(self.level, modification.kind, &modification.key.to_string(), "edit committed");
        }
        if self.debug {
            tracing::debug!(
                kind = %modification.kind,
                key = %modification.key,
                had_before = modification.before.is_some(),
                has_after = modification.after.is_some(),
                "debug: edit committed"
            );
        }
    }

    fn rejected(&self, kind: ModificationKind, error: &RepoError) {
        if self.logging {
            tracing::warn!(%kind, %error, "edit rejected");
        }
        if self.debug {
            tracing::debug!(%kind, ?error, "debug: edit rejected");
        }
    }
}
