//! Edit pipeline
//!
//! Optional behaviour layered around the base `ObjectEditor`.
//!
//! Design:
//! - Each decorator is an `EditStage`; the builder composes them once, in a
//!   fixed order: validation/log -> clone -> cache -> events (outermost first)
//! - `inbound` runs outermost to innermost before the editor applies an edit
//! - `committed` runs innermost to outermost after a successful mutation, on
//!   records already passed through `outbound`
//! - `outbound` runs on every record handed back to a caller
//! - The base editor never knows which stages are present

mod cache;
mod clone;
mod events;
mod validate;

pub use cache::{CacheStage, CachedFilter};
pub use clone::CloneStage;
pub use events::{EventStage, ModificationListener};
pub use validate::ValidateStage;

use crate::attr::Record;
use crate::editor::{Edit, Modification, ModificationKind, ObjectEditor};
use crate::error::{RepoError, Result};
use std::sync::Arc;
use tracing::Level;

/// One middleware stage of the edit pipeline.
pub trait EditStage<R>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect or rewrite an edit before it reaches the editor.
    fn inbound(&self, edit: Edit<R>) -> Result<Edit<R>> {
        Ok(edit)
    }

    /// Observe a committed mutation.
    fn committed(&self, _modification: &Modification<R>) {}

    /// Observe an edit the editor (or an outer stage) rejected.
    fn rejected(&self, _kind: ModificationKind, _error: &RepoError) {}

    /// Rewrite a record on its way out to a caller.
    fn outbound(&self, record: Arc<R>) -> Arc<R> {
        record
    }
}

/// Ordered stages around the base editor.
pub struct EditPipeline<R> {
    stages: Vec<Box<dyn EditStage<R>>>,
}

impl<R: Record> EditPipeline<R> {
    pub fn new(stages: Vec<Box<dyn EditStage<R>>>) -> Self {
        Self { stages }
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, editor: &mut ObjectEditor<R>, edit: Edit<R>) -> Result<Modification<R>> {
        let kind = edit.kind();
        let mut edit = edit;
        for stage in &self.stages {
            edit = match stage.inbound(edit) {
                Ok(edit) => edit,
                Err(err) => return Err(self.reject(kind, err)),
            };
        }

        let modification = editor.apply(edit).map_err(|err| self.reject(kind, err))?;
        let published = self.published(&modification);
        for stage in self.stages.iter().rev() {
            stage.committed(&published);
        }
        Ok(modification)
    }

    /// The modification as observers see it: records pass through the
    /// outbound hooks, so stored instances never leak to listeners.
    fn published(&self, modification: &Modification<R>) -> Modification<R> {
        Modification {
            kind: modification.kind,
            key: modification.key.clone(),
            before: modification.before.clone().map(|r| self.outbound(r)),
            after: modification.after.clone().map(|r| self.outbound(r)),
        }
    }

    fn reject(&self, kind: ModificationKind, err: RepoError) -> RepoError {
        for stage in &self.stages {
            stage.rejected(kind, &err);
        }
        err
    }

    /// Pass a record through every stage's outbound hook.
    pub fn outbound(&self, record: Arc<R>) -> Arc<R> {
        self.stages.iter().fold(record, |r, stage| stage.outbound(r))
    }

    pub fn outbound_all(&self, records: Vec<Arc<R>>) -> Vec<Arc<R>> {
        if self.stages.is_empty() {
            return records;
        }
        records.into_iter().map(|r| self.outbound(r)).collect()
    }
}

/// Emit `message` at a level chosen at runtime.
pub(crate) fn log_at(level: Level, kind: ModificationKind, key: &str, message: &str) {
    match level {
        Level::ERROR => tracing::error!(%kind, key, "{message}"),
        Level::WARN => tracing::warn!(%kind, key, "{message}"),
        Level::INFO => tracing::info!(%kind, key, "{message}"),
        Level::DEBUG => tracing::debug!(%kind, key, "{message}"),
        _ => tracing::trace!(%kind, key, "{message}"),
    }
}
