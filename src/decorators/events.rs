//! Modification events.

use super::EditStage;
use crate::attr::Record;
use crate::editor::Modification;
use crate::error::ListenerError;
use std::sync::Arc;

/// Receives committed mutations, synchronously and in registration order.
///
/// A returned error is logged; the mutation stays committed.
pub trait ModificationListener<R>: Send + Sync {
    fn on_modification(&self, modification: &Modification<R>) -> Result<(), ListenerError>;
}

impl<R, F> ModificationListener<R> for F
where
    F: Fn(&Modification<R>) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_modification(&self, modification: &Modification<R>) -> Result<(), ListenerError> {
        self(modification)
    }
}

/// Delivers each committed mutation to every listener.
pub struct EventStage<R> {
    listeners: Vec<Arc<dyn ModificationListener<R>>>,
}

impl<R: Record> EventStage<R> {
    pub fn new(listeners: Vec<Arc<dyn ModificationListener<R>>>) -> Self {
        Self { listeners }
    }
}

impl<R: Record> EditStage<R> for EventStage<R> {
    fn name(&self) -> &'static str {
        "events"
    }

    fn committed(&self, modification: &Modification<R>) {
        for (pos, listener) in self.listeners.iter().enumerate() {
            if let Err(error) = listener.on_modification(modification) {
                tracing::warn!(listener = pos, kind = %modification.kind, %error, "listener failed");
            }
        }
    }
}
