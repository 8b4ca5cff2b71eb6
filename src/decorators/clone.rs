//! Copy-on-edit isolation.

use super::EditStage;
use crate::attr::Record;
use crate::editor::Edit;
use crate::error::Result;
use std::sync::Arc;

/// Stores a detached copy of every added or updated record, and hands
/// callers a detached copy of every record read.
///
/// Records holding shared interior state (`Arc<Mutex<_>>` and the like)
/// must override `Record::detach` for the copy to be independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneStage;

impl<R: Record> EditStage<R> for CloneStage {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn inbound(&self, edit: Edit<R>) -> Result<Edit<R>> {
        Ok(match edit {
            Edit::Add(record) => Edit::Add(record.detach()),
            Edit::Update(record) => Edit::Update(record.detach()),
            remove => remove,
        })
    }

    fn outbound(&self, record: Arc<R>) -> Arc<R> {
        Arc::new(record.detach())
    }
}
