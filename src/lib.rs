// Lumbung v0.1.0 - Embedded Indexed Object Repository
// Secondary indexes over live in-memory records

pub mod attr;
pub mod builder;
pub mod collection;
pub mod config;
pub mod decorators;
pub mod editor;
pub mod error;
pub mod index;
pub mod repo;
pub mod value;

// Re-export main types
pub use attr::{AccessMode, Accessor, AttributeDescriptor, Component, Record, Schema, SchemaBuilder};
pub use builder::RepoBuilder;
pub use collection::{named, Filter, Predicate, ScanFilter, SearchableCollection};
pub use config::RepoConfig;
pub use decorators::{EditPipeline, EditStage, ModificationListener};
pub use editor::{Edit, Modification, ModificationKind, ObjectEditor};
pub use error::{ListenerError, RepoError, Result};
pub use index::{IndexKind, KeyQuery, KeyTransform, Order, RecordIndex, TypeHierarchy, TYPE_INDEX};
pub use repo::Repository;
pub use value::{Primitive, Value, ValueType};
