//! Attribute Accessor Module
//!
//! Typed get/set over one named attribute of a record type.
//!
//! Design:
//! - `ReflectiveAccessor`: boxed closures over `Value`, works for any declared type
//! - `FieldAccessor` / `PropertyAccessor`: monomorphized lens, typed get/set without boxing
//! - `OffsetAccessor`: byte offset into a `bytemuck::Pod` record
//! - Both backends of one attribute observe identical values
//!
//! Attributes are registered once per record type (`Record::describe`) and
//! resolved into a cached, read-only `Schema`.

mod direct;
mod reflective;
mod schema;

pub use direct::{FieldAccessor, OffsetAccessor, PropertyAccessor};
pub use reflective::{Getter, ReflectiveAccessor, SharedAccessor, Setter};
pub use schema::{Record, Schema, SchemaBuilder};

use crate::error::{RepoError, Result};
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{fence, Ordering};
use std::sync::{Arc, OnceLock};

/// Accessor backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Boxed closures over `Value` - always available
    #[default]
    Reflective,

    /// Typed lens or byte offset - used where the attribute registered one,
    /// otherwise silently falls back to `Reflective`
    Direct,
}

impl AccessMode {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "reflect" | "reflective" | "dynamic" => AccessMode::Reflective,
            "direct" | "unsafe" | "offset" | "fast" => AccessMode::Direct,
            _ => AccessMode::default(),
        }
    }
}

type Shape = (String, Vec<AttributeDescriptor>);
type ShapeLoader = Arc<dyn Fn() -> Result<Shape> + Send + Sync>;

/// Shape of a nested attribute's value.
///
/// Loaded from the nested type's schema on first use, so a record type may
/// nest itself directly or through other types.
#[derive(Clone)]
pub struct Component {
    type_id: TypeId,
    fallback_name: &'static str,
    shape: Arc<OnceLock<Result<Shape>>>,
    load: ShapeLoader,
}

impl Component {
    pub(crate) fn deferred(
        type_id: TypeId,
        fallback_name: &'static str,
        load: impl Fn() -> Result<Shape> + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_id,
            fallback_name,
            shape: Arc::new(OnceLock::new()),
            load: Arc::new(load),
        }
    }

    fn shape(&self) -> Result<&Shape> {
        self.shape.get_or_init(|| (self.load)()).as_ref().map_err(RepoError::clone)
    }

    pub fn type_name(&self) -> &str {
        self.shape().map(|(name, _)| name.as_str()).unwrap_or(self.fallback_name)
    }

    /// Attributes of the nested type; fails when its schema does not build.
    pub fn attributes(&self) -> Result<&[AttributeDescriptor]> {
        self.shape().map(|(_, attributes)| attributes.as_slice())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes().ok()?.iter().find(|a| a.name == name)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("type_name", &self.type_name()).finish()
    }
}

/// Static description of one attribute, resolved once per record type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub ty: ValueType,
    pub nullable: bool,
    /// Set when the attribute holds a nested record
    pub component: Option<Component>,
    /// Shared across all records; read without a record argument
    pub is_static: bool,
    pub read_only: bool,
    /// Requires fenced reads and writes
    pub volatile: bool,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            component: None,
            is_static: false,
            read_only: false,
            volatile: false,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn volatile(mut self, volatile: bool) -> Self {
        self.volatile = volatile;
        self
    }

    pub(crate) fn shared(mut self) -> Self {
        self.is_static = true;
        self.read_only = true;
        self
    }

    pub(crate) fn with_component(mut self, component: Component) -> Self {
        self.component = Some(component);
        self
    }

    pub fn is_nested(&self) -> bool {
        self.component.is_some()
    }

    /// Fails with `UnsupportedMutation` for read-only attributes.
    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(RepoError::UnsupportedMutation { attribute: self.name.clone() });
        }
        Ok(())
    }
}

/// Typed get/set capability bound to one attribute.
pub trait Accessor<R>: Send + Sync {
    fn descriptor(&self) -> &AttributeDescriptor;

    /// Read the attribute. Static attributes ignore `record`.
    fn get(&self, record: &R) -> Value;

    /// Write the attribute, coercing `value` to the declared type first.
    fn set(&self, record: &mut R, value: Value) -> Result<()>;

    /// Read a static attribute without a record.
    fn get_static(&self) -> Option<Value> {
        None
    }

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

/// Run `op` between sequentially-consistent fences when the attribute is volatile.
#[inline]
pub(crate) fn fenced<T>(volatile: bool, op: impl FnOnce() -> T) -> T {
    if volatile {
        fence(Ordering::SeqCst);
        let out = op();
        fence(Ordering::SeqCst);
        out
    } else {
        op()
    }
}
