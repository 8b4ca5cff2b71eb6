//! Per-type attribute tables.
//!
//! A record type registers its attributes once in `Record::describe`. The
//! resulting `Schema` is cached process-wide by `TypeId` and shared
//! read-only by every repository over that type.

use super::{
    AccessMode, Accessor, AttributeDescriptor, Component, FieldAccessor, OffsetAccessor, PropertyAccessor,
    ReflectiveAccessor, SharedAccessor,
};
use crate::error::{RepoError, Result};
use crate::value::{Primitive, Value, ValueType};
use ahash::{AHashMap, AHashSet};
use bytemuck::Pod;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// A record type the repository can store.
pub trait Record: Clone + Send + Sync + 'static {
    /// Register the attributes of this type.
    fn describe(schema: &mut SchemaBuilder<Self>);

    /// Most-derived runtime type, used by the type hierarchy index.
    /// Polymorphic records (enums, tagged structs) override this.
    fn type_name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Copy sharing no interior-mutable state with `self`.
    fn detach(&self) -> Self {
        self.clone()
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

static SCHEMAS: OnceLock<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> = OnceLock::new();

thread_local! {
    /// Types whose `describe` is running on this thread.
    static DESCRIBING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Marks `R` as being described until dropped.
struct Describing(TypeId);

impl Describing {
    fn enter<R: 'static>() -> Self {
        let id = TypeId::of::<R>();
        DESCRIBING.with(|stack| stack.borrow_mut().push(id));
        Self(id)
    }

    fn active<R: 'static>() -> bool {
        let id = TypeId::of::<R>();
        DESCRIBING.with(|stack| stack.borrow().contains(&id))
    }
}

impl Drop for Describing {
    fn drop(&mut self) {
        DESCRIBING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

/// Both backends of one attribute.
struct Slot<R> {
    descriptor: AttributeDescriptor,
    reflective: Arc<dyn Accessor<R>>,
    direct: Option<Arc<dyn Accessor<R>>>,
}

impl<R> Clone for Slot<R> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            reflective: Arc::clone(&self.reflective),
            direct: self.direct.clone(),
        }
    }
}

type Backends<R> = (Arc<dyn Accessor<R>>, Option<Arc<dyn Accessor<R>>>);
type Factory<R> = Box<dyn FnOnce(AttributeDescriptor) -> Result<Backends<R>>>;

struct Pending<R> {
    descriptor: AttributeDescriptor,
    property: bool,
    make: Factory<R>,
}

/// Resolved attribute table of one record type.
pub struct Schema<R> {
    type_name: String,
    fields: Vec<Slot<R>>,
    field_names: AHashMap<String, usize>,
    properties: Vec<Slot<R>>,
    property_names: AHashMap<String, usize>,
}

impl<R: Record> Schema<R> {
    /// Resolve (once) and return the cached schema of `R`.
    pub fn of() -> Result<Arc<Self>> {
        let cache = SCHEMAS.get_or_init(DashMap::new);
        let key = TypeId::of::<R>();
        if let Some(hit) = cache.get(&key).map(|e| Arc::clone(e.value())) {
            return hit
                .downcast::<Self>()
                .map_err(|_| RepoError::config("schema cache holds a foreign type"));
        }

        // Built outside the map lock: describe() may resolve nested schemas.
        let mut builder = SchemaBuilder::new();
        {
            let _describing = Describing::enter::<R>();
            R::describe(&mut builder);
        }
        let built: Arc<dyn Any + Send + Sync> = Arc::new(builder.build()?);
        let shared = Arc::clone(cache.entry(key).or_insert(built).value());
        tracing::debug!(record = short_type_name::<R>(), "resolved attribute schema");
        shared
            .downcast::<Self>()
            .map_err(|_| RepoError::config("schema cache holds a foreign type"))
    }

    /// Copy of `record` with the document's attributes applied.
    ///
    /// Unknown names, read-only and static attributes are skipped.
    pub fn apply_document(&self, record: &R, doc: &serde_json::Map<String, serde_json::Value>) -> Result<R> {
        let mut out = record.clone();
        for (name, json) in doc {
            let Some(slot) = self.slot(name, false) else { continue };
            if slot.descriptor.read_only || slot.descriptor.is_static {
                continue;
            }
            slot.reflective.set(&mut out, Value::from(json.clone()))?;
        }
        Ok(out)
    }
}

impl<R: 'static> Schema<R> {
    pub fn builder() -> SchemaBuilder<R> {
        SchemaBuilder::new()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn slot(&self, name: &str, prefer_property: bool) -> Option<&Slot<R>> {
        let field = self.field_names.get(name).map(|&i| &self.fields[i]);
        let property = self.property_names.get(name).map(|&i| &self.properties[i]);
        if prefer_property {
            property.or(field)
        } else {
            field.or(property)
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field_names.contains_key(name) || self.property_names.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.slot(name, false).map(|s| &s.descriptor)
    }

    /// All attribute descriptors; fields first, then properties not shadowed by a field.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.fields.iter().map(|s| &s.descriptor).chain(
            self.properties
                .iter()
                .filter(|s| !self.field_names.contains_key(&s.descriptor.name))
                .map(|s| &s.descriptor),
        )
    }

    /// Accessor for `name` under the given backend preference.
    ///
    /// `Direct` falls back to the reflective backend when the attribute
    /// registered no typed lens or offset.
    pub fn accessor(&self, name: &str, mode: AccessMode, prefer_property: bool) -> Option<Arc<dyn Accessor<R>>> {
        let slot = self.slot(name, prefer_property)?;
        match (mode, &slot.direct) {
            (AccessMode::Direct, Some(direct)) => Some(Arc::clone(direct)),
            _ => Some(Arc::clone(&slot.reflective)),
        }
    }

    /// Whether `name` has a typed backend (used for diagnostics only).
    pub(crate) fn has_direct(&self, name: &str, prefer_property: bool) -> bool {
        self.slot(name, prefer_property).is_some_and(|s| s.direct.is_some())
    }

    /// Attribute name -> value map of one record.
    pub fn snapshot(&self, record: &R) -> BTreeMap<String, Value> {
        self.attributes()
            .filter_map(|d| self.slot(&d.name, false))
            .map(|s| (s.descriptor.name.clone(), s.reflective.get(record)))
            .collect()
    }

    /// Portable document form of one record.
    pub fn to_document(&self, record: &R) -> serde_json::Map<String, serde_json::Value> {
        self.snapshot(record)
            .into_iter()
            .map(|(name, value)| (name, value.to_json()))
            .collect()
    }
}

/// Collects attribute registrations for one record type.
pub struct SchemaBuilder<R> {
    type_name: String,
    pending: Vec<Pending<R>>,
    inherited: Vec<(bool, Slot<R>)>,
    volatile: AHashSet<String>,
    error: Option<RepoError>,
}

impl<R: 'static> SchemaBuilder<R> {
    pub fn new() -> Self {
        Self {
            type_name: short_type_name::<R>().to_string(),
            pending: Vec::new(),
            inherited: Vec::new(),
            volatile: AHashSet::new(),
            error: None,
        }
    }

    /// Override the reported type name.
    pub fn type_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.type_name = name.into();
        self
    }

    fn push(&mut self, descriptor: AttributeDescriptor, property: bool, make: Factory<R>) -> &mut Self {
        self.pending.push(Pending { descriptor, property, make });
        self
    }

    fn fail(&mut self, err: RepoError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Mutable field, read and written through a typed lens.
    pub fn field<F: Primitive>(
        &mut self,
        name: &str,
        read: fn(&R) -> &F,
        write: fn(&mut R) -> &mut F,
    ) -> &mut Self {
        let descriptor = AttributeDescriptor::new(name, F::TYPE).nullable(F::NULLABLE);
        self.push(
            descriptor,
            false,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> { Ok(lens_backends(d, read, Some(write))) }),
        )
    }

    /// Immutable field.
    pub fn field_ro<F: Primitive>(&mut self, name: &str, read: fn(&R) -> &F) -> &mut Self {
        let descriptor = AttributeDescriptor::new(name, F::TYPE)
            .nullable(F::NULLABLE)
            .read_only(true);
        self.push(
            descriptor,
            false,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> { Ok(lens_backends(d, read, None)) }),
        )
    }

    /// Getter/setter pair. Registered in the property table, which is
    /// preferred when the repository is built with property access.
    pub fn property<F: Primitive>(
        &mut self,
        name: &str,
        getter: fn(&R) -> F,
        setter: Option<fn(&mut R, F)>,
    ) -> &mut Self {
        let descriptor = AttributeDescriptor::new(name, F::TYPE)
            .nullable(F::NULLABLE)
            .read_only(setter.is_none());
        self.push(
            descriptor,
            true,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> {
                let direct = Arc::new(PropertyAccessor::new(d.clone(), getter, setter));
                let typed = Arc::clone(&direct);
                let reflective = ReflectiveAccessor::new(
                    d,
                    Arc::new(move |r: &R| typed.get_typed(r).into_value()),
                    setter.map(|set| -> super::Setter<R> {
                        Arc::new(move |r: &mut R, v: Value| -> Result<()> {
                            set(r, F::from_value(v)?);
                            Ok(())
                        })
                    }),
                );
                Ok((Arc::new(reflective) as Arc<dyn Accessor<R>>, Some(direct as Arc<dyn Accessor<R>>)))
            }),
        )
    }

    /// Reflective-only attribute with a read-only getter.
    pub fn attribute(
        &mut self,
        descriptor: AttributeDescriptor,
        getter: impl Fn(&R) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        let descriptor = descriptor.read_only(true);
        self.push(
            descriptor,
            false,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> {
                let reflective = ReflectiveAccessor::new(d, Arc::new(getter), None);
                Ok((Arc::new(reflective) as Arc<dyn Accessor<R>>, None))
            }),
        )
    }

    /// Reflective-only attribute with a setter. The setter receives values
    /// already coerced to the declared type.
    pub fn attribute_mut(
        &mut self,
        descriptor: AttributeDescriptor,
        getter: impl Fn(&R) -> Value + Send + Sync + 'static,
        setter: impl Fn(&mut R, Value) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.push(
            descriptor,
            false,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> {
                let setter: super::Setter<R> = Arc::new(setter);
                let reflective = ReflectiveAccessor::new(d, Arc::new(getter), Some(setter));
                Ok((Arc::new(reflective) as Arc<dyn Accessor<R>>, None))
            }),
        )
    }

    /// Static attribute shared by all records of the type.
    pub fn shared(&mut self, name: &str, ty: ValueType, read: impl Fn() -> Value + Send + Sync + 'static) -> &mut Self {
        let descriptor = AttributeDescriptor::new(name, ty).shared();
        self.push(
            descriptor,
            false,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> {
                let shared = SharedAccessor::new(d, Arc::new(read));
                Ok((Arc::new(shared) as Arc<dyn Accessor<R>>, None))
            }),
        )
    }

    /// Attribute holding an optional nested record. Its value is a
    /// `Value::Map` snapshot built from `N`'s own schema; absent is `Null`.
    ///
    /// `N` may be `R` itself or any type that nests `R` back.
    pub fn nested<N: Record>(&mut self, name: &str, read: fn(&R) -> Option<&N>) -> &mut Self {
        // Inside a cycle the schema of N is still being described.
        if !Describing::active::<N>() {
            if let Err(err) = Schema::<N>::of() {
                self.fail(err);
                return self;
            }
        }
        let component = Component::deferred(TypeId::of::<N>(), short_type_name::<N>(), || {
            let inner = Schema::<N>::of()?;
            Ok((inner.type_name.clone(), inner.attributes().cloned().collect()))
        });
        let descriptor = AttributeDescriptor::new(name, ValueType::Map)
            .nullable(true)
            .read_only(true)
            .with_component(component);
        self.push(
            descriptor,
            false,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> {
                let getter = move |r: &R| {
                    read(r)
                        .and_then(|n| Schema::<N>::of().ok().map(|inner| Value::Map(inner.snapshot(n))))
                        .unwrap_or(Value::Null)
                };
                let reflective = ReflectiveAccessor::new(d, Arc::new(getter), None);
                Ok((Arc::new(reflective) as Arc<dyn Accessor<R>>, None))
            }),
        )
    }

    /// Mark an attribute as requiring fenced access.
    pub fn volatile(&mut self, name: &str) -> &mut Self {
        self.volatile.insert(name.to_string());
        self
    }

    /// Add the attributes of a polymorphic variant's schema that are not
    /// registered here. First registration wins.
    pub fn merge(&mut self, other: &Schema<R>) -> &mut Self {
        for slot in &other.fields {
            self.inherited.push((false, slot.clone()));
        }
        for slot in &other.properties {
            self.inherited.push((true, slot.clone()));
        }
        self
    }

    pub fn build(self) -> Result<Schema<R>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut schema = Schema {
            type_name: self.type_name,
            fields: Vec::new(),
            field_names: AHashMap::new(),
            properties: Vec::new(),
            property_names: AHashMap::new(),
        };

        for name in &self.volatile {
            let known = self.pending.iter().any(|p| &p.descriptor.name == name)
                || self.inherited.iter().any(|(_, s)| &s.descriptor.name == name);
            if !known {
                return Err(RepoError::config(format!("volatile attribute {name} is not registered")));
            }
        }

        for Pending { mut descriptor, property, make } in self.pending {
            let (table, names) = if property {
                (&mut schema.properties, &mut schema.property_names)
            } else {
                (&mut schema.fields, &mut schema.field_names)
            };
            if names.contains_key(&descriptor.name) {
                return Err(RepoError::config(format!(
                    "attribute {} registered twice on {}",
                    descriptor.name, schema.type_name
                )));
            }
            if self.volatile.contains(&descriptor.name) {
                descriptor.volatile = true;
            }
            let (reflective, direct) = make(descriptor)?;
            let descriptor = reflective.descriptor().clone();
            names.insert(descriptor.name.clone(), table.len());
            table.push(Slot { descriptor, reflective, direct });
        }

        for (property, slot) in self.inherited {
            let (table, names) = if property {
                (&mut schema.properties, &mut schema.property_names)
            } else {
                (&mut schema.fields, &mut schema.field_names)
            };
            if names.contains_key(&slot.descriptor.name) {
                continue;
            }
            names.insert(slot.descriptor.name.clone(), table.len());
            table.push(slot);
        }

        Ok(schema)
    }
}

impl<R: 'static> Default for SchemaBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Pod> SchemaBuilder<R> {
    /// Field addressed by byte offset into a `Pod` record. Pass
    /// `std::mem::offset_of!(R, field)`.
    pub fn offset<F: Pod + Primitive>(&mut self, name: &str, offset: usize) -> &mut Self {
        let descriptor = AttributeDescriptor::new(name, F::TYPE);
        self.push(
            descriptor,
            false,
            Box::new(move |d: AttributeDescriptor| -> Result<Backends<R>> {
                let direct = Arc::new(OffsetAccessor::<R, F>::new(d.clone(), offset)?);
                let typed = Arc::clone(&direct);
                let typed_mut = Arc::clone(&direct);
                let setter: super::Setter<R> =
                    Arc::new(move |r: &mut R, v: Value| -> Result<()> { typed_mut.set_typed(r, F::from_value(v)?) });
                let reflective = ReflectiveAccessor::new(
                    d,
                    Arc::new(move |r: &R| typed.get_typed(r).into_value()),
                    Some(setter),
                );
                Ok((Arc::new(reflective) as Arc<dyn Accessor<R>>, Some(direct as Arc<dyn Accessor<R>>)))
            }),
        )
    }
}

fn lens_backends<R: 'static, F: Primitive>(
    descriptor: AttributeDescriptor,
    read: fn(&R) -> &F,
    write: Option<fn(&mut R) -> &mut F>,
) -> Backends<R> {
    let direct = Arc::new(FieldAccessor::new(descriptor.clone(), read, write));
    let reflective = ReflectiveAccessor::new(
        descriptor,
        Arc::new(move |r: &R| read(r).clone().into_value()),
        write.map(|write| -> super::Setter<R> {
            Arc::new(move |r: &mut R, v: Value| -> Result<()> {
                *write(r) = F::from_value(v)?;
                Ok(())
            })
        }),
    );
    (
        Arc::new(reflective) as Arc<dyn Accessor<R>>,
        Some(direct as Arc<dyn Accessor<R>>),
    )
}
