//! Reflective accessors: boxed closures over `Value`.

use super::{fenced, Accessor, AttributeDescriptor};
use crate::error::{RepoError, Result};
use crate::value::Value;
use std::marker::PhantomData;
use std::sync::Arc;

pub type Getter<R> = Arc<dyn Fn(&R) -> Value + Send + Sync>;
pub type Setter<R> = Arc<dyn Fn(&mut R, Value) -> Result<()> + Send + Sync>;

/// Works uniformly for any declared type; every call goes through a box.
pub struct ReflectiveAccessor<R> {
    descriptor: AttributeDescriptor,
    getter: Getter<R>,
    setter: Option<Setter<R>>,
}

impl<R> ReflectiveAccessor<R> {
    /// Without a setter the attribute is read-only.
    pub fn new(mut descriptor: AttributeDescriptor, getter: Getter<R>, setter: Option<Setter<R>>) -> Self {
        if setter.is_none() {
            descriptor.read_only = true;
        }
        Self { descriptor, getter, setter }
    }
}

impl<R> Accessor<R> for ReflectiveAccessor<R> {
    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn get(&self, record: &R) -> Value {
        fenced(self.descriptor.volatile, || (self.getter)(record))
    }

    fn set(&self, record: &mut R, value: Value) -> Result<()> {
        self.descriptor.check_writable()?;
        let setter = self.setter.as_ref().ok_or_else(|| RepoError::UnsupportedMutation {
            attribute: self.descriptor.name.clone(),
        })?;
        let value = value.coerce(self.descriptor.ty)?;
        if value.is_null() && !self.descriptor.nullable {
            return Err(value.coercion_error(self.descriptor.ty));
        }
        fenced(self.descriptor.volatile, || setter(record, value))
    }
}

/// Static attribute shared by every record of the type.
pub struct SharedAccessor<R> {
    descriptor: AttributeDescriptor,
    read: Arc<dyn Fn() -> Value + Send + Sync>,
    _record: PhantomData<fn(&R)>,
}

impl<R> SharedAccessor<R> {
    pub fn new(descriptor: AttributeDescriptor, read: Arc<dyn Fn() -> Value + Send + Sync>) -> Self {
        Self {
            descriptor: descriptor.shared(),
            read,
            _record: PhantomData,
        }
    }
}

impl<R> Accessor<R> for SharedAccessor<R> {
    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn get(&self, _record: &R) -> Value {
        fenced(self.descriptor.volatile, || (self.read)())
    }

    fn set(&self, _record: &mut R, _value: Value) -> Result<()> {
        Err(RepoError::UnsupportedMutation { attribute: self.descriptor.name.clone() })
    }

    fn get_static(&self) -> Option<Value> {
        Some(fenced(self.descriptor.volatile, || (self.read)()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    #[derive(Default)]
    struct Gauge {
        count: i32,
        label: Option<String>,
    }

    fn count_accessor() -> ReflectiveAccessor<Gauge> {
        ReflectiveAccessor::new(
            AttributeDescriptor::new("count", ValueType::Int),
            Arc::new(|p: &Gauge| Value::from(p.count)),
            Some(Arc::new(|p: &mut Gauge, v: Value| {
                p.count = v.as_i64().unwrap_or_default() as i32;
                Ok(())
            })),
        )
    }

    #[test]
    fn test_reflective_set_coerces_text() {
        let acc = count_accessor();
        let mut gauge = Gauge::default();
        acc.set(&mut gauge, Value::from("17")).unwrap();
        assert_eq!(gauge.count, 17);
        assert_eq!(acc.get(&gauge), Value::Int(17));
    }

    #[test]
    fn test_reflective_rejects_bad_input_without_change() {
        let acc = count_accessor();
        let mut gauge = Gauge { count: 4, label: None };
        assert!(matches!(acc.set(&mut gauge, Value::from("four")), Err(RepoError::Coercion { .. })));
        assert!(matches!(acc.set(&mut gauge, Value::Null), Err(RepoError::Coercion { .. })));
        assert_eq!(gauge.count, 4);
    }

    #[test]
    fn test_reflective_without_setter_is_read_only() {
        let acc: ReflectiveAccessor<Gauge> = ReflectiveAccessor::new(
            AttributeDescriptor::new("label", ValueType::Text).nullable(true),
            Arc::new(|p: &Gauge| Value::from(p.label.clone())),
            None,
        );
        assert!(acc.descriptor().read_only);
        let mut gauge = Gauge::default();
        assert_eq!(acc.get(&gauge), Value::Null);
        assert!(matches!(
            acc.set(&mut gauge, Value::from("x")),
            Err(RepoError::UnsupportedMutation { .. })
        ));
    }

    #[test]
    fn test_shared_accessor_ignores_record() {
        let acc: SharedAccessor<Gauge> = SharedAccessor::new(
            AttributeDescriptor::new("version", ValueType::Int),
            Arc::new(|| Value::Int(3)),
        );
        let mut gauge = Gauge::default();
        assert_eq!(acc.get(&gauge), Value::Int(3));
        assert_eq!(acc.get_static(), Some(Value::Int(3)));
        assert!(acc.descriptor().is_static);
        assert!(acc.set(&mut gauge, Value::Int(4)).is_err());
    }
}
