//! Direct accessors: monomorphized field lenses and `Pod` byte offsets.
//!
//! Typed `get_typed` / `set_typed` bypass `Value` entirely; the `Accessor`
//! impls box only at the trait boundary.

use super::{fenced, Accessor, AttributeDescriptor};
use crate::error::{RepoError, Result};
use crate::value::{Primitive, Value};
use bytemuck::Pod;
use std::marker::PhantomData;
use std::mem::size_of;

/// Field lens: `&R -> &F` and `&mut R -> &mut F`.
pub struct FieldAccessor<R, F> {
    descriptor: AttributeDescriptor,
    read: fn(&R) -> &F,
    write: Option<fn(&mut R) -> &mut F>,
}

impl<R, F: Primitive> FieldAccessor<R, F> {
    pub fn new(mut descriptor: AttributeDescriptor, read: fn(&R) -> &F, write: Option<fn(&mut R) -> &mut F>) -> Self {
        if write.is_none() {
            descriptor.read_only = true;
        }
        Self { descriptor, read, write }
    }

    #[inline]
    pub fn get_typed(&self, record: &R) -> F {
        fenced(self.descriptor.volatile, || (self.read)(record).clone())
    }

    #[inline]
    pub fn set_typed(&self, record: &mut R, value: F) -> Result<()> {
        self.descriptor.check_writable()?;
        let write = self.write.ok_or_else(|| RepoError::UnsupportedMutation {
            attribute: self.descriptor.name.clone(),
        })?;
        fenced(self.descriptor.volatile, || *write(record) = value);
        Ok(())
    }
}

impl<R, F: Primitive> Accessor<R> for FieldAccessor<R, F> {
    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn get(&self, record: &R) -> Value {
        self.get_typed(record).into_value()
    }

    fn set(&self, record: &mut R, value: Value) -> Result<()> {
        self.descriptor.check_writable()?;
        self.set_typed(record, F::from_value(value)?)
    }
}

/// Getter/setter pair ("property" access), for attributes computed or
/// validated by methods rather than stored in a plain field.
pub struct PropertyAccessor<R, F> {
    descriptor: AttributeDescriptor,
    getter: fn(&R) -> F,
    setter: Option<fn(&mut R, F)>,
}

impl<R, F: Primitive> PropertyAccessor<R, F> {
    pub fn new(mut descriptor: AttributeDescriptor, getter: fn(&R) -> F, setter: Option<fn(&mut R, F)>) -> Self {
        if setter.is_none() {
            descriptor.read_only = true;
        }
        Self { descriptor, getter, setter }
    }

    #[inline]
    pub fn get_typed(&self, record: &R) -> F {
        fenced(self.descriptor.volatile, || (self.getter)(record))
    }

    #[inline]
    pub fn set_typed(&self, record: &mut R, value: F) -> Result<()> {
        self.descriptor.check_writable()?;
        let setter = self.setter.ok_or_else(|| RepoError::UnsupportedMutation {
            attribute: self.descriptor.name.clone(),
        })?;
        fenced(self.descriptor.volatile, || setter(record, value));
        Ok(())
    }
}

impl<R, F: Primitive> Accessor<R> for PropertyAccessor<R, F> {
    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn get(&self, record: &R) -> Value {
        self.get_typed(record).into_value()
    }

    fn set(&self, record: &mut R, value: Value) -> Result<()> {
        self.descriptor.check_writable()?;
        self.set_typed(record, F::from_value(value)?)
    }
}

/// Precomputed byte offset into a `Pod` record.
///
/// `R: Pod` guarantees a stable layout with no padding, so the slice
/// `offset..offset + size_of::<F>()` is always the field's bytes. Pass
/// `std::mem::offset_of!(R, field)` as the offset.
pub struct OffsetAccessor<R, F> {
    descriptor: AttributeDescriptor,
    offset: usize,
    _layout: PhantomData<fn(&R) -> F>,
}

impl<R: Pod, F: Pod + Primitive> OffsetAccessor<R, F> {
    pub fn new(descriptor: AttributeDescriptor, offset: usize) -> Result<Self> {
        if offset + size_of::<F>() > size_of::<R>() {
            return Err(RepoError::config(format!(
                "offset {} of attribute {} exceeds record size {}",
                offset,
                descriptor.name,
                size_of::<R>()
            )));
        }
        Ok(Self { descriptor, offset, _layout: PhantomData })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn get_typed(&self, record: &R) -> F {
        let range = self.offset..self.offset + size_of::<F>();
        fenced(self.descriptor.volatile, || {
            bytemuck::pod_read_unaligned(&bytemuck::bytes_of(record)[range])
        })
    }

    #[inline]
    pub fn set_typed(&self, record: &mut R, value: F) -> Result<()> {
        self.descriptor.check_writable()?;
        let range = self.offset..self.offset + size_of::<F>();
        fenced(self.descriptor.volatile, || {
            bytemuck::bytes_of_mut(record)[range].copy_from_slice(bytemuck::bytes_of(&value))
        });
        Ok(())
    }
}

impl<R: Pod, F: Pod + Primitive> Accessor<R> for OffsetAccessor<R, F> {
    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn get(&self, record: &R) -> Value {
        self.get_typed(record).into_value()
    }

    fn set(&self, record: &mut R, value: Value) -> Result<()> {
        self.descriptor.check_writable()?;
        self.set_typed(record, F::from_value(value)?)
    }
}
