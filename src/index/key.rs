//! Key derivation: where an index key comes from and how it is normalized.

use super::NestedPath;
use crate::attr::{Accessor, Record};
use crate::value::{Value, ValueType};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Injected ordering for search indexes (collation, custom sort).
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Normalization applied to a derived key before it is indexed.
///
/// Built-in transforms touch text only; other values pass through.
#[derive(Clone)]
pub enum KeyTransform {
    Lower,
    Upper,
    /// `first_name`, `First Name` -> `firstName`
    CamelCase,
    /// `firstName`, `first name` -> `FIRST_NAME`
    UnderBarCase,
    Custom(Arc<dyn Fn(Value) -> Value + Send + Sync>),
}

impl KeyTransform {
    pub fn custom(f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        KeyTransform::Custom(Arc::new(f))
    }

    pub fn apply(&self, value: Value) -> Value {
        match (self, value) {
            (KeyTransform::Custom(f), value) => f(value),
            (KeyTransform::Lower, Value::Text(s)) => Value::Text(s.to_lowercase()),
            (KeyTransform::Upper, Value::Text(s)) => Value::Text(s.to_uppercase()),
            (KeyTransform::CamelCase, Value::Text(s)) => Value::Text(camel_case(&s)),
            (KeyTransform::UnderBarCase, Value::Text(s)) => Value::Text(under_bar_case(&s)),
            (_, value) => value,
        }
    }
}

impl fmt::Debug for KeyTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTransform::Lower => f.write_str("Lower"),
            KeyTransform::Upper => f.write_str("Upper"),
            KeyTransform::CamelCase => f.write_str("CamelCase"),
            KeyTransform::UnderBarCase => f.write_str("UnderBarCase"),
            KeyTransform::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Split on separators and lower-to-upper case boundaries.
fn words(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, word) in words(s).iter().enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn under_bar_case(s: &str) -> String {
    words(s)
        .iter()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Where the raw key comes from.
pub enum KeySource<R> {
    Attribute(Arc<dyn Accessor<R>>),
    Path(NestedPath<R>),
    /// Derived or composite key supplied by the caller
    Custom(Arc<dyn Fn(&R) -> Value + Send + Sync>),
    /// The record's most-derived type name
    TypeName,
}

impl<R> Clone for KeySource<R> {
    fn clone(&self) -> Self {
        match self {
            KeySource::Attribute(a) => KeySource::Attribute(Arc::clone(a)),
            KeySource::Path(p) => KeySource::Path(p.clone()),
            KeySource::Custom(f) => KeySource::Custom(Arc::clone(f)),
            KeySource::TypeName => KeySource::TypeName,
        }
    }
}

/// Accessor (or path, or closure) composed with an optional transform.
pub struct KeyGetter<R> {
    source: KeySource<R>,
    transform: Option<KeyTransform>,
}

impl<R> Clone for KeyGetter<R> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<R: Record> KeyGetter<R> {
    pub fn new(source: KeySource<R>) -> Self {
        Self { source, transform: None }
    }

    pub fn attribute(accessor: Arc<dyn Accessor<R>>) -> Self {
        Self::new(KeySource::Attribute(accessor))
    }

    pub fn with_transform(mut self, transform: Option<KeyTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn transform(&self) -> Option<&KeyTransform> {
        self.transform.as_ref()
    }

    pub fn source(&self) -> &KeySource<R> {
        &self.source
    }

    /// Declared type of the raw key, when the source is a single attribute.
    pub fn declared_type(&self) -> Option<ValueType> {
        match &self.source {
            KeySource::Attribute(a) => Some(a.descriptor().ty),
            KeySource::TypeName => Some(ValueType::Text),
            _ => None,
        }
    }

    /// Apply this getter's transform to a caller-supplied value.
    pub fn normalize(&self, value: Value) -> Value {
        match &self.transform {
            Some(t) => t.apply(value),
            None => value,
        }
    }

    /// Derived, transformed key. `None` when the key is absent or null.
    pub fn derive(&self, record: &R) -> Option<Value> {
        let raw = match &self.source {
            KeySource::Attribute(a) => a.get(record),
            KeySource::Path(p) => p.walk(record)?,
            KeySource::Custom(f) => f(record),
            KeySource::TypeName => Value::Text(record.type_name().to_string()),
        };
        if raw.is_null() {
            return None;
        }
        Some(self.normalize(raw))
    }
}
