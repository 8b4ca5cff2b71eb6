//! Dynamic Attribute Values
//!
//! `Value` is the boxed form every attribute can be read as. It is also the
//! key type of every index, so it carries a total order and a hash that
//! agree with each other (floats compare by `total_cmp` and hash by bits).
//!
//! `ValueType` is the declared type of an attribute. `Value::coerce` converts
//! loosely-typed input (text, other numeric widths) into the declared type.

use crate::error::{RepoError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Boxed attribute value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Char(char),
    List(Vec<Value>),
    /// Snapshot of a nested record (attribute name -> value)
    Map(BTreeMap<String, Value>),
}

/// Declared type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Text,
    List,
    Map,
    /// No declared type; values pass through unchanged
    Any,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Byte => "byte",
            ValueType::Short => "short",
            ValueType::Int => "int",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Char => "char",
            ValueType::Text => "text",
            ValueType::List => "list",
            ValueType::Map => "map",
            ValueType::Any => "any",
        }
    }

    /// Inclusive range for integral types.
    fn integral_bounds(&self) -> Option<(i64, i64)> {
        match self {
            ValueType::Byte => Some((i8::MIN as i64, i8::MAX as i64)),
            ValueType::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            ValueType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            ValueType::Long => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Field of a nested record snapshot.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(fields) => fields.get(name),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Char(_) => 4,
            Value::Text(_) => 5,
            Value::List(_) => 6,
            Value::Map(_) => 7,
        }
    }

    pub(crate) fn coercion_error(&self, target: ValueType) -> RepoError {
        RepoError::Coercion {
            value: self.to_string(),
            target: target.name().to_string(),
        }
    }

    /// Convert to the declared type, or fail with `Coercion`.
    ///
    /// Null passes through untouched; whether null is acceptable is the
    /// caller's decision.
    pub fn coerce(self, target: ValueType) -> Result<Value> {
        if self.is_null() {
            return Ok(self);
        }
        match target {
            ValueType::Any => Ok(self),
            ValueType::Bool => match self {
                Value::Bool(_) => Ok(self),
                Value::Int(i) => Ok(Value::Bool(i != 0)),
                Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
                    "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
                    _ => Err(self.coercion_error(target)),
                },
                _ => Err(self.coercion_error(target)),
            },
            ValueType::Byte | ValueType::Short | ValueType::Int | ValueType::Long => {
                let integral = match &self {
                    Value::Int(i) => Some(*i),
                    Value::Bool(b) => Some(*b as i64),
                    Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                        if *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                            Some(*f as i64)
                        } else {
                            None
                        }
                    }
                    Value::Text(s) => {
                        let s = s.trim();
                        s.parse::<i64>().ok().or_else(|| {
                            s.parse::<f64>()
                                .ok()
                                .filter(|f| f.is_finite() && f.fract() == 0.0)
                                .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                                .map(|f| f as i64)
                        })
                    }
                    _ => None,
                };
                let (lo, hi) = target.integral_bounds().unwrap_or((i64::MIN, i64::MAX));
                match integral {
                    Some(i) if i >= lo && i <= hi => Ok(Value::Int(i)),
                    _ => Err(self.coercion_error(target)),
                }
            }
            ValueType::Float | ValueType::Double => {
                let wide = match &self {
                    Value::Float(f) => Some(*f),
                    Value::Int(i) => Some(*i as f64),
                    Value::Text(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match (wide, target) {
                    (Some(f), ValueType::Float) => {
                        let narrow = f as f32;
                        if f.is_finite() && !narrow.is_finite() {
                            Err(self.coercion_error(target))
                        } else {
                            Ok(Value::Float(narrow as f64))
                        }
                    }
                    (Some(f), _) => Ok(Value::Float(f)),
                    (None, _) => Err(self.coercion_error(target)),
                }
            }
            ValueType::Char => match self {
                Value::Char(_) => Ok(self),
                Value::Text(ref s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Ok(Value::Char(c)),
                        _ => Err(self.coercion_error(target)),
                    }
                }
                Value::Int(i) => u32::try_from(i)
                    .ok()
                    .and_then(char::from_u32)
                    .map(Value::Char)
                    .ok_or_else(|| self.coercion_error(target)),
                _ => Err(self.coercion_error(target)),
            },
            ValueType::Text => match self {
                Value::Text(_) => Ok(self),
                Value::List(_) | Value::Map(_) => Err(self.coercion_error(target)),
                other => Ok(Value::Text(other.to_string())),
            },
            ValueType::List => match self {
                Value::List(_) => Ok(self),
                _ => Err(self.coercion_error(target)),
            },
            ValueType::Map => match self {
                Value::Map(_) => Ok(self),
                _ => Err(self.coercion_error(target)),
            },
        }
    }

    /// Portable document form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Char(c) => serde_json::Value::String(c.to_string()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            // Mixed numerics order by magnitude; ties keep Int first so Eq stays strict
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Char(c) => c.hash(state),
            Value::Text(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(fields) => fields.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Text(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(fields) => {
                Value::Map(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============ TYPED PRIMITIVES ============

/// An attribute type that can be read and written without boxing.
pub trait Primitive: Clone + Send + Sync + 'static {
    /// Declared type reported by accessors.
    const TYPE: ValueType;
    /// Whether `Value::Null` is a legal value.
    const NULLABLE: bool = false;

    fn into_value(self) -> Value;

    /// Convert from a boxed value, coercing where possible.
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! integer_primitive {
    ($($t:ty => $vt:ident),*) => {
        $(impl Primitive for $t {
            const TYPE: ValueType = ValueType::$vt;

            fn into_value(self) -> Value {
                Value::Int(self as i64)
            }

            fn from_value(value: Value) -> Result<Self> {
                match value.coerce(Self::TYPE)? {
                    Value::Int(i) => <$t>::try_from(i)
                        .map_err(|_| Value::Int(i).coercion_error(Self::TYPE)),
                    other => Err(other.coercion_error(Self::TYPE)),
                }
            }
        })*
    };
}

integer_primitive!(i8 => Byte, i16 => Short, i32 => Int, i64 => Long, u8 => Short, u16 => Int, u32 => Long);

impl Primitive for f32 {
    const TYPE: ValueType = ValueType::Float;

    fn into_value(self) -> Value {
        Value::Float(self as f64)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.coerce(Self::TYPE)? {
            Value::Float(f) => Ok(f as f32),
            other => Err(other.coercion_error(Self::TYPE)),
        }
    }
}

impl Primitive for f64 {
    const TYPE: ValueType = ValueType::Double;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.coerce(Self::TYPE)? {
            Value::Float(f) => Ok(f),
            other => Err(other.coercion_error(Self::TYPE)),
        }
    }
}

impl Primitive for bool {
    const TYPE: ValueType = ValueType::Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.coerce(Self::TYPE)? {
            Value::Bool(b) => Ok(b),
            other => Err(other.coercion_error(Self::TYPE)),
        }
    }
}

impl Primitive for char {
    const TYPE: ValueType = ValueType::Char;

    fn into_value(self) -> Value {
        Value::Char(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.coerce(Self::TYPE)? {
            Value::Char(c) => Ok(c),
            other => Err(other.coercion_error(Self::TYPE)),
        }
    }
}

impl Primitive for String {
    const TYPE: ValueType = ValueType::Text;

    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.coerce(Self::TYPE)? {
            Value::Text(s) => Ok(s),
            other => Err(other.coercion_error(Self::TYPE)),
        }
    }
}

impl<P: Primitive> Primitive for Option<P> {
    const TYPE: ValueType = P::TYPE;
    const NULLABLE: bool = true;

    fn into_value(self) -> Value {
        self.map(P::into_value).unwrap_or(Value::Null)
    }

    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            P::from_value(value).map(Some)
        }
    }
}
