//! # Script Values
//!
//! The value model shared by every execution context. A value is either a
//! primitive (copied by value), a structured table (rebuilt recursively when
//! it crosses contexts) or a host handle (moved, never duplicated).
//!
//! Values are plain owned data: two contexts never observe the same table.
//! The only thing that can be shared is the host object behind a
//! [`HostHandle`], and its ownership is tracked by the handle's tag.

use std::fmt;

use crate::handle::HostHandle;

/// Classification used by the cross-context copier to pick copy or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Nil, booleans, numbers, strings and light references
    Primitive,
    /// Key/value tables
    Structured,
    /// Unique external resources
    HostHandle,
}

/// A dynamically typed script value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Opaque pointer-sized reference owned by the host. Copied bit for bit.
    LightRef(usize),
    Table(Table),
    Handle(HostHandle),
}

impl Value {
    /// Returns the copy/move classification of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Table(_) => ValueKind::Structured,
            Value::Handle(_) => ValueKind::HostHandle,
            _ => ValueKind::Primitive,
        }
    }

    /// Script-level type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::LightRef(_) => "lightref",
            Value::Table(_) => "table",
            Value::Handle(_) => "handle",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&HostHandle> {
        match self {
            Value::Handle(h) => Some(h),
            _ => None,
        }
    }

    /// Returns the number as a non-negative integer when it has no fractional part
    pub fn as_count(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= usize::MAX as f64 => {
                Some(*n as usize)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => {
                // integral numbers print without a fractional part
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::LightRef(p) => write!(f, "lightref: {:#x}", p),
            Value::Table(t) => write!(f, "table: {} entries", t.len()),
            Value::Handle(h) => write!(f, "{}", h),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<HostHandle> for Value {
    fn from(h: HostHandle) -> Self {
        Value::Handle(h)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// Insertion-ordered key/value table.
///
/// Setting a key to `nil` removes it, mirroring how script tables behave.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    entries: Vec<(Value, Value)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sequence table with keys `1..=n`
    pub fn from_sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::Number((i + 1) as f64), v.into()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &Value) -> Option<&mut Value> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Shorthand for string keys
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let position = self.entries.iter().position(|(k, _)| *k == key);
        match (position, value.is_nil()) {
            (Some(i), true) => {
                self.entries.remove(i);
            }
            (Some(i), false) => self.entries[i].1 = value,
            (None, true) => {}
            (None, false) => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&mut Value, &mut Value)> {
        self.entries.iter_mut().map(|(k, v)| (k, v))
    }

    /// Appends an entry without checking for an existing key.
    /// Used by the copier, which rebuilds tables whose keys are already unique.
    pub fn push_unchecked(&mut self, key: Value, value: Value) {
        self.entries.push((key, value));
    }
}
