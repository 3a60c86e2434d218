//! Heap payload types traversed by the collector.
//!
//! Containers (`List`, `Dict`, `Set`, `Instance`) are what make the mark
//! walk a graph traversal; `Callable` is a markable leaf. Each container
//! tracks whether it may hold heap references so the walk can skip
//! ref-free payloads.

pub mod dict;
pub mod list;

use indexmap::IndexMap;

pub use dict::{Dict, Set};
pub use list::List;

use crate::value::Value;

/// A callable heap object: a compiled function or a native binding.
///
/// Callables are markable (they live in object slots) but not iterable:
/// their code and constants belong to the compiler's chunk tables, which
/// are roots of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callable {
    pub name: Box<str>,
    pub arity: u8,
    /// Index of the compiled code unit this callable executes.
    pub unit: u16,
}

impl Callable {
    #[must_use]
    pub fn new(name: impl Into<Box<str>>, arity: u8, unit: u16) -> Self {
        Self {
            name: name.into(),
            arity,
            unit,
        }
    }
}

/// A user-defined object: a string-keyed attribute table.
///
/// Attributes keep insertion order so repr output and attribute iteration
/// are deterministic. The mark walk visits every attribute value.
#[derive(Debug, Default)]
pub struct Instance {
    attrs: IndexMap<Box<str>, Value>,
    contains_refs: bool,
}

impl Instance {
    /// Creates a new object with no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, returning the previous value when present.
    pub fn set_attr(&mut self, name: impl Into<Box<str>>, value: Value) -> Option<Value> {
        if value.is_markable() {
            self.contains_refs = true;
        }
        self.attrs.insert(name.into(), value)
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterates attributes in insertion order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(name, value)| (name.as_ref(), value))
    }

    /// Returns whether this object may hold heap references.
    #[inline]
    #[must_use]
    pub fn contains_refs(&self) -> bool {
        self.contains_refs
    }
}
