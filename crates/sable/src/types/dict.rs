use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use hashbrown::HashTable;

use crate::{
    exceptions::{BuiltinExc, RunError, RunResult},
    heap::{Heap, HeapData},
    value::Value,
};

/// Entry in the dict storage, containing a key-value pair and the key's
/// cached hash.
#[derive(Debug)]
pub(crate) struct DictEntry {
    pub(crate) key: Value,
    pub(crate) value: Value,
    /// The hash is cached so reindexing never has to re-hash through the heap.
    hash: u64,
}

/// Sable dict type preserving insertion order.
///
/// # Storage Strategy
/// Uses a `HashTable<usize>` for hash lookups combined with a dense
/// `Vec<DictEntry>` that preserves insertion order. The hash table maps key
/// hashes to indices in the entries vector, giving O(1) lookups while
/// keeping iteration deterministic.
///
/// # Collector Traversal
/// The mark walk visits every entry's key and value. The `contains_refs`
/// flag lets the walk skip dicts of primitives entirely; it only
/// transitions from false to true.
#[derive(Debug, Default)]
pub struct Dict {
    /// Maps an entry hash to its index in `entries`.
    indices: HashTable<usize>,
    /// Dense vec maintaining entry order.
    entries: Vec<DictEntry>,
    contains_refs: bool,
}

impl Dict {
    /// Creates a new empty dict.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: HashTable::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            contains_refs: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether this dict may contain heap references.
    #[inline]
    #[must_use]
    pub fn contains_refs(&self) -> bool {
        self.contains_refs
    }

    /// Inserts a key-value pair, returning the previous value when the key
    /// was already present.
    ///
    /// Fails with a recoverable `TypeError` when the key is unhashable
    /// (lists, dicts, sets, and user objects hash by identity elsewhere but
    /// are rejected as dict keys, matching the VM's equality semantics).
    pub fn insert(&mut self, key: Value, value: Value, heap: &Heap) -> RunResult<Option<Value>> {
        if key.is_markable() || value.is_markable() {
            self.contains_refs = true;
        }
        let hash = value_hash(&key, heap)?;
        if let Some(index) = self.find_index(&key, hash, heap) {
            // Key exists; replace in place to preserve insertion order.
            let old = std::mem::replace(&mut self.entries[index].value, value);
            return Ok(Some(old));
        }
        let index = self.entries.len();
        self.entries.push(DictEntry { key, value, hash });
        self.indices
            .insert_unique(hash, index, |index| self.entries[*index].hash);
        Ok(None)
    }

    /// Looks up a key, returning `Ok(None)` when absent and an error when
    /// the key is unhashable.
    pub fn get(&self, key: &Value, heap: &Heap) -> RunResult<Option<&Value>> {
        let hash = value_hash(key, heap)?;
        Ok(self.find_index(key, hash, heap).map(|index| &self.entries[index].value))
    }

    /// Returns whether the dict contains the given key.
    pub fn contains_key(&self, key: &Value, heap: &Heap) -> RunResult<bool> {
        Ok(self.get(key, heap)?.is_some())
    }

    /// Iterates entries in insertion order (used by the mark walk and repr).
    pub fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|entry| (&entry.key, &entry.value))
    }

    fn find_index(&self, key: &Value, hash: u64, heap: &Heap) -> Option<usize> {
        self.indices
            .find(hash, |&index| {
                let entry = &self.entries[index];
                entry.hash == hash && key_eq(&entry.key, key, heap)
            })
            .copied()
    }
}

/// Sable set type: a dict whose entries carry no value payload.
///
/// The mark walk visits set entries by key only.
#[derive(Debug, Default)]
pub struct Set {
    inner: Dict,
}

impl Set {
    /// Creates a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, returning true when it was not already present.
    pub fn insert(&mut self, value: Value, heap: &Heap) -> RunResult<bool> {
        Ok(self.inner.insert(value, Value::None, heap)?.is_none())
    }

    /// Returns whether the set contains the given value.
    pub fn contains(&self, value: &Value, heap: &Heap) -> RunResult<bool> {
        self.inner.contains_key(value, heap)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn contains_refs(&self) -> bool {
        self.inner.contains_refs()
    }

    /// Iterates members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.inner.entries().map(|(key, _)| key)
    }
}

/// Hashes a value for dict/set keying.
///
/// Immediates hash by tag and bits (`0.0` and `-0.0` collapse so numeric
/// equality implies hash equality). Strings hash by content; other heap
/// values hash by handle identity. Containers are unhashable and fail with
/// a recoverable `TypeError`.
pub(crate) fn value_hash(value: &Value, heap: &Heap) -> RunResult<u64> {
    let mut hasher = DefaultHasher::new();
    match value {
        Value::None => 0u8.hash(&mut hasher),
        Value::Bool(b) => (1u8, b).hash(&mut hasher),
        Value::Num(n) => {
            let normalized = if *n == 0.0 { 0.0 } else { *n };
            (2u8, normalized.to_bits()).hash(&mut hasher);
        }
        Value::Ref(id) => {
            let data = heap
                .data(*id)
                .ok_or_else(|| RunError::new(BuiltinExc::ObjHashError, "Hashing a dangling object handle"))?;
            match data {
                HeapData::Str(s) => (3u8, s).hash(&mut hasher),
                HeapData::Callable(_) => (4u8, id).hash(&mut hasher),
                HeapData::List(_) => return Err(unhashable("list")),
                HeapData::Dict(_) => return Err(unhashable("dict")),
                HeapData::Set(_) => return Err(unhashable("set")),
                HeapData::Instance(_) => return Err(unhashable("object")),
            }
        }
    }
    Ok(hasher.finish())
}

fn unhashable(type_name: &str) -> RunError {
    RunError::new(BuiltinExc::TypeError, format!("Unhashable type '{type_name}'"))
}

/// Key equality for dict/set lookups.
///
/// Numbers compare by IEEE equality, strings by content, every other heap
/// value by handle identity.
fn key_eq(a: &Value, b: &Value, heap: &Heap) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Ref(x), Value::Ref(y)) => {
            if x == y {
                return true;
            }
            match (heap.data(*x), heap.data(*y)) {
                (Some(HeapData::Str(sx)), Some(HeapData::Str(sy))) => sx == sy,
                _ => false,
            }
        }
        _ => false,
    }
}
