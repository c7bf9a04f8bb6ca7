//! Order-preserving, name-deduplicating entity store.
//!
//! Every resource kind in the document (meshes, materials, textures, ...)
//! goes through one of these. Index values are referenced directly in the
//! final document, so the order of first registration determines document
//! layout and must be deterministic.

use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};

/// A name → index deduplicating store.
///
/// Registering an already-present name returns the existing index without
/// inserting a duplicate. Single-threaded by design: deduplication by name
/// requires a strict visitation order, so there is nothing to parallelize.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<T>,
    names: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl<T> Registry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Registers `entity` under `name`, returning its index. If `name` is
    /// already present the existing index is returned and `entity` is
    /// dropped.
    pub fn register(&mut self, name: &str, entity: T) -> usize {
        self.register_with(name, || entity)
    }

    /// Like [`Self::register`] but only builds the entity when the name is
    /// not yet present.
    pub fn register_with(&mut self, name: &str, build: impl FnOnce() -> T) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.entries.len();
        self.entries.push(build());
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), i);
        i
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities in first-registration order.
    #[must_use]
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// Registration names, parallel to [`Self::entries`].
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// The document writer sees a registry as its ordered entity sequence; names
// are compile-time bookkeeping and are not part of the document.
impl<T: Serialize> Serialize for Registry<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}
