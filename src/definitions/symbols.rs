//! String interning.
//!
//! Every string that ends up in the archive (region names, categories,
//! location names, attribute keys and string values) is stored once and
//! referenced by a dense integer id.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Reference to an interned string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StringRef(u32);

impl StringRef {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "string#{}", self.0)
    }
}

/// Append-only string table
///
/// Ids are assigned in first-interned order, so identical inputs interned in
/// the same order always produce the same table.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    lookup: HashMap<String, StringRef>,
    strings: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the reference for `value`, adding it on first sight
    pub fn intern(&mut self, value: &str) -> StringRef {
        if let Some(existing) = self.lookup.get(value) {
            return *existing;
        }

        let id = StringRef(self.strings.len() as u32);
        self.strings.push(value.to_string());
        self.lookup.insert(value.to_string(), id);
        id
    }

    /// Look up an already interned string without adding it
    pub fn get(&self, value: &str) -> Option<StringRef> {
        self.lookup.get(value).copied()
    }

    pub fn resolve(&self, id: StringRef) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// All strings in id order
    pub fn iter(&self) -> impl Iterator<Item = (StringRef, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StringRef(i as u32), s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = SymbolTable::new();
        let a = table.intern("conv2d");
        let b = table.intern("matmul");
        let again = table.intern("conv2d");

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ids_are_dense_and_ordered() {
        let mut table = SymbolTable::new();
        for name in ["", "a", "b", "a", ""] {
            table.intern(name);
        }

        let collected: Vec<_> = table.iter().map(|(id, s)| (id.id(), s)).collect();
        assert_eq!(collected, vec![(0, ""), (1, "a"), (2, "b")]);
    }

    #[test]
    fn test_resolve_and_get() {
        let mut table = SymbolTable::new();
        let id = table.intern("Op");

        assert_eq!(table.resolve(id), Some("Op"));
        assert_eq!(table.get("Op"), Some(id));
        assert_eq!(table.get("missing"), None);
        assert_eq!(table.resolve(StringRef::new(42)), None);
    }
}
