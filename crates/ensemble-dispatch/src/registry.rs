//! Sorted part registry with unique-prefix abbreviation.
//!
//! A [`PartRegistry`] keeps the parts of one ensemble in a vector sorted by
//! name. Lookups are binary searches; insertion and removal shift the tail
//! of the vector. Every entry caches `min_chars`, the shortest prefix of its
//! name that no sibling shares, so abbreviation matching never has to scan
//! the whole registry.
//!
//! # Why neighbours are enough
//!
//! In a sorted list, the longest common prefix between an entry and *any*
//! other entry is reached at one of its two immediate neighbours. After an
//! insert or a removal only the entries whose neighbours changed need their
//! `min_chars` refreshed: the mutated slot and the slots on either side.
//! This holds as long as names are never changed in place.

use std::cmp::Ordering;

use thiserror::Error;
use tracing::trace;

/// Initial backing capacity; the vector grows geometrically past it.
const INITIAL_CAPACITY: usize = 10;

/// Errors produced by registry mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An entry with this exact name already exists.
    #[error("duplicate name \"{0}\"")]
    Duplicate(String),
    /// Names must have at least one character.
    #[error("empty name")]
    EmptyName,
}

/// One named slot in the registry.
#[derive(Debug)]
pub struct Entry<T> {
    name: String,
    min_chars: usize,
    /// The payload stored under this name.
    pub value: T,
}

impl<T> Entry<T> {
    /// The full, canonical name of this entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum prefix length (in characters) that identifies this entry.
    pub fn min_chars(&self) -> usize {
        self.min_chars
    }
}

/// Outcome of a prefix lookup.
#[derive(Debug)]
pub enum Lookup<'a, T> {
    /// Exactly one entry is identified by the prefix.
    Found(&'a Entry<T>),
    /// Several entries share the prefix; listed in sorted order.
    Ambiguous(Vec<&'a Entry<T>>),
    /// No entry starts with the prefix.
    NotFound,
}

impl<T> Lookup<'_, T> {
    /// Returns true if the lookup resolved to a single entry.
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Returns true if the prefix was ambiguous.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Lookup::Ambiguous(_))
    }

    /// Returns true if nothing matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }

    /// Name of the resolved entry, if any.
    pub fn found_name(&self) -> Option<&str> {
        match self {
            Lookup::Found(entry) => Some(entry.name()),
            _ => None,
        }
    }
}

/// Sorted, duplicate-free collection of named entries.
#[derive(Debug)]
pub struct PartRegistry<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for PartRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.iter()
    }

    /// Names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Name of the first entry, if any.
    pub fn first_name(&self) -> Option<&str> {
        self.entries.first().map(|e| e.name.as_str())
    }

    /// Inserts a new entry, keeping the registry sorted.
    ///
    /// Fails with [`RegistryError::Duplicate`] if the name exists and with
    /// [`RegistryError::EmptyName`] for `""`; the registry is untouched in
    /// both cases.
    pub fn insert(&mut self, name: &str, value: T) -> Result<&mut Entry<T>, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let pos = match self.search_exact(name) {
            Ok(_) => return Err(RegistryError::Duplicate(name.to_string())),
            Err(pos) => pos,
        };

        self.entries.insert(
            pos,
            Entry {
                name: name.to_string(),
                min_chars: 1,
                value,
            },
        );
        trace!(name, pos, len = self.entries.len(), "registry insert");

        self.recompute_min_chars(pos);
        if pos > 0 {
            self.recompute_min_chars(pos - 1);
        }
        if pos + 1 < self.entries.len() {
            self.recompute_min_chars(pos + 1);
        }

        Ok(&mut self.entries[pos])
    }

    /// Removes the entry with this exact name and returns it.
    pub fn remove(&mut self, name: &str) -> Option<Entry<T>> {
        let pos = self.search_exact(name).ok()?;
        let removed = self.entries.remove(pos);
        trace!(name, pos, len = self.entries.len(), "registry remove");

        // The former neighbours of the removed slot are now adjacent.
        if pos > 0 {
            self.recompute_min_chars(pos - 1);
        }
        if pos < self.entries.len() {
            self.recompute_min_chars(pos);
        }

        Some(removed)
    }

    /// Looks up an entry by exact name.
    pub fn get(&self, name: &str) -> Option<&Entry<T>> {
        self.search_exact(name).ok().map(|pos| &self.entries[pos])
    }

    /// Looks up an entry by exact name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entry<T>> {
        match self.search_exact(name) {
            Ok(pos) => Some(&mut self.entries[pos]),
            Err(_) => None,
        }
    }

    /// Resolves a possibly abbreviated name.
    ///
    /// The full name of an entry always resolves to that entry, even when it
    /// is itself a prefix of a sibling's name.
    pub fn find(&self, prefix: &str) -> Lookup<'_, T> {
        if prefix.is_empty() {
            return Lookup::NotFound;
        }
        let plen = prefix.chars().count();

        let mut lo = 0usize;
        let mut hi = self.entries.len();
        let mut hit = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match compare_prefix(prefix, plen, &self.entries[mid].name) {
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
                Ordering::Equal => {
                    hit = Some(mid);
                    break;
                }
            }
        }
        let Some(mut top) = hit else {
            return Lookup::NotFound;
        };

        while top > 0 && shares_prefix(&self.entries[top - 1].name, prefix) {
            top -= 1;
        }

        if plen >= self.entries[top].min_chars {
            return Lookup::Found(&self.entries[top]);
        }

        let candidates: Vec<&Entry<T>> = self.entries[top..]
            .iter()
            .take_while(|e| shares_prefix(&e.name, prefix))
            .collect();
        Lookup::Ambiguous(candidates)
    }

    fn search_exact(&self, name: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
    }

    /// Refreshes `min_chars` for the entry at `pos` from its neighbours.
    fn recompute_min_chars(&mut self, pos: usize) {
        let name = &self.entries[pos].name;
        let mut shared = 0;
        if pos > 0 {
            shared = shared.max(common_prefix_len(name, &self.entries[pos - 1].name));
        }
        if pos + 1 < self.entries.len() {
            shared = shared.max(common_prefix_len(name, &self.entries[pos + 1].name));
        }
        let len = name.chars().count().max(1);
        let min_chars = (shared + 1).clamp(1, len);
        trace!(name = %name, min_chars, "recomputed min_chars");
        self.entries[pos].min_chars = min_chars;
    }
}

/// Compares `prefix` against the first `plen` characters of `name`.
fn compare_prefix(prefix: &str, plen: usize, name: &str) -> Ordering {
    prefix.chars().cmp(name.chars().take(plen))
}

fn shares_prefix(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
}

/// Length in characters of the longest common prefix of `a` and `b`.
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}
