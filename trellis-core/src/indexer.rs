//! Dense bijection between distinct values and integer indices.
//!
//! An [`Indexer`] is an ordered collection of distinct values supporting O(1)
//! lookups in both directions: position → value and value → position. It is
//! the naming layer for model vocabularies (label states, feature predicates):
//! build it once from the training data, then refer to elements by dense
//! `usize` index everywhere in the numeric hot loops.
//!
//! Indexers are immutable after construction and indices always form the
//! dense range `[0, len)`.

use std::collections::HashMap;
use std::hash::Hash;
use std::io::{Read, Write};

use crate::{Result, TrellisError};

/// Version tag written at the head of the persistence stream.
const DATA_VERSION: &str = "1.0";

/// An immutable ordered set with O(1) lookup in both directions.
///
/// Duplicates in the input collapse to the first occurrence, so indices are
/// dense and each element appears exactly once.
#[derive(Debug, Clone)]
pub struct Indexer<T> {
    items: Vec<T>,
    positions: HashMap<T, usize>,
}

impl<T: Eq + Hash + Clone> Indexer<T> {
    /// Build an indexer from a stream of elements.
    ///
    /// The first occurrence of each distinct element fixes its index;
    /// later duplicates are dropped.
    pub fn from_elements<I: IntoIterator<Item = T>>(elems: I) -> Self {
        let mut items = Vec::new();
        let mut positions = HashMap::new();
        for elem in elems {
            if !positions.contains_key(&elem) {
                positions.insert(elem.clone(), items.len());
                items.push(elem);
            }
        }
        Self { items, positions }
    }

    /// The index of `value`, or `None` if it was never inserted.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.positions.get(value).copied()
    }

    /// Whether `value` is present.
    pub fn contains(&self, value: &T) -> bool {
        self.positions.contains_key(value)
    }
}

impl<T> Indexer<T> {
    /// Number of distinct elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the indexer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The element at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterate over elements in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// The elements in index order.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for Indexer<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_elements(iter)
    }
}

impl<'a, T> IntoIterator for &'a Indexer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------
//
// Self-describing binary stream: a length-prefixed UTF-8 version tag, then a
// big-endian u32 element count, then each element as a length-prefixed UTF-8
// string in index order. Only string indexers persist; other element types
// would have to round-trip through a stringified form, which cannot be done
// faithfully in general.

impl Indexer<String> {
    /// Write the indexer to `w` in the versioned binary format.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or an element exceeds the u16
    /// length prefix.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        write_utf(w, DATA_VERSION)?;
        let count = u32::try_from(self.items.len()).map_err(|_| {
            TrellisError::Config(format!("indexer too large to persist: {}", self.items.len()))
        })?;
        w.write_all(&count.to_be_bytes())?;
        for item in &self.items {
            write_utf(w, item)?;
        }
        Ok(())
    }

    /// Read an indexer previously written with [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns `Config` if the version tag does not match or the stream
    /// contains duplicate elements (which would silently renumber indices),
    /// and `Io` on truncated input.
    pub fn load<R: Read>(r: &mut R) -> Result<Self> {
        let version = read_utf(r)?;
        if version != DATA_VERSION {
            return Err(TrellisError::Config(format!(
                "indexer version mismatch: found {version:?}, expected {DATA_VERSION:?}"
            )));
        }
        let mut count_buf = [0u8; 4];
        r.read_exact(&mut count_buf)?;
        let count = u32::from_be_bytes(count_buf) as usize;

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read_utf(r)?);
        }
        let indexer = Self::from_elements(items);
        if indexer.len() != count {
            return Err(TrellisError::Config(
                "persisted indexer contains duplicate elements".into(),
            ));
        }
        Ok(indexer)
    }
}

/// Write a string as a big-endian u16 byte length followed by UTF-8 bytes.
fn write_utf<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| TrellisError::Config(format!("string too long to persist: {} bytes", bytes.len())))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

/// Read a string written by [`write_utf`].
fn read_utf<R: Read>(r: &mut R) -> Result<String> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| TrellisError::Config(format!("persisted string is not valid UTF-8: {e}")))
}
