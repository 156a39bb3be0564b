use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::PseudoFile;

/// A mapping from output-relative path to a shared [PseudoFile].
///
/// Keys are unique and the first writer for a path wins: inserting a path
/// that is already present is a no-op, so merging layers never shadows an
/// existing entry. The layer keeps running totals of the compressed and
/// uncompressed sizes of its entries.
#[derive(Debug, Clone, Default)]
pub struct PseudoLayer {
    files: BTreeMap<String, Arc<PseudoFile>>,
    compressed_size: u64,
    uncompressed_size: u64,
}

impl PseudoLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `file` at `path` unless the path is already taken.
    /// Returns whether the file was inserted.
    pub fn insert(&mut self, path: impl Into<String>, file: Arc<PseudoFile>) -> bool {
        let path = path.into();
        if let Some(existing) = self.files.get(&path) {
            if !Arc::ptr_eq(existing, &file) {
                debug!(path = %path, "path already present in layer, keeping first entry");
            }
            return false;
        }

        self.compressed_size += file.compressed_size();
        self.uncompressed_size += file.uncompressed_size();
        self.files.insert(path, file);
        true
    }

    /// Merges all entries of `other` whose paths are not present yet.
    /// Returns the number of entries added.
    pub fn merge(&mut self, other: &PseudoLayer) -> usize {
        other
            .iter()
            .filter(|(path, file)| self.insert(*path, Arc::clone(file)))
            .count()
    }

    pub fn get(&self, path: &str) -> Option<&Arc<PseudoFile>> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<PseudoFile>)> {
        self.files.iter().map(|(path, file)| (path.as_str(), file))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Sum of the compressed sizes of all entries.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Sum of the uncompressed sizes of all entries.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }
}

impl FromIterator<(String, Arc<PseudoFile>)> for PseudoLayer {
    fn from_iter<T: IntoIterator<Item = (String, Arc<PseudoFile>)>>(iter: T) -> Self {
        let mut layer = PseudoLayer::new();
        for (path, file) in iter {
            layer.insert(path, file);
        }
        layer
    }
}
