use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::PseudoFile;

/// Build-scoped, write-once cache of path -> [PseudoFile].
///
/// Each path owns a [OnceCell], so concurrent requests for the same path
/// wait on a single initialization and the compressed buffer is produced
/// exactly once. A cache must not outlive the build it was created for.
#[derive(Debug, Default)]
pub struct LayerCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<PseudoFile>>>>>,
}

impl LayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell for `path`, creating an empty one if needed.
    pub(crate) fn cell(&self, path: &str) -> Arc<OnceCell<Arc<PseudoFile>>> {
        let mut cells = self.cells.lock();
        if let Some(cell) = cells.get(path) {
            return cell.clone();
        }
        let cell = Arc::new(OnceCell::new());
        cells.insert(path.to_owned(), cell.clone());
        cell
    }

    /// Returns the pseudo-file for `path`, if it has been built already.
    pub fn get(&self, path: &str) -> Option<Arc<PseudoFile>> {
        self.cells
            .lock()
            .get(path)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of paths with a built pseudo-file.
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
