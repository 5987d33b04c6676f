//! High-level store interface.
//!
//! Provides the public API for opening a store file, reading and writing
//! keys, and publishing changes.

use std::path::Path;

use crate::storage::file::ByteStore;
use crate::storage::io::{Address, StoreError};
use crate::storage::key::TreeKey;
use crate::storage::tree::RedBlackTree;

/// A handle to one store file.
///
/// Changes made with `set` are visible to this handle immediately and to
/// other handles only after `commit`. Once closed, every operation fails
/// with [`StoreError::Closed`].
pub struct Database<K: TreeKey = f64> {
    tree: RedBlackTree<K, ByteStore>,
}

impl<K: TreeKey> Database<K> {
    /// Open the store at `path`, creating the file if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = ByteStore::open(path)?;
        let tree = RedBlackTree::new(store)?;
        Ok(Self { tree })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.tree.store().path()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.tree.store().is_closed()
    }

    pub fn get(&mut self, key: &K) -> Result<String, StoreError> {
        self.ensure_open()?;
        self.tree.get(key)
    }

    pub fn set(&mut self, key: K, value: impl Into<String>) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.tree.set(key, value)
    }

    /// Persist pending changes and publish the new root.
    pub fn commit(&mut self) -> Result<Address, StoreError> {
        self.ensure_open()?;
        self.tree.commit()
    }

    /// All entries with a key at most `bound`, in ascending key order.
    pub fn range_at_most(&mut self, bound: &K) -> Result<Vec<(K, String)>, StoreError> {
        self.ensure_open()?;
        self.tree.range_at_most(bound)
    }

    /// Number of distinct keys visible to this handle.
    pub fn count(&mut self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        self.tree.count()
    }

    /// Release the writer lock and close the file. Uncommitted changes are
    /// discarded.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.tree.store_mut().close()
    }

    const fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl<K: TreeKey> Drop for Database<K> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path().display(), "failed to close store: {e}");
        }
    }
}
