//! Persistent red-black tree.
//!
//! An immutable, copy-on-write red-black tree over a [`RecordStore`]:
//! - `set` rebuilds the path from the root to the modified node and shares
//!   every untouched subtree with the previous version
//! - rebalancing follows Okasaki's four cases, applied bottom-up to each
//!   rebuilt node, and the new root is always blackened
//! - `commit` writes only nodes that have no address yet, children before
//!   parents, then publishes the new root address
//!
//! Nothing built by `set` is visible to other handles until `commit`.

use std::cmp::Ordering;

use crate::storage::io::{Address, RecordStore, StoreError};
use crate::storage::key::TreeKey;
use crate::storage::node::{Color, Node, NodeRef};
use crate::storage::value::ValueCell;

/// A copy-on-write red-black tree backed by a record store.
pub struct RedBlackTree<K, S> {
    store: S,
    root: NodeRef<K>,
}

impl<K: TreeKey, S: RecordStore> RedBlackTree<K, S> {
    /// Create a tree rooted at the store's committed root.
    pub fn new(mut store: S) -> Result<Self, StoreError> {
        let root = NodeRef::at(store.root()?);
        Ok(Self { store, root })
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The current in-memory root, committed or not.
    #[must_use]
    pub const fn root(&self) -> &NodeRef<K> {
        &self.root
    }

    /// Look up the value stored under `key`.
    ///
    /// Unless this handle holds the writer lock, the root is refreshed first
    /// so the lookup sees the latest commit.
    pub fn get(&mut self, key: &K) -> Result<String, StoreError> {
        if !self.store.is_locked() {
            self.refresh_root()?;
        }

        let mut current = self.root.clone();
        loop {
            let next = {
                let Some(node) = current.follow(&mut self.store)? else {
                    return Err(StoreError::NotFound);
                };
                match key.compare(&node.key) {
                    Ordering::Less => node.left.clone(),
                    Ordering::Greater => node.right.clone(),
                    Ordering::Equal => {
                        return Ok(node.value.materialize(&mut self.store)?.to_string());
                    }
                }
            };
            current = next;
        }
    }

    /// Insert or overwrite `key`.
    ///
    /// If this call newly takes the writer lock, the root is refreshed first
    /// so edits build on the latest commit. The result is only in memory
    /// until `commit`.
    pub fn set(&mut self, key: K, value: impl Into<String>) -> Result<(), StoreError> {
        if self.store.lock()? {
            self.refresh_root()?;
        }

        let value = ValueCell::resident(value);
        let node = Self::insert(&mut self.store, &self.root, &key, &value)?;
        self.root = NodeRef::resident(Self::blacken(node));
        Ok(())
    }

    /// Write all new nodes and publish the current root.
    ///
    /// Returns the committed root address. Committing twice without an
    /// intervening `set` writes no records.
    pub fn commit(&mut self) -> Result<Address, StoreError> {
        let start = self.store.end_offset()?;
        let address = self.root.persist(&mut self.store)?;
        self.store.commit_root(address)?;

        let written = self.store.end_offset()?.saturating_sub(start);
        tracing::debug!(root = address, bytes_written = written, "committed tree");
        Ok(address)
    }

    /// All entries with a key less than or equal to `bound`, in key order.
    pub fn range_at_most(&mut self, bound: &K) -> Result<Vec<(K, String)>, StoreError> {
        if !self.store.is_locked() {
            self.refresh_root()?;
        }

        let mut entries = Vec::new();
        Self::collect_at_most(&mut self.store, &self.root, bound, &mut entries)?;
        Ok(entries)
    }

    /// Number of distinct keys (walks the whole tree).
    pub fn count(&mut self) -> Result<usize, StoreError> {
        Self::count_subtree(&mut self.store, &self.root)
    }

    /// Resolve a reference to an owned copy of its node.
    pub fn resolve(&mut self, node_ref: &NodeRef<K>) -> Result<Option<Node<K>>, StoreError> {
        Ok(node_ref.follow(&mut self.store)?.cloned())
    }

    /// The current root node, if the tree is not empty.
    pub fn root_node(&mut self) -> Result<Option<Node<K>>, StoreError> {
        Ok(self.root.follow(&mut self.store)?.cloned())
    }

    fn refresh_root(&mut self) -> Result<(), StoreError> {
        let address = self.store.root()?;
        // Keep the resolved in-memory tree if it is already the committed one.
        if self.root.address() != Some(address) {
            tracing::trace!(root = address, "refreshed root");
            self.root = NodeRef::at(address);
        }
        Ok(())
    }

    fn insert(
        store: &mut S,
        node_ref: &NodeRef<K>,
        key: &K,
        value: &ValueCell,
    ) -> Result<Node<K>, StoreError> {
        let Some(node) = node_ref.follow(store)? else {
            return Ok(Node::leaf(key.clone(), value.clone()));
        };

        match key.compare(&node.key) {
            Ordering::Less => {
                let left = Self::insert(store, &node.left, key, value)?;
                Self::balance(store, node.with_left(NodeRef::resident(left)))
            }
            Ordering::Greater => {
                let right = Self::insert(store, &node.right, key, value)?;
                Self::balance(store, node.with_right(NodeRef::resident(right)))
            }
            Ordering::Equal => Ok(node.with_value(value.clone())),
        }
    }

    /// Restore the red-black invariants at a freshly rebuilt black node.
    fn balance(store: &mut S, node: Node<K>) -> Result<Node<K>, StoreError> {
        if node.is_red() {
            return Ok(node);
        }

        let left_red = Self::is_red(store, &node.left)?;
        let right_red = Self::is_red(store, &node.right)?;

        if left_red && right_red {
            return Self::recolor(store, &node);
        }

        if left_red {
            let left = Self::child(store, &node.left)?;
            if Self::is_red(store, &left.left)? {
                // left-left
                let rotated = Self::rotate_right(store, &node)?;
                return Self::recolor(store, &rotated);
            }
            if Self::is_red(store, &left.right)? {
                // left-right
                let left = Self::rotate_left(store, left)?;
                let rotated = Self::rotate_right(store, &node.with_left(NodeRef::resident(left)))?;
                return Self::recolor(store, &rotated);
            }
        }

        if right_red {
            let right = Self::child(store, &node.right)?;
            if Self::is_red(store, &right.right)? {
                // right-right
                let rotated = Self::rotate_left(store, &node)?;
                return Self::recolor(store, &rotated);
            }
            if Self::is_red(store, &right.left)? {
                // right-left
                let right = Self::rotate_right(store, right)?;
                let rotated = Self::rotate_left(store, &node.with_right(NodeRef::resident(right)))?;
                return Self::recolor(store, &rotated);
            }
        }

        Ok(node)
    }

    fn blacken(node: Node<K>) -> Node<K> {
        Node {
            color: Color::Black,
            ..node
        }
    }

    /// Red node with both children black.
    fn recolor(store: &mut S, node: &Node<K>) -> Result<Node<K>, StoreError> {
        let left = Self::blacken_ref(store, &node.left)?;
        let right = Self::blacken_ref(store, &node.right)?;
        Ok(Node {
            left,
            right,
            color: Color::Red,
            ..node.clone()
        })
    }

    fn blacken_ref(store: &mut S, node_ref: &NodeRef<K>) -> Result<NodeRef<K>, StoreError> {
        match node_ref.follow(store)? {
            Some(node) if node.is_red() => Ok(NodeRef::resident(node.with_color(Color::Black))),
            _ => Ok(node_ref.clone()),
        }
    }

    fn rotate_left(store: &mut S, node: &Node<K>) -> Result<Node<K>, StoreError> {
        let right = Self::child(store, &node.right)?;
        let lowered = node.with_right(right.left.clone());
        Ok(right.with_left(NodeRef::resident(lowered)))
    }

    fn rotate_right(store: &mut S, node: &Node<K>) -> Result<Node<K>, StoreError> {
        let left = Self::child(store, &node.left)?;
        let lowered = node.with_left(left.right.clone());
        Ok(left.with_right(NodeRef::resident(lowered)))
    }

    fn is_red(store: &mut S, node_ref: &NodeRef<K>) -> Result<bool, StoreError> {
        Ok(node_ref.follow(store)?.is_some_and(Node::is_red))
    }

    /// Follow a reference that the balancing cases require to be non-empty.
    fn child<'a>(store: &mut S, node_ref: &'a NodeRef<K>) -> Result<&'a Node<K>, StoreError> {
        node_ref
            .follow(store)?
            .ok_or_else(|| StoreError::Corruption("expected a child node during rebalance".to_string()))
    }

    fn collect_at_most(
        store: &mut S,
        node_ref: &NodeRef<K>,
        bound: &K,
        entries: &mut Vec<(K, String)>,
    ) -> Result<(), StoreError> {
        let Some(node) = node_ref.follow(store)? else {
            return Ok(());
        };

        Self::collect_at_most(store, &node.left, bound, entries)?;
        // Everything right of a node above the bound is above it too.
        if node.key.compare(bound) != Ordering::Greater {
            let value = node.value.materialize(store)?.to_string();
            entries.push((node.key.clone(), value));
            Self::collect_at_most(store, &node.right, bound, entries)?;
        }
        Ok(())
    }

    fn count_subtree(store: &mut S, node_ref: &NodeRef<K>) -> Result<usize, StoreError> {
        let Some(node) = node_ref.follow(store)? else {
            return Ok(0);
        };
        let left = Self::count_subtree(store, &node.left)?;
        let right = Self::count_subtree(store, &node.right)?;
        Ok(left + 1 + right)
    }
}
