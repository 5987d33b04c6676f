//! Tree nodes, child references, and node record serialization.
//!
//! Nodes are immutable values. Changing a node means building a new one with
//! functional record update (`Node { left, ..node.clone() }`), which is how
//! the copy-on-write paths in [`tree`](crate::storage::tree) are built.
//!
//! # Node Record Format
//!
//! ```text
//! offset  size  field
//! 0       1     format tag (NODE_FORMAT)
//! 1       1     color (0 = red, 1 = black)
//! 2       8     left child address (BE, 0 = empty)
//! 10      8     value address (BE)
//! 18      8     right child address (BE, 0 = empty)
//! 26      n     key bytes (see `TreeKey::encode`)
//! 26+n    4     CRC32 of bytes 0..26+n (LE)
//! ```

use std::sync::{Arc, OnceLock};

use crate::storage::io::{Address, EMPTY_ADDRESS, RecordStore, StoreError};
use crate::storage::key::TreeKey;
use crate::storage::value::ValueCell;

/// Current node record format.
pub const NODE_FORMAT: u8 = 1;

/// Size of the fixed part of a node record (before the key).
const NODE_HEADER_SIZE: usize = 26;

/// Size of the trailing checksum.
const CHECKSUM_SIZE: usize = 4;

/// Node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Red = 0,
    Black = 1,
}

impl TryFrom<u8> for Color {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Red),
            1 => Ok(Self::Black),
            _ => Err(value),
        }
    }
}

/// One entry of the tree.
#[derive(Debug, Clone)]
pub struct Node<K> {
    pub left: NodeRef<K>,
    pub key: K,
    pub value: ValueCell,
    pub right: NodeRef<K>,
    pub color: Color,
}

/// A reference to a child subtree.
///
/// Committed subtrees are referenced by address and loaded on `follow`;
/// subtrees built in memory are owned directly and receive an address when
/// the tree is committed. Clones share the same underlying slot, so loading
/// or persisting through one clone is visible through all of them.
#[derive(Debug, Clone)]
pub enum NodeRef<K> {
    /// No subtree.
    Empty,
    /// A node on disk that may not have been read yet.
    Unresolved(Arc<StoredNode<K>>),
    /// A node in memory that may not have been written yet.
    Resolved(Arc<ResidentNode<K>>),
}

/// A node known by address, cached after the first read.
#[derive(Debug)]
pub struct StoredNode<K> {
    address: Address,
    node: OnceLock<Node<K>>,
}

/// A node built in memory, addressed after the first write.
#[derive(Debug)]
pub struct ResidentNode<K> {
    node: Node<K>,
    address: OnceLock<Address>,
}

impl<K: TreeKey> Node<K> {
    /// A new red node with empty children, as created by an insert.
    #[must_use]
    pub const fn leaf(key: K, value: ValueCell) -> Self {
        Self {
            left: NodeRef::Empty,
            key,
            value,
            right: NodeRef::Empty,
            color: Color::Red,
        }
    }

    #[must_use]
    pub fn is_red(&self) -> bool {
        self.color == Color::Red
    }

    #[must_use]
    pub fn is_black(&self) -> bool {
        self.color == Color::Black
    }

    /// Copy of this node with a different left child.
    #[must_use]
    pub fn with_left(&self, left: NodeRef<K>) -> Self {
        Self {
            left,
            ..self.clone()
        }
    }

    /// Copy of this node with a different right child.
    #[must_use]
    pub fn with_right(&self, right: NodeRef<K>) -> Self {
        Self {
            right,
            ..self.clone()
        }
    }

    /// Copy of this node holding a different value.
    #[must_use]
    pub fn with_value(&self, value: ValueCell) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    /// Copy of this node with a different color.
    #[must_use]
    pub fn with_color(&self, color: Color) -> Self {
        Self {
            color,
            ..self.clone()
        }
    }

    /// Persist the value and both subtrees, then return this node's record.
    ///
    /// Children are written before the record is built, so the record can
    /// embed their addresses. Subtrees that already have an address are not
    /// written again.
    pub fn persist_subtree<S: RecordStore>(&self, store: &mut S) -> Result<Vec<u8>, StoreError> {
        let value = self.value.persist(store)?;
        let left = self.left.persist(store)?;
        let right = self.right.persist(store)?;
        Ok(self.to_bytes(left, value, right))
    }

    /// Serialize this node given the addresses of its parts.
    #[must_use]
    pub fn to_bytes(&self, left: Address, value: Address, right: Address) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NODE_HEADER_SIZE + 8 + CHECKSUM_SIZE);
        bytes.push(NODE_FORMAT);
        bytes.push(self.color as u8);
        bytes.extend_from_slice(&left.to_be_bytes());
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes.extend_from_slice(&right.to_be_bytes());
        self.key.encode(&mut bytes);

        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Deserialize a node record.
    ///
    /// The children and value of the returned node are unresolved
    /// references to the stored addresses.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() < NODE_HEADER_SIZE + CHECKSUM_SIZE {
            return Err(StoreError::Corruption(format!(
                "node record too short ({} bytes)",
                bytes.len()
            )));
        }

        let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(StoreError::Corruption(format!(
                "node checksum mismatch (stored {stored:#010x}, computed {computed:#010x})"
            )));
        }

        if body[0] != NODE_FORMAT {
            return Err(StoreError::Corruption(format!(
                "unknown node format {}",
                body[0]
            )));
        }
        let color = Color::try_from(body[1])
            .map_err(|c| StoreError::Corruption(format!("invalid node color {c}")))?;

        let left = read_address(body, 2);
        let value = read_address(body, 10);
        let right = read_address(body, 18);
        if value == EMPTY_ADDRESS {
            return Err(StoreError::Corruption("node has no value address".to_string()));
        }

        let key = K::decode(&body[NODE_HEADER_SIZE..])
            .ok_or_else(|| StoreError::Corruption("node key cannot be decoded".to_string()))?;

        Ok(Self {
            left: NodeRef::at(left),
            key,
            value: ValueCell::at(value),
            right: NodeRef::at(right),
            color,
        })
    }
}

fn read_address(body: &[u8], offset: usize) -> Address {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&body[offset..offset + 8]);
    u64::from_be_bytes(buf)
}

impl<K: TreeKey> NodeRef<K> {
    /// Reference to the node stored at `address` (`Empty` for address 0).
    #[must_use]
    pub fn at(address: Address) -> Self {
        if address == EMPTY_ADDRESS {
            Self::Empty
        } else {
            Self::Unresolved(Arc::new(StoredNode {
                address,
                node: OnceLock::new(),
            }))
        }
    }

    /// Reference owning a node built in memory.
    #[must_use]
    pub fn resident(node: Node<K>) -> Self {
        Self::Resolved(Arc::new(ResidentNode {
            node,
            address: OnceLock::new(),
        }))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The stored address, or `None` for a node that has not been written.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Empty => Some(EMPTY_ADDRESS),
            Self::Unresolved(stored) => Some(stored.address),
            Self::Resolved(resident) => resident.address.get().copied(),
        }
    }

    /// Resolve the reference to a node, reading it from `store` on first use.
    pub fn follow<S: RecordStore>(&self, store: &mut S) -> Result<Option<&Node<K>>, StoreError> {
        match self {
            Self::Empty => Ok(None),
            Self::Resolved(resident) => Ok(Some(&resident.node)),
            Self::Unresolved(stored) => {
                if let Some(node) = stored.node.get() {
                    return Ok(Some(node));
                }
                let bytes = store.read(stored.address)?;
                let node = Node::from_bytes(&bytes).map_err(|e| match e {
                    StoreError::Corruption(msg) => {
                        StoreError::Corruption(format!("node at {}: {msg}", stored.address))
                    }
                    other => other,
                })?;
                Ok(Some(stored.node.get_or_init(|| node)))
            }
        }
    }

    /// Write this subtree's unwritten nodes, children first, and return its address.
    pub fn persist<S: RecordStore>(&self, store: &mut S) -> Result<Address, StoreError> {
        match self {
            Self::Empty => Ok(EMPTY_ADDRESS),
            Self::Unresolved(stored) => Ok(stored.address),
            Self::Resolved(resident) => {
                if let Some(address) = resident.address.get() {
                    return Ok(*address);
                }
                let record = resident.node.persist_subtree(store)?;
                let address = store.write(&record)?;
                Ok(*resident.address.get_or_init(|| address))
            }
        }
    }
}
