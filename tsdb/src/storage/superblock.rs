//! Superblock layout.
//!
//! The superblock is the fixed header region at the start of the backing
//! file. Only its first eight bytes are used: the big-endian address of the
//! committed root node. The rest is zero padding that keeps the first record
//! (and every later one) off the sector holding the root pointer, so a
//! root-pointer update is a single aligned write.

use crate::storage::io::Address;

/// Size of the header region in bytes.
pub const SUPERBLOCK_SIZE: u64 = 4096;

/// Header field offsets.
mod offsets {
    pub const ROOT_ADDRESS: usize = 0;
    // 8-4095: reserved, zero
}

/// Width of an encoded integer (root pointer, record length prefix).
pub const INTEGER_LENGTH: usize = 8;

/// The decoded header.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Superblock {
    /// Address of the committed root node, 0 when the tree is empty.
    pub root_address: Address,
}

impl Superblock {
    /// Encode the root-pointer slot.
    ///
    /// Only the slot is returned; the remainder of the header is never rewritten.
    #[must_use]
    pub const fn root_slot(&self) -> [u8; INTEGER_LENGTH] {
        self.root_address.to_be_bytes()
    }

    /// Decode a header from its leading bytes.
    ///
    /// A header shorter than the root slot (a file that was created but never
    /// padded) reads as an empty tree.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let start = offsets::ROOT_ADDRESS;
        let root_address = bytes
            .get(start..start + INTEGER_LENGTH)
            .and_then(|slot| <[u8; INTEGER_LENGTH]>::try_from(slot).ok())
            .map_or(0, u64::from_be_bytes);

        Self { root_address }
    }
}
