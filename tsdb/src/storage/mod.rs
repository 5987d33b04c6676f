//! Persistent red-black tree storage engine.
//!
//! A single-file, append-only key/value store built around an immutable
//! copy-on-write red-black tree.
//!
//! # File Format
//!
//! - Bytes 0..4096: superblock; bytes 0..8 hold the committed root address
//!   as a big-endian `u64` (0 means empty)
//! - After the superblock: records, each an 8-byte big-endian length
//!   followed by that many payload bytes
//!
//! Records are never overwritten. A node record holds its color, the
//! addresses of its children and value record, its encoded key, and a
//! CRC32 checksum. A value record holds raw UTF-8.
//!
//! # Usage
//!
//! ```ignore
//! use tsdb::storage::Database;
//!
//! let mut db: Database = Database::open(path)?;
//! db.set(0.5, "ts-17")?;
//! db.commit()?;
//! assert_eq!(db.get(&0.5)?, "ts-17");
//! ```

mod database;
mod file;
mod io;
mod key;
mod node;
mod superblock;
mod tree;
mod value;

pub use database::Database;
pub use file::ByteStore;
pub use io::{Address, EMPTY_ADDRESS, RecordStore, StoreError};
pub use key::TreeKey;
pub use node::{Color, Node, NodeRef};
pub use superblock::{SUPERBLOCK_SIZE, Superblock};
pub use tree::RedBlackTree;
pub use value::ValueCell;
