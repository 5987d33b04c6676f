//! Record storage abstraction.
//!
//! The tree never talks to a file directly. It goes through the
//! `RecordStore` trait, which is implemented by the file-backed
//! [`ByteStore`](crate::storage::ByteStore) in production and by an in-memory
//! store with fault injection in tests.
//!
//! # Design
//!
//! The trait is the minimal surface the persistent tree needs:
//! - Append a length-prefixed record and learn its address
//! - Read a record back by address
//! - Read and atomically replace the root pointer
//! - Take and release the advisory writer lock

/// A byte offset into the backing store.
///
/// Address `0` never names a record (it is the root-pointer slot), so it
/// doubles as "empty subtree" / "empty tree".
pub type Address = u64;

/// The address that denotes an empty tree or subtree.
pub const EMPTY_ADDRESS: Address = 0;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StoreError {
    /// The backing file could not be opened, read, or written.
    Io(std::io::Error),
    /// A record or node payload is malformed.
    Corruption(String),
    /// The requested key is not in the tree.
    NotFound,
    /// The store has been closed.
    Closed,
    /// The advisory file lock could not be taken or released.
    Lock(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::NotFound => write!(f, "key not found"),
            Self::Closed => write!(f, "store closed"),
            Self::Lock(e) => write!(f, "lock error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Lock(e) => Some(e),
            Self::Corruption(_) | Self::NotFound | Self::Closed => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Append-only, address-addressed record storage with a single root slot.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `write` never overwrites an existing record
/// - `read` returns exactly the bytes passed to the `write` that produced the address
/// - `commit_root` is the only operation that makes prior writes durable
/// - `lock` is idempotent and reports whether this call acquired the lock
pub trait RecordStore {
    /// Append a record, taking the writer lock if not already held.
    ///
    /// Returns the address of the record's length prefix.
    fn write(&mut self, data: &[u8]) -> Result<Address, StoreError>;

    /// Read the record stored at `address`.
    fn read(&mut self, address: Address) -> Result<Vec<u8>, StoreError>;

    /// Read the committed root address (`EMPTY_ADDRESS` for an empty tree).
    fn root(&mut self) -> Result<Address, StoreError>;

    /// Flush pending records, publish `address` as the new root, and release the lock.
    fn commit_root(&mut self, address: Address) -> Result<(), StoreError>;

    /// Take the exclusive writer lock.
    ///
    /// Returns `true` if this call acquired it, `false` if it was already held.
    fn lock(&mut self) -> Result<bool, StoreError>;

    /// Release the writer lock if held.
    fn unlock(&mut self) -> Result<(), StoreError>;

    /// Whether this handle currently holds the writer lock.
    fn is_locked(&self) -> bool;

    /// Current end of the store in bytes (header included).
    fn end_offset(&mut self) -> Result<u64, StoreError>;
}
