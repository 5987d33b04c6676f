//! Lazily materialized values.
//!
//! A `ValueCell` is the value half of a tree entry. A freshly `set` value is
//! resident in memory and has no address until the tree is committed. A
//! value read back from disk starts as an address and is decoded on first
//! access. Either way the state is write-once, and clones share it, so a
//! value reachable from several tree versions is written at most once.

use std::sync::{Arc, OnceLock};

use crate::storage::io::{Address, RecordStore, StoreError};

#[derive(Debug)]
struct Slot {
    payload: OnceLock<String>,
    address: OnceLock<Address>,
}

/// A reference to a UTF-8 value, in memory, on disk, or both.
///
/// # Invariants
///
/// - At least one of payload and address is always set
/// - Once set, neither changes
#[derive(Debug, Clone)]
pub struct ValueCell {
    slot: Arc<Slot>,
}

impl ValueCell {
    /// A value that has not been written yet.
    #[must_use]
    pub fn resident(payload: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Slot {
                payload: OnceLock::from(payload.into()),
                address: OnceLock::new(),
            }),
        }
    }

    /// A value already stored at `address`, loaded on first use.
    #[must_use]
    pub fn at(address: Address) -> Self {
        Self {
            slot: Arc::new(Slot {
                payload: OnceLock::new(),
                address: OnceLock::from(address),
            }),
        }
    }

    /// The stored address, if the value has been persisted.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.slot.address.get().copied()
    }

    /// The payload, if it is already in memory.
    #[must_use]
    pub fn cached(&self) -> Option<&str> {
        self.slot.payload.get().map(String::as_str)
    }

    /// Return the payload, reading and decoding it on first use.
    pub fn materialize<S: RecordStore>(&self, store: &mut S) -> Result<&str, StoreError> {
        if let Some(payload) = self.slot.payload.get() {
            return Ok(payload);
        }

        let address = self.address().ok_or_else(|| {
            StoreError::Corruption("value cell has neither payload nor address".to_string())
        })?;
        let bytes = store.read(address)?;
        let payload = String::from_utf8(bytes).map_err(|e| {
            StoreError::Corruption(format!("value at {address} is not valid UTF-8: {e}"))
        })?;

        Ok(self.slot.payload.get_or_init(|| payload))
    }

    /// Write the payload if it has no address yet, and return the address.
    ///
    /// Persisting an already persisted value writes nothing.
    pub fn persist<S: RecordStore>(&self, store: &mut S) -> Result<Address, StoreError> {
        if let Some(address) = self.address() {
            return Ok(address);
        }

        let payload = self.slot.payload.get().ok_or_else(|| {
            StoreError::Corruption("value cell has neither payload nor address".to_string())
        })?;
        let address = store.write(payload.as_bytes())?;

        Ok(*self.slot.address.get_or_init(|| address))
    }
}
