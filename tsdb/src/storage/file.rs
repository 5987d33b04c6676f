//! Backing file I/O.
//!
//! This module handles the single backing file: superblock padding, record
//! appends and reads, the root-pointer slot, and the advisory writer lock.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{Address, RecordStore, StoreError};
use crate::storage::superblock::{INTEGER_LENGTH, SUPERBLOCK_SIZE, Superblock};

/// A handle to the backing file of a store.
///
/// # Invariants
///
/// - After `open` returns, the file is at least `SUPERBLOCK_SIZE` bytes long
/// - `locked` is true exactly when this handle holds the OS exclusive lock
/// - `file` is `None` exactly when the store has been closed
pub struct ByteStore {
    file: Option<File>,
    path: PathBuf,
    locked: bool,
}

impl ByteStore {
    /// Open the backing file at `path`, creating it if needed.
    ///
    /// Existing content is never truncated. A file shorter than the
    /// superblock is zero-padded under the writer lock.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut store = Self {
            file: Some(file),
            path: path.to_path_buf(),
            locked: false,
        };
        store.ensure_superblock()?;

        tracing::debug!(path = %store.path.display(), "opened byte store");
        Ok(store)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `close` has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Release the lock (if held) and close the file.
    ///
    /// Closing an already closed store is a no-op.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.file.is_none() {
            return Ok(());
        }
        self.unlock()?;
        self.file = None;
        tracing::debug!(path = %self.path.display(), "closed byte store");
        Ok(())
    }

    /// Guarantee that the next append starts past the header.
    ///
    /// Only takes the lock when padding is actually needed, so opening a
    /// second handle on a file another writer holds does not block.
    fn ensure_superblock(&mut self) -> Result<(), StoreError> {
        if self.end_offset()? >= SUPERBLOCK_SIZE {
            return Ok(());
        }

        let acquired = self.lock()?;
        let end = self.end_offset()?;
        if end < SUPERBLOCK_SIZE {
            let file = self.file_mut()?;
            file.seek(SeekFrom::End(0))?;
            // SUPERBLOCK_SIZE is a small compile-time constant.
            #[allow(clippy::cast_possible_truncation)]
            let padding = vec![0u8; (SUPERBLOCK_SIZE - end) as usize];
            file.write_all(&padding)?;
            file.sync_all()?;
        }
        if acquired {
            self.unlock()?;
        }
        Ok(())
    }

    fn file(&self) -> Result<&File, StoreError> {
        self.file.as_ref().ok_or(StoreError::Closed)
    }

    fn file_mut(&mut self) -> Result<&mut File, StoreError> {
        self.file.as_mut().ok_or(StoreError::Closed)
    }
}

impl RecordStore for ByteStore {
    fn write(&mut self, data: &[u8]) -> Result<Address, StoreError> {
        self.lock()?;
        let file = self.file_mut()?;
        let address = file.seek(SeekFrom::End(0))?;

        let mut record = Vec::with_capacity(INTEGER_LENGTH + data.len());
        record.extend_from_slice(&(data.len() as u64).to_be_bytes());
        record.extend_from_slice(data);
        file.write_all(&record)?;

        tracing::trace!(address, len = data.len(), "appended record");
        Ok(address)
    }

    fn read(&mut self, address: Address) -> Result<Vec<u8>, StoreError> {
        if address < SUPERBLOCK_SIZE {
            return Err(StoreError::Corruption(format!(
                "record address {address} points into the superblock"
            )));
        }

        let end = self.end_offset()?;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(address))?;

        let mut prefix = [0u8; INTEGER_LENGTH];
        file.read_exact(&mut prefix).map_err(|e| past_end(e, address))?;
        let length = u64::from_be_bytes(prefix);

        let payload_end = address
            .checked_add(INTEGER_LENGTH as u64)
            .and_then(|start| start.checked_add(length));
        if payload_end.is_none_or(|payload_end| payload_end > end) {
            return Err(StoreError::Corruption(format!(
                "record at {address} with length {length} runs past end of file ({end} bytes)"
            )));
        }

        let length = usize::try_from(length).map_err(|_| {
            StoreError::Corruption(format!("record at {address} is too large ({length} bytes)"))
        })?;
        let mut data = vec![0u8; length];
        file.read_exact(&mut data).map_err(|e| past_end(e, address))?;
        Ok(data)
    }

    fn root(&mut self) -> Result<Address, StoreError> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(0))?;
        let mut slot = [0u8; INTEGER_LENGTH];
        file.read_exact(&mut slot)?;
        Ok(Superblock::from_bytes(&slot).root_address)
    }

    fn commit_root(&mut self, address: Address) -> Result<(), StoreError> {
        self.lock()?;
        let file = self.file_mut()?;
        file.sync_data()?;

        // The slot lives at the start of the first sector, so this is a
        // single aligned write.
        let superblock = Superblock {
            root_address: address,
        };
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&superblock.root_slot())?;
        file.sync_data()?;

        self.unlock()?;
        tracing::debug!(path = %self.path.display(), root = address, "committed root");
        Ok(())
    }

    fn lock(&mut self) -> Result<bool, StoreError> {
        if self.locked {
            return Ok(false);
        }
        self.file()?.lock().map_err(StoreError::Lock)?;
        self.locked = true;
        Ok(true)
    }

    fn unlock(&mut self) -> Result<(), StoreError> {
        if !self.locked {
            return Ok(());
        }
        let file = self.file_mut()?;
        file.flush()?;
        file.unlock().map_err(StoreError::Lock)?;
        self.locked = false;
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn end_offset(&mut self) -> Result<u64, StoreError> {
        Ok(self.file()?.metadata()?.len())
    }
}

/// Map a short read to corruption; other I/O errors pass through.
fn past_end(e: std::io::Error, address: Address) -> StoreError {
    if e.kind() == ErrorKind::UnexpectedEof {
        StoreError::Corruption(format!("record at {address} runs past end of file"))
    } else {
        StoreError::Io(e)
    }
}
