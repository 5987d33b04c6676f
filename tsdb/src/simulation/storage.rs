//! Simulated in-memory record storage for deterministic testing.
//!
//! This module provides an in-memory implementation of the `RecordStore`
//! trait that lays bytes out exactly like the backing file (superblock, then
//! length-prefixed records) and supports fault injection:
//! - Write errors
//! - Byte-level corruption on read (bit flips)

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{Address, RecordStore, SUPERBLOCK_SIZE, StoreError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability that a read returns a record with one flipped bit (0.0 - 1.0).
    pub corruption_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }
}

/// Statistics about simulated storage operations.
#[derive(Debug, Default, Clone)]
pub struct SimulatedStoreStats {
    /// Number of record reads.
    pub reads: u64,
    /// Number of record writes.
    pub writes: u64,
    /// Number of root commits.
    pub commits: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of corrupted records returned.
    pub corrupted_reads: u64,
}

/// In-memory record store.
///
/// Uncommitted writes are kept separately from the durable bytes so that
/// `crash` can drop everything since the last `commit_root`.
pub struct SimulatedStore {
    /// Bytes that survived the last commit.
    durable: Vec<u8>,
    /// Bytes as currently visible (durable plus pending appends).
    bytes: Vec<u8>,
    locked: bool,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: SimulatedStoreStats,
}

impl SimulatedStore {
    /// Create a new simulated store with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::no_faults())
    }

    /// Create a new simulated store with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let header = vec![0u8; SUPERBLOCK_SIZE as usize];
        Self {
            durable: header.clone(),
            bytes: header,
            locked: false,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: SimulatedStoreStats::default(),
        }
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &SimulatedStoreStats {
        &self.stats
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Flip every bit of the byte at `offset`.
    pub fn corrupt_byte(&mut self, offset: usize) {
        if let Some(byte) = self.bytes.get_mut(offset) {
            *byte = !*byte;
        }
        if let Some(byte) = self.durable.get_mut(offset) {
            *byte = !*byte;
        }
    }

    /// Lose everything written since the last commit and drop the lock.
    pub fn crash(&mut self) {
        self.bytes.clone_from(&self.durable);
        self.locked = false;
    }

    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }
}

impl RecordStore for SimulatedStore {
    fn write(&mut self, data: &[u8]) -> Result<Address, StoreError> {
        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StoreError::Io(std::io::Error::other("injected write error")));
        }

        self.lock()?;
        let address = self.bytes.len() as u64;
        self.bytes.extend_from_slice(&(data.len() as u64).to_be_bytes());
        self.bytes.extend_from_slice(data);
        self.stats.writes += 1;
        Ok(address)
    }

    fn read(&mut self, address: Address) -> Result<Vec<u8>, StoreError> {
        self.stats.reads += 1;
        if address < SUPERBLOCK_SIZE {
            return Err(StoreError::Corruption(format!(
                "record address {address} points into the superblock"
            )));
        }

        let start = usize::try_from(address)
            .map_err(|_| StoreError::Corruption(format!("record address {address} too large")))?;
        let prefix = self
            .bytes
            .get(start..start + 8)
            .ok_or_else(|| StoreError::Corruption(format!("record at {address} runs past end")))?;
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(prefix);
        let length = usize::try_from(u64::from_be_bytes(len_bytes))
            .map_err(|_| StoreError::Corruption(format!("record at {address} too large")))?;

        let mut data = start
            .checked_add(8)
            .and_then(|begin| Some(begin..begin.checked_add(length)?))
            .and_then(|range| self.bytes.get(range))
            .ok_or_else(|| StoreError::Corruption(format!("record at {address} runs past end")))?
            .to_vec();

        if !data.is_empty() && self.should_inject_fault(self.fault_config.corruption_rate) {
            self.stats.corrupted_reads += 1;
            let index = self.rng.random_range(0..data.len());
            let bit = self.rng.random_range(0..8);
            data[index] ^= 1 << bit;
        }

        Ok(data)
    }

    fn root(&mut self) -> Result<Address, StoreError> {
        let mut slot = [0u8; 8];
        slot.copy_from_slice(&self.bytes[..8]);
        Ok(u64::from_be_bytes(slot))
    }

    fn commit_root(&mut self, address: Address) -> Result<(), StoreError> {
        self.lock()?;
        self.bytes[..8].copy_from_slice(&address.to_be_bytes());
        self.durable.clone_from(&self.bytes);
        self.stats.commits += 1;
        self.unlock()
    }

    fn lock(&mut self) -> Result<bool, StoreError> {
        if self.locked {
            return Ok(false);
        }
        self.locked = true;
        Ok(true)
    }

    fn unlock(&mut self) -> Result<(), StoreError> {
        self.locked = false;
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn end_offset(&mut self) -> Result<u64, StoreError> {
        Ok(self.bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_backing_file() {
        let mut store = SimulatedStore::new(42);
        assert_eq!(store.end_offset().expect("end"), SUPERBLOCK_SIZE);

        let address = store.write(b"abc").expect("write");
        assert_eq!(address, SUPERBLOCK_SIZE);
        assert_eq!(store.end_offset().expect("end"), SUPERBLOCK_SIZE + 8 + 3);
        assert_eq!(store.read(address).expect("read"), b"abc");
    }

    #[test]
    fn test_crash_drops_uncommitted_writes() {
        let mut store = SimulatedStore::new(42);
        let kept = store.write(b"kept").expect("write");
        store.commit_root(kept).expect("commit");
        let lost = store.write(b"lost").expect("write");

        store.crash();

        assert_eq!(store.root().expect("root"), kept);
        assert!(matches!(store.read(lost), Err(StoreError::Corruption(_))));
        assert!(!store.is_locked());
        assert_eq!(store.stats().commits, 1);
    }

    #[test]
    fn test_deterministic_faults() {
        let config = FaultConfig {
            write_error_rate: 0.5,
            corruption_rate: 0.0,
        };

        let run = |seed| {
            let mut store = SimulatedStore::with_config(seed, config.clone());
            let outcomes = (0..32)
                .map(|i: u8| store.write(&[i]).is_ok())
                .collect::<Vec<_>>();
            (outcomes, store.stats().injected_write_errors)
        };

        let (outcomes, injected) = run(9);
        assert_eq!(run(9), (outcomes.clone(), injected));
        assert!(outcomes.contains(&false));
        assert_eq!(
            injected,
            outcomes.iter().filter(|ok| !**ok).count() as u64
        );
    }
}
