//! Tree key ordering and encoding.
//!
//! Keys only need a total order and a byte encoding. Floating-point keys
//! (the vantage-point distances) are ordered with `f64::total_cmp`, so NaN
//! and signed zeros have a well-defined place instead of breaking the tree.

use std::cmp::Ordering;

/// A key that can live in the persistent tree.
pub trait TreeKey: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Total order over keys.
    fn compare(&self, other: &Self) -> Ordering;

    /// Append the encoded key to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode a key from exactly the bytes written by `encode`.
    ///
    /// Returns `None` if the bytes are not a valid key.
    fn decode(bytes: &[u8]) -> Option<Self>;
}

impl TreeKey for f64 {
    fn compare(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bits().to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let bits = <[u8; 8]>::try_from(bytes).ok()?;
        Some(Self::from_bits(u64::from_be_bytes(bits)))
    }
}

impl TreeKey for i64 {
    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Some(Self::from_be_bytes(<[u8; 8]>::try_from(bytes).ok()?))
    }
}

impl TreeKey for u64 {
    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Some(Self::from_be_bytes(<[u8; 8]>::try_from(bytes).ok()?))
    }
}

impl TreeKey for String {
    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Self::from_utf8(bytes.to_vec()).ok()
    }
}
