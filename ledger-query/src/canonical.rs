//! Canonical serialization for tamper-evidence hashing
//!
//! Produces the byte stream that feeds the log hash chain. The metadata
//! encoding is a frozen contract: hashes computed in the past must keep
//! recomputing to the same value, so the layout below never changes.
//!
//! Metadata layout:
//! - empty mapping: no bytes at all
//! - one key: `key || value`
//! - several keys: keys sorted by byte value, then `key || value` for each
//!
//! No separators, no length prefixes, no escaping.

use crate::types::Metadata;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use sha2::{Digest, Sha256};

/// Canonical byte buffer
#[derive(Debug, Clone, Default)]
pub struct CanonicalBuffer {
    buffer: Vec<u8>,
}

impl CanonicalBuffer {
    /// Create new buffer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write string bytes as-is
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Write u64 (big-endian)
    pub fn write_u64(&mut self, n: u64) {
        self.write_bytes(&n.to_be_bytes());
    }

    /// Write instant as epoch seconds (i64) then subsecond nanos (u32), big-endian.
    ///
    /// Total over every representable instant.
    pub fn write_time(&mut self, t: &DateTime<Utc>) {
        self.write_bytes(&t.timestamp().to_be_bytes());
        self.write_bytes(&t.timestamp_subsec_nanos().to_be_bytes());
    }

    /// Write amount as its decimal representation
    pub fn write_amount(&mut self, amount: &BigInt) {
        self.write_string(&amount.to_string());
    }

    /// Write metadata in canonical key order
    pub fn write_metadata(&mut self, m: &Metadata) {
        if m.is_empty() {
            return;
        }

        let mut keys: Vec<&String> = m.keys().collect();
        // Single-key maps are written without sorting; keep this branch as-is.
        if keys.len() > 1 {
            keys.sort();
        }

        for key in keys {
            self.write_string(key);
            self.write_string(&m[key]);
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Finalize and return bytes
    pub fn finalize(self) -> Vec<u8> {
        self.buffer
    }

    /// Compute SHA-256 digest
    pub fn hash(self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.buffer);
        hasher.finalize().into()
    }
}

/// Canonical bytes of a metadata mapping alone
pub fn canonical_metadata_bytes(m: &Metadata) -> Vec<u8> {
    let mut buf = CanonicalBuffer::new();
    buf.write_metadata(m);
    buf.finalize()
}
