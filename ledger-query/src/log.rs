//! Hash-chained ledger log
//!
//! Every write on the append path produces one log. Each log hash covers the
//! previous hash, so editing any logged payload (including metadata, which
//! goes through [`CanonicalBuffer::write_metadata`]) breaks every later link.

use crate::{
    canonical::CanonicalBuffer,
    metadata::{META_TARGET_TYPE_ACCOUNT, META_TARGET_TYPE_TRANSACTION},
    types::{Metadata, Transaction},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity a metadata write applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataTarget {
    /// Account address
    Account(String),
    /// Transaction id
    Transaction(u64),
}

/// Log payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogPayload {
    /// Transaction appended
    NewTransaction {
        /// The transaction
        transaction: Transaction,
    },
    /// Metadata merged into an account or transaction
    SetMetadata {
        /// Written entity
        target: MetadataTarget,
        /// Written keys
        metadata: Metadata,
    },
    /// Transaction reverted by a new one
    RevertedTransaction {
        /// Original transaction
        reverted_id: u64,
        /// Reverting transaction
        revert_transaction: Transaction,
    },
}

impl LogPayload {
    fn type_tag(&self) -> &'static str {
        match self {
            LogPayload::NewTransaction { .. } => "NEW_TRANSACTION",
            LogPayload::SetMetadata { .. } => "SET_METADATA",
            LogPayload::RevertedTransaction { .. } => "REVERTED_TRANSACTION",
        }
    }

    fn write_canonical(&self, buf: &mut CanonicalBuffer) {
        buf.write_string(self.type_tag());
        match self {
            LogPayload::NewTransaction { transaction } => write_transaction(buf, transaction),
            LogPayload::SetMetadata { target, metadata } => {
                match target {
                    MetadataTarget::Account(address) => {
                        buf.write_string(META_TARGET_TYPE_ACCOUNT);
                        buf.write_string(address);
                    }
                    MetadataTarget::Transaction(id) => {
                        buf.write_string(META_TARGET_TYPE_TRANSACTION);
                        buf.write_u64(*id);
                    }
                }
                buf.write_metadata(metadata);
            }
            LogPayload::RevertedTransaction {
                reverted_id,
                revert_transaction,
            } => {
                buf.write_u64(*reverted_id);
                write_transaction(buf, revert_transaction);
            }
        }
    }
}

fn write_transaction(buf: &mut CanonicalBuffer, tx: &Transaction) {
    buf.write_u64(tx.id);
    buf.write_time(&tx.timestamp);
    for posting in &tx.postings {
        buf.write_string(&posting.source);
        buf.write_string(&posting.destination);
        buf.write_string(&posting.asset);
        buf.write_amount(&posting.amount);
    }
    buf.write_metadata(&tx.metadata);
}

/// Log entry with its chain hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedLog {
    /// Sequential id
    pub id: u64,
    /// Write instant
    pub date: DateTime<Utc>,
    /// What was written
    pub payload: LogPayload,
    /// SHA-256 over previous hash, id, date and payload
    pub hash: [u8; 32],
}

impl ChainedLog {
    /// Build the next log of a chain
    pub fn chain(previous: Option<&ChainedLog>, date: DateTime<Utc>, payload: LogPayload) -> Self {
        let id = previous.map_or(0, |p| p.id + 1);
        let hash = compute_hash(previous.map(|p| &p.hash), id, &date, &payload);
        Self {
            id,
            date,
            payload,
            hash,
        }
    }

    /// Hash as hex, for display
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Hash of one log given its predecessor's hash
pub fn compute_hash(
    previous: Option<&[u8; 32]>,
    id: u64,
    date: &DateTime<Utc>,
    payload: &LogPayload,
) -> [u8; 32] {
    let mut buf = CanonicalBuffer::new();
    if let Some(prev) = previous {
        buf.write_bytes(prev);
    }
    buf.write_u64(id);
    buf.write_time(date);
    payload.write_canonical(&mut buf);
    buf.hash()
}

/// Recompute every link; returns the id of the first log that does not match
pub fn verify_chain(logs: &[ChainedLog]) -> std::result::Result<(), u64> {
    let mut previous: Option<&[u8; 32]> = None;
    for log in logs {
        if compute_hash(previous, log.id, &log.date, &log.payload) != log.hash {
            tracing::warn!(log_id = log.id, "Log hash mismatch");
            return Err(log.id);
        }
        previous = Some(&log.hash);
    }
    Ok(())
}
