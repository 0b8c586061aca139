//! Storage seam consumed by the aggregator
//!
//! The query core only reads through [`LedgerStore`]. [`MemoryStore`] is the
//! in-process backend used by tests and the demo binary; it also owns the
//! append path (transactions, reverts, metadata writes) and keeps the
//! hash-chained log of every write.
//!
//! # Invariants
//!
//! - Movements are appended, never mutated or deleted
//! - Reserved-namespace keys are only written by `revert_transaction`
//! - One writer at a time (write lock); readers never block each other

use crate::{
    log::{ChainedLog, LogPayload, MetadataTarget},
    metadata::{self, is_reserved_key, is_reverted, mark_reverted, mark_reverts},
    pit::PitFilter,
    types::{Metadata, Movement, Transaction, TransactionData},
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Read access the aggregator needs from a backend
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Movements visible under `filter`.
    ///
    /// Backends may return a superset; the aggregator re-applies the filter.
    async fn movements(&self, filter: &PitFilter) -> Result<Vec<Movement>>;

    /// Current metadata of an account (empty when unknown)
    async fn account_metadata(&self, address: &str) -> Result<Metadata>;
}

#[derive(Debug, Default)]
struct Inner {
    transactions: Vec<Transaction>,
    movements: Vec<Movement>,
    accounts: HashMap<String, Metadata>,
    logs: Vec<ChainedLog>,
}

impl Inner {
    fn append_log(&mut self, date: DateTime<Utc>, payload: LogPayload) {
        let log = ChainedLog::chain(self.logs.last(), date, payload);
        tracing::debug!(log_id = log.id, hash = %log.hash_hex(), "Log appended");
        self.logs.push(log);
    }

    fn insert(&mut self, data: TransactionData, inserted_at: DateTime<Utc>) -> Result<Transaction> {
        data.validate()?;

        let tx = Transaction {
            id: self.transactions.len() as u64,
            postings: data.postings,
            metadata: data.metadata,
            timestamp: data.timestamp.unwrap_or(inserted_at),
            inserted_at,
        };

        for movement in tx.movements() {
            self.accounts.entry(movement.account.clone()).or_default();
            self.movements.push(movement);
        }
        self.transactions.push(tx.clone());

        Ok(tx)
    }

    fn transaction_mut(&mut self, id: u64) -> Result<&mut Transaction> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.transactions.get_mut(idx))
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

/// In-memory ledger backend
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction recorded at `inserted_at`
    pub fn insert_transaction(&self, data: TransactionData, inserted_at: DateTime<Utc>) -> Result<Transaction> {
        if let Some(key) = data.metadata.keys().find(|k| is_reserved_key(k)) {
            return Err(Error::ReservedMetadataKey(key.clone()));
        }

        let mut inner = self.inner.write();
        let tx = inner.insert(data, inserted_at)?;
        inner.append_log(inserted_at, LogPayload::NewTransaction { transaction: tx.clone() });

        tracing::debug!(
            tx_id = tx.id,
            postings = tx.postings.len(),
            effective = %tx.timestamp,
            "Transaction appended"
        );

        Ok(tx)
    }

    /// Append the transaction cancelling `id` and link both through lineage markers.
    ///
    /// With `at_effective_date` the revert takes the original's effective
    /// date, otherwise it is effective at `inserted_at`.
    pub fn revert_transaction(
        &self,
        id: u64,
        inserted_at: DateTime<Utc>,
        at_effective_date: bool,
    ) -> Result<Transaction> {
        let mut inner = self.inner.write();

        let original = inner.transaction_mut(id)?.clone();
        if is_reverted(&original.metadata) {
            return Err(Error::AlreadyReverted(id));
        }

        let timestamp = if at_effective_date {
            original.timestamp
        } else {
            inserted_at
        };
        let data = TransactionData {
            postings: original.reverse_postings(),
            metadata: mark_reverts(Metadata::new(), &id.to_string()),
            timestamp: Some(timestamp),
        };
        let revert = inner.insert(data, inserted_at)?;

        let target = inner.transaction_mut(id)?;
        target.metadata = mark_reverted(std::mem::take(&mut target.metadata), &revert.id.to_string());

        inner.append_log(
            inserted_at,
            LogPayload::RevertedTransaction {
                reverted_id: id,
                revert_transaction: revert.clone(),
            },
        );

        tracing::info!(reverted = id, revert = revert.id, "Transaction reverted");

        Ok(revert)
    }

    /// Merge metadata into an account; reserved keys are refused
    pub fn save_account_metadata(&self, address: &str, m: Metadata, date: DateTime<Utc>) -> Result<()> {
        reject_reserved(&m)?;

        let mut inner = self.inner.write();
        let current = inner.accounts.remove(address).unwrap_or_default();
        inner
            .accounts
            .insert(address.to_string(), metadata::merge(current, m.clone()));
        inner.append_log(
            date,
            LogPayload::SetMetadata {
                target: MetadataTarget::Account(address.to_string()),
                metadata: m,
            },
        );

        Ok(())
    }

    /// Merge metadata into a transaction; reserved keys are refused
    pub fn save_transaction_metadata(&self, id: u64, m: Metadata, date: DateTime<Utc>) -> Result<()> {
        reject_reserved(&m)?;

        let mut inner = self.inner.write();
        let tx = inner.transaction_mut(id)?;
        tx.metadata = metadata::merge(std::mem::take(&mut tx.metadata), m.clone());
        inner.append_log(
            date,
            LogPayload::SetMetadata {
                target: MetadataTarget::Transaction(id),
                metadata: m,
            },
        );

        Ok(())
    }

    /// Transaction by id
    pub fn transaction(&self, id: u64) -> Result<Transaction> {
        let inner = self.inner.read();
        usize::try_from(id)
            .ok()
            .and_then(|idx| inner.transactions.get(idx))
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Snapshot of the log chain
    pub fn logs(&self) -> Vec<ChainedLog> {
        self.inner.read().logs.clone()
    }

    /// Number of recorded movements
    pub fn movement_count(&self) -> usize {
        self.inner.read().movements.len()
    }
}

fn reject_reserved(m: &Metadata) -> Result<()> {
    match m.keys().find(|k| is_reserved_key(k)) {
        Some(key) => Err(Error::ReservedMetadataKey(key.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn movements(&self, filter: &PitFilter) -> Result<Vec<Movement>> {
        let inner = self.inner.read();
        Ok(inner
            .movements
            .iter()
            .filter(|m| filter.admits(m))
            .cloned()
            .collect())
    }

    async fn account_metadata(&self, address: &str) -> Result<Metadata> {
        Ok(self
            .inner
            .read()
            .accounts
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}
