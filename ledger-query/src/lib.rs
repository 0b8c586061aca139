//! Ledger Query Core
//!
//! Bi-temporal volume queries over an append-only double-entry ledger, with
//! tamper-evident revert lineage.
//!
//! # Architecture
//!
//! - **Derived State**: Volumes are folded from movements on every read
//! - **Bi-temporal**: Effective-time (PIT) and visibility-time (OOT) cutoffs
//! - **Keyset Pagination**: Opaque cursors carry the whole query state
//! - **Canonical Hashing**: Metadata hashes independent of map order
//!
//! # Invariants
//!
//! - Exact arithmetic: balance == input - output, never overflows
//! - Append-only: Movements never modified or deleted
//! - Stable order: Rows sorted by (account, asset) on every page
//! - Reserved namespace: Lineage keys only written by reverts

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod canonical;
pub mod config;
pub mod cursor;
pub mod error;
pub mod ledger;
pub mod log;
pub mod metadata;
pub mod pit;
pub mod query;
pub mod storage;
pub mod types;
pub mod volumes;

// Re-exports
pub use config::Config;
pub use cursor::Cursor;
pub use error::{Error, ErrorCode, Result};
pub use ledger::{Ledger, VolumesRequest};
pub use pit::PitFilter;
pub use query::QueryBuilder;
pub use storage::{LedgerStore, MemoryStore};
pub use types::{
    Metadata, Movement, Posting, Transaction, TransactionData, VolumesWithBalance,
    VolumesWithBalanceByAssetByAccount,
};
