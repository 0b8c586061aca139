//! Core types for the ledger query core
//!
//! All types are designed for:
//! - Exact arithmetic (`BigInt` for volumes, never floating point)
//! - Immutability of recorded movements
//! - Stable JSON representation (amounts as decimal strings)

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Key/value metadata attached to accounts and transactions
pub type Metadata = HashMap<String, String>;

/// Serde adapter writing a `BigInt` as its decimal string
pub mod amount {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as decimal string
    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize from decimal string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One leg of a transaction: `amount` of `asset` from `source` to `destination`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Debited account
    pub source: String,
    /// Credited account
    pub destination: String,
    /// Asset code
    pub asset: String,
    /// Non-negative quantity
    #[serde(with = "amount")]
    pub amount: BigInt,
}

impl Posting {
    /// Create new posting
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        asset: impl Into<String>,
        amount: impl Into<BigInt>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            asset: asset.into(),
            amount: amount.into(),
        }
    }

    /// Same posting flowing the other way
    pub fn reversed(&self) -> Self {
        Self {
            source: self.destination.clone(),
            destination: self.source.clone(),
            asset: self.asset.clone(),
            amount: self.amount.clone(),
        }
    }
}

/// Input to the append path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    /// Postings, in order
    pub postings: Vec<Posting>,
    /// Transaction metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Effective date; defaults to the insertion instant
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionData {
    /// Create from postings
    pub fn new(postings: Vec<Posting>) -> Self {
        Self {
            postings,
            ..Default::default()
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set effective date
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check posting invariants
    pub fn validate(&self) -> crate::Result<()> {
        if self.postings.is_empty() {
            return Err(crate::Error::InvalidTransaction(
                "Transaction has no postings".to_string(),
            ));
        }

        for posting in &self.postings {
            if posting.amount.is_negative() {
                return Err(crate::Error::InvalidTransaction(format!(
                    "Negative amount {} on {} -> {}",
                    posting.amount, posting.source, posting.destination
                )));
            }
            if posting.source.is_empty() || posting.destination.is_empty() || posting.asset.is_empty() {
                return Err(crate::Error::InvalidTransaction(
                    "Posting with empty account or asset".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Recorded transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sequential id
    pub id: u64,
    /// Postings, in order
    pub postings: Vec<Posting>,
    /// Transaction metadata (lineage markers live here)
    pub metadata: Metadata,
    /// Effective date
    pub timestamp: DateTime<Utc>,
    /// Instant the ledger learned about the transaction
    pub inserted_at: DateTime<Utc>,
}

impl Transaction {
    /// Expand postings into movements: one Output for the source, one Input for the destination
    pub fn movements(&self) -> Vec<Movement> {
        self.postings
            .iter()
            .flat_map(|posting| {
                [
                    Movement {
                        transaction_id: self.id,
                        account: posting.source.clone(),
                        asset: posting.asset.clone(),
                        amount: posting.amount.clone(),
                        is_source: true,
                        effective_date: self.timestamp,
                        inserted_at: self.inserted_at,
                    },
                    Movement {
                        transaction_id: self.id,
                        account: posting.destination.clone(),
                        asset: posting.asset.clone(),
                        amount: posting.amount.clone(),
                        is_source: false,
                        effective_date: self.timestamp,
                        inserted_at: self.inserted_at,
                    },
                ]
            })
            .collect()
    }

    /// Postings cancelling this transaction, last leg first
    pub fn reverse_postings(&self) -> Vec<Posting> {
        self.postings.iter().rev().map(Posting::reversed).collect()
    }
}

/// Append-only ledger entry for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Originating transaction
    pub transaction_id: u64,
    /// Affected account
    pub account: String,
    /// Asset code
    pub asset: String,
    /// Quantity moved
    #[serde(with = "amount")]
    pub amount: BigInt,
    /// Amount leaves the account (Output) when true, enters it (Input) otherwise
    pub is_source: bool,
    /// Effective time
    pub effective_date: DateTime<Utc>,
    /// Visibility time
    pub inserted_at: DateTime<Utc>,
}

/// Input/output totals with derived balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumesWithBalance {
    /// Cumulative input
    #[serde(with = "amount")]
    pub input: BigInt,
    /// Cumulative output
    #[serde(with = "amount")]
    pub output: BigInt,
    /// `input - output`
    #[serde(with = "amount")]
    pub balance: BigInt,
}

impl VolumesWithBalance {
    /// Build from volumes; balance is always derived
    pub fn new(input: impl Into<BigInt>, output: impl Into<BigInt>) -> Self {
        let input = input.into();
        let output = output.into();
        let balance = &input - &output;
        Self {
            input,
            output,
            balance,
        }
    }

    /// Record a movement
    pub fn apply(&mut self, movement: &Movement) {
        if movement.is_source {
            self.output += &movement.amount;
        } else {
            self.input += &movement.amount;
        }
        self.balance = &self.input - &self.output;
    }
}

impl Default for VolumesWithBalance {
    fn default() -> Self {
        Self::new(BigInt::zero(), BigInt::zero())
    }
}

/// Composite ordering key of an aggregation row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    /// Account address
    pub account: String,
    /// Asset code
    pub asset: String,
}

impl RowKey {
    /// Create new key
    pub fn new(account: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            asset: asset.into(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.asset)
    }
}

/// One aggregation result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumesWithBalanceByAssetByAccount {
    /// Account address
    pub account: String,
    /// Asset code
    pub asset: String,
    /// Volumes for the pair
    #[serde(flatten)]
    pub volumes: VolumesWithBalance,
}

impl VolumesWithBalanceByAssetByAccount {
    /// Ordering key of the row
    pub fn key(&self) -> RowKey {
        RowKey::new(self.account.clone(), self.asset.clone())
    }
}
