//! Revert lineage carried in reserved metadata keys
//!
//! A revert links two transactions without a dedicated link table:
//! - the reverting transaction carries `<namespace>state/reverts = <original id>`
//! - the original carries `<namespace>state/reverted = <reverting id>`
//!
//! Nothing here checks who writes these keys. The append path
//! ([`crate::storage::MemoryStore`]) refuses them from public metadata writes.

use crate::types::Metadata;

/// Prefix of system-owned metadata keys
pub const RESERVED_NAMESPACE: &str = "com.formance.spec/";

const REVERTS_KEY: &str = "state/reverts";
const REVERTED_KEY: &str = "state/reverted";

/// Metadata target type for accounts
pub const META_TARGET_TYPE_ACCOUNT: &str = "ACCOUNT";
/// Metadata target type for transactions
pub const META_TARGET_TYPE_TRANSACTION: &str = "TRANSACTION";

/// Key `name` inside the reserved namespace
pub fn spec_metadata(name: &str) -> String {
    format!("{}{}", RESERVED_NAMESPACE, name)
}

/// Key marking the transaction this one reverts
pub fn revert_metadata_key() -> String {
    spec_metadata(REVERTS_KEY)
}

/// Key marking the transaction that reverted this one
pub fn reverted_metadata_key() -> String {
    spec_metadata(REVERTED_KEY)
}

/// Whether `key` belongs to the reserved namespace
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_NAMESPACE)
}

/// Single-entry metadata
pub fn compute_metadata(key: impl Into<String>, value: impl Into<String>) -> Metadata {
    let mut m = Metadata::with_capacity(1);
    m.insert(key.into(), value.into());
    m
}

/// `overlay` entries written over `base`; unrelated keys are kept
pub fn merge(mut base: Metadata, overlay: Metadata) -> Metadata {
    base.extend(overlay);
    base
}

/// Marker for a reverting transaction
pub fn revert_metadata(tx_id: &str) -> Metadata {
    compute_metadata(revert_metadata_key(), tx_id)
}

/// Marker for a reverted transaction
pub fn reverted_metadata(by: &str) -> Metadata {
    compute_metadata(reverted_metadata_key(), by)
}

/// Merge the "reverts" marker into existing metadata
pub fn mark_reverts(m: Metadata, tx_id: &str) -> Metadata {
    merge(m, revert_metadata(tx_id))
}

/// Merge the "reverted" marker into existing metadata
pub fn mark_reverted(m: Metadata, by: &str) -> Metadata {
    merge(m, reverted_metadata(by))
}

/// Presence of the reverted key; its value is not inspected
pub fn is_reverted(m: &Metadata) -> bool {
    m.contains_key(&reverted_metadata_key())
}

/// Typed view over the lineage keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage {
    /// Id of the transaction this one reverts
    pub reverts: Option<String>,
    /// Id of the transaction that reverted this one
    pub reverted_by: Option<String>,
}

impl Lineage {
    /// Read lineage from metadata
    pub fn from_metadata(m: &Metadata) -> Self {
        Self {
            reverts: m.get(&revert_metadata_key()).cloned(),
            reverted_by: m.get(&reverted_metadata_key()).cloned(),
        }
    }

    /// Write lineage into metadata using the serialized key layout
    pub fn apply_to(&self, mut m: Metadata) -> Metadata {
        if let Some(ref tx_id) = self.reverts {
            m = mark_reverts(m, tx_id);
        }
        if let Some(ref by) = self.reverted_by {
            m = mark_reverted(m, by);
        }
        m
    }
}
