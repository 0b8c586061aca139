//! Volume/balance aggregation
//!
//! Folds the movements admitted by a [`PitFilter`] into one
//! [`VolumesWithBalanceByAssetByAccount`] row per (account, asset) pair,
//! applies the predicate and slices the requested page.

use crate::{
    cursor::{self, Cursor, KeysetPaginatedQuery},
    pit::PitFilterForVolumes,
    storage::LedgerStore,
    types::{Metadata, RowKey, VolumesWithBalance, VolumesWithBalanceByAssetByAccount},
    Error, Result,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Query state for the volumes endpoint, as carried in cursor tokens
pub type VolumesQuery = KeysetPaginatedQuery<PitFilterForVolumes>;

/// Page of volume rows
pub type VolumesPage = Cursor<VolumesWithBalanceByAssetByAccount>;

/// Run `fut` unless `cancel` fires first
async fn cancellable<T>(
    cancel: &CancellationToken,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(format!("{} cancelled", what))),
        res = fut => res,
    }
}

/// Aggregate volumes over `store` and return one page
pub async fn get_volumes_with_balances<S>(
    store: &S,
    query: &VolumesQuery,
    cancel: &CancellationToken,
) -> Result<VolumesPage>
where
    S: LedgerStore + ?Sized,
{
    let filter = &query.options.options.pit_filter;

    let movements = cancellable(cancel, "movement fetch", store.movements(filter)).await?;

    let mut totals: BTreeMap<RowKey, VolumesWithBalance> = BTreeMap::new();
    for movement in movements.iter().filter(|m| filter.admits(m)) {
        totals
            .entry(RowKey::new(movement.account.as_str(), movement.asset.as_str()))
            .or_default()
            .apply(movement);
    }

    let rows = match &query.options.query_builder {
        None => totals,
        Some(predicate) => {
            let mut account_metadata: HashMap<String, Metadata> = HashMap::new();
            if predicate.uses_metadata() {
                for key in totals.keys() {
                    if account_metadata.contains_key(&key.account) {
                        continue;
                    }
                    let m = cancellable(cancel, "metadata fetch", store.account_metadata(&key.account)).await?;
                    account_metadata.insert(key.account.clone(), m);
                }
            }

            totals
                .into_iter()
                .filter(|(key, _)| predicate.matches(&key.account, account_metadata.get(&key.account)))
                .collect()
        }
    };

    let rows: Vec<VolumesWithBalanceByAssetByAccount> = rows
        .into_iter()
        .map(|(key, volumes)| VolumesWithBalanceByAssetByAccount {
            account: key.account,
            asset: key.asset,
            volumes,
        })
        .collect();

    tracing::debug!(
        movements = movements.len(),
        rows = rows.len(),
        pit = ?filter.pit,
        oot = ?filter.effective_oot(),
        "Volumes aggregated"
    );

    cursor::paginate(query, rows, VolumesWithBalanceByAssetByAccount::key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::PaginatedQueryOptions;
    use crate::pit::PitFilter;
    use crate::storage::MemoryStore;
    use crate::types::{Posting, TransactionData};
    use chrono::{DateTime, Utc};
    use num_bigint::BigInt;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn query(filter: PitFilter) -> VolumesQuery {
        KeysetPaginatedQuery::new(PaginatedQueryOptions::new(PitFilterForVolumes::new(filter)).with_page_size(15))
    }

    #[tokio::test]
    async fn test_sums_per_account_and_asset() {
        let store = MemoryStore::new();
        store
            .insert_transaction(
                TransactionData::new(vec![
                    Posting::new("world", "alice", "USD", 100),
                    Posting::new("alice", "bob", "USD", 30),
                    Posting::new("world", "alice", "EUR", 5),
                ]),
                at(1),
            )
            .unwrap();

        let page = get_volumes_with_balances(&store, &query(PitFilter::latest()), &CancellationToken::new())
            .await
            .unwrap();

        let keys: Vec<String> = page.data.iter().map(|r| r.key().to_string()).collect();
        assert_eq!(keys, ["alice/EUR", "alice/USD", "bob/USD", "world/EUR", "world/USD"]);

        let alice_usd = &page.data[1].volumes;
        assert_eq!(alice_usd.input, BigInt::from(100));
        assert_eq!(alice_usd.output, BigInt::from(30));
        assert_eq!(alice_usd.balance, BigInt::from(70));

        let world_usd = &page.data[4].volumes;
        assert_eq!(world_usd.balance, BigInt::from(-100));
    }

    #[tokio::test]
    async fn test_pit_excludes_later_movements() {
        let store = MemoryStore::new();
        store
            .insert_transaction(TransactionData::new(vec![Posting::new("world", "alice", "USD", 1)]), at(10))
            .unwrap();
        store
            .insert_transaction(TransactionData::new(vec![Posting::new("world", "alice", "USD", 2)]), at(20))
            .unwrap();

        let page = get_volumes_with_balances(
            &store,
            &query(PitFilter::new(Some(at(15)), None)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(page.data[0].volumes.input, BigInt::from(1));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = get_volumes_with_balances(&store, &query(PitFilter::latest()), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_ledger_is_empty_page() {
        let store = MemoryStore::new();
        let page = get_volumes_with_balances(&store, &query(PitFilter::latest()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(page.data.is_empty());
        assert!(!page.has_more);
    }
}
