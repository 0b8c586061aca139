//! End-to-end tests for the volumes query path
//!
//! Exercises the facade against the in-memory backend and against scripted
//! backends that record, fail or stall.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_query::{
    cursor::{self, Cursor},
    metadata::compute_metadata,
    Config, Error, ErrorCode, Ledger, LedgerStore, MemoryStore, Metadata, Movement, PitFilter,
    Posting, TransactionData, VolumesRequest, VolumesWithBalance,
    VolumesWithBalanceByAssetByAccount,
};
use num_bigint::BigInt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

fn row(account: &str, asset: &str, input: i64, output: i64) -> VolumesWithBalanceByAssetByAccount {
    VolumesWithBalanceByAssetByAccount {
        account: account.to_string(),
        asset: asset.to_string(),
        volumes: VolumesWithBalance::new(input, output),
    }
}

/// `user:1` receives then sends 1 eur; `user:2` is an admin holding usd.
fn fixture_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_transaction(
            TransactionData::new(vec![Posting::new("world", "user:1", "eur", 1)]),
            at(10),
        )
        .unwrap();
    store
        .insert_transaction(
            TransactionData::new(vec![Posting::new("user:1", "foo", "eur", 1)]),
            at(20),
        )
        .unwrap();
    store
        .insert_transaction(
            TransactionData::new(vec![Posting::new("world", "user:2", "usd", 50)]),
            at(30),
        )
        .unwrap();
    store
        .save_account_metadata("user:2", compute_metadata("roles", "admin"), at(31))
        .unwrap();
    store
}

/// Backend that records every call and answers with a fixed movement set
#[derive(Default)]
struct RecordingStore {
    movements: Vec<Movement>,
    filters: Mutex<Vec<PitFilter>>,
    metadata_calls: AtomicUsize,
}

impl RecordingStore {
    fn calls(&self) -> usize {
        self.filters.lock().len() + self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for RecordingStore {
    async fn movements(&self, filter: &PitFilter) -> ledger_query::Result<Vec<Movement>> {
        self.filters.lock().push(filter.clone());
        Ok(self.movements.clone())
    }

    async fn account_metadata(&self, _address: &str) -> ledger_query::Result<Metadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Metadata::new())
    }
}

struct FailingStore;

#[async_trait]
impl LedgerStore for FailingStore {
    async fn movements(&self, _filter: &PitFilter) -> ledger_query::Result<Vec<Movement>> {
        Err(Error::Storage("connection reset".to_string()))
    }

    async fn account_metadata(&self, _address: &str) -> ledger_query::Result<Metadata> {
        Err(Error::Storage("connection reset".to_string()))
    }
}

struct SlowStore;

#[async_trait]
impl LedgerStore for SlowStore {
    async fn movements(&self, _filter: &PitFilter) -> ledger_query::Result<Vec<Movement>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    async fn account_metadata(&self, _address: &str) -> ledger_query::Result<Metadata> {
        Ok(Metadata::new())
    }
}

async fn fetch<S: LedgerStore>(ledger: &Ledger<S>, request: VolumesRequest) -> ledger_query::Result<Cursor<VolumesWithBalanceByAssetByAccount>> {
    ledger
        .get_volumes_with_balances(&request, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_basic_pit_query() {
    let ledger = Ledger::new(fixture_store(), Config::default());

    let page = fetch(&ledger, VolumesRequest::new().with_pit(rfc3339(at(25))))
        .await
        .unwrap();

    assert_eq!(
        page.data,
        vec![
            row("foo", "eur", 1, 0),
            row("user:1", "eur", 1, 1),
            row("world", "eur", 0, 1),
        ]
    );
    assert_eq!(page.data[1].volumes.balance, BigInt::from(0));
    assert_eq!(page.page_size, 15);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_metadata_filter() {
    let ledger = Ledger::new(fixture_store(), Config::default());

    let page = fetch(
        &ledger,
        VolumesRequest::new().with_body(r#"{"$match": { "metadata[roles]": "admin" }}"#),
    )
    .await
    .unwrap();

    assert_eq!(page.data, vec![row("user:2", "usd", 50, 0)]);
}

#[tokio::test]
async fn test_address_filter() {
    let ledger = Ledger::new(fixture_store(), Config::default());

    let page = fetch(
        &ledger,
        VolumesRequest::new().with_body(r#"{"$match": { "address": "foo" }}"#),
    )
    .await
    .unwrap();

    assert_eq!(page.data, vec![row("foo", "eur", 1, 0)]);
}

#[tokio::test]
async fn test_filters_reach_backend() {
    let store = Arc::new(RecordingStore::default());
    let ledger = Ledger::with_shared(Arc::clone(&store), Config::default());

    let zero = "0001-01-01T00:00:00Z";
    fetch(
        &ledger,
        VolumesRequest::new()
            .with_pit(rfc3339(at(100)))
            .with_oot(zero)
            .with_body(r#"{"$match": { "address": "foo" }}"#),
    )
    .await
    .unwrap();

    let filters = store.filters.lock().clone();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].pit, Some(at(100)));
    assert_eq!(filters[0].effective_oot(), None);
    assert_eq!(store.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_body_never_reaches_backend() {
    let store = Arc::new(RecordingStore::default());
    let ledger = Ledger::with_shared(Arc::clone(&store), Config::default());

    let err = fetch(&ledger, VolumesRequest::new().with_body("[]"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(err.code().as_str(), "VALIDATION");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_malformed_cursor_is_validation_error() {
    let store = Arc::new(RecordingStore::default());
    let ledger = Ledger::with_shared(Arc::clone(&store), Config::default());

    let err = fetch(&ledger, VolumesRequest::new().with_cursor("bm90IGEgY3Vyc29y"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedCursor(_)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_backend_failure_is_internal() {
    let ledger = Ledger::new(FailingStore, Config::default());

    let err = fetch(&ledger, VolumesRequest::new()).await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(err.code(), ErrorCode::Internal);
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn test_cancellation_distinct_from_failure() {
    let ledger = Ledger::new(SlowStore, Config::default());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = ledger
        .get_volumes_with_balances(&VolumesRequest::new(), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_configured_timeout_cancels() {
    let mut config = Config::default();
    config.query.timeout_ms = Some(20);
    let ledger = Ledger::new(SlowStore, config);

    let err = fetch(&ledger, VolumesRequest::new()).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
}

#[tokio::test]
async fn test_revert_is_bi_temporal() {
    let store = MemoryStore::new();
    let tx = store
        .insert_transaction(
            TransactionData::new(vec![Posting::new("world", "user:1", "eur", 10)])
                .with_timestamp(at(100)),
            at(100),
        )
        .unwrap();
    store.revert_transaction(tx.id, at(200), true).unwrap();

    let ledger = Ledger::new(store, Config::default());

    let latest = fetch(&ledger, VolumesRequest::new()).await.unwrap();
    let user = latest.data.iter().find(|r| r.account == "user:1").unwrap();
    assert_eq!(user.volumes, VolumesWithBalance::new(10, 10));
    assert_eq!(user.volumes.balance, BigInt::from(0));

    let as_known_before = fetch(
        &ledger,
        VolumesRequest::new()
            .with_pit(rfc3339(at(150)))
            .with_oot(rfc3339(at(150))),
    )
    .await
    .unwrap();
    let user = as_known_before
        .data
        .iter()
        .find(|r| r.account == "user:1")
        .unwrap();
    assert_eq!(user.volumes, VolumesWithBalance::new(10, 0));

    let err = ledger
        .store()
        .revert_transaction(tx.id, at(300), false)
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyReverted(_)));
}

#[tokio::test]
async fn test_pages_walk_forward_and_back() {
    let store = MemoryStore::new();
    for i in 0..7 {
        store
            .insert_transaction(
                TransactionData::new(vec![Posting::new("world", format!("acc:{}", i), "USD", i + 1)]),
                at(i),
            )
            .unwrap();
    }
    let ledger = Ledger::new(store, Config::default());

    let full = fetch(&ledger, VolumesRequest::new().with_page_size(100))
        .await
        .unwrap()
        .data;
    assert_eq!(full.len(), 8);

    let mut pages = vec![fetch(&ledger, VolumesRequest::new().with_page_size(3))
        .await
        .unwrap()];
    while let Some(next) = pages.last().and_then(|p| p.next.clone()) {
        pages.push(fetch(&ledger, VolumesRequest::new().with_cursor(next)).await.unwrap());
    }

    assert_eq!(pages.len(), 3);
    let forward: Vec<_> = pages.iter().flat_map(|p| p.data.clone()).collect();
    assert_eq!(forward, full);

    let mut backward = pages.last().unwrap().data.clone();
    let mut previous = pages.last().unwrap().previous.clone();
    while let Some(token) = previous {
        let page = fetch(&ledger, VolumesRequest::new().with_cursor(token)).await.unwrap();
        let mut rows = page.data.clone();
        rows.extend(backward);
        backward = rows;
        previous = page.previous;
    }
    assert_eq!(backward, full);
}

#[tokio::test]
async fn test_edited_cursor_cannot_exceed_max_page_size() {
    let store = MemoryStore::new();
    for i in 0..250 {
        store
            .insert_transaction(
                TransactionData::new(vec![Posting::new("world", format!("acc:{:03}", i), "USD", 1)]),
                at(i),
            )
            .unwrap();
    }
    let ledger = Ledger::new(store, Config::default());
    let max = ledger.config().pagination.max_page_size;

    let mut state = ledger.build_query(&VolumesRequest::new()).unwrap();
    state.options.page_size = 1_000_000;
    let token = cursor::encode(&state).unwrap();

    let page = fetch(&ledger, VolumesRequest::new().with_cursor(token)).await.unwrap();
    assert_eq!(page.data.len() as u64, max);
    assert_eq!(page.page_size, max);
    assert!(page.has_more);
}

#[tokio::test]
async fn test_cursor_carries_query() {
    let ledger = Ledger::new(fixture_store(), Config::default());

    let first = fetch(
        &ledger,
        VolumesRequest::new()
            .with_page_size(1)
            .with_body(r#"{"$match": { "address": "user:1" }}"#),
    )
    .await
    .unwrap();
    assert_eq!(first.data, vec![row("user:1", "eur", 1, 1)]);
    assert!(first.next.is_none());

    let first = fetch(&ledger, VolumesRequest::new().with_page_size(1))
        .await
        .unwrap();
    let token = first.next.clone().unwrap();
    let state: ledger_query::volumes::VolumesQuery = cursor::decode(&token).unwrap();
    assert_eq!(state.options.page_size, 1);

    let second = fetch(&ledger, VolumesRequest::new().with_cursor(token).with_page_size(50))
        .await
        .unwrap();
    assert_eq!(second.data.len(), 1);
    assert_eq!(second.data[0].account, "user:1");
}

#[tokio::test]
async fn test_concurrent_queries_agree() {
    let ledger = Ledger::new(fixture_store(), Config::default());
    let request = VolumesRequest::new().with_page_size(2);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            let request = request.clone();
            tokio::spawn(async move {
                ledger
                    .get_volumes_with_balances(&request, &CancellationToken::new())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut pages = Vec::new();
    for handle in handles {
        pages.push(handle.await.unwrap());
    }
    assert!(pages.windows(2).all(|w| w[0] == w[1]));
}
