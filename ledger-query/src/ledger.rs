//! Query facade
//!
//! Turns raw request parameters (time cutoffs, predicate body, page size,
//! cursor token) into a validated query, runs the aggregator against the
//! backend and returns one page.
//!
//! # Example
//!
//! ```no_run
//! use ledger_query::{Config, Ledger, MemoryStore, VolumesRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> ledger_query::Result<()> {
//!     let ledger = Ledger::new(MemoryStore::new(), Config::default());
//!
//!     let request = VolumesRequest::new()
//!         .with_pit("2024-03-01T00:00:00Z")
//!         .with_body(r#"{"$match": {"metadata[roles]": "admin"}}"#);
//!     let page = ledger
//!         .get_volumes_with_balances(&request, &CancellationToken::new())
//!         .await?;
//!
//!     println!("{} rows", page.data.len());
//!     Ok(())
//! }
//! ```

use crate::{
    cursor::{self, KeysetPaginatedQuery, PaginatedQueryOptions},
    pit::{parse_timestamp, PitFilter, PitFilterForVolumes},
    query::parse_query,
    storage::LedgerStore,
    volumes::{self, VolumesPage, VolumesQuery},
    Config, Error, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Raw parameters of a volumes request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumesRequest {
    /// Effective-time cutoff (RFC3339)
    pub pit: Option<String>,
    /// Visibility-time cutoff (RFC3339)
    pub oot: Option<String>,
    /// Requested page size; 0 or `None` uses the configured default
    pub page_size: Option<u64>,
    /// Token from a previous page; overrides every other parameter
    pub cursor: Option<String>,
    /// Predicate document
    pub body: Vec<u8>,
}

impl VolumesRequest {
    /// Empty request: latest view, no predicate, default page size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set effective-time cutoff
    pub fn with_pit(mut self, pit: impl Into<String>) -> Self {
        self.pit = Some(pit.into());
        self
    }

    /// Set visibility-time cutoff
    pub fn with_oot(mut self, oot: impl Into<String>) -> Self {
        self.oot = Some(oot.into());
        self
    }

    /// Set page size
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Continue from a cursor token
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Set predicate body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Read-side entry point over a backend
#[derive(Debug)]
pub struct Ledger<S> {
    store: Arc<S>,
    config: Config,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Create over an owned backend
    pub fn new(store: S, config: Config) -> Self {
        Self::with_shared(Arc::new(store), config)
    }

    /// Create over a shared backend
    pub fn with_shared(store: Arc<S>, config: Config) -> Self {
        Self { store, config }
    }

    /// Backend handle
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the query described by `request` without touching the backend
    pub fn build_query(&self, request: &VolumesRequest) -> Result<VolumesQuery> {
        if let Some(token) = request.cursor.as_deref().filter(|t| !t.is_empty()) {
            let mut query: VolumesQuery = cursor::decode(token)?;
            // Tokens are caller-held; re-apply the page size bounds.
            query.options.page_size = self
                .config
                .pagination
                .effective_page_size(query.options.page_size);
            return Ok(query);
        }

        let pit = parse_timestamp("pit", request.pit.as_deref())?;
        let oot = parse_timestamp("oot", request.oot.as_deref())?;

        let mut options = PaginatedQueryOptions::new(PitFilterForVolumes::new(PitFilter::new(pit, oot)))
            .with_page_size(
                self.config
                    .pagination
                    .effective_page_size(request.page_size.unwrap_or(0)),
            );

        if let Some(predicate) = parse_query(&request.body)? {
            options = options.with_query_builder(predicate);
        }

        Ok(KeysetPaginatedQuery::new(options))
    }

    /// Volumes with balances, one page at a time
    pub async fn get_volumes_with_balances(
        &self,
        request: &VolumesRequest,
        cancel: &CancellationToken,
    ) -> Result<VolumesPage> {
        let query = self.build_query(request).map_err(|e| {
            tracing::debug!(error = %e, code = %e.code(), "Rejected volumes request");
            e
        })?;

        let run = volumes::get_volumes_with_balances(self.store.as_ref(), &query, cancel);

        let page = match self.config.query.timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), run)
                .await
                .map_err(|_| Error::Cancelled(format!("query exceeded {}ms", ms)))?,
            None => run.await,
        };

        match &page {
            Ok(page) => tracing::debug!(
                rows = page.data.len(),
                has_more = page.has_more,
                "Volumes page served"
            ),
            Err(e) if e.is_cancelled() => tracing::debug!(error = %e, "Volumes query cancelled"),
            Err(e) => tracing::error!(error = %e, "Volumes query failed"),
        }

        page
    }
}
