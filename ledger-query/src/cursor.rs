//! Opaque pagination cursors
//!
//! A cursor token is the JSON form of the full query state (filters,
//! predicate, page size and keyset position), encoded as URL-safe base64
//! without padding. Decoding anything that `encode` did not produce fails
//! with [`Error::MalformedCursor`].
//!
//! A token is only meaningful for the filter and predicate it was built
//! from. That pairing is not checked here.

use crate::{query::QueryBuilder, types::RowKey, Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Navigation direction relative to the keyset position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Rows strictly after the key
    Next,
    /// Rows strictly before the key
    Previous,
}

/// Last-seen ordering key and direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePosition {
    /// Boundary key (excluded from the page)
    pub key: RowKey,
    /// Which side of the key to read
    pub direction: Direction,
}

/// Filter, predicate and page size of a paginated query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedQueryOptions<F> {
    /// Optional predicate
    pub query_builder: Option<QueryBuilder>,
    /// Rows per page
    pub page_size: u64,
    /// Endpoint-specific filter
    pub options: F,
}

impl<F> PaginatedQueryOptions<F> {
    /// Create with a filter, no predicate and no page size
    pub fn new(options: F) -> Self {
        Self {
            query_builder: None,
            page_size: 0,
            options,
        }
    }

    /// Attach predicate
    pub fn with_query_builder(mut self, query_builder: QueryBuilder) -> Self {
        self.query_builder = Some(query_builder);
        self
    }

    /// Set page size
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Query state carried inside cursor tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetPaginatedQuery<F> {
    /// Original query parameters
    pub options: PaginatedQueryOptions<F>,
    /// Keyset position; `None` for the first page
    pub position: Option<PagePosition>,
}

impl<F> KeysetPaginatedQuery<F> {
    /// First page of a query
    pub fn new(options: PaginatedQueryOptions<F>) -> Self {
        Self {
            options,
            position: None,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor<T> {
    /// Requested page size
    pub page_size: u64,
    /// Whether a next page exists
    pub has_more: bool,
    /// Token for the previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    /// Token for the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Rows, in key order
    pub data: Vec<T>,
}

/// Encode a query state into an opaque token
pub fn encode<T: Serialize>(state: &T) -> Result<String> {
    let json = serde_json::to_vec(state)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a token produced by [`encode`]
pub fn decode<T: DeserializeOwned>(token: &str) -> Result<T> {
    if token.is_empty() {
        return Err(Error::MalformedCursor("empty cursor".to_string()));
    }

    let json = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| Error::MalformedCursor(format!("invalid encoding: {}", e)))?;

    serde_json::from_slice(&json)
        .map_err(|e| Error::MalformedCursor(format!("invalid payload: {}", e)))
}

/// Cut one page out of `rows` (sorted ascending by `key`) and build its tokens
pub fn paginate<F, T>(
    query: &KeysetPaginatedQuery<F>,
    rows: Vec<T>,
    key: impl Fn(&T) -> RowKey,
) -> Result<Cursor<T>>
where
    F: Clone + Serialize,
{
    let requested = query.options.page_size.max(1);
    let page_size = usize::try_from(requested).unwrap_or(usize::MAX);

    let (start, end) = match &query.position {
        None => (0, page_size.min(rows.len())),
        Some(PagePosition {
            key: boundary,
            direction: Direction::Next,
        }) => {
            let start = rows.partition_point(|row| key(row) <= *boundary);
            (start, start.saturating_add(page_size).min(rows.len()))
        }
        Some(PagePosition {
            key: boundary,
            direction: Direction::Previous,
        }) => {
            let end = rows.partition_point(|row| key(row) < *boundary);
            (end.saturating_sub(page_size), end)
        }
    };

    let (previous, next) = if start < end {
        let previous = if start > 0 {
            Some(encode(&at_position(query, key(&rows[start]), Direction::Previous))?)
        } else {
            None
        };
        let next = if end < rows.len() {
            Some(encode(&at_position(query, key(&rows[end - 1]), Direction::Next))?)
        } else {
            None
        };
        (previous, next)
    } else {
        (None, None)
    };

    let data: Vec<T> = rows.into_iter().skip(start).take(end - start).collect();

    tracing::debug!(
        start,
        end,
        rows = data.len(),
        has_previous = previous.is_some(),
        has_next = next.is_some(),
        "Page sliced"
    );

    Ok(Cursor {
        page_size: requested,
        has_more: next.is_some(),
        previous,
        next,
        data,
    })
}

fn at_position<F: Clone>(
    query: &KeysetPaginatedQuery<F>,
    key: RowKey,
    direction: Direction,
) -> KeysetPaginatedQuery<F> {
    KeysetPaginatedQuery {
        options: query.options.clone(),
        position: Some(PagePosition { key, direction }),
    }
}
