//! Configuration for the query core

use serde::{Deserialize, Serialize};

/// Query core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Pagination configuration
    pub pagination: PaginationConfig,

    /// Query execution configuration
    pub query: QueryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "ledger-query".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            pagination: PaginationConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

/// Pagination configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when the caller gives none
    pub default_page_size: u64,

    /// Upper bound for caller page sizes
    pub max_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 15,
            max_page_size: 100,
        }
    }
}

impl PaginationConfig {
    /// Page size to use for a caller-supplied value (0 means unset)
    pub fn effective_page_size(&self, requested: u64) -> u64 {
        match requested {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        }
    }
}

/// Query execution configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Aggregation deadline (milliseconds); `None` disables it
    pub timeout_ms: Option<u64>,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(name) = std::env::var("LEDGER_QUERY_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(size) = std::env::var("LEDGER_QUERY_DEFAULT_PAGE_SIZE") {
            config.pagination.default_page_size = parse_env("LEDGER_QUERY_DEFAULT_PAGE_SIZE", &size)?;
        }

        if let Ok(size) = std::env::var("LEDGER_QUERY_MAX_PAGE_SIZE") {
            config.pagination.max_page_size = parse_env("LEDGER_QUERY_MAX_PAGE_SIZE", &size)?;
        }

        if let Ok(ms) = std::env::var("LEDGER_QUERY_TIMEOUT_MS") {
            config.query.timeout_ms = Some(parse_env("LEDGER_QUERY_TIMEOUT_MS", &ms)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::Result<()> {
        let p = &self.pagination;
        if p.default_page_size == 0 || p.max_page_size == 0 {
            return Err(crate::Error::Config("Page sizes must be positive".to_string()));
        }
        if p.default_page_size > p.max_page_size {
            return Err(crate::Error::Config(format!(
                "Default page size {} exceeds maximum {}",
                p.default_page_size, p.max_page_size
            )));
        }
        if self.query.timeout_ms == Some(0) {
            return Err(crate::Error::Config("Query timeout must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_env(var: &str, value: &str) -> crate::Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", var, e)))
}
