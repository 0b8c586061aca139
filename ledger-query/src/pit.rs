//! Bi-temporal point filter
//!
//! Two independent cutoffs decide whether a movement is visible:
//!
//! | PIT | OOT | visible movements |
//! |-----|-----|-------------------|
//! | -   | -   | all |
//! | set | -   | effective at or before PIT, as currently known |
//! | -   | set | recorded at or before OOT |
//! | set | set | effective at or before PIT **and** recorded at or before OOT |
//!
//! A zero-valued OOT (`0001-01-01T00:00:00Z`) is read as "unset". Callers
//! cannot distinguish an explicit zero cutoff from an absent one.

use crate::{types::Movement, Error, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Effective-time and visibility-time cutoffs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitFilter {
    /// Effective-time cutoff
    pub pit: Option<DateTime<Utc>>,
    /// Visibility-time cutoff
    pub oot: Option<DateTime<Utc>>,
}

impl PitFilter {
    /// Create new filter
    pub fn new(pit: Option<DateTime<Utc>>, oot: Option<DateTime<Utc>>) -> Self {
        Self { pit, oot }
    }

    /// Latest state, as currently known
    pub fn latest() -> Self {
        Self::default()
    }

    /// Visibility cutoff after folding the zero instant into "unset"
    pub fn effective_oot(&self) -> Option<DateTime<Utc>> {
        self.oot.filter(|t| !is_zero_instant(t))
    }

    /// Whether the movement belongs to the view pinned by this filter
    pub fn admits(&self, movement: &Movement) -> bool {
        let effective_ok = self.pit.map_or(true, |pit| movement.effective_date <= pit);
        let known_ok = self
            .effective_oot()
            .map_or(true, |oot| movement.inserted_at <= oot);
        effective_ok && known_ok
    }
}

/// Filter options for volume queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitFilterForVolumes {
    /// Time cutoffs
    #[serde(flatten)]
    pub pit_filter: PitFilter,
}

impl PitFilterForVolumes {
    /// Wrap a point filter
    pub fn new(pit_filter: PitFilter) -> Self {
        Self { pit_filter }
    }
}

/// `0001-01-01T00:00:00Z`, the zero value of an instant
pub fn is_zero_instant(t: &DateTime<Utc>) -> bool {
    t.year() == 1 && t.ordinal() == 1 && t.num_seconds_from_midnight() == 0 && t.nanosecond() == 0
}

/// Parse an optional RFC3339 (nanosecond precision) request parameter
pub fn parse_timestamp(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| Error::InvalidTimestamp {
                field: field.to_string(),
                reason: e.to_string(),
            }),
    }
}
