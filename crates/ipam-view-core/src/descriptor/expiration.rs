//! Expiration buckets and address-type resolution
//!
//! Both fields carry backend-specific semantics that do not fit the generic
//! filter kinds: the expiration filter is a named bucket evaluated against
//! the current instant, and the address type filter takes a human-readable
//! name that must be translated to the backend's numeric id.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::traits::LookupEntry;

/// Wire format for date bounds (ISO date, truncated to the day)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Named expiration bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpirationBucket {
    #[serde(rename = "Expired")]
    Expired,
    #[serde(rename = "1 Day Left")]
    OneDayLeft,
    #[serde(rename = "7 Days Left")]
    SevenDaysLeft,
    #[serde(rename = "30 Days Left")]
    ThirtyDaysLeft,
    #[serde(rename = "Unexpired")]
    Unexpired,
}

impl ExpirationBucket {
    /// Every bucket, in the order they are offered to the operator
    pub const ALL: [ExpirationBucket; 5] = [
        ExpirationBucket::Expired,
        ExpirationBucket::OneDayLeft,
        ExpirationBucket::SevenDaysLeft,
        ExpirationBucket::ThirtyDaysLeft,
        ExpirationBucket::Unexpired,
    ];

    /// Display label, also the persisted and parsed form
    pub fn label(&self) -> &'static str {
        match self {
            ExpirationBucket::Expired => "Expired",
            ExpirationBucket::OneDayLeft => "1 Day Left",
            ExpirationBucket::SevenDaysLeft => "7 Days Left",
            ExpirationBucket::ThirtyDaysLeft => "30 Days Left",
            ExpirationBucket::Unexpired => "Unexpired",
        }
    }

    /// Map the bucket to a `(lower, upper)` bound pair evaluated at `now`
    ///
    /// A `None` side means "unbounded" and produces no parameter.
    pub fn bounds(&self, now: DateTime<Utc>) -> (Option<String>, Option<String>) {
        let day = |t: DateTime<Utc>| t.format(DATE_FORMAT).to_string();
        let days_ahead = |n: i64| Some(day(now + Duration::days(n)));

        match self {
            ExpirationBucket::Expired => (None, Some(day(now))),
            ExpirationBucket::OneDayLeft => (Some(day(now)), days_ahead(1)),
            ExpirationBucket::SevenDaysLeft => (Some(day(now)), days_ahead(7)),
            ExpirationBucket::ThirtyDaysLeft => (Some(day(now)), days_ahead(30)),
            ExpirationBucket::Unexpired => (Some(day(now)), None),
        }
    }
}

impl fmt::Display for ExpirationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExpirationBucket {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|bucket| bucket.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                crate::Error::invalid_input(format!("Unknown expiration bucket: {}", s))
            })
    }
}

/// Address type name → backend id table
///
/// Loaded once per controller from the lookup collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTypeTable {
    by_name: HashMap<String, i64>,
}

impl AddressTypeTable {
    /// Build the table from lookup entries
    pub fn from_entries(entries: impl IntoIterator<Item = LookupEntry>) -> Self {
        let by_name = entries
            .into_iter()
            .map(|entry| (entry.name.to_lowercase(), entry.id))
            .collect();
        Self { by_name }
    }

    /// Resolve a name (case-insensitive) to its id
    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.by_name.get(&name.trim().to_lowercase()).copied()
    }

    /// Wire value for `name`: the id when known, the name itself otherwise
    pub fn wire_value(&self, name: &str) -> String {
        match self.resolve(name) {
            Some(id) => id.to_string(),
            None => name.to_string(),
        }
    }

    /// Number of known types
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
