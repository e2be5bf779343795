//! Column and filter descriptor registry
//!
//! A [`TableSchema`] is the declarative description of one screen's table:
//! which fields exist, how each one filters, which ones sort, which are
//! visible by default, and which endpoint serves the rows.
//!
//! Filter kinds are a closed set. Each kind owns its wire mapping, so request
//! derivation is an exhaustive match rather than a lookup in a property bag:
//!
//! | Kind          | Value                    | Parameters                           |
//! |---------------|--------------------------|--------------------------------------|
//! | `Text`        | `Text(s)`                | `param=s`                            |
//! | `ExactMatch`  | `Exact(s)`               | `param=s`                            |
//! | `Boolean`     | `Flag(b)`                | `param=true` / `param=false`         |
//! | `DateRange`   | `DateRange { from, to }` | `lower=from`, `upper=to` (each opt.) |
//! | `Expiration`  | `Expiration(bucket)`     | bucket bounds against "now"          |
//! | `AddressType` | `AddressType(name)`      | `param=<id>` (name if unresolved)    |

pub mod expiration;

pub use expiration::{AddressTypeTable, ExpirationBucket, DATE_FORMAT};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::coordinator::FetchMode;
use crate::error::{Error, Result};
use crate::query::FilterValue;

/// Closed set of filter kinds with their wire mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    /// Substring/prefix query
    Text { param: String },

    /// One value drawn from a finite option set
    ExactMatch { param: String, options: Vec<String> },

    /// Tri-state boolean; only set states produce a parameter
    Boolean { param: String },

    /// Independent lower/upper bounds (`field__gt` / `field__lt`)
    DateRange { lower: String, upper: String },

    /// Named bucket mapped to bounds at request time
    Expiration { lower: String, upper: String },

    /// Human name resolved to a backend id
    AddressType { param: String },
}

impl FilterKind {
    /// Short kind name for messages
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Text { .. } => "text",
            FilterKind::ExactMatch { .. } => "exact",
            FilterKind::Boolean { .. } => "boolean",
            FilterKind::DateRange { .. } => "date range",
            FilterKind::Expiration { .. } => "expiration",
            FilterKind::AddressType { .. } => "address type",
        }
    }
}

/// Inputs that serialization needs beyond the value itself
#[derive(Debug, Clone, Copy)]
pub struct SerializeContext<'a> {
    /// Instant expiration buckets are evaluated against
    pub now: DateTime<Utc>,
    /// Address type table (may be empty if not loaded)
    pub address_types: &'a AddressTypeTable,
}

/// Filter definition attached to a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptor {
    /// Kind and wire mapping
    pub kind: FilterKind,
    /// Lookup endpoint that fills exact-match options
    pub options_endpoint: Option<String>,
}

impl FilterDescriptor {
    /// Wrap a kind
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            options_endpoint: None,
        }
    }

    pub fn text(param: impl Into<String>) -> Self {
        Self::new(FilterKind::Text {
            param: param.into(),
        })
    }

    pub fn exact<I, S>(param: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FilterKind::ExactMatch {
            param: param.into(),
            options: options.into_iter().map(Into::into).collect(),
        })
    }

    pub fn boolean(param: impl Into<String>) -> Self {
        Self::new(FilterKind::Boolean {
            param: param.into(),
        })
    }

    /// Date range on `field`, mapped to `field__gt` / `field__lt`
    pub fn date_range(field: &str) -> Self {
        Self::new(FilterKind::DateRange {
            lower: format!("{}__gt", field),
            upper: format!("{}__lt", field),
        })
    }

    /// Expiration buckets on `field`, mapped to `field__gt` / `field__lt`
    pub fn expiration(field: &str) -> Self {
        Self::new(FilterKind::Expiration {
            lower: format!("{}__gt", field),
            upper: format!("{}__lt", field),
        })
    }

    pub fn address_type(param: impl Into<String>) -> Self {
        Self::new(FilterKind::AddressType {
            param: param.into(),
        })
    }

    /// Fill exact-match options from `endpoint` when the controller asks
    pub fn with_options_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.options_endpoint = Some(endpoint.into());
        self
    }

    /// Whether `value` has the shape this kind expects
    pub fn accepts(&self, value: &FilterValue) -> bool {
        matches!(
            (&self.kind, value),
            (FilterKind::Text { .. }, FilterValue::Text(_))
                | (FilterKind::ExactMatch { .. }, FilterValue::Exact(_))
                | (FilterKind::Boolean { .. }, FilterValue::Flag(_))
                | (FilterKind::DateRange { .. }, FilterValue::DateRange { .. })
                | (FilterKind::Expiration { .. }, FilterValue::Expiration(_))
                | (FilterKind::AddressType { .. }, FilterValue::AddressType(_))
        )
    }

    /// Parse operator text into a value of this kind
    ///
    /// Booleans take `true/false`, `y/n`, `yes/no` or `1/0`. Date ranges are
    /// written `from..to`, either side optional. Blank input of any kind
    /// yields `None`, meaning the predicate should be cleared.
    pub fn parse_value(&self, raw: &str) -> Result<Option<FilterValue>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let value = match &self.kind {
            FilterKind::Text { .. } => FilterValue::Text(raw.to_string()),
            FilterKind::ExactMatch { .. } => FilterValue::Exact(raw.to_string()),
            FilterKind::AddressType { .. } => FilterValue::AddressType(raw.to_string()),
            FilterKind::Boolean { .. } => match raw.to_ascii_lowercase().as_str() {
                "true" | "y" | "yes" | "1" => FilterValue::Flag(true),
                "false" | "n" | "no" | "0" => FilterValue::Flag(false),
                other => {
                    return Err(Error::invalid_input(format!(
                        "Not a boolean: {}",
                        other
                    )));
                }
            },
            FilterKind::DateRange { .. } => {
                let (from, to) = raw.split_once("..").unwrap_or((raw, ""));
                let side = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
                FilterValue::DateRange {
                    from: side(from),
                    to: side(to),
                }
            }
            FilterKind::Expiration { .. } => FilterValue::Expiration(raw.parse()?),
        };
        Ok(Some(value).filter(|v| !v.is_empty()))
    }

    /// Current exact-match options (empty for other kinds)
    pub fn options(&self) -> &[String] {
        match &self.kind {
            FilterKind::ExactMatch { options, .. } => options,
            _ => &[],
        }
    }

    /// Turn a value into wire parameters
    ///
    /// Values are not validated beyond their shape: a malformed date goes to
    /// the backend as typed, and its rejection surfaces as a fetch failure.
    pub fn serialize(
        &self,
        value: &FilterValue,
        ctx: &SerializeContext<'_>,
    ) -> Result<Vec<(String, String)>> {
        if value.is_empty() {
            return Ok(Vec::new());
        }

        let params = match (&self.kind, value) {
            (FilterKind::Text { param }, FilterValue::Text(text))
            | (FilterKind::ExactMatch { param, .. }, FilterValue::Exact(text)) => {
                vec![(param.clone(), text.clone())]
            }
            (FilterKind::Boolean { param }, FilterValue::Flag(flag)) => {
                vec![(param.clone(), flag.to_string())]
            }
            (FilterKind::DateRange { lower, upper }, FilterValue::DateRange { from, to }) => {
                bound_params(lower, upper, from.clone(), to.clone())
            }
            (FilterKind::Expiration { lower, upper }, FilterValue::Expiration(bucket)) => {
                let (from, to) = bucket.bounds(ctx.now);
                bound_params(lower, upper, from, to)
            }
            (FilterKind::AddressType { param }, FilterValue::AddressType(name)) => {
                vec![(param.clone(), ctx.address_types.wire_value(name))]
            }
            (kind, value) => {
                return Err(Error::invalid_input(format!(
                    "{} filter cannot take {} value",
                    kind.name(),
                    value.kind_name()
                )));
            }
        };

        Ok(params)
    }
}

fn bound_params(
    lower: &str,
    upper: &str,
    from: Option<String>,
    to: Option<String>,
) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(2);
    if let Some(from) = from.filter(|s| !s.is_empty()) {
        params.push((lower.to_string(), from));
    }
    if let Some(to) = to.filter(|s| !s.is_empty()) {
        params.push((upper.to_string(), to));
    }
    params
}

/// One table column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Stable field id
    pub id: String,
    /// Display header
    pub header: String,
    /// Whether the column can be part of the ordering
    pub sortable: bool,
    /// Visible when nothing is persisted
    pub default_visible: bool,
    /// Whether the operator may hide it
    pub hideable: bool,
    /// Filter, if the column is filterable
    pub filter: Option<FilterDescriptor>,
}

impl ColumnDescriptor {
    /// A visible, hideable, unsorted, unfiltered column
    pub fn new(id: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            header: header.into(),
            sortable: false,
            default_visible: true,
            hideable: true,
            filter: None,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.default_visible = false;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.hideable = false;
        self
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Declarative schema of one screen's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Screen name; also the persistence key prefix
    pub screen: String,
    /// List endpoint relative to the API base
    pub endpoint: String,
    /// Row field holding the stable identifier
    pub key_field: String,
    /// Columns in display order
    pub columns: Vec<ColumnDescriptor>,
    /// Allowed page sizes
    pub page_size_options: Vec<u32>,
    /// Page size used when nothing is persisted
    pub default_page_size: u32,
    /// Paging policy
    pub fetch_mode: FetchMode,
    /// Whether filters/sort/page round-trip through the store
    pub persist_query: bool,
    /// Lookup endpoint for address types, when the schema needs them
    pub lookup_endpoint: Option<String>,
}

impl TableSchema {
    /// Look up a column
    pub fn column(&self, field: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.id == field)
    }

    /// Look up a column, failing for unregistered fields
    pub fn require_column(&self, field: &str) -> Result<&ColumnDescriptor> {
        self.column(field)
            .ok_or_else(|| Error::unknown_field(format!("{}.{}", self.screen, field)))
    }

    /// Filter attached to `field`
    pub fn filter(&self, field: &str) -> Result<&FilterDescriptor> {
        self.require_column(field)?.filter.as_ref().ok_or_else(|| {
            Error::invalid_input(format!("{}.{} is not filterable", self.screen, field))
        })
    }

    /// Whether `field` is registered and sortable
    pub fn is_sortable(&self, field: &str) -> bool {
        self.column(field).is_some_and(|c| c.sortable)
    }

    /// Whether `size` is an allowed page size
    pub fn allows_page_size(&self, size: u32) -> bool {
        self.page_size_options.contains(&size)
    }

    /// Check that `value` may be stored for `field`
    ///
    /// The kind must match even for an empty value; unset a boolean or
    /// expiration filter with `QueryState::clear_filter`.
    pub fn check_value(&self, field: &str, value: &FilterValue) -> Result<()> {
        let filter = self.filter(field)?;
        if filter.accepts(value) {
            Ok(())
        } else {
            Err(Error::invalid_input(format!(
                "{}.{} is a {} filter, got a {} value",
                self.screen,
                field,
                filter.kind.name(),
                value.kind_name()
            )))
        }
    }

    /// Serialize the predicate on `field`
    pub fn serialize_filter(
        &self,
        field: &str,
        value: &FilterValue,
        ctx: &SerializeContext<'_>,
    ) -> Result<Vec<(String, String)>> {
        self.filter(field)?.serialize(value, ctx)
    }

    /// Default visibility for every column
    pub fn default_visibility(&self) -> BTreeMap<String, bool> {
        self.columns
            .iter()
            .map(|c| (c.id.clone(), c.default_visible))
            .collect()
    }

    /// Replace the option set of an exact-match filter
    pub fn set_options(&mut self, field: &str, new_options: Vec<String>) -> Result<()> {
        let screen = self.screen.clone();
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.id == field)
            .ok_or_else(|| Error::unknown_field(format!("{}.{}", screen, field)))?;

        match column.filter.as_mut().map(|f| &mut f.kind) {
            Some(FilterKind::ExactMatch { options, .. }) => {
                *options = new_options;
                Ok(())
            }
            _ => Err(Error::invalid_input(format!(
                "{}.{} is not an exact-match filter",
                screen, field
            ))),
        }
    }

    /// Whether any column filters by address type
    pub fn uses_address_types(&self) -> bool {
        self.columns.iter().any(|c| {
            matches!(
                c.filter.as_ref().map(|f| &f.kind),
                Some(FilterKind::AddressType { .. })
            )
        })
    }

    /// Restrict the offered page sizes, keeping the default valid
    pub fn with_page_size_options(mut self, options: &[u32]) -> Self {
        if options.is_empty() {
            return self;
        }
        self.page_size_options = options.to_vec();
        if !self.allows_page_size(self.default_page_size) {
            self.default_page_size = options[0];
        }
        self
    }
}
