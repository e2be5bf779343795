//! Error type of the view core
//!
//! Errors fall in two groups. Remote errors come from the list, lookup and
//! HTTP collaborators; the fetch coordinator turns them into a failed fetch
//! status and never retries on its own. Local errors (bad input, unknown
//! fields, configuration, the key-value store) are returned to the caller
//! that triggered them.

use thiserror::Error;

/// Result type alias for view operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // ---- remote ----
    /// Paged-list endpoint failed outside of HTTP status handling
    #[error("List source error: {0}")]
    ListSource(String),

    /// Lookup/vocabulary endpoint failed
    #[error("Lookup source error: {0}")]
    LookupSource(String),

    /// Transport failure or an unexpected status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Token missing, expired or not allowed to see the endpoint
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Endpoint or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend-specific failure, tagged with the source name
    #[error("Source error ({source_name}): {message}")]
    Source {
        source_name: String,
        message: String,
    },

    // ---- local ----
    /// Operator input the schema rejects (page size, value kind, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Field is not registered in the screen's schema
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store failure
    #[error("Store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted record or response body
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn list_source(msg: impl Into<String>) -> Self {
        Self::ListSource(msg.into())
    }

    pub fn lookup_source(msg: impl Into<String>) -> Self {
        Self::LookupSource(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Backend-specific failure of `source_name`
    pub fn source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField(field.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether the failure happened on the far side of a collaborator
    ///
    /// Remote failures are expected operating conditions (backend down,
    /// token expired) and are logged as warnings; anything else is a bug or
    /// a misconfiguration.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::ListSource(_)
                | Self::LookupSource(_)
                | Self::Http(_)
                | Self::Authentication(_)
                | Self::RateLimited(_)
                | Self::NotFound(_)
                | Self::Source { .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{:#}", err))
    }
}
