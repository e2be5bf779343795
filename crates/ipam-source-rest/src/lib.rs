// # IPAM REST Source
//
// This crate provides the list and lookup collaborators backed by the IPAM
// REST API (`/api/v2/`).
//
// ## Behavior
//
// - One HTTP GET per `fetch_page` / `fetch_lookup` call
// - Errors are mapped by HTTP status and returned as-is
// - 30 second request timeout
// - No retry, no caching, no background tasks: the fetch coordinator owns
//   sequencing, staleness and failure handling
//
// ## Wire Format
//
// ```http
// GET /api/v2/hosts/?hostname=web&ordering=-expires&page=1&page_size=10
// Authorization: Bearer <token>
//
// { "count": 42, "next": "http://.../hosts/?page=2", "previous": null,
//   "results": [ { "mac": "...", ... } ] }
// ```
//
// Lookup endpoints (`address-types/`, `dns-types/`) answer either with the
// same envelope or with a bare array of `{ "id", "name" }` objects.
//
// ## Security
//
// - The API token never appears in logs or Debug output
// - Construction fails fast on an empty token

use async_trait::async_trait;
use ipam_view_core::config::SourceConfig;
use ipam_view_core::traits::{
    ListRequest, ListSource, ListSourceFactory, LookupEntry, LookupSource, PageResult, Row,
    SourceHandle,
};
use ipam_view_core::{Error, Result, SourceRegistry};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size asked of lookup endpoints, large enough for every vocabulary
const LOOKUP_PAGE_SIZE: u32 = 1000;

const SOURCE_NAME: &str = "rest";

/// REST collaborator for one IPAM backend
///
/// Serves both [`ListSource`] and [`LookupSource`] from one HTTP client.
pub struct RestSource {
    /// API root, always ending in `/`
    base_url: Url,

    /// API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for RestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSource")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

impl RestSource {
    /// Create a REST source
    ///
    /// # Parameters
    ///
    /// - `base_url`: API root, e.g. `https://ipam.example.edu/api/v2/`
    /// - `api_token`: Bearer token of the operator
    ///
    /// # Errors
    ///
    /// `Error::Config` for an unparsable URL or an empty token.
    pub fn new(base_url: &str, api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("IPAM API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: normalize_base(base_url)?,
            api_token,
            client,
        })
    }

    /// API root this source talks to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full URL of `endpoint` (query string not included)
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| Error::invalid_input(format!("Invalid endpoint {}: {}", endpoint, e)))
    }

    async fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<String> {
        let url = self.endpoint_url(endpoint)?;
        tracing::debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(&self.api_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, endpoint, &error_text));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read {} response: {}", endpoint, e)))
    }
}

fn normalize_base(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };

    let url = Url::parse(&with_slash)
        .map_err(|e| Error::config(format!("Invalid IPAM API URL {}: {}", base_url, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::config(format!(
            "IPAM API URL must be http or https, got {}",
            other
        ))),
    }
}

/// Map a non-success status to an error
fn status_error(status: StatusCode, endpoint: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Access to {} denied: invalid token or insufficient permissions. Status: {}",
            endpoint, status
        )),
        404 => Error::not_found(format!("Endpoint not found: {}", endpoint)),
        429 => Error::rate_limited(format!(
            "Rate limit exceeded on {}. Status: {}",
            endpoint, status
        )),
        500..=599 => Error::source(
            SOURCE_NAME,
            format!("Server error (transient) on {}: {} - {}", endpoint, status, body),
        ),
        // 400 is how the backend rejects malformed filter values
        _ => Error::http(format!("{} rejected: {} - {}", endpoint, status, body)),
    }
}

/// Paginated list envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    next: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody {
    Paged(Envelope),
    Bare(Vec<Value>),
}

/// Parse a list response body into a page
///
/// An unpaginated (bare array) response is one complete page.
pub fn parse_page(body: &str) -> Result<PageResult> {
    let parsed: ListBody = serde_json::from_str(body)?;
    let page = match parsed {
        ListBody::Paged(envelope) => {
            let has_next = envelope
                .next
                .as_ref()
                .is_some_and(|next| !next.is_null() && next.as_str() != Some(""));
            PageResult {
                total_count: envelope.count.unwrap_or(envelope.results.len() as u64),
                items: envelope.results.into_iter().map(Row::new).collect(),
                has_next,
            }
        }
        ListBody::Bare(items) => PageResult {
            total_count: items.len() as u64,
            items: items.into_iter().map(Row::new).collect(),
            has_next: false,
        },
    };
    Ok(page)
}

/// Parse a lookup response body
///
/// Entries without a numeric `id` or a `name` are skipped.
pub fn parse_lookup(body: &str) -> Result<Vec<LookupEntry>> {
    let page = parse_page(body)?;
    let entries = page
        .items
        .iter()
        .filter_map(|row| {
            let id = row.get("id")?.as_i64()?;
            let name = row.get("name")?.as_str()?;
            Some(LookupEntry {
                id,
                name: name.to_string(),
            })
        })
        .collect::<Vec<_>>();

    if entries.len() < page.items.len() {
        tracing::warn!(
            "Skipped {} malformed lookup entries",
            page.items.len() - entries.len()
        );
    }
    Ok(entries)
}

#[async_trait]
impl ListSource for RestSource {
    async fn fetch_page(&self, request: &ListRequest) -> Result<PageResult> {
        let body = self.get(&request.endpoint, &request.params).await?;
        let page = parse_page(&body).map_err(|e| {
            Error::list_source(format!(
                "Unexpected response from {}: {}",
                request.endpoint, e
            ))
        })?;

        tracing::debug!(
            "{} page {}: {} rows of {} (more: {})",
            request.endpoint,
            request.page(),
            page.items.len(),
            page.total_count,
            page.has_next
        );
        Ok(page)
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

#[async_trait]
impl LookupSource for RestSource {
    async fn fetch_lookup(&self, endpoint: &str) -> Result<Vec<LookupEntry>> {
        let params = [("page_size".to_string(), LOOKUP_PAGE_SIZE.to_string())];
        let body = self.get(endpoint, &params).await?;
        let entries = parse_lookup(&body).map_err(|e| {
            Error::lookup_source(format!("Unexpected response from {}: {}", endpoint, e))
        })?;

        tracing::debug!("Lookup {}: {} entries", endpoint, entries.len());
        Ok(entries)
    }
}

/// Factory for creating REST sources
pub struct RestFactory;

impl ListSourceFactory for RestFactory {
    fn create(&self, config: &SourceConfig) -> Result<SourceHandle> {
        match config {
            SourceConfig::Rest {
                base_url,
                api_token,
            } => {
                if api_token.is_empty() {
                    return Err(Error::config("IPAM API token is required"));
                }
                let source = RestSource::new(base_url, api_token.clone())?;
                tracing::info!("REST source ready at {}", source.base_url());
                Ok(SourceHandle::from_shared(Arc::new(source)))
            }
            _ => Err(Error::config("Invalid config for REST source")),
        }
    }
}

/// Register the REST source with a registry
///
/// # Example
///
/// ```rust
/// use ipam_view_core::SourceRegistry;
///
/// let registry = SourceRegistry::with_builtin_stores();
/// ipam_source_rest::register(&registry);
/// assert!(registry.has_source("rest"));
/// ```
pub fn register(registry: &SourceRegistry) {
    registry.register_source(SOURCE_NAME, Box::new(RestFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: &str) -> SourceConfig {
        SourceConfig::Rest {
            base_url: "https://ipam.example.edu/api/v2".to_string(),
            api_token: token.to_string(),
        }
    }

    #[test]
    fn test_factory_creation() {
        let handle = RestFactory.create(&config("test_token")).unwrap();
        assert_eq!(handle.list.source_name(), "rest");
    }

    #[test]
    fn test_factory_missing_token() {
        assert!(matches!(
            RestFactory.create(&config("")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_factory_rejects_custom_config() {
        let custom = SourceConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::json!({}),
        };
        assert!(RestFactory.create(&custom).is_err());
    }

    #[test]
    fn test_base_url_normalization() {
        let source = RestSource::new("http://localhost:8000/api/v2", "t").unwrap();
        assert_eq!(source.base_url().as_str(), "http://localhost:8000/api/v2/");
        assert_eq!(
            source.endpoint_url("hosts/").unwrap().as_str(),
            "http://localhost:8000/api/v2/hosts/"
        );
        assert_eq!(
            source.endpoint_url("/dns-types/").unwrap().as_str(),
            "http://localhost:8000/api/v2/dns-types/"
        );

        assert!(RestSource::new("ftp://ipam.example.edu/", "t").is_err());
        assert!(RestSource::new("not a url", "t").is_err());
    }

    #[test]
    fn test_parse_paginated_page() {
        let body = r#"{
            "count": 42,
            "next": "http://localhost:8000/api/v2/hosts/?page=2",
            "previous": null,
            "results": [{"mac": "00:11:22:33:44:55"}, {"mac": "00:11:22:33:44:66"}]
        }"#;

        let page = parse_page(body).unwrap();
        assert_eq!(page.total_count, 42);
        assert!(page.has_next);
        assert_eq!(
            page.items[1].key("mac").as_deref(),
            Some("00:11:22:33:44:66")
        );
    }

    #[test]
    fn test_parse_last_and_bare_pages() {
        let last = parse_page(r#"{"count": 1, "next": null, "results": [{"id": 3}]}"#).unwrap();
        assert!(!last.has_next);
        assert_eq!(last.items[0].key("id").as_deref(), Some("3"));

        let bare = parse_page(r#"[{"id": 1}, {"id": 2}]"#).unwrap();
        assert_eq!(bare.total_count, 2);
        assert!(!bare.has_next);

        assert!(parse_page("<html>oops</html>").is_err());
    }

    #[test]
    fn test_parse_lookup_shapes() {
        let body = r#"{"count": 2, "results": [
            {"id": 1, "name": "dynamic"},
            {"id": 2, "name": "static"}
        ]}"#;
        let enveloped = parse_lookup(body).unwrap();
        assert_eq!(
            enveloped,
            vec![
                LookupEntry {
                    id: 1,
                    name: "dynamic".to_string()
                },
                LookupEntry {
                    id: 2,
                    name: "static".to_string()
                },
            ]
        );

        let bare = parse_lookup(r#"[{"id": 1, "name": "A"}, {"name": "broken"}]"#).unwrap();
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "hosts/", ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "hosts/", ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "hosts/", ""),
            Error::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "hosts/", ""),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "hosts/", ""),
            Error::Source { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "hosts/", "bad date"),
            Error::Http(_)
        ));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let source = RestSource::new("https://ipam.example.edu/api/v2/", "secret_token_12345")
            .unwrap();

        let debug_str = format!("{:?}", source);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("RestSource"));
    }

    #[test]
    fn test_register() {
        let registry = SourceRegistry::new();
        register(&registry);
        assert!(registry.has_source("rest"));
        assert!(registry.create_source(&config("token")).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_http_error() {
        let source = RestSource::new("http://127.0.0.1:9/api/v2/", "token").unwrap();
        let request = ListRequest::new("hosts/").with_param("page", "1");
        let err = source.fetch_page(&request).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
