//! Configuration types for the IPAM view core
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Remote source configuration
    pub source: SourceConfig,

    /// Key-value store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Optional view settings
    #[serde(default)]
    pub view: ViewConfig,
}

impl ConsoleConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            source: SourceConfig::default(),
            store: StoreConfig::default(),
            view: ViewConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.source.validate()?;
        self.store.validate()?;
        self.view.validate()?;
        Ok(())
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote source configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// openIPAM REST API v2
    Rest {
        /// API base URL (e.g. "https://ipam.example.edu/api/v2/")
        base_url: String,
        /// Bearer token
        api_token: String,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Rest {
                base_url,
                api_token,
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("REST base URL cannot be empty"));
                }
                if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "REST base URL must use HTTP or HTTPS scheme. Got: {}",
                        base_url
                    )));
                }
                if api_token.is_empty() {
                    return Err(crate::Error::config("REST API token cannot be empty"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom source config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Rest { .. } => "rest",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Rest {
            base_url: String::new(),
            api_token: String::new(),
        }
    }
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceConfig::Rest { base_url, .. } => f
                .debug_struct("Rest")
                .field("base_url", base_url)
                .field("api_token", &"<REDACTED>")
                .finish(),
            SourceConfig::Custom { factory, config } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", config)
                .finish(),
        }
    }
}

/// Short form for log lines; never includes the token
impl std::fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceConfig::Rest { base_url, .. } => write!(f, "rest ({})", base_url),
            SourceConfig::Custom { factory, .. } => write!(f, "custom ({})", factory),
        }
    }
}

/// Key-value store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Store file path cannot be empty"))
            }
            StoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// View (table) settings shared by every screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Page bound for auto-prefetch screens when "select all" is off
    ///
    /// Earlier console builds used 1 and 3 here; it is a policy knob, not a
    /// constant. `None` means unbounded.
    #[serde(default = "default_prefetch_max_pages")]
    pub prefetch_max_pages: Option<u32>,

    /// Capacity of the view event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 256 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Page sizes offered to the operator
    #[serde(default = "default_page_size_options")]
    pub page_size_options: Vec<u32>,
}

impl ViewConfig {
    /// Validate the view settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.page_size_options.is_empty() {
            return Err(crate::Error::config("At least one page size is required"));
        }
        if self.page_size_options.contains(&0) {
            return Err(crate::Error::config("Page sizes must be positive"));
        }
        if self.prefetch_max_pages == Some(0) {
            return Err(crate::Error::config("Prefetch page bound must be > 0"));
        }
        Ok(())
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            prefetch_max_pages: default_prefetch_max_pages(),
            event_channel_capacity: default_event_channel_capacity(),
            page_size_options: default_page_size_options(),
        }
    }
}

fn default_prefetch_max_pages() -> Option<u32> {
    Some(3)
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_page_size_options() -> Vec<u32> {
    vec![10, 25, 50, 100, 250]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_config_defaults_from_empty_json() {
        let config: ViewConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.prefetch_max_pages, Some(3));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.page_size_options, vec![10, 25, 50, 100, 250]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rest_source_requires_token_and_scheme() {
        let missing_token = SourceConfig::Rest {
            base_url: "https://ipam.example.edu/api/v2/".to_string(),
            api_token: String::new(),
        };
        assert!(missing_token.validate().is_err());

        let bad_scheme = SourceConfig::Rest {
            base_url: "ftp://ipam.example.edu/".to_string(),
            api_token: "token".to_string(),
        };
        assert!(bad_scheme.validate().is_err());
    }

    #[test]
    fn test_source_display_hides_token() {
        let config = SourceConfig::Rest {
            base_url: "https://ipam.example.edu/api/v2/".to_string(),
            api_token: "super-secret".to_string(),
        };
        assert!(!config.to_string().contains("super-secret"));

        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<REDACTED>"));

        let console = ConsoleConfig {
            source: config,
            ..ConsoleConfig::default()
        };
        assert!(!format!("{:?}", console).contains("super-secret"));
    }

    #[test]
    fn test_tagged_store_config() {
        let store: StoreConfig =
            serde_json::from_str(r#"{"type":"file","path":"/tmp/views.json"}"#).unwrap();
        assert_eq!(store.type_name(), "file");
        assert!(store.validate().is_ok());
    }
}
