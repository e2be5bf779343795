// # ipam-console - IPAM table view driver
//
// This binary is a THIN integration layer over ipam-view-core:
// - Query state, request derivation and fetch sequencing live in the core
// - Remote access lives in ipam-source-rest
// - Configuration is via environment variables ONLY
//
// The ipam-console binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and logging
// 3. Registering the REST source and the stores
// 4. Opening one screen, applying the requested query and printing the rows
//
// ## Configuration
//
// ### Source
// - `IPAM_API_URL`: API base URL (e.g. https://ipam.example.edu/api/v2/)
// - `IPAM_API_TOKEN`: Bearer token
//
// ### Screen and query
// - `IPAM_SCREEN`: Screen name (hosts, my_hosts, dns_records, domain_dns,
//   dhcp_records, addresses, domains, users). Default: hosts
// - `IPAM_SCOPE`: Fixed base parameters, `key=value;key=value`
// - `IPAM_QUICK_FILTER`: `mine:<username>`, `group` or `changed_by:<username>`
// - `IPAM_FILTERS`: Column filters, `field=value;field=value`
// - `IPAM_SORT`: Ordering, primary key first, `-expires,hostname`
// - `IPAM_SEARCH`: Advanced search token ids, comma-separated
// - `IPAM_PAGE`: 1-based page
// - `IPAM_PAGE_SIZE`: Rows per page
// - `IPAM_SELECT_ALL`: Load and select every matching row (true/false)
//
// ### View
// - `IPAM_PREFETCH_PAGES`: Auto-prefetch page bound, or `unbounded`
// - `IPAM_FETCH_TIMEOUT_SECS`: Give up waiting for rows after this long
// - `IPAM_OUTPUT`: `table` or `json`
//
// ### State Store
// - `IPAM_STORE_TYPE`: Type of store (file, memory)
// - `IPAM_STORE_PATH`: Path to store file (for file store)
//
// ## Example
//
// ```bash
// export IPAM_API_URL=https://ipam.example.edu/api/v2/
// export IPAM_API_TOKEN=your_token
// export IPAM_SCREEN=hosts
// export IPAM_FILTERS="hostname=web;expires=7 Days Left"
// export IPAM_SORT=-expires
// export IPAM_STORE_TYPE=file
// export IPAM_STORE_PATH=/var/lib/ipam-console/state.json
//
// ipam-console
// ```

use anyhow::{Context, Result};
use ipam_view_core::query::StateChange;
use ipam_view_core::{
    ConsoleConfig, FetchStatus, QueryState, QuickFilter, Row, SortDirection, SourceConfig,
    SourceRegistry, StoreConfig, TableSchema, ViewConfig, ViewController, screens,
};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Rows printed
/// - 1: Configuration or startup error
/// - 2: Runtime error (fetch failed, timed out or interrupted)
#[derive(Debug, Clone, Copy)]
enum ConsoleExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ConsoleExitCode> for ExitCode {
    fn from(code: ConsoleExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
}

/// Query settings applied on top of whatever the store restored
#[derive(Debug, Default)]
struct QuerySettings {
    scope: Vec<(String, String)>,
    quick_filter: Option<QuickFilter>,
    filters: Vec<(String, String)>,
    sort: Vec<(String, SortDirection)>,
    search: Vec<String>,
    page: Option<u32>,
    page_size: Option<u32>,
    select_all: bool,
}

/// Application configuration
struct Config {
    api_url: String,
    api_token: String,
    screen: String,
    query: QuerySettings,
    prefetch_pages: Option<u32>,
    fetch_timeout: Duration,
    output: OutputFormat,
    store_type: String,
    store_path: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let api_url = env::var("IPAM_API_URL").context("IPAM_API_URL is not set")?;
        let api_token = env::var("IPAM_API_TOKEN").context("IPAM_API_TOKEN is not set")?;
        let screen = env::var("IPAM_SCREEN").unwrap_or_else(|_| "hosts".to_string());

        let query = QuerySettings {
            scope: optional_var("IPAM_SCOPE")
                .map(|raw| parse_pairs(&raw))
                .transpose()
                .context("Invalid IPAM_SCOPE")?
                .unwrap_or_default(),
            quick_filter: optional_var("IPAM_QUICK_FILTER")
                .map(|raw| parse_quick_filter(&raw))
                .transpose()
                .context("Invalid IPAM_QUICK_FILTER")?,
            filters: optional_var("IPAM_FILTERS")
                .map(|raw| parse_pairs(&raw))
                .transpose()
                .context("Invalid IPAM_FILTERS")?
                .unwrap_or_default(),
            sort: optional_var("IPAM_SORT")
                .map(|raw| parse_sort(&raw))
                .unwrap_or_default(),
            search: optional_var("IPAM_SEARCH")
                .map(|raw| split_list(&raw, ','))
                .unwrap_or_default(),
            page: optional_var("IPAM_PAGE")
                .map(|raw| raw.parse())
                .transpose()
                .context("IPAM_PAGE must be a positive integer")?,
            page_size: optional_var("IPAM_PAGE_SIZE")
                .map(|raw| raw.parse())
                .transpose()
                .context("IPAM_PAGE_SIZE must be a positive integer")?,
            select_all: optional_var("IPAM_SELECT_ALL")
                .map(|raw| parse_bool(&raw))
                .transpose()
                .context("Invalid IPAM_SELECT_ALL")?
                .unwrap_or(false),
        };

        let prefetch_pages = match optional_var("IPAM_PREFETCH_PAGES") {
            None => ViewConfig::default().prefetch_max_pages,
            Some(raw) if raw.eq_ignore_ascii_case("unbounded") => None,
            Some(raw) => Some(
                raw.parse()
                    .context("IPAM_PREFETCH_PAGES must be a number or 'unbounded'")?,
            ),
        };

        let fetch_timeout = Duration::from_secs(
            optional_var("IPAM_FETCH_TIMEOUT_SECS")
                .map(|raw| raw.parse())
                .transpose()
                .context("IPAM_FETCH_TIMEOUT_SECS must be a number of seconds")?
                .unwrap_or(60),
        );

        let output = match optional_var("IPAM_OUTPUT").as_deref() {
            None | Some("table") => OutputFormat::Table,
            Some("json") => OutputFormat::Json,
            Some(other) => anyhow::bail!("IPAM_OUTPUT must be 'table' or 'json', got '{}'", other),
        };

        Ok(Config {
            api_url,
            api_token,
            screen,
            query,
            prefetch_pages,
            fetch_timeout,
            output,
            store_type: env::var("IPAM_STORE_TYPE").unwrap_or_else(|_| "memory".to_string()),
            store_path: optional_var("IPAM_STORE_PATH"),
            log_level: env::var("IPAM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!(
                "IPAM_API_URL cannot be empty.\n\
                 Set it via: export IPAM_API_URL=https://ipam.example.edu/api/v2/"
            );
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("IPAM_API_URL must start with http:// or https://");
        }
        if self.api_token.trim().is_empty() {
            anyhow::bail!(
                "IPAM_API_TOKEN cannot be empty.\n\
                 Set it via: export IPAM_API_TOKEN=your_token"
            );
        }

        let schema = self.schema()?;

        for (field, _) in &self.query.filters {
            schema
                .filter(field)
                .with_context(|| format!("IPAM_FILTERS: '{}'", field))?;
        }
        for (field, _) in &self.query.sort {
            if !schema.is_sortable(field) {
                anyhow::bail!("IPAM_SORT: {}.{} is not sortable", schema.screen, field);
            }
        }
        if self.query.page == Some(0) {
            anyhow::bail!("IPAM_PAGE must be at least 1");
        }

        match self.store_type.as_str() {
            "file" => {
                if self.store_path.as_deref().is_none_or(str::is_empty) {
                    anyhow::bail!(
                        "IPAM_STORE_PATH is required for file store.\n\
                         Set it via: export IPAM_STORE_PATH=/var/lib/ipam-console/state.json"
                    );
                }
            }
            "memory" => {}
            other => anyhow::bail!(
                "Unknown IPAM_STORE_TYPE: '{}'. Valid options: file, memory",
                other
            ),
        }

        self.console_config().validate()?;
        Ok(())
    }

    fn schema(&self) -> Result<TableSchema> {
        screens::by_name(&self.screen).with_context(|| {
            format!(
                "Unknown IPAM_SCREEN: '{}'. Valid options: {}",
                self.screen,
                screens::SCREEN_NAMES.join(", ")
            )
        })
    }

    fn console_config(&self) -> ConsoleConfig {
        let store = match (self.store_type.as_str(), &self.store_path) {
            ("file", Some(path)) => StoreConfig::File { path: path.clone() },
            _ => StoreConfig::Memory,
        };
        ConsoleConfig {
            source: SourceConfig::Rest {
                base_url: self.api_url.clone(),
                api_token: self.api_token.clone(),
            },
            store,
            view: ViewConfig {
                prefetch_max_pages: self.prefetch_pages,
                ..ViewConfig::default()
            },
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `key=value;key=value`
fn parse_pairs(raw: &str) -> Result<Vec<(String, String)>> {
    split_list(raw, ';')
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => anyhow::bail!("expected key=value, got '{}'", pair),
        })
        .collect()
}

/// Parse `-expires,hostname` into keys, primary first
fn parse_sort(raw: &str) -> Vec<(String, SortDirection)> {
    split_list(raw, ',')
        .into_iter()
        .map(|key| match key.strip_prefix('-') {
            Some(field) => (field.to_string(), SortDirection::Descending),
            None => (key, SortDirection::Ascending),
        })
        .collect()
}

fn parse_quick_filter(raw: &str) -> Result<QuickFilter> {
    match raw.split_once(':') {
        Some(("mine", user)) if !user.is_empty() => Ok(QuickFilter::mine(user)),
        Some(("changed_by", user)) if !user.is_empty() => Ok(QuickFilter::changed_by(user)),
        None if raw == "group" => Ok(QuickFilter::group()),
        _ => anyhow::bail!(
            "expected 'mine:<username>', 'group' or 'changed_by:<username>', got '{}'",
            raw
        ),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => anyhow::bail!("expected true or false, got '{}'", other),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ConsoleExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ConsoleExitCode::ConfigError.into();
    }

    // Initialize tracing; rows go to stdout, logs to stderr
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ConsoleExitCode::ConfigError.into();
    }

    info!("Starting ipam-console on screen '{}'", config.screen);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ConsoleExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run(config).await {
            error!("Console error: {:#}", e);
            ConsoleExitCode::RuntimeError
        } else {
            ConsoleExitCode::Success
        }
    });

    result.into()
}

/// Open the screen, fetch and print
async fn run(config: Config) -> Result<()> {
    let registry = SourceRegistry::with_builtin_stores();
    ipam_source_rest::register(&registry);

    let console = config.console_config();
    info!("Source: {}", console.source);
    info!("State store type: {}", console.store.type_name());

    let sources = registry.create_source(&console.source)?;
    let store = registry.create_store(&console.store).await?;
    let schema = config.schema()?;

    let mut controller = ViewController::open(schema, sources, store, &console.view).await?;

    let log_task = controller.take_events().map(|mut events| {
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                debug!("View event: {:?}", event);
            }
        })
    });

    let settings = &config.query;
    controller
        .batch(|schema, state| apply_settings(schema, state, settings))
        .await?;
    if controller.status() == FetchStatus::Idle {
        // Nothing changed the request; fetch what the store restored
        controller.refresh().await;
    }

    let outcome = wait_for_rows(&mut controller, config.fetch_timeout).await;
    let printed = match outcome {
        Ok(()) => print_view(&controller, config.output, settings.select_all),
        Err(e) => Err(e),
    };

    controller.close().await;
    if let Some(task) = log_task {
        task.abort();
    }
    printed
}

/// Apply the environment's query settings as one batch
fn apply_settings(
    schema: &TableSchema,
    state: &mut QueryState,
    settings: &QuerySettings,
) -> ipam_view_core::Result<StateChange> {
    let mut change = StateChange::NONE;

    if !settings.scope.is_empty() {
        change = change.merge(state.set_scope(settings.scope.clone()));
    }
    if let Some(quick) = &settings.quick_filter {
        change = change.merge(state.apply_quick_filter(quick.clone()));
    }
    for (field, raw) in &settings.filters {
        let step = match schema.filter(field)?.parse_value(raw)? {
            Some(value) => state.set_filter(schema, field, value)?,
            None => state.clear_filter(schema, field)?,
        };
        change = change.merge(step);
    }
    if !settings.sort.is_empty() {
        let restored: Vec<String> = state.sort().iter().map(|k| k.field.clone()).collect();
        for field in restored {
            change = change.merge(state.set_sort(schema, &field, None)?);
        }
        for (field, direction) in &settings.sort {
            change = change.merge(state.set_sort(schema, field, Some(*direction))?);
        }
    }
    if let Some(size) = settings.page_size {
        change = change.merge(state.set_page_size(schema, size)?);
    }
    for id in &settings.search {
        change = change.merge(state.add_advanced_filter(id, id));
    }
    // Last: every other setting resets the page
    if let Some(page) = settings.page {
        change = change.merge(state.set_page(page)?);
    }
    if settings.select_all {
        change = change.merge(state.select_all(true));
    }

    Ok(change)
}

/// Wait until the fetch settles, the timeout passes or a signal arrives
async fn wait_for_rows(controller: &mut ViewController, limit: Duration) -> Result<()> {
    let settled = tokio::select! {
        result = tokio::time::timeout(limit, controller.wait_idle()) => result.is_ok(),
        signal = wait_for_interrupt() => {
            let signal = signal?;
            anyhow::bail!("Interrupted by {}", signal);
        }
    };
    if !settled {
        anyhow::bail!("No rows after {:?}", limit);
    }

    match controller.status() {
        FetchStatus::Failed(message) => {
            if controller.rows().is_empty() {
                anyhow::bail!("Fetch failed: {}", message);
            }
            warn!("Fetch failed after partial load: {}", message);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_interrupt() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_interrupt() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

fn print_view(controller: &ViewController, output: OutputFormat, select_all: bool) -> Result<()> {
    let rows = if select_all {
        controller.selected_rows()
    } else {
        controller.rows()
    };

    match output {
        OutputFormat::Json => {
            let values: Vec<serde_json::Value> = rows.into_iter().map(|row| row.0).collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        OutputFormat::Table => {
            let columns = controller.visible_columns();
            let header: Vec<&str> = columns.iter().map(|c| c.header.as_str()).collect();
            println!("{}", header.join("\t"));
            for row in &rows {
                let cells: Vec<String> = columns.iter().map(|c| render_cell(row, &c.id)).collect();
                println!("{}", cells.join("\t"));
            }
        }
    }

    info!("{}", controller.summary());
    Ok(())
}

/// Plain-text form of one cell
fn render_cell(row: &Row, field: &str) -> String {
    match row.get(field) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}
