//! Configuration management for the rollscan indexer.
//!
//! This module handles loading configuration from:
//! - TOML files
//! - Environment variables (`${VAR}` placeholders inside the TOML)
//! - Default values (fallbacks)

use anyhow::{Context, Result};
use rollscan_core::VmType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Indexed chain
    pub chain: ChainConfig,

    /// Node endpoints
    pub node: NodeConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Block acquisition
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Staging and commit loop
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// In-memory cache sizes
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain ID (e.g., "minimove-1")
    pub chain_id: String,

    /// VM flavour of the rollup: evm, move or wasm
    pub vm: VmType,

    /// Bech32 prefix of account addresses
    #[serde(default = "default_account_prefix")]
    pub account_prefix: String,
}

/// Node endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// CometBFT RPC URL (`/block`, `/block_results`)
    pub rpc_url: String,

    /// Cosmos REST URL (Move resources, Wasm queries, validators)
    pub rest_url: String,

    /// EVM JSON-RPC URL (required for evm rollups)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_rpc_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://rollscan.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Scraper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Height to start from on an empty database
    #[serde(default = "default_start_height")]
    pub start_height: i64,

    /// Retries per height before a fetch failure is fatal
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries and slow-sync rounds
    #[serde(default = "default_scraper_cooling_ms")]
    pub cooling_ms: u64,

    /// Delay between spawning fast-sync fetches
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,

    /// Heights fetched concurrently per slow-sync round
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Capacity of the scraped-block queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl ScraperConfig {
    /// Retry and slow-sync cooling delay.
    pub fn cooling(&self) -> Duration {
        Duration::from_millis(self.cooling_ms)
    }

    /// Fast-sync spawn interval.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            start_height: default_start_height(),
            max_retries: default_max_retries(),
            cooling_ms: default_scraper_cooling_ms(),
            fetch_interval_ms: default_fetch_interval_ms(),
            window_size: default_window_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pause the scraper when staged or in-flight blocks exceed this
    #[serde(default = "default_pause_threshold")]
    pub pause_threshold: usize,

    /// Resume once both staged and in-flight blocks drop below this
    #[serde(default = "default_resume_threshold")]
    pub resume_threshold: usize,

    /// Commit loop sleep while the next height is not staged
    #[serde(default = "default_orchestrator_cooling_ms")]
    pub cooling_ms: u64,
}

impl OrchestratorConfig {
    /// Commit loop idle delay.
    pub fn cooling(&self) -> Duration {
        Duration::from_millis(self.cooling_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pause_threshold: default_pause_threshold(),
            resume_threshold: default_resume_threshold(),
            cooling_ms: default_orchestrator_cooling_ms(),
        }
    }
}

/// Cache capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Validators by consensus address
    #[serde(default = "default_validator_capacity")]
    pub validator_capacity: usize,

    /// Collection metadata by address
    #[serde(default = "default_collection_capacity")]
    pub collection_capacity: usize,

    /// Move object to NFT key
    #[serde(default = "default_object_capacity")]
    pub object_capacity: usize,

    /// Addresses known not to be NFT collections or NFT objects
    #[serde(default = "default_blacklist_capacity")]
    pub blacklist_capacity: usize,

    /// Prepared-but-uncommitted blocks per submodule
    #[serde(default = "default_arena_capacity")]
    pub arena_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validator_capacity: default_validator_capacity(),
            collection_capacity: default_collection_capacity(),
            object_capacity: default_object_capacity(),
            blacklist_capacity: default_blacklist_capacity(),
            arena_capacity: default_arena_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_account_prefix() -> String {
    "init".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_start_height() -> i64 {
    1
}

fn default_max_retries() -> u32 {
    5
}

fn default_scraper_cooling_ms() -> u64 {
    1000
}

fn default_fetch_interval_ms() -> u64 {
    10
}

fn default_window_size() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_pause_threshold() -> usize {
    100
}

fn default_resume_threshold() -> usize {
    50
}

fn default_orchestrator_cooling_ms() -> u64 {
    100
}

fn default_validator_capacity() -> usize {
    1024
}

fn default_collection_capacity() -> usize {
    10_000
}

fn default_object_capacity() -> usize {
    100_000
}

fn default_blacklist_capacity() -> usize {
    100_000
}

fn default_arena_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax.
    /// For example: `rpc_url = "${ROLLUP_RPC_URL}"`
    ///
    /// # Example
    /// ```no_run
    /// # use rollscan_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = Self::expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chain.chain_id.trim().is_empty() {
            anyhow::bail!("Chain chain_id cannot be empty");
        }
        if self.chain.account_prefix.is_empty() {
            anyhow::bail!("Chain account_prefix cannot be empty");
        }

        let valid_schemes = ["http://", "https://"];
        for (name, url) in [("rpc_url", &self.node.rpc_url), ("rest_url", &self.node.rest_url)] {
            if url.is_empty() {
                anyhow::bail!("Node {} cannot be empty", name);
            }
            if !valid_schemes.iter().any(|s| url.starts_with(s)) {
                anyhow::bail!("Node {} must start with http:// or https:// (got '{}')", name, url);
            }
        }
        if self.chain.vm == VmType::Evm && self.node.json_rpc_url.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("Node json_rpc_url is required for evm rollups");
        }
        if self.node.timeout_secs == 0 {
            anyhow::bail!("Node timeout_secs must be > 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.scraper.start_height < 1 {
            anyhow::bail!("Scraper start_height must be >= 1");
        }
        if self.scraper.window_size == 0 {
            anyhow::bail!("Scraper window_size must be > 0");
        }
        if self.scraper.queue_capacity == 0 {
            anyhow::bail!("Scraper queue_capacity must be > 0 (mpsc capacity cannot be zero)");
        }

        if self.orchestrator.resume_threshold == 0
            || self.orchestrator.resume_threshold > self.orchestrator.pause_threshold
        {
            anyhow::bail!(
                "Orchestrator resume_threshold ({}) must be in 1..=pause_threshold ({})",
                self.orchestrator.resume_threshold,
                self.orchestrator.pause_threshold
            );
        }

        let caches = [
            ("validator_capacity", self.cache.validator_capacity),
            ("collection_capacity", self.cache.collection_capacity),
            ("object_capacity", self.cache.object_capacity),
            ("blacklist_capacity", self.cache.blacklist_capacity),
        ];
        for (name, capacity) in caches {
            if capacity == 0 {
                anyhow::bail!("Cache {} must be > 0", name);
            }
        }
        if self.cache.arena_capacity < 2 * self.orchestrator.pause_threshold {
            anyhow::bail!(
                "Cache arena_capacity ({}) must be at least twice the pause_threshold ({})",
                self.cache.arena_capacity,
                self.orchestrator.pause_threshold
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }

    /// Expand environment variables in the format `${VAR_NAME}`.
    ///
    /// Placeholders after a `#` outside any string are comments and stay
    /// untouched. Placeholders inside basic, literal and multiline strings
    /// are expanded.
    ///
    /// # Errors
    /// Returns an error if a referenced environment variable is not set or a
    /// placeholder is malformed.
    fn expand_env_vars(input: &str) -> Result<String> {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut state = LexState::default();
        let mut pos = 0usize;

        while let Some(ch) = chars.next() {
            pos += 1;

            if state.escape_next {
                state.escape_next = false;
                result.push(ch);
                continue;
            }

            match ch {
                '\\' if state.in_basic_string() => {
                    state.escape_next = true;
                    result.push(ch);
                }
                '"' | '\'' if !state.in_comment && !state.in_other_quote(ch) => {
                    result.push(ch);
                    if Self::is_triple_quote(&chars, ch) {
                        for _ in 0..2 {
                            if let Some(quote) = chars.next() {
                                result.push(quote);
                            }
                        }
                        pos += 2;
                        state.toggle_multiline(ch);
                    } else {
                        state.toggle_single_line(ch);
                    }
                }
                '#' if !state.in_comment && !state.in_any_string() => {
                    state.in_comment = true;
                    result.push(ch);
                }
                '\n' => {
                    state.in_comment = false;
                    result.push(ch);
                }
                '$' if !state.in_comment && chars.peek() == Some(&'{') => {
                    chars.next();
                    pos += 1;

                    let mut var_name = String::new();
                    let mut found_close = false;
                    for c in chars.by_ref() {
                        pos += 1;
                        if c == '}' {
                            found_close = true;
                            break;
                        }
                        var_name.push(c);
                    }

                    if !found_close {
                        anyhow::bail!(
                            "Unclosed environment variable placeholder at position {}",
                            pos
                        );
                    }
                    if var_name.is_empty() {
                        anyhow::bail!("Empty environment variable name at position {}", pos);
                    }

                    match std::env::var(&var_name) {
                        Ok(value) => result.push_str(&value),
                        Err(_) => anyhow::bail!(
                            "Environment variable '{}' is not set (referenced at position {})",
                            var_name,
                            pos
                        ),
                    }
                }
                _ => result.push(ch),
            }
        }

        Ok(result)
    }

    /// Check if the next two characters repeat `quote_char`.
    fn is_triple_quote(chars: &std::iter::Peekable<std::str::Chars>, quote_char: char) -> bool {
        let mut temp = chars.clone();
        temp.next() == Some(quote_char) && temp.next() == Some(quote_char)
    }
}

/// TOML lexer state used by [`Config::expand_env_vars`].
#[derive(Debug, Default)]
struct LexState {
    double: bool,
    single: bool,
    multiline_double: bool,
    multiline_single: bool,
    in_comment: bool,
    escape_next: bool,
}

impl LexState {
    fn in_basic_string(&self) -> bool {
        self.double || self.multiline_double
    }

    fn in_any_string(&self) -> bool {
        self.double || self.single || self.multiline_double || self.multiline_single
    }

    /// Whether `quote` is inert because a string of the other quote kind is open.
    fn in_other_quote(&self, quote: char) -> bool {
        if quote == '"' {
            self.single || self.multiline_single
        } else {
            self.double || self.multiline_double
        }
    }

    fn toggle_multiline(&mut self, quote: char) {
        if quote == '"' {
            self.multiline_double = !self.multiline_double;
        } else {
            self.multiline_single = !self.multiline_single;
        }
    }

    fn toggle_single_line(&mut self, quote: char) {
        if quote == '"' && !self.multiline_double {
            self.double = !self.double;
        } else if quote == '\'' && !self.multiline_single {
            self.single = !self.single;
        }
    }
}
