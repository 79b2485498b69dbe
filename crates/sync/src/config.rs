//! Configuration management for the synchronizer.
//!
//! Configuration is loaded from a TOML file with `${VAR}` environment
//! expansion, validated, and backed by defaults for every optional knob.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Main configuration for the synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    pub network: NetworkConfig,

    /// Monitored contract
    pub contract: ContractConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain RPC URL
    pub rpc_url: String,
}

/// Monitored contract configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Address of the medicine-inventory ledger contract
    pub address: Address,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g. "sqlite://carechain.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Block number to start syncing from (0 = from genesis)
    #[serde(default)]
    pub start_block: u64,

    /// Polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of blocks fetched per window
    #[serde(default = "default_max_window_blocks")]
    pub max_window_blocks: u64,

    /// Number of blocks behind head treated as stable
    #[serde(default)]
    pub confirmations: u64,

    /// Per-call RPC timeout in milliseconds
    #[serde(default = "default_rpc_call_timeout_ms")]
    pub rpc_call_timeout_ms: u64,

    /// Attempt budget for transient RPC faults (includes the first call)
    #[serde(default = "default_rpc_max_attempts")]
    pub rpc_max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            poll_interval_ms: default_poll_interval_ms(),
            max_window_blocks: default_max_window_blocks(),
            confirmations: 0,
            rpc_call_timeout_ms: default_rpc_call_timeout_ms(),
            rpc_max_attempts: default_rpc_max_attempts(),
        }
    }
}

impl SyncConfig {
    /// Polling cadence as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-call RPC timeout as a [`Duration`].
    pub fn rpc_call_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_call_timeout_ms)
    }

    /// Total budget for a single tick: twice the cadence. A tick that
    /// exceeds it is aborted without advancing the cursor.
    pub fn tick_budget(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.saturating_mul(2))
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

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_max_window_blocks() -> u64 {
    2_000
}

fn default_rpc_call_timeout_ms() -> u64 {
    20_000
}

fn default_rpc_max_attempts() -> u32 {
    6
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced with `${VAR_NAME}`; a
    /// reference inside a `#` comment is left alone.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let expanded = expand_env_vars(&contents)?;
        Self::from_toml_str(&expanded)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| SyncError::Config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            return Err(SyncError::Config("Network rpc_url cannot be empty".into()));
        }

        if self.contract.address.is_zero() {
            return Err(SyncError::Config(
                "Contract address must be a non-zero address".into(),
            ));
        }

        if self.database.url.is_empty() {
            return Err(SyncError::Config("Database url cannot be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(SyncError::Config(
                "Database max_connections must be > 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(SyncError::Config(format!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.sync.poll_interval_ms == 0 {
            return Err(SyncError::Config("Sync poll_interval_ms must be > 0".into()));
        }
        if self.sync.max_window_blocks == 0 {
            return Err(SyncError::Config(
                "Sync max_window_blocks must be > 0".into(),
            ));
        }
        if self.sync.rpc_call_timeout_ms == 0 {
            return Err(SyncError::Config(
                "Sync rpc_call_timeout_ms must be > 0".into(),
            ));
        }
        if self.sync.rpc_max_attempts == 0 {
            return Err(SyncError::Config("Sync rpc_max_attempts must be > 0".into()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(SyncError::Config(format!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(SyncError::Config(format!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// Expand `${VAR_NAME}` placeholders with environment variable values.
///
/// Expansion is line-based: anything after a `#` that is outside a
/// double-quoted string is a comment and left untouched.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        let code_end = comment_start(line).unwrap_or(line.len());
        let (code, comment) = line.split_at(code_end);

        let mut rest = code;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(SyncError::Config(format!(
                    "Unclosed environment variable placeholder in line: {}",
                    line.trim_end()
                )));
            };
            let name = &after[..end];
            if name.is_empty() {
                return Err(SyncError::Config(
                    "Empty environment variable name in configuration".into(),
                ));
            }
            let value = std::env::var(name).map_err(|_| {
                SyncError::Config(format!("Environment variable '{}' is not set", name))
            })?;
            out.push_str(&value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out.push_str(comment);
    }

    Ok(out)
}

/// Byte offset of the first `#` outside a double-quoted string, if any.
fn comment_start(line: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return Some(i),
            _ => {}
        }
    }
    None
}
