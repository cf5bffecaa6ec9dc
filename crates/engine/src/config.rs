//! History engine configuration via `historytree.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration. Values are validated once when the manager is built.

use historytree_core::HistoryError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "historytree.toml";

/// Default cap on a single serialized batch (4 MiB).
pub const DEFAULT_TRANSACTION_SIZE_LIMIT: usize = 4 * 1024 * 1024;

/// Default page size when a read request passes 0.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default upper bound on any page size.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1000;

/// Default cap on the number of ancestor ranges in a token.
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 256;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config file '{path}': {source}")]
    Io {
        /// Offending path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for HistoryError {
    fn from(e: ConfigError) -> Self {
        HistoryError::invalid_argument(e.to_string())
    }
}

/// Engine configuration loaded from `historytree.toml`.
///
/// # Example
///
/// ```toml
/// # Maximum serialized size of one appended batch, in bytes
/// transaction_size_limit = 4194304
///
/// # Page size used when a read passes 0, and the cap applied to all pages
/// default_page_size = 100
/// max_page_size = 1000
///
/// # Optional per-operation deadline in milliseconds
/// # operation_timeout_ms = 5000
///
/// # Maximum number of ancestor ranges a fork may produce
/// max_ancestor_depth = 256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum serialized batch size accepted by an append.
    #[serde(default = "default_transaction_size_limit")]
    pub transaction_size_limit: usize,
    /// Page size used when a read request passes 0.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Upper bound applied to every requested page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Deadline for a whole operation. None disables deadlines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,
    /// Maximum ancestor chain length produced by a fork.
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,
}

fn default_transaction_size_limit() -> usize {
    DEFAULT_TRANSACTION_SIZE_LIMIT
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_max_ancestor_depth() -> usize {
    DEFAULT_MAX_ANCESTOR_DEPTH
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            transaction_size_limit: DEFAULT_TRANSACTION_SIZE_LIMIT,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            operation_timeout_ms: None,
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
        }
    }
}

impl HistoryConfig {
    /// Default config file content, with comments.
    pub fn default_toml() -> &'static str {
        r#"# History tree configuration

# Maximum serialized size of one appended batch, in bytes
transaction_size_limit = 4194304

# Page size used when a read passes 0, and the cap applied to all pages
default_page_size = 100
max_page_size = 1000

# Optional per-operation deadline in milliseconds
# operation_timeout_ms = 5000

# Maximum number of ancestor ranges a fork may produce
max_ancestor_depth = 256
"#
    }

    /// Parse and validate a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HistoryConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transaction_size_limit == 0 {
            return Err(ConfigError::Invalid(
                "transaction_size_limit must be positive".into(),
            ));
        }
        if self.default_page_size == 0 {
            return Err(ConfigError::Invalid(
                "default_page_size must be positive".into(),
            ));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigError::Invalid(format!(
                "max_page_size ({}) is below default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        if self.max_ancestor_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_ancestor_depth must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Per-operation deadline, if configured.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve a requested page size: 0 means default, anything is capped.
    pub fn effective_page_size(&self, requested: usize) -> usize {
        let size = if requested == 0 {
            self.default_page_size
        } else {
            requested
        };
        size.min(self.max_page_size)
    }
}
