//! Crawl configuration types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CrawlError;

/// Default capacity of the result channel between workers and the crawler.
pub const DEFAULT_RESULT_CAPACITY: usize = 5;

/// Default interval between progress reports while waiting for completion.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of attempts before a transient error becomes fatal.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default wait between two attempts of the same operation.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// An I/O error kind that is worth retrying.
///
/// Unreliable network filesystems occasionally report entries as missing or
/// reject valid arguments for a moment. Which kinds are spurious depends on
/// the environment, so the set is part of the configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TransientKind {
    NotFound,
    InvalidInput,
    TimedOut,
    Interrupted,
    WouldBlock,
    ConnectionReset,
    ConnectionAborted,
    PermissionDenied,
}

impl TransientKind {
    /// The standard library error kind this variant stands for.
    pub fn kind(self) -> io::ErrorKind {
        match self {
            Self::NotFound => io::ErrorKind::NotFound,
            Self::InvalidInput => io::ErrorKind::InvalidInput,
            Self::TimedOut => io::ErrorKind::TimedOut,
            Self::Interrupted => io::ErrorKind::Interrupted,
            Self::WouldBlock => io::ErrorKind::WouldBlock,
            Self::ConnectionReset => io::ErrorKind::ConnectionReset,
            Self::ConnectionAborted => io::ErrorKind::ConnectionAborted,
            Self::PermissionDenied => io::ErrorKind::PermissionDenied,
        }
    }

    /// Check whether an error is of this kind.
    pub fn matches(self, err: &io::Error) -> bool {
        err.kind() == self.kind()
    }
}

/// Retry behaviour for filesystem operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed wait between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    /// Error kinds treated as transient.
    #[serde(default = "default_transient")]
    pub transient: Vec<TransientKind>,
}

impl RetryConfig {
    /// Wait between two attempts.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Check whether an error should be retried.
    pub fn is_transient(&self, err: &io::Error) -> bool {
        self.transient.iter().any(|kind| kind.matches(err))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            transient: default_transient(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_transient() -> Vec<TransientKind> {
    vec![TransientKind::NotFound, TransientKind::InvalidInput]
}

/// Configuration for a crawl session.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct CrawlConfig {
    /// Root directory to crawl.
    #[serde(default)]
    pub root: PathBuf,

    /// Number of worker threads (0 = available parallelism).
    #[builder(default = "0")]
    #[serde(default)]
    pub workers: usize,

    /// Results that may wait for the consumer before workers block.
    #[builder(default = "DEFAULT_RESULT_CAPACITY")]
    #[serde(default = "default_result_capacity")]
    pub result_capacity: usize,

    /// How long the crawler waits for completion between progress reports.
    #[builder(default = "DEFAULT_POLL_INTERVAL_MS")]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Retry behaviour for listing and reading.
    #[builder(default)]
    #[serde(default)]
    pub retry: RetryConfig,

    /// File extensions to deliver, without the dot. Empty means every file.
    #[builder(default = "default_extensions()")]
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Glob patterns for directory names that are never descended into.
    #[builder(default)]
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Include hidden entries (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Descend into symlinked directories and read symlinked files.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Maximum directory depth below the root (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_result_capacity() -> usize {
    DEFAULT_RESULT_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_extensions() -> Vec<String> {
    vec!["xml".to_string()]
}

impl CrawlConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            Some(_) => {}
        }
        if self.result_capacity == Some(0) {
            return Err("Result capacity must be at least 1".to_string());
        }
        if self.poll_interval_ms == Some(0) {
            return Err("Poll interval must be at least 1ms".to_string());
        }
        if let Some(ref retry) = self.retry {
            if retry.max_attempts == 0 {
                return Err("Retry attempts must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

impl CrawlConfig {
    /// Create a new crawl config builder.
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::default()
    }

    /// Create a config with defaults for crawling a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workers: 0,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry: RetryConfig::default(),
            extensions: default_extensions(),
            exclude: Vec::new(),
            include_hidden: true,
            follow_symlinks: false,
            max_depth: None,
        }
    }

    /// Check a config that did not go through the builder (e.g. loaded from JSON).
    pub fn validate(&self) -> Result<(), CrawlError> {
        let invalid = |message: &str| CrawlError::InvalidConfig {
            message: message.to_string(),
        };
        if self.root.as_os_str().is_empty() {
            return Err(invalid("Root path cannot be empty"));
        }
        if self.result_capacity == 0 {
            return Err(invalid("Result capacity must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("Poll interval must be at least 1ms"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("Retry attempts must be at least 1"));
        }
        Ok(())
    }

    /// Number of workers to spawn, resolving 0 to the available parallelism.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            n => n,
        }
    }

    /// Interval between progress reports.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check if a file name carries one of the configured extensions.
    ///
    /// Comparison is ASCII case-insensitive, so `a.XML` matches `xml`.
    pub fn matches_extension(&self, name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let name = name.as_bytes();
        self.extensions.iter().any(|ext| {
            let ext = ext.trim_start_matches('.').as_bytes();
            name.len() > ext.len()
                && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
                && name[name.len() - ext.len() - 1] == b'.'
        })
    }

    /// Check if hidden entries should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }

    /// Check if a directory at `depth` may still be listed.
    pub fn within_depth(&self, depth: u32) -> bool {
        self.max_depth.is_none_or(|max| depth <= max)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CrawlConfig::builder()
            .root("/srv/share")
            .workers(4usize)
            .follow_symlinks(true)
            .max_depth(3u32)
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/share"));
        assert_eq!(config.workers, 4);
        assert!(config.follow_symlinks);
        assert_eq!(config.max_depth, Some(3));
        assert_eq!(config.result_capacity, DEFAULT_RESULT_CAPACITY);
        assert_eq!(config.extensions, vec!["xml".to_string()]);
    }

    #[test]
    fn test_builder_rejects_missing_root() {
        assert!(CrawlConfig::builder().build().is_err());
        assert!(CrawlConfig::builder().root("").build().is_err());
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let result = CrawlConfig::builder()
            .root("/srv")
            .result_capacity(0usize)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_matches_extension_case_insensitive() {
        let config = CrawlConfig::new("/srv");

        assert!(config.matches_extension("icons.xml"));
        assert!(config.matches_extension("ICONS.XML"));
        assert!(config.matches_extension("a.Xml"));
        assert!(!config.matches_extension("icons.xml.bak"));
        assert!(!config.matches_extension("notxml"));
        assert!(!config.matches_extension("xml"));
        assert!(!config.matches_extension("readme.txt"));
    }

    #[test]
    fn test_empty_extensions_accept_everything() {
        let mut config = CrawlConfig::new("/srv");
        config.extensions.clear();
        assert!(config.matches_extension("anything.bin"));
    }

    #[test]
    fn test_within_depth() {
        let mut config = CrawlConfig::new("/srv");
        assert!(config.within_depth(1000));

        config.max_depth = Some(1);
        assert!(config.within_depth(0));
        assert!(config.within_depth(1));
        assert!(!config.within_depth(2));
    }

    #[test]
    fn test_transient_kinds() {
        let retry = RetryConfig::default();
        let not_found = io::Error::new(io::ErrorKind::NotFound, "gone");
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");

        assert!(retry.is_transient(&not_found));
        assert!(!retry.is_transient(&denied));
        assert_eq!("invalid-input".parse::<TransientKind>().unwrap(), TransientKind::InvalidInput);
        assert_eq!(TransientKind::TimedOut.to_string(), "timed-out");
    }

    #[test]
    fn test_validate_loaded_config() {
        let config: CrawlConfig = serde_json::from_str(r#"{"root": "/srv", "workers": 2}"#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(config.include_hidden);

        let config: CrawlConfig = serde_json::from_str(r#"{"result_capacity": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }
}
