//! Core types for xmlcrawl.
//!
//! This crate provides the data structures shared by the crawl engine and its
//! consumers: configuration, the items that travel between workers and the
//! crawler, progress snapshots and errors.

mod config;
mod error;
mod item;
mod progress;

pub use config::{
    CrawlConfig, CrawlConfigBuilder, RetryConfig, TransientKind, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESULT_CAPACITY, DEFAULT_RETRY_DELAY_MS,
};
pub use error::{CrawlError, FailureCause, FsOperation, WorkerFailure, WorkerId};
pub use item::{CrawlItem, FoundFile, WorkItem};
pub use progress::{CrawlProgress, CrawlSummary};
