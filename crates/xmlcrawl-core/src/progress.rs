//! Crawl progress reporting.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point-in-time view of a running crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlProgress {
    /// Files handed to the consumer so far.
    pub files_delivered: u64,
    /// Directories listed so far.
    pub dirs_listed: u64,
    /// Directories waiting in the work queue.
    pub pending_dirs: usize,
    /// Directories enqueued but not yet acknowledged.
    pub unfinished_dirs: usize,
    /// Results waiting in the result channel.
    pub pending_results: usize,
    /// Retries of directory listings.
    pub list_retries: u64,
    /// Retries of file reads.
    pub read_retries: u64,
    /// Time since the crawl started.
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Files delivered per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_delivered as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Total retries of any operation.
    pub fn total_retries(&self) -> u64 {
        self.list_retries + self.read_retries
    }
}

impl fmt::Display for CrawlProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files, {} dirs, {} dirs queued, {} results pending",
            self.files_delivered, self.dirs_listed, self.pending_dirs, self.pending_results
        )?;
        if self.total_retries() > 0 {
            write!(f, ", {} retries", self.total_retries())?;
        }
        Ok(())
    }
}

/// Outcome of a crawl that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Files handed to the consumer.
    pub files_delivered: u64,
    /// Directories listed.
    pub dirs_listed: u64,
    /// Retries of directory listings.
    pub list_retries: u64,
    /// Retries of file reads.
    pub read_retries: u64,
    /// Wall-clock duration of the crawl.
    pub elapsed: Duration,
}

impl From<CrawlProgress> for CrawlSummary {
    fn from(progress: CrawlProgress) -> Self {
        Self {
            files_delivered: progress.files_delivered,
            dirs_listed: progress.dirs_listed,
            list_retries: progress.list_retries,
            read_retries: progress.read_retries,
            elapsed: progress.elapsed,
        }
    }
}
