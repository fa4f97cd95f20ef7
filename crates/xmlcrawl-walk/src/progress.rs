//! Counters shared between workers.

use std::sync::atomic::{AtomicU64, Ordering};

use xmlcrawl_core::FsOperation;

/// Statistics updated by workers while they crawl.
///
/// Purely informational: nothing in the crawl waits on these values, so
/// relaxed atomics are enough.
#[derive(Debug, Default)]
pub struct CrawlCounters {
    dirs_listed: AtomicU64,
    files_sent: AtomicU64,
    list_retries: AtomicU64,
    read_retries: AtomicU64,
}

impl CrawlCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dir(&self) {
        self.dirs_listed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file(&self) {
        self.files_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self, operation: FsOperation) {
        let counter = match operation {
            FsOperation::List => &self.list_retries,
            FsOperation::Read => &self.read_retries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Directories fully processed.
    pub fn dirs_listed(&self) -> u64 {
        self.dirs_listed.load(Ordering::Relaxed)
    }

    /// Files sent to the result channel.
    pub fn files_sent(&self) -> u64 {
        self.files_sent.load(Ordering::Relaxed)
    }

    pub fn list_retries(&self) -> u64 {
        self.list_retries.load(Ordering::Relaxed)
    }

    pub fn read_retries(&self) -> u64 {
        self.read_retries.load(Ordering::Relaxed)
    }
}
