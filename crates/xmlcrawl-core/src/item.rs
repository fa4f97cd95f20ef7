//! Items that flow through a crawl session.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::WorkerFailure;

/// A directory waiting to be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Full path to the directory.
    pub path: PathBuf,
    /// Depth below the crawl root (0 = root).
    pub depth: u32,
}

impl WorkItem {
    /// Create a work item for a directory at `depth`.
    pub fn new(path: impl Into<PathBuf>, depth: u32) -> Self {
        Self {
            path: path.into(),
            depth,
        }
    }

    /// Create the work item for a crawl root.
    pub fn root(path: impl Into<PathBuf>) -> Self {
        Self::new(path, 0)
    }

    /// Work item for a subdirectory of this one.
    pub fn child(&self, path: impl Into<PathBuf>) -> Self {
        Self::new(path, self.depth + 1)
    }
}

/// A qualifying file, read in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    /// Full path to the file.
    pub path: PathBuf,
    /// File content.
    pub content: Vec<u8>,
    /// Last modification time.
    pub modified: SystemTime,
}

impl FoundFile {
    /// Size of the content in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// What a worker sends back to the crawler.
#[derive(Debug, Clone)]
pub enum CrawlItem {
    /// A discovered file.
    Found(FoundFile),
    /// The sending worker stopped; the crawl must abort.
    Fatal(Box<WorkerFailure>),
}

impl CrawlItem {
    /// Check if this is a fatal sentinel.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlItem::Fatal(_))
    }
}
