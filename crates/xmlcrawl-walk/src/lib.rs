//! Concurrent crawl engine for xmlcrawl.
//!
//! This crate walks a directory tree with a fixed pool of worker threads and
//! streams every qualifying file (by default `*.xml`, case-insensitive) to a
//! consumer.
//!
//! # Overview
//!
//! - **Work queue**: unbounded LIFO stack of directories with a join barrier
//! - **Workers**: list directories, push subdirectories, read matching files
//! - **Retry policy**: bounded retries of transient errors from flaky
//!   network filesystems
//! - **Result channel**: bounded, so a slow consumer throttles the workers
//! - **Crawler**: drains results, reports progress and turns a worker's fatal
//!   error into a [`CrawlError`]
//!
//! # Example
//!
//! ```rust,no_run
//! use xmlcrawl_walk::{CrawlConfig, Crawler};
//!
//! let config = CrawlConfig::new("/path/to/share");
//! let crawler = Crawler::new(config).unwrap();
//!
//! let summary = crawler
//!     .run(|file| {
//!         println!("{} ({} bytes)", file.path.display(), file.len());
//!         Ok::<_, std::io::Error>(())
//!     })
//!     .unwrap();
//!
//! println!("{} files in {} directories", summary.files_delivered, summary.dirs_listed);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use xmlcrawl_walk::{CrawlConfig, Crawler};
//!
//! let crawler = Crawler::new(CrawlConfig::new("/path/to/share")).unwrap();
//! let mut progress_rx = crawler.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         eprintln!("{progress}");
//!     }
//! });
//! ```

mod cancel;
mod channel;
mod crawler;
mod filter;
mod fs;
mod progress;
mod queue;
mod retry;
mod worker;

pub use cancel::CancelSignal;
pub use channel::{ResultChannel, ResultSender};
pub use crawler::Crawler;
pub use filter::EntryFilter;
pub use fs::{DirEntry, EntryKind, FileSystem, LocalFs};
pub use progress::CrawlCounters;
pub use queue::WorkQueue;
pub use retry::{RetryError, RetryPolicy};
pub use worker::{Worker, WorkerExit};

// Re-export core types for convenience
pub use xmlcrawl_core::{
    CrawlConfig, CrawlError, CrawlItem, CrawlProgress, CrawlSummary, FailureCause, FoundFile,
    FsOperation, RetryConfig, TransientKind, WorkItem, WorkerFailure, WorkerId,
};
