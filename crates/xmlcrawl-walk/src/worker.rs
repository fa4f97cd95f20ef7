//! Crawl worker threads.
//!
//! Each worker:
//! - Pops a directory from the work queue
//! - Lists it under the retry policy
//! - Pushes subdirectories back to the queue
//! - Reads qualifying files and sends them to the result channel
//! - Acknowledges the directory and goes back for the next one
//!
//! A fatal error is sent as a [`CrawlItem::Fatal`] sentinel, after which the
//! worker acknowledges its directory and exits for good.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use xmlcrawl_core::{CrawlError, CrawlItem, FsOperation, WorkItem, WorkerFailure, WorkerId};

use crate::cancel::CancelSignal;
use crate::channel::ResultSender;
use crate::filter::EntryFilter;
use crate::fs::{EntryKind, FileSystem};
use crate::progress::CrawlCounters;
use crate::queue::WorkQueue;
use crate::retry::{RetryError, RetryPolicy};

/// How a worker thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was closed.
    Shutdown,
    /// The crawl was cancelled mid-directory.
    Cancelled,
    /// The worker sent a fatal sentinel.
    Failed,
}

/// Everything a worker shares with the crawler and its peers.
pub(crate) struct WorkerContext<F> {
    pub fs: Arc<F>,
    pub filter: Arc<EntryFilter>,
    pub retry: RetryPolicy,
    pub queue: Arc<WorkQueue>,
    pub results: ResultSender,
    pub counters: Arc<CrawlCounters>,
    pub cancel: CancelSignal,
}

impl<F> Clone for WorkerContext<F> {
    fn clone(&self) -> Self {
        Self {
            fs: Arc::clone(&self.fs),
            filter: Arc::clone(&self.filter),
            retry: self.retry.clone(),
            queue: Arc::clone(&self.queue),
            results: self.results.clone(),
            counters: Arc::clone(&self.counters),
            cancel: self.cancel.clone(),
        }
    }
}

/// Why processing a directory stopped early.
enum Stop {
    Failed(Box<WorkerFailure>),
    Cancelled,
}

impl Stop {
    fn from_retry(err: RetryError, id: WorkerId, operation: FsOperation, path: &Path) -> Self {
        match err.into_failure(id, operation, path) {
            Some(failure) => Stop::Failed(Box::new(failure)),
            None => Stop::Cancelled,
        }
    }
}

/// A crawl worker thread.
pub struct Worker {
    id: WorkerId,
    handle: Option<JoinHandle<WorkerExit>>,
}

impl Worker {
    /// Spawn a worker thread.
    pub(crate) fn spawn<F: FileSystem>(
        id: WorkerId,
        ctx: WorkerContext<F>,
    ) -> Result<Self, CrawlError> {
        let handle = thread::Builder::new()
            .name(id.thread_name())
            .spawn(move || worker_loop(id, ctx))
            .map_err(|source| CrawlError::Spawn { id: id.0, source })?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Worker ID.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Check if the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the thread to exit. `None` if it panicked.
    pub fn join(mut self) -> Option<WorkerExit> {
        match self.handle.take() {
            Some(handle) => handle.join().ok(),
            None => Some(WorkerExit::Shutdown),
        }
    }
}

fn worker_loop<F: FileSystem>(id: WorkerId, ctx: WorkerContext<F>) -> WorkerExit {
    debug!(worker = id.0, "Worker starting");

    while let Some(item) = ctx.queue.pop() {
        if ctx.cancel.is_cancelled() {
            ctx.queue.acknowledge();
            return WorkerExit::Cancelled;
        }

        match process_directory(id, &item, &ctx) {
            Ok(files) => {
                trace!(worker = id.0, path = %item.path.display(), files, "Directory processed");
                ctx.counters.record_dir();
                ctx.queue.acknowledge();
            }
            Err(Stop::Failed(failure)) => {
                warn!(
                    worker = id.0,
                    operation = %failure.operation,
                    path = %failure.path.display(),
                    error = %failure.message,
                    "Worker failed"
                );
                let sent = ctx.results.send(CrawlItem::Fatal(failure), &ctx.cancel);
                ctx.queue.acknowledge();
                return if sent {
                    WorkerExit::Failed
                } else {
                    WorkerExit::Cancelled
                };
            }
            Err(Stop::Cancelled) => {
                debug!(worker = id.0, path = %item.path.display(), "Cancelled mid-directory");
                ctx.queue.acknowledge();
                return WorkerExit::Cancelled;
            }
        }
    }

    debug!(worker = id.0, "Worker shutting down");
    WorkerExit::Shutdown
}

/// List one directory, enqueue its subdirectories and send its files.
///
/// Returns the number of files sent.
fn process_directory<F: FileSystem>(
    id: WorkerId,
    item: &WorkItem,
    ctx: &WorkerContext<F>,
) -> Result<u64, Stop> {
    let entries = ctx
        .retry
        .run(
            &ctx.cancel,
            |attempt, err| on_retry(id, FsOperation::List, &item.path, attempt, err, ctx),
            || ctx.fs.read_dir(&item.path),
        )
        .map_err(|e| Stop::from_retry(e, id, FsOperation::List, &item.path))?;

    let mut files = 0;
    for entry in entries {
        match entry.kind {
            EntryKind::Directory => {
                if ctx.filter.descend(&entry.name, item.depth + 1) {
                    ctx.queue.push(item.child(entry.path));
                }
            }
            EntryKind::File => {
                if !ctx.filter.accept_file(&entry.name) {
                    continue;
                }
                let found = ctx
                    .retry
                    .run(
                        &ctx.cancel,
                        |attempt, err| on_retry(id, FsOperation::Read, &entry.path, attempt, err, ctx),
                        || ctx.fs.read_file(&entry.path),
                    )
                    .map_err(|e| Stop::from_retry(e, id, FsOperation::Read, &entry.path))?;

                if !ctx.results.send(CrawlItem::Found(found), &ctx.cancel) {
                    return Err(Stop::Cancelled);
                }
                ctx.counters.record_file();
                files += 1;
            }
            EntryKind::Symlink | EntryKind::Other => {
                trace!(worker = id.0, path = %entry.path.display(), "Skipping entry");
            }
        }
    }

    Ok(files)
}

fn on_retry<F>(
    id: WorkerId,
    operation: FsOperation,
    path: &Path,
    attempt: u32,
    err: &std::io::Error,
    ctx: &WorkerContext<F>,
) {
    ctx.counters.record_retry(operation);
    debug!(
        worker = id.0,
        %operation,
        path = %path.display(),
        attempt,
        error = %err,
        "Transient error, retrying"
    );
}
