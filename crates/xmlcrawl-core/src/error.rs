//! Error types for crawl sessions.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Identity of a crawl worker within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// Name given to the worker's OS thread.
    pub fn thread_name(self) -> String {
        format!("crawl-worker-{}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {}", self.0)
    }
}

/// Filesystem operation a worker performs under the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FsOperation {
    /// Listing a directory.
    List,
    /// Reading a file's content and modification time.
    Read,
}

/// Why a worker gave up on an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// The error was not transient, so it was never retried.
    NonTransient,
    /// The error stayed transient for every allowed attempt.
    RetriesExhausted,
}

/// Structured description of the failure that stopped a worker.
///
/// Travels through the result channel as data and ends up in
/// [`CrawlError::Aborted`].
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    /// Worker that failed.
    pub worker: WorkerId,
    /// Name of the worker's thread.
    pub thread: String,
    /// Operation that failed.
    pub operation: FsOperation,
    /// Path the operation was applied to.
    pub path: PathBuf,
    /// Kind of the last I/O error.
    pub kind: io::ErrorKind,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Why the failure is fatal.
    pub cause: FailureCause,
    /// Message of the last I/O error.
    pub message: String,
}

impl WorkerFailure {
    /// Build a failure from the last error of an operation.
    pub fn new(
        worker: WorkerId,
        operation: FsOperation,
        path: impl Into<PathBuf>,
        error: &io::Error,
        attempts: u32,
        cause: FailureCause,
    ) -> Self {
        Self {
            worker,
            thread: worker.thread_name(),
            operation,
            path: path.into(),
            kind: error.kind(),
            attempts,
            cause,
            message: error.to_string(),
        }
    }

    /// Ordered, human readable description, one entry per line.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Fatal error in {} (thread {})", self.worker, self.thread),
            format!("  while trying to {} {}", self.operation, self.path.display()),
            format!("  error: {} ({:?})", self.message, self.kind),
        ];
        lines.push(match self.cause {
            FailureCause::NonTransient => "  not a transient error, no retry attempted".to_string(),
            FailureCause::RetriesExhausted => {
                format!("  still failing after {} attempts", self.attempts)
            }
        });
        lines
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Errors that end a crawl session.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A worker hit an unrecoverable error.
    #[error("{0}")]
    Aborted(Box<WorkerFailure>),

    /// The crawl was cancelled before it finished.
    #[error("Crawl interrupted")]
    Interrupted,

    /// A worker thread stopped without reporting why.
    #[error("Crawl worker {id} stopped unexpectedly")]
    WorkerLost { id: usize },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// I/O error outside the workers.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A worker thread could not be started.
    #[error("Failed to spawn crawl worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: io::Error,
    },

    /// The consumer rejected a discovered file.
    #[error("Consumer failed on {path}: {source}")]
    Consumer {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CrawlError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The worker failure behind an aborted crawl, if any.
    pub fn failure(&self) -> Option<&WorkerFailure> {
        match self {
            Self::Aborted(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether the crawl ended because it was cancelled.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<WorkerFailure> for CrawlError {
    fn from(failure: WorkerFailure) -> Self {
        Self::Aborted(Box::new(failure))
    }
}
