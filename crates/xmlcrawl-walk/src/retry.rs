//! Bounded retry of transient filesystem errors.

use std::io;

use thiserror::Error;

use xmlcrawl_core::{FailureCause, FsOperation, RetryConfig, WorkerFailure, WorkerId};

use crate::cancel::CancelSignal;

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The error is not in the transient set.
    #[error("{source}")]
    NonTransient {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Every allowed attempt failed with a transient error.
    #[error("still failing after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// The crawl was cancelled while waiting for the next attempt.
    #[error("cancelled while waiting to retry")]
    Cancelled,
}

impl RetryError {
    /// Turn a fatal outcome into a worker failure. `None` for cancellation.
    pub fn into_failure(
        self,
        worker: WorkerId,
        operation: FsOperation,
        path: &std::path::Path,
    ) -> Option<WorkerFailure> {
        let (attempts, source, cause) = match self {
            Self::NonTransient { attempts, source } => (attempts, source, FailureCause::NonTransient),
            Self::Exhausted { attempts, source } => (attempts, source, FailureCause::RetriesExhausted),
            Self::Cancelled => return None,
        };
        Some(WorkerFailure::new(worker, operation, path, &source, attempts, cause))
    }
}

/// Runs fallible operations, retrying transient errors with a fixed delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from its configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempts allowed per operation.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Run `op` until it succeeds, fails for good, or `cancel` fires.
    ///
    /// `on_retry` is called with the failed attempt number and its error
    /// before each wait.
    pub fn run<T>(
        &self,
        cancel: &CancelSignal,
        mut on_retry: impl FnMut(u32, &io::Error),
        mut op: impl FnMut() -> io::Result<T>,
    ) -> Result<T, RetryError> {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !self.config.is_transient(&err) {
                return Err(RetryError::NonTransient {
                    attempts: attempt,
                    source: err,
                });
            }
            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: err,
                });
            }
            on_retry(attempt, &err);
            if cancel.wait_timeout(self.config.delay()) {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use xmlcrawl_core::TransientKind;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            delay_ms: 0,
            ..Default::default()
        })
    }

    fn failing(kind: io::ErrorKind, failures: u32) -> impl FnMut() -> io::Result<u32> {
        let mut calls = 0;
        move || {
            calls += 1;
            if calls <= failures {
                Err(io::Error::new(kind, "flaky"))
            } else {
                Ok(calls)
            }
        }
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let mut retries = 0;
        let result = fast_policy(30).run(
            &CancelSignal::new(),
            |_, _| retries += 1,
            failing(io::ErrorKind::NotFound, 29),
        );

        assert_eq!(result.unwrap(), 30);
        assert_eq!(retries, 29);
    }

    #[test]
    fn test_exhausts_after_max_attempts() {
        let result = fast_policy(30).run(
            &CancelSignal::new(),
            |_, _| {},
            failing(io::ErrorKind::InvalidInput, 30),
        );

        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 30);
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_non_transient_fails_immediately() {
        let mut retries = 0;
        let mut calls = 0;
        let result: Result<(), _> = fast_policy(30).run(
            &CancelSignal::new(),
            |_, _| retries += 1,
            || {
                calls += 1;
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            },
        );

        assert!(matches!(result, Err(RetryError::NonTransient { attempts: 1, .. })));
        assert_eq!(calls, 1);
        assert_eq!(retries, 0);
    }

    #[test]
    fn test_transient_set_is_configurable() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            delay_ms: 0,
            transient: vec![TransientKind::TimedOut],
        });

        let result = policy.run(&CancelSignal::new(), |_, _| {}, failing(io::ErrorKind::NotFound, 1));
        assert!(matches!(result, Err(RetryError::NonTransient { .. })));

        let result = policy.run(&CancelSignal::new(), |_, _| {}, failing(io::ErrorKind::TimedOut, 4));
        assert_eq!(result.unwrap(), 5);
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 30,
            delay_ms: Duration::from_secs(60).as_millis() as u64,
            ..Default::default()
        });
        let cancel = CancelSignal::new();
        cancel.cancel();

        let result = policy.run(&cancel, |_, _| {}, failing(io::ErrorKind::NotFound, 100));
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[test]
    fn test_into_failure() {
        let err = RetryError::Exhausted {
            attempts: 30,
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        let failure = err
            .into_failure(WorkerId(1), FsOperation::Read, std::path::Path::new("/a.xml"))
            .unwrap();

        assert_eq!(failure.cause, FailureCause::RetriesExhausted);
        assert_eq!(failure.attempts, 30);
        assert!(RetryError::Cancelled
            .into_failure(WorkerId(1), FsOperation::Read, std::path::Path::new("/a.xml"))
            .is_none());
    }
}
