//! Session-wide cancellation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Cancellation signal shared by the crawler, its workers and outside callers.
///
/// Cancelling drops the only sender of an internal channel, so every clone of
/// the receiver becomes ready at once. That lets blocking waits (retry delays,
/// full result channels) wake up immediately instead of polling a flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
}

impl CancelSignal {
    /// Create a signal that is not cancelled yet.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    /// Cancel. Idempotent.
    pub fn cancel(&self) {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Check whether the signal has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `timeout` unless cancelled first. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Receiver that becomes ready (disconnected) on cancellation, for `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
