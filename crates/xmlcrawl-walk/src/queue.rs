//! Unbounded LIFO work queue with a join barrier.
//!
//! Workers are both the producers and the consumers of this queue: each
//! listed directory pushes its subdirectories back. Bounding it would let
//! every worker block on a push while nobody pops, so it has no capacity
//! limit.
//!
//! Popping takes the most recently pushed directory. A worker that just
//! found subdirectories tends to continue with one of them, which keeps the
//! set of directories in flight small. On a network filesystem that means
//! fewer directories the server has to keep warm at once.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use xmlcrawl_core::WorkItem;

#[derive(Debug, Default)]
struct QueueState {
    stack: Vec<WorkItem>,
    /// Pushed but not yet acknowledged.
    unfinished: usize,
    closed: bool,
}

/// Work queue of directories still to list.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    /// Signalled when an item is pushed or the queue is closed.
    available: Condvar,
    /// Signalled when `unfinished` drops to zero or the queue is closed.
    drained: Condvar,
    idle_tx: Sender<()>,
    idle_rx: Receiver<()>,
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (idle_tx, idle_rx) = bounded(1);
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            drained: Condvar::new(),
            idle_tx,
            idle_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push an item and count it as unfinished.
    ///
    /// Returns `false` if the queue is closed; the item is dropped.
    pub fn push(&self, item: WorkItem) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.unfinished += 1;
        state.stack.push(item);
        drop(state);

        self.available.notify_one();
        true
    }

    /// Take the most recently pushed item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<WorkItem> {
        let state = self.lock();
        let mut state = self
            .available
            .wait_while(state, |s| !s.closed && s.stack.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        state.stack.pop()
    }

    /// Mark one popped item as done.
    ///
    /// Wakes every joiner when nothing is left unfinished.
    pub fn acknowledge(&self) {
        let mut state = self.lock();
        debug_assert!(state.unfinished > 0, "acknowledge without matching push");
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            drop(state);
            self.drained.notify_all();
            // A pending token already says the same thing.
            let _ = self.idle_tx.try_send(());
        }
    }

    /// Block until every pushed item has been acknowledged.
    ///
    /// Returns `false` if the queue was closed with work still unfinished.
    pub fn join(&self) -> bool {
        let state = self.lock();
        let state = self
            .drained
            .wait_while(state, |s| !s.closed && s.unfinished > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.unfinished == 0
    }

    /// Like [`join`](Self::join), giving up after `timeout`.
    ///
    /// Returns `true` if nothing was unfinished when it returned.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .drained
            .wait_timeout_while(state, timeout, |s| !s.closed && s.unfinished > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.unfinished == 0
    }

    /// Receiver that gets a token whenever the unfinished count reaches zero.
    ///
    /// Tokens may be stale; check [`is_idle`](Self::is_idle) after waking.
    pub fn idle_signal(&self) -> Receiver<()> {
        self.idle_rx.clone()
    }

    /// Check whether every pushed item has been acknowledged.
    pub fn is_idle(&self) -> bool {
        self.lock().unfinished == 0
    }

    /// Number of items waiting to be popped.
    pub fn len(&self) -> usize {
        self.lock().stack.len()
    }

    /// Check if no items are waiting to be popped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items pushed but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }

    /// Close the queue: pending and future pops return `None`, joiners wake.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
        self.drained.notify_all();
    }

    /// Check whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pop_is_lifo() {
        let queue = WorkQueue::new();
        queue.push(WorkItem::root("/a"));
        queue.push(WorkItem::root("/b"));
        queue.push(WorkItem::root("/c"));

        let order: Vec<_> = (0..3)
            .map(|_| queue.pop().unwrap().path.display().to_string())
            .collect();
        assert_eq!(order, vec!["/c", "/b", "/a"]);
    }

    #[test]
    fn test_unfinished_tracks_acknowledgements() {
        let queue = WorkQueue::new();
        assert!(queue.is_idle());

        queue.push(WorkItem::root("/a"));
        queue.push(WorkItem::root("/b"));
        assert_eq!(queue.unfinished(), 2);

        queue.pop().unwrap();
        assert_eq!(queue.unfinished(), 2);
        assert_eq!(queue.len(), 1);

        queue.acknowledge();
        assert_eq!(queue.unfinished(), 1);
        assert!(!queue.join_timeout(Duration::from_millis(5)));

        queue.pop().unwrap();
        queue.acknowledge();
        assert!(queue.is_idle());
        assert!(queue.join_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_join_wakes_on_last_acknowledge() {
        let queue = Arc::new(WorkQueue::new());
        queue.push(WorkItem::root("/root"));

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let item = queue.pop().unwrap();
                queue.push(item.child("/root/sub"));
                queue.acknowledge();
                queue.pop().unwrap();
                thread::sleep(Duration::from_millis(20));
                queue.acknowledge();
            })
        };

        assert!(queue.join());
        assert_eq!(queue.unfinished(), 0);
        worker.join().unwrap();
    }

    #[test]
    fn test_idle_signal() {
        let queue = WorkQueue::new();
        let idle = queue.idle_signal();

        queue.push(WorkItem::root("/a"));
        assert!(idle.try_recv().is_err());

        queue.pop().unwrap();
        queue.acknowledge();
        assert!(idle.try_recv().is_ok());
    }

    #[test]
    fn test_close_releases_blocked_pop() {
        let queue = Arc::new(WorkQueue::new());
        let popper = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(popper.join().unwrap().is_none());
        assert!(!queue.push(WorkItem::root("/late")));
    }

    #[test]
    fn test_many_pushes_never_block() {
        // The queue is unbounded: a single thread can push far more items
        // than any worker pool would hold without anyone popping.
        let queue = WorkQueue::new();
        for i in 0..10_000 {
            assert!(queue.push(WorkItem::new(format!("/d{i}"), 1)));
        }
        assert_eq!(queue.len(), 10_000);
        assert_eq!(queue.unfinished(), 10_000);
    }
}
