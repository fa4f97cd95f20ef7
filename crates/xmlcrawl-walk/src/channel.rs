//! Bounded channel carrying results from workers to the crawler.

use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender};

use xmlcrawl_core::CrawlItem;

use crate::cancel::CancelSignal;

/// Bounded result channel.
///
/// A full channel blocks the sending worker until the crawler catches up,
/// which caps memory used by results waiting for a slow consumer. There is
/// no close: the end of the stream is "work queue joined and channel empty".
#[derive(Debug)]
pub struct ResultChannel {
    tx: Sender<CrawlItem>,
    rx: Receiver<CrawlItem>,
    capacity: usize,
}

impl ResultChannel {
    /// Create a channel holding at most `capacity` pending items.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Handle for a worker.
    pub fn sender(&self) -> ResultSender {
        ResultSender {
            tx: self.tx.clone(),
        }
    }

    /// Take an item if one is waiting.
    pub fn try_receive(&self) -> Option<CrawlItem> {
        self.rx.try_recv().ok()
    }

    /// Block until an item is available.
    pub fn receive(&self) -> Option<CrawlItem> {
        self.rx.recv().ok()
    }

    /// Block until an item is available or `timeout` passes.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<CrawlItem> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Receiving side, for `select!`.
    pub fn receiver(&self) -> &Receiver<CrawlItem> {
        &self.rx
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if no items are pending.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of pending items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Sending half held by each worker.
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: Sender<CrawlItem>,
}

impl ResultSender {
    /// Send an item, blocking while the channel is full.
    ///
    /// Returns `false` if the crawl was cancelled before there was room.
    pub fn send(&self, item: CrawlItem, cancel: &CancelSignal) -> bool {
        select! {
            send(self.tx, item) -> res => res.is_ok(),
            recv(cancel.receiver()) -> _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;
    use std::time::SystemTime;

    use xmlcrawl_core::FoundFile;

    fn found(name: &str) -> CrawlItem {
        CrawlItem::Found(FoundFile {
            path: PathBuf::from(name),
            content: Vec::new(),
            modified: SystemTime::UNIX_EPOCH,
        })
    }

    fn path_of(item: CrawlItem) -> String {
        match item {
            CrawlItem::Found(file) => file.path.display().to_string(),
            CrawlItem::Fatal(failure) => panic!("unexpected failure: {failure}"),
        }
    }

    #[test]
    fn test_try_receive_empty() {
        let channel = ResultChannel::new(5);
        assert!(channel.try_receive().is_none());
        assert_eq!(channel.capacity(), 5);
    }

    #[test]
    fn test_backpressure_blocks_and_loses_nothing() {
        let channel = ResultChannel::new(2);
        let sender = channel.sender();
        let cancel = CancelSignal::new();

        let producer = {
            let cancel = cancel.clone();
            thread::spawn(move || (0..6).all(|i| sender.send(found(&format!("/{i}.xml")), &cancel)))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(channel.len(), 2);
        assert!(!producer.is_finished());

        let mut received = Vec::new();
        while received.len() < 6 {
            let item = channel.receive_timeout(Duration::from_secs(5)).unwrap();
            received.push(path_of(item));
        }

        assert!(producer.join().unwrap());
        let expected: Vec<_> = (0..6).map(|i| format!("/{i}.xml")).collect();
        assert_eq!(received, expected);
        assert!(channel.try_receive().is_none());
    }

    #[test]
    fn test_cancel_releases_blocked_sender() {
        let channel = ResultChannel::new(1);
        let sender = channel.sender();
        let cancel = CancelSignal::new();
        assert!(sender.send(found("/first.xml"), &cancel));

        let blocked = {
            let cancel = cancel.clone();
            thread::spawn(move || sender.send(found("/second.xml"), &cancel))
        };

        thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        assert!(!blocked.join().unwrap());
        assert_eq!(channel.len(), 1);
    }
}
