//! Crawl orchestration.
//!
//! The crawler owns the work queue, the result channel and the worker pool.
//! Its main loop alternates between handing finished results to the consumer
//! and waiting (bounded by the poll interval) for either a new result or the
//! queue going idle. Progress is reported whenever a poll interval passes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::select;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use xmlcrawl_core::{
    CrawlConfig, CrawlError, CrawlItem, CrawlProgress, CrawlSummary, FoundFile, FsOperation,
    WorkItem, WorkerId,
};

use crate::cancel::CancelSignal;
use crate::channel::ResultChannel;
use crate::filter::EntryFilter;
use crate::fs::{FileSystem, LocalFs};
use crate::progress::CrawlCounters;
use crate::queue::WorkQueue;
use crate::retry::{RetryError, RetryPolicy};
use crate::worker::{Worker, WorkerContext, WorkerExit};

/// Buffer size of the progress broadcast channel.
const PROGRESS_CHANNEL_SIZE: usize = 100;

/// Boxed error returned by a consumer.
type ConsumerError = Box<dyn std::error::Error + Send + Sync>;

/// A crawl session: worker pool, queues and the loop that drives them.
pub struct Crawler {
    config: Arc<CrawlConfig>,
    fs: Arc<dyn FileSystem>,
    retry: RetryPolicy,
    queue: Arc<WorkQueue>,
    results: ResultChannel,
    counters: Arc<CrawlCounters>,
    cancel: CancelSignal,
    workers: Vec<Worker>,
    progress_tx: broadcast::Sender<CrawlProgress>,
    files_delivered: u64,
    start_time: Instant,
}

impl Crawler {
    /// Create a crawler over the local filesystem and spawn its workers.
    pub fn new(config: CrawlConfig) -> Result<Self, CrawlError> {
        let fs = Arc::new(LocalFs::new(config.follow_symlinks));
        Self::with_filesystem(config, fs)
    }

    /// Create a crawler over any [`FileSystem`] and spawn its workers.
    pub fn with_filesystem<F: FileSystem>(
        config: CrawlConfig,
        fs: Arc<F>,
    ) -> Result<Self, CrawlError> {
        config.validate()?;
        let filter = Arc::new(EntryFilter::new(&config)?);
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_SIZE);

        let mut crawler = Self {
            results: ResultChannel::new(config.result_capacity),
            fs: Arc::clone(&fs) as Arc<dyn FileSystem>,
            retry: RetryPolicy::new(config.retry.clone()),
            config: Arc::new(config),
            queue: Arc::new(WorkQueue::new()),
            counters: Arc::new(CrawlCounters::new()),
            cancel: CancelSignal::new(),
            workers: Vec::new(),
            progress_tx,
            files_delivered: 0,
            start_time: Instant::now(),
        };

        let ctx = WorkerContext {
            fs,
            filter,
            retry: crawler.retry.clone(),
            queue: Arc::clone(&crawler.queue),
            results: crawler.results.sender(),
            counters: Arc::clone(&crawler.counters),
            cancel: crawler.cancel.clone(),
        };
        // On error, dropping `crawler` shuts down the workers spawned so far.
        for id in 0..crawler.config.worker_count() {
            let worker = Worker::spawn(WorkerId(id), ctx.clone())?;
            crawler.workers.push(worker);
        }

        debug!(count = crawler.workers.len(), "Workers spawned");
        Ok(crawler)
    }

    /// Configuration of this session.
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Subscribe to progress updates, sent once per poll interval.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlProgress> {
        self.progress_tx.subscribe()
    }

    /// Signal that cancels this crawl when triggered, e.g. from a Ctrl-C handler.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Queue a directory to crawl. Returns immediately.
    pub fn start(&self, root: impl Into<PathBuf>) {
        let root = root.into();
        debug!(root = %root.display(), "Seeding crawl");
        self.queue.push(WorkItem::root(root));
    }

    /// Crawl the configured root, handing each discovered file to `consumer`.
    ///
    /// Workers are shut down and joined before this returns, whatever the
    /// outcome. Files delivered before a failure stay delivered.
    pub fn run<C, E>(mut self, consumer: C) -> Result<CrawlSummary, CrawlError>
    where
        C: FnMut(FoundFile) -> Result<(), E>,
        E: Into<ConsumerError>,
    {
        let root = self.config.root.clone();
        self.check_root(&root)?;

        info!(
            root = %root.display(),
            workers = self.workers.len(),
            "Starting crawl"
        );
        self.start_time = Instant::now();
        self.start(&root);
        let result = self.wait(consumer);
        self.shutdown();

        match &result {
            Ok(summary) => info!(
                files = summary.files_delivered,
                dirs = summary.dirs_listed,
                secs = summary.elapsed.as_secs_f64(),
                "Crawl completed"
            ),
            Err(err) => warn!(error = %err, "Crawl did not complete"),
        }
        result
    }

    /// Fail unless `root` is a directory. Transient errors are retried.
    fn check_root(&self, root: &Path) -> Result<(), CrawlError> {
        let is_dir = self.retry.run(
            &self.cancel,
            |attempt, err| {
                self.counters.record_retry(FsOperation::List);
                debug!(path = %root.display(), attempt, error = %err, "Root check failed, retrying");
            },
            || self.fs.is_dir(root),
        );

        match is_dir {
            Ok(true) => Ok(()),
            Ok(false) => Err(CrawlError::NotADirectory {
                path: root.to_path_buf(),
            }),
            Err(RetryError::Cancelled) => Err(CrawlError::Interrupted),
            Err(RetryError::NonTransient { source, .. } | RetryError::Exhausted { source, .. }) => {
                Err(CrawlError::io(root, source))
            }
        }
    }

    /// Drive the crawl until every queued directory is done.
    pub fn wait<C, E>(&mut self, mut consumer: C) -> Result<CrawlSummary, CrawlError>
    where
        C: FnMut(FoundFile) -> Result<(), E>,
        E: Into<ConsumerError>,
    {
        let idle = self.queue.idle_signal();
        let results_rx = self.results.receiver().clone();
        let cancel_rx = self.cancel.receiver().clone();
        let poll_interval = self.config.poll_interval();
        let mut last_report = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                info!("Crawl cancelled");
                return Err(CrawlError::Interrupted);
            }

            self.drain_available(&mut consumer)?;
            self.check_workers(&mut consumer)?;

            if self.queue.is_idle() {
                // Results are sent before their directory is acknowledged, so
                // once joined everything is already in the channel.
                self.queue.join();
                self.drain_available(&mut consumer)?;
                if self.queue.is_idle() {
                    break;
                }
                continue;
            }

            select! {
                recv(results_rx) -> item => {
                    if let Ok(item) = item {
                        self.deliver(item, &mut consumer)?;
                    }
                }
                recv(idle) -> _ => {}
                recv(cancel_rx) -> _ => {}
                default(poll_interval) => {}
            }

            if last_report.elapsed() >= poll_interval {
                self.report_progress();
                last_report = Instant::now();
            }
        }

        Ok(CrawlSummary::from(self.progress()))
    }

    /// Hand every result waiting in the channel to `consumer`.
    ///
    /// Returns the number of files delivered. A fatal sentinel ends the
    /// drain with [`CrawlError::Aborted`].
    pub fn drain_available<C, E>(&mut self, consumer: &mut C) -> Result<usize, CrawlError>
    where
        C: FnMut(FoundFile) -> Result<(), E>,
        E: Into<ConsumerError>,
    {
        let mut delivered = 0;
        while let Some(item) = self.results.try_receive() {
            self.deliver(item, consumer)?;
            delivered += 1;
        }
        Ok(delivered)
    }

    fn deliver<C, E>(&mut self, item: CrawlItem, consumer: &mut C) -> Result<(), CrawlError>
    where
        C: FnMut(FoundFile) -> Result<(), E>,
        E: Into<ConsumerError>,
    {
        match item {
            CrawlItem::Found(file) => {
                let path = file.path.clone();
                consumer(file).map_err(|e| CrawlError::Consumer {
                    path,
                    source: e.into(),
                })?;
                self.files_delivered += 1;
                Ok(())
            }
            CrawlItem::Fatal(failure) => {
                warn!(worker = failure.worker.0, "Received fatal error from worker");
                Err(CrawlError::Aborted(failure))
            }
        }
    }

    /// Fail if a worker exited while the crawl was still running.
    fn check_workers<C, E>(&mut self, consumer: &mut C) -> Result<(), CrawlError>
    where
        C: FnMut(FoundFile) -> Result<(), E>,
        E: Into<ConsumerError>,
    {
        let Some(lost) = self.workers.iter().find(|w| w.is_finished()).map(Worker::id) else {
            return Ok(());
        };
        // A failing worker sends its sentinel before exiting; surface that first.
        self.drain_available(consumer)?;
        if self.cancel.is_cancelled() {
            return Err(CrawlError::Interrupted);
        }
        Err(CrawlError::WorkerLost { id: lost.0 })
    }

    /// Current progress.
    pub fn progress(&self) -> CrawlProgress {
        CrawlProgress {
            files_delivered: self.files_delivered,
            dirs_listed: self.counters.dirs_listed(),
            pending_dirs: self.queue.len(),
            unfinished_dirs: self.queue.unfinished(),
            pending_results: self.results.len(),
            list_retries: self.counters.list_retries(),
            read_retries: self.counters.read_retries(),
            elapsed: self.start_time.elapsed(),
        }
    }

    fn report_progress(&self) {
        let progress = self.progress();
        info!(
            files = progress.files_delivered,
            dirs = progress.dirs_listed,
            pending_dirs = progress.pending_dirs,
            pending_results = progress.pending_results,
            "Crawl progress"
        );
        // No subscribers is fine.
        let _ = self.progress_tx.send(progress);
    }

    /// Check whether every queued directory has been processed.
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    /// Number of worker threads still running.
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Cancel the crawl and join every worker thread.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.cancel.cancel();
        self.queue.close();

        for worker in self.workers.drain(..) {
            let id = worker.id();
            match worker.join() {
                Some(WorkerExit::Failed) => debug!(worker = id.0, "Joined failed worker"),
                Some(_) => {}
                None => warn!(worker = id.0, "Worker panicked"),
            }
        }
        debug!("All workers joined");
    }
}

impl Drop for Crawler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
