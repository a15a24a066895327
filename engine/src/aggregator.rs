//! Steady-state consumer loop
//!
//! One OS thread drains the input ring in small batches and dispatches
//! each message to the book manager. The loop never blocks: when the ring
//! is empty it sleeps for a microsecond instead of parking on a condition
//! variable. Recoverable conditions become counter increments; a fatal
//! book invariant violation clears the running flag and is reported back
//! through [`Aggregator::stop`].

use crate::metrics::PerformanceMetrics;
use bus::FeedConsumer;
use common::{MarketMessage, Ts};
use lob::{BookError, BookManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

/// Idle pause when the ring is empty
const IDLE_SLEEP: Duration = Duration::from_micros(1);

/// Pipeline-level failures
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `start` called while the consumer thread is alive
    #[error("aggregator is already running")]
    AlreadyRunning,
    /// The consumer thread stopped on a fatal book error
    #[error("pipeline halted: {0}")]
    Halted(#[from] BookError),
    /// The consumer thread could not be spawned
    #[error("failed to spawn aggregator thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The consumer thread panicked
    #[error("aggregator thread panicked")]
    ThreadPanicked,
}

/// The pipeline consumer: input ring in, book mutations out
pub struct Aggregator {
    books: Arc<BookManager>,
    metrics: Arc<PerformanceMetrics>,
    batch_size: usize,
    running: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<BookError>>>,
    consumer: Option<FeedConsumer<MarketMessage>>,
    handle: Option<JoinHandle<()>>,
}

impl Aggregator {
    /// Create an aggregator over the consuming half of the input queue
    #[must_use]
    pub fn new(
        consumer: FeedConsumer<MarketMessage>,
        books: Arc<BookManager>,
        metrics: Arc<PerformanceMetrics>,
        batch_size: usize,
    ) -> Self {
        Self {
            books,
            metrics,
            batch_size: batch_size.max(1),
            running: Arc::new(AtomicBool::new(false)),
            fatal: Arc::new(Mutex::new(None)),
            consumer: Some(consumer),
            handle: None,
        }
    }

    /// Shared book manager, for the fan-out layer and summaries
    #[must_use]
    pub fn book_manager(&self) -> Arc<BookManager> {
        Arc::clone(&self.books)
    }

    /// Shared metrics handle
    #[must_use]
    pub fn metrics(&self) -> Arc<PerformanceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// True while the consumer thread is processing
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the consumer thread
    pub fn start(&mut self) -> Result<(), EngineError> {
        let Some(mut consumer) = self.consumer.take() else {
            return Err(EngineError::AlreadyRunning);
        };
        self.running.store(true, Ordering::Release);

        let books = Arc::clone(&self.books);
        let metrics = Arc::clone(&self.metrics);
        let running = Arc::clone(&self.running);
        let fatal = Arc::clone(&self.fatal);
        let batch_size = self.batch_size;

        let handle = thread::Builder::new()
            .name("aggregator".into())
            .spawn(move || {
                info!("aggregator started");
                'run: while running.load(Ordering::Acquire) {
                    let mut drained = 0usize;
                    for msg in consumer.drain(batch_size) {
                        drained += 1;
                        if let Err(e) = dispatch(&books, &metrics, &msg) {
                            error!(cause = %e, "fatal book error, halting pipeline");
                            *fatal.lock() = Some(e);
                            running.store(false, Ordering::Release);
                            break 'run;
                        }
                    }
                    metrics.set_queue_depth(consumer.len() as u64);
                    if drained == 0 {
                        thread::sleep(IDLE_SLEEP);
                    }
                }

                // Graceful shutdown: drain whatever is still queued, unless
                // a fatal error stopped the loop.
                if fatal.lock().is_none() {
                    let mut residue = 0u64;
                    while let Some(msg) = consumer.poll() {
                        if let Err(e) = dispatch(&books, &metrics, &msg) {
                            error!(cause = %e, "fatal book error during drain");
                            *fatal.lock() = Some(e);
                            break;
                        }
                        residue += 1;
                    }
                    if residue > 0 {
                        info!(residue, "drained remaining messages on shutdown");
                    }
                }
                metrics.set_queue_depth(0);
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Clear the running flag, join the consumer, and surface any fatal
    /// cause
    ///
    /// The queue is drained before the thread exits, so every message
    /// published before `stop` reaches the books unless a fatal error
    /// intervened.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| EngineError::ThreadPanicked)?;
        }
        match self.fatal.lock().take() {
            Some(cause) => Err(EngineError::Halted(cause)),
            None => Ok(()),
        }
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[inline]
fn dispatch(
    books: &BookManager,
    metrics: &PerformanceMetrics,
    msg: &MarketMessage,
) -> Result<(), BookError> {
    books.apply(msg)?;
    metrics.record_latency(Ts::now().nanos_since(msg.receive_ts));
    Ok(())
}
