//! Wire-frame ingest path
//!
//! Raw frames come in, typed messages go onto the input ring. Every
//! failure mode is a counter, never an exception: undecodable frames bump
//! the parser's error count, unconvertible ones are skipped, and a full
//! ring bumps the queue's drop count.

use bus::FeedProducer;
use common::{MarketMessage, Ts};
use feeds::{FixParser, ParserConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Outcome of feeding one frame through the ingest path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Frame decoded and published
    Published,
    /// Frame failed to decode or convert; counted and skipped
    Rejected,
    /// Frame decoded but the ring was full; counted and dropped
    Dropped,
}

/// Decodes frames and publishes them into the pipeline
pub struct Ingestor {
    parser: FixParser,
    producer: FeedProducer<MarketMessage>,
    rejected: AtomicU64,
}

impl Ingestor {
    /// Create an ingest path over the producing half of the input queue
    #[must_use]
    pub fn new(config: ParserConfig, producer: FeedProducer<MarketMessage>) -> Self {
        Self {
            parser: FixParser::new(config),
            producer,
            rejected: AtomicU64::new(0),
        }
    }

    /// Decode one frame and publish the resulting message
    pub fn ingest(&mut self, frame: &[u8]) -> IngestOutcome {
        let receive_ts = Ts::now();
        let parsed = match self.parser.parse(frame, receive_ts) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "frame rejected by decoder");
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return IngestOutcome::Rejected;
            }
        };
        let msg = match self.parser.to_message(&parsed) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "frame not convertible to a message");
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return IngestOutcome::Rejected;
            }
        };
        if self.producer.publish(msg) {
            IngestOutcome::Published
        } else {
            IngestOutcome::Dropped
        }
    }

    /// Frames decoded successfully since start
    #[must_use]
    pub fn messages_parsed(&self) -> u64 {
        self.parser.messages_parsed()
    }

    /// Frames the decoder rejected
    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parser.parse_errors()
    }

    /// Frames rejected at either decode or conversion stage
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Messages dropped against a full ring
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.producer.dropped_count()
    }
}
