//! Market-data aggregation pipeline
//!
//! Binds the input ring, the wire decoder, and the book manager into a
//! bounded-latency consumer loop:
//!
//! - [`Aggregator`]: the steady-state thread draining the queue into books
//! - [`PerformanceMetrics`]: latency EMA, max tracking, and percentiles
//! - [`Ingestor`]: raw wire frames decoded and published into the queue
//! - [`MarketSimulator`]: synthetic multi-symbol feed for the binary and
//!   end-to-end tests
//! - [`EngineConfig`]: serde-backed configuration with production defaults

#![warn(missing_docs)]

pub mod aggregator;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod sim;

pub use aggregator::{Aggregator, EngineError};
pub use config::{EngineConfig, SimulatorConfig, SymbolSeed};
pub use ingest::{IngestOutcome, Ingestor};
pub use metrics::{MetricsSnapshot, PerformanceMetrics};
pub use sim::MarketSimulator;
