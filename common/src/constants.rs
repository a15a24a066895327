//! Shared numeric constants

/// Fixed-point price scale: 1 tick = 0.0001 display units
pub const PRICE_SCALE: i64 = 10_000;

/// Nanoseconds per microsecond
pub const NANOS_PER_MICRO: u64 = 1_000;

/// Nanoseconds per millisecond
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Nanoseconds per second
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Default capacity of the pipeline input queue (power of two)
pub const DEFAULT_QUEUE_CAPACITY: usize = 131_072;

/// Messages drained per aggregator iteration
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Levels per side in egress snapshots
pub const SNAPSHOT_DEPTH: usize = 10;

/// Levels per side in the imbalance window
pub const IMBALANCE_DEPTH: usize = 5;

/// Trading days used to annualise realised volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
