//! Limit order books and derived market state
//!
//! One [`Book`] per symbol: price-sorted aggregate levels with O(log n)
//! mutation, an atomic best-price cache for lock-free top-of-book reads,
//! and rolling trade statistics. The [`BookManager`] owns the live set of
//! books behind a read-mostly lock and dispatches typed messages to them.

#![warn(missing_docs)]

pub mod book;
pub mod manager;
pub mod stats;
pub mod view;

pub use book::{Book, BookError};
pub use manager::BookManager;
pub use stats::Statistics;
pub use view::{BookView, LevelView, MarketSummary, StatisticsView, SymbolSummary};
