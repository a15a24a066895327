//! Core types for the market-data engine
//!
//! Everything here is a plain value type: fixed-point prices, unit
//! quantities, fixed-width symbols, monotonic timestamps, and the typed
//! message envelope that moves through the pipeline.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod constants;
pub mod message;
pub mod time;
pub mod types;

pub use message::{
    BookDelta, BookLevel, BookSnapshot, DeltaAction, MarketMessage, MarketPayload, Quote, Trade,
};
pub use time::{ClockCalibration, Ts};
pub use types::{MessageKind, Px, Qty, Side, Symbol};
