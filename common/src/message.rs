//! In-flight message model
//!
//! Inbound market data is a tagged enum: the payload variants are the typed
//! events, and dispatch downstream is a compile-time `match`. Messages exist
//! only while crossing the pipeline; books never retain them.

use crate::time::Ts;
use crate::types::{MessageKind, Px, Qty, Side, Symbol};
use serde::{Deserialize, Serialize};

/// Executed trade print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Event timestamp
    pub ts: Ts,
    /// Instrument
    pub symbol: Symbol,
    /// Execution price
    pub price: Px,
    /// Executed quantity
    pub quantity: Qty,
    /// Side of the aggressing order
    pub aggressor: Side,
    /// Venue trade identifier
    pub trade_id: u64,
}

/// Top-of-book quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Event timestamp
    pub ts: Ts,
    /// Instrument
    pub symbol: Symbol,
    /// Best bid price
    pub bid_px: Px,
    /// Best ask price
    pub ask_px: Px,
    /// Size at the best bid
    pub bid_sz: Qty,
    /// Size at the best ask
    pub ask_sz: Qty,
}

/// Aggregated book level: price, resting quantity, contributing orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Level price
    pub price: Px,
    /// Total resting quantity
    pub quantity: Qty,
    /// Number of contributing orders
    pub order_count: u32,
}

impl BookLevel {
    /// Build a level
    #[must_use]
    pub const fn new(price: Px, quantity: Qty, order_count: u32) -> Self {
        Self {
            price,
            quantity,
            order_count,
        }
    }
}

/// What an incremental book delta does to its level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaAction {
    /// Add quantity at the price
    Add,
    /// Move quantity from a previous price to this one
    Modify {
        /// Level the quantity leaves
        prev_price: Px,
    },
    /// Remove quantity at the price
    Delete,
}

/// Incremental aggregate-level book update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDelta {
    /// Event timestamp
    pub ts: Ts,
    /// Instrument
    pub symbol: Symbol,
    /// Book side the delta applies to
    pub side: Side,
    /// Add / modify / delete
    pub action: DeltaAction,
    /// Target price level
    pub price: Px,
    /// Quantity moved
    pub quantity: Qty,
}

/// Full replacement of both book sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Event timestamp
    pub ts: Ts,
    /// Instrument
    pub symbol: Symbol,
    /// Bid levels, highest first
    pub bids: Vec<BookLevel>,
    /// Ask levels, lowest first
    pub asks: Vec<BookLevel>,
}

/// Typed payload of an inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketPayload {
    /// Trade print
    Trade(Trade),
    /// Top-of-book quote
    Quote(Quote),
    /// Incremental book update
    Delta(BookDelta),
    /// Full book refresh
    Snapshot(BookSnapshot),
    /// Keep-alive, accepted and ignored downstream
    Heartbeat,
    /// Exchange statistics broadcast, accepted and ignored downstream
    Statistics,
}

/// Envelope carried through the input queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMessage {
    /// Producer-assigned sequence number
    pub sequence: u64,
    /// When the feed handler received the event
    pub receive_ts: Ts,
    /// Venue timestamp, falls back to `receive_ts` when absent
    pub exchange_ts: Ts,
    /// Typed event
    pub payload: MarketPayload,
}

impl MarketMessage {
    /// Wrap a trade
    #[must_use]
    pub const fn trade(sequence: u64, receive_ts: Ts, exchange_ts: Ts, trade: Trade) -> Self {
        Self {
            sequence,
            receive_ts,
            exchange_ts,
            payload: MarketPayload::Trade(trade),
        }
    }

    /// Wrap a quote
    #[must_use]
    pub const fn quote(sequence: u64, receive_ts: Ts, exchange_ts: Ts, quote: Quote) -> Self {
        Self {
            sequence,
            receive_ts,
            exchange_ts,
            payload: MarketPayload::Quote(quote),
        }
    }

    /// Wrap an incremental delta
    #[must_use]
    pub const fn delta(sequence: u64, receive_ts: Ts, delta: BookDelta) -> Self {
        Self {
            sequence,
            receive_ts,
            exchange_ts: receive_ts,
            payload: MarketPayload::Delta(delta),
        }
    }

    /// Wrap a snapshot
    #[must_use]
    pub const fn snapshot(sequence: u64, receive_ts: Ts, snapshot: BookSnapshot) -> Self {
        Self {
            sequence,
            receive_ts,
            exchange_ts: receive_ts,
            payload: MarketPayload::Snapshot(snapshot),
        }
    }

    /// Wrap a heartbeat
    #[must_use]
    pub const fn heartbeat(sequence: u64, receive_ts: Ts) -> Self {
        Self {
            sequence,
            receive_ts,
            exchange_ts: receive_ts,
            payload: MarketPayload::Heartbeat,
        }
    }

    /// Kind discriminant of the payload
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match &self.payload {
            MarketPayload::Trade(_) => MessageKind::Trade,
            MarketPayload::Quote(_) => MessageKind::Quote,
            MarketPayload::Delta(d) => match d.action {
                DeltaAction::Add => MessageKind::OrderAdd,
                DeltaAction::Modify { .. } => MessageKind::OrderModify,
                DeltaAction::Delete => MessageKind::OrderDelete,
            },
            MarketPayload::Snapshot(_) => MessageKind::BookSnapshot,
            MarketPayload::Heartbeat => MessageKind::Heartbeat,
            MarketPayload::Statistics => MessageKind::Statistics,
        }
    }

    /// Instrument the payload targets, if any
    #[must_use]
    pub const fn symbol(&self) -> Option<Symbol> {
        match &self.payload {
            MarketPayload::Trade(t) => Some(t.symbol),
            MarketPayload::Quote(q) => Some(q.symbol),
            MarketPayload::Delta(d) => Some(d.symbol),
            MarketPayload::Snapshot(s) => Some(s.symbol),
            MarketPayload::Heartbeat | MarketPayload::Statistics => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_payload() {
        let sym = Symbol::new("AAPL");
        let ts = Ts::from_nanos(1);
        let trade = Trade {
            ts,
            symbol: sym,
            price: Px::new(150.0),
            quantity: Qty::new(100),
            aggressor: Side::Buy,
            trade_id: 7,
        };
        let msg = MarketMessage::trade(1, ts, ts, trade);
        assert_eq!(msg.kind(), MessageKind::Trade);
        assert_eq!(msg.symbol(), Some(sym));

        let delta = BookDelta {
            ts,
            symbol: sym,
            side: Side::Sell,
            action: DeltaAction::Modify {
                prev_price: Px::new(150.0),
            },
            price: Px::new(150.1),
            quantity: Qty::new(50),
        };
        assert_eq!(
            MarketMessage::delta(2, ts, delta).kind(),
            MessageKind::OrderModify
        );

        assert_eq!(MarketMessage::heartbeat(3, ts).kind(), MessageKind::Heartbeat);
        assert_eq!(MarketMessage::heartbeat(3, ts).symbol(), None);
    }

    #[test]
    fn envelope_serde_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let ts = Ts::from_nanos(42);
        let quote = Quote {
            ts,
            symbol: Symbol::new("MSFT"),
            bid_px: Px::new(320.70),
            ask_px: Px::new(320.80),
            bid_sz: Qty::new(500),
            ask_sz: Qty::new(750),
        };
        let msg = MarketMessage::quote(9, ts, ts, quote);
        let encoded = bincode::serialize(&msg)?;
        let decoded: MarketMessage = bincode::deserialize(&encoded)?;
        assert_eq!(msg, decoded);
        Ok(())
    }
}
