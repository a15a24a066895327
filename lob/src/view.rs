//! Egress views for the fan-out layer
//!
//! Serialisable projections of book and market state in the shapes the
//! downstream consumers expect; prices leave the fixed-point domain here.

use crate::book::Book;
use crate::manager::BookManager;
use common::constants::SNAPSHOT_DEPTH;
use common::time::epoch_millis;
use serde::Serialize;

/// One depth level in display units
#[derive(Debug, Clone, Serialize)]
pub struct LevelView {
    /// Level price
    pub price: f64,
    /// Resting quantity
    pub quantity: u64,
    /// Contributing orders
    pub orders: u32,
}

/// Rolling statistics in display units
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsView {
    /// Last trade price
    pub last_price: f64,
    /// Session high
    pub high: f64,
    /// Session low
    pub low: f64,
    /// First trade price
    pub open: f64,
    /// Volume-weighted average price
    pub vwap: f64,
    /// Total traded quantity
    pub volume: u64,
    /// Trades applied
    pub trade_count: u64,
    /// Annualised realised volatility
    pub volatility: f64,
}

/// Full per-symbol snapshot shipped to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    /// Instrument
    pub symbol: String,
    /// Wall-clock milliseconds since epoch
    pub timestamp: u64,
    /// Best bid, zero when empty
    pub best_bid: f64,
    /// Best ask, zero when empty
    pub best_ask: f64,
    /// Midpoint, zero unless two-sided
    pub mid_price: f64,
    /// Best-ask minus best-bid, zero unless two-sided
    pub spread: f64,
    /// Size-weighted midpoint
    pub weighted_mid: f64,
    /// Top-five depth imbalance in [-1, 1]
    pub imbalance: f64,
    /// Bid depth, highest price first
    pub bids: Vec<LevelView>,
    /// Ask depth, lowest price first
    pub asks: Vec<LevelView>,
    /// Rolling statistics
    pub statistics: StatisticsView,
}

/// Per-symbol line of the consolidated market summary
#[derive(Debug, Clone, Serialize)]
pub struct SymbolSummary {
    /// Instrument
    pub symbol: String,
    /// Best bid
    pub best_bid: f64,
    /// Best ask
    pub best_ask: f64,
    /// Midpoint
    pub mid_price: f64,
    /// Spread
    pub spread: f64,
    /// Depth imbalance
    pub imbalance: f64,
    /// Total traded quantity
    pub volume: u64,
    /// Trades applied
    pub trade_count: u64,
    /// Annualised realised volatility
    pub volatility: f64,
}

/// Consolidated view over every live book
#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    /// Number of live books
    pub total_symbols: usize,
    /// Book-touching messages applied since start
    pub total_updates: u64,
    /// Wall-clock milliseconds since epoch
    pub timestamp: u64,
    /// Per-symbol lines
    pub symbols: Vec<SymbolSummary>,
}

impl Book {
    /// Project this book into the egress snapshot shape, `depth` levels
    /// per side
    #[must_use]
    pub fn view(&self, depth: usize) -> BookView {
        let stats = self.statistics();
        BookView {
            symbol: self.symbol().to_string(),
            timestamp: epoch_millis(),
            best_bid: self.best_bid().as_f64(),
            best_ask: self.best_ask().as_f64(),
            mid_price: self.mid_price().as_f64(),
            spread: self.spread().as_f64(),
            weighted_mid: self.weighted_mid(),
            imbalance: self.imbalance(),
            bids: self
                .top_bids(depth)
                .into_iter()
                .map(|level| LevelView {
                    price: level.price.as_f64(),
                    quantity: level.quantity.as_u64(),
                    orders: level.order_count,
                })
                .collect(),
            asks: self
                .top_asks(depth)
                .into_iter()
                .map(|level| LevelView {
                    price: level.price.as_f64(),
                    quantity: level.quantity.as_u64(),
                    orders: level.order_count,
                })
                .collect(),
            statistics: StatisticsView {
                last_price: stats.last_price.as_f64(),
                high: stats.high.as_f64(),
                low: stats.low.as_f64(),
                open: stats.open.as_f64(),
                vwap: stats.vwap.as_f64(),
                volume: stats.total_volume.as_u64(),
                trade_count: stats.trade_count,
                volatility: stats.volatility(),
            },
        }
    }

    /// Default-depth snapshot (ten levels per side)
    #[must_use]
    pub fn snapshot_view(&self) -> BookView {
        self.view(SNAPSHOT_DEPTH)
    }
}

impl BookManager {
    /// Consolidated summary over every live book
    #[must_use]
    pub fn market_summary(&self) -> MarketSummary {
        let mut symbols = Vec::with_capacity(self.symbol_count());
        self.for_each_book(|symbol, book| {
            let stats = book.statistics();
            symbols.push(SymbolSummary {
                symbol: symbol.to_string(),
                best_bid: book.best_bid().as_f64(),
                best_ask: book.best_ask().as_f64(),
                mid_price: book.mid_price().as_f64(),
                spread: book.spread().as_f64(),
                imbalance: book.imbalance(),
                volume: stats.total_volume.as_u64(),
                trade_count: stats.trade_count,
                volatility: stats.volatility(),
            });
        });
        symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        MarketSummary {
            total_symbols: symbols.len(),
            total_updates: self.total_updates(),
            timestamp: epoch_millis(),
            symbols,
        }
    }
}
