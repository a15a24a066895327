//! Per-symbol aggregate order book
//!
//! Sides are price-keyed ordered maps guarded by one reader-writer lock;
//! the best bid/ask pair is mirrored into atomics after every mutation so
//! top-of-book readers never take the lock. Statistics live behind their
//! own mutex because both the aggregator and summary readers touch them.

use crate::stats::Statistics;
use common::constants::IMBALANCE_DEPTH;
use common::{BookLevel, Px, Qty, Quote, Side, Symbol, Trade, Ts};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use thiserror::Error;

/// Fatal book invariant violations
///
/// Recoverable conditions (deletes against missing levels, under-sized
/// reductions) are clamped silently; these variants stop the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BookError {
    /// The atomic best-price cache disagrees with the ordered map
    #[error("best {side:?} cache {cached} disagrees with book {expected}")]
    BestPriceMismatch {
        /// Side whose cache is stale
        side: Side,
        /// Cached best price
        cached: Px,
        /// Best price recomputed from the map
        expected: Px,
    },
    /// A zero-quantity level became observable
    #[error("zero-quantity {side:?} level at {price}")]
    ZeroQuantityLevel {
        /// Side holding the level
        side: Side,
        /// Price of the empty level
        price: Px,
    },
    /// The VWAP accumulator left the fixed-point domain
    #[error("statistics accumulator overflow for {symbol}")]
    StatsOverflow {
        /// Symbol whose statistics overflowed
        symbol: Symbol,
    },
}

#[derive(Debug, Clone, Copy)]
struct LevelEntry {
    quantity: u64,
    order_count: u32,
}

#[derive(Default)]
struct Sides {
    bids: BTreeMap<i64, LevelEntry>,
    asks: BTreeMap<i64, LevelEntry>,
}

impl Sides {
    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<i64, LevelEntry> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn add(&mut self, side: Side, price: Px, qty: Qty) {
        let entry = self
            .side_mut(side)
            .entry(price.as_i64())
            .or_insert(LevelEntry {
                quantity: 0,
                order_count: 0,
            });
        entry.quantity = entry.quantity.saturating_add(qty.as_u64());
        entry.order_count = entry.order_count.saturating_add(1);
    }

    /// Reduce the level at `price` by `qty`, clamped at zero; empty levels
    /// are removed so they are never observable
    fn reduce(&mut self, side: Side, price: Px, qty: Qty) {
        let levels = self.side_mut(side);
        if let Some(entry) = levels.get_mut(&price.as_i64()) {
            entry.quantity = entry.quantity.saturating_sub(qty.as_u64());
            if entry.order_count > 0 {
                entry.order_count -= 1;
            }
            if entry.quantity == 0 {
                levels.remove(&price.as_i64());
            }
        }
    }

    fn best_bid(&self) -> i64 {
        self.bids.keys().next_back().copied().unwrap_or(0)
    }

    fn best_ask(&self) -> i64 {
        self.asks.keys().next().copied().unwrap_or(0)
    }
}

/// Aggregate book for one symbol
pub struct Book {
    symbol: Symbol,
    sides: RwLock<Sides>,
    /// Lock-free top-of-book cache; zero is the empty-side sentinel
    best_bid: AtomicI64,
    best_ask: AtomicI64,
    stats: Mutex<Statistics>,
    update_count: AtomicU64,
    latency_total_ns: AtomicU64,
    last_update_ns: AtomicU64,
}

impl Book {
    /// Create an empty book
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            sides: RwLock::new(Sides::default()),
            best_bid: AtomicI64::new(0),
            best_ask: AtomicI64::new(0),
            stats: Mutex::new(Statistics::default()),
            update_count: AtomicU64::new(0),
            latency_total_ns: AtomicU64::new(0),
            last_update_ns: AtomicU64::new(0),
        }
    }

    /// Symbol this book tracks
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Add `qty` at `price`, creating the level if absent
    pub fn apply_add(&self, price: Px, qty: Qty, side: Side, ts: Ts) {
        if qty.is_zero() {
            return;
        }
        let start = Ts::now();
        {
            let mut sides = self.sides.write();
            sides.add(side, price, qty);
            self.refresh_best(&sides);
        }
        self.touch(ts);
        self.record_mutation(start);
    }

    /// Move quantity between levels
    ///
    /// The upstream protocol is aggregate-level: the old level is reduced
    /// by the *new* quantity (clamped), then the new quantity is added at
    /// the new price.
    pub fn apply_modify(&self, old_price: Px, new_price: Px, new_qty: Qty, side: Side, ts: Ts) {
        if new_qty.is_zero() {
            return;
        }
        let start = Ts::now();
        {
            let mut sides = self.sides.write();
            sides.reduce(side, old_price, new_qty);
            sides.add(side, new_price, new_qty);
            self.refresh_best(&sides);
        }
        self.touch(ts);
        self.record_mutation(start);
    }

    /// Subtract `qty` from the level at `price`, clamped at zero
    ///
    /// Deletes against missing or under-sized levels are absorbed; the
    /// upstream resynchronises through snapshots.
    pub fn apply_delete(&self, price: Px, qty: Qty, side: Side, ts: Ts) {
        let start = Ts::now();
        {
            let mut sides = self.sides.write();
            sides.reduce(side, price, qty);
            self.refresh_best(&sides);
        }
        self.touch(ts);
        self.record_mutation(start);
    }

    /// Fold a trade into the statistics; the book levels are untouched
    pub fn apply_trade(&self, trade: &Trade) -> Result<(), BookError> {
        self.stats
            .lock()
            .record_trade(self.symbol, trade.price, trade.quantity, trade.ts)?;
        self.touch(trade.ts);
        Ok(())
    }

    /// Replace the book with the quote's top of book
    pub fn apply_quote(&self, quote: &Quote) {
        {
            let mut sides = self.sides.write();
            sides.bids.clear();
            sides.asks.clear();
            if quote.bid_px.as_i64() > 0 && !quote.bid_sz.is_zero() {
                sides.bids.insert(
                    quote.bid_px.as_i64(),
                    LevelEntry {
                        quantity: quote.bid_sz.as_u64(),
                        order_count: 1,
                    },
                );
            }
            if quote.ask_px.as_i64() > 0 && !quote.ask_sz.is_zero() {
                sides.asks.insert(
                    quote.ask_px.as_i64(),
                    LevelEntry {
                        quantity: quote.ask_sz.as_u64(),
                        order_count: 1,
                    },
                );
            }
            self.refresh_best(&sides);
        }
        self.stats
            .lock()
            .record_quote(quote.bid_px, quote.ask_px, quote.ts);
        self.touch(quote.ts);
    }

    /// Replace both sides from a full snapshot; zero-quantity levels are
    /// dropped
    pub fn apply_snapshot(&self, bids: &[BookLevel], asks: &[BookLevel], ts: Ts) {
        let mut sides = self.sides.write();
        sides.bids.clear();
        sides.asks.clear();
        for level in bids {
            if !level.quantity.is_zero() {
                sides.bids.insert(
                    level.price.as_i64(),
                    LevelEntry {
                        quantity: level.quantity.as_u64(),
                        order_count: level.order_count.max(1),
                    },
                );
            }
        }
        for level in asks {
            if !level.quantity.is_zero() {
                sides.asks.insert(
                    level.price.as_i64(),
                    LevelEntry {
                        quantity: level.quantity.as_u64(),
                        order_count: level.order_count.max(1),
                    },
                );
            }
        }
        self.refresh_best(&sides);
        drop(sides);
        self.touch(ts);
    }

    /// Best bid from the lock-free cache; zero when the side is empty
    #[inline]
    #[must_use]
    pub fn best_bid(&self) -> Px {
        Px::from_i64(self.best_bid.load(Ordering::Acquire))
    }

    /// Best ask from the lock-free cache; zero when the side is empty
    #[inline]
    #[must_use]
    pub fn best_ask(&self) -> Px {
        Px::from_i64(self.best_ask.load(Ordering::Acquire))
    }

    /// Midpoint of the best pair; zero unless both sides are populated
    #[must_use]
    pub fn mid_price(&self) -> Px {
        let bid = self.best_bid().as_i64();
        let ask = self.best_ask().as_i64();
        if bid > 0 && ask > 0 {
            Px::from_i64((bid + ask) / 2)
        } else {
            Px::ZERO
        }
    }

    /// Best-ask minus best-bid; zero unless both sides are populated
    #[must_use]
    pub fn spread(&self) -> Px {
        let bid = self.best_bid().as_i64();
        let ask = self.best_ask().as_i64();
        if bid > 0 && ask > 0 {
            Px::from_i64(ask - bid)
        } else {
            Px::ZERO
        }
    }

    /// Top `depth` bid levels, highest price first
    #[must_use]
    pub fn top_bids(&self, depth: usize) -> Vec<BookLevel> {
        let sides = self.sides.read();
        sides
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(&px, entry)| {
                BookLevel::new(Px::from_i64(px), Qty::new(entry.quantity), entry.order_count)
            })
            .collect()
    }

    /// Top `depth` ask levels, lowest price first
    #[must_use]
    pub fn top_asks(&self, depth: usize) -> Vec<BookLevel> {
        let sides = self.sides.read();
        sides
            .asks
            .iter()
            .take(depth)
            .map(|(&px, entry)| {
                BookLevel::new(Px::from_i64(px), Qty::new(entry.quantity), entry.order_count)
            })
            .collect()
    }

    /// Depth imbalance over the top five levels of each side, in [-1, 1]
    ///
    /// Zero when either side is empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn imbalance(&self) -> f64 {
        let sides = self.sides.read();
        if sides.bids.is_empty() || sides.asks.is_empty() {
            return 0.0;
        }
        let bid_volume: u64 = sides
            .bids
            .values()
            .rev()
            .take(IMBALANCE_DEPTH)
            .map(|e| e.quantity)
            .sum();
        let ask_volume: u64 = sides
            .asks
            .values()
            .take(IMBALANCE_DEPTH)
            .map(|e| e.quantity)
            .sum();
        let total = bid_volume + ask_volume;
        if total == 0 {
            return 0.0;
        }
        (bid_volume as f64 - ask_volume as f64) / total as f64
    }

    /// Size-weighted midpoint in display units
    ///
    /// Each side's best price is weighted by the opposite side's size;
    /// falls back to the plain mid when either size is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn weighted_mid(&self) -> f64 {
        let bid = self.best_bid();
        let ask = self.best_ask();
        if bid.is_zero() || ask.is_zero() {
            return 0.0;
        }
        let sides = self.sides.read();
        let bid_size = sides.bids.get(&bid.as_i64()).map_or(0, |e| e.quantity);
        let ask_size = sides.asks.get(&ask.as_i64()).map_or(0, |e| e.quantity);
        drop(sides);
        let total = bid_size + ask_size;
        if bid_size == 0 || ask_size == 0 || total == 0 {
            return self.mid_price().as_f64();
        }
        (bid.as_f64() * ask_size as f64 + ask.as_f64() * bid_size as f64) / total as f64
    }

    /// Snapshot of the rolling statistics
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.stats.lock().clone()
    }

    /// Mean wall time spent applying book mutations, in nanoseconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_update_latency_ns(&self) -> f64 {
        let count = self.update_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.latency_total_ns.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Number of applied book mutations
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    /// Timestamp of the most recent applied update
    #[must_use]
    pub fn last_update(&self) -> Ts {
        Ts::from_nanos(self.last_update_ns.load(Ordering::Relaxed))
    }

    /// True when neither side holds a level
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let sides = self.sides.read();
        sides.bids.is_empty() && sides.asks.is_empty()
    }

    /// Verify the structural invariants the readers rely on
    pub fn validate(&self) -> Result<(), BookError> {
        let sides = self.sides.read();
        for (side, levels) in [(Side::Buy, &sides.bids), (Side::Sell, &sides.asks)] {
            for (&px, entry) in levels {
                if entry.quantity == 0 {
                    return Err(BookError::ZeroQuantityLevel {
                        side,
                        price: Px::from_i64(px),
                    });
                }
            }
        }
        let cached_bid = self.best_bid();
        let expected_bid = Px::from_i64(sides.best_bid());
        if cached_bid != expected_bid {
            return Err(BookError::BestPriceMismatch {
                side: Side::Buy,
                cached: cached_bid,
                expected: expected_bid,
            });
        }
        let cached_ask = self.best_ask();
        let expected_ask = Px::from_i64(sides.best_ask());
        if cached_ask != expected_ask {
            return Err(BookError::BestPriceMismatch {
                side: Side::Sell,
                cached: cached_ask,
                expected: expected_ask,
            });
        }
        Ok(())
    }

    fn refresh_best(&self, sides: &Sides) {
        self.best_bid.store(sides.best_bid(), Ordering::Release);
        self.best_ask.store(sides.best_ask(), Ordering::Release);
    }

    fn touch(&self, ts: Ts) {
        self.last_update_ns.store(ts.as_nanos(), Ordering::Relaxed);
    }

    fn record_mutation(&self, start: Ts) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        self.latency_total_ns
            .fetch_add(Ts::now().nanos_since(start), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Book {
        Book::new(Symbol::new("AAPL"))
    }

    fn quote(bid: f64, ask: f64, bid_sz: u64, ask_sz: u64) -> Quote {
        Quote {
            ts: Ts::from_nanos(1),
            symbol: Symbol::new("AAPL"),
            bid_px: Px::new(bid),
            ask_px: Px::new(ask),
            bid_sz: Qty::new(bid_sz),
            ask_sz: Qty::new(ask_sz),
        }
    }

    #[test]
    fn empty_book_reads_are_zero() {
        let book = book();
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), Px::ZERO);
        assert_eq!(book.best_ask(), Px::ZERO);
        assert_eq!(book.mid_price(), Px::ZERO);
        assert_eq!(book.spread(), Px::ZERO);
        assert_eq!(book.imbalance(), 0.0);
        assert_eq!(book.weighted_mid(), 0.0);
    }

    #[test]
    fn one_sided_book_has_no_mid_or_spread() {
        let book = book();
        book.apply_add(Px::new(150.0), Qty::new(100), Side::Buy, Ts::from_nanos(1));
        assert_eq!(book.best_bid(), Px::new(150.0));
        assert_eq!(book.mid_price(), Px::ZERO);
        assert_eq!(book.spread(), Px::ZERO);
        assert_eq!(book.imbalance(), 0.0);
    }

    #[test]
    fn quote_establishes_top_of_book() {
        let book = book();
        book.apply_quote(&quote(150.00, 150.02, 500, 750));

        assert_eq!(book.best_bid(), Px::new(150.00));
        assert_eq!(book.best_ask(), Px::new(150.02));
        assert_eq!(book.mid_price(), Px::new(150.01));
        assert_eq!(book.spread(), Px::new(0.02));
        // (150.00·750 + 150.02·500) / 1250 = 150.008
        assert!((book.weighted_mid() - 150.008).abs() < 1e-9);
        assert!(!book.is_empty());
    }

    #[test]
    fn quote_replaces_previous_levels() {
        let book = book();
        book.apply_add(Px::new(149.0), Qty::new(10), Side::Buy, Ts::from_nanos(1));
        book.apply_add(Px::new(151.0), Qty::new(10), Side::Sell, Ts::from_nanos(1));
        book.apply_quote(&quote(150.00, 150.02, 500, 750));
        assert_eq!(book.top_bids(10).len(), 1);
        assert_eq!(book.top_asks(10).len(), 1);
    }

    #[test]
    fn trade_updates_stats_not_levels() {
        let book = book();
        book.apply_quote(&quote(150.00, 150.02, 500, 750));
        let before_bids = book.top_bids(10);
        let before_asks = book.top_asks(10);

        let trade = Trade {
            ts: Ts::from_nanos(2),
            symbol: Symbol::new("AAPL"),
            price: Px::new(150.01),
            quantity: Qty::new(200),
            aggressor: Side::Buy,
            trade_id: 1,
        };
        book.apply_trade(&trade).unwrap();

        assert_eq!(book.top_bids(10), before_bids);
        assert_eq!(book.top_asks(10), before_asks);
        let stats = book.statistics();
        assert_eq!(stats.last_price, Px::new(150.01));
        assert_eq!(stats.total_volume, Qty::new(200));
        assert_eq!(stats.high, Px::new(150.01));
        assert_eq!(stats.low, Px::new(150.01));
        assert_eq!(stats.open, Px::new(150.01));
        assert_eq!(stats.vwap, Px::new(150.01));
        assert_eq!(stats.trade_count, 1);
    }

    #[test]
    fn imbalance_over_top_five_levels() {
        let book = book();
        for i in 0..5 {
            book.apply_add(
                Px::new(100.0 - f64::from(i) * 0.01),
                Qty::new(1000),
                Side::Buy,
                Ts::from_nanos(1),
            );
            book.apply_add(
                Px::new(100.10 + f64::from(i) * 0.01),
                Qty::new(500),
                Side::Sell,
                Ts::from_nanos(1),
            );
        }
        // (5000 - 2500) / 7500
        assert!((book.imbalance() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn delete_clamps_and_removes_empty_levels() {
        let book = book();
        book.apply_add(Px::new(150.0), Qty::new(100), Side::Buy, Ts::from_nanos(1));
        // Oversized delete clamps to zero and drops the level.
        book.apply_delete(Px::new(150.0), Qty::new(500), Side::Buy, Ts::from_nanos(2));
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), Px::ZERO);
        // Delete against a missing level is absorbed.
        book.apply_delete(Px::new(150.0), Qty::new(10), Side::Buy, Ts::from_nanos(3));
        assert!(book.validate().is_ok());
    }

    #[test]
    fn modify_decrements_old_level_then_adds() {
        let book = book();
        book.apply_add(Px::new(150.0), Qty::new(300), Side::Buy, Ts::from_nanos(1));
        book.apply_modify(
            Px::new(150.0),
            Px::new(150.1),
            Qty::new(100),
            Side::Buy,
            Ts::from_nanos(2),
        );

        let bids = book.top_bids(10);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, Px::new(150.1));
        assert_eq!(bids[0].quantity, Qty::new(100));
        assert_eq!(bids[1].price, Px::new(150.0));
        assert_eq!(bids[1].quantity, Qty::new(200));
        assert_eq!(book.best_bid(), Px::new(150.1));
    }

    #[test]
    fn snapshot_replaces_and_drops_zero_levels() {
        let book = book();
        book.apply_add(Px::new(1.0), Qty::new(1), Side::Buy, Ts::from_nanos(1));
        let bids = [
            BookLevel::new(Px::new(99.0), Qty::new(10), 2),
            BookLevel::new(Px::new(98.0), Qty::ZERO, 1),
        ];
        let asks = [BookLevel::new(Px::new(101.0), Qty::new(5), 1)];
        book.apply_snapshot(&bids, &asks, Ts::from_nanos(2));

        assert_eq!(book.top_bids(10).len(), 1);
        assert_eq!(book.best_bid(), Px::new(99.0));
        assert_eq!(book.best_ask(), Px::new(101.0));
        assert!(book.validate().is_ok());
    }

    #[test]
    fn book_returns_to_empty_state() {
        let book = book();
        book.apply_add(Px::new(10.0), Qty::new(5), Side::Sell, Ts::from_nanos(1));
        assert!(!book.is_empty());
        book.apply_delete(Px::new(10.0), Qty::new(5), Side::Sell, Ts::from_nanos(2));
        assert!(book.is_empty());
        assert_eq!(book.best_ask(), Px::ZERO);
    }

    #[test]
    fn mutations_update_latency_counters() {
        let book = book();
        book.apply_add(Px::new(1.0), Qty::new(1), Side::Buy, Ts::from_nanos(1));
        book.apply_add(Px::new(2.0), Qty::new(1), Side::Buy, Ts::from_nanos(2));
        assert_eq!(book.update_count(), 2);
        assert!(book.average_update_latency_ns() >= 0.0);
        assert_eq!(book.last_update(), Ts::from_nanos(2));
    }
}
