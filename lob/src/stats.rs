//! Rolling per-symbol trade statistics

use crate::book::BookError;
use common::constants::TRADING_DAYS_PER_YEAR;
use common::{Px, Qty, Symbol, Ts};

/// OHLC, VWAP, and activity statistics accumulated over applied trades
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Timestamp of the last applied update
    pub last_update: Ts,
    /// Price of the last applied trade
    pub last_price: Px,
    /// Session high
    pub high: Px,
    /// Session low
    pub low: Px,
    /// First trade price
    pub open: Px,
    /// Volume-weighted average price
    pub vwap: Px,
    /// Total traded quantity
    pub total_volume: Qty,
    /// Number of trades applied
    pub trade_count: u64,
    /// Spread captured from the most recent quote
    pub bid_ask_spread: Px,
}

impl Statistics {
    /// Fold one trade into the running statistics
    ///
    /// VWAP is maintained incrementally with 128-bit intermediates; an
    /// accumulator that no longer fits the fixed-point domain is a fatal
    /// invariant violation.
    pub fn record_trade(
        &mut self,
        symbol: Symbol,
        price: Px,
        quantity: Qty,
        ts: Ts,
    ) -> Result<(), BookError> {
        self.last_update = ts;
        self.last_price = price;

        if self.trade_count == 0 {
            self.open = price;
            self.high = price;
            self.low = price;
        } else {
            self.high = self.high.max(price);
            self.low = self.low.min(price);
        }

        let prev_value =
            i128::from(self.vwap.as_i64()) * i128::from(self.total_volume.as_u64());
        let trade_value = i128::from(price.as_i64()) * i128::from(quantity.as_u64());
        let volume_after = self
            .total_volume
            .as_u64()
            .checked_add(quantity.as_u64())
            .ok_or(BookError::StatsOverflow { symbol })?;

        self.total_volume = Qty::new(volume_after);
        self.trade_count += 1;

        if volume_after > 0 {
            let vwap = (prev_value + trade_value) / i128::from(volume_after);
            let vwap = i64::try_from(vwap).map_err(|_| BookError::StatsOverflow { symbol })?;
            self.vwap = Px::from_i64(vwap);
        }
        Ok(())
    }

    /// Fold one quote into the running statistics
    pub fn record_quote(&mut self, bid: Px, ask: Px, ts: Ts) {
        self.last_update = ts;
        self.bid_ask_spread = ask.sub(bid);
    }

    /// Parkinson range estimate of realised volatility, annualised by √252
    ///
    /// Zero until two trades have printed or while the session range is
    /// degenerate.
    #[must_use]
    pub fn volatility(&self) -> f64 {
        if self.trade_count < 2 || self.high == self.low {
            return 0.0;
        }
        let range = self.high.sub(self.low).as_f64();
        let mid = Px::from_i64((self.high.as_i64() + self.low.as_i64()) / 2).as_f64();
        if mid == 0.0 {
            return 0.0;
        }
        (range / mid) * TRADING_DAYS_PER_YEAR.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        Symbol::new("TEST")
    }

    #[test]
    fn first_trade_seeds_ohlc() {
        let mut stats = Statistics::default();
        stats
            .record_trade(sym(), Px::new(150.01), Qty::new(200), Ts::from_nanos(1))
            .unwrap();
        assert_eq!(stats.open, Px::new(150.01));
        assert_eq!(stats.high, Px::new(150.01));
        assert_eq!(stats.low, Px::new(150.01));
        assert_eq!(stats.last_price, Px::new(150.01));
        assert_eq!(stats.vwap, Px::new(150.01));
        assert_eq!(stats.total_volume, Qty::new(200));
        assert_eq!(stats.trade_count, 1);
    }

    #[test]
    fn high_low_track_extremes() {
        let mut stats = Statistics::default();
        for (px, qty) in [(100.0, 10), (103.0, 5), (99.0, 5)] {
            stats
                .record_trade(sym(), Px::new(px), Qty::new(qty), Ts::from_nanos(1))
                .unwrap();
        }
        assert_eq!(stats.open, Px::new(100.0));
        assert_eq!(stats.high, Px::new(103.0));
        assert_eq!(stats.low, Px::new(99.0));
    }

    #[test]
    fn vwap_is_exact_in_fixed_point() {
        // (100.00·10 + 101.00·20 + 102.00·70) / 100 = 101.60
        let mut stats = Statistics::default();
        for (px, qty) in [(100.00, 10), (101.00, 20), (102.00, 70)] {
            stats
                .record_trade(sym(), Px::new(px), Qty::new(qty), Ts::from_nanos(1))
                .unwrap();
        }
        assert_eq!(stats.vwap, Px::new(101.60));
        assert!((stats.vwap.as_f64() - 101.60).abs() < 1e-4);
    }

    #[test]
    fn volatility_needs_two_trades_and_a_range() {
        let mut stats = Statistics::default();
        assert_eq!(stats.volatility(), 0.0);
        stats
            .record_trade(sym(), Px::new(100.0), Qty::new(1), Ts::from_nanos(1))
            .unwrap();
        assert_eq!(stats.volatility(), 0.0);
        stats
            .record_trade(sym(), Px::new(100.0), Qty::new(1), Ts::from_nanos(2))
            .unwrap();
        // Two trades but a degenerate range is still zero.
        assert_eq!(stats.volatility(), 0.0);
        stats
            .record_trade(sym(), Px::new(110.0), Qty::new(1), Ts::from_nanos(3))
            .unwrap();
        let expected = (10.0 / 105.0) * 252.0_f64.sqrt();
        assert!((stats.volatility() - expected).abs() < 1e-9);
    }

    #[test]
    fn quote_records_spread() {
        let mut stats = Statistics::default();
        stats.record_quote(Px::new(99.5), Px::new(100.5), Ts::from_nanos(5));
        assert_eq!(stats.bid_ask_spread, Px::new(1.0));
        assert_eq!(stats.last_update, Ts::from_nanos(5));
    }
}
