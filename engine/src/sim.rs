//! Synthetic multi-symbol market feed
//!
//! Prices follow a geometric Brownian walk; sizes are log-normal; roughly
//! a third of generated events are trades and the rest quotes. The
//! simulator publishes either typed messages straight into the ring, or
//! wire frames through the full decode path, which exercises the builder,
//! parser and checksum machinery end to end.

use crate::config::SimulatorConfig;
use crate::ingest::Ingestor;
use bus::FeedProducer;
use common::{MarketMessage, Px, Qty, Quote, Side, Symbol, Trade, Ts};
use feeds::FixMessageBuilder;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// One second of walk time as a fraction of a trading year
const WALK_DT: f64 = 1.0 / (365.0 * 24.0 * 3600.0);

struct SymbolState {
    symbol: Symbol,
    name: String,
    price_ticks: i64,
    drift: f64,
    volatility: f64,
}

/// Where generated events go
enum Sink {
    /// Typed messages straight onto the ring
    Direct(FeedProducer<MarketMessage>),
    /// Wire frames through the decode path
    Wire(Box<Ingestor>),
}

#[derive(Default)]
struct Counters {
    generated: AtomicU64,
    trades: AtomicU64,
    quotes: AtomicU64,
}

/// Synthetic feed producer
pub struct MarketSimulator {
    trade_ratio: f64,
    pace: Duration,
    states: Vec<SymbolState>,
    sink: Option<Sink>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl MarketSimulator {
    /// Create a simulator publishing typed messages directly
    #[must_use]
    pub fn new(config: &SimulatorConfig, producer: FeedProducer<MarketMessage>) -> Self {
        Self::with_sink(config, Sink::Direct(producer))
    }

    /// Create a simulator publishing wire frames through an ingest path
    #[must_use]
    pub fn new_wire(config: &SimulatorConfig, ingestor: Ingestor) -> Self {
        Self::with_sink(config, Sink::Wire(Box::new(ingestor)))
    }

    fn with_sink(config: &SimulatorConfig, sink: Sink) -> Self {
        let mut states: Vec<SymbolState> = config
            .symbols
            .iter()
            .map(|(name, seed)| SymbolState {
                symbol: Symbol::new(name),
                name: name.clone(),
                price_ticks: Px::new(seed.start_price).as_i64().max(1),
                drift: 0.0001,
                volatility: seed.volatility,
            })
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            trade_ratio: config.trade_ratio,
            pace: Duration::from_micros(config.pace_micros),
            states,
            sink: Some(sink),
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            handle: None,
        }
    }

    /// Spawn the generation thread
    pub fn start(&mut self) -> std::io::Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        self.running.store(true, Ordering::Release);

        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);
        let mut states = std::mem::take(&mut self.states);
        let trade_ratio = self.trade_ratio;
        let pace = self.pace;

        let handle = thread::Builder::new().name("simulator".into()).spawn(move || {
            info!(symbols = states.len(), "simulator started");
            let mut rng = SmallRng::from_entropy();
            let mut builder = FixMessageBuilder::new();
            let price_noise = Normal::new(0.0, 1.0);
            let trade_sizes = LogNormal::new(6.0, 1.5);
            let quote_sizes = LogNormal::new(7.0, 1.0);

            while running.load(Ordering::Acquire) {
                for state in &mut states {
                    let is_trade = rng.gen::<f64>() < trade_ratio;
                    if is_trade {
                        let trade = next_trade(state, &mut rng, &price_noise, &trade_sizes, &counters);
                        counters.trades.fetch_add(1, Ordering::Relaxed);
                        emit_trade(&mut sink, &mut builder, &counters, &state.name, trade);
                    } else {
                        let quote = next_quote(state, &mut rng, &quote_sizes);
                        counters.quotes.fetch_add(1, Ordering::Relaxed);
                        emit_quote(&mut sink, &mut builder, &counters, &state.name, quote);
                    }
                }
                thread::sleep(pace);
            }
            info!(
                generated = counters.generated.load(Ordering::Relaxed),
                trades = counters.trades.load(Ordering::Relaxed),
                quotes = counters.quotes.load(Ordering::Relaxed),
                "simulator stopped"
            );
        })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the generation thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Messages generated so far
    #[must_use]
    pub fn messages_generated(&self) -> u64 {
        self.counters.generated.load(Ordering::Relaxed)
    }

    /// Trades generated so far
    #[must_use]
    pub fn trades_generated(&self) -> u64 {
        self.counters.trades.load(Ordering::Relaxed)
    }

    /// Quotes generated so far
    #[must_use]
    pub fn quotes_generated(&self) -> u64 {
        self.counters.quotes.load(Ordering::Relaxed)
    }
}

impl Drop for MarketSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn next_trade(
    state: &mut SymbolState,
    rng: &mut SmallRng,
    price_noise: &Result<Normal<f64>, rand_distr::NormalError>,
    trade_sizes: &Result<LogNormal<f64>, rand_distr::NormalError>,
    counters: &Counters,
) -> Trade {
    // Geometric Brownian step, floored at one tick.
    let z = price_noise.as_ref().map(|d| d.sample(rng)).unwrap_or(0.0);
    let change = state.drift * WALK_DT + state.volatility * WALK_DT.sqrt() * z;
    state.price_ticks = ((state.price_ticks as f64) * (1.0 + change)).max(1.0) as i64;

    let size = trade_sizes
        .as_ref()
        .map(|d| d.sample(rng).max(1.0) as u64)
        .unwrap_or(100);
    let aggressor = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };

    Trade {
        ts: Ts::now(),
        symbol: state.symbol,
        price: Px::from_i64(state.price_ticks),
        quantity: Qty::new(size),
        aggressor,
        trade_id: counters.trades.load(Ordering::Relaxed),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn next_quote(
    state: &mut SymbolState,
    rng: &mut SmallRng,
    quote_sizes: &Result<LogNormal<f64>, rand_distr::NormalError>,
) -> Quote {
    // Spread between 1bp and 10bp of the current price.
    let spread_frac = rng.gen_range(0.0001..0.001);
    let half_spread = (((state.price_ticks as f64) * spread_frac) / 2.0).max(1.0) as i64;

    let mut size = || {
        quote_sizes
            .as_ref()
            .map(|d| d.sample(rng).max(100.0) as u64)
            .unwrap_or(1_000)
    };
    let bid_sz = size();
    let ask_sz = size();

    Quote {
        ts: Ts::now(),
        symbol: state.symbol,
        bid_px: Px::from_i64((state.price_ticks - half_spread).max(1)),
        ask_px: Px::from_i64(state.price_ticks + half_spread),
        bid_sz: Qty::new(bid_sz),
        ask_sz: Qty::new(ask_sz),
    }
}

fn emit_trade(
    sink: &mut Sink,
    builder: &mut FixMessageBuilder,
    counters: &Counters,
    name: &str,
    trade: Trade,
) {
    let seq = counters.generated.fetch_add(1, Ordering::Relaxed);
    match sink {
        Sink::Direct(producer) => {
            producer.publish(MarketMessage::trade(seq, trade.ts, trade.ts, trade));
        }
        Sink::Wire(ingestor) => {
            let frame = builder.trade(name, trade.price, trade.quantity, trade.aggressor);
            ingestor.ingest(&frame);
        }
    }
}

fn emit_quote(
    sink: &mut Sink,
    builder: &mut FixMessageBuilder,
    counters: &Counters,
    name: &str,
    quote: Quote,
) {
    let seq = counters.generated.fetch_add(1, Ordering::Relaxed);
    match sink {
        Sink::Direct(producer) => {
            producer.publish(MarketMessage::quote(seq, quote.ts, quote.ts, quote));
        }
        Sink::Wire(ingestor) => {
            let frame = builder.quote(name, quote.bid_px, quote.ask_px, quote.bid_sz, quote.ask_sz);
            ingestor.ingest(&frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymbolSeed;
    use bus::FeedQueue;
    use rustc_hash::FxHashMap;
    use std::time::Instant;

    fn tiny_config() -> SimulatorConfig {
        let mut symbols = FxHashMap::default();
        symbols.insert(
            "AAPL".to_string(),
            SymbolSeed {
                start_price: 150.25,
                volatility: 0.02,
            },
        );
        SimulatorConfig {
            trade_ratio: 0.3,
            pace_micros: 10,
            wire_format: false,
            symbols,
        }
    }

    #[test]
    fn generates_messages_until_stopped() {
        let (producer, mut consumer) = FeedQueue::bounded(4096);
        let mut sim = MarketSimulator::new(&tiny_config(), producer);
        sim.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while sim.messages_generated() < 50 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        sim.stop();

        assert!(sim.messages_generated() >= 50);
        assert_eq!(
            sim.messages_generated(),
            sim.trades_generated() + sim.quotes_generated()
        );

        let mut saw_aapl = false;
        while let Some(msg) = consumer.poll() {
            if msg.symbol() == Some(Symbol::new("AAPL")) {
                saw_aapl = true;
            }
        }
        assert!(saw_aapl);
    }

    #[test]
    fn prices_stay_positive() {
        let (producer, mut consumer) = FeedQueue::bounded(4096);
        let mut config = tiny_config();
        config.trade_ratio = 1.0; // trades only
        let mut sim = MarketSimulator::new(&config, producer);
        sim.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        sim.stop();

        while let Some(msg) = consumer.poll() {
            if let common::MarketPayload::Trade(trade) = msg.payload {
                assert!(trade.price.as_i64() >= 1);
                assert!(trade.quantity.as_u64() >= 1);
            }
        }
    }
}
