//! Market-data engine binary
//!
//! Wires the input ring, aggregator, and simulated feed together, reports
//! statistics on an interval, and shuts the pipeline down cleanly when the
//! run duration elapses.

use anyhow::Result;
use bus::FeedQueue;
use clap::Parser;
use engine::{Aggregator, EngineConfig, Ingestor, MarketSimulator, PerformanceMetrics};
use feeds::ParserConfig;
use lob::BookManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Real-time market-data ingestion and aggregation engine
#[derive(Parser)]
#[command(name = "engine", version, about)]
struct Cli {
    /// Configuration file (TOML); defaults apply when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to run, in seconds
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Feed the pipeline through the wire decoder instead of typed messages
    #[arg(long)]
    wire: bool,

    /// Reject frames whose checksum does not match (wire mode)
    #[arg(long)]
    enforce_checksum: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine=info,lob=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => {
            let loaded = EngineConfig::from_file(path)?;
            info!(path = %path.display(), "loaded configuration");
            loaded
        }
        None => EngineConfig::default(),
    };
    if cli.wire {
        config.simulator.wire_format = true;
    }
    if cli.enforce_checksum {
        config.enforce_checksum = true;
    }

    info!(
        queue_capacity = config.queue_capacity,
        symbols = config.simulator.symbols.len(),
        wire = config.simulator.wire_format,
        "starting market-data engine"
    );

    let (producer, consumer) = FeedQueue::bounded(config.queue_capacity);
    let books = Arc::new(BookManager::new());
    let metrics = Arc::new(PerformanceMetrics::new());
    let mut aggregator = Aggregator::new(
        consumer,
        Arc::clone(&books),
        Arc::clone(&metrics),
        config.batch_size,
    );
    aggregator.start()?;

    let mut simulator = if config.simulator.wire_format {
        let ingestor = Ingestor::new(
            ParserConfig {
                enforce_checksum: config.enforce_checksum,
            },
            producer,
        );
        MarketSimulator::new_wire(&config.simulator, ingestor)
    } else {
        MarketSimulator::new(&config.simulator, producer)
    };
    simulator.start()?;

    let started = Instant::now();
    let run_for = Duration::from_secs(cli.duration_secs);
    let stats_every = Duration::from_secs(config.stats_interval_secs.max(1));
    let eviction_age = Duration::from_secs(config.eviction_age_secs);

    while started.elapsed() < run_for && aggregator.is_running() {
        std::thread::sleep(stats_every.min(run_for - started.elapsed().min(run_for)));

        let snap = metrics.snapshot();
        info!(
            uptime_secs = started.elapsed().as_secs(),
            generated = simulator.messages_generated(),
            processed = snap.messages_processed,
            avg_latency_ns = snap.avg_latency_ns,
            max_latency_ns = snap.max_latency_ns,
            p99_ns = snap.p99_ns,
            queue_depth = snap.queue_depth,
            symbols = books.symbol_count(),
            updates = books.total_updates(),
            "pipeline statistics"
        );

        let evicted = books.evict_stale(eviction_age, common::Ts::now());
        if evicted > 0 {
            debug!(evicted, "stale books evicted");
        }
    }

    simulator.stop();
    aggregator.stop()?;

    let snap = metrics.snapshot();
    let summary = books.market_summary();
    info!(
        runtime_secs = started.elapsed().as_secs(),
        generated = simulator.messages_generated(),
        trades = simulator.trades_generated(),
        quotes = simulator.quotes_generated(),
        processed = snap.messages_processed,
        avg_latency_ns = snap.avg_latency_ns,
        max_latency_ns = snap.max_latency_ns,
        p50_ns = snap.p50_ns,
        p99_ns = snap.p99_ns,
        p999_ns = snap.p999_ns,
        symbols = summary.total_symbols,
        updates = summary.total_updates,
        "final report"
    );
    let summary_json = serde_json::to_string(&summary)?;
    debug!(summary = %summary_json, "market summary");

    Ok(())
}
