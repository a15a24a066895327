//! Order book mutation benchmarks

use common::{Px, Qty, Quote, Side, Symbol, Trade, Ts};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lob::{Book, BookManager};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn bench_adds(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_apply_add");
    for &levels in &[16u64, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(levels), &levels, |b, &levels| {
            let mut rng = SmallRng::seed_from_u64(7);
            let book = Book::new(Symbol::new("BENCH"));
            let ts = Ts::from_nanos(1);
            b.iter(|| {
                let price = 1_000_000 + rng.gen_range(0..levels as i64);
                let side = if rng.gen_bool(0.5) {
                    Side::Buy
                } else {
                    Side::Sell
                };
                book.apply_add(Px::from_i64(black_box(price)), Qty::new(100), side, ts);
            });
        });
    }
    group.finish();
}

fn bench_quote_replace(c: &mut Criterion) {
    c.bench_function("book_apply_quote", |b| {
        let book = Book::new(Symbol::new("BENCH"));
        let quote = Quote {
            ts: Ts::from_nanos(1),
            symbol: Symbol::new("BENCH"),
            bid_px: Px::new(150.00),
            ask_px: Px::new(150.02),
            bid_sz: Qty::new(500),
            ask_sz: Qty::new(750),
        };
        b.iter(|| book.apply_quote(black_box(&quote)));
    });
}

fn bench_trade_stats(c: &mut Criterion) {
    c.bench_function("book_apply_trade", |b| {
        let book = Book::new(Symbol::new("BENCH"));
        let mut rng = SmallRng::seed_from_u64(11);
        let mut trade_id = 0u64;
        b.iter(|| {
            trade_id += 1;
            let trade = Trade {
                ts: Ts::from_nanos(trade_id),
                symbol: Symbol::new("BENCH"),
                price: Px::from_i64(1_500_000 + rng.gen_range(-500..500)),
                quantity: Qty::new(rng.gen_range(1..1_000)),
                aggressor: Side::Buy,
                trade_id,
            };
            book.apply_trade(black_box(&trade)).unwrap();
        });
    });
}

fn bench_manager_dispatch(c: &mut Criterion) {
    c.bench_function("manager_top_of_book_read", |b| {
        let manager = BookManager::new();
        let book = manager.get_or_create(Symbol::new("READ"));
        book.apply_quote(&Quote {
            ts: Ts::from_nanos(1),
            symbol: Symbol::new("READ"),
            bid_px: Px::new(99.99),
            ask_px: Px::new(100.01),
            bid_sz: Qty::new(10),
            ask_sz: Qty::new(10),
        });
        b.iter(|| {
            let book = manager.get(Symbol::new("READ")).unwrap();
            black_box((book.best_bid(), book.best_ask()))
        });
    });
}

criterion_group!(
    benches,
    bench_adds,
    bench_quote_replace,
    bench_trade_stats,
    bench_manager_dispatch
);
criterion_main!(benches);
