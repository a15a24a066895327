//! Symbol-to-book table with read-mostly concurrent access

use crate::book::{Book, BookError};
use ahash::AHashMap;
use common::{MarketMessage, MarketPayload, Symbol, Ts};
use common::message::DeltaAction;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Owner of the live set of per-symbol books
///
/// Lookups run under a shared lock so readers never contend with each
/// other; the exclusive lock is taken only for the rare creation, removal
/// and eviction paths. Books are shared out as `Arc`s and never move after
/// creation.
pub struct BookManager {
    books: RwLock<AHashMap<Symbol, Arc<Book>>>,
    total_updates: AtomicU64,
}

impl BookManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            books: RwLock::new(AHashMap::new()),
            total_updates: AtomicU64::new(0),
        }
    }

    /// Look up the book for `symbol`, creating it on first sight
    pub fn get_or_create(&self, symbol: Symbol) -> Arc<Book> {
        {
            let books = self.books.read();
            if let Some(book) = books.get(&symbol) {
                return Arc::clone(book);
            }
        }
        let mut books = self.books.write();
        let book = books
            .entry(symbol)
            .or_insert_with(|| {
                debug!(%symbol, "creating book");
                Arc::new(Book::new(symbol))
            });
        Arc::clone(book)
    }

    /// Look up the book for `symbol`
    #[must_use]
    pub fn get(&self, symbol: Symbol) -> Option<Arc<Book>> {
        self.books.read().get(&symbol).map(Arc::clone)
    }

    /// Drop the book for `symbol`; true when one existed
    pub fn remove(&self, symbol: Symbol) -> bool {
        self.books.write().remove(&symbol).is_some()
    }

    /// Drop books whose last update is older than `now - max_age`;
    /// returns how many were evicted
    pub fn evict_stale(&self, max_age: Duration, now: Ts) -> usize {
        let cutoff = now.as_nanos().saturating_sub(max_age.as_nanos() as u64);
        let stale: Vec<Symbol> = {
            let books = self.books.read();
            books
                .iter()
                .filter(|(_, book)| book.last_update().as_nanos() < cutoff)
                .map(|(symbol, _)| *symbol)
                .collect()
        };
        if stale.is_empty() {
            return 0;
        }
        let mut books = self.books.write();
        let mut evicted = 0;
        for symbol in stale {
            if books.remove(&symbol).is_some() {
                evicted += 1;
            }
        }
        info!(evicted, "evicted stale books");
        evicted
    }

    /// Dispatch one typed message to its book
    ///
    /// Heartbeats and statistics broadcasts are accepted and ignored.
    /// Only fatal invariant violations surface as errors.
    pub fn apply(&self, msg: &MarketMessage) -> Result<(), BookError> {
        match &msg.payload {
            MarketPayload::Trade(trade) => {
                self.get_or_create(trade.symbol).apply_trade(trade)?;
            }
            MarketPayload::Quote(quote) => {
                self.get_or_create(quote.symbol).apply_quote(quote);
            }
            MarketPayload::Delta(delta) => {
                let book = self.get_or_create(delta.symbol);
                match delta.action {
                    DeltaAction::Add => {
                        book.apply_add(delta.price, delta.quantity, delta.side, delta.ts);
                    }
                    DeltaAction::Modify { prev_price } => {
                        book.apply_modify(
                            prev_price,
                            delta.price,
                            delta.quantity,
                            delta.side,
                            delta.ts,
                        );
                    }
                    DeltaAction::Delete => {
                        book.apply_delete(delta.price, delta.quantity, delta.side, delta.ts);
                    }
                }
            }
            MarketPayload::Snapshot(snapshot) => {
                self.get_or_create(snapshot.symbol).apply_snapshot(
                    &snapshot.bids,
                    &snapshot.asks,
                    snapshot.ts,
                );
            }
            MarketPayload::Heartbeat | MarketPayload::Statistics => return Ok(()),
        }
        self.total_updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Symbols with a live book
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.books.read().keys().copied().collect()
    }

    /// Number of live books
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.books.read().len()
    }

    /// Book-touching messages applied since start
    #[must_use]
    pub fn total_updates(&self) -> u64 {
        self.total_updates.load(Ordering::Relaxed)
    }

    /// Run `f` over every live book
    pub fn for_each_book(&self, mut f: impl FnMut(&Symbol, &Arc<Book>)) {
        let books = self.books.read();
        for (symbol, book) in books.iter() {
            f(symbol, book);
        }
    }
}

impl Default for BookManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BookDelta, Px, Qty, Quote, Side, Trade};

    fn trade_msg(symbol: &str, px: f64, qty: u64, seq: u64) -> MarketMessage {
        let ts = Ts::from_nanos(seq);
        MarketMessage::trade(
            seq,
            ts,
            ts,
            Trade {
                ts,
                symbol: Symbol::new(symbol),
                price: Px::new(px),
                quantity: Qty::new(qty),
                aggressor: Side::Buy,
                trade_id: seq,
            },
        )
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let manager = BookManager::new();
        let a = manager.get_or_create(Symbol::new("AAPL"));
        let b = manager.get_or_create(Symbol::new("AAPL"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.symbol_count(), 1);
    }

    #[test]
    fn apply_routes_by_symbol() {
        let manager = BookManager::new();
        manager.apply(&trade_msg("AAPL", 150.0, 10, 1)).unwrap();
        manager.apply(&trade_msg("MSFT", 320.0, 5, 2)).unwrap();

        assert_eq!(manager.symbol_count(), 2);
        assert_eq!(manager.total_updates(), 2);
        let aapl = manager.get(Symbol::new("AAPL")).unwrap();
        assert_eq!(aapl.statistics().last_price, Px::new(150.0));
        assert!(manager.get(Symbol::new("TSLA")).is_none());
    }

    #[test]
    fn heartbeats_are_ignored_but_accepted() {
        let manager = BookManager::new();
        manager
            .apply(&MarketMessage::heartbeat(1, Ts::from_nanos(1)))
            .unwrap();
        assert_eq!(manager.symbol_count(), 0);
        assert_eq!(manager.total_updates(), 0);
    }

    #[test]
    fn deltas_dispatch_to_book_operations() {
        let manager = BookManager::new();
        let symbol = Symbol::new("NVDA");
        let ts = Ts::from_nanos(1);
        let add = BookDelta {
            ts,
            symbol,
            side: Side::Sell,
            action: DeltaAction::Add,
            price: Px::new(450.30),
            quantity: Qty::new(100),
        };
        manager.apply(&MarketMessage::delta(1, ts, add)).unwrap();
        let book = manager.get(symbol).unwrap();
        assert_eq!(book.best_ask(), Px::new(450.30));

        let delete = BookDelta {
            action: DeltaAction::Delete,
            ..add
        };
        manager.apply(&MarketMessage::delta(2, ts, delete)).unwrap();
        assert!(book.is_empty());
    }

    #[test]
    fn quote_then_summary_counts() {
        let manager = BookManager::new();
        let ts = Ts::from_nanos(1);
        let quote = Quote {
            ts,
            symbol: Symbol::new("GS"),
            bid_px: Px::new(380.20),
            ask_px: Px::new(380.30),
            bid_sz: Qty::new(100),
            ask_sz: Qty::new(80),
        };
        manager.apply(&MarketMessage::quote(1, ts, ts, quote)).unwrap();
        assert_eq!(manager.active_symbols(), vec![Symbol::new("GS")]);
        assert_eq!(manager.total_updates(), 1);
    }

    #[test]
    fn evicts_only_stale_books() {
        let manager = BookManager::new();
        manager.apply(&trade_msg("OLD", 1.0, 1, 1_000)).unwrap();
        manager
            .apply(&trade_msg("FRESH", 1.0, 1, 10_000_000_000))
            .unwrap();

        let now = Ts::from_nanos(11_000_000_000);
        let evicted = manager.evict_stale(Duration::from_secs(5), now);
        assert_eq!(evicted, 1);
        assert!(manager.get(Symbol::new("OLD")).is_none());
        assert!(manager.get(Symbol::new("FRESH")).is_some());
    }

    #[test]
    fn remove_reports_presence() {
        let manager = BookManager::new();
        manager.get_or_create(Symbol::new("JPM"));
        assert!(manager.remove(Symbol::new("JPM")));
        assert!(!manager.remove(Symbol::new("JPM")));
    }
}
