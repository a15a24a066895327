//! Pipeline input queue with the engine's drop policy
//!
//! A thin wrapper over the SPSC ring: a publish against a full ring is
//! counted and discarded instead of blocking, so a slow consumer degrades
//! the feed by dropping messages rather than stalling the producer.

use crate::spsc::{self, Batch, SpscReceiver, SpscSender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Shared {
    dropped: AtomicU64,
}

/// Constructor for the producer/consumer pair of a feed queue
pub struct FeedQueue;

impl FeedQueue {
    /// Create the producer and consumer halves over a ring of `capacity`
    /// slots (rounded up to a power of two, one reserved)
    #[must_use]
    pub fn bounded<T: Send>(capacity: usize) -> (FeedProducer<T>, FeedConsumer<T>) {
        let (tx, rx) = spsc::spsc(capacity);
        let shared = Arc::new(Shared {
            dropped: AtomicU64::new(0),
        });
        (
            FeedProducer {
                tx,
                shared: Arc::clone(&shared),
            },
            FeedConsumer { rx, shared },
        )
    }
}

/// Producing half of the feed queue
pub struct FeedProducer<T> {
    tx: SpscSender<T>,
    shared: Arc<Shared>,
}

impl<T: Send> FeedProducer<T> {
    /// Publish a message; on a full ring the message is dropped, the drop
    /// counter incremented, and `false` returned
    #[inline]
    pub fn publish(&mut self, msg: T) -> bool {
        if self.tx.try_send(msg).is_err() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Messages rejected because the ring was full
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Instantaneous queued-message count
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// True when nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Usable ring capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Fill ratio: `len / capacity`
    #[must_use]
    pub fn utilisation(&self) -> f64 {
        self.tx.utilisation()
    }
}

/// Consuming half of the feed queue
pub struct FeedConsumer<T> {
    rx: SpscReceiver<T>,
    shared: Arc<Shared>,
}

impl<T: Send> FeedConsumer<T> {
    /// Pop the oldest message, if any
    #[inline]
    pub fn poll(&mut self) -> Option<T> {
        self.rx.try_recv()
    }

    /// Drain up to `max` messages in FIFO order
    #[inline]
    pub fn drain(&mut self, max: usize) -> Batch<'_, T> {
        self.rx.pop_batch(max)
    }

    /// Messages rejected because the ring was full
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Instantaneous queued-message count
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Usable ring capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx.capacity()
    }

    /// Fill ratio: `len / capacity`
    #[must_use]
    pub fn utilisation(&self) -> f64 {
        self.rx.utilisation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_drops_and_counts() {
        let (mut tx, mut rx) = FeedQueue::bounded::<u32>(8);
        for i in 0..7 {
            assert!(tx.publish(i));
        }
        // Ring of 8 has 7 usable slots; the next publish drops.
        assert!(!tx.publish(7));
        assert_eq!(tx.dropped_count(), 1);

        assert_eq!(rx.poll(), Some(0));
        assert!(tx.publish(7));
        assert_eq!(tx.dropped_count(), 1);
        assert_eq!(rx.dropped_count(), 1);
    }

    #[test]
    fn drain_is_bounded_and_ordered() {
        let (mut tx, mut rx) = FeedQueue::bounded::<u32>(16);
        for i in 0..9 {
            tx.publish(i);
        }
        let first: Vec<u32> = rx.drain(5).collect();
        assert_eq!(first, vec![0, 1, 2, 3, 4]);
        let rest: Vec<u32> = rx.drain(usize::MAX).collect();
        assert_eq!(rest, vec![5, 6, 7, 8]);
        assert!(rx.is_empty());
    }
}
