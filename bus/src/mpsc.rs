//! Multi-producer single-consumer bounded ring
//!
//! Producers reserve a slot by advancing the shared tail, then publish the
//! item by storing the slot's own sequence number with release ordering.
//! The consumer polls the sequence of the head slot, so no shared occupancy
//! count exists and producers only contend on the tail CAS, never on each
//! other's slots.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Slot<T> {
    /// Sequence sentinel: `index` when free for the producer lapping to it,
    /// `index + 1` once the item at `index` is published
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

struct Inner<T> {
    mask: usize,
    buf: Box<[Slot<T>]>,
    /// Consumer cursor
    head: CachePadded<AtomicUsize>,
    /// Producer reservation cursor
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: a slot's value is written only by the producer that won the tail
// CAS for its index and read only by the consumer after observing the
// published sequence with acquire ordering.
unsafe impl<T: Send> Sync for Inner<T> {}
unsafe impl<T: Send> Send for Inner<T> {}

impl<T> Inner<T> {
    fn with_capacity(capacity: usize) -> Self {
        let size = crate::pow2_capacity(capacity);
        let buf = (0..size)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            mask: size - 1,
            buf,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        for pos in head..tail {
            let slot = &mut self.buf[pos & self.mask];
            if *slot.seq.get_mut() == pos.wrapping_add(1) {
                // SAFETY: the sequence marks this slot as published and
                // unconsumed; no handle can reach it anymore.
                unsafe { (*slot.value.get()).assume_init_drop() };
            }
        }
    }
}

/// Cloneable producer handle of an MPSC ring
pub struct MpscSender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for MpscSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Consumer handle of an MPSC ring
pub struct MpscReceiver<T> {
    inner: Arc<Inner<T>>,
}

/// Create a bounded MPSC ring; `capacity` is rounded up to a power of two
///
/// Unlike the SPSC ring, the per-slot sequencing needs no reserved slot, so
/// the full ring size is usable.
#[must_use]
pub fn mpsc<T: Send>(capacity: usize) -> (MpscSender<T>, MpscReceiver<T>) {
    let inner = Arc::new(Inner::with_capacity(capacity));
    (
        MpscSender {
            inner: Arc::clone(&inner),
        },
        MpscReceiver { inner },
    )
}

impl<T: Send> MpscSender<T> {
    /// Push an item without blocking; hands the item back when the ring
    /// is full
    #[inline]
    pub fn try_send(&self, item: T) -> Result<(), T> {
        let inner = &*self.inner;
        let mut pos = inner.tail.load(Ordering::Relaxed);
        loop {
            let slot = &inner.buf[pos & inner.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = seq as isize - pos as isize;
            if dif == 0 {
                match inner.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS reserved this slot exclusively for
                        // this producer.
                        unsafe { (*slot.value.get()).write(item) };
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if dif < 0 {
                // The slot still holds an item from a full lap ago.
                return Err(item);
            } else {
                pos = inner.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Instantaneous item count; eventually consistent across threads
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.inner.head.load(Ordering::Acquire);
        let tail = self.inner.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    /// True when no items are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ring capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.mask + 1
    }
}

impl<T: Send> MpscReceiver<T> {
    /// Pop the oldest published item, if any
    #[inline]
    pub fn try_recv(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let pos = inner.head.load(Ordering::Relaxed);
        let slot = &inner.buf[pos & inner.mask];
        let seq = slot.seq.load(Ordering::Acquire);
        if seq != pos.wrapping_add(1) {
            return None;
        }
        // SAFETY: the acquire load of the published sequence synchronises
        // with the producer's release store of this slot.
        let item = unsafe { (*slot.value.get()).assume_init_read() };
        // Free the slot for the producer that laps back to this index.
        slot.seq
            .store(pos.wrapping_add(inner.mask + 1), Ordering::Release);
        inner.head.store(pos.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// Instantaneous item count; eventually consistent across threads
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.inner.head.load(Ordering::Acquire);
        let tail = self.inner.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    /// True when no items are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ring capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.mask + 1
    }

    /// Fill ratio: `len / capacity`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilisation(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Drain up to `max` items in FIFO order
    ///
    /// The returned iterator pops lazily; dropping it leaves the remaining
    /// items in place.
    #[inline]
    pub fn pop_batch(&mut self, max: usize) -> MpscBatch<'_, T> {
        MpscBatch {
            rx: self,
            remaining: max,
        }
    }
}

/// Draining iterator returned by [`MpscReceiver::pop_batch`]
pub struct MpscBatch<'a, T: Send> {
    rx: &'a mut MpscReceiver<T>,
    remaining: usize,
}

impl<T: Send> Iterator for MpscBatch<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.rx.try_recv()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_producer_fifo() {
        let (tx, mut rx) = mpsc::<u32>(8);
        for i in 0..8 {
            tx.try_send(i).unwrap();
        }
        assert!(tx.try_send(8).is_err());
        for i in 0..8 {
            assert_eq!(rx.try_recv(), Some(i));
        }
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn pop_reopens_a_slot() {
        let (tx, mut rx) = mpsc::<u32>(4);
        for i in 0..4 {
            tx.try_send(i).unwrap();
        }
        assert!(tx.try_send(99).is_err());
        assert_eq!(rx.try_recv(), Some(0));
        assert!(tx.try_send(99).is_ok());
    }

    #[test]
    fn pop_batch_drains_in_order() {
        let (tx, mut rx) = mpsc::<u32>(16);
        for i in 0..10 {
            tx.try_send(i).unwrap();
        }
        let first: Vec<u32> = rx.pop_batch(4).collect();
        assert_eq!(first, vec![0, 1, 2, 3]);
        assert_eq!(rx.len(), 6);
        assert!((rx.utilisation() - 6.0 / 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn conservation_with_many_producers() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 50_000;
        let (tx, mut rx) = mpsc::<u64>(1024);

        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut v = p * PER_PRODUCER + i;
                    loop {
                        match tx.try_send(v) {
                            Ok(()) => break,
                            Err(back) => {
                                v = back;
                                thread::yield_now();
                            }
                        }
                    }
                }
            }));
        }
        drop(tx);

        let consumer = thread::spawn(move || {
            let mut seen = vec![0u8; (PRODUCERS * PER_PRODUCER) as usize];
            let mut count = 0u64;
            // Per-producer FIFO: each producer's values must arrive in order.
            let mut last = vec![None::<u64>; PRODUCERS as usize];
            while count < PRODUCERS * PER_PRODUCER {
                if let Some(v) = rx.try_recv() {
                    let producer = (v / PER_PRODUCER) as usize;
                    if let Some(prev) = last[producer] {
                        assert!(v > prev, "producer order violated");
                    }
                    last[producer] = Some(v);
                    seen[v as usize] += 1;
                    count += 1;
                } else {
                    thread::yield_now();
                }
            }
            assert!(seen.iter().all(|&c| c == 1));
        });

        for h in handles {
            h.join().unwrap();
        }
        consumer.join().unwrap();
    }
}
