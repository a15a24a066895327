//! Single-producer single-consumer bounded ring
//!
//! Capacity is a power of two with one slot reserved, so `full` is
//! `(tail + 1) & mask == head` and `empty` is `head == tail`. The producer
//! publishes the item before the cursor with release ordering; the consumer
//! pairs with an acquire load of the cursor. Cursors live on separate cache
//! lines.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Inner<T> {
    mask: usize,
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Consumer cursor (next slot to read)
    head: CachePadded<AtomicUsize>,
    /// Producer cursor (next slot to write)
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: slots are only touched by the side that owns the corresponding
// cursor transition; the release/acquire pairing on `tail`/`head` publishes
// slot contents before the other side can observe the index.
unsafe impl<T: Send> Sync for Inner<T> {}
unsafe impl<T: Send> Send for Inner<T> {}

impl<T> Inner<T> {
    fn with_capacity(capacity: usize) -> Self {
        let size = crate::pow2_capacity(capacity);
        let buf = (0..size)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            mask: size - 1,
            buf,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) & self.mask
    }

    fn capacity(&self) -> usize {
        self.mask
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        while head != tail {
            // SAFETY: slots in [head, tail) hold initialised items that no
            // handle can reach anymore.
            unsafe { (*self.buf[head].get()).assume_init_drop() };
            head = (head + 1) & self.mask;
        }
    }
}

/// Producer handle of an SPSC ring
pub struct SpscSender<T> {
    inner: Arc<Inner<T>>,
}

/// Consumer handle of an SPSC ring
pub struct SpscReceiver<T> {
    inner: Arc<Inner<T>>,
}

/// Create a bounded SPSC ring; `capacity` is rounded up to a power of two
/// and one slot stays reserved, so `capacity - 1` items fit
#[must_use]
pub fn spsc<T: Send>(capacity: usize) -> (SpscSender<T>, SpscReceiver<T>) {
    let inner = Arc::new(Inner::with_capacity(capacity));
    (
        SpscSender {
            inner: Arc::clone(&inner),
        },
        SpscReceiver { inner },
    )
}

impl<T: Send> SpscSender<T> {
    /// Push an item without blocking
    ///
    /// On a full ring the item is handed back to the caller; nothing is
    /// allocated either way.
    #[inline]
    pub fn try_send(&mut self, item: T) -> Result<(), T> {
        let inner = &*self.inner;
        let tail = inner.tail.load(Ordering::Relaxed);
        let next = (tail + 1) & inner.mask;
        if next == inner.head.load(Ordering::Acquire) {
            return Err(item);
        }
        // SAFETY: the slot at `tail` is outside [head, tail) and therefore
        // unobserved by the consumer until the release store below.
        unsafe { (*inner.buf[tail].get()).write(item) };
        inner.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// Instantaneous item count; eventually consistent across threads
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no items are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable capacity (one slot below the ring size)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Fill ratio: `len / capacity`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilisation(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }
}

impl<T: Send> SpscReceiver<T> {
    /// Pop the oldest item, if any
    #[inline]
    pub fn try_recv(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let head = inner.head.load(Ordering::Relaxed);
        if head == inner.tail.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: head != tail, so the slot holds an item published by the
        // producer's release store.
        let item = unsafe { (*inner.buf[head].get()).assume_init_read() };
        inner.head.store((head + 1) & inner.mask, Ordering::Release);
        Some(item)
    }

    /// Drain up to `max` items in FIFO order
    ///
    /// The returned iterator pops lazily; dropping it leaves the remaining
    /// items in place.
    #[inline]
    pub fn pop_batch(&mut self, max: usize) -> Batch<'_, T> {
        Batch {
            rx: self,
            remaining: max,
        }
    }

    /// Instantaneous item count; eventually consistent across threads
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no items are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable capacity (one slot below the ring size)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Fill ratio: `len / capacity`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilisation(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }
}

/// Draining iterator returned by [`SpscReceiver::pop_batch`]
pub struct Batch<'a, T: Send> {
    rx: &'a mut SpscReceiver<T>,
    remaining: usize,
}

impl<T: Send> Iterator for Batch<'_, T> {
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
