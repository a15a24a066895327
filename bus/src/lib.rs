//! Lock-free bounded queues for ultra-low-latency message passing
//!
//! Two ring variants move typed messages between pipeline stages without
//! blocking:
//!
//! - [`spsc`]: single producer, single consumer; one reserved slot
//!   distinguishes full from empty so neither side needs a shared count.
//! - [`mpsc`]: many producers, single consumer; every slot carries its own
//!   sequence sentinel so producers never serialise on a shared counter.
//!
//! [`FeedQueue`] wraps the SPSC ring with the pipeline's drop policy: a
//! publish against a full ring fails fast and increments a shared counter.

#![deny(missing_docs)]
#![allow(unsafe_code)] // Required for the slot storage of the rings

pub mod feed_queue;
pub mod mpsc;
pub mod spsc;

pub use feed_queue::{FeedConsumer, FeedProducer, FeedQueue};
pub use mpsc::{mpsc, MpscBatch, MpscReceiver, MpscSender};
pub use spsc::{spsc, Batch, SpscReceiver, SpscSender};

/// Round a requested capacity up to the next power of two, minimum 2
#[must_use]
pub(crate) fn pow2_capacity(requested: usize) -> usize {
    requested.max(2).next_power_of_two()
}
