//! turbo_spmc - a lock-free, unbounded single-producer multi-consumer
//! queue of machine words.
//!
//! One [`Sender`] feeds any number of cloned [`Receiver`]s, the classic
//! "worker pool watches a queue" shape. Storage is a cyclic chain of
//! fixed-capacity nodes: when the producer catches up with the slowest
//! consumer it splices in a new node with doubled capacity instead of
//! blocking, so no send ever waits on a reader and no grown buffer ever
//! invalidates a reference a reader still holds. Nodes are reclaimed only
//! when the last endpoint drops.
//!
//! Elements are opaque `usize` words. Callers encode whatever fits in a
//! machine word - small integers, bit-patterns such as `f64::to_bits`,
//! raw pointers - and decode it consistently on the receiving side. An
//! optional destructor passed to [`channel()`] finalizes words that were
//! sent but never received.
//!
//! # Examples
//!
//! Single producer, single consumer - delivery order equals send order:
//!
//! ```
//! let (mut tx, rx) = turbo_spmc::channel(0, None).unwrap();
//!
//! for i in 0..1_000 {
//!     tx.send(i).unwrap();
//! }
//! for i in 0..1_000 {
//!     assert_eq!(rx.recv(), i);
//! }
//! ```
//!
//! Single producer, several competing consumers - every element is
//! delivered exactly once:
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::thread;
//!
//! const COUNT: usize = 100;
//! const CONSUMERS: usize = 4;
//!
//! let (mut tx, rx) = turbo_spmc::channel(0, None).unwrap();
//! let seen: Vec<AtomicUsize> = (0..COUNT * CONSUMERS).map(|_| AtomicUsize::new(0)).collect();
//!
//! thread::scope(|s| {
//!     for _ in 0..CONSUMERS {
//!         let rx = rx.clone();
//!         let seen = &seen;
//!         s.spawn(move || {
//!             for _ in 0..COUNT {
//!                 seen[rx.recv()].fetch_add(1, Ordering::Relaxed);
//!             }
//!         });
//!     }
//!     for i in 0..COUNT * CONSUMERS {
//!         tx.send(i).unwrap();
//!     }
//! });
//!
//! assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
//! ```
#![warn(missing_docs)]

mod channel;
mod error;
mod node;

pub use channel::{channel, Receiver, Sender};
pub use error::{AllocError, SendError, TryRecvError, TrySendError};
