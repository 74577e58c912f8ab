//! Channel endpoints and the enqueue/dequeue protocols.
//!
//! The shared state is a cyclic chain of [`Node`]s rooted at a permanent
//! head node that lives in the same allocation as the [`Shared`] handle.
//! The producer owns the chain's growth; consumers only ever race to claim
//! slots and to nudge the read cursor forward. Nothing is freed until the
//! last endpoint drops.

use core::hint;
use core::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use crossbeam_utils::CachePadded;

use crate::error::{AllocError, SendError, TryRecvError, TrySendError};
use crate::node::Node;

/// Capacity exponent used when `channel` is called with `power == 0`:
/// the head node starts with 64 slots.
const DEFAULT_POWER: u32 = 6;

/// State shared by every endpoint. The head node follows it inline in the
/// same allocation.
pub(crate) struct Shared {
    /// Node the producer is currently writing into. Written only by the
    /// producer; consumers compare it by address to detect emptiness.
    send_cursor: CachePadded<AtomicPtr<Node>>,
    /// Node consumers should currently try to read from. A hint, not a
    /// boundary: any consumer may advance it, and a preempted consumer may
    /// still claim from an older node.
    recv_cursor: CachePadded<AtomicPtr<Node>>,
    /// Invoked on each leftover element of the non-head nodes at teardown.
    dtor: Option<fn(usize)>,
    /// Live endpoint count; the endpoint that drops it to zero reclaims
    /// the chain.
    handles: AtomicUsize,
}

/// Layout of the shared state plus the inline head node with `cap` slots,
/// and the byte offset of the head.
fn shared_layout(cap: usize) -> (Layout, usize) {
    let (node, _) = Node::layout(cap);
    let (layout, offset) = Layout::new::<Shared>().extend(node).unwrap();
    (layout.pad_to_align(), offset)
}

/// The head node lives directly after the shared state.
fn head_of(shared: *mut Shared) -> *mut Node {
    let (_, offset) = Layout::new::<Shared>()
        .extend(Layout::new::<Node>())
        .unwrap();
    unsafe { shared.cast::<u8>().add(offset).cast() }
}

/// Creates an unbounded SPMC queue of machine words, returning its two
/// endpoints.
///
/// The head node holds `2^power` slots; `power == 0` selects the default
/// of 64. `power` must be below the word width. When the queue later runs
/// out of room it grows itself, doubling the capacity exponent on every
/// growth, so `power` only tunes the initial footprint.
///
/// `dtor` is invoked at teardown once per element that was sent but never
/// received, in send order per node. Elements still buffered in the head
/// node are not passed to it: reclamation walks the chain from `head.next`
/// and stops when the cycle closes, so the head's own slots are skipped.
///
/// Returns [`AllocError`] if the handle and head node cannot be allocated.
///
/// # Examples
///
/// ```
/// let (mut tx, rx) = turbo_spmc::channel(0, None).unwrap();
/// tx.send(7).unwrap();
/// assert_eq!(rx.recv(), 7);
/// ```
pub fn channel(power: u32, dtor: Option<fn(usize)>) -> Result<(Sender, Receiver), AllocError> {
    let power = if power == 0 { DEFAULT_POWER } else { power };
    debug_assert!(power < usize::BITS);
    let cap = 1usize << power;

    let (layout, head_offset) = shared_layout(cap);
    let raw = unsafe { alloc(layout) };
    let Some(shared) = NonNull::new(raw.cast::<Shared>()) else {
        return Err(AllocError);
    };
    let head = unsafe { raw.add(head_offset).cast::<Node>() };
    debug_assert_eq!(head, head_of(shared.as_ptr()));
    unsafe {
        // Head links to itself: the chain starts as a one-node cycle.
        Node::init(head, cap, head);
        shared.as_ptr().write(Shared {
            send_cursor: CachePadded::new(AtomicPtr::new(head)),
            recv_cursor: CachePadded::new(AtomicPtr::new(head)),
            dtor,
            handles: AtomicUsize::new(2),
        });
    }
    Ok((Sender { shared, power }, Receiver { shared }))
}

/// The producing endpoint.
///
/// There is exactly one `Sender` per queue: it is not `Clone`, and both
/// queue growth and the write cursor are touched by nothing else.
pub struct Sender {
    shared: NonNull<Shared>,
    /// Capacity exponent of the most recently allocated node; the next
    /// grown node holds `2^(power + 1)` slots.
    power: u32,
}

// SAFETY: the shared state is only ever mutated through atomics, and the
// producer-private `power` moves with the endpoint.
unsafe impl Send for Sender {}

impl Sender {
    /// Enqueues one word, growing the queue if every reusable node is
    /// full.
    ///
    /// Fails only if a growth allocation fails; the element is then
    /// definitively not enqueued and is handed back inside the error. The
    /// queue stays valid and usable after a failure.
    pub fn send(&mut self, word: usize) -> Result<(), SendError> {
        self.push(word, true).map_err(SendError)
    }

    /// Enqueues one word without ever allocating.
    ///
    /// Behaves like [`send`](Sender::send) while a reusable node has room,
    /// and fails immediately where `send` would grow the queue.
    pub fn try_send(&mut self, word: usize) -> Result<(), TrySendError> {
        self.push(word, false).map_err(TrySendError)
    }

    fn push(&mut self, word: usize, may_grow: bool) -> Result<(), usize> {
        let shared = unsafe { self.shared.as_ref() };
        let mut node = shared.send_cursor.load(Ordering::Relaxed);
        loop {
            let back = unsafe { (*node).back.load(Ordering::Relaxed) };
            let front = unsafe { (*node).front.load(Ordering::Acquire) };
            if back.wrapping_sub(front) < unsafe { (*node).cap } {
                unsafe { Node::slot(node, back) }.store(word, Ordering::Relaxed);
                shared.send_cursor.store(node, Ordering::Relaxed);
                // Pairs with the acquire load of `back` in `Receiver::pop`:
                // the slot write above is visible once `back` counts past it.
                unsafe { (*node).back.fetch_add(1, Ordering::Release) };
                return Ok(());
            }

            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            if next != shared.recv_cursor.load(Ordering::Relaxed) {
                // `next` was drained on an earlier lap and consumers have
                // moved past it; its slots are free to overwrite.
                node = next;
                continue;
            }

            // Consumers are still working through `next`. Writing into it
            // would hand out newer elements ahead of older ones, so splice
            // a fresh node with doubled capacity between `node` and `next`.
            if !may_grow {
                return Err(word);
            }
            debug_assert!(self.power + 1 < usize::BITS);
            let cap = 1usize << (self.power + 1);
            let Some(new) = Node::alloc(cap, next) else {
                return Err(word);
            };
            self.power += 1;
            // Release the fully initialized node before it becomes
            // reachable through the chain.
            unsafe { (*node).next.store(new.as_ptr(), Ordering::Release) };
            node = new.as_ptr();
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        release(self.shared);
    }
}

/// A consuming endpoint.
///
/// Clone it once per consumer thread; any number of clones may dequeue
/// concurrently.
pub struct Receiver {
    shared: NonNull<Shared>,
}

// SAFETY: all shared mutation goes through atomics; slot claims are
// serialized by the compare-and-swap on each node's `front`.
unsafe impl Send for Receiver {}

impl Receiver {
    /// Dequeues one word, spinning until an element is available.
    ///
    /// This never fails and never sleeps: an empty queue costs CPU in
    /// every waiting consumer. Callers that need bounded waiting should
    /// poll [`try_recv`](Receiver::try_recv) against their own deadline.
    ///
    /// With a single consumer, elements arrive exactly in send order.
    /// With several consumers every element is delivered exactly once,
    /// but a consumer preempted between reading the cursor and completing
    /// its claim can still land a dequeue on an older node after its
    /// siblings have moved on, so the receipt order across consumers may
    /// deviate from send order.
    pub fn recv(&self) -> usize {
        loop {
            if let Some(word) = self.pop() {
                return word;
            }
            hint::spin_loop();
        }
    }

    /// Dequeues one word, or fails immediately if nothing is buffered.
    pub fn try_recv(&self) -> Result<usize, TryRecvError> {
        self.pop().ok_or(TryRecvError)
    }

    /// One dequeue attempt: claims a buffered element, or reports the
    /// queue empty once the read cursor has caught up with the producer's
    /// node and found it drained.
    fn pop(&self) -> Option<usize> {
        let shared = unsafe { self.shared.as_ref() };
        let mut node = shared.recv_cursor.load(Ordering::Acquire);
        loop {
            let front = unsafe { (*node).front.load(Ordering::Acquire) };
            let back = unsafe { (*node).back.load(Ordering::Acquire) };
            if back.wrapping_sub(front) == 0 {
                if node == shared.send_cursor.load(Ordering::Relaxed) {
                    // Caught up with the producer: nothing is buffered.
                    return None;
                }
                // This node is drained but the producer has moved on, so
                // nudge the cursor forward. Losing the race is benign:
                // a sibling already advanced it, continue from wherever
                // the cursor now points.
                let next = unsafe { (*node).next.load(Ordering::Acquire) };
                node = match shared.recv_cursor.compare_exchange(
                    node,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => next,
                    Err(current) => current,
                };
                continue;
            }

            // Tentatively read the slot before claiming it; the value is
            // discarded if another consumer wins the claim below.
            let word = unsafe { Node::slot(node, front) }.load(Ordering::Relaxed);
            let claim = unsafe {
                (*node).front.compare_exchange_weak(
                    front,
                    front.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
            };
            if claim.is_ok() {
                return Some(word);
            }
        }
    }
}

impl Clone for Receiver {
    fn clone(&self) -> Self {
        unsafe { self.shared.as_ref() }
            .handles
            .fetch_add(1, Ordering::Relaxed);
        Receiver {
            shared: self.shared,
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        release(self.shared);
    }
}

fn release(shared: NonNull<Shared>) {
    // `Release` orders every use of the queue before the count reaches
    // zero; the `Acquire` fence orders reclamation after all of them.
    if unsafe { shared.as_ref() }.handles.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    fence(Ordering::Acquire);
    unsafe { teardown(shared.as_ptr()) };
}

/// Reclaims the whole chain. Runs exactly once, after the last endpoint is
/// gone, so nothing else can be touching the queue.
///
/// Leftover elements are handed to the destructor node by node in send
/// order. The walk starts at `head.next` and stops when the cycle closes,
/// so elements still buffered in the head itself are skipped.
unsafe fn teardown(shared: *mut Shared) {
    let head = head_of(shared);
    let dtor = unsafe { (*shared).dtor };
    let mut node = unsafe { (*head).next.load(Ordering::Relaxed) };
    while node != head {
        if let Some(dtor) = dtor {
            let back = unsafe { (*node).back.load(Ordering::Relaxed) };
            let mut idx = unsafe { (*node).front.load(Ordering::Relaxed) };
            while back.wrapping_sub(idx) != 0 {
                dtor(unsafe { Node::slot(node, idx) }.load(Ordering::Relaxed));
                idx = idx.wrapping_add(1);
            }
        }
        let next = unsafe { (*node).next.load(Ordering::Relaxed) };
        unsafe { Node::dealloc(node) };
        node = next;
    }
    // The head shares the handle's allocation; one free reclaims both.
    let (layout, _) = shared_layout(unsafe { (*head).cap });
    unsafe { dealloc(shared.cast(), layout) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn smoke() {
        let (mut tx, rx) = channel(0, None).unwrap();
        tx.send(42).unwrap();
        assert_eq!(rx.recv(), 42);
    }

    #[test]
    fn fifo_order() {
        let (mut tx, rx) = channel(4, None).unwrap();
        for i in 0..10 {
            tx.send(i).unwrap();
        }
        for i in 0..10 {
            assert_eq!(rx.recv(), i);
        }
    }

    #[test]
    fn try_recv_empty() {
        let (mut tx, rx) = channel(2, None).unwrap();
        assert_eq!(rx.try_recv(), Err(TryRecvError));
        tx.send(1).unwrap();
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Err(TryRecvError));
    }

    #[test]
    fn default_capacity_is_64() {
        let (mut tx, _rx) = channel(0, None).unwrap();
        for i in 0..64 {
            assert!(tx.try_send(i).is_ok());
        }
        assert_eq!(tx.try_send(64), Err(TrySendError(64)));
    }

    #[test]
    fn try_send_returns_value() {
        let (mut tx, _rx) = channel(1, None).unwrap();
        tx.try_send(10).unwrap();
        tx.try_send(11).unwrap();
        assert_eq!(tx.try_send(99), Err(TrySendError(99)));
    }

    #[test]
    fn growth_doubles_capacity() {
        let (mut tx, rx) = channel(2, None).unwrap();

        // Fill the 4-slot head; the fifth element cannot be placed
        // without allocating.
        for i in 0..4 {
            tx.try_send(i).unwrap();
        }
        assert!(tx.try_send(4).is_err());

        // One growing send splices in an 8-slot node and lands there.
        tx.send(4).unwrap();
        for i in 5..12 {
            tx.try_send(i).unwrap();
        }
        assert!(tx.try_send(12).is_err());

        for i in 0..12 {
            assert_eq!(rx.recv(), i);
        }
    }

    #[test]
    fn order_survives_node_reuse() {
        let (mut tx, rx) = channel(1, None).unwrap();

        // 2-slot head plus one grown 4-slot node.
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv(), i);
        }

        // The next batch refills the grown node, laps back into the
        // drained head, and forces one more growth.
        for i in 5..13 {
            tx.send(i).unwrap();
        }
        for i in 5..13 {
            assert_eq!(rx.recv(), i);
        }
    }

    #[test]
    fn in_place_reuse_of_single_node() {
        let (mut tx, rx) = channel(1, None).unwrap();
        for round in 0..10 {
            tx.send(round * 2).unwrap();
            tx.send(round * 2 + 1).unwrap();
            assert_eq!(rx.recv(), round * 2);
            assert_eq!(rx.recv(), round * 2 + 1);
        }
    }

    #[test]
    fn dtor_runs_for_non_head_nodes() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        fn count(_word: usize) {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }

        let (mut tx, rx) = channel(1, Some(count)).unwrap();
        // 2 elements land in the head, 3 in the grown node.
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        drop(tx);
        drop(rx);
        assert_eq!(DROPS.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn dtor_skips_head_elements() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        fn count(_word: usize) {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }

        let (mut tx, rx) = channel(0, Some(count)).unwrap();
        // Everything fits in the head node, which reclamation walks past.
        for i in 0..10 {
            tx.send(i).unwrap();
        }
        drop(tx);
        drop(rx);
        assert_eq!(DROPS.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn dtor_sees_consumed_elements_only_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        fn count(_word: usize) {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }

        let (mut tx, rx) = channel(1, Some(count)).unwrap();
        for i in 0..6 {
            tx.send(i).unwrap();
        }
        // Drain the head's 2 plus 2 of the grown node's 4.
        for i in 0..4 {
            assert_eq!(rx.recv(), i);
        }
        drop(tx);
        drop(rx);
        assert_eq!(DROPS.load(Ordering::Relaxed), 2);
    }
}
