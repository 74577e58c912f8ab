//! Segment nodes of the queue's cyclic chain.
//!
//! A node is one fixed-capacity circular buffer: a header holding the
//! consume/produce counters and the forward link, followed inline by its
//! slot array in the same allocation.

use core::mem::size_of;
use core::sync::atomic::{AtomicPtr, AtomicUsize};
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use crossbeam_utils::CachePadded;

/// Power-of-two modulo: `n & (cap - 1)`.
#[inline]
pub(crate) fn pow2_mod(n: usize, cap: usize) -> usize {
    debug_assert!(cap.is_power_of_two());
    n & (cap - 1)
}

/// One segment of the chain.
///
/// `front` counts elements consumed from this node and `back` counts
/// elements produced into it. Both only ever increase; a counter value
/// maps to a slot through [`pow2_mod`], so a drained node can be refilled
/// without resetting anything. The occupancy invariant is
/// `front <= back <= front + cap`.
///
/// The `cap` slots live directly after this header. They hold opaque
/// machine words and are accessed with relaxed atomic loads and stores: a
/// consumer may speculatively read a slot it then fails to claim, and that
/// read can overlap a producer overwriting the slot after the node was
/// recycled. The atomic cell keeps the overlap well-defined; all
/// cross-thread ordering is carried by `back`, `front` and `next`.
#[repr(C)]
pub(crate) struct Node {
    pub(crate) cap: usize,
    pub(crate) front: CachePadded<AtomicUsize>,
    pub(crate) back: CachePadded<AtomicUsize>,
    pub(crate) next: AtomicPtr<Node>,
}

impl Node {
    /// Layout of a node header plus `cap` inline slots, and the byte
    /// offset of the first slot.
    pub(crate) fn layout(cap: usize) -> (Layout, usize) {
        let slots = Layout::array::<AtomicUsize>(cap).unwrap();
        let (layout, offset) = Layout::new::<Node>().extend(slots).unwrap();
        debug_assert_eq!(offset, size_of::<Node>());
        (layout.pad_to_align(), offset)
    }

    /// Allocates an empty node with `cap` slots whose link points at
    /// `next`. Returns `None` if the allocation fails; the slots are left
    /// uninitialized, as no slot is readable before `back` counts past it.
    pub(crate) fn alloc(cap: usize, next: *mut Node) -> Option<NonNull<Node>> {
        debug_assert!(cap.is_power_of_two());
        let (layout, _) = Self::layout(cap);
        let node = NonNull::new(unsafe { alloc(layout) }.cast::<Node>())?;
        unsafe { Self::init(node.as_ptr(), cap, next) };
        Some(node)
    }

    /// Initializes a node header in place.
    ///
    /// # Safety
    ///
    /// `node` must point at an unaliased block laid out by
    /// [`Node::layout`] for `cap`.
    pub(crate) unsafe fn init(node: *mut Node, cap: usize, next: *mut Node) {
        unsafe {
            node.write(Node {
                cap,
                front: CachePadded::new(AtomicUsize::new(0)),
                back: CachePadded::new(AtomicUsize::new(0)),
                next: AtomicPtr::new(next),
            });
        }
    }

    /// The slot cell for counter value `idx`, masked by capacity.
    ///
    /// # Safety
    ///
    /// `node` must point at an initialized node that outlives `'a`.
    #[inline]
    pub(crate) unsafe fn slot<'a>(node: *mut Node, idx: usize) -> &'a AtomicUsize {
        unsafe {
            let slots = node.add(1).cast::<AtomicUsize>();
            &*slots.add(pow2_mod(idx, (*node).cap))
        }
    }

    /// Frees a node allocated by [`Node::alloc`].
    ///
    /// # Safety
    ///
    /// `node` must have come from [`Node::alloc`], must not be freed
    /// twice, and no other thread may touch it concurrently.
    pub(crate) unsafe fn dealloc(node: *mut Node) {
        let (layout, _) = Self::layout(unsafe { (*node).cap });
        unsafe { dealloc(node.cast(), layout) }
    }
}
