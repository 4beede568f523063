//! A simple lock-free stack that uses *compare-and-swap* to insert elements at
//! the head and *swap* (exchange) to consume all elements at once, thereby not
//! requiring any dedicated memory reclamation mechanism itself.
//!
//! It is used by the global runtime to collect the headers of retired nodes
//! until the next batch of reclamations is processed.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawNode (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for node types that contain `next` pointers and can be linked
/// through raw pointers.
pub(crate) trait RawNode {
    /// Sets the `node`'s next pointer to `next`.
    ///
    /// # Safety
    ///
    /// The caller has to ensure `node` is a valid pointer to a mutable node and
    /// that the aliasing rules are not violated.
    unsafe fn set_next(node: *mut Self, next: *mut Self);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawQueue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A concurrent linked-list based queue operating on raw pointers.
///
/// Elements are inserted at the front and can only be removed all at once by
/// returning the first node which contains a link to the next node and so on
/// and switching the queue to empty.
#[derive(Debug, Default)]
pub(crate) struct RawQueue<N> {
    head: AtomicPtr<N>,
}

/********** impl inherent *************************************************************************/

impl<N> RawQueue<N> {
    /// Creates a new empty `RawQueue`.
    #[inline]
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()) }
    }
}

impl<N: RawNode> RawQueue<N> {
    /// Returns `true` if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }

    /// Pushes `node` to the head of the queue.
    ///
    /// # Safety
    ///
    /// `node` must be non-null and valid (alive and not mutably aliased).
    #[inline]
    pub unsafe fn push(&self, node: *mut N) {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            N::set_next(node, head);

            // (QUE:1) this `Release` CAS synchronizes-with the `Acquire` swap in (QUE:2)
            if self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Swaps out the first node and leaves the `RawQueue` empty.
    ///
    /// The returned node (if it is non-`null`) effectively owns all following
    /// nodes and can deallocate or mutate them as desired.
    #[inline]
    pub fn take_all(&self) -> *mut N {
        // (QUE:2) this `Acquire` swap synchronizes-with the `Release` CAS in (QUE:1)
        self.head.swap(ptr::null_mut(), Ordering::Acquire)
    }
}
