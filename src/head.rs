//! The intrusive linkage every retirable node carries for the runtime.

use core::cell::UnsafeCell;
use core::fmt;
use core::ptr::{self, NonNull};

#[cfg(feature = "std")]
use crate::queue::RawNode;

/// The type-specific callback a runtime invokes on a node's [`RcuHead`] once
/// the node's grace period has elapsed.
pub type ReclaimFn = unsafe fn(NonNull<RcuHead>);

////////////////////////////////////////////////////////////////////////////////////////////////////
// RcuHead
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The intrusive header linking a retired node into a runtime's queue of
/// pending reclamations.
///
/// The reclamation layer never inspects the header itself, its fields belong
/// to whichever [`Rcu`][crate::Rcu] runtime the node is handed to.
/// Both fields are only written by the retiring thread and the runtime, while
/// readers may still hold shared references to the enclosing node, so they
/// are kept behind `UnsafeCell`s.
#[repr(C)]
pub struct RcuHead {
    next: UnsafeCell<*mut RcuHead>,
    callback: UnsafeCell<Option<ReclaimFn>>,
}

/********** impl Send & Sync **********************************************************************/

// the header is only ever accessed by the retiring writer and, afterwards, by
// the runtime owning the node, never concurrently
unsafe impl Send for RcuHead {}
unsafe impl Sync for RcuHead {}

/********** impl Default **************************************************************************/

impl Default for RcuHead {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl inherent *************************************************************************/

impl RcuHead {
    /// Creates a new unlinked header without a callback.
    #[inline]
    pub const fn new() -> Self {
        Self { next: UnsafeCell::new(ptr::null_mut()), callback: UnsafeCell::new(None) }
    }

    /// Stores the `callback` that is later invoked by [`reclaim`][RcuHead::reclaim].
    ///
    /// # Safety
    ///
    /// `head` must be valid and the caller must have exclusive access to the
    /// header, i.e. it must be the runtime the node has been handed to.
    #[inline]
    pub unsafe fn set_callback(head: NonNull<Self>, callback: ReclaimFn) {
        *(*head.as_ptr()).callback.get() = Some(callback);
    }

    /// Returns the header's next pointer.
    ///
    /// # Safety
    ///
    /// `head` must be valid and owned by the calling runtime.
    #[inline]
    pub unsafe fn next(head: NonNull<Self>) -> Option<NonNull<Self>> {
        NonNull::new(*(*head.as_ptr()).next.get())
    }

    /// Sets the header's next pointer.
    ///
    /// # Safety
    ///
    /// `head` must be valid and owned by the calling runtime.
    #[inline]
    pub unsafe fn set_next(head: NonNull<Self>, next: Option<NonNull<Self>>) {
        *(*head.as_ptr()).next.get() = next.map_or(ptr::null_mut(), NonNull::as_ptr);
    }

    /// Invokes the stored callback, which destroys the node `head` belongs to.
    ///
    /// # Safety
    ///
    /// `head` must be valid, a callback must have been set and a grace period
    /// must have elapsed since the node was retired.
    /// The node (and with it `head`) is de-allocated when this returns.
    #[inline]
    pub unsafe fn reclaim(head: NonNull<Self>) {
        let callback = (*(*head.as_ptr()).callback.get()).take();
        debug_assert!(callback.is_some(), "reclaimed a header without a callback");
        if let Some(callback) = callback {
            callback(head);
        }
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for RcuHead {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RcuHead").finish()
    }
}

/********** impl RawNode **************************************************************************/

#[cfg(feature = "std")]
impl RawNode for RcuHead {
    #[inline]
    unsafe fn set_next(node: *mut Self, next: *mut Self) {
        *(*node).next.get() = next;
    }
}
