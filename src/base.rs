//! The intrusive base that makes a node type retirable.
//!
//! A retirable node type is a `#[repr(C)]` struct whose first field is a
//! [`RetireBase`].
//! When the node is retired, the deleter is moved into the base and the
//! runtime is handed the node's [`RcuHead`] together with a trampoline
//! function that is monomorphized for the concrete node type.
//! Since the header is located at the very beginning of the node, the
//! trampoline can recover the node's address from the untyped header pointer,
//! move the deleter back out of the base and invoke it on the node.
//! No trait objects are involved and a zero-sized deleter takes up no space.

use core::cell::UnsafeCell;
use core::fmt;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicBool, Ordering};

use crate::deleter::{DefaultDelete, Deleter};
use crate::head::RcuHead;
use crate::Rcu;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Retirable (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A node type that can be retired and reclaimed after a grace period.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` and have the [`RetireBase`] returned by
/// [`retire_base`][Retirable::retire_base] as their **first** field, so that
/// the base (and its header) is located at offset zero.
/// A type must embed only a single retire base.
///
/// Since retired nodes are destroyed at an unspecified time on an unspecified
/// thread, the type and its deleter must be `Send` and `'static`.
pub unsafe trait Retirable: Send + Sized + 'static {
    /// The deleter that is used to destroy a retired node.
    type Deleter: Deleter<Self> + Send + 'static;

    /// Returns a reference to the node's retire base.
    fn retire_base(&self) -> &RetireBase<Self::Deleter>;

    /// Retires the node behind `this` with the runtime `R` and the given `deleter`.
    ///
    /// The `deleter` is stored within the node itself and is invoked on the
    /// node once a grace period has elapsed.
    /// Retirement is fire-and-forget, the node can not be recovered afterwards.
    ///
    /// # Safety
    ///
    /// The node must be valid, must have been unlinked from any shared data
    /// structure (no new references to it may be created) and must not have
    /// been retired before.
    /// It must have been allocated compatibly with `deleter`.
    /// The caller must not access the node after this call.
    ///
    /// # Panics
    ///
    /// In debug builds, this function panics if the node has already been
    /// retired or if the retire base is not located at offset zero.
    #[inline]
    unsafe fn retire_in<R: Rcu>(this: NonNull<Self>, deleter: Self::Deleter) {
        let base = Self::retire_base(this.as_ref());
        debug_assert_eq!(
            base as *const RetireBase<Self::Deleter> as usize,
            this.as_ptr() as usize,
            "the retire base must be the first field of a `#[repr(C)]` node"
        );
        debug_assert!(!base.mark_retired(), "node has already been retired");

        base.store_deleter(deleter);
        // the head sits at offset zero of the base, which sits at offset zero of the node,
        // deriving it from `this` keeps the node's full provenance for the deleter
        R::schedule_reclaim(this.cast(), reclaim_node::<Self>);
    }

    /// Retires the node behind `this` with the global runtime and the default
    /// deleter.
    ///
    /// # Safety
    ///
    /// See [`retire_in`][Retirable::retire_in].
    #[cfg(feature = "std")]
    #[inline]
    unsafe fn retire(this: NonNull<Self>)
    where
        Self::Deleter: Default,
    {
        Self::retire_in::<crate::GlobalRcu>(this, Default::default())
    }

    /// Retires the node behind `this` with the global runtime and the given
    /// `deleter`.
    ///
    /// # Safety
    ///
    /// See [`retire_in`][Retirable::retire_in].
    #[cfg(feature = "std")]
    #[inline]
    unsafe fn retire_with(this: NonNull<Self>, deleter: Self::Deleter) {
        Self::retire_in::<crate::GlobalRcu>(this, deleter)
    }
}

/// The trampoline that is invoked by the runtime after the grace period of a
/// node of type `T` has elapsed.
unsafe fn reclaim_node<T: Retirable>(head: NonNull<RcuHead>) {
    let node: NonNull<T> = head.cast();
    let deleter = T::retire_base(node.as_ref()).take_deleter();
    deleter.delete(node);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetireBase
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The intrusive base every [`Retirable`] node embeds as its first field.
///
/// It contains the runtime's [`RcuHead`] and storage for the deleter `D`,
/// which remains uninitialized until the node is retired.
#[repr(C)]
pub struct RetireBase<D = DefaultDelete> {
    head: RcuHead,
    deleter: UnsafeCell<MaybeUninit<D>>,
    #[cfg(debug_assertions)]
    retired: AtomicBool,
}

/********** impl Send & Sync **********************************************************************/

// the deleter is only written by the retiring thread and read by the reclaiming
// runtime after the retirement, readers never access it
unsafe impl<D: Send> Send for RetireBase<D> {}
unsafe impl<D: Send> Sync for RetireBase<D> {}

/********** impl Default **************************************************************************/

impl<D> Default for RetireBase<D> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl inherent *************************************************************************/

impl<D> RetireBase<D> {
    /// Creates a new base for a node that has not been retired.
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: RcuHead::new(),
            deleter: UnsafeCell::new(MaybeUninit::uninit()),
            #[cfg(debug_assertions)]
            retired: AtomicBool::new(false),
        }
    }

    /// Returns `true` if the node has been retired before, marking it as
    /// retired.
    ///
    /// Always returns `false` in release builds.
    #[inline]
    fn mark_retired(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.retired.swap(true, Ordering::Relaxed)
        }
        #[cfg(not(debug_assertions))]
        {
            false
        }
    }

    /// Moves `deleter` into the (uninitialized) deleter storage.
    #[inline]
    unsafe fn store_deleter(&self, deleter: D) {
        ptr::write(self.deleter.get(), MaybeUninit::new(deleter));
    }

    /// Moves the deleter out of its storage, leaving it uninitialized.
    #[inline]
    unsafe fn take_deleter(&self) -> D {
        ptr::read(self.deleter.get()).assume_init()
    }
}

/********** impl Debug ****************************************************************************/

impl<D> fmt::Debug for RetireBase<D> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RetireBase").field("head", &self.head).finish()
    }
}
