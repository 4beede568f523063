//! Deleters define how a retired node is finally destroyed.

use core::ptr::NonNull;

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Deleter (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A callable that destroys a value of type `T` through a raw pointer.
///
/// Any `FnOnce(NonNull<T>)` closure or function pointer is a deleter.
pub trait Deleter<T> {
    /// Destroys the value behind `ptr` and releases its memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid and allocated in a way compatible with this deleter
    /// and it must not be accessed again afterwards.
    unsafe fn delete(self, ptr: NonNull<T>);
}

/********** blanket impl for closures *************************************************************/

impl<T, F: FnOnce(NonNull<T>)> Deleter<T> for F {
    #[inline]
    unsafe fn delete(self, ptr: NonNull<T>) {
        (self)(ptr)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// DefaultDelete
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The deleter for values allocated through a [`Box`].
#[derive(Copy, Clone, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct DefaultDelete;

/********** impl Deleter **************************************************************************/

impl<T> Deleter<T> for DefaultDelete {
    #[inline]
    unsafe fn delete(self, ptr: NonNull<T>) {
        drop(Box::from_raw(ptr.as_ptr()));
    }
}
