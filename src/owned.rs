//! An owning pointer that carries its own deleter.

use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use crate::deleter::{DefaultDelete, Deleter};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Owned
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A non-nullable pointer that exclusively owns a value of type `T` and
/// destroys it with its deleter `D` when dropped.
///
/// With the [`DefaultDelete`] deleter this behaves like a [`Box`], other
/// deleters allow owning values that were allocated by other means.
pub struct Owned<T, D: Deleter<T> = DefaultDelete> {
    ptr: NonNull<T>,
    deleter: ManuallyDrop<D>,
    _marker: PhantomData<T>,
}

/********** impl Send & Sync **********************************************************************/

unsafe impl<T: Send, D: Deleter<T> + Send> Send for Owned<T, D> {}
unsafe impl<T: Sync, D: Deleter<T> + Sync> Sync for Owned<T, D> {}

/********** impl inherent *************************************************************************/

impl<T> Owned<T> {
    /// Allocates `value` on the heap and returns an owning pointer to it.
    #[inline]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Takes ownership of the value allocated by `boxed`.
    #[inline]
    pub fn from_box(boxed: Box<T>) -> Self {
        unsafe { Self::from_raw(NonNull::new_unchecked(Box::into_raw(boxed)), DefaultDelete) }
    }
}

impl<T, D: Deleter<T>> Owned<T, D> {
    /// Takes ownership of the value behind `ptr`, which is destroyed by
    /// `deleter` once the returned `Owned` is dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a valid value that was allocated compatibly with
    /// `deleter` and that is not owned by anything else.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<T>, deleter: D) -> Self {
        Self { ptr, deleter: ManuallyDrop::new(deleter), _marker: PhantomData }
    }

    /// Releases ownership and returns the raw pointer and the deleter.
    #[inline]
    pub fn into_raw(owned: Self) -> (NonNull<T>, D) {
        let owned = ManuallyDrop::new(owned);
        // the original is never dropped, so the deleter is moved out exactly once
        let deleter = unsafe { ptr::read(&*owned.deleter) };
        (owned.ptr, deleter)
    }

    /// Returns the raw pointer to the owned value.
    #[inline]
    pub fn as_ptr(owned: &Self) -> NonNull<T> {
        owned.ptr
    }

    /// Returns a reference to the deleter.
    #[inline]
    pub fn deleter(owned: &Self) -> &D {
        &owned.deleter
    }
}

/********** impl Deref & DerefMut *****************************************************************/

impl<T, D: Deleter<T>> Deref for Owned<T, D> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, D: Deleter<T>> DerefMut for Owned<T, D> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.ptr.as_mut() }
    }
}

/********** impl From *****************************************************************************/

impl<T> From<Box<T>> for Owned<T> {
    #[inline]
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

/********** impl Drop *****************************************************************************/

impl<T, D: Deleter<T>> Drop for Owned<T, D> {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            let deleter = ManuallyDrop::take(&mut self.deleter);
            deleter.delete(self.ptr);
        }
    }
}

/********** impl Debug ****************************************************************************/

impl<T: fmt::Debug, D: Deleter<T>> fmt::Debug for Owned<T, D> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Owned").field("value", &**self).finish()
    }
}
