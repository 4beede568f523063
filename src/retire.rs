//! Retirement of values that do not embed a [`RetireBase`] themselves.
//!
//! The value's owning handle is moved into a heap-allocated wrapper that
//! combines a retire base with the handle, and the wrapper is retired in its
//! place.
//! Once the grace period has elapsed, dropping the wrapper drops the handle,
//! which in turn destroys the value with its original deleter.

use core::ptr::NonNull;

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use crate::base::{RetireBase, Retirable};
use crate::deleter::{DefaultDelete, Deleter};
use crate::owned::Owned;
use crate::Rcu;

/// Retires the value owned by `owned` with the runtime `R`.
///
/// The value is destroyed through the handle's deleter after a grace period
/// has elapsed.
/// This costs one additional allocation for the wrapper.
#[inline]
pub fn retire_in<R, T, D>(owned: Owned<T, D>)
where
    R: Rcu,
    T: Send + 'static,
    D: Deleter<T> + Send + 'static,
{
    let wrapper = Box::new(RetireWrapper { base: RetireBase::new(), owned });
    unsafe {
        // the wrapper was just allocated and is reachable by no one else
        let wrapper = NonNull::new_unchecked(Box::into_raw(wrapper));
        RetireWrapper::retire_in::<R>(wrapper, DefaultDelete);
    }
}

/// Retires the value behind `ptr` with the runtime `R`, destroying it with
/// `deleter` after a grace period has elapsed.
///
/// # Safety
///
/// `ptr` must be valid and allocated compatibly with `deleter`, it must have
/// been unlinked from any shared data structure and must not be accessed by
/// the caller afterwards.
#[inline]
pub unsafe fn retire_raw_in<R, T, D>(ptr: NonNull<T>, deleter: D)
where
    R: Rcu,
    T: Send + 'static,
    D: Deleter<T> + Send + 'static,
{
    retire_in::<R, _, _>(Owned::from_raw(ptr, deleter))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetireWrapper
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A retirable composition of a retire base and an owning handle.
#[repr(C)]
struct RetireWrapper<T, D: Deleter<T>> {
    base: RetireBase<DefaultDelete>,
    owned: Owned<T, D>,
}

/********** impl Retirable ************************************************************************/

unsafe impl<T, D> Retirable for RetireWrapper<T, D>
where
    T: Send + 'static,
    D: Deleter<T> + Send + 'static,
{
    type Deleter = DefaultDelete;

    #[inline]
    fn retire_base(&self) -> &RetireBase<Self::Deleter> {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{retire_in, retire_raw_in};
    use crate::owned::Owned;
    use crate::tests::DeferredRcu;

    struct DropCount(Arc<AtomicUsize>);

    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn retire_owned() {
        let count = Arc::new(AtomicUsize::new(0));
        retire_in::<DeferredRcu, _, _>(Owned::new(DropCount(Arc::clone(&count))));

        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert_eq!(DeferredRcu::pending(), 1);
        DeferredRcu::drain();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn retire_boxed_string() {
        let boxed = Box::new(String::from("retired"));
        retire_in::<DeferredRcu, _, _>(Owned::from(boxed));
        DeferredRcu::drain();
        assert_eq!(DeferredRcu::pending(), 0);
    }

    #[test]
    fn retire_raw_matches_direct_deletion() {
        let direct = Arc::new(AtomicUsize::new(0));
        let deferred = Arc::new(AtomicUsize::new(0));

        let deleter = |sink: Arc<AtomicUsize>| {
            move |ptr: NonNull<u32>| {
                let value = unsafe { Box::from_raw(ptr.as_ptr()) };
                sink.fetch_add(*value as usize, Ordering::Relaxed);
            }
        };

        let ptr = NonNull::from(Box::leak(Box::new(21u32)));
        unsafe { crate::deleter::Deleter::delete(deleter(Arc::clone(&direct)), ptr) };

        let ptr = NonNull::from(Box::leak(Box::new(21u32)));
        unsafe { retire_raw_in::<DeferredRcu, _, _>(ptr, deleter(Arc::clone(&deferred))) };
        assert_eq!(deferred.load(Ordering::Relaxed), 0, "deletion must be deferred");

        DeferredRcu::drain();
        assert_eq!(deferred.load(Ordering::Relaxed), direct.load(Ordering::Relaxed));
        assert_eq!(Arc::strong_count(&deferred), 1, "the deleter must have been consumed");
    }
}
