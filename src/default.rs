use std::ptr::NonNull;
use std::sync::{PoisonError, RwLock};

use conquer_once::Lazy;

use crate::config::Config;
use crate::deleter::{DefaultDelete, Deleter};
use crate::global::Global;
use crate::guard::ReaderGuard;
use crate::head::{RcuHead, ReclaimFn};
use crate::local::Local;
use crate::owned::Owned;
use crate::Rcu;

/// A reader guard for the global runtime.
pub type RcuReader = ReaderGuard<GlobalRcu>;

/********** globals & thread-locals ***************************************************************/

/// The configuration of the global runtime.
///
/// It is read exactly once, when the runtime is first used, so changes made
/// after that have no effect.
pub static CONFIG: Lazy<RwLock<Config>> = Lazy::new(RwLock::default);

/// The global runtime state.
static GLOBAL: Lazy<Global> = Lazy::new(init_global);

thread_local!(static LOCAL: Local = Local::new(&GLOBAL));

#[inline]
fn init_global() -> Global {
    let config = *CONFIG.read().unwrap_or_else(PoisonError::into_inner);
    Global::new(config)
}

/// Returns `true` if the calling thread is inside a read-side critical
/// section of the global runtime.
#[inline]
pub(crate) fn in_read_section() -> bool {
    LOCAL.try_with(Local::in_read_section).unwrap_or(false)
}

/********** public functions **********************************************************************/

/// Blocks until every read-side critical section that was active at the time
/// of the call has been exited.
///
/// # Panics
///
/// In debug builds, this function panics if called from within a read-side
/// critical section, which would never complete otherwise.
#[inline]
pub fn synchronize() {
    GlobalRcu::synchronize();
}

/// Blocks until all values retired before the call have been destroyed.
///
/// # Panics
///
/// In debug builds, this function panics if called from within a read-side
/// critical section.
#[inline]
pub fn barrier() {
    GlobalRcu::drain_all_reclaims();
}

/// Retires the value owned by `owned` with the global runtime.
#[inline]
pub fn retire<T, D>(owned: Owned<T, D>)
where
    T: Send + 'static,
    D: Deleter<T> + Send + 'static,
{
    crate::retire::retire_in::<GlobalRcu, _, _>(owned);
}

/// Retires the boxed value behind `ptr` with the global runtime.
///
/// # Safety
///
/// `ptr` must have been allocated through a [`Box`], it must have been
/// unlinked from any shared data structure and must not be accessed by the
/// caller afterwards.
#[inline]
pub unsafe fn retire_raw<T: Send + 'static>(ptr: NonNull<T>) {
    crate::retire::retire_raw_in::<GlobalRcu, _, _>(ptr, DefaultDelete);
}

/// Retires the value behind `ptr` with the global runtime, destroying it with
/// `deleter`.
///
/// # Safety
///
/// See [`retire_raw_in`][crate::retire_raw_in].
#[inline]
pub unsafe fn retire_raw_with<T, D>(ptr: NonNull<T>, deleter: D)
where
    T: Send + 'static,
    D: Deleter<T> + Send + 'static,
{
    crate::retire::retire_raw_in::<GlobalRcu, _, _>(ptr, deleter);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// GlobalRcu
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The process-wide RCU runtime.
///
/// Threads register themselves lazily when first entering a read-side
/// critical section and are unregistered when they exit.
/// Retired records are reclaimed in batches, either by a background thread or
/// by the retiring threads themselves (see [`Config`]).
///
/// Guards may outlive the thread's local state, e.g. when they are dropped by
/// the destructor of another thread local variable: the thread's slot is
/// released when its local state is destroyed and leaving a section
/// afterwards has no effect.
/// Entering a section at that point panics.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct GlobalRcu;

/********** impl Rcu ******************************************************************************/

unsafe impl Rcu for GlobalRcu {
    #[inline]
    fn enter_read_section() {
        LOCAL.with(Local::enter);
    }

    #[inline]
    fn exit_read_section() {
        // once the thread local state is destroyed, its slot has been released and with it all of
        // the thread's sections
        let _ = LOCAL.try_with(Local::exit);
    }

    #[inline]
    fn synchronize() {
        debug_assert!(!in_read_section(), "synchronize called inside a read-side critical section");
        GLOBAL.synchronize();
    }

    #[inline]
    unsafe fn schedule_reclaim(head: NonNull<RcuHead>, callback: ReclaimFn) {
        // a batch reclaimed inside a section would wait for the section itself
        GLOBAL.schedule(head, callback, !in_read_section());
    }

    #[inline]
    fn drain_all_reclaims() {
        debug_assert!(!in_read_section(), "barrier called inside a read-side critical section");
        GLOBAL.reclaim_pending();
    }
}
