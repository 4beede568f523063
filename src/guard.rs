use core::fmt;
use core::marker::PhantomData;
use core::mem;

use crate::Rcu;

////////////////////////////////////////////////////////////////////////////////////////////////////
// ReaderGuard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An RAII guard for a read-side critical section of the runtime `R`.
///
/// While a guard is *active*, the runtime guarantees that no grace period
/// which began before the guard entered its section completes, so any node
/// that was reachable at that time remains valid to dereference.
///
/// A guard is either active or inactive.
/// [`new`][ReaderGuard::new] creates an active guard, whereas
/// [`deferred`][ReaderGuard::deferred] creates an inactive one that can be
/// activated later through [`lock`][ReaderGuard::lock].
/// An active guard leaves its section when it is dropped.
///
/// Guards can not be cloned, since this would duplicate the obligation to
/// leave the section.
/// Moving a guard moves the obligation along with it, and assigning to an
/// active guard first drops it, thereby leaving its section.
/// Guards are bound to the thread that created them and are therefore
/// neither `Send` nor `Sync`.
pub struct ReaderGuard<R: Rcu> {
    state: State,
    _marker: PhantomData<(R, *const ())>,
}

/********** impl inherent *************************************************************************/

impl<R: Rcu> ReaderGuard<R> {
    /// Enters a read-side critical section and returns an active guard for
    /// it.
    #[inline]
    pub fn new() -> Self {
        R::enter_read_section();
        Self { state: State::Active, _marker: PhantomData }
    }

    /// Returns an inactive guard without entering a read-side critical
    /// section.
    #[inline]
    pub fn deferred() -> Self {
        Self { state: State::Inactive, _marker: PhantomData }
    }

    /// Returns `true` if the guard currently holds an open critical section.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Enters a read-side critical section with an inactive guard.
    ///
    /// # Panics
    ///
    /// In debug builds, this function panics if the guard is already active.
    #[inline]
    pub fn lock(&mut self) {
        debug_assert_eq!(self.state, State::Inactive, "`lock` called on an active guard");
        R::enter_read_section();
        self.state = State::Active;
    }

    /// Leaves the read-side critical section of an active guard.
    ///
    /// # Panics
    ///
    /// In debug builds, this function panics if the guard is inactive.
    #[inline]
    pub fn unlock(&mut self) {
        debug_assert_eq!(self.state, State::Active, "`unlock` called on an inactive guard");
        R::exit_read_section();
        self.state = State::Inactive;
    }

    /// Exchanges the active or inactive states of `self` and `other` without
    /// entering or leaving any critical section.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.state, &mut other.state);
    }

    /// Moves the guard's state (and obligation) out into a new guard, leaving
    /// `self` inactive.
    #[inline]
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::deferred())
    }

    /// Dereferences `ptr` for the lifetime of the guard, returning `None` if
    /// it is null.
    ///
    /// # Safety
    ///
    /// The guard must be active and `ptr` must have been read from a shared
    /// data structure after the guard entered its section (or be otherwise
    /// valid) and point to a node that is reclaimed through the runtime `R`.
    #[inline]
    pub unsafe fn protect<'g, T>(&'g self, ptr: *const T) -> Option<&'g T> {
        debug_assert!(self.is_active(), "dereferenced a pointer with an inactive guard");
        ptr.as_ref()
    }
}

/********** impl Default **************************************************************************/

impl<R: Rcu> Default for ReaderGuard<R> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Drop *****************************************************************************/

impl<R: Rcu> Drop for ReaderGuard<R> {
    #[inline]
    fn drop(&mut self) {
        if let State::Active = self.state {
            R::exit_read_section();
        }
    }
}

/********** impl Debug ****************************************************************************/

impl<R: Rcu> fmt::Debug for ReaderGuard<R> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReaderGuard").field("state", &self.state).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// State
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The state of a [`ReaderGuard`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    /// The guard holds no critical section.
    Inactive,
    /// The guard has entered a critical section it must leave.
    Active,
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::{ReaderGuard, State};
    use crate::tests::DeferredRcu;

    type Guard = ReaderGuard<DeferredRcu>;

    #[test]
    fn new_enters_and_drop_exits() {
        let guard = Guard::new();
        assert_matches!(guard.state, State::Active);
        assert_eq!(DeferredRcu::nesting(), 1);

        drop(guard);
        assert_eq!(DeferredRcu::nesting(), 0);
        assert_eq!(DeferredRcu::sections(), (1, 1));
    }

    #[test]
    fn deferred_enters_nothing() {
        let guard = Guard::deferred();
        assert_matches!(guard.state, State::Inactive);
        assert!(!guard.is_active());

        drop(guard);
        assert_eq!(DeferredRcu::sections(), (0, 0));
    }

    #[test]
    fn lock_and_unlock() {
        let mut guard = Guard::deferred();
        guard.lock();
        assert!(guard.is_active());
        assert_eq!(DeferredRcu::nesting(), 1);

        guard.unlock();
        assert!(!guard.is_active());
        assert_eq!(DeferredRcu::nesting(), 0);

        guard.lock();
        drop(guard);
        assert_eq!(DeferredRcu::sections(), (2, 2));
    }

    #[test]
    fn take_transfers_obligation() {
        let mut source = Guard::new();
        let target = source.take();

        assert!(!source.is_active());
        assert!(target.is_active());

        // dropping the moved-from guard must not leave the section a second time
        drop(source);
        assert_eq!(DeferredRcu::nesting(), 1);
        drop(target);
        assert_eq!(DeferredRcu::sections(), (1, 1));
    }

    #[test]
    fn move_transfers_obligation() {
        let source = Guard::new();
        let moved = Some(source);
        assert_eq!(DeferredRcu::nesting(), 1);

        drop(moved);
        assert_eq!(DeferredRcu::sections(), (1, 1));
    }

    #[test]
    #[allow(unused_assignments)]
    fn assign_to_active_leaves_its_section() {
        let mut target = Guard::new();
        let source = Guard::new();
        assert_eq!(DeferredRcu::nesting(), 2);

        target = source;
        assert!(target.is_active());
        assert_eq!(DeferredRcu::sections(), (2, 1));

        drop(target);
        assert_eq!(DeferredRcu::sections(), (2, 2));
    }

    #[test]
    #[allow(unused_assignments)]
    fn assign_inactive_to_active() {
        let mut target = Guard::new();
        target = Guard::deferred();
        assert!(!target.is_active());
        assert_eq!(DeferredRcu::nesting(), 0);

        drop(target);
        assert_eq!(DeferredRcu::sections(), (1, 1));
    }

    #[test]
    fn swap_exchanges_states_only() {
        let mut active = Guard::new();
        let mut inactive = Guard::deferred();

        active.swap(&mut inactive);
        assert!(!active.is_active());
        assert!(inactive.is_active());
        assert_eq!(DeferredRcu::sections(), (1, 0));

        inactive.swap(&mut active);
        assert!(active.is_active());
        assert_eq!(DeferredRcu::sections(), (1, 0));

        drop(inactive);
        drop(active);
        assert_eq!(DeferredRcu::sections(), (1, 1));
    }

    #[test]
    fn protect_binds_to_guard() {
        let value = 5;
        let guard = Guard::new();
        assert_eq!(unsafe { guard.protect(&value) }, Some(&5));
        assert_eq!(unsafe { guard.protect(std::ptr::null::<i32>()) }, None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "`lock` called on an active guard")]
    fn lock_active_panics() {
        let mut guard = Guard::new();
        guard.lock();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "`unlock` called on an inactive guard")]
    fn unlock_inactive_panics() {
        let mut guard = Guard::deferred();
        guard.unlock();
    }
}
