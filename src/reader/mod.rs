//! Per-thread reader slots used for detecting grace periods.
//!
//! Every thread that enters a read-side critical section owns a slot in the
//! global [`ReaderList`].
//! A slot's counter combines the thread's current nesting depth (lower bits)
//! with the phase of the global grace period counter at the time the
//! outermost section was entered (highest bit).
//! A grace period flips the global phase and then waits until no slot is
//! inside a section that was entered during the previous phase.

mod list;

use core::sync::atomic::{self, AtomicBool, AtomicUsize, Ordering};

pub(crate) use self::list::ReaderList;

use crate::sanitize;

/// The phase bit of the global grace period counter and the slot counters.
pub(crate) const PHASE: usize = !(usize::max_value() >> 1);
/// The increment for one level of nesting.
pub(crate) const NEST_ONE: usize = 1;
/// The mask for extracting the nesting depth of a slot counter.
const NEST_MASK: usize = PHASE - 1;

////////////////////////////////////////////////////////////////////////////////////////////////////
// ReaderSlot
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The announcement of a thread's read-side critical section that must be
/// visible to all threads.
#[derive(Debug)]
pub(crate) struct ReaderSlot {
    ctr: AtomicUsize,
    reserved: AtomicBool,
}

/********** impl inherent *************************************************************************/

impl ReaderSlot {
    /// Creates a new slot, which is initially reserved by its creator.
    #[inline]
    pub const fn new_reserved() -> Self {
        Self { ctr: AtomicUsize::new(0), reserved: AtomicBool::new(true) }
    }

    /// Attempts to reserve the slot for the calling thread.
    #[inline]
    pub fn try_reserve(&self) -> bool {
        // (RDR:4) this `Acquire` CAS synchronizes-with the `Release` store (RDR:1)
        !self.reserved.load(Ordering::Relaxed)
            && self
                .reserved
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    /// Releases the slot so it can be reserved by another thread.
    #[inline]
    pub fn release(&self) {
        self.ctr.store(0, sanitize::RELAXED_STORE);
        // (RDR:1) this `Release` store synchronizes-with the `Acquire` CAS (RDR:4)
        self.reserved.store(false, Ordering::Release);
    }

    /// Returns the current nesting depth of the owning thread's sections.
    #[inline]
    pub fn nesting(&self) -> usize {
        self.ctr.load(Ordering::Relaxed) & NEST_MASK
    }

    /// Enters a (possibly nested) read-side critical section.
    ///
    /// Must only be called by the thread owning the slot.
    #[inline]
    pub fn enter(&self, gp_ctr: &AtomicUsize) {
        let ctr = self.ctr.load(Ordering::Relaxed);
        if ctr & NEST_MASK == 0 {
            // outermost section: snapshot the global phase (with a nesting of one)
            self.ctr.store(gp_ctr.load(sanitize::RELAXED_LOAD), sanitize::RELAXED_STORE);
            // (RDR:2) this `SeqCst` fence synchronizes-with the `SeqCst` fences in (GLO:1)
            // and (GLO:2), the announcement is ordered before any reads within the section
            atomic::fence(Ordering::SeqCst);
        } else {
            debug_assert!(ctr & NEST_MASK < NEST_MASK, "nesting depth overflow");
            self.ctr.store(ctr + NEST_ONE, sanitize::RELAXED_STORE);
        }
    }

    /// Leaves the innermost read-side critical section.
    ///
    /// Must only be called by the thread owning the slot.
    #[inline]
    pub fn exit(&self) {
        let ctr = self.ctr.load(Ordering::Relaxed);
        debug_assert_ne!(ctr & NEST_MASK, 0, "left a read-side critical section never entered");
        if ctr & NEST_MASK == NEST_ONE {
            // (RDR:3) this `SeqCst` fence synchronizes-with the `SeqCst` fences in (GLO:1)
            // and (GLO:2), all reads within the section are ordered before leaving it
            atomic::fence(Ordering::SeqCst);
            self.ctr.store(ctr - NEST_ONE, Ordering::Release);
        } else {
            self.ctr.store(ctr - NEST_ONE, sanitize::RELAXED_STORE);
        }
    }

    /// Returns `true` if the slot's owner is inside a section that was entered
    /// in a different phase than `gp_ctr`'s.
    #[inline]
    pub fn is_ongoing(&self, gp_ctr: usize) -> bool {
        let ctr = self.ctr.load(sanitize::RELAXED_LOAD);
        ctr & NEST_MASK != 0 && (ctr ^ gp_ctr) & PHASE != 0
    }
}
