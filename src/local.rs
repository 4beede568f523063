//! Thread local state of the default runtime.

use tracing::warn;

use crate::global::Global;
use crate::reader::ReaderSlot;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Local
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Container for all thread local data required for announcing read-side
/// critical sections.
#[derive(Debug)]
pub(crate) struct Local {
    global: &'static Global,
    /// The reader slot reserved for the thread for its entire lifetime.
    slot: &'static ReaderSlot,
}

/********** impl inherent *************************************************************************/

impl Local {
    /// Creates a new container for the thread local state, reserving a reader
    /// slot in `global`.
    #[inline]
    pub fn new(global: &'static Global) -> Self {
        Self { global, slot: global.acquire_slot() }
    }

    /// Enters a (possibly nested) read-side critical section.
    #[inline]
    pub fn enter(&self) {
        self.global.enter(self.slot);
    }

    /// Leaves the innermost read-side critical section.
    #[inline]
    pub fn exit(&self) {
        self.slot.exit();
    }

    /// Returns `true` if the thread is currently inside a read-side critical
    /// section.
    #[inline]
    pub fn in_read_section(&self) -> bool {
        self.slot.nesting() != 0
    }

    /// Returns the current nesting depth of the thread's sections.
    #[inline]
    pub fn nesting(&self) -> usize {
        self.slot.nesting()
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for Local {
    #[cold]
    fn drop(&mut self) {
        let nesting = self.slot.nesting();
        if nesting != 0 {
            // releasing the slot implicitly leaves all of the thread's sections
            warn!(nesting, "thread exited inside a read-side critical section");
        }

        self.slot.release();
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::Local;
    use crate::config::Config;
    use crate::global::Global;

    fn leak_global() -> &'static Global {
        Box::leak(Box::new(Global::new(Config::default())))
    }

    #[test]
    fn nested_sections() {
        let local = Local::new(leak_global());
        assert!(!local.in_read_section());

        local.enter();
        local.enter();
        assert_eq!(local.nesting(), 2);
        local.exit();
        assert!(local.in_read_section());
        local.exit();
        assert!(!local.in_read_section());
    }

    #[test]
    fn drop_releases_slot() {
        let global = leak_global();
        let local = Local::new(global);
        let slot = local.slot;

        // even a thread exiting inside a section must not block grace periods forever
        local.enter();
        drop(local);
        global.synchronize();

        let local = Local::new(global);
        assert!(ptr::eq(slot, local.slot));
        assert_eq!(local.nesting(), 0);
    }
}
