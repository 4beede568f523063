//! Globally shared state of the default runtime: the registry of reader slots,
//! the grace period counter and the queue of pending reclamations.

use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::atomic::{
    self, AtomicUsize,
    Ordering::{self, SeqCst},
};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;

use conquer_once::OnceCell;
use crossbeam_utils::Backoff;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::head::{RcuHead, ReclaimFn};
use crate::queue::RawQueue;
use crate::reader::{ReaderList, ReaderSlot, NEST_ONE, PHASE};
use crate::sanitize;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Global
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Global data structures required for detecting grace periods and for
/// reclaiming retired records.
#[derive(Debug)]
pub(crate) struct Global {
    config: Config,
    /// The slots of all threads that have ever entered a critical section.
    readers: ReaderList,
    /// The global grace period counter, only its phase bit ever changes.
    gp_ctr: AtomicUsize,
    /// Serializes concurrent grace periods.
    gp_lock: Mutex<()>,
    /// The headers of all retired records awaiting their grace period.
    pending: RawQueue<RcuHead>,
    /// The (approximate) number of records in `pending`.
    pending_count: AtomicUsize,
    /// Held while a batch of records is taken from `pending` and reclaimed.
    batch_lock: Mutex<()>,
    reclaimer: Reclaimer,
}

/********** impl inherent *************************************************************************/

impl Global {
    /// Creates a new instance of a `Global` with the given `config`.
    #[inline]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            readers: ReaderList::new(),
            gp_ctr: AtomicUsize::new(NEST_ONE),
            gp_lock: Mutex::new(()),
            pending: RawQueue::new(),
            pending_count: AtomicUsize::new(0),
            batch_lock: Mutex::new(()),
            reclaimer: Reclaimer::new(),
        }
    }

    /// Returns the configuration the runtime was created with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reserves a reader slot for the calling thread.
    #[inline]
    pub fn acquire_slot(&self) -> &ReaderSlot {
        self.readers.acquire_slot()
    }

    /// Enters a read-side critical section with the calling thread's `slot`.
    #[inline]
    pub fn enter(&self, slot: &ReaderSlot) {
        slot.enter(&self.gp_ctr);
    }

    /// Blocks until all read-side critical sections that were active at the
    /// time of the call have been exited.
    pub fn synchronize(&self) {
        let _gp = lock(&self.gp_lock);

        // (GLO:1) this `SeqCst` fence synchronizes-with the `SeqCst` fences (RDR:2) and (RDR:3),
        // all prior unlinks are ordered before the slots are inspected
        atomic::fence(SeqCst);

        // two phase flips are required, since a reader may have loaded the old phase just before
        // the first flip but only announced it after the first wait has started
        self.flip_phase_and_wait();
        self.flip_phase_and_wait();

        // (GLO:2) this `SeqCst` fence synchronizes-with the `SeqCst` fences (RDR:2) and (RDR:3),
        // all reads of exited sections are ordered before any subsequent reclamation
        atomic::fence(SeqCst);
    }

    /// Schedules the record behind `head` for reclamation through `callback`.
    ///
    /// The background reclaimer is spawned by the first call and woken every
    /// time the threshold is reached.
    /// If `can_reclaim_inline` is `true` and there is no background reclaimer,
    /// the calling thread reclaims a batch once the threshold is reached
    /// instead.
    ///
    /// # Safety
    ///
    /// `head` must be valid and not already be scheduled.
    pub unsafe fn schedule(
        &'static self,
        head: NonNull<RcuHead>,
        callback: ReclaimFn,
        can_reclaim_inline: bool,
    ) {
        RcuHead::set_callback(head, callback);
        // the count is increased first so it can never underflow when a batch is reclaimed
        let count = self.pending_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.pending.push(head.as_ptr());

        let at_threshold = count % self.config.batch_threshold() as usize == 0;
        if self.has_reclaimer() {
            if at_threshold {
                self.reclaimer.notify();
            }
        } else if at_threshold && can_reclaim_inline {
            self.try_reclaim_pending();
        }
    }

    /// Reclaims all records that were pending at the time of the call,
    /// including those currently being reclaimed by another thread, and
    /// returns the number of records this thread reclaimed.
    pub fn reclaim_pending(&self) -> usize {
        // waits for any batch another thread has already taken from the queue
        let batch = lock(&self.batch_lock);
        self.reclaim_batch(batch)
    }

    /// Reclaims all pending records, unless another batch is currently being
    /// reclaimed (possibly by a deleter of the calling thread itself).
    #[inline]
    fn try_reclaim_pending(&self) -> usize {
        let batch = match self.batch_lock.try_lock() {
            Ok(batch) => batch,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return 0,
        };

        self.reclaim_batch(batch)
    }

    fn reclaim_batch(&self, _batch: MutexGuard<'_, ()>) -> usize {
        let curr = self.pending.take_all();
        if curr.is_null() {
            return 0;
        }

        self.synchronize();

        let mut batch = Batch { global: self, curr, reclaimed: 0 };
        while let Some(head) = NonNull::new(batch.curr) {
            unsafe {
                // `next` must be read HERE, because `head` is de-allocated in the next step
                batch.curr = RcuHead::next(head).map_or(ptr::null_mut(), NonNull::as_ptr);
                // the callback is consumed even if it panics
                batch.reclaimed += 1;
                RcuHead::reclaim(head);
            }
        }

        trace!(reclaimed = batch.reclaimed, "reclaimed a batch of retired records");
        batch.reclaimed
    }

    #[inline]
    fn flip_phase_and_wait(&self) {
        let gp_ctr = self.gp_ctr.load(Ordering::Relaxed) ^ PHASE;
        self.gp_ctr.store(gp_ctr, sanitize::RELAXED_STORE);
        atomic::fence(SeqCst);

        for slot in self.readers.iter() {
            let backoff = Backoff::new();
            while slot.is_ongoing(gp_ctr) {
                if backoff.is_completed() {
                    thread::yield_now();
                } else {
                    backoff.snooze();
                }
            }
        }
    }

    /// Returns `true` if there is a background reclaimer thread, spawning it
    /// on first use.
    #[inline]
    fn has_reclaimer(&'static self) -> bool {
        if !self.config.background_reclaim() {
            return false;
        }

        *self.reclaimer.spawned.get_or_init(|| {
            let res = thread::Builder::new()
                .name(String::from("rcu-reclaimer"))
                .spawn(move || self.run_reclaimer());

            match res {
                Ok(_) => true,
                Err(err) => {
                    warn!(%err, "failed to spawn reclaimer thread, reclaiming inline instead");
                    false
                }
            }
        })
    }

    fn run_reclaimer(&'static self) {
        debug!(
            batch_threshold = self.config.batch_threshold(),
            flush_interval = ?self.config.flush_interval(),
            "started rcu reclaimer thread"
        );

        loop {
            self.reclaimer.wait(self.config.flush_interval());
            if !self.pending.is_empty() {
                let res = panic::catch_unwind(AssertUnwindSafe(|| self.reclaim_pending()));
                if res.is_err() {
                    warn!("a deleter panicked during background reclamation");
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Batch
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The remainder of a batch of records taken from the pending queue.
///
/// If a deleter panics, all records not yet reclaimed are returned to the
/// queue when the batch is dropped during unwinding.
struct Batch<'a> {
    global: &'a Global,
    curr: *mut RcuHead,
    reclaimed: usize,
}

impl Drop for Batch<'_> {
    #[inline]
    fn drop(&mut self) {
        while let Some(head) = NonNull::new(self.curr) {
            unsafe {
                self.curr = RcuHead::next(head).map_or(ptr::null_mut(), NonNull::as_ptr);
                self.global.pending.push(head.as_ptr());
            }
        }

        self.global.pending_count.fetch_sub(self.reclaimed, Ordering::Relaxed);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Reclaimer
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The state for waking up the background reclaimer thread.
#[derive(Debug)]
struct Reclaimer {
    spawned: OnceCell<bool>,
    wake: Mutex<bool>,
    cond: Condvar,
}

impl Reclaimer {
    #[inline]
    fn new() -> Self {
        Self { spawned: OnceCell::uninit(), wake: Mutex::new(false), cond: Condvar::new() }
    }

    /// Wakes up the reclaimer thread.
    #[inline]
    fn notify(&self) {
        *lock(&self.wake) = true;
        self.cond.notify_one();
    }

    /// Blocks until notified or until `timeout` has elapsed.
    #[inline]
    fn wait(&self, timeout: Duration) {
        let mut wake = lock(&self.wake);
        if !*wake {
            wake = self
                .cond
                .wait_timeout(wake, timeout)
                .map(|(wake, _)| wake)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }

        *wake = false;
    }
}

/// Locks `mutex`, ignoring poisoning since the protected data can not be left
/// in an inconsistent state.
#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
