use std::iter::FusedIterator;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::CachePadded;

use crate::reader::ReaderSlot;

/// Append-only linked list of reader slots.
///
/// Slots are never de-allocated while the list is alive, a slot released by
/// an exiting thread is reused by the next thread registering itself.
#[derive(Debug, Default)]
pub(crate) struct ReaderList {
    head: AtomicPtr<ReaderNode>,
}

impl ReaderList {
    /// Creates a new empty list.
    #[inline]
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Returns an iterator over all slots, both reserved and free.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            // (LIS:1) this `Acquire` load synchronizes-with the `Release` CAS (LIS:3)
            current: unsafe { self.head.load(Ordering::Acquire).as_ref() },
        }
    }

    /// Reserves a free slot for the calling thread or appends a new one if
    /// there is none.
    #[inline]
    pub fn acquire_slot(&self) -> &ReaderSlot {
        let mut prev = &self.head;
        // (LIS:2) this `Acquire` load synchronizes-with the `Release` CAS (LIS:3)
        let mut curr = self.head.load(Ordering::Acquire);

        while let Some(node) = unsafe { curr.as_ref() } {
            if node.slot.try_reserve() {
                return &*node.slot;
            }

            prev = &*node.next;
            curr = node.next.load(Ordering::Acquire);
        }

        self.insert_back(prev)
    }

    #[inline]
    fn insert_back(&self, mut tail: &AtomicPtr<ReaderNode>) -> &ReaderSlot {
        let node = Box::leak(Box::new(ReaderNode {
            slot: CachePadded::new(ReaderSlot::new_reserved()),
            next: CachePadded::new(AtomicPtr::default()),
        }));

        loop {
            // (LIS:3) this `Release` CAS ensures the previous allocation (write) is published and
            // synchronizes with all `Acquire` loads on the same `next` field
            let res = tail
                .compare_exchange_weak(ptr::null_mut(), node, Ordering::Release, Ordering::Relaxed)
                .map_err(|ptr| unsafe { ptr.as_ref() });

            match res {
                Ok(_) => return &*node.slot,
                Err(Some(curr)) => tail = &*curr.next,
                // spurious failure
                Err(None) => {}
            }
        }
    }
}

impl Drop for ReaderList {
    #[inline]
    fn drop(&mut self) {
        // `Relaxed` ordering is sufficient here because no other threads have access during `drop`
        let mut curr = self.head.load(Ordering::Relaxed);
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next.load(Ordering::Relaxed);
            mem::drop(node);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////////////////////////

pub(crate) struct Iter<'a> {
    current: Option<&'a ReaderNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ReaderSlot;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let next = self.current.take();
        if let Some(node) = next {
            // (LIS:4) this `Acquire` load synchronizes-with the `Release` CAS (LIS:3)
            self.current = unsafe { node.next.load(Ordering::Acquire).as_ref() };
        }

        next.map(|node| &*node.slot)
    }
}

impl<'a> FusedIterator for Iter<'a> {}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ReaderNode
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
struct ReaderNode {
    slot: CachePadded<ReaderSlot>,
    next: CachePadded<AtomicPtr<ReaderNode>>,
}

#[cfg(test)]
mod tests {
    use std::ptr;
    use std::sync::Arc;
    use std::thread;

    use super::ReaderList;

    #[test]
    fn acquire_appends() {
        let list = ReaderList::new();
        let first = list.acquire_slot();
        let second = list.acquire_slot();

        assert!(!ptr::eq(first, second));
        assert_eq!(list.iter().count(), 2);
    }

    #[test]
    fn released_slot_is_reused() {
        let list = ReaderList::new();
        let first = list.acquire_slot();
        let _second = list.acquire_slot();

        first.release();
        let third = list.acquire_slot();
        assert!(ptr::eq(first, third));
        assert_eq!(list.iter().count(), 2);
    }

    #[test]
    fn concurrent_acquire() {
        const THREADS: usize = 8;

        let list = Arc::new(ReaderList::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    let _ = list.acquire_slot();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // no slot is ever released, so every thread must have appended its own
        assert_eq!(list.iter().count(), THREADS);
    }
}
