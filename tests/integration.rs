use std::ptr::{self, NonNull};
use std::sync::{
    atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering},
    Arc, Barrier,
};
use std::thread;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use rcu_retire::{
    barrier, retire, retire_raw_with, synchronize, DefaultDelete, Owned, RcuReader, RetireBase,
    Retirable,
};

struct DropCount(Arc<AtomicUsize>);
impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[repr(C)]
struct Node {
    base: RetireBase,
    value: usize,
    _count: DropCount,
}

unsafe impl Retirable for Node {
    type Deleter = DefaultDelete;

    fn retire_base(&self) -> &RetireBase<Self::Deleter> {
        &self.base
    }
}

fn alloc_node(value: usize, drop_count: &Arc<AtomicUsize>) -> *mut Node {
    Box::into_raw(Box::new(Node {
        base: RetireBase::new(),
        value,
        _count: DropCount(Arc::clone(drop_count)),
    }))
}

#[test]
fn protected_node_outlives_retirement() {
    let drop_count = Arc::new(AtomicUsize::new(0));
    let shared = AtomicPtr::new(alloc_node(1, &drop_count));

    let reader = RcuReader::new();
    let node = unsafe { reader.protect(shared.load(Ordering::Acquire)) }.unwrap();

    let unlinked = shared.swap(alloc_node(2, &drop_count), Ordering::AcqRel);
    unsafe { Node::retire(NonNull::new(unlinked).unwrap()) };

    // still readable, the record can not be reclaimed while the reader is active
    assert_eq!(node.value, 1);
    drop(reader);

    barrier();
    assert_eq!(drop_count.load(Ordering::Relaxed), 1);

    let last = shared.swap(ptr::null_mut(), Ordering::AcqRel);
    unsafe { Node::retire(NonNull::new(last).unwrap()) };
    barrier();
    assert_eq!(drop_count.load(Ordering::Relaxed), 2);
}

#[test]
fn barrier_waits_for_concurrent_reader() {
    let drop_count = Arc::new(AtomicUsize::new(0));
    let shared = Arc::new(AtomicPtr::new(alloc_node(7, &drop_count)));
    let protected = Arc::new(Barrier::new(2));
    let retired = Arc::new(Barrier::new(2));
    let released = Arc::new(AtomicBool::new(false));

    let reader = {
        let shared = Arc::clone(&shared);
        let protected = Arc::clone(&protected);
        let retired = Arc::clone(&retired);
        let released = Arc::clone(&released);
        let drop_count = Arc::clone(&drop_count);
        thread::spawn(move || {
            let guard = RcuReader::new();
            let node = unsafe { guard.protect(shared.load(Ordering::Acquire)) }.unwrap();

            protected.wait();
            retired.wait();
            thread::sleep(Duration::from_millis(50));

            assert_eq!(node.value, 7, "reference must still be valid");
            assert_eq!(drop_count.load(Ordering::Relaxed), 0);
            released.store(true, Ordering::SeqCst);
        })
    };

    protected.wait();
    let unlinked = shared.swap(ptr::null_mut(), Ordering::AcqRel);
    unsafe { Node::retire(NonNull::new(unlinked).unwrap()) };
    retired.wait();

    // blocks until the reader has left its section
    barrier();
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(drop_count.load(Ordering::Relaxed), 1);

    reader.join().unwrap();
}

#[test]
fn deleter_runs_exactly_once() {
    let sentinel = Arc::new(AtomicUsize::new(0));
    let ptr = NonNull::from(Box::leak(Box::new(String::from("retired"))));

    {
        let sentinel = Arc::clone(&sentinel);
        unsafe {
            retire_raw_with(ptr, move |ptr: NonNull<String>| {
                let string = Box::from_raw(ptr.as_ptr());
                assert_eq!(*string, "retired");
                sentinel.fetch_add(1, Ordering::Relaxed);
            })
        };
    }

    barrier();
    assert_eq!(sentinel.load(Ordering::Relaxed), 1);
    barrier();
    assert_eq!(sentinel.load(Ordering::Relaxed), 1);
}

#[test]
fn deferred_reader_does_not_block() {
    let mut reader = RcuReader::deferred();
    assert!(!reader.is_active());

    // an inactive guard does not hold up any grace period
    thread::spawn(synchronize).join().unwrap();

    reader.lock();
    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            synchronize();
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "grace period completed while the guard was active");

    reader.unlock();
    writer.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn moved_reader_keeps_section() {
    let mut first = RcuReader::new();
    let second = first.take();
    assert!(!first.is_active());
    assert!(second.is_active());

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            synchronize();
            done.store(true, Ordering::SeqCst);
        })
    };

    drop(first);
    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "the moved guard must still hold the section");

    drop(second);
    writer.join().unwrap();
}

/// A node that records its destruction in the slot for its index.
#[repr(C)]
struct Tracked {
    base: RetireBase,
    index: usize,
    drops: Arc<Vec<AtomicUsize>>,
}

impl Drop for Tracked {
    #[inline]
    fn drop(&mut self) {
        self.drops[self.index].fetch_add(1, Ordering::Relaxed);
    }
}

unsafe impl Retirable for Tracked {
    type Deleter = DefaultDelete;

    fn retire_base(&self) -> &RetireBase<Self::Deleter> {
        &self.base
    }
}

/// Retires 1000 nodes from 8 threads and checks that every node is dropped
/// exactly once.
fn retire_from_threads(with_readers: bool) {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 125;
    const TOTAL: usize = THREADS * PER_THREAD;

    let drops: Arc<Vec<AtomicUsize>> =
        Arc::new((0..TOTAL).map(|_| AtomicUsize::new(0)).collect());
    let shared: Arc<Vec<AtomicPtr<Tracked>>> = Arc::new(
        (0..TOTAL)
            .map(|index| {
                let node = Tracked { base: RetireBase::new(), index, drops: Arc::clone(&drops) };
                AtomicPtr::new(Box::into_raw(Box::new(node)))
            })
            .collect(),
    );

    let start = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|id| {
            let shared = Arc::clone(&shared);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut indices: Vec<_> = (id * PER_THREAD..(id + 1) * PER_THREAD).collect();
                indices.shuffle(&mut rng);

                start.wait();
                for idx in indices {
                    if with_readers {
                        // read some other thread's node before retiring one
                        let reader = RcuReader::new();
                        let loaded = shared[rng.gen_range(0..TOTAL)].load(Ordering::Acquire);
                        if let Some(node) = unsafe { reader.protect(loaded) } {
                            assert!(node.index < TOTAL);
                        }
                    }

                    let unlinked = shared[idx].swap(ptr::null_mut(), Ordering::AcqRel);
                    unsafe { Tracked::retire(NonNull::new(unlinked).unwrap()) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    barrier();
    for (index, count) in drops.iter().enumerate() {
        let count = count.load(Ordering::Relaxed);
        assert_eq!(count, 1, "node {} dropped {} times", index, count);
    }
}

#[test]
fn concurrent_retire() {
    retire_from_threads(false);
}

#[test]
fn concurrent_retire_with_readers() {
    retire_from_threads(true);
}

#[test]
fn retire_owned_values() {
    let drop_count = Arc::new(AtomicUsize::new(0));
    for _ in 0..64 {
        retire(Owned::new(DropCount(Arc::clone(&drop_count))));
    }

    barrier();
    assert_eq!(drop_count.load(Ordering::Relaxed), 64);
}
