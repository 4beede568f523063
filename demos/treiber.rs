use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::sync::atomic::{
    AtomicPtr, AtomicUsize,
    Ordering::{Acquire, Relaxed, Release},
};
use std::sync::Arc;
use std::thread;
use std::time;

use rcu_retire::{barrier, DefaultDelete, RcuReader, RetireBase, Retirable};

const PRE_FILL_OPS: usize = 1_000;
const PUSH_OPS: usize = 100_000;
const THREADS: usize = 4;

fn main() {
    println!("example: Treiber's lock-free stack with RCU");

    let drops = Arc::new(AtomicUsize::new(0));
    let stack = Arc::new(Treiber::new());

    let now = time::Instant::now();
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let stack = Arc::clone(&stack);
            let drops = Arc::clone(&drops);
            thread::spawn(move || {
                for _ in 0..PRE_FILL_OPS {
                    stack.push(DropCount(Arc::clone(&drops)));
                }

                for _ in 0..PUSH_OPS {
                    let _ = stack.pop();
                    let _ = stack.peek_with(|_| ());
                    stack.push(DropCount(Arc::clone(&drops)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    println!("all joined, time: {} ms", now.elapsed().as_millis());

    drop(stack);
    barrier();

    let expected = THREADS * (PRE_FILL_OPS + PUSH_OPS);
    assert_eq!(drops.load(Relaxed), expected);
    println!("all {} elements dropped", expected);
}

struct DropCount(Arc<AtomicUsize>);
impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Relaxed);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Treiber
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Treiber's lock-free stack, popped nodes are reclaimed after a grace period.
struct Treiber<T> {
    head: AtomicPtr<Node<T>>,
    _marker: PhantomData<T>,
}

impl<T: Send + 'static> Treiber<T> {
    fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()), _marker: PhantomData }
    }

    fn push(&self, elem: T) {
        let node = Box::into_raw(Box::new(Node {
            base: RetireBase::new(),
            elem: ManuallyDrop::new(elem),
            next: ptr::null_mut(),
        }));

        loop {
            let head = self.head.load(Relaxed);
            unsafe { (*node).next = head };
            if self.head.compare_exchange_weak(head, node, Release, Relaxed).is_ok() {
                return;
            }
        }
    }

    fn pop(&self) -> Option<T> {
        let reader = RcuReader::new();
        loop {
            let head = self.head.load(Acquire);
            // the node can not be freed while the reader is active
            let node = unsafe { reader.protect(head) }?;
            if self.head.compare_exchange_weak(head, node.next, Release, Relaxed).is_ok() {
                unsafe {
                    // the element is moved out exactly once, by the thread that unlinked the node
                    let elem = ptr::read(&*node.elem);
                    Node::retire(NonNull::new_unchecked(head));
                    return Some(elem);
                }
            }
        }
    }

    fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let reader = RcuReader::new();
        let node = unsafe { reader.protect(self.head.load(Acquire)) }?;
        Some(f(&node.elem))
    }
}

impl<T> Drop for Treiber<T> {
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            let mut node = unsafe { Box::from_raw(curr) };
            curr = node.next;
            unsafe { ManuallyDrop::drop(&mut node.elem) };
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

#[repr(C)]
struct Node<T> {
    base: RetireBase,
    elem: ManuallyDrop<T>,
    next: *mut Node<T>,
}

// `next` is never written once the node is published
unsafe impl<T: Send> Send for Node<T> {}

unsafe impl<T: Send + 'static> Retirable for Node<T> {
    type Deleter = DefaultDelete;

    #[inline]
    fn retire_base(&self) -> &RetireBase<Self::Deleter> {
        &self.base
    }
}
