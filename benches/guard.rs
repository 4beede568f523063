#![feature(test)]

extern crate test;

use std::sync::atomic::{AtomicPtr, Ordering};

use test::Bencher;

use rcu_retire::RcuReader;

#[bench]
fn reader_global(b: &mut Bencher) {
    let atomic = AtomicPtr::new(Box::into_raw(Box::new(0)));

    b.iter(|| {
        let reader = RcuReader::new();
        let loaded = unsafe { reader.protect(atomic.load(Ordering::Acquire)) };
        assert_eq!(loaded, Some(&0));
    });

    unsafe { drop(Box::from_raw(atomic.load(Ordering::Relaxed))) };
}

#[bench]
fn reader_nested(b: &mut Bencher) {
    let outer = RcuReader::new();
    let atomic = AtomicPtr::new(Box::into_raw(Box::new(0)));

    b.iter(|| {
        let reader = RcuReader::new();
        let loaded = unsafe { reader.protect(atomic.load(Ordering::Acquire)) };
        assert_eq!(loaded, Some(&0));
    });

    drop(outer);
    unsafe { drop(Box::from_raw(atomic.load(Ordering::Relaxed))) };
}

#[bench]
fn reader_deferred_lock(b: &mut Bencher) {
    let mut reader = RcuReader::deferred();

    b.iter(|| {
        reader.lock();
        reader.unlock();
    });
}
