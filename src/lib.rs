//! Deferred reclamation and reader guards for read-copy-update (RCU).
//!
//! RCU lets any number of readers traverse a shared data structure without
//! taking locks, while a writer logically replaces or removes nodes.
//! A removed node can not be de-allocated right away, because readers that
//! started their traversal before the removal may still hold references to
//! it.
//! Instead, destruction is deferred for a *grace period*, after which every
//! read-side critical section that could have observed the node has ended.
//!
//! This crate is a thin ownership layer on top of an RCU runtime.
//! The runtime itself (detecting grace periods and running deferred
//! callbacks) is abstracted by the [`Rcu`] trait; the crate provides:
//!
//! - [`RetireBase`] and [`Retirable`]: an intrusive header a node type embeds
//!   as its first field to become retirable.
//!   The deleter passed on retirement is stored inline in the node and
//!   invoked through a monomorphized trampoline, so the runtime only ever
//!   deals with untyped [`RcuHead`] pointers.
//! - [`ReaderGuard`]: a move-only RAII guard for read-side critical sections,
//!   which may be created in a deferred (inactive) state.
//! - [`retire_in`] and [`retire_raw_in`]: entry points for retiring values
//!   that do not embed a [`RetireBase`], by wrapping them in one.
//!
//! With the (default) `std` feature, the crate also ships a process-wide
//! runtime, [`GlobalRcu`], along with shorthands like [`RcuReader`],
//! [`retire`], [`synchronize`] and [`barrier`].
//! The global runtime can be configured through [`CONFIG`] before its first
//! use.
//!
//! # Example
//!
//! ```
//! use std::ptr::NonNull;
//!
//! use rcu_retire::{barrier, DefaultDelete, RcuReader, RetireBase, Retirable};
//!
//! #[repr(C)]
//! struct Node {
//!     base: RetireBase,
//!     value: i32,
//! }
//!
//! unsafe impl Retirable for Node {
//!     type Deleter = DefaultDelete;
//!
//!     fn retire_base(&self) -> &RetireBase<Self::Deleter> {
//!         &self.base
//!     }
//! }
//!
//! let node = NonNull::from(Box::leak(Box::new(Node { base: RetireBase::new(), value: 1 })));
//!
//! {
//!     let reader = RcuReader::new();
//!     let value = unsafe { reader.protect(node.as_ptr()) }.map(|node| node.value);
//!     assert_eq!(value, Some(1));
//! }
//!
//! // the node has been unlinked from wherever it was reachable
//! unsafe { Node::retire(node) };
//! // wait until the node has actually been destroyed
//! barrier();
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

#[cfg(not(feature = "std"))]
extern crate alloc;

mod base;
mod deleter;
mod guard;
mod head;
mod owned;
mod retire;

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        mod config;
        mod default;
        mod global;
        mod local;
        mod queue;
        mod reader;

        pub use crate::config::{Config, ConfigBuilder, ConfigError};
        pub use crate::default::{
            barrier, retire, retire_raw, retire_raw_with, synchronize, GlobalRcu, RcuReader, CONFIG,
        };
    }
}


use core::ptr::NonNull;

pub use crate::base::{RetireBase, Retirable};
pub use crate::deleter::{DefaultDelete, Deleter};
pub use crate::guard::ReaderGuard;
pub use crate::head::{RcuHead, ReclaimFn};
pub use crate::owned::Owned;
pub use crate::retire::{retire_in, retire_raw_in};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Rcu (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The primitives of an RCU runtime, which detects grace periods and runs
/// deferred reclamation callbacks.
///
/// All functions are associated functions without a receiver, a runtime is
/// identified by its type alone.
///
/// # Safety
///
/// Implementors must guarantee that no grace period that started while a
/// thread is inside a read-side critical section (between a call to
/// [`enter_read_section`][Rcu::enter_read_section] and the matching
/// [`exit_read_section`][Rcu::exit_read_section]) completes before that
/// section is exited.
/// Every callback passed to [`schedule_reclaim`][Rcu::schedule_reclaim] must
/// be invoked exactly once and only after such a grace period.
pub unsafe trait Rcu: 'static {
    /// Marks the calling thread as being inside a read-side critical section.
    ///
    /// Sections may be nested by entering them multiple times.
    fn enter_read_section();

    /// Marks the calling thread as having left the critical section entered by
    /// the matching call to [`enter_read_section`][Rcu::enter_read_section].
    fn exit_read_section();

    /// Blocks until every read-side critical section that was active at the
    /// time of the call has been exited.
    fn synchronize();

    /// Registers `callback` to be invoked with `head` once a grace period
    /// beginning at the time of the call has elapsed.
    ///
    /// Callbacks may be batched and may be invoked on an arbitrary thread.
    ///
    /// # Safety
    ///
    /// `head` must be valid and must not already be scheduled for
    /// reclamation, ownership of the node it belongs to passes to the
    /// runtime.
    unsafe fn schedule_reclaim(head: NonNull<RcuHead>, callback: ReclaimFn);

    /// Blocks until all reclamations scheduled before the call have executed
    /// their callback.
    fn drain_all_reclaims();
}

// The ThreadSanitizer can not correctly asses ordering restraints from explicit
// fences, so memory operations around such fences need stricter ordering than
// `Relaxed`, when instrumentation is chosen.

#[cfg(all(feature = "std", not(feature = "sanitize-threads")))]
mod sanitize {
    use core::sync::atomic::Ordering;

    pub const RELAXED_LOAD: Ordering = Ordering::Relaxed;
    pub const RELAXED_STORE: Ordering = Ordering::Relaxed;
}

#[cfg(all(feature = "std", feature = "sanitize-threads"))]
mod sanitize {
    use core::sync::atomic::Ordering;

    pub const RELAXED_LOAD: Ordering = Ordering::Acquire;
    pub const RELAXED_STORE: Ordering = Ordering::Release;
}
