// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! The control block shared between [`SharedPtr`](crate::SharedPtr) and
//! [`WeakPtr`](crate::WeakPtr) instances referring to the same object.

#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;
use alloc::boxed::Box;

use crate::count::{Decrement, RefCount};
use crate::deleter::Deleter;
use crate::utils_common::alloc::{TryNewError, box_try_new};
use core::{cell::Cell, ptr::NonNull};

/// The error in case a control block's object gets released more than once.
const DOUBLE_RELEASE_ERROR: &str = "control block object released twice";

/// Bookkeeping record coordinating the lifetimes of a managed object and of
/// the record itself.
///
/// * `strong` counts the [`SharedPtr`](crate::SharedPtr)s. The object is alive
///   if and only if `strong` is non-zero.
/// * `weak` counts the [`WeakPtr`](crate::WeakPtr)s.
///
/// The block gets freed by whichever decrement observes both counts at zero,
/// but never while the object is being released: in that case the strong side
/// frees it once the release has completed.
pub(crate) struct ControlBlock<T: ?Sized, D: Deleter<T>> {
    strong: RefCount,
    weak: RefCount,
    releasing: Cell<bool>,
    object: Cell<Option<NonNull<T>>>,
    deleter: D,
}

impl<T: ?Sized, D: Deleter<T>> ControlBlock<T, D> {
    /// Allocate a new control block managing `object`.
    ///
    /// The block starts out with one strong and no weak reference. The
    /// `object` is not released on failure, that's up to the caller.
    pub(crate) fn try_new(object: NonNull<T>) -> Result<NonNull<Self>, TryNewError> {
        #[cfg(test)]
        {
            if FAIL_NEXT_ALLOCATION.with(|fail| fail.replace(false)) {
                return Err(TryNewError::MemoryAllocationFailure);
            }
        }
        let block = box_try_new(Self {
            strong: RefCount::new(1),
            weak: RefCount::new(0),
            releasing: Cell::new(false),
            object: Cell::new(Some(object)),
            deleter: D::default(),
        })?;
        #[cfg(test)]
        LIVE_CONTROL_BLOCKS.with(|live| live.set(live.get() + 1));
        Ok(NonNull::from(Box::leak(block)))
    }

    /// The managed object, `None` once it has been released.
    #[inline]
    pub(crate) fn object(&self) -> Option<NonNull<T>> {
        self.object.get()
    }

    #[inline]
    pub(crate) fn deleter(&self) -> &D {
        &self.deleter
    }

    #[inline]
    pub(crate) fn strong_count(&self) -> usize {
        self.strong.get()
    }

    #[inline]
    pub(crate) fn weak_count(&self) -> usize {
        self.weak.get()
    }

    #[inline]
    pub(crate) fn increment_strong(&self) -> usize {
        self.strong.increment()
    }

    /// Decrement the strong count.
    ///
    /// Releasing the object when the count reaches zero is up to the caller,
    /// c.f. [`drop_strong()`](Self::drop_strong).
    #[inline]
    pub(crate) fn decrement_strong(&self) -> Decrement {
        self.strong.decrement()
    }

    /// Take another strong reference, but only if the object is still alive.
    #[inline]
    pub(crate) fn try_increment_strong(&self) -> bool {
        self.strong.increment_if_nonzero()
    }

    #[inline]
    pub(crate) fn increment_weak(&self) -> usize {
        self.weak.increment()
    }

    /// Decrement the weak count.
    ///
    /// Freeing the block when both counts are zero is up to the caller, c.f.
    /// [`drop_weak()`](Self::drop_weak).
    #[inline]
    pub(crate) fn decrement_weak(&self) -> Decrement {
        self.weak.decrement()
    }

    /// Run the deletion policy on the managed object.
    ///
    /// The object reference gets cleared before the policy runs. Panics if the
    /// object has been released already.
    pub(crate) fn release(&self) {
        let object = self.object.take();
        assert!(object.is_some(), "{}", DOUBLE_RELEASE_ERROR);
        rc_trace!("releasing {:?} object at {:p}", D::KIND, self);
        // SAFETY: the object had been handed over to the block at construction
        // and, as it was still present, it has not been released yet.
        unsafe { self.deleter.delete(object) };
    }

    /// Drop one strong reference.
    ///
    /// If that was the last one, the object gets released. If there are no
    /// weak references either, the block gets freed.
    ///
    /// # Safety
    ///
    /// `this` must point to a live control block and the caller must own one
    /// strong reference on it, which gets consumed.
    pub(crate) unsafe fn drop_strong(this: NonNull<Self>) {
        // SAFETY: the caller's strong reference keeps the block alive.
        let block = unsafe { this.as_ref() };
        if let Decrement::Remaining(_) = block.decrement_strong() {
            return;
        }

        // Weak references dropped from within the object's destructor must
        // not free the block. The guard frees it afterwards if due, even if
        // the destructor panics.
        block.releasing.set(true);
        let _guard = ReleaseGuard { block: this };
        block.release();
    }

    /// Drop one weak reference, freeing the block if both counts are zero
    /// afterwards.
    ///
    /// # Safety
    ///
    /// `this` must point to a live control block and the caller must own one
    /// weak reference on it, which gets consumed.
    pub(crate) unsafe fn drop_weak(this: NonNull<Self>) {
        // SAFETY: the caller's weak reference keeps the block alive.
        let block = unsafe { this.as_ref() };
        if let Decrement::ReachedZero = block.decrement_weak() {
            if block.strong.is_zero() && !block.releasing.get() {
                // SAFETY: no references are left.
                unsafe { Self::free(this) };
            }
        }
    }

    /// # Safety
    ///
    /// `this` must have been obtained from [`try_new()`](Self::try_new), both
    /// counts must be zero and the block must not be accessed afterwards.
    unsafe fn free(this: NonNull<Self>) {
        debug_assert!(unsafe { this.as_ref() }.object().is_none());
        rc_trace!("freeing control block at {:p}", this);
        #[cfg(test)]
        LIVE_CONTROL_BLOCKS.with(|live| live.set(live.get() - 1));
        // SAFETY: the block had been allocated as a Box in try_new().
        drop(unsafe { Box::from_raw(this.as_ptr()) });
    }
}

/// Marks a control block's object release as in progress and frees the block
/// upon completion if no weak references are left.
struct ReleaseGuard<T: ?Sized, D: Deleter<T>> {
    block: NonNull<ControlBlock<T, D>>,
}

impl<T: ?Sized, D: Deleter<T>> Drop for ReleaseGuard<T, D> {
    fn drop(&mut self) {
        // SAFETY: with the release in progress, the block cannot have been
        // freed by anyone else.
        let block = unsafe { self.block.as_ref() };
        block.releasing.set(false);
        if block.weak.is_zero() {
            // SAFETY: no references are left.
            unsafe { ControlBlock::free(self.block) };
        }
    }
}

#[cfg(test)]
std::thread_local! {
    static LIVE_CONTROL_BLOCKS: Cell<usize> = const { Cell::new(0) };
    static FAIL_NEXT_ALLOCATION: Cell<bool> = const { Cell::new(false) };
}

/// Make the next control block allocation on the current thread fail.
#[cfg(test)]
pub(crate) fn fail_next_control_block_allocation() {
    FAIL_NEXT_ALLOCATION.with(|fail| fail.set(true));
}

/// Number of control blocks allocated and not yet freed by the current
/// thread.
#[cfg(test)]
pub(crate) fn live_control_blocks() -> usize {
    LIVE_CONTROL_BLOCKS.with(|live| live.get())
}

#[cfg(test)]
use crate::{deleter::DefaultDelete, test::DropCounter};

#[cfg(test)]
fn new_tracked_block(counter: &DropCounter) -> NonNull<ControlBlock<crate::test::Tracked<u32>, DefaultDelete>> {
    let object = NonNull::from(Box::leak(Box::new(counter.track(42u32))));
    ControlBlock::try_new(object).unwrap()
}

#[test]
fn test_control_block_counts() {
    let counter = DropCounter::new();
    let this = new_tracked_block(&counter);
    let block = unsafe { this.as_ref() };
    assert_eq!(block.strong_count(), 1);
    assert_eq!(block.weak_count(), 0);
    assert_eq!(block.increment_strong(), 2);
    assert_eq!(block.increment_weak(), 1);
    assert_eq!(block.decrement_strong(), Decrement::Remaining(1));
    assert!(block.try_increment_strong());
    assert_eq!(block.strong_count(), 2);

    unsafe { ControlBlock::drop_strong(this) };
    assert_eq!(counter.drops(), 0);
    unsafe { ControlBlock::drop_strong(this) };
    assert_eq!(counter.drops(), 1);
    assert_eq!(live_control_blocks(), 1);

    let block = unsafe { this.as_ref() };
    assert!(block.object().is_none());
    assert!(!block.try_increment_strong());
    unsafe { ControlBlock::drop_weak(this) };
    assert_eq!(live_control_blocks(), 0);
    assert_eq!(counter.drops(), 1);
}

#[test]
fn test_control_block_freed_with_last_strong() {
    let counter = DropCounter::new();
    let this = new_tracked_block(&counter);
    assert_eq!(live_control_blocks(), 1);
    unsafe { ControlBlock::drop_strong(this) };
    assert_eq!(counter.drops(), 1);
    assert_eq!(live_control_blocks(), 0);
}

#[test]
#[should_panic(expected = "control block object released twice")]
fn test_control_block_double_release() {
    let counter = DropCounter::new();
    let this = new_tracked_block(&counter);
    let block = unsafe { this.as_ref() };
    block.release();
    block.release();
}

#[test]
fn test_control_block_weak_dropped_during_release() {
    struct DropsWeak {
        block: NonNull<ControlBlock<DropsWeak, DefaultDelete>>,
    }

    impl Drop for DropsWeak {
        fn drop(&mut self) {
            let block = unsafe { self.block.as_ref() };
            assert_eq!(block.weak_count(), 1);
            unsafe { ControlBlock::drop_weak(self.block) };
            assert_eq!(live_control_blocks(), 1);
        }
    }

    let object = NonNull::from(Box::leak(Box::new(DropsWeak { block: NonNull::dangling() })));
    let this = ControlBlock::try_new(object).unwrap();
    unsafe { (*object.as_ptr()).block = this };
    unsafe { this.as_ref() }.increment_weak();

    unsafe { ControlBlock::drop_strong(this) };
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_control_block_allocation_failure() {
    let counter = DropCounter::new();
    let object = NonNull::from(Box::leak(Box::new(counter.track(1u8))));
    fail_next_control_block_allocation();
    let r = ControlBlock::<_, DefaultDelete>::try_new(object);
    assert_eq!(r.err(), Some(TryNewError::MemoryAllocationFailure));
    assert_eq!(live_control_blocks(), 0);
    // Only the next allocation fails.
    let this = ControlBlock::<_, DefaultDelete>::try_new(object).unwrap();
    unsafe { ControlBlock::drop_strong(this) };
    assert_eq!(counter.drops(), 1);
}
