// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Implementation of [`WeakPtr`].

#![deny(unsafe_op_in_unsafe_fn)]

use crate::control_block::ControlBlock;
use crate::deleter::{DefaultDelete, Deleter};
use crate::shared::SharedPtr;
use core::{fmt, ptr::NonNull};

/// Non-owning observer of an object managed by [`SharedPtr`]s.
///
/// A `WeakPtr` never extends the managed object's lifetime, only that of the
/// control block, so that it can detect the object's expiration. Use
/// [`lock()`](Self::lock) to obtain a [`SharedPtr`] while the object is still
/// alive.
pub struct WeakPtr<T: ?Sized, D: Deleter<T> = DefaultDelete> {
    block: Option<NonNull<ControlBlock<T, D>>>,
}

impl<T: ?Sized, D: Deleter<T>> WeakPtr<T, D> {
    /// Instantiate an empty [`WeakPtr`] not observing anything.
    pub const fn new_empty() -> Self {
        Self { block: None }
    }

    #[inline]
    fn control_block(&self) -> Option<&ControlBlock<T, D>> {
        // SAFETY: the block is kept alive by self's weak reference.
        self.block.map(|block| unsafe { block.as_ref() })
    }

    /// Observe the object managed by `shared` instead.
    ///
    /// The weak reference previously held by `self`, if any, gets dropped.
    pub fn assign(&mut self, shared: &SharedPtr<T, D>) {
        *self = Self::from(shared);
    }

    /// Number of [`SharedPtr`]s referencing the observed object.
    ///
    /// Zero if empty or if the object has expired.
    pub fn use_count(&self) -> usize {
        self.control_block().map_or(0, |block| block.strong_count())
    }

    /// Number of [`WeakPtr`]s observing the object, including `self`.
    pub fn weak_count(&self) -> usize {
        self.control_block().map_or(0, |block| block.weak_count())
    }

    /// Whether the observed object is gone, or if there never was one.
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Attempt to obtain a [`SharedPtr`] to the observed object.
    ///
    /// Returns an empty [`SharedPtr`] if the object has expired, including
    /// when called from within the object's own destructor.
    pub fn lock(&self) -> SharedPtr<T, D> {
        match self.block {
            // SAFETY: the block is kept alive by self's weak reference.
            Some(block) if unsafe { block.as_ref() }.try_increment_strong() => {
                // SAFETY: a strong reference has just been taken on the block.
                unsafe { SharedPtr::from_locked_block(block) }
            }
            _ => SharedPtr::new_empty(),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> From<&SharedPtr<T, D>> for WeakPtr<T, D> {
    fn from(shared: &SharedPtr<T, D>) -> Self {
        if let Some(block) = shared.control_block() {
            block.increment_weak();
        }
        Self {
            block: shared.control_block_ptr(),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> Clone for WeakPtr<T, D> {
    fn clone(&self) -> Self {
        if let Some(block) = self.control_block() {
            block.increment_weak();
        }
        Self { block: self.block }
    }
}

impl<T: ?Sized, D: Deleter<T>> Drop for WeakPtr<T, D> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: self owned one weak reference on the block.
            unsafe { ControlBlock::drop_weak(block) };
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> Default for WeakPtr<T, D> {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl<T: ?Sized, D: Deleter<T>> fmt::Debug for WeakPtr<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPtr")
            .field("use_count", &self.use_count())
            .field("weak_count", &self.weak_count())
            .finish()
    }
}

#[cfg(test)]
use crate::{control_block::live_control_blocks, test::DropCounter};

#[test]
fn test_weak_empty() {
    let w = WeakPtr::<u32>::new_empty();
    assert!(w.expired());
    assert_eq!(w.use_count(), 0);
    assert_eq!(w.weak_count(), 0);
    assert!(w.lock().is_empty());

    let w = WeakPtr::from(&SharedPtr::<u32>::new_empty());
    assert!(w.expired());
    assert!(w.lock().is_empty());
}

#[test]
fn test_weak_lock() {
    let counter = DropCounter::new();
    let a = SharedPtr::try_new(counter.track(3u32)).unwrap();
    let w = a.downgrade();
    assert!(!w.expired());
    assert_eq!(w.weak_count(), 1);

    let b = w.lock();
    assert!(b.ptr_eq(&a));
    assert_eq!(a.use_count(), 2);
    assert_eq!(**b, 3);

    drop(a);
    assert!(!w.expired());
    drop(b);
    assert!(w.expired());
    assert_eq!(counter.drops(), 1);
    assert!(w.lock().is_empty());
    assert_eq!(w.weak_count(), 1);
}

#[test]
fn test_weak_clone() {
    let a = SharedPtr::try_new(1u8).unwrap();
    let w0 = WeakPtr::from(&a);
    let w1 = w0.clone();
    assert_eq!(a.weak_count(), 2);
    drop(a);
    drop(w0);
    assert_eq!(live_control_blocks(), 1);
    assert!(w1.expired());
    drop(w1);
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_weak_assign() {
    let counter = DropCounter::new();
    let a = SharedPtr::try_new(counter.track(1u8)).unwrap();
    let b = SharedPtr::try_new(counter.track(2u8)).unwrap();
    let mut w = a.downgrade();
    drop(a);
    assert_eq!(live_control_blocks(), 2);

    // Reassignment drops the last reference on the expired block.
    w.assign(&b);
    assert_eq!(live_control_blocks(), 1);
    assert_eq!(b.weak_count(), 1);
    assert_eq!(**w.lock(), 2);

    // Reassignment to the same block keeps the weak count.
    w.assign(&b);
    assert_eq!(b.weak_count(), 1);

    w.assign(&SharedPtr::new_empty());
    assert!(w.expired());
    assert_eq!(b.weak_count(), 0);
    drop(b);
    assert_eq!(counter.drops(), 2);
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_weak_outlives_object() {
    let counter = DropCounter::new();
    let weaks = {
        let a = SharedPtr::try_new(counter.track([0u8; 16])).unwrap();
        [a.downgrade(), a.downgrade(), a.downgrade()]
    };
    assert_eq!(counter.drops(), 1);
    assert_eq!(weaks[0].weak_count(), 3);
    assert!(weaks.iter().all(|w| w.expired()));
    drop(weaks);
    assert_eq!(live_control_blocks(), 0);
}
