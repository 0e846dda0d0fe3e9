// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Deletion policies for releasing managed objects.

#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;
use alloc::boxed::Box;

use core::ptr::NonNull;

/// Shape of the objects a [`Deleter`] releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionKind {
    /// A single object.
    Scalar,
    /// A contiguous sequence of objects.
    Sequence,
}

/// Policy for releasing a managed object.
///
/// A `Deleter` is a pure strategy without any state of its own. It is
/// invoked at most once for any given object by the ownership handles, it does
/// not need to guard against repeated invocations by itself.
pub trait Deleter<T: ?Sized>: Default {
    /// The shape of objects released by this policy.
    const KIND: DeletionKind;

    /// Release an object.
    ///
    /// A `None` `ptr` is the null target, deleting it is a no-op.
    ///
    /// # Safety
    ///
    /// If not `None`, `ptr` must refer to a live object in a heap allocation
    /// of the form expected by the policy, which has not been released
    /// already and is not referenced from anywhere else anymore.
    unsafe fn delete(&self, ptr: Option<NonNull<T>>);
}

/// Scalar [`Deleter`]: releases a single object previously allocated as a
/// [`Box<T>`](Box).
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDelete;

impl<T> Deleter<T> for DefaultDelete {
    const KIND: DeletionKind = DeletionKind::Scalar;

    unsafe fn delete(&self, ptr: Option<NonNull<T>>) {
        if let Some(ptr) = ptr {
            // SAFETY: the caller guarantees that ptr originates from a Box<T> and
            // has not been released yet.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
    }
}

/// Sequence [`Deleter`]: releases a slice of objects previously allocated as a
/// [`Box<[T]>`](Box).
#[derive(Clone, Copy, Debug, Default)]
pub struct ArrayDelete;

impl<T> Deleter<[T]> for ArrayDelete {
    const KIND: DeletionKind = DeletionKind::Sequence;

    unsafe fn delete(&self, ptr: Option<NonNull<[T]>>) {
        if let Some(ptr) = ptr {
            // SAFETY: the caller guarantees that ptr originates from a Box<[T]> and
            // has not been released yet.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
    }
}

#[cfg(test)]
use crate::test::DropCounter;

#[test]
fn test_default_delete() {
    let counter = DropCounter::new();
    let object = NonNull::from(Box::leak(Box::new(counter.track(1u8))));
    unsafe { DefaultDelete.delete(Some(object)) };
    assert_eq!(counter.drops(), 1);

    unsafe { Deleter::<u8>::delete(&DefaultDelete, None) };
    assert_eq!(<DefaultDelete as Deleter<u8>>::KIND, DeletionKind::Scalar);
}

#[test]
fn test_array_delete() {
    let counter = DropCounter::new();
    let objects: Box<[_]> = (0..4).map(|i| counter.track(i)).collect();
    let objects = NonNull::from(Box::leak(objects));
    unsafe { ArrayDelete.delete(Some(objects)) };
    assert_eq!(counter.drops(), 4);

    unsafe { Deleter::<[u8]>::delete(&ArrayDelete, None) };
    assert_eq!(<ArrayDelete as Deleter<[u8]>>::KIND, DeletionKind::Sequence);
}
