// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Fallible heap allocation primitives.
//!
//! The Rust core [`Box::new()`] aborts on memory allocation failure. The
//! helpers provided here report the failure back to the caller by means of
//! [`TryNewError`] instead, which then gets propagated through the ownership
//! handles built on top.

#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;
use alloc::{boxed::Box, vec::Vec};

use core::ptr;

/// Error type returned by the fallible allocation primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TryNewError {
    /// Memory allocation failure.
    MemoryAllocationFailure,
}

/// Try to move a value into a new [`Box`].
///
/// Just like [`Box::new()`], except that a memory allocation failure is
/// reported back.
///
/// # Arguments:
///
/// * `value` - The value to move into the heap allocation. Gets dropped on
///   failure.
#[inline]
pub fn box_try_new<T>(value: T) -> Result<Box<T>, TryNewError> {
    box_try_new_recoverable(value).map_err(|(_value, e)| e)
}

/// Try to move a value into a new [`Box`], returning the value back upon
/// allocation failure.
///
/// With [`box_try_new()`], the `value` gets consumed and is effectively lost
/// upon allocation failure. `box_try_new_recoverable()` on the other hand
/// returns the `value` back to the caller alongside the error code in this
/// case.
///
/// # Arguments:
///
/// * `value` - The value to move into the heap allocation.
pub fn box_try_new_recoverable<T>(value: T) -> Result<Box<T>, (T, TryNewError)> {
    let layout = alloc::alloc::Layout::new::<T>();
    if layout.size() == 0 {
        // ZSTs never allocate.
        return Ok(Box::new(value));
    }

    // SAFETY: the layout has non-zero size.
    let allocation_ptr = unsafe { alloc::alloc::alloc(layout) } as *mut T;
    if allocation_ptr.is_null() {
        return Err((value, TryNewError::MemoryAllocationFailure));
    }

    // SAFETY: the memory is freshly allocated with the layout of T and hence
    // suitable for storing a T. A Box may own memory obtained from the global
    // allocator with Layout::new::<T>().
    unsafe {
        ptr::write(allocation_ptr, value);
        Ok(Box::from_raw(allocation_ptr))
    }
}

/// Try to allocate a boxed slice of specified length and initialize its
/// elements with values produced by a provided function.
///
/// `f` gets invoked with the respective element index only after the memory
/// allocation has succeeded, so nothing is constructed on failure.
///
/// # Arguments:
///
/// * `len` - The number of elements in the returned slice.
/// * `f` - The element initialization function.
pub fn box_slice_try_new_from_fn<T, F: FnMut(usize) -> T>(len: usize, mut f: F) -> Result<Box<[T]>, TryNewError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| TryNewError::MemoryAllocationFailure)?;
    for i in 0..len {
        v.push(f(i));
    }
    // The capacity equals the length after the exact reservation on an empty
    // Vec, there is no shrinking reallocation.
    Ok(v.into_boxed_slice())
}

#[test]
fn test_box_try_new() {
    let b = box_try_new(42u64).unwrap();
    assert_eq!(*b, 42);

    #[derive(Debug, PartialEq, Eq)]
    struct Zst;
    let b = box_try_new(Zst).unwrap();
    assert_eq!(*b, Zst);
}

#[test]
fn test_box_try_new_recoverable() {
    let b = match box_try_new_recoverable([7u8; 64]) {
        Ok(b) => b,
        Err(_) => panic!("allocation of 64 bytes failed"),
    };
    assert!(b.iter().all(|v| *v == 7));
}

#[test]
fn test_box_slice_try_new_from_fn() {
    let s = box_slice_try_new_from_fn(5, |i| i * 2).unwrap();
    assert_eq!(&*s, &[0, 2, 4, 6, 8]);

    let mut invocations = 0usize;
    let s = box_slice_try_new_from_fn(0, |_| {
        invocations += 1;
        0u32
    })
    .unwrap();
    assert!(s.is_empty());
    assert_eq!(invocations, 0);
}

#[test]
fn test_box_slice_try_new_from_fn_overflow() {
    // The byte size overflows isize::MAX and the reservation fails up front.
    let r = box_slice_try_new_from_fn(usize::MAX, |_| 0u64);
    assert_eq!(r.err(), Some(TryNewError::MemoryAllocationFailure));
}
