// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Non-atomic reference counter.

use core::cell::Cell;

const MAX_REFCOUNT: usize = (isize::MAX) as usize;

/// The error in case a counter would exceed `MAX_REFCOUNT`.
const INTERNAL_OVERFLOW_ERROR: &str = "reference count overflow";

/// The error in case a counter would drop below zero.
const INTERNAL_UNDERFLOW_ERROR: &str = "reference count underflow";

/// Outcome of a [`RefCount::decrement()`].
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decrement {
    /// References remain, the wrapped value is the new count.
    Remaining(usize),
    /// The decrement released the last reference.
    ReachedZero,
}

/// Reference counter.
///
/// All "was this the last reference" decisions are made through
/// [`decrement()`](Self::decrement), which reports whether the count has
/// transitioned to zero. The count never wraps in either direction: exceeding
/// `isize::MAX` or decrementing a zero count is a contract violation and
/// panics.
pub(crate) struct RefCount {
    count: Cell<usize>,
}

impl RefCount {
    pub(crate) const fn new(initial: usize) -> Self {
        Self {
            count: Cell::new(initial),
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> usize {
        self.count.get()
    }

    #[inline]
    pub(crate) fn is_zero(&self) -> bool {
        self.get() == 0
    }

    /// Increment and return the new count.
    #[inline]
    pub(crate) fn increment(&self) -> usize {
        let cur = self.count.get();
        assert!(cur < MAX_REFCOUNT, "{}", INTERNAL_OVERFLOW_ERROR);
        self.count.set(cur + 1);
        cur + 1
    }

    /// Increment only if the count is currently non-zero.
    ///
    /// A count that has reached zero stays at zero permanently. Returns
    /// whether the increment has been made.
    #[inline]
    pub(crate) fn increment_if_nonzero(&self) -> bool {
        if self.is_zero() {
            return false;
        }
        self.increment();
        true
    }

    #[inline]
    pub(crate) fn decrement(&self) -> Decrement {
        let cur = self.count.get();
        assert!(cur != 0, "{}", INTERNAL_UNDERFLOW_ERROR);
        self.count.set(cur - 1);
        if cur == 1 {
            Decrement::ReachedZero
        } else {
            Decrement::Remaining(cur - 1)
        }
    }
}

#[test]
fn test_refcount() {
    let c = RefCount::new(1);
    assert_eq!(c.increment(), 2);
    assert_eq!(c.decrement(), Decrement::Remaining(1));
    assert_eq!(c.decrement(), Decrement::ReachedZero);
    assert!(c.is_zero());
    assert!(!c.increment_if_nonzero());
    assert_eq!(c.get(), 0);

    let c = RefCount::new(3);
    assert!(c.increment_if_nonzero());
    assert_eq!(c.decrement(), Decrement::Remaining(3));
}

#[test]
#[should_panic(expected = "reference count underflow")]
fn test_refcount_underflow() {
    let c = RefCount::new(0);
    let _ = c.decrement();
}

#[test]
#[should_panic(expected = "reference count overflow")]
fn test_refcount_overflow() {
    let c = RefCount::new(MAX_REFCOUNT);
    c.increment();
}
