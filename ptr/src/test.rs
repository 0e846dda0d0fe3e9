// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Instrumented values for observing when managed objects get released.

extern crate alloc;
use alloc::rc::Rc;

use core::{cell, fmt, ops};

/// Counter of [`Tracked`] value destructions.
///
/// Clones share the same count.
#[derive(Clone, Default)]
pub struct DropCounter {
    drops: Rc<cell::Cell<usize>>,
}

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`Tracked`] values associated with this counter dropped so
    /// far.
    pub fn drops(&self) -> usize {
        self.drops.get()
    }

    /// Wrap `value` in a [`Tracked`] reporting its drop to `self`.
    pub fn track<T>(&self, value: T) -> Tracked<T> {
        Tracked {
            value,
            counter: self.clone(),
        }
    }
}

/// A value reporting its destruction to a [`DropCounter`].
pub struct Tracked<T> {
    value: T,
    counter: DropCounter,
}

impl<T> ops::Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> ops::DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.counter.drops.set(self.counter.drops.get() + 1);
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.value, f)
    }
}

#[cfg(test)]
std::thread_local! {
    static COUNTING_DELETE_INVOCATIONS: cell::Cell<usize> = const { cell::Cell::new(0) };
    static COUNTING_DELETE_NULL_INVOCATIONS: cell::Cell<usize> = const { cell::Cell::new(0) };
}

/// Scalar [`Deleter`](crate::Deleter) recording its invocations, including
/// those for the null target, per thread.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CountingDelete;

#[cfg(test)]
impl CountingDelete {
    /// Invocations for an actual object on the current thread.
    pub(crate) fn invocations() -> usize {
        COUNTING_DELETE_INVOCATIONS.with(|c| c.get())
    }

    /// Invocations for the null target on the current thread.
    pub(crate) fn null_invocations() -> usize {
        COUNTING_DELETE_NULL_INVOCATIONS.with(|c| c.get())
    }
}

#[cfg(test)]
impl<T> crate::Deleter<T> for CountingDelete {
    const KIND: crate::DeletionKind = crate::DeletionKind::Scalar;

    unsafe fn delete(&self, ptr: Option<core::ptr::NonNull<T>>) {
        let invocations = match ptr {
            Some(_) => &COUNTING_DELETE_INVOCATIONS,
            None => &COUNTING_DELETE_NULL_INVOCATIONS,
        };
        invocations.with(|c| c.set(c.get() + 1));
        unsafe { <crate::DefaultDelete as crate::Deleter<T>>::delete(&crate::DefaultDelete, ptr) };
    }
}
