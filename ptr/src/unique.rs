// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Implementation of [`UniquePtr`].

#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;
use alloc::boxed::Box;

use crate::deleter::{ArrayDelete, DefaultDelete, Deleter};
use crate::utils_common::alloc::{TryNewError, box_slice_try_new_from_fn, box_try_new};
use core::{
    fmt, marker, mem, ops,
    ptr::{self, NonNull},
};

/// The error in case an empty [`UniquePtr`] gets dereferenced.
const EMPTY_DEREF_ERROR: &str = "dereferenced an empty UniquePtr";

/// Sole ownership of a heap allocated object.
///
/// There is no reference counting: dropping a `UniquePtr` always invokes the
/// [`Deleter`] `D`, with the null target if the `UniquePtr` is empty. Deleters
/// are stateless, a fresh `D` gets instantiated whenever one is needed.
pub struct UniquePtr<T: ?Sized, D: Deleter<T> = DefaultDelete> {
    object: Option<NonNull<T>>,
    _phantom: marker::PhantomData<(D, Box<T>)>,
}

/// [`UniquePtr`] managing a slice of objects.
pub type UniqueSlice<T> = UniquePtr<[T], ArrayDelete>;

impl<T: ?Sized, D: Deleter<T>> UniquePtr<T, D> {
    /// Instantiate an empty [`UniquePtr`] not managing any object.
    pub const fn new_empty() -> Self {
        Self {
            object: None,
            _phantom: marker::PhantomData,
        }
    }

    /// Take over ownership of an object from a raw pointer.
    ///
    /// A null `ptr` yields an empty `UniquePtr`.
    ///
    /// # Safety
    ///
    /// If non-null, `ptr` must refer to an object releasable through `D`,
    /// e.g. one obtained from [`Box::into_raw()`] for the [`DefaultDelete`],
    /// which is not owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            object: NonNull::new(ptr),
            _phantom: marker::PhantomData,
        }
    }

    /// Give up ownership of the managed object without releasing it.
    pub fn into_raw(self) -> Option<NonNull<T>> {
        let this = mem::ManuallyDrop::new(self);
        this.object
    }

    /// Move the managed object out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::new_empty())
    }

    /// Release the managed object, leaving `self` empty.
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Access the managed object, `None` if empty.
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the object is owned by self.
        self.object.map(|object| unsafe { object.as_ref() })
    }

    /// Mutably access the managed object, `None` if empty.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: the object is owned exclusively by self.
        self.object.map(|mut object| unsafe { object.as_mut() })
    }

    /// Raw pointer to the managed object, `None` if empty.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.object
    }

    /// Whether `self` manages no object.
    pub fn is_empty(&self) -> bool {
        self.object.is_none()
    }

    /// The [`Deleter`] the managed object gets released through.
    pub fn get_deleter(&self) -> D {
        D::default()
    }
}

impl<T> UniquePtr<T, DefaultDelete> {
    /// Move a value into a new heap allocation managed by a [`UniquePtr`].
    pub fn try_new(value: T) -> Result<Self, TryNewError> {
        Ok(Self::from_box(box_try_new(value)?))
    }

    /// Take over ownership of a boxed object.
    pub fn from_box(object: Box<T>) -> Self {
        // SAFETY: a raw Box is releasable through the DefaultDelete.
        unsafe { Self::from_raw(Box::into_raw(object)) }
    }

    /// Convert back into a [`Box`], `None` if empty.
    pub fn into_box(self) -> Option<Box<T>> {
        // SAFETY: the object has been handed over as a Box.
        self.into_raw().map(|object| unsafe { Box::from_raw(object.as_ptr()) })
    }
}

impl<T> UniquePtr<[T], ArrayDelete> {
    /// Take over ownership of a boxed slice.
    pub fn from_boxed_slice(objects: Box<[T]>) -> Self {
        // SAFETY: a raw boxed slice is releasable through the ArrayDelete.
        unsafe { Self::from_raw(Box::into_raw(objects)) }
    }

    /// Allocate a slice of `len` objects produced by `f` managed by a
    /// [`UniquePtr`].
    pub fn try_new_slice_from_fn<F: FnMut(usize) -> T>(len: usize, f: F) -> Result<Self, TryNewError> {
        Ok(Self::from_boxed_slice(box_slice_try_new_from_fn(len, f)?))
    }
}

/// Construct a [`UniquePtr`] managing a newly allocated `value`.
pub fn make_unique<T>(value: T) -> Result<UniquePtr<T>, TryNewError> {
    UniquePtr::try_new(value)
}

/// Construct a [`UniqueSlice`] managing a newly allocated slice of `len`
/// objects produced by `f`.
pub fn make_unique_slice<T, F: FnMut(usize) -> T>(len: usize, f: F) -> Result<UniqueSlice<T>, TryNewError> {
    UniqueSlice::try_new_slice_from_fn(len, f)
}

impl<T: ?Sized, D: Deleter<T>> Drop for UniquePtr<T, D> {
    fn drop(&mut self) {
        // SAFETY: the object, if any, is owned by self and gets released only
        // here.
        unsafe { D::default().delete(self.object.take()) };
    }
}

impl<T: ?Sized, D: Deleter<T>> Default for UniquePtr<T, D> {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl<T: ?Sized, D: Deleter<T>> ops::Deref for UniquePtr<T, D> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(object) => object,
            None => panic!("{}", EMPTY_DEREF_ERROR),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> ops::DerefMut for UniquePtr<T, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.get_mut() {
            Some(object) => object,
            None => panic!("{}", EMPTY_DEREF_ERROR),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> fmt::Pointer for UniquePtr<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object {
            Some(object) => fmt::Pointer::fmt(&object, f),
            None => fmt::Pointer::fmt(&ptr::null::<u8>(), f),
        }
    }
}

impl<T: ?Sized + fmt::Debug, D: Deleter<T>> fmt::Debug for UniquePtr<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UniquePtr").field(&self.get()).finish()
    }
}

#[cfg(test)]
use crate::test::{CountingDelete, DropCounter};
#[cfg(test)]
use alloc::format;

#[test]
fn test_unique_move() {
    let raw = Box::into_raw(Box::new(7u32));
    let mut u = unsafe { UniquePtr::<u32, CountingDelete>::from_raw(raw) };
    let v = u.take();
    assert!(u.get().is_none());
    assert_eq!(v.get(), Some(&7));

    drop(v);
    assert_eq!(CountingDelete::invocations(), 1);
    assert_eq!(CountingDelete::null_invocations(), 0);
    drop(u);
    assert_eq!(CountingDelete::invocations(), 1);
    assert_eq!(CountingDelete::null_invocations(), 1);
}

#[test]
fn test_unique_move_assign() {
    let counter = DropCounter::new();
    let mut a = UniquePtr::try_new(counter.track(1u8)).unwrap();
    let mut b = make_unique(counter.track(2u8)).unwrap();
    assert_eq!(**a, 1);
    a = b.take();
    assert_eq!(counter.drops(), 1);
    assert!(b.is_empty());
    assert_eq!(**a, 2);

    // Assigning an empty UniquePtr releases the previous object as well.
    a = UniquePtr::new_empty();
    assert_eq!(counter.drops(), 2);
    assert!(a.is_empty());
}

#[test]
fn test_unique_reset() {
    let counter = DropCounter::new();
    let mut a = UniquePtr::from_box(Box::new(counter.track(1u8)));
    a.reset();
    assert!(a.is_empty());
    assert_eq!(counter.drops(), 1);
    a.reset();
    assert_eq!(counter.drops(), 1);
}

#[test]
fn test_unique_into_raw() {
    let counter = DropCounter::new();
    let a = UniquePtr::try_new(counter.track(9u16)).unwrap();
    let raw = a.into_raw().unwrap();
    assert_eq!(counter.drops(), 0);
    let b = unsafe { UniquePtr::<_>::from_raw(raw.as_ptr()) };
    let object = b.into_box().unwrap();
    assert_eq!(**object, 9);
    drop(object);
    assert_eq!(counter.drops(), 1);

    assert!(UniquePtr::<u8>::new_empty().into_box().is_none());

    let raw = Box::into_raw(Box::new(1u8));
    let c = unsafe { UniquePtr::<u8, CountingDelete>::from_raw(raw) };
    let raw = c.into_raw().unwrap();
    assert_eq!(CountingDelete::invocations(), 0);
    assert_eq!(CountingDelete::null_invocations(), 0);
    drop(unsafe { Box::from_raw(raw.as_ptr()) });
}

#[test]
fn test_unique_get_mut() {
    let mut a = make_unique(5i64).unwrap();
    *a += 1;
    if let Some(value) = a.get_mut() {
        *value *= 2;
    }
    assert_eq!(*a, 12);
    assert!(UniquePtr::<i64>::default().get_mut().is_none());
}

#[test]
fn test_unique_slice() {
    let counter = DropCounter::new();
    let mut s = make_unique_slice(3, |i| counter.track(i)).unwrap();
    assert_eq!(s.len(), 3);
    assert_eq!(*s[2], 2);
    *s[0] = 10;
    assert_eq!(*s[0], 10);
    drop(s);
    assert_eq!(counter.drops(), 3);

    let e = UniqueSlice::<u8>::from_boxed_slice(Box::new([]));
    assert!(!e.is_empty());
    assert_eq!(e.len(), 0);
}

#[test]
#[should_panic(expected = "dereferenced an empty UniquePtr")]
fn test_unique_deref_empty() {
    let mut p = UniquePtr::<u32>::new_empty();
    *p = 1;
}

#[test]
fn test_unique_fmt() {
    let a = make_unique(3i32).unwrap();
    assert_eq!(format!("{:p}", a), format!("{:p}", a.as_ptr().unwrap()));
    assert_eq!(format!("{:?}", a), "UniquePtr(Some(3))");
    let e = UniquePtr::<i32>::new_empty();
    assert_eq!(format!("{:?}", e), "UniquePtr(None)");
}

#[test]
fn test_unique_const_empty() {
    let e = const { UniquePtr::<u32>::new_empty() };
    assert!(e.is_empty());
    assert!(e.as_ptr().is_none());
    let _: DefaultDelete = e.get_deleter();

    let s = const { UniqueSlice::<u8>::new_empty() };
    assert!(s.is_empty());
    let _: ArrayDelete = s.get_deleter();
}
