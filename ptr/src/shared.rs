// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Implementation of [`SharedPtr`].

#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;
use alloc::boxed::Box;

use crate::control_block::ControlBlock;
use crate::deleter::{ArrayDelete, DefaultDelete, Deleter};
use crate::utils_common::alloc::{TryNewError, box_slice_try_new_from_fn, box_try_new, box_try_new_recoverable};
use crate::weak::WeakPtr;
use core::{
    fmt, marker, mem, ops,
    ptr::{self, NonNull},
};

/// The error in case an empty [`SharedPtr`] gets dereferenced.
const EMPTY_DEREF_ERROR: &str = "dereferenced an empty SharedPtr";

/// Reference counted shared ownership of a heap allocated object.
///
/// Cloning a `SharedPtr` takes another strong reference on the managed
/// object. The object gets released through the [`Deleter`] `D` once the last
/// `SharedPtr` referencing it is gone, independently of any outstanding
/// [`WeakPtr`]s.
///
/// A `SharedPtr` may be empty, i.e. not manage any object at all, c.f.
/// [`new_empty()`](Self::new_empty). Dereferencing an empty `SharedPtr`
/// panics, use [`get()`](Self::get) for checked access.
pub struct SharedPtr<T: ?Sized, D: Deleter<T> = DefaultDelete> {
    /// The managed object, cached from the control block.
    object: Option<NonNull<T>>,
    /// `None` if and only if `object` is `None`.
    block: Option<NonNull<ControlBlock<T, D>>>,
    _phantom: marker::PhantomData<ControlBlock<T, D>>,
}

/// [`SharedPtr`] managing a slice of objects.
pub type SharedSlice<T> = SharedPtr<[T], ArrayDelete>;

impl<T: ?Sized, D: Deleter<T>> SharedPtr<T, D> {
    /// Instantiate an empty [`SharedPtr`] not managing any object.
    pub const fn new_empty() -> Self {
        Self {
            object: None,
            block: None,
            _phantom: marker::PhantomData,
        }
    }

    /// Take over ownership of an object from a raw pointer.
    ///
    /// A null `ptr` yields an empty `SharedPtr` and no control block gets
    /// allocated. Otherwise a new control block gets allocated. If that fails,
    /// the object gets released before the error is returned.
    ///
    /// # Safety
    ///
    /// If non-null, `ptr` must refer to an object releasable through `D`,
    /// e.g. one obtained from [`Box::into_raw()`] for the [`DefaultDelete`],
    /// which is not owned by anything else.
    pub unsafe fn try_from_raw(ptr: *mut T) -> Result<Self, TryNewError> {
        match NonNull::new(ptr) {
            // SAFETY: the caller's contract is the same as try_adopt()'s.
            Some(object) => unsafe { Self::try_adopt(object) },
            None => Ok(Self::new_empty()),
        }
    }

    /// # Safety
    ///
    /// `object` must be releasable through `D` and not be owned by anything
    /// else.
    unsafe fn try_adopt(object: NonNull<T>) -> Result<Self, TryNewError> {
        match ControlBlock::<T, D>::try_new(object) {
            Ok(block) => Ok(Self {
                object: Some(object),
                block: Some(block),
                _phantom: marker::PhantomData,
            }),
            Err(e) => {
                rc_debug!("control block allocation failed, releasing {:?} object", D::KIND);
                // SAFETY: the object is owned by nobody else and hence still alive.
                unsafe { D::default().delete(Some(object)) };
                Err(e)
            }
        }
    }

    /// Instantiate from a control block on which a strong reference has just
    /// been taken.
    ///
    /// # Safety
    ///
    /// `block` must point to a live control block and the caller must hand
    /// over ownership of one strong reference on it.
    pub(crate) unsafe fn from_locked_block(block: NonNull<ControlBlock<T, D>>) -> Self {
        // SAFETY: the strong reference handed over keeps the block alive.
        let object = unsafe { block.as_ref() }.object();
        debug_assert!(object.is_some());
        Self {
            object,
            block: Some(block),
            _phantom: marker::PhantomData,
        }
    }

    #[inline]
    pub(crate) fn control_block(&self) -> Option<&ControlBlock<T, D>> {
        // SAFETY: the block is kept alive by self's strong reference.
        self.block.map(|block| unsafe { block.as_ref() })
    }

    #[inline]
    pub(crate) fn control_block_ptr(&self) -> Option<NonNull<ControlBlock<T, D>>> {
        self.block
    }

    /// Number of [`SharedPtr`]s referencing the managed object, zero if empty.
    pub fn use_count(&self) -> usize {
        self.control_block().map_or(0, |block| block.strong_count())
    }

    /// Number of [`WeakPtr`]s referencing the managed object, zero if empty.
    pub fn weak_count(&self) -> usize {
        self.control_block().map_or(0, |block| block.weak_count())
    }

    /// Whether `self` is the only [`SharedPtr`] referencing the managed object.
    pub fn unique(&self) -> bool {
        self.use_count() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    /// Access the managed object, `None` if empty.
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the object is alive as long as self holds a strong reference.
        self.object.map(|object| unsafe { object.as_ref() })
    }

    /// Raw pointer to the managed object, `None` if empty.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.object
    }

    /// The [`Deleter`] bound to the managed object, `None` if empty.
    pub fn get_deleter(&self) -> Option<&D> {
        self.control_block().map(|block| block.deleter())
    }

    /// Create a [`WeakPtr`] observing the managed object.
    pub fn downgrade(&self) -> WeakPtr<T, D> {
        WeakPtr::from(self)
    }

    /// Whether `self` and `other` share the same control block.
    ///
    /// Two empty [`SharedPtr`]s compare equal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.block == other.block
    }

    /// Move the managed object out, leaving `self` empty.
    ///
    /// No reference counts are changed.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::new_empty())
    }

    /// Drop the strong reference held by `self`, leaving it empty.
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Drop the strong reference held by `self` and take over ownership of
    /// another object from a raw pointer.
    ///
    /// Equivalent to dropping `self` and constructing it anew with
    /// [`try_from_raw()`](Self::try_from_raw). On error, `self` is left empty.
    ///
    /// # Safety
    ///
    /// Same as for [`try_from_raw()`](Self::try_from_raw).
    pub unsafe fn try_reset(&mut self, ptr: *mut T) -> Result<(), TryNewError> {
        self.reset();
        // SAFETY: the caller's contract is the same as try_from_raw()'s.
        *self = unsafe { Self::try_from_raw(ptr) }?;
        Ok(())
    }
}

impl<T> SharedPtr<T, DefaultDelete> {
    /// Move a value into a new heap allocation managed by a [`SharedPtr`].
    pub fn try_new(value: T) -> Result<Self, TryNewError> {
        Self::try_from_box(box_try_new(value)?)
    }

    /// Move a value into a new heap allocation managed by a [`SharedPtr`],
    /// returning the value back upon allocation failure.
    pub fn try_new_recoverable(value: T) -> Result<Self, (T, TryNewError)> {
        let object = NonNull::from(Box::leak(box_try_new_recoverable(value)?));
        match ControlBlock::<T, DefaultDelete>::try_new(object) {
            Ok(block) => Ok(Self {
                object: Some(object),
                block: Some(block),
                _phantom: marker::PhantomData,
            }),
            Err(e) => {
                // SAFETY: the object has just been leaked from its Box above.
                let object = unsafe { Box::from_raw(object.as_ptr()) };
                Err((*object, e))
            }
        }
    }

    /// Take over ownership of a boxed object.
    ///
    /// If the allocation of the control block fails, `object` gets dropped.
    pub fn try_from_box(object: Box<T>) -> Result<Self, TryNewError> {
        // SAFETY: a leaked Box is releasable through the DefaultDelete.
        unsafe { Self::try_adopt(NonNull::from(Box::leak(object))) }
    }

    /// Drop the strong reference held by `self` and take over ownership of a
    /// boxed object.
    ///
    /// Equivalent to dropping `self` and constructing it anew with
    /// [`try_from_box()`](Self::try_from_box). On error, `self` is left empty.
    pub fn try_reset_box(&mut self, object: Box<T>) -> Result<(), TryNewError> {
        self.reset();
        *self = Self::try_from_box(object)?;
        Ok(())
    }
}

impl<T> SharedPtr<[T], ArrayDelete> {
    /// Take over ownership of a boxed slice.
    ///
    /// If the allocation of the control block fails, `objects` get dropped.
    pub fn try_from_boxed_slice(objects: Box<[T]>) -> Result<Self, TryNewError> {
        // SAFETY: a leaked boxed slice is releasable through the ArrayDelete.
        unsafe { Self::try_adopt(NonNull::from(Box::leak(objects))) }
    }

    /// Allocate a slice of `len` objects produced by `f` managed by a
    /// [`SharedPtr`].
    pub fn try_new_slice_from_fn<F: FnMut(usize) -> T>(len: usize, f: F) -> Result<Self, TryNewError> {
        Self::try_from_boxed_slice(box_slice_try_new_from_fn(len, f)?)
    }
}

/// Construct a [`SharedPtr`] managing a newly allocated `value`.
pub fn make_shared<T>(value: T) -> Result<SharedPtr<T>, TryNewError> {
    SharedPtr::try_new(value)
}

/// Construct a [`SharedSlice`] managing a newly allocated slice of `len`
/// objects produced by `f`.
pub fn make_shared_slice<T, F: FnMut(usize) -> T>(len: usize, f: F) -> Result<SharedSlice<T>, TryNewError> {
    SharedSlice::try_new_slice_from_fn(len, f)
}

impl<T: ?Sized, D: Deleter<T>> Clone for SharedPtr<T, D> {
    fn clone(&self) -> Self {
        if let Some(block) = self.control_block() {
            block.increment_strong();
        }
        Self {
            object: self.object,
            block: self.block,
            _phantom: marker::PhantomData,
        }
    }

    /// Assign from another [`SharedPtr`].
    ///
    /// The strong reference on `source` gets taken before the one previously
    /// held by `self` is dropped, so that assigning between [`SharedPtr`]s
    /// sharing a control block never releases the object.
    fn clone_from(&mut self, source: &Self) {
        let acquired = source.clone();
        self.reset();
        *self = acquired;
    }
}

impl<T: ?Sized, D: Deleter<T>> Drop for SharedPtr<T, D> {
    fn drop(&mut self) {
        self.object = None;
        if let Some(block) = self.block.take() {
            // SAFETY: self owned one strong reference on the block.
            unsafe { ControlBlock::drop_strong(block) };
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> Default for SharedPtr<T, D> {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl<T: ?Sized, D: Deleter<T>> ops::Deref for SharedPtr<T, D> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(object) => object,
            None => panic!("{}", EMPTY_DEREF_ERROR),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> fmt::Pointer for SharedPtr<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object {
            Some(object) => fmt::Pointer::fmt(&object, f),
            None => fmt::Pointer::fmt(&ptr::null::<u8>(), f),
        }
    }
}

impl<T: ?Sized + fmt::Debug, D: Deleter<T>> fmt::Debug for SharedPtr<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPtr")
            .field("object", &self.get())
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
use crate::{
    control_block::{fail_next_control_block_allocation, live_control_blocks},
    test::{CountingDelete, DropCounter, Tracked},
};
#[cfg(test)]
use alloc::{format, rc::Rc, vec::Vec};
#[cfg(test)]
use core::cell;

#[test]
fn test_shared_empty() {
    let p = SharedPtr::<u32>::new_empty();
    assert!(p.is_empty());
    assert_eq!(p.use_count(), 0);
    assert_eq!(p.weak_count(), 0);
    assert!(!p.unique());
    assert!(p.get().is_none());
    assert!(p.get_deleter().is_none());
    assert!(p.ptr_eq(&SharedPtr::default()));

    let p = unsafe { SharedPtr::<u32>::try_from_raw(ptr::null_mut()) }.unwrap();
    assert!(p.is_empty());
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_shared_weak_scenario() {
    let counter = DropCounter::new();
    let a = SharedPtr::try_new(counter.track(42u32)).unwrap();
    assert_eq!(a.use_count(), 1);
    assert!(a.unique());
    assert_eq!(**a, 42);

    let b = a.clone();
    assert_eq!(a.use_count(), 2);
    assert_eq!(b.use_count(), 2);
    assert!(a.ptr_eq(&b));

    let w = WeakPtr::from(&a);
    assert_eq!(w.use_count(), 2);
    assert_eq!(a.weak_count(), 1);

    drop(a);
    assert_eq!(counter.drops(), 0);
    drop(b);
    assert_eq!(counter.drops(), 1);
    assert!(w.lock().is_empty());
    assert_eq!(live_control_blocks(), 1);
    drop(w);
    assert_eq!(live_control_blocks(), 0);
    assert_eq!(counter.drops(), 1);
}

#[test]
fn test_shared_use_count_of_copies() {
    let counter = DropCounter::new();
    let a = make_shared(counter.track(())).unwrap();
    let copies: Vec<_> = (0..9).map(|_| a.clone()).collect();
    assert_eq!(a.use_count(), 10);
    for c in copies.iter() {
        assert_eq!(c.use_count(), 10);
    }
    drop(copies);
    assert_eq!(a.use_count(), 1);
    assert_eq!(counter.drops(), 0);
}

#[test]
fn test_shared_clone_from_same_block() {
    let counter = DropCounter::new();
    let a = SharedPtr::try_new(counter.track(1u8)).unwrap();
    let mut b = a.clone();
    b.clone_from(&a);
    assert_eq!(a.use_count(), 2);
    assert_eq!(**b, 1);

    // b is the last strong reference after a is gone.
    let mut c = b.clone();
    drop(a);
    c.clone_from(&b);
    assert_eq!(c.use_count(), 2);
    assert_eq!(counter.drops(), 0);
}

#[test]
fn test_shared_clone_from_other() {
    let counter_x = DropCounter::new();
    let counter_y = DropCounter::new();
    let x = SharedPtr::try_new(counter_x.track(1u8)).unwrap();
    let mut y = SharedPtr::try_new(counter_y.track(2u8)).unwrap();
    let wy = y.downgrade();
    y.clone_from(&x);
    assert_eq!(counter_y.drops(), 1);
    assert!(wy.expired());
    assert_eq!(x.use_count(), 2);
    assert_eq!(**y, 1);

    let mut e: SharedPtr<Tracked<u8>> = SharedPtr::new_empty();
    e.clone_from(&x);
    assert_eq!(x.use_count(), 3);
    y.clone_from(&SharedPtr::new_empty());
    assert!(y.is_empty());
    assert_eq!(x.use_count(), 2);
    assert_eq!(counter_x.drops(), 0);
}

#[test]
fn test_shared_move() {
    let counter = DropCounter::new();
    let mut a = SharedPtr::try_new(counter.track(5u16)).unwrap();
    let b = a.take();
    assert!(a.is_empty());
    assert!(a.get().is_none());
    assert_eq!(b.use_count(), 1);

    let other_counter = DropCounter::new();
    let mut c = SharedPtr::try_new(other_counter.track(6u16)).unwrap();
    assert_eq!(**c, 6);
    let mut b = b;
    // Move assignment releases the destination's previous object first.
    c = b.take();
    assert_eq!(other_counter.drops(), 1);
    assert!(b.is_empty());
    assert_eq!(c.use_count(), 1);
    assert_eq!(**c, 5);
    assert_eq!(counter.drops(), 0);
    drop(c);
    assert_eq!(counter.drops(), 1);
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_shared_reset() {
    let counter = DropCounter::new();
    let mut a = SharedPtr::try_new(counter.track(1u32)).unwrap();
    let w = a.downgrade();

    a.reset();
    assert_eq!(a.use_count(), 0);
    assert!(a.get().is_none());
    assert_eq!(counter.drops(), 1);
    assert!(w.expired());
    // The previous block lives on for the outstanding weak reference.
    assert_eq!(live_control_blocks(), 1);

    a.try_reset_box(Box::new(counter.track(2u32))).unwrap();
    assert_eq!(a.use_count(), 1);
    assert_eq!(a.weak_count(), 0);
    assert_eq!(**a, 2);
    assert!(w.lock().is_empty());
    assert_eq!(live_control_blocks(), 2);

    drop(w);
    assert_eq!(live_control_blocks(), 1);

    let b = a.clone();
    let raw = Box::into_raw(Box::new(counter.track(3u32)));
    unsafe { a.try_reset(raw) }.unwrap();
    assert_eq!(a.use_count(), 1);
    assert_eq!(b.use_count(), 1);
    assert!(!a.ptr_eq(&b));
    assert_eq!(counter.drops(), 1);

    unsafe { a.try_reset(ptr::null_mut()) }.unwrap();
    assert!(a.is_empty());
    assert_eq!(counter.drops(), 2);
    drop(b);
    assert_eq!(counter.drops(), 3);
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_shared_try_new_recoverable() {
    let counter = DropCounter::new();
    let a = match SharedPtr::try_new_recoverable(counter.track(11u64)) {
        Ok(a) => a,
        Err(_) => panic!("allocation failure"),
    };
    assert_eq!(**a, 11);
    drop(a);
    assert_eq!(counter.drops(), 1);
}

#[test]
fn test_shared_slice() {
    let counter = DropCounter::new();
    let s = make_shared_slice(4, |i| counter.track(i)).unwrap();
    assert_eq!(s.len(), 4);
    assert_eq!(*s[3], 3);
    let t = s.clone();
    assert_eq!(t.use_count(), 2);
    drop(s);
    assert_eq!(counter.drops(), 0);
    drop(t);
    assert_eq!(counter.drops(), 4);

    let e = SharedSlice::<u8>::try_from_boxed_slice(Box::new([])).unwrap();
    assert!(!e.is_empty());
    assert_eq!(e.len(), 0);
}

#[test]
fn test_shared_custom_deleter() {
    let raw = Box::into_raw(Box::new(17u32));
    let a = unsafe { SharedPtr::<u32, CountingDelete>::try_from_raw(raw) }.unwrap();
    assert!(a.get_deleter().is_some());
    let b = a.clone();
    drop(a);
    assert_eq!(CountingDelete::invocations(), 0);
    drop(b);
    assert_eq!(CountingDelete::invocations(), 1);
    assert_eq!(CountingDelete::null_invocations(), 0);

    // No control block, no deleter invocation for an empty SharedPtr.
    drop(SharedPtr::<u32, CountingDelete>::new_empty());
    assert_eq!(CountingDelete::invocations(), 1);
    assert_eq!(CountingDelete::null_invocations(), 0);
}

#[test]
#[should_panic(expected = "dereferenced an empty SharedPtr")]
fn test_shared_deref_empty() {
    let p = SharedPtr::<u32>::new_empty();
    let _value: u32 = *p;
}

#[test]
fn test_shared_fmt() {
    let a = SharedPtr::try_new(3i32).unwrap();
    assert_eq!(format!("{:p}", a), format!("{:p}", a.as_ptr().unwrap()));
    assert_eq!(format!("{:?}", a), "SharedPtr { object: Some(3), use_count: 1 }");
    let e = SharedPtr::<i32>::new_empty();
    assert_eq!(format!("{:p}", e), format!("{:p}", ptr::null::<u8>()));
}

#[cfg(test)]
struct SelfObserving {
    me: cell::RefCell<WeakPtr<SelfObserving>>,
    /// Whether locking `me` failed and the weak count seen, both from within
    /// the destructor.
    observed: Rc<cell::Cell<Option<(bool, usize)>>>,
}

#[cfg(test)]
impl Drop for SelfObserving {
    fn drop(&mut self) {
        let me = self.me.borrow();
        let locked = me.lock();
        self.observed.set(Some((locked.is_empty(), me.weak_count())));
        drop(me);
        // Drop the weak reference on the own control block from within the
        // destructor.
        *self.me.borrow_mut() = WeakPtr::new_empty();
    }
}

#[test]
fn test_shared_reentrant_weak_in_destructor() {
    let observed = Rc::new(cell::Cell::new(None));
    let a = SharedPtr::try_new(SelfObserving {
        me: cell::RefCell::new(WeakPtr::new_empty()),
        observed: observed.clone(),
    })
    .unwrap();
    a.me.borrow_mut().assign(&a);
    assert_eq!(a.weak_count(), 1);
    assert_eq!(live_control_blocks(), 1);

    drop(a);
    assert_eq!(observed.get(), Some((true, 1)));
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_shared_op_sequence() {
    let counter = DropCounter::new();
    let mut handles: Vec<SharedPtr<Tracked<u32>>> = Vec::new();
    handles.push(SharedPtr::try_new(counter.track(7)).unwrap());
    let mut weaks: Vec<WeakPtr<Tracked<u32>>> = Vec::new();
    weaks.push(handles[0].downgrade());
    weaks.push(SharedPtr::<Tracked<u32>>::new_empty().downgrade());

    let mut state = 0x2545_f491u32;
    for _ in 0..2000 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let i = (state >> 8) as usize % handles.len();
        match (state >> 16) % 7 {
            0 | 1 => {
                let c = handles[i].clone();
                handles.push(c);
            }
            2 => {
                if handles.len() > 1 {
                    handles.swap_remove(i);
                }
            }
            3 => {
                let taken = handles[i].take();
                handles.push(taken);
            }
            4 => {
                let j = (state >> 4) as usize % handles.len();
                let source = handles[i].clone();
                handles[j].clone_from(&source);
            }
            5 => weaks.push(handles[i].downgrade()),
            _ => {
                if !weaks.is_empty() {
                    let locked = weaks[i % weaks.len()].lock();
                    handles.push(locked);
                }
            }
        }

        let live = handles.iter().filter(|h| !h.is_empty()).count();
        if live > 0 {
            assert_eq!(counter.drops(), 0);
        } else {
            assert_eq!(counter.drops(), 1);
        }
        for h in handles.iter().filter(|h| !h.is_empty()) {
            assert_eq!(h.use_count(), live);
        }
        for w in weaks.iter() {
            if w.weak_count() == 0 {
                // Downgraded from an empty handle.
                assert_eq!(w.use_count(), 0);
            } else {
                assert_eq!(w.use_count(), live);
            }
        }
    }
    assert!(weaks.iter().any(|w| w.weak_count() == 0));
    assert!(weaks.iter().any(|w| w.weak_count() != 0));

    drop(handles);
    assert_eq!(counter.drops(), 1);
    for w in weaks.iter() {
        assert!(w.lock().is_empty());
    }
    drop(weaks);
    assert_eq!(live_control_blocks(), 0);
}

#[test]
fn test_shared_control_block_allocation_failure() {
    let counter = DropCounter::new();

    fail_next_control_block_allocation();
    let r = SharedPtr::try_from_box(Box::new(counter.track(1u8)));
    assert_eq!(r.err(), Some(TryNewError::MemoryAllocationFailure));
    assert_eq!(counter.drops(), 1);
    assert_eq!(live_control_blocks(), 0);

    fail_next_control_block_allocation();
    match SharedPtr::try_new_recoverable(counter.track(2u8)) {
        Ok(_) => panic!("control block allocation failure not reported"),
        Err((value, e)) => {
            assert_eq!(e, TryNewError::MemoryAllocationFailure);
            assert_eq!(*value, 2);
            assert_eq!(counter.drops(), 1);
        }
    }
    assert_eq!(counter.drops(), 2);

    let mut a = SharedPtr::try_new(counter.track(3u8)).unwrap();
    fail_next_control_block_allocation();
    let r = a.try_reset_box(Box::new(counter.track(4u8)));
    assert_eq!(r, Err(TryNewError::MemoryAllocationFailure));
    assert!(a.is_empty());
    assert_eq!(counter.drops(), 4);
    assert_eq!(live_control_blocks(), 0);

    let raw = Box::into_raw(Box::new(5u32));
    fail_next_control_block_allocation();
    let r = unsafe { SharedPtr::<u32, CountingDelete>::try_from_raw(raw) };
    assert!(r.is_err());
    assert_eq!(CountingDelete::invocations(), 1);
    assert_eq!(live_control_blocks(), 0);
}
