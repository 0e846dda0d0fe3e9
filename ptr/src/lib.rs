// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SUSE LLC
// Author: Nicolai Stange <nstange@suse.de>

//! Reference counted ownership handles for heap allocated objects.
//!
//! * [`SharedPtr`] -- an owning, clonable handle. The managed object lives
//!   for as long as at least one `SharedPtr` referencing it is around.
//! * [`WeakPtr`] -- a non-owning observer obtained from a [`SharedPtr`]. It
//!   can detect the managed object's expiration and may get
//!   [locked](WeakPtr::lock) into a [`SharedPtr`] as long as the object is
//!   still alive.
//! * [`UniquePtr`] -- sole ownership without any reference counting.
//!
//! Shared and weak handles coordinate through a common control block
//! allocated alongside the managed object. The object gets released through
//! the handle's [`Deleter`] as soon as the last [`SharedPtr`] is gone, the
//! control block itself only once the last [`WeakPtr`] is gone as well.
//!
//! Reference counts are plain, non-atomic integers: none of the handles is
//! [`Send`] or [`Sync`].

#![no_std]

#[cfg(test)]
extern crate std;

use tinyrc_utils_common as utils_common;

macro_rules! rc_trace {
    ($($arg:tt)+) => {
        #[cfg(feature = "log")]
        {
            log::trace!($($arg)+);
        }
    };
}

macro_rules! rc_debug {
    ($($arg:tt)+) => {
        #[cfg(feature = "log")]
        {
            log::debug!($($arg)+);
        }
    };
}

mod control_block;
mod count;
pub mod deleter;
mod shared;
pub mod test;
mod unique;
mod weak;

pub use deleter::{ArrayDelete, DefaultDelete, Deleter, DeletionKind};
pub use shared::{SharedPtr, SharedSlice, make_shared, make_shared_slice};
pub use unique::{UniquePtr, UniqueSlice, make_unique, make_unique_slice};
pub use utils_common::alloc::TryNewError;
pub use weak::WeakPtr;
