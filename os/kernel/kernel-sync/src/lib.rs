//! # Kernel synchronization primitives
//!
//! The pieces the early kernel needs to share state between cores before a
//! scheduler exists: a busy-waiting [`SpinLock`] and a one-shot
//! [`SyncOnceCell`]. Neither masks interrupts.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
