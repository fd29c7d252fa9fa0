//! # Kernel Physical Frame Allocation
//!
//! Tracks which 4 KiB frames of physical RAM are in use with one bit per
//! frame. The crate never touches the memory it manages; it only hands out
//! and takes back frame indices, so it runs unchanged on the host for tests.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  kernel-mmap: firmware map → reservations   │
//! └──────────────────────┬──────────────────────┘
//!                        │ set_memory_range / mark_allocated
//! ┌──────────────────────▼──────────────────────┐
//! │  LockedFrameAllocator (static, spin lock)   │
//! │    └─ BitmapFrameAllocator<WORDS>           │
//! └──────────────────────┬──────────────────────┘
//!                        │ allocate / free / alloc_4k
//!                  frame consumers
//! ```
//!
//! ## Components
//! - [`frame_alloc`]: the bitmap allocator, its error type and free policy.
//! - [`locked`]: the shareable, const-constructible wrapper used for the
//!   kernel's single instance.
//! - [`PhysFrameAlloc`]: single-frame interface for consumers that only
//!   need one page at a time, such as page table builders.
//!
//! ## Memory overhead
//! One bit per frame up to [`MAX_PHYSICAL_MEMORY_BYTES`](kernel_info::memory::MAX_PHYSICAL_MEMORY_BYTES),
//! i.e. 4 MiB of bitmap for 128 GiB of RAM.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod frame_alloc;
pub mod locked;

use crate::frame_alloc::{BitmapFrameAllocator, FrameAllocError};
use kernel_memory_addresses::{FrameId, PhysicalAddress};

pub use crate::frame_alloc::{FreePolicy, PhysicalMemoryManager};
pub use crate::locked::LockedFrameAllocator;

/// Allocator of single 4 KiB physical frames.
///
/// Returned addresses are always frame aligned.
pub trait PhysFrameAlloc {
    /// Allocate one frame. Returns `None` when memory is exhausted.
    fn alloc_4k(&mut self) -> Option<PhysicalAddress>;

    /// Return the frame containing `pa`.
    ///
    /// # Errors
    /// Whatever the underlying allocator reports for a one-frame free.
    fn free_4k(&mut self, pa: PhysicalAddress) -> Result<(), FrameAllocError>;
}

impl<const WORDS: usize> PhysFrameAlloc for BitmapFrameAllocator<WORDS> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.allocate(1).ok().map(FrameId::start_address)
    }

    fn free_4k(&mut self, pa: PhysicalAddress) -> Result<(), FrameAllocError> {
        self.free(pa.frame(), 1)
    }
}
