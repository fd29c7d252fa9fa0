//! # Shared Frame Allocator
//!
//! [`LockedFrameAllocator`] puts a [`BitmapFrameAllocator`] behind a
//! [`SpinLock`] so a single `static` can serve every consumer in the kernel.
//! It is const-constructible, so the full-size bitmap lives in `.bss` rather
//! than on a stack or behind a heap that does not exist yet.
//!
//! The boot path [`claim`](LockedFrameAllocator::claim)s the instance once,
//! populates it from the firmware memory map and passes the returned
//! `&'static` handle to whoever needs frames. A second claim fails, so two init
//! paths cannot both reset the active range.
//!
//! The lock does **not** disable interrupts. Keep it out of interrupt handlers
//! until the kernel grows an IRQ-safe variant.

use crate::PhysFrameAlloc;
use crate::frame_alloc::{BitmapFrameAllocator, FrameAllocError, FreePolicy};
use core::fmt;
use kernel_memory_addresses::{FrameId, FrameRange, PhysicalAddress};
use kernel_sync::{SpinLock, SyncOnceCell};

pub struct LockedFrameAllocator<const WORDS: usize> {
    inner: SpinLock<BitmapFrameAllocator<WORDS>>,
    /// Filled by the first successful [`claim`](Self::claim).
    claimed: SyncOnceCell<()>,
}

impl<const WORDS: usize> Default for LockedFrameAllocator<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> LockedFrameAllocator<WORDS> {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_free_policy(FreePolicy::Unchecked)
    }

    #[must_use]
    pub const fn with_free_policy(free_policy: FreePolicy) -> Self {
        Self {
            inner: SpinLock::new(BitmapFrameAllocator::with_free_policy(free_policy)),
            claimed: SyncOnceCell::new(),
        }
    }

    /// Hand out the instance exactly once.
    ///
    /// Returns `None` if it was already claimed.
    pub fn claim(&'static self) -> Option<&'static Self> {
        self.claimed.set(()).ok().map(|()| self)
    }

    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.get().is_some()
    }

    /// Run `f` with exclusive access to the allocator.
    ///
    /// Spins until the lock is free. Do not call back into the same
    /// instance from `f`; that deadlocks.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut BitmapFrameAllocator<WORDS>) -> R) -> R {
        self.inner.with_lock(f)
    }

    /// See [`BitmapFrameAllocator::set_memory_range`].
    pub fn set_memory_range(&self, begin: FrameId, end: FrameId) {
        self.with_lock(|a| a.set_memory_range(begin, end));
    }

    /// See [`BitmapFrameAllocator::mark_allocated`].
    pub fn mark_allocated(&self, start: FrameId, num_frames: usize) {
        self.with_lock(|a| a.mark_allocated(start, num_frames));
    }

    /// See [`BitmapFrameAllocator::allocate`].
    ///
    /// # Errors
    /// Forwards the errors of the inner allocator.
    pub fn allocate(&self, num_frames: usize) -> Result<FrameId, FrameAllocError> {
        self.with_lock(|a| a.allocate(num_frames))
    }

    /// See [`BitmapFrameAllocator::free`].
    ///
    /// # Errors
    /// Forwards the errors of the inner allocator.
    pub fn free(&self, start: FrameId, num_frames: usize) -> Result<(), FrameAllocError> {
        self.with_lock(|a| a.free(start, num_frames))
    }

    #[must_use]
    pub fn is_allocated(&self, frame: FrameId) -> bool {
        self.with_lock(|a| a.is_allocated(frame))
    }

    #[must_use]
    pub fn free_frame_count(&self) -> usize {
        self.with_lock(|a| a.free_frame_count())
    }

    #[must_use]
    pub fn memory_range(&self) -> FrameRange {
        self.with_lock(|a| a.memory_range())
    }

    #[must_use]
    pub fn manageable_size(&self) -> u64 {
        self.with_lock(|a| a.manageable_size())
    }
}

impl<const WORDS: usize> PhysFrameAlloc for &LockedFrameAllocator<WORDS> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.with_lock(|a| a.alloc_4k())
    }

    fn free_4k(&mut self, pa: PhysicalAddress) -> Result<(), FrameAllocError> {
        self.with_lock(|a| a.free_4k(pa))
    }
}

impl<const WORDS: usize> fmt::Debug for LockedFrameAllocator<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedFrameAllocator")
            .field("claimed", &self.is_claimed())
            .field("inner", &self.inner)
            .finish()
    }
}
