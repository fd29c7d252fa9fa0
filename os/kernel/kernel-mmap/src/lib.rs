//! # Kernel Memory Map
//!
//! Turns the UEFI memory map the loader hands over into a seeded physical
//! frame allocator.
//!
//! - [`memory_map`]: [`MemoryMapView`], a stride-aware reader over the raw
//!   descriptor buffer referenced by [`MemoryMapInfo`](kernel_info::boot::MemoryMapInfo).
//! - [`classify`](mod@classify): decides which frames are usable and reserves the rest.
//!
//! ## Example
//! ```rust,no_run
//! use kernel_alloc::PhysicalMemoryManager;
//! use kernel_info::boot::KernelBootInfo;
//! use kernel_mmap::{ClassifyError, MemoryMapView, classify};
//!
//! fn init(pmm: &mut PhysicalMemoryManager, boot_info: &KernelBootInfo) -> Result<(), ClassifyError> {
//!     let map = unsafe { MemoryMapView::from_boot_info(&boot_info.mmap)? };
//!     let layout = classify(pmm, &map, &[])?;
//!     assert!(layout.free_frames > 0);
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod classify;
pub mod memory_map;

pub use crate::classify::{
    BootMemoryLayout, ClassifyError, USABLE_MEMORY_TYPES, classify, is_usable,
};
pub use crate::memory_map::{MemoryMapError, MemoryMapIter, MemoryMapView};
