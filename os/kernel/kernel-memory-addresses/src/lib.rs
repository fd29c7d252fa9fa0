//! # Physical Memory Addresses and Frames
//!
//! Strongly typed wrappers for physical addresses and the page frames the
//! physical memory manager hands out.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address (RAM or MMIO). |
//! | [`FrameId`] | Index of one [`FRAME_SIZE`] physical frame. |
//! | [`FrameRange`] | Half-open run of frames `[start, end)`. |
//!
//! Frames are named purely by index. A frame's physical address is
//! `id * FRAME_SIZE`; converting back truncates to the containing frame.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let frame = FrameId::containing_address(PhysicalAddress::new(0x3042));
//! assert_eq!(frame.id(), 3);
//! assert_eq!(frame.start_address().as_u64(), 0x3000);
//!
//! let run = FrameRange::from_start_len(frame, 4);
//! assert_eq!(run.end(), FrameId::new(7));
//! assert!(run.contains(FrameId::new(6)));
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`; frame ordering is ascending address order.
//! - [`FrameId::NULL`] (the largest representable index) names "no frame".
//!   It never lies inside a [`FrameRange`] produced by the allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod frame;
mod physical_address;

pub use frame::{FRAME_SIZE, FrameId, FrameRange};
pub use physical_address::PhysicalAddress;
