//! # Boot Memory Classifier
//!
//! Seeds a fresh [`BitmapFrameAllocator`] from the firmware memory map. Runs
//! exactly once, before interrupts are enabled and before anything asks for
//! a frame.
//!
//! 1. The managed range spans the lowest descriptor start to the highest
//!    descriptor end, clipped to the bitmap capacity.
//! 2. Every descriptor whose type is not in [`USABLE_MEMORY_TYPES`] is marked
//!    allocated over its whole frame span.
//! 3. Holes inside the managed range that no descriptor covers are marked
//!    allocated.
//! 4. Caller-supplied ranges (the kernel image, which holds the bitmap
//!    itself) are marked allocated.
//!
//! Overlapping descriptors are not reconciled. A frame claimed by any
//! non-usable descriptor stays reserved.

use crate::memory_map::{MemoryMapError, MemoryMapView};
use kernel_alloc::frame_alloc::BitmapFrameAllocator;
use kernel_memory_addresses::{FRAME_SIZE, FrameId, FrameRange, PhysicalAddress};
use log::{debug, info, warn};
use uefi::mem::memory_map::{MemoryDescriptor, MemoryType};

/// Memory the kernel may use once boot services are gone.
///
/// Everything else (loader data, runtime services, ACPI, MMIO, reserved and
/// unknown types) is kept away from the allocator.
pub const USABLE_MEMORY_TYPES: [MemoryType; 3] = [
    MemoryType::BOOT_SERVICES_CODE,
    MemoryType::BOOT_SERVICES_DATA,
    MemoryType::CONVENTIONAL,
];

#[must_use]
pub fn is_usable(ty: MemoryType) -> bool {
    USABLE_MEMORY_TYPES.contains(&ty)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("memory map contains no descriptors")]
    EmptyMap,
    #[error(
        "descriptor {index} at {phys_start:#x} with {page_count} pages overflows the address space"
    )]
    DescriptorOverflow {
        index: usize,
        phys_start: u64,
        page_count: u64,
    },
    #[error(transparent)]
    MemoryMap(#[from] MemoryMapError),
}

/// What the classifier left behind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootMemoryLayout {
    /// The allocator's active range.
    pub managed: FrameRange,
    /// Number of descriptors in the map.
    pub descriptors: usize,
    /// Frames inside `managed` that firmware reported as usable.
    pub usable_frames: usize,
    /// Frames inside `managed` still free after all reservations.
    pub free_frames: usize,
}

impl BootMemoryLayout {
    #[inline]
    #[must_use]
    pub const fn reserved_frames(&self) -> usize {
        self.managed.len() - self.free_frames
    }

    #[inline]
    #[must_use]
    pub const fn free_bytes(&self) -> u64 {
        self.free_frames as u64 * FRAME_SIZE
    }
}

/// Frames touched by a descriptor, or `None` if its end overflows.
fn frame_span(desc: &MemoryDescriptor) -> Option<FrameRange> {
    let len = desc.page_count.checked_mul(FRAME_SIZE)?;
    desc.phys_start.checked_add(len)?;
    Some(FrameRange::covering(PhysicalAddress::new(desc.phys_start), len))
}

/// Spans of all descriptors, in map order.
fn spans<'a>(map: &MemoryMapView<'a>) -> impl Iterator<Item = FrameRange> + 'a {
    map.iter().filter_map(|desc| frame_span(&desc))
}

/// Initialize `alloc` from the firmware memory `map`.
///
/// `extra_reserved` lists additional ranges that must never be handed out;
/// parts beyond the bitmap capacity are ignored.
///
/// # Errors
/// - [`ClassifyError::EmptyMap`] if the map has no descriptors.
/// - [`ClassifyError::DescriptorOverflow`] if a descriptor ends past the
///   64-bit address space.
///
/// The allocator is untouched on error.
pub fn classify<const WORDS: usize>(
    alloc: &mut BitmapFrameAllocator<WORDS>,
    map: &MemoryMapView<'_>,
    extra_reserved: &[FrameRange],
) -> Result<BootMemoryLayout, ClassifyError> {
    if map.is_empty() {
        return Err(ClassifyError::EmptyMap);
    }

    let mut lowest = FrameId::NULL;
    let mut highest = FrameId::new(0);
    for (index, desc) in map.iter().enumerate() {
        let frames = frame_span(&desc).ok_or(ClassifyError::DescriptorOverflow {
            index,
            phys_start: desc.phys_start,
            page_count: desc.page_count,
        })?;
        lowest = lowest.min(frames.start());
        highest = highest.max(frames.end());
    }

    let capacity = FrameRange::from_start_len(
        FrameId::new(0),
        BitmapFrameAllocator::<WORDS>::CAPACITY,
    );
    if highest > capacity.end() {
        warn!(
            "Physical memory extends to {}, only the first {} MiB are managed",
            highest.start_address(),
            capacity.size_in_bytes() / 1024 / 1024
        );
    }
    let managed = FrameRange::new(lowest.min(capacity.end()), highest.min(capacity.end()));
    alloc.set_memory_range(managed.start(), managed.end());

    let mut usable_frames = 0;
    for (index, desc) in map.iter().enumerate() {
        let Some(frames) = frame_span(&desc) else {
            continue;
        };
        let usable = is_usable(desc.ty);
        debug!(
            "{index:>3}: {:?} {:#012x}..{:#012x} {:>8} pages attr {:#x}{}",
            desc.ty,
            frames.start().start_address().as_u64(),
            frames.end().start_address().as_u64(),
            desc.page_count,
            desc.att.bits(),
            if usable { "" } else { " (reserved)" }
        );

        let clipped = frames.clamp_to(&capacity);
        if clipped.len() != frames.len() {
            warn!("Descriptor {index} ({frames}) exceeds the frame bitmap; clipped to {clipped:?}");
        }
        if usable {
            usable_frames += clipped.clamp_to(&managed).len();
        } else if !clipped.is_empty() {
            alloc.mark_allocated(clipped.start(), clipped.len());
        }
    }

    reserve_holes(alloc, map, managed);

    for range in extra_reserved {
        let clipped = range.clamp_to(&capacity);
        if clipped.is_empty() {
            continue;
        }
        debug!("Reserving {clipped}");
        alloc.mark_allocated(clipped.start(), clipped.len());
    }

    let layout = BootMemoryLayout {
        managed,
        descriptors: map.len(),
        usable_frames,
        free_frames: alloc.free_frame_count(),
    };
    info!(
        "Physical memory: frames {} ({} MiB), {} usable, {} reserved, {} free ({} MiB)",
        layout.managed,
        layout.managed.size_in_bytes() / 1024 / 1024,
        layout.usable_frames,
        layout.reserved_frames(),
        layout.free_frames,
        layout.free_bytes() / 1024 / 1024
    );
    Ok(layout)
}

/// Mark every part of `managed` that no descriptor describes.
///
/// A hole starts at a descriptor end that no other descriptor covers and runs
/// to the next descriptor start above it. Firmware does not promise a sorted
/// map, so each end is checked against every descriptor.
fn reserve_holes<const WORDS: usize>(
    alloc: &mut BitmapFrameAllocator<WORDS>,
    map: &MemoryMapView<'_>,
    managed: FrameRange,
) {
    for hole_start in spans(map).map(|s| s.end()) {
        if hole_start >= managed.end() || spans(map).any(|s| s.contains(hole_start)) {
            continue;
        }
        let Some(hole_end) = spans(map)
            .map(|s| s.start())
            .filter(|&start| start > hole_start)
            .min()
        else {
            continue;
        };

        let hole = FrameRange::new(hole_start, hole_end).clamp_to(&managed);
        if hole.is_empty() {
            continue;
        }
        debug!("Reserving hole {hole} not described by the memory map");
        alloc.mark_allocated(hole.start(), hole.len());
    }
}
