//! # Physical Memory Bring-up
//!
//! The kernel's one frame allocator is a `static` in `.bss`, sized for
//! [`MAX_PHYSICAL_MEMORY_BYTES`](kernel_info::memory::MAX_PHYSICAL_MEMORY_BYTES).
//! [`init_physical_memory`] claims it, seeds it from the boot memory map and
//! returns the only handle to it. Subsystems receive that handle; nothing
//! looks the allocator up by name.

use kernel_alloc::LockedFrameAllocator;
use kernel_alloc::frame_alloc::PHYSICAL_BITMAP_WORDS;
use kernel_info::boot::KernelBootInfo;
use kernel_memory_addresses::{FrameRange, PhysicalAddress};
use kernel_mmap::{BootMemoryLayout, ClassifyError, MemoryMapView, classify};
use log::info;

pub type KernelFrameAllocator = LockedFrameAllocator<PHYSICAL_BITMAP_WORDS>;

static PHYSICAL_MEMORY: KernelFrameAllocator = KernelFrameAllocator::new();

#[derive(Debug, thiserror::Error)]
pub enum MemoryInitError {
    #[error("physical memory was already initialized")]
    AlreadyInitialized,
    #[error("failed to classify the boot memory map: {0}")]
    Classify(#[from] ClassifyError),
}

/// Seed the kernel frame allocator and return its handle.
///
/// # Errors
/// Fails on a malformed memory map and on any call after the first.
///
/// # Safety
/// `bi.mmap` must describe a readable memory map buffer.
pub unsafe fn init_physical_memory(
    bi: &KernelBootInfo,
) -> Result<&'static KernelFrameAllocator, MemoryInitError> {
    unsafe { init_physical_memory_in(&PHYSICAL_MEMORY, bi) }
        .map(|(pmm, _layout)| pmm)
}

/// [`init_physical_memory`] over an arbitrary allocator instance.
///
/// # Safety
/// See [`init_physical_memory`].
unsafe fn init_physical_memory_in<const WORDS: usize>(
    pmm: &'static LockedFrameAllocator<WORDS>,
    bi: &KernelBootInfo,
) -> Result<(&'static LockedFrameAllocator<WORDS>, BootMemoryLayout), MemoryInitError> {
    // SAFETY: forwarded from the caller.
    let map = unsafe { MemoryMapView::from_boot_info(&bi.mmap) }.map_err(ClassifyError::from)?;
    let pmm = pmm.claim().ok_or(MemoryInitError::AlreadyInitialized)?;
    info!(
        "Boot memory map: {} descriptors, {} bytes each",
        bi.mmap.descriptor_count(),
        bi.mmap.mmap_desc_size
    );

    // The image includes .bss, and with it the frame bitmap itself.
    let kernel_image = FrameRange::covering(
        PhysicalAddress::new(bi.kernel.phys_start),
        bi.kernel.phys_len,
    );
    let memory_map = FrameRange::covering(PhysicalAddress::new(bi.mmap.mmap_ptr), bi.mmap.mmap_len);
    info!("Kernel image occupies frames {kernel_image}");

    let layout = pmm.with_lock(|a| classify(a, &map, &[kernel_image, memory_map]))?;
    info!(
        "Supporting {} MiB of physical RAM",
        pmm.manageable_size() / 1024 / 1024
    );
    Ok((pmm, layout))
}
