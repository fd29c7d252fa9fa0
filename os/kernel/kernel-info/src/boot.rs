//! # Kernel Boot Information

/// Kernel function pointer.
///
/// # ABI
/// The loader calls the kernel with the System V calling convention (Rust's
/// `extern "C"` on x86-64), passing the boot info pointer in `RDI`.
pub type KernelEntryFn = extern "C" fn(*const KernelBootInfo) -> !;

/// Information the kernel needs right after `ExitBootServices`.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Clone)]
pub struct KernelBootInfo {
    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// Where the loader placed the kernel image in physical memory.
    pub kernel: KernelImageInfo,
}

#[repr(C)]
#[derive(Clone)]
pub struct MemoryMapInfo {
    /// Pointer to the raw UEFI memory map buffer (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map buffer in **bytes**.
    pub mmap_len: u64,

    /// Size of a single memory descriptor in bytes (`EFI_MEMORY_DESCRIPTOR_VERSION` dependent).
    ///
    /// Firmware may report a stride larger than the descriptor structure;
    /// records must be read at multiples of this value.
    pub mmap_desc_size: u64,

    /// Descriptor version (from UEFI). Kernel can check it matches expectations.
    pub mmap_desc_version: u32,
}

impl MemoryMapInfo {
    /// Number of complete descriptor records in the buffer.
    #[must_use]
    pub const fn descriptor_count(&self) -> u64 {
        if self.mmap_desc_size == 0 {
            0
        } else {
            self.mmap_len / self.mmap_desc_size
        }
    }
}

/// Physical extent of the loaded kernel image (text, data and BSS).
///
/// The static frame bitmap lives in the kernel's BSS, so reserving this
/// range also reserves the allocator's own footprint.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct KernelImageInfo {
    /// Physical address of the first byte of the image.
    pub phys_start: u64,

    /// Length of the image in **bytes**, including BSS.
    pub phys_len: u64,
}
