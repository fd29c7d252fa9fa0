//! # Memory Layout

pub use kernel_memory_addresses::FRAME_SIZE;

/// Largest amount of physical memory the frame allocator can manage.
///
/// The allocator's bitmap is sized for this ceiling at compile time; memory
/// above it is never handed out.
pub const MAX_PHYSICAL_MEMORY_BYTES: u64 = 128 * 1024 * 1024 * 1024; // 128 GiB

/// Number of frames needed to cover [`MAX_PHYSICAL_MEMORY_BYTES`].
#[allow(clippy::cast_possible_truncation)]
pub const MAX_FRAME_COUNT: usize = (MAX_PHYSICAL_MEMORY_BYTES / FRAME_SIZE) as usize;

/// The size of the early boot stack handed over by the loader.
pub const BOOT_STACK_SIZE: usize = 64 * 1024;

const _: () = {
    assert!(FRAME_SIZE.is_power_of_two());
    assert!(MAX_PHYSICAL_MEMORY_BYTES.is_multiple_of(FRAME_SIZE));
    assert!(MAX_FRAME_COUNT.is_multiple_of(64));
    assert!(BOOT_STACK_SIZE.is_multiple_of(16));
};
