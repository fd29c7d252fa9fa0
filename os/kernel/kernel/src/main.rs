//! # Kernel Entry Point
//!
//! The loader jumps to [`boot::_start_kernel`] after `ExitBootServices`. The
//! kernel then installs the QEMU logger, seeds the physical frame allocator
//! from the firmware memory map and hands the allocator to everything that
//! needs frames.
//!
//! Only the bare-metal target gets an entry point. Host builds compile the
//! memory bring-up so it can be tested with `cargo test -p kernel`.

#![cfg_attr(target_os = "none", no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(target_os = "none")]
mod boot;
#[cfg_attr(not(target_os = "none"), allow(dead_code))]
mod memory;

use kernel_alloc::PhysFrameAlloc;
use log::{info, warn};
use memory::KernelFrameAllocator;

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kernel_qemu::qemu_trace!("KERNEL PANIC: {info}\n");
    halt()
}

#[cfg(not(target_os = "none"))]
fn main() {}

/// Kernel main, entered once physical memory is managed.
#[cfg_attr(not(target_os = "none"), allow(dead_code))]
fn kernel_main(pmm: &'static KernelFrameAllocator) -> ! {
    let mut frames = pmm;
    match frames.alloc_4k() {
        Some(pa) => {
            info!("First free frame at {pa}");
            if let Err(e) = frames.free_4k(pa) {
                warn!("Returning frame {pa} failed: {e}");
            }
        }
        None => warn!("No physical frame available"),
    }

    info!(
        "{} of {} frames free",
        pmm.free_frame_count(),
        pmm.memory_range().len()
    );
    halt()
}

#[cfg_attr(not(target_os = "none"), allow(dead_code))]
fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
