//! # Bootstrap Processor Entry

use crate::memory::init_physical_memory;
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::BOOT_STACK_SIZE;
use kernel_qemu::QemuLogger;
use log::{LevelFilter, error, info};

static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);

/// 16-byte aligned backing store for the boot stack.
#[repr(align(16))]
struct Aligned16<const N: usize>([u8; N]);

/// Stack the kernel runs on until something better exists.
///
/// Lives in `.bss.boot`, so it is part of the kernel image extent the loader
/// reports and is reserved with it.
#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned16<BOOT_STACK_SIZE> = Aligned16([0; BOOT_STACK_SIZE]);

/// The kernel entry point.
///
/// # ABI
/// `sysv64` (Rust's `extern "C"`): `boot_info` arrives in `RDI`.
///
/// # Naked function & Stack
/// Naked so the loader's stack is never touched: the body switches to
/// [`BOOT_STACK`] and tail-jumps into [`kernel_entry_on_boot_stack`].
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "C" fn _start_kernel(_boot_info: *const KernelBootInfo) {
    core::arch::naked_asm!(
        "cli",
        "mov r12, rdi",
        "lea rax, [rip + {stack_sym}]",
        "add rax, {stack_size}",
        "and rax, -16",
        "mov rsp, rax",
        // Fake return address so RSP % 16 == 8 at function entry.
        "push 0",
        "xor rbp, rbp",
        "mov rdi, r12",
        "jmp {rust_entry}",
        stack_sym = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        rust_entry = sym kernel_entry_on_boot_stack,
    );
}

/// First Rust code, running on [`BOOT_STACK`] with interrupts disabled.
#[unsafe(no_mangle)]
extern "C" fn kernel_entry_on_boot_stack(boot_info: *const KernelBootInfo) -> ! {
    // Only fails if a logger is already installed.
    let _ = LOGGER.init();
    info!("Kernel reporting to QEMU! Initializing physical memory ...");

    // SAFETY: the loader passes a valid, identity-mapped boot info block.
    let bi = unsafe { &*boot_info };
    // SAFETY: the loader keeps the memory map copy alive and unmodified.
    match unsafe { init_physical_memory(bi) } {
        Ok(pmm) => crate::kernel_main(pmm),
        Err(e) => {
            error!("Physical memory initialization failed: {e}");
            crate::halt()
        }
    }
}
