//! # QEMU Debug Console Output
//!
//! Early kernel diagnostics over QEMU's debug port (`0x402`). Nothing here
//! allocates, so it works from the first instruction of the kernel, before the
//! frame allocator has been seeded.
//!
//! - [`QemuLogger`]: a [`log`] backend; the kernel installs it once and every
//!   crate logs through the `log` macros.
//! - [`qemu_trace!`]: raw `format!`-style output that bypasses `log`.
//!
//! Capture the output on the host with:
//! ```bash
//! qemu-system-x86_64 ... -debugcon file:debug.log
//! ```
//!
//! ## Features
//! - `enabled` (default): writes reach the port. Without it, every write is a
//!   no-op and the macros compile to nothing observable.
//!
//! Port I/O is only emitted on bare-metal x86-64. Host builds (tests) keep the
//! formatting path but drop the bytes.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// QEMU `-debugcon` I/O port.
    pub const QEMU_DEBUG_PORT: u16 = 0x402;

    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        #[cfg(all(target_arch = "x86_64", target_os = "none"))]
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
        #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
        let _ = c;
    }

    /// `fmt::Write` adapter over [`dbg_putc`].
    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            s.bytes().for_each(dbg_putc);
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best effort; there is nowhere to report a failed debug write.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub const fn qemu_write(_: fmt::Arguments) {}
}

/// Write `format!`-style output straight to the debug port.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
