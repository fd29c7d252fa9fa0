//! # Kernel Configuration and Boot Interface
//!
//! This crate defines the boot hand-off structures and the physical memory
//! constants shared by the loader, the kernel and the memory management
//! crates. It is the single source of truth for how much physical memory the
//! kernel can manage and how the firmware memory map reaches the kernel.
//!
//! ## Boot Information ([`boot`])
//! * **Kernel Entry Point**: function signature and calling convention
//! * **Memory Map**: raw UEFI memory map buffer plus its descriptor stride
//! * **Kernel Image**: physical extent of the loaded kernel, which must never
//!   be handed out as free memory
//!
//! ## Memory Layout ([`memory`])
//! * **Frame Size**: 4 KiB, identical to the UEFI page size
//! * **Physical Ceiling**: the largest amount of physical memory the frame
//!   allocator's static bitmap covers
//! * **Boot stack**: size of the stack the kernel switches to on entry
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//!             │  (BIOS, VGA, DMA buffers)       │
//!             ├─────────────────────────────────┤ (loader's choice)
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS + bitmap)    │
//!             ├─────────────────────────────────┤
//!             │    Available RAM                │
//!             │  (Managed by frame allocator)   │
//!             └─────────────────────────────────┘
//! ```
//!
//! ## ABI Compatibility
//! All hand-off structures are `#[repr(C)]` and use fixed-size integers only.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
