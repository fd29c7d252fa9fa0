//! # UEFI Memory Map View
//!
//! Read-only access to the raw memory map copied by the loader after
//! `ExitBootServices`. Firmware reports a descriptor stride that may be larger
//! than [`MemoryDescriptor`] (48 vs. 40 bytes on OVMF), so records are read at
//! multiples of the stride and never by indexing a `[MemoryDescriptor]` slice.

use core::mem::size_of;
use core::ptr;
use kernel_info::boot::MemoryMapInfo;
use uefi::mem::memory_map::MemoryDescriptor;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryMapError {
    #[error("memory map buffer pointer is null")]
    NullBuffer,
    #[error("descriptor stride of {desc_size} bytes is smaller than a descriptor ({min} bytes)")]
    StrideTooSmall { desc_size: usize, min: usize },
    #[error("unsupported memory descriptor version {version}")]
    UnsupportedVersion { version: u32 },
    #[error("memory map does not fit the address space")]
    BufferTooLarge,
}

/// Descriptors of a firmware memory map, borrowed from its byte buffer.
#[derive(Copy, Clone)]
pub struct MemoryMapView<'a> {
    buffer: &'a [u8],
    desc_size: usize,
}

impl<'a> MemoryMapView<'a> {
    /// Wrap `buffer`, reading one record every `desc_size` bytes.
    ///
    /// A trailing partial record is ignored.
    ///
    /// # Errors
    /// [`MemoryMapError::StrideTooSmall`] if `desc_size` cannot hold a descriptor.
    pub const fn new(buffer: &'a [u8], desc_size: usize) -> Result<Self, MemoryMapError> {
        let min = size_of::<MemoryDescriptor>();
        if desc_size < min {
            return Err(MemoryMapError::StrideTooSmall { desc_size, min });
        }
        Ok(Self { buffer, desc_size })
    }

    /// View the map the loader handed over in [`MemoryMapInfo`].
    ///
    /// # Errors
    /// Rejects a null pointer, an unknown descriptor version, a too-small
    /// stride and sizes that do not fit `usize`.
    ///
    /// # Safety
    /// `info.mmap_ptr` must point to `info.mmap_len` readable bytes that stay
    /// valid and unmodified for `'a`.
    pub unsafe fn from_boot_info(info: &MemoryMapInfo) -> Result<Self, MemoryMapError> {
        if info.mmap_ptr == 0 {
            return Err(MemoryMapError::NullBuffer);
        }
        if info.mmap_desc_version != MemoryDescriptor::VERSION {
            return Err(MemoryMapError::UnsupportedVersion {
                version: info.mmap_desc_version,
            });
        }

        let addr = usize::try_from(info.mmap_ptr).map_err(|_| MemoryMapError::BufferTooLarge)?;
        let len = usize::try_from(info.mmap_len).map_err(|_| MemoryMapError::BufferTooLarge)?;
        let desc_size =
            usize::try_from(info.mmap_desc_size).map_err(|_| MemoryMapError::BufferTooLarge)?;

        // SAFETY: validity of the region is the caller's contract.
        let buffer =
            unsafe { core::slice::from_raw_parts(ptr::with_exposed_provenance::<u8>(addr), len) };
        Self::new(buffer, desc_size)
    }

    /// Number of complete records.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.buffer.len() / self.desc_size
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub const fn desc_size(&self) -> usize {
        self.desc_size
    }

    /// The record at `index`, copied out of the buffer.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<MemoryDescriptor> {
        if index >= self.len() {
            return None;
        }
        let record = &self.buffer[index * self.desc_size..][..size_of::<MemoryDescriptor>()];
        // SAFETY: `record` holds a full descriptor; every bit pattern is a
        // valid `MemoryDescriptor` and the read tolerates any alignment.
        Some(unsafe { ptr::read_unaligned(record.as_ptr().cast::<MemoryDescriptor>()) })
    }

    #[must_use]
    pub const fn iter(&self) -> MemoryMapIter<'a> {
        MemoryMapIter {
            view: *self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for MemoryMapView<'a> {
    type Item = MemoryDescriptor;
    type IntoIter = MemoryMapIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl core::fmt::Debug for MemoryMapView<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryMapView")
            .field("desc_size", &self.desc_size)
            .field("len", &self.len())
            .finish()
    }
}

/// Iterator over the records of a [`MemoryMapView`], in map order.
#[derive(Clone)]
pub struct MemoryMapIter<'a> {
    view: MemoryMapView<'a>,
    next: usize,
}

impl Iterator for MemoryMapIter<'_> {
    type Item = MemoryDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let desc = self.view.get(self.next)?;
        self.next += 1;
        Some(desc)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MemoryMapIter<'_> {}
