use crate::PhysicalAddress;
use core::fmt;

/// Size of one physical frame in bytes.
///
/// UEFI reports memory in pages of the same size, so a descriptor's page
/// count is also its frame count.
pub const FRAME_SIZE: u64 = 4096;

/// Index of one physical page frame.
///
/// The frame covers `[id * FRAME_SIZE, (id + 1) * FRAME_SIZE)`. Equality and
/// ordering compare indices, which is ascending address order.
///
/// ### Invariants
/// - [`FrameId::NULL`] is never a valid frame; it marks "no frame" at ABI
///   boundaries that cannot carry a `Result`.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameId(usize);

impl FrameId {
    /// The "no frame" sentinel.
    pub const NULL: Self = Self(usize::MAX);

    #[inline]
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn id(self) -> usize {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == usize::MAX
    }

    /// Frame containing the physical address `pa`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn containing_address(pa: PhysicalAddress) -> Self {
        Self((pa.as_u64() / FRAME_SIZE) as usize)
    }

    /// Physical address of the first byte of this frame.
    ///
    /// Indices at or above 2^52 have no 64-bit address; for those the result
    /// wraps. Use [`checked_start_address`](Self::checked_start_address) where
    /// the index is not known to come from a physical address.
    #[inline]
    #[must_use]
    pub const fn start_address(self) -> PhysicalAddress {
        PhysicalAddress::new((self.0 as u64).wrapping_mul(FRAME_SIZE))
    }

    /// Physical address of the first byte of this frame, or `None` if it
    /// lies beyond the 64-bit address space.
    #[inline]
    #[must_use]
    pub const fn checked_start_address(self) -> Option<PhysicalAddress> {
        match (self.0 as u64).checked_mul(FRAME_SIZE) {
            Some(addr) => Some(PhysicalAddress::new(addr)),
            None => None,
        }
    }

    /// The frame `count` frames above this one.
    ///
    /// # Panics
    /// Panics on index overflow.
    #[inline]
    #[must_use]
    pub const fn offset(self, count: usize) -> Self {
        match self.0.checked_add(count) {
            Some(id) => Self(id),
            None => panic!("frame index overflow"),
        }
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("Frame(NULL)");
        }
        match self.checked_start_address() {
            Some(pa) => write!(f, "Frame(#{} @ 0x{:016X})", self.0, pa.as_u64()),
            None => write!(f, "Frame(#{})", self.0),
        }
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<PhysicalAddress> for FrameId {
    #[inline]
    fn from(pa: PhysicalAddress) -> Self {
        Self::containing_address(pa)
    }
}

/// Half-open run of frames `[start, end)`.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct FrameRange {
    start: FrameId,
    end: FrameId,
}

impl FrameRange {
    /// # Panics
    /// Panics if `start > end`.
    #[inline]
    #[must_use]
    pub const fn new(start: FrameId, end: FrameId) -> Self {
        assert!(start.0 <= end.0, "frame range start lies above its end");
        Self { start, end }
    }

    /// `count` frames starting at `start`.
    #[inline]
    #[must_use]
    pub const fn from_start_len(start: FrameId, count: usize) -> Self {
        Self::new(start, start.offset(count))
    }

    /// Every frame touched by the `len` bytes starting at `start`.
    ///
    /// The start is rounded down and the end rounded up to frame boundaries;
    /// a zero length yields an empty range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn covering(start: PhysicalAddress, len: u64) -> Self {
        let first = FrameId::containing_address(start);
        if len == 0 {
            return Self::new(first, first);
        }
        let end = start.as_u64().saturating_add(len);
        let end = end.div_ceil(FRAME_SIZE) as usize;
        Self::new(first, FrameId(end))
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> FrameId {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> FrameId {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start.0 == self.end.0
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, frame: FrameId) -> bool {
        self.start.0 <= frame.0 && frame.0 < self.end.0
    }

    /// Whether `other` lies entirely inside this range.
    #[inline]
    #[must_use]
    pub const fn contains_range(&self, other: &Self) -> bool {
        self.start.0 <= other.start.0 && other.end.0 <= self.end.0
    }

    /// The part of this range that also lies in `bounds`.
    ///
    /// Disjoint ranges produce an empty range.
    #[must_use]
    pub fn clamp_to(&self, bounds: &Self) -> Self {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        if start >= end {
            return Self::new(start, start);
        }
        Self::new(start, end)
    }

    /// Number of bytes covered.
    #[inline]
    #[must_use]
    pub const fn size_in_bytes(&self) -> u64 {
        (self.len() as u64).saturating_mul(FRAME_SIZE)
    }
}

impl fmt::Debug for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameRange({}..{})", self.start.0, self.end.0)
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)?;
        match (
            self.start.checked_start_address(),
            self.end.checked_start_address(),
        ) {
            (Some(start), Some(end)) => write!(f, " ({:#x}..{:#x})", start.as_u64(), end.as_u64()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_frame_is_the_largest_index() {
        assert!(FrameId::NULL.is_null());
        assert!(!FrameId::new(0).is_null());
        assert!(FrameId::new(usize::MAX - 1) < FrameId::NULL);
    }

    #[test]
    fn ordering_follows_index() {
        let mut frames = [FrameId::new(9), FrameId::new(1), FrameId::new(4)];
        frames.sort();
        assert_eq!(frames, [FrameId::new(1), FrameId::new(4), FrameId::new(9)]);
    }

    #[test]
    fn zero_length_covering_is_empty() {
        let range = FrameRange::covering(PhysicalAddress::new(0x5000), 0);
        assert!(range.is_empty());
        assert_eq!(range.start(), FrameId::new(5));
    }

    #[test]
    fn clamp_to_trims_both_ends() {
        let bounds = FrameRange::new(FrameId::new(10), FrameId::new(20));
        let wide = FrameRange::new(FrameId::new(5), FrameId::new(25));
        assert_eq!(wide.clamp_to(&bounds), bounds);

        let tail = FrameRange::new(FrameId::new(15), FrameId::new(30));
        assert_eq!(
            tail.clamp_to(&bounds),
            FrameRange::new(FrameId::new(15), FrameId::new(20))
        );

        let outside = FrameRange::new(FrameId::new(40), FrameId::new(50));
        assert!(outside.clamp_to(&bounds).is_empty());
    }

    #[test]
    fn frames_beyond_the_address_space_format_without_an_address() {
        let top = FrameId::new(usize::MAX - 1);
        assert!(top.checked_start_address().is_none());
        assert_eq!(format!("{top:?}"), format!("Frame(#{})", usize::MAX - 1));

        let last_addressable = FrameId::new((1 << 52) - 1);
        assert_eq!(
            last_addressable.checked_start_address(),
            Some(PhysicalAddress::new(0xFFFF_FFFF_FFFF_F000))
        );

        let range = FrameRange::new(FrameId::new(usize::MAX - 2), top);
        assert_eq!(range.to_string(), format!("#{}..#{}", usize::MAX - 2, usize::MAX - 1));
        assert_eq!(range.size_in_bytes(), FRAME_SIZE);

        let low = FrameRange::new(FrameId::new(1), FrameId::new(3));
        assert_eq!(low.to_string(), "#1..#3 (0x1000..0x3000)");
    }

    #[test]
    #[should_panic(expected = "frame range start lies above its end")]
    fn inverted_range_is_rejected() {
        let _ = FrameRange::new(FrameId::new(3), FrameId::new(2));
    }
}
