//! # Bitmap Physical Frame Allocator
//!
//! One bit per 4 KiB frame, from frame 0 up to a compile-time ceiling. The
//! bitmap is a fixed-size array inside the allocator itself, so creating the
//! allocator never allocates: the kernel instance is a `static` that lands in
//! `.bss` (see [`PhysicalMemoryManager`]).
//!
//! ## Bitmap
//! - Bit `1`: allocated or reserved. Bit `0`: free.
//! - Frame `f` lives in word `f / BITS_PER_WORD` at bit `f % BITS_PER_WORD`.
//!
//! ## Active range
//! Only frames in `[range_begin, range_end)` are searched and may be freed.
//! Frames outside the range are unavailable whatever their bit says. A fresh
//! allocator has the empty range `[0, 0)` and therefore hands out nothing
//! until the boot classifier calls [`BitmapFrameAllocator::set_memory_range`].
//!
//! ## Operations
//! | Operation | Failure |
//! |-----------|---------|
//! | [`set_memory_range`](BitmapFrameAllocator::set_memory_range) | panics on `begin > end` or `end` beyond capacity |
//! | [`mark_allocated`](BitmapFrameAllocator::mark_allocated) | panics beyond capacity |
//! | [`allocate`](BitmapFrameAllocator::allocate) | [`FrameAllocError::OutOfMemory`], [`FrameAllocError::EmptyRequest`] |
//! | [`free`](BitmapFrameAllocator::free) | [`FrameAllocError::OutOfRange`], [`FrameAllocError::DoubleFree`] (strict policy only) |
//!
//! Failed operations never modify the bitmap.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::frame_alloc::{BitmapFrameAllocator, FrameAllocError};
//! use kernel_memory_addresses::FrameId;
//!
//! // 256 frames of capacity.
//! let mut pmm = BitmapFrameAllocator::<4>::new();
//! pmm.set_memory_range(FrameId::new(0), FrameId::new(12));
//! pmm.mark_allocated(FrameId::new(10), 2);
//!
//! let run = pmm.allocate(3).unwrap();
//! assert_eq!(run, FrameId::new(0));
//! assert!(matches!(pmm.allocate(8), Err(FrameAllocError::OutOfMemory { .. })));
//!
//! pmm.free(run, 3).unwrap();
//! ```

use core::fmt;
use kernel_info::memory::MAX_FRAME_COUNT;
use kernel_memory_addresses::{FrameId, FrameRange};
use log::{debug, error, warn};

/// Storage unit of the bitmap. Not observable through the API.
type Word = u64;

/// Number of frames tracked by one bitmap word.
pub const BITS_PER_WORD: usize = Word::BITS as usize;

/// Bitmap words needed to cover [`MAX_FRAME_COUNT`].
pub const PHYSICAL_BITMAP_WORDS: usize = MAX_FRAME_COUNT / BITS_PER_WORD;

/// The kernel's frame allocator, sized for the full physical ceiling.
///
/// At 128 GiB and 4 KiB frames this is 4 MiB of bitmap; never put one on the
/// stack.
pub type PhysicalMemoryManager = BitmapFrameAllocator<PHYSICAL_BITMAP_WORDS>;

/// How [`BitmapFrameAllocator::free`] treats frames that are already free.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FreePolicy {
    /// Clear the bits without looking at them. Freeing a free frame is
    /// indistinguishable from a correct free.
    #[default]
    Unchecked,
    /// Reject the whole call with [`FrameAllocError::DoubleFree`] if any frame
    /// in the span is already free.
    Strict,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    /// No run of free frames long enough exists in the active range.
    #[error("out of physical memory: no run of {requested} free frames in {range:?}")]
    OutOfMemory { requested: usize, range: FrameRange },
    /// A free targeted frames outside the active range.
    #[error("frames {frames:?} lie outside the managed range {range:?}")]
    OutOfRange { frames: FrameRange, range: FrameRange },
    /// A strict free found a frame that was not allocated.
    #[error("frame {frame} is already free")]
    DoubleFree { frame: FrameId },
    /// A zero-length allocation was requested.
    #[error("requested an allocation of zero frames")]
    EmptyRequest,
}

/// First-fit bitmap allocator over `WORDS * BITS_PER_WORD` frames.
///
/// # Invariants
/// - `range_begin <= range_end <= capacity`.
/// - A frame handed out by [`allocate`](Self::allocate) keeps its bit set
///   until it is passed to [`free`](Self::free).
/// - Frames are named by index only; the allocator holds no pointers into
///   the memory it manages.
#[derive(Clone, PartialEq, Eq)]
pub struct BitmapFrameAllocator<const WORDS: usize> {
    bitmap: [Word; WORDS],
    range_begin: FrameId,
    range_end: FrameId,
    free_policy: FreePolicy,
}

impl<const WORDS: usize> Default for BitmapFrameAllocator<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> BitmapFrameAllocator<WORDS> {
    /// Number of frames the bitmap can describe.
    pub const CAPACITY: usize = WORDS * BITS_PER_WORD;

    /// An allocator with every frame free, an empty active range and the
    /// [`FreePolicy::Unchecked`] policy.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_free_policy(FreePolicy::Unchecked)
    }

    #[must_use]
    pub const fn with_free_policy(free_policy: FreePolicy) -> Self {
        Self {
            bitmap: [0; WORDS],
            range_begin: FrameId::new(0),
            range_end: FrameId::new(0),
            free_policy,
        }
    }

    #[inline]
    #[must_use]
    pub const fn free_policy(&self) -> FreePolicy {
        self.free_policy
    }

    /// The active range `[range_begin, range_end)`.
    #[inline]
    #[must_use]
    pub const fn memory_range(&self) -> FrameRange {
        FrameRange::new(self.range_begin, self.range_end)
    }

    /// Bytes covered by the active range, allocated or not.
    #[inline]
    #[must_use]
    pub const fn manageable_size(&self) -> u64 {
        self.memory_range().size_in_bytes()
    }

    /// Restrict allocation to `[begin, end)`.
    ///
    /// Bits are left untouched, so frames reserved earlier stay reserved
    /// when the range grows to include them.
    ///
    /// # Panics
    /// Panics if `begin > end` or `end` exceeds [`Self::CAPACITY`]. Both are
    /// boot sequence bugs.
    pub fn set_memory_range(&mut self, begin: FrameId, end: FrameId) {
        assert!(
            begin <= end,
            "memory range start {begin} lies above its end {end}"
        );
        assert!(
            end.id() <= Self::CAPACITY,
            "memory range end {end} exceeds the bitmap capacity of {} frames",
            Self::CAPACITY
        );
        self.range_begin = begin;
        self.range_end = end;
        debug!(
            "Frame allocator range set to {} ({} MiB)",
            self.memory_range(),
            self.manageable_size() / 1024 / 1024
        );
    }

    /// Set the bits of `[start, start + num_frames)` regardless of their state.
    ///
    /// Used during bootstrap to carve out firmware regions and the kernel
    /// image. The range may lie outside the active range.
    ///
    /// # Panics
    /// Panics if the span reaches beyond [`Self::CAPACITY`].
    pub fn mark_allocated(&mut self, start: FrameId, num_frames: usize) {
        let end = start.id().checked_add(num_frames);
        assert!(
            end.is_some_and(|end| end <= Self::CAPACITY),
            "cannot mark {num_frames} frames at {start}: beyond the bitmap capacity of {} frames",
            Self::CAPACITY
        );
        self.fill(start.id(), start.id() + num_frames, true);
    }

    /// Allocate `num_frames` physically contiguous frames.
    ///
    /// First fit: the lowest-addressed run of free frames in the active range
    /// that is long enough wins. Returns the first frame of the run.
    ///
    /// # Errors
    /// - [`FrameAllocError::EmptyRequest`] if `num_frames` is zero.
    /// - [`FrameAllocError::OutOfMemory`] if no run is long enough.
    pub fn allocate(&mut self, num_frames: usize) -> Result<FrameId, FrameAllocError> {
        if num_frames == 0 {
            return Err(FrameAllocError::EmptyRequest);
        }

        let end = self.range_end.id();
        let mut frame = self.range_begin.id();
        let mut run_start = frame;
        let mut run_len = 0;

        while frame < end {
            // Skip fully allocated words while no run is open.
            if run_len == 0
                && frame.is_multiple_of(BITS_PER_WORD)
                && self.bitmap[frame / BITS_PER_WORD] == Word::MAX
            {
                frame += BITS_PER_WORD;
                run_start = frame;
                continue;
            }

            if self.bit(frame) {
                run_len = 0;
                run_start = frame + 1;
            } else {
                run_len += 1;
                if run_len == num_frames {
                    self.fill(run_start, run_start + num_frames, true);
                    return Ok(FrameId::new(run_start));
                }
            }
            frame += 1;
        }

        let range = self.memory_range();
        warn!("Out of physical memory: no run of {num_frames} free frames in {range}");
        Err(FrameAllocError::OutOfMemory {
            requested: num_frames,
            range,
        })
    }

    /// Release `[start, start + num_frames)`.
    ///
    /// Freeing zero frames succeeds as long as `start` lies within (or at the
    /// end of) the active range.
    ///
    /// # Errors
    /// - [`FrameAllocError::OutOfRange`] if any frame lies outside the active range.
    /// - [`FrameAllocError::DoubleFree`] under [`FreePolicy::Strict`] if any
    ///   frame is already free.
    pub fn free(&mut self, start: FrameId, num_frames: usize) -> Result<(), FrameAllocError> {
        let range = self.memory_range();
        let end = start
            .id()
            .checked_add(num_frames)
            .map_or(FrameId::NULL, FrameId::new);
        let frames = FrameRange::new(start, end);
        if !range.contains_range(&frames) {
            error!("Refusing to free frames {frames:?} outside the managed range {range:?}");
            return Err(FrameAllocError::OutOfRange { frames, range });
        }

        if self.free_policy == FreePolicy::Strict
            && let Some(frame) = self.first_free_in(start.id(), end.id())
        {
            error!("Double free of frame {frame} detected while freeing {frames:?}");
            return Err(FrameAllocError::DoubleFree { frame });
        }

        self.fill(start.id(), end.id(), false);
        Ok(())
    }

    /// Whether `frame` is allocated or reserved.
    ///
    /// Frames beyond the bitmap capacity are reported as allocated. The
    /// active range is not consulted.
    #[must_use]
    pub fn is_allocated(&self, frame: FrameId) -> bool {
        frame.id() >= Self::CAPACITY || self.bit(frame.id())
    }

    /// Number of free frames inside the active range.
    #[must_use]
    pub fn free_frame_count(&self) -> usize {
        let range = self.memory_range();
        range.len() - self.count_allocated(range.start().id(), range.end().id())
    }

    #[inline]
    fn bit(&self, frame: usize) -> bool {
        let mask: Word = 1 << (frame % BITS_PER_WORD);
        self.bitmap[frame / BITS_PER_WORD] & mask != 0
    }

    /// Mask of `span` bits starting at `bit` within one word; `span` is at least 1.
    #[inline]
    const fn mask(bit: usize, span: usize) -> Word {
        (Word::MAX >> (BITS_PER_WORD - span)) << bit
    }

    /// Calls `f(word_index, mask)` for every word touched by `[start, end)`.
    #[inline]
    fn for_each_word(start: usize, end: usize, mut f: impl FnMut(usize, Word)) {
        let mut frame = start;
        while frame < end {
            let bit = frame % BITS_PER_WORD;
            let span = (BITS_PER_WORD - bit).min(end - frame);
            f(frame / BITS_PER_WORD, Self::mask(bit, span));
            frame += span;
        }
    }

    fn fill(&mut self, start: usize, end: usize, allocated: bool) {
        let bitmap = &mut self.bitmap;
        Self::for_each_word(start, end, |word, mask| {
            if allocated {
                bitmap[word] |= mask;
            } else {
                bitmap[word] &= !mask;
            }
        });
    }

    fn count_allocated(&self, start: usize, end: usize) -> usize {
        let mut count = 0;
        Self::for_each_word(start, end, |word, mask| {
            count += (self.bitmap[word] & mask).count_ones() as usize;
        });
        count
    }

    fn first_free_in(&self, start: usize, end: usize) -> Option<FrameId> {
        (start..end).find(|&f| !self.bit(f)).map(FrameId::new)
    }
}

impl<const WORDS: usize> fmt::Debug for BitmapFrameAllocator<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapFrameAllocator")
            .field("capacity", &Self::CAPACITY)
            .field("range", &self.memory_range())
            .field("free_frames", &self.free_frame_count())
            .field("free_policy", &self.free_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::FRAME_SIZE;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    /// 256 frames of capacity.
    type SmallAllocator = BitmapFrameAllocator<4>;

    fn f(id: usize) -> FrameId {
        FrameId::new(id)
    }

    fn with_range(begin: usize, end: usize) -> SmallAllocator {
        let mut a = SmallAllocator::new();
        a.set_memory_range(f(begin), f(end));
        a
    }

    #[test]
    fn fresh_allocator_has_empty_range() {
        let mut a = SmallAllocator::new();
        assert!(a.memory_range().is_empty());
        assert_eq!(a.free_frame_count(), 0);
        assert!(matches!(
            a.allocate(1),
            Err(FrameAllocError::OutOfMemory { requested: 1, .. })
        ));
    }

    #[test]
    fn first_fit_returns_lowest_run() {
        let mut a = with_range(0, 12);
        a.mark_allocated(f(10), 2);

        assert_eq!(a.allocate(3), Ok(f(0)));
        for frame in 0..3 {
            assert!(a.is_allocated(f(frame)));
        }
        for frame in 3..10 {
            assert!(!a.is_allocated(f(frame)));
        }
        assert!(a.is_allocated(f(10)));
        assert!(a.is_allocated(f(11)));

        let before = a.clone();
        assert_eq!(
            a.allocate(8),
            Err(FrameAllocError::OutOfMemory {
                requested: 8,
                range: FrameRange::new(f(0), f(12)),
            })
        );
        assert_eq!(a, before);
    }

    #[test]
    fn allocation_skips_runs_that_are_too_short() {
        let mut a = with_range(0, 20);
        a.mark_allocated(f(2), 1);
        a.mark_allocated(f(6), 1);
        // Free runs: [0,2), [3,6), [7,20)
        assert_eq!(a.allocate(3), Ok(f(3)));
        assert_eq!(a.allocate(2), Ok(f(0)));
        assert_eq!(a.allocate(4), Ok(f(7)));
    }

    #[test]
    fn allocation_crosses_word_boundaries() {
        let mut a = with_range(60, 200);
        let run = a.allocate(100).unwrap();
        assert_eq!(run, f(60));
        assert_eq!(a.free_frame_count(), 40);
        assert!(a.is_allocated(f(159)));
        assert!(!a.is_allocated(f(160)));
    }

    #[test]
    fn full_words_are_skipped() {
        let mut a = with_range(0, 256);
        a.mark_allocated(f(0), 192);
        assert_eq!(a.allocate(1), Ok(f(192)));
        assert_eq!(a.allocate(63), Ok(f(193)));
        assert!(a.allocate(1).is_err());
    }

    #[test]
    fn range_begin_is_respected() {
        let mut a = with_range(5, 8);
        assert_eq!(a.allocate(3), Ok(f(5)));
        assert!(a.allocate(1).is_err());
        assert!(!a.is_allocated(f(4)));
        assert!(!a.is_allocated(f(8)));
    }

    #[test]
    fn zero_frame_allocation_is_rejected() {
        let mut a = with_range(0, 16);
        let before = a.clone();
        assert_eq!(a.allocate(0), Err(FrameAllocError::EmptyRequest));
        assert_eq!(a, before);
    }

    #[test]
    fn free_outside_range_is_rejected_without_mutation() {
        let mut a = with_range(4, 12);
        a.mark_allocated(f(0), 16);
        let before = a.clone();

        let err = a.free(f(10), 4).unwrap_err();
        assert_eq!(
            err,
            FrameAllocError::OutOfRange {
                frames: FrameRange::new(f(10), f(14)),
                range: FrameRange::new(f(4), f(12)),
            }
        );
        assert!(a.free(f(2), 3).is_err());
        assert!(a.free(FrameId::NULL, 1).is_err());
        assert!(a.free(f(usize::MAX - 1), 8).is_err());
        assert_eq!(a, before);
    }

    #[test]
    fn zero_frame_free_checks_its_start() {
        let mut a = with_range(4, 12);
        assert_eq!(a.free(f(12), 0), Ok(()));
        assert!(a.free(f(13), 0).is_err());
    }

    #[test]
    fn unchecked_policy_accepts_double_free() {
        let mut a = with_range(0, 8);
        let run = a.allocate(2).unwrap();
        assert_eq!(a.free(run, 2), Ok(()));
        assert_eq!(a.free(run, 2), Ok(()));
        assert_eq!(a.free_frame_count(), 8);
    }

    #[test]
    fn strict_policy_rejects_double_free_without_mutation() {
        let mut a = SmallAllocator::with_free_policy(FreePolicy::Strict);
        a.set_memory_range(f(0), f(8));
        let run = a.allocate(4).unwrap();
        a.free(f(2), 1).unwrap();

        let before = a.clone();
        assert_eq!(
            a.free(run, 4),
            Err(FrameAllocError::DoubleFree { frame: f(2) })
        );
        assert_eq!(a, before);

        assert_eq!(a.free(f(0), 2), Ok(()));
        assert_eq!(a.free(f(3), 1), Ok(()));
        assert_eq!(a.free_frame_count(), 8);
    }

    #[test]
    fn mark_allocated_is_idempotent() {
        let mut a = with_range(0, 64);
        a.mark_allocated(f(3), 5);
        let once = a.clone();
        a.mark_allocated(f(3), 5);
        assert_eq!(a, once);
    }

    #[test]
    fn reservations_survive_range_widening() {
        let mut a = with_range(0, 8);
        a.mark_allocated(f(8), 4);
        a.set_memory_range(f(0), f(16));

        let mut handed_out = Vec::new();
        while let Ok(frame) = a.allocate(1) {
            handed_out.push(frame.id());
        }
        assert_eq!(handed_out.len(), 12);
        assert!(handed_out.iter().all(|id| !(8..12).contains(id)));
    }

    #[test]
    #[should_panic(expected = "lies above its end")]
    fn inverted_range_panics() {
        let mut a = SmallAllocator::new();
        a.set_memory_range(f(5), f(4));
    }

    #[test]
    #[should_panic(expected = "exceeds the bitmap capacity")]
    fn range_beyond_capacity_panics() {
        let mut a = SmallAllocator::new();
        a.set_memory_range(f(0), f(SmallAllocator::CAPACITY + 1));
    }

    #[test]
    #[should_panic(expected = "beyond the bitmap capacity")]
    fn marking_beyond_capacity_panics() {
        let mut a = SmallAllocator::new();
        a.mark_allocated(f(250), 7);
    }

    #[test]
    fn frames_beyond_capacity_read_as_allocated() {
        let a = SmallAllocator::new();
        assert!(a.is_allocated(f(SmallAllocator::CAPACITY)));
        assert!(a.is_allocated(FrameId::NULL));
    }

    #[test]
    fn kernel_allocator_covers_the_physical_ceiling() {
        assert_eq!(PhysicalMemoryManager::CAPACITY, MAX_FRAME_COUNT);
        assert_eq!(
            PhysicalMemoryManager::CAPACITY as u64 * FRAME_SIZE,
            kernel_info::memory::MAX_PHYSICAL_MEMORY_BYTES
        );
    }

    #[test]
    fn allocations_without_free_are_disjoint() {
        let mut rng = SmallRng::seed_from_u64(0x5EED_0001);
        for _ in 0..64 {
            let mut a = with_range(0, 256);
            let mut owned = [false; 256];
            while let Ok(start) = a.allocate(rng.gen_range(1..=9)) {
                // Length is recovered from the bits we just observed flip.
                let mut end = start.id();
                while end < 256 && a.is_allocated(f(end)) && !owned[end] {
                    end += 1;
                }
                for slot in &mut owned[start.id()..end] {
                    *slot = true;
                }
                assert!(end > start.id());
            }
            assert_eq!(a.free_frame_count(), owned.iter().filter(|o| !**o).count());
        }
    }

    #[test]
    fn tracked_allocations_never_overlap() {
        let mut rng = SmallRng::seed_from_u64(0x5EED_0002);
        let mut a = with_range(0, 256);
        let mut runs: Vec<(usize, usize)> = Vec::new();
        loop {
            let len = rng.gen_range(1..=12);
            let Ok(start) = a.allocate(len) else { break };
            let run = (start.id(), start.id() + len);
            assert!(
                runs.iter().all(|&(s, e)| run.1 <= s || e <= run.0),
                "run {run:?} overlaps one of {runs:?}"
            );
            runs.push(run);
        }
        assert!(!runs.is_empty());
    }

    #[test]
    fn allocate_free_round_trip_restores_bitmap() {
        let mut rng = SmallRng::seed_from_u64(0x5EED_0003);
        let mut a = with_range(0, 256);
        for _ in 0..40 {
            let start = rng.gen_range(0..250);
            a.mark_allocated(f(start), rng.gen_range(1..6));
        }

        for _ in 0..200 {
            let len = rng.gen_range(1..=16);
            let before = a.clone();
            match a.allocate(len) {
                Ok(start) => {
                    a.free(start, len).unwrap();
                    assert_eq!(a, before);
                    // Keep some allocations to vary the layout.
                    if rng.gen_bool(0.5) {
                        let _ = a.allocate(len);
                    }
                }
                Err(FrameAllocError::OutOfMemory { .. }) => assert_eq!(a, before),
                Err(e) => panic!("unexpected error {e}"),
            }
        }
    }

    #[test]
    fn allocations_stay_inside_random_ranges() {
        let mut rng = SmallRng::seed_from_u64(0x5EED_0004);
        for _ in 0..200 {
            let begin = rng.gen_range(0..256);
            let end = rng.gen_range(begin..=256);
            let mut a = with_range(begin, end);
            for _ in 0..8 {
                a.mark_allocated(f(rng.gen_range(0..256)), 1);
            }
            for _ in 0..16 {
                let len = rng.gen_range(1..=8);
                if let Ok(start) = a.allocate(len) {
                    assert!(start.id() >= begin);
                    assert!(start.id() + len <= end);
                }
            }
        }
    }

    #[test]
    fn exhaustion_matches_longest_free_run() {
        let mut rng = SmallRng::seed_from_u64(0x5EED_0005);
        for _ in 0..100 {
            let mut a = with_range(0, 128);
            for _ in 0..rng.gen_range(0..40) {
                a.mark_allocated(f(rng.gen_range(0..128)), rng.gen_range(1..4));
            }

            let mut longest = 0;
            let mut current = 0;
            for frame in 0..128 {
                if a.is_allocated(f(frame)) {
                    current = 0;
                } else {
                    current += 1;
                    longest = longest.max(current);
                }
            }

            let before = a.clone();
            let too_long = longest + 1;
            assert!(matches!(
                a.allocate(too_long),
                Err(FrameAllocError::OutOfMemory { .. })
            ));
            assert_eq!(a, before);
            if longest > 0 {
                assert!(a.allocate(longest).is_ok());
            }
        }
    }
}
