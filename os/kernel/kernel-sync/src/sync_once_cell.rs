use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// A cell written at most once, readable from any core afterwards.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The stored value, if a writer has finished.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY is stored only after the value is written.
            Some(unsafe { self.get_unchecked() })
        } else {
            None
        }
    }

    /// Store `value` unless the cell is already taken.
    ///
    /// # Errors
    /// Hands `value` back if another caller got there first, including one
    /// that is still writing.
    pub fn set(&self, value: T) -> Result<(), T> {
        if !self.begin_write() {
            return Err(value);
        }
        self.finish_write(value);
        Ok(())
    }

    /// Initialize at most once and return the stored value.
    ///
    /// Callers that lose the race spin until the winner has published.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        if self.begin_write() {
            self.finish_write(init());
        } else {
            while self.state.load(Ordering::Acquire) != READY {
                spin_loop();
            }
        }
        // SAFETY: READY observed or published above.
        unsafe { self.get_unchecked() }
    }

    fn begin_write(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn finish_write(&self, value: T) {
        // SAFETY: the WRITING state grants this thread sole access.
        unsafe { (*self.value.get()).write(value) };
        self.state.store(READY, Ordering::Release);
    }

    /// # Safety
    /// The state must be READY.
    unsafe fn get_unchecked(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means the value was written exactly once.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// Safety: readers only see the value after READY; writing is single-writer.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
