use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let lock = SpinLock::new(0_u32);
    {
        let mut g = lock.lock();
        *g = 41;
        assert!(lock.is_locked());
    }
    assert!(!lock.is_locked());

    *lock.lock() += 1;
    assert_eq!(*lock.lock(), 42);
}

#[test]
fn try_lock_fails_while_held() {
    let lock = SpinLock::new(1_u8);

    let held = lock.try_lock();
    assert_eq!(held.as_deref(), Some(&1));
    assert!(lock.try_lock().is_none());

    drop(held);
    assert!(lock.try_lock().is_some());
}

#[test]
fn get_mut_bypasses_the_lock() {
    let mut lock = SpinLock::new(vec![1, 2, 3]);
    lock.get_mut().push(4);
    assert_eq!(lock.lock().as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    let threads = 8;
    let iters = 5_000;

    let lock = Arc::new(SpinLock::new(0_usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    lock.with_lock(|v| {
                        assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                        *v += 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(lock.with_lock(|v| *v), threads * iters);
}

#[test]
fn lock_is_released_on_panic() {
    let lock = SpinLock::new(0_u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        lock.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err());
    assert!(!lock.is_locked());
    assert_eq!(lock.with_lock(|v| *v), 123);
}

#[test]
fn debug_does_not_block_on_a_held_lock() {
    let lock = SpinLock::new(5_u8);
    assert_eq!(format!("{lock:?}"), "SpinLock { inner: 5 }");
    let _held = lock.lock();
    assert_eq!(format!("{lock:?}"), "SpinLock { inner: <locked> }");
}
