//! C7: run a callback while the flash controller is safe to mutate.
//!
//! Two mutually exclusive paths, selected by a single predicate
//! ([`SchedulerState::started`]), the same degrade rule `obs-channel`'s
//! critical region uses: once the scheduler is up, both cores may be live
//! and a multi-core lockout is required; before it starts, only one core
//! exists and the lockout primitive would deadlock waiting on a peer that
//! was never brought up, so plain interrupt masking is both sufficient and
//! mandatory.

#![cfg_attr(not(test), no_std)]

use obs_hal::{FlashLockout, HwWatchdog, InterruptGuard, SchedulerState};

/// Feeds the HW watchdog, then runs `f` with the flash controller quiesced,
/// then returns `f`'s result unchanged. The feed happens before the window
/// opens, not inside it, because a multi-sector erase can take many
/// milliseconds and the cooperative-watchdog monitor cannot run during the
/// critical region.
///
/// The guard each path produces is responsible for invalidating
/// execute-in-place caches on drop, after the window closes; that's the
/// concrete `FlashLockout`/`InterruptGuard` implementation's concern, not
/// this function's.
pub fn execute<L, S, I, W>(lockout: &mut L, hw: &mut W, f: impl FnOnce() -> bool) -> bool
where
    L: FlashLockout,
    S: SchedulerState,
    I: InterruptGuard,
    W: HwWatchdog,
{
    hw.feed();
    if S::started() {
        let _guard = lockout.acquire_multicore();
        f()
    } else {
        let _guard = I::disable();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Started;
    impl SchedulerState for Started {
        fn started() -> bool {
            true
        }
    }

    struct NotStarted;
    impl SchedulerState for NotStarted {
        fn started() -> bool {
            false
        }
    }

    struct FakeGuard<'a>(&'a Cell<u32>);
    impl Drop for FakeGuard<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct FakeLockout<'a> {
        acquire_count: Cell<u32>,
        drop_count: &'a Cell<u32>,
    }
    impl<'a> FlashLockout for FakeLockout<'a> {
        type Guard = FakeGuard<'a>;
        fn acquire_multicore(&mut self) -> Self::Guard {
            self.acquire_count.set(self.acquire_count.get() + 1);
            FakeGuard(self.drop_count)
        }
    }

    struct FakeInterruptGuard<'a>(&'a Cell<u32>);
    impl<'a> InterruptGuard for FakeInterruptGuard<'a> {
        fn disable() -> Self {
            panic!("test supplies disable via a closure-captured cell instead");
        }
    }

    // `InterruptGuard::disable` is a bare associated function with no
    // `self`, so it can't close over a test-local counter directly. Tests
    // that need to observe the pre-scheduler path use this thread-local-free
    // static instead.
    static PRE_SCHEDULER_DISABLE_COUNT: core::sync::atomic::AtomicU32 =
        core::sync::atomic::AtomicU32::new(0);
    static PRE_SCHEDULER_DROP_COUNT: core::sync::atomic::AtomicU32 =
        core::sync::atomic::AtomicU32::new(0);

    struct CountingInterruptGuard;
    impl InterruptGuard for CountingInterruptGuard {
        fn disable() -> Self {
            PRE_SCHEDULER_DISABLE_COUNT.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
            Self
        }
    }
    impl Drop for CountingInterruptGuard {
        fn drop(&mut self) {
            PRE_SCHEDULER_DROP_COUNT.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
        }
    }

    struct FakeHwWatchdog {
        feed_count: u32,
    }
    impl HwWatchdog for FakeHwWatchdog {
        fn enable(&mut self, _timeout_ms: u32, _pause_on_debug: bool) {}
        fn feed(&mut self) {
            self.feed_count += 1;
        }
    }

    #[test]
    fn scheduler_started_path_acquires_multicore_lockout_and_feeds_first() {
        let drop_count = Cell::new(0);
        let mut lockout = FakeLockout { acquire_count: Cell::new(0), drop_count: &drop_count };
        let mut hw = FakeHwWatchdog { feed_count: 0 };

        let mut fed_before_callback = false;
        let ok = execute::<_, Started, FakeInterruptGuard<'_>, _>(&mut lockout, &mut hw, || {
            fed_before_callback = true;
            true
        });

        assert!(ok);
        assert!(fed_before_callback);
        assert_eq!(hw.feed_count, 1);
        assert_eq!(lockout.acquire_count.get(), 1);
        assert_eq!(drop_count.get(), 1, "the lockout guard must have dropped before execute returns");
    }

    #[test]
    fn pre_scheduler_path_disables_interrupts_instead_of_multicore_lockout() {
        let drop_count = Cell::new(0);
        let mut lockout = FakeLockout { acquire_count: Cell::new(0), drop_count: &drop_count };
        let mut hw = FakeHwWatchdog { feed_count: 0 };
        let before = PRE_SCHEDULER_DISABLE_COUNT.load(core::sync::atomic::Ordering::SeqCst);

        let ok = execute::<_, NotStarted, CountingInterruptGuard, _>(&mut lockout, &mut hw, || true);

        assert!(ok);
        assert_eq!(hw.feed_count, 1);
        assert_eq!(lockout.acquire_count.get(), 0, "must not touch the multicore lockout pre-scheduler");
        assert_eq!(
            PRE_SCHEDULER_DISABLE_COUNT.load(core::sync::atomic::Ordering::SeqCst),
            before + 1
        );
    }

    #[test]
    fn callback_failure_propagates_as_false() {
        let drop_count = Cell::new(0);
        let mut lockout = FakeLockout { acquire_count: Cell::new(0), drop_count: &drop_count };
        let mut hw = FakeHwWatchdog { feed_count: 0 };

        let ok = execute::<_, Started, FakeInterruptGuard<'_>, _>(&mut lockout, &mut hw, || false);
        assert!(!ok);
    }
}
