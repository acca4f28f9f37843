//! C6: cooperative watchdog -- event-bit aggregation, a monitor cycle, and
//! the hardware-watchdog feed/forensics it gates.
//!
//! Generic over [`obs_hal::EventGroup`] and [`obs_hal::HwWatchdog`] the same
//! way `obs-telemetry` is generic over `TaskSnapshot`: this crate never
//! touches a concrete RTOS event group or RP2040 watchdog register.

#![cfg_attr(not(test), no_std)]

use obs_channel::Channels;
use obs_hal::{Clock, CriticalRegion, EventGroup, HwWatchdog, ScratchRegisters};

/// Monitor wait period. Must stay under the configured HW timeout with
/// margin, per the invariant that a single missed cycle can't race the HW
/// reset.
pub const MONITOR_PERIOD_MS: u32 = 5000;

/// Outcome of one monitor cycle, exposed so tests can drive
/// [`Watchdog::monitor_once`] deterministically instead of the
/// never-returning [`Watchdog::run_forever`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Fed,
    Timeout { missing: u32 },
}

/// Owns the registered-bit mask and the configured HW timeout. Created
/// before the scheduler starts and lives for process lifetime, same as the
/// channel buffers.
pub struct Watchdog {
    registered_bits: u32,
    hw_timeout_ms: u32,
    started: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    pub const fn new() -> Self {
        Self { registered_bits: 0, hw_timeout_ms: 0, started: false }
    }

    /// Records the HW timeout. Must precede any [`Self::register`] call.
    pub fn init(&mut self, hw_timeout_ms: u32) {
        debug_assert!(
            MONITOR_PERIOD_MS < hw_timeout_ms,
            "monitor period must stay under the HW watchdog timeout"
        );
        self.registered_bits = 0;
        self.hw_timeout_ms = hw_timeout_ms;
        self.started = false;
    }

    /// ORs `bit` into the registered set. Idempotent; must be called before
    /// [`Self::start`].
    pub fn register(&mut self, bit: u32) {
        debug_assert!(!self.started, "register must precede start");
        self.registered_bits |= bit;
    }

    pub fn registered_bits(&self) -> u32 {
        self.registered_bits
    }

    /// Sets `bit` in the event group. Non-blocking; safe from any task.
    pub fn checkin<E: EventGroup>(&self, events: &E, bit: u32) {
        events.set(bit);
    }

    /// Enables the HW watchdog at the configured timeout with
    /// pause-on-debug set. Refuses (logging a warning, returning `false`)
    /// if nothing was ever registered, per the invariant that an unguarded
    /// watchdog is worse than none.
    pub fn start<W: HwWatchdog, R: CriticalRegion>(
        &mut self,
        channels: &mut Channels,
        hw: &mut W,
    ) -> bool {
        if self.registered_bits == 0 {
            obs_log::log_0!(
                R,
                channels,
                obs_log::Level::Warn,
                "watchdog start refused: no registered bits"
            );
            return false;
        }
        hw.enable(self.hw_timeout_ms, true);
        self.started = true;
        true
    }

    /// Runs one monitor cycle: waits up to [`MONITOR_PERIOD_MS`] for every
    /// registered bit, feeding the HW watchdog on success or writing a
    /// timeout forensics record into `scratch` on failure.
    pub fn monitor_once<E: EventGroup, W: HwWatchdog, C: Clock, S: ScratchRegisters>(
        &self,
        events: &E,
        hw: &mut W,
        clock: &C,
        scratch: &mut S,
    ) -> CycleOutcome {
        match events.wait_all(self.registered_bits, MONITOR_PERIOD_MS) {
            Ok(()) => {
                hw.feed();
                CycleOutcome::Fed
            }
            Err(observed) => {
                let missing = self.registered_bits & !observed;
                obs_faultcap::write_watchdog_timeout_record(
                    scratch,
                    missing,
                    clock.now_ticks(),
                    self.registered_bits,
                );
                CycleOutcome::Timeout { missing }
            }
        }
    }

    /// The monitor task body: runs [`Self::monitor_once`] forever. On a
    /// timeout it stops feeding the HW watchdog and idles -- the HW reset
    /// that follows, ~`hw_timeout_ms` later, is the actual recovery action.
    /// Never returns; this is the task the firmware binary spawns after
    /// [`Self::start`].
    pub fn run_forever<E: EventGroup, W: HwWatchdog, C: Clock, S: ScratchRegisters>(
        &self,
        events: &E,
        hw: &mut W,
        clock: &C,
        scratch: &mut S,
    ) -> ! {
        loop {
            if let CycleOutcome::Timeout { .. } = self.monitor_once(events, hw, clock, scratch) {
                loop {
                    core::hint::spin_loop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;

    struct NoRegion;
    impl CriticalRegion for NoRegion {
        type Guard = ();
        fn enter() -> Self::Guard {}
    }

    struct FakeEvents {
        bits: RefCell<u32>,
    }
    impl EventGroup for FakeEvents {
        fn set(&self, bits: u32) {
            *self.bits.borrow_mut() |= bits;
        }
        fn wait_all(&self, mask: u32, _timeout_ms: u32) -> Result<(), u32> {
            let observed = *self.bits.borrow() & mask;
            if observed == mask {
                *self.bits.borrow_mut() &= !mask;
                Ok(())
            } else {
                Err(observed)
            }
        }
    }

    struct FakeHwWatchdog {
        enabled_timeout_ms: Option<u32>,
        pause_on_debug: bool,
        feed_count: u32,
    }
    impl HwWatchdog for FakeHwWatchdog {
        fn enable(&mut self, timeout_ms: u32, pause_on_debug: bool) {
            self.enabled_timeout_ms = Some(timeout_ms);
            self.pause_on_debug = pause_on_debug;
        }
        fn feed(&mut self) {
            self.feed_count += 1;
        }
    }

    struct FakeClock(u32);
    impl Clock for FakeClock {
        fn now_ticks(&self) -> u32 {
            self.0
        }
        fn delay_until(&self, _deadline_ticks: u32) {}
    }

    struct FakeScratch([u32; 4]);
    impl ScratchRegisters for FakeScratch {
        fn read(&self, index: usize) -> u32 {
            self.0[index]
        }
        fn write(&mut self, index: usize, value: u32) {
            self.0[index] = value;
        }
    }

    const BIT_A: u32 = 1 << 0;
    const BIT_B: u32 = 1 << 1;

    // `obs_channel::init` is first-mover-once per process; both scenarios
    // that need a `Channels` live in this one test.
    #[test]
    fn start_refuses_without_registration_then_succeeds_after() {
        let mut channels = obs_channel::init();
        let mut hw = FakeHwWatchdog { enabled_timeout_ms: None, pause_on_debug: false, feed_count: 0 };

        let mut wdg = Watchdog::new();
        wdg.init(8000);
        assert!(!wdg.start::<_, NoRegion>(&mut channels, &mut hw));
        assert_eq!(hw.enabled_timeout_ms, None);

        wdg.register(BIT_A);
        wdg.register(BIT_B);
        assert!(wdg.start::<_, NoRegion>(&mut channels, &mut hw));
        assert_eq!(hw.enabled_timeout_ms, Some(8000));
        assert!(hw.pause_on_debug);
    }

    #[test]
    fn monitor_once_feeds_when_all_registered_bits_check_in() {
        let mut wdg = Watchdog::new();
        wdg.init(8000);
        wdg.register(BIT_A);
        wdg.register(BIT_B);

        let events = FakeEvents { bits: RefCell::new(0) };
        let mut hw = FakeHwWatchdog { enabled_timeout_ms: None, pause_on_debug: false, feed_count: 0 };
        let clock = FakeClock(100);
        let mut scratch = FakeScratch([0; 4]);

        wdg.checkin(&events, BIT_A);
        wdg.checkin(&events, BIT_B);
        let outcome = wdg.monitor_once(&events, &mut hw, &clock, &mut scratch);

        assert_eq!(outcome, CycleOutcome::Fed);
        assert_eq!(hw.feed_count, 1);
        assert_eq!(scratch.read(0), 0, "a healthy cycle must not touch the crash record");
    }

    #[test]
    fn monitor_once_times_out_and_writes_forensics_record() {
        let mut wdg = Watchdog::new();
        wdg.init(8000);
        wdg.register(BIT_A);
        wdg.register(BIT_B);

        let events = FakeEvents { bits: RefCell::new(0) };
        let mut hw = FakeHwWatchdog { enabled_timeout_ms: None, pause_on_debug: false, feed_count: 0 };
        let clock = FakeClock(4242);
        let mut scratch = FakeScratch([0; 4]);

        // Only BIT_A checks in; BIT_B is missing.
        wdg.checkin(&events, BIT_A);
        let outcome = wdg.monitor_once(&events, &mut hw, &clock, &mut scratch);

        assert_eq!(outcome, CycleOutcome::Timeout { missing: BIT_B });
        assert_eq!(hw.feed_count, 0, "a timed-out cycle must not feed the HW watchdog");
        assert_eq!(scratch.read(0), obs_faultcap::SENTINEL_WATCHDOG_TIMEOUT);
        assert_eq!(scratch.read(1), BIT_B);
        assert_eq!(scratch.read(2), 4242);
        assert_eq!(scratch.read(3), BIT_A | BIT_B);
    }
}
