//! Concrete `obs_hal` adapters for an RP2040: SIO spinlocks, the watchdog
//! block's scratch registers, and the free-running 1 MHz timer. Each
//! peripheral is reached through `Peripherals::ptr()` rather than a held
//! `Peripherals` singleton, the same access pattern `lpc55-reset-reason`
//! uses for `PMC` -- every adapter here is a zero-sized handle, so any
//! number of them can exist without fighting over ownership of the PAC's
//! `steal()`-returned struct.

use core::sync::atomic::{AtomicBool, Ordering};

use obs_hal::{
    Clock, CriticalRegion, FlashLockout, HwWatchdog, InterruptGuard, ResetCause, ResetReason,
    SchedulerState, ScratchRegisters,
};
use rp2040_pac::{PSM, SIO, WATCHDOG};

/// The spinlock this workspace claims for channel/flash-safe critical
/// regions. RP2040 has 32; the remaining 31 are left for the HAL/bootrom's
/// own use (spinlock 31 is reserved by the boot ROM, so this one is picked
/// arbitrarily clear of it).
const CHANNEL_SPINLOCK: usize = 0;

static SCHEDULER_STARTED: AtomicBool = AtomicBool::new(false);

/// Flips the single predicate every pre-scheduler-degrade path in this
/// workspace branches on. Called once, from `main`, immediately before the
/// application's tasks are created (step 7 of the boot sequence) -- after
/// this point the peer core may be running and critical regions must take
/// the spinlock, not just mask interrupts.
///
/// # Safety
/// Must only be called once, from the boot core, before core 1 is started.
pub unsafe fn mark_scheduler_started() {
    SCHEDULER_STARTED.store(true, Ordering::Release);
}

pub struct Rp2040SchedulerState;

impl SchedulerState for Rp2040SchedulerState {
    fn started() -> bool {
        SCHEDULER_STARTED.load(Ordering::Acquire)
    }
}

/// Masks interrupts on the current core for the guard's lifetime, restoring
/// the prior PRIMASK on drop. The pre-scheduler degrade path for both
/// `CriticalRegion` and `FlashLockout`.
pub struct Rp2040InterruptGuard {
    was_active: bool,
}

impl InterruptGuard for Rp2040InterruptGuard {
    fn disable() -> Self {
        let was_active = cortex_m::register::primask::read().is_active();
        cortex_m::interrupt::disable();
        Self { was_active }
    }
}

impl Drop for Rp2040InterruptGuard {
    fn drop(&mut self) {
        if self.was_active {
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}

/// Masks interrupts and, once the scheduler has started, additionally
/// claims `CHANNEL_SPINLOCK` -- released by writing any value back to it on
/// drop, per the RP2040 SIO spinlock's lock-on-read/unlock-on-write
/// contract.
pub struct Rp2040CriticalGuard {
    interrupts: Rp2040InterruptGuard,
    holds_spinlock: bool,
}

impl Drop for Rp2040CriticalGuard {
    fn drop(&mut self) {
        if self.holds_spinlock {
            let sio = unsafe { &*SIO::ptr() };
            sio.spinlock[CHANNEL_SPINLOCK].write(|w| unsafe { w.bits(1) });
        }
    }
}

pub struct Rp2040CriticalRegion;

impl CriticalRegion for Rp2040CriticalRegion {
    type Guard = Rp2040CriticalGuard;

    fn enter() -> Self::Guard {
        let interrupts = Rp2040InterruptGuard::disable();
        if !Rp2040SchedulerState::started() {
            // Only one core is guaranteed live; masking interrupts on it is
            // sufficient and the spinlock would never be contended anyway.
            return Rp2040CriticalGuard { interrupts, holds_spinlock: false };
        }
        let sio = unsafe { &*SIO::ptr() };
        // Reading a claimed spinlock returns 0 until the owner releases it
        // by writing back; spin until we observe a nonzero (claimed-by-us)
        // read.
        while sio.spinlock[CHANNEL_SPINLOCK].read().bits() == 0 {
            core::hint::spin_loop();
        }
        Rp2040CriticalGuard { interrupts, holds_spinlock: true }
    }
}

/// Forces the peer core off via `PSM.frce_off` for the duration of the
/// flash-mutation window, restoring it on drop. Only ever constructed once
/// the scheduler has started (both cores are guaranteed live); the
/// pre-scheduler path in `obs-flashsafe` never touches this.
pub struct Rp2040FlashGuard {
    interrupts: Rp2040InterruptGuard,
}

impl Drop for Rp2040FlashGuard {
    fn drop(&mut self) {
        let psm = unsafe { &*PSM::ptr() };
        psm.frce_off.modify(|_, w| w.proc1().clear_bit());
        // Invalidate the XIP cache: anything fetched while flash was being
        // mutated could be stale.
        let xip_ctrl = unsafe { &*rp2040_pac::XIP_CTRL::ptr() };
        xip_ctrl.flush.write(|w| w.flush().set_bit());
        while xip_ctrl.flush.read().flush().bit_is_set() {
            core::hint::spin_loop();
        }
    }
}

pub struct Rp2040FlashLockout;

impl FlashLockout for Rp2040FlashLockout {
    type Guard = Rp2040FlashGuard;

    fn acquire_multicore(&mut self) -> Self::Guard {
        let interrupts = Rp2040InterruptGuard::disable();
        let psm = unsafe { &*PSM::ptr() };
        psm.frce_off.modify(|_, w| w.proc1().set_bit());
        while !psm.done.read().proc1().bit_is_clear() {
            core::hint::spin_loop();
        }
        Rp2040FlashGuard { interrupts }
    }
}

/// The free-running 1 MHz timer (`TIMERAWL`), read directly and wraps every
/// ~71.58 minutes, exactly the counter the spec's wrap-safe arithmetic
/// notes describe.
pub struct Rp2040Clock;

impl Clock for Rp2040Clock {
    fn now_ticks(&self) -> u32 {
        let timer = unsafe { &*rp2040_pac::TIMER::ptr() };
        timer.timerawl.read().bits()
    }

    fn delay_until(&self, deadline_ticks: u32) {
        // Wrap-safe "have we reached the deadline yet" check: if the
        // deadline is in the past relative to wrapping arithmetic, the
        // subtraction's high bit flips and the signed cast goes negative.
        while (self.now_ticks().wrapping_sub(deadline_ticks) as i32) < 0 {
            core::hint::spin_loop();
        }
    }
}

/// The watchdog block's scratch0..scratch3, the only four words the rest of
/// this workspace is allowed to touch (4..7 belong to the boot ROM).
pub struct Rp2040ScratchRegisters;

impl ScratchRegisters for Rp2040ScratchRegisters {
    fn read(&self, index: usize) -> u32 {
        let wd = unsafe { &*WATCHDOG::ptr() };
        match index {
            0 => wd.scratch0.read().bits(),
            1 => wd.scratch1.read().bits(),
            2 => wd.scratch2.read().bits(),
            3 => wd.scratch3.read().bits(),
            _ => unreachable!("scratch indices 4..7 belong to the boot ROM"),
        }
    }

    fn write(&mut self, index: usize, value: u32) {
        let wd = unsafe { &*WATCHDOG::ptr() };
        match index {
            0 => wd.scratch0.write(|w| unsafe { w.bits(value) }),
            1 => wd.scratch1.write(|w| unsafe { w.bits(value) }),
            2 => wd.scratch2.write(|w| unsafe { w.bits(value) }),
            3 => wd.scratch3.write(|w| unsafe { w.bits(value) }),
            _ => unreachable!("scratch indices 4..7 belong to the boot ROM"),
        }
    }
}

pub struct Rp2040ResetCause;

impl ResetCause for Rp2040ResetCause {
    fn reset_reason(&self) -> ResetReason {
        let wd = unsafe { &*WATCHDOG::ptr() };
        let reason = wd.reason.read();
        if reason.force().bit_is_set() || reason.timer().bit_is_set() {
            ResetReason::Watchdog
        } else {
            ResetReason::PowerOn
        }
    }
}

/// The RP2040 hardware watchdog doubles whatever tick count is written to
/// `LOAD` internally, so callers of `enable`/`feed` write `timeout_ms * 1000`
/// and this adapter halves it before loading, matching the vendor quirk
/// documented in the RP2040 datasheet.
pub struct Rp2040HwWatchdog;

impl HwWatchdog for Rp2040HwWatchdog {
    fn enable(&mut self, timeout_ms: u32, pause_on_debug: bool) {
        let wd = unsafe { &*WATCHDOG::ptr() };
        let ticks = timeout_ms.saturating_mul(1000) / 2;
        wd.load.write(|w| unsafe { w.bits(ticks) });
        wd.ctrl.modify(|_, w| {
            w.enable()
                .set_bit()
                .pause_dbg0()
                .bit(pause_on_debug)
                .pause_dbg1()
                .bit(pause_on_debug)
                .pause_jtag()
                .bit(pause_on_debug)
        });
    }

    fn feed(&mut self) {
        let wd = unsafe { &*WATCHDOG::ptr() };
        // Reloads the counter from the last `LOAD` value; does not touch
        // scratch0..3.
        wd.load.write(|w| unsafe { w.bits(wd.load.read().bits()) });
    }

    fn trigger_immediate_reset(&mut self) {
        let wd = unsafe { &*WATCHDOG::ptr() };
        wd.ctrl.modify(|_, w| w.trigger().set_bit());
    }
}
