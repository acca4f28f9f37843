//! C3: periodic per-task vitals sampling, emitted as fixed-layout binary
//! packets over channel 2.
//!
//! The supervisor is generic over [`obs_hal::TaskSnapshot`] so this crate
//! carries no hard dependency on a specific RTOS's task table -- the
//! firmware binary supplies the concrete adapter, the same generalization
//! the teacher applies to board support in `app/*` versus logic in `kern`.

#![cfg_attr(not(test), no_std)]

use obs_channel::{Channels, CH_VITALS};
use obs_hal::{Checkin, Clock, CriticalRegion, TaskRecord, TaskSnapshot};
use obs_wire::telemetry::{MAX_PACKET_LEN, MAX_TASKS};
use obs_wire::TaskEntry;
use zerocopy::U16;

pub const DEFAULT_SAMPLE_INTERVAL_MS: u32 = 500;

/// The runtime counter is a free-running 1 MHz hardware timer; one
/// millisecond is this many ticks.
const TICKS_PER_MS: u32 = 1_000;

/// Holds the previous-sample state needed to compute CPU% deltas. This is
/// the only mutable state C3 owns; it lives for process lifetime in the
/// firmware binary's static storage.
pub struct Supervisor {
    prev_runtime_ticks: [u32; MAX_TASKS],
    prev_aggregate_ticks: u32,
    warmed_up: bool,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub const fn new() -> Self {
        Self {
            prev_runtime_ticks: [0; MAX_TASKS],
            prev_aggregate_ticks: 0,
            warmed_up: false,
        }
    }

    /// Samples kernel state once and writes one vitals packet to channel 2.
    /// Exposed separately from [`Self::run_forever`] so tests can drive
    /// individual samples deterministically.
    pub fn sample_once<T: TaskSnapshot, R: CriticalRegion>(
        &mut self,
        channels: &mut Channels,
        tasks: &T,
        timestamp_ticks: u32,
    ) {
        let mut records = [TaskRecord::default(); MAX_TASKS];
        let n = tasks.snapshot(&mut records).min(MAX_TASKS);
        let aggregate_ticks = tasks.aggregate_runtime_ticks();
        // Wrap-safe: the counter wraps every ~71 minutes, so this must never
        // go through a signed intermediate.
        let aggregate_delta = aggregate_ticks.wrapping_sub(self.prev_aggregate_ticks);

        let mut entries: heapless::Vec<TaskEntry, MAX_TASKS> = heapless::Vec::new();
        for rec in &records[..n] {
            let idx = (rec.task_number as usize) % MAX_TASKS;
            let prev = self.prev_runtime_ticks[idx];
            let delta = rec.runtime_ticks.wrapping_sub(prev);
            self.prev_runtime_ticks[idx] = rec.runtime_ticks;

            let cpu_pct = if !self.warmed_up || aggregate_delta == 0 {
                0
            } else {
                (((delta as u64) * 100) / aggregate_delta as u64).min(100) as u8
            };
            let runtime_ms = (delta / TICKS_PER_MS).min(u16::MAX as u32) as u16;

            let _ = entries.push(TaskEntry {
                task_number: rec.task_number,
                state: rec.state,
                priority: rec.priority,
                stack_hwm: U16::new(rec.stack_hwm_words),
                cpu_pct,
                runtime_ms: U16::new(runtime_ms),
            });
        }

        self.prev_aggregate_ticks = aggregate_ticks;
        self.warmed_up = true;

        let mut buf = [0u8; MAX_PACKET_LEN];
        if let Some(written) = obs_wire::telemetry::encode(
            timestamp_ticks,
            tasks.free_heap_bytes(),
            tasks.min_free_heap_bytes(),
            &entries,
            &mut buf,
        ) {
            channels.write::<R>(CH_VITALS, &buf[..written]);
        }
    }

    /// Runs forever at `interval_ms` cadence using an absolute-deadline
    /// delay, so sample-to-sample jitter never accumulates drift. Checks in
    /// with `checkin` after every sample. Never returns; this is the task
    /// body the firmware binary spawns after `telemetry_init`.
    pub fn run_forever<T: TaskSnapshot, C: Clock, R: CriticalRegion, K: Checkin>(
        &mut self,
        channels: &mut Channels,
        tasks: &T,
        clock: &C,
        checkin: &K,
        interval_ms: u32,
    ) -> ! {
        let period_ticks = interval_ms.wrapping_mul(TICKS_PER_MS);
        let mut deadline = clock.now_ticks().wrapping_add(period_ticks);
        loop {
            clock.delay_until(deadline);
            let now = clock.now_ticks();
            self.sample_once::<T, R>(channels, tasks, now);
            checkin.checkin();
            deadline = deadline.wrapping_add(period_ticks);
        }
    }
}
