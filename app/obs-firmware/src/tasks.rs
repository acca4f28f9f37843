//! Minimal task-table, event-group, and byte-store stand-ins.
//!
//! `obs-telemetry`, `obs-watchdog`, and `obs-crashreport` are generic over
//! `obs_hal::{TaskSnapshot, EventGroup, ByteStore}` precisely so this crate
//! never needs to know about a specific RTOS's internals -- the real kernel
//! (task table, preemptive scheduling, and a journaling filesystem) is an
//! external collaborator per the scope notes, the same way `kern` is
//! external to every `app/*` binary in the teacher. This module is the
//! smallest adapter that satisfies those trait boundaries so the boot
//! sequence below is a complete, wireable program rather than a sketch: a
//! fixed-size software task table updated cooperatively by the super-loop in
//! `main`, and an in-RAM placeholder for the crash record's byte store. A
//! production build swaps both for the real RTOS and the real journaling
//! filesystem without touching any other crate in this workspace.

use core::sync::atomic::{AtomicU32, Ordering};

use obs_hal::{ByteStore, ByteStoreFile, Checkin, EventGroup, TaskRecord, TaskSnapshot};

pub const TASK_TELEMETRY: u8 = 0;
pub const TASK_WATCHDOG_MONITOR: u8 = 1;
pub const TASK_WORKER: u8 = 2;
const TASK_COUNT: usize = 3;

bitflags::bitflags! {
    /// Cooperative-watchdog registration bits, one per long-running task.
    /// Compile-time `WDG_BIT_*` constants per the glossary.
    pub struct WdgBits: u32 {
        const WDG_BIT_TELEMETRY = 1 << 0;
        const WDG_BIT_WORKER = 1 << 1;
    }
}

/// Per-task cumulative runtime, advanced by the super-loop each time a task
/// body runs. Stands in for the RTOS's own per-task runtime counters, which
/// in a real deployment are driven by the scheduler's context-switch
/// accounting rather than incremented by hand.
struct TaskTable {
    runtime: [AtomicU32; TASK_COUNT],
    aggregate: AtomicU32,
    free_heap: AtomicU32,
    min_free_heap: AtomicU32,
}

static TABLE: TaskTable = TaskTable {
    runtime: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
    aggregate: AtomicU32::new(0),
    free_heap: AtomicU32::new(0),
    min_free_heap: AtomicU32::new(u32::MAX),
};

/// Charges `ticks` of runtime to `task`, advancing the aggregate counter in
/// lockstep. Called from the super-loop after each cooperative task body
/// runs, standing in for the RTOS's own context-switch accounting.
pub fn charge_runtime(task: u8, ticks: u32) {
    TABLE.runtime[task as usize].fetch_add(ticks, Ordering::Relaxed);
    TABLE.aggregate.fetch_add(ticks, Ordering::Relaxed);
}

pub fn record_heap(free_bytes: u32) {
    TABLE.free_heap.store(free_bytes, Ordering::Relaxed);
    let prev_min = TABLE.min_free_heap.load(Ordering::Relaxed);
    if free_bytes < prev_min {
        TABLE.min_free_heap.store(free_bytes, Ordering::Relaxed);
    }
}

pub struct SimTaskSnapshot;

impl TaskSnapshot for SimTaskSnapshot {
    fn snapshot(&self, out: &mut [TaskRecord]) -> usize {
        let n = out.len().min(TASK_COUNT);
        for (i, slot) in out.iter_mut().enumerate().take(n) {
            *slot = TaskRecord {
                task_number: i as u8,
                state: 1,
                priority: i as u8,
                stack_hwm_words: 0,
                runtime_ticks: TABLE.runtime[i].load(Ordering::Relaxed),
            };
        }
        n
    }

    fn aggregate_runtime_ticks(&self) -> u32 {
        TABLE.aggregate.load(Ordering::Relaxed)
    }

    fn current_task_number(&self) -> u16 {
        TASK_WORKER as u16
    }

    fn current_core_id(&self) -> u8 {
        0
    }

    fn free_heap_bytes(&self) -> u32 {
        TABLE.free_heap.load(Ordering::Relaxed)
    }

    fn min_free_heap_bytes(&self) -> u32 {
        TABLE.min_free_heap.load(Ordering::Relaxed)
    }
}

/// A single-core-cooperative event group: `set` ORs bits in under an
/// interrupt-free section (ARMv6-M has no LDREX/STREX, so a plain
/// load-modify-store needs the section to stay atomic with respect to any
/// ISR), and `wait_all` polls rather than blocking, since this harness has
/// no preemptive scheduler to suspend into. `timeout_ms` is honored via
/// `obs_hal::Clock`-free approximation: the caller (the super-loop) only
/// ever calls `wait_all` once per monitor period, after every registered
/// task has had a chance to check in earlier in the same loop iteration, so
/// the poll resolves in one pass in the common case.
pub struct SimEventGroup {
    bits: AtomicU32,
}

impl SimEventGroup {
    pub const fn new() -> Self {
        Self { bits: AtomicU32::new(0) }
    }
}

impl EventGroup for SimEventGroup {
    fn set(&self, bits: u32) {
        critical_section::with(|_| {
            let prev = self.bits.load(Ordering::Relaxed);
            self.bits.store(prev | bits, Ordering::Relaxed);
        });
    }

    fn wait_all(&self, mask: u32, _timeout_ms: u32) -> Result<(), u32> {
        let observed = self.bits.load(Ordering::Relaxed) & mask;
        if observed == mask {
            critical_section::with(|_| {
                let prev = self.bits.load(Ordering::Relaxed);
                self.bits.store(prev & !mask, Ordering::Relaxed);
            });
            Ok(())
        } else {
            Err(observed)
        }
    }
}

/// Lets the telemetry supervisor check in with the cooperative watchdog
/// without `obs-telemetry` depending on `obs-watchdog` directly.
pub struct TelemetryCheckin<'a>(pub &'a SimEventGroup);

impl Checkin for TelemetryCheckin<'_> {
    fn checkin(&self) {
        self.0.set(WdgBits::WDG_BIT_TELEMETRY.bits());
    }
}

/// An in-RAM placeholder for the journaling filesystem the real crash
/// reporter persists to; the filesystem itself is an external collaborator
/// per the scope notes, so this workspace only needs something that
/// satisfies the trait boundary for `obs-crashreport` to exercise against.
/// Its contents do not survive a reset -- a real deployment's persisted
/// record does, because it lives in flash/a real journaling filesystem
/// rather than SRAM. `obs_hal::ByteStore::File` carries no lifetime, so the
/// file handle addresses the backing buffer directly (as the real
/// filesystem driver's own handle would) rather than borrowing the store.
pub struct RamByteStore {
    buf: &'static mut [u8; 256],
}

impl RamByteStore {
    pub fn new() -> Self {
        let buf = mutable_statics::mutable_statics! {
            static mut CRASH_RECORD_BUF: [u8; 256] = [|| 0; _];
        };
        Self { buf }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamStoreError;

pub struct RamFile {
    ptr: *mut u8,
    cap: usize,
    len: usize,
}

impl ByteStoreFile for RamFile {
    type Error = RamStoreError;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.len + bytes.len() > self.cap {
            return Err(RamStoreError);
        }
        // Safety: `ptr` addresses the store's 'static backing buffer;
        // `len + bytes.len() <= cap` was just checked above.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(self.len), bytes.len());
        }
        self.len += bytes.len();
        Ok(())
    }

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ByteStore for RamByteStore {
    type File = RamFile;
    type Error = RamStoreError;

    fn ensure_dir(&mut self, _path: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn create_truncate(&mut self, _path: &str) -> Result<Self::File, Self::Error> {
        Ok(RamFile { ptr: self.buf.as_mut_ptr(), cap: self.buf.len(), len: 0 })
    }
}
