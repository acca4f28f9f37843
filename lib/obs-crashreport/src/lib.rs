//! C5: post-boot crash detection and reporting.
//!
//! Runs once, on the boot core, before application tasks start. Decodes
//! whatever [`obs_faultcap`] (or `obs-watchdog`) left in the scratch
//! registers, prints a human-readable summary to channel 0, persists a
//! record to the byte store, and clears `scratch[0]` so the same crash is
//! never reported twice.

#![cfg_attr(not(test), no_std)]

use core::fmt::Write as _;

use obs_channel::{Channels, CH_TERMINAL};
use obs_faultcap::{
    SENTINEL_ALLOC_FAIL, SENTINEL_FAULT, SENTINEL_STACK_OVERFLOW, SENTINEL_WATCHDOG_TIMEOUT,
};
use obs_hal::{ByteStore, ByteStoreFile, CriticalRegion, ResetCause, ResetReason, ScratchRegisters};

/// Directory the crash record lives under; created (idempotently) before
/// the file itself.
pub const CRASH_DIR: &str = "/crash";
/// The single well-known path every crash overwrites.
pub const CRASH_PATH: &str = "/crash/latest.json";

/// Outcome of one boot's crash-reporter run, mirroring the §4.5 state
/// machine's terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoCrash,
    Reported { persisted: bool },
    WatchdogUnknown,
}

const MAX_LINE: usize = 160;

/// Formats the human-readable summary and the persisted-record JSON body
/// for one decoded scratch record. Returns `None` if `magic` isn't a
/// sentinel this crate knows how to decode.
fn format_record(
    magic: u32,
    s1: u32,
    s2: u32,
    s3: u32,
) -> Option<(heapless::String<MAX_LINE>, heapless::String<MAX_LINE>)> {
    let mut summary = heapless::String::new();
    let mut json = heapless::String::new();

    match magic {
        SENTINEL_FAULT => {
            let pc = s1;
            let lr = s2;
            let xpsr = s3 & 0xFFFF_0000;
            let core_id = (s3 >> 12) & 0xF;
            let task_number = s3 & 0xFFF;
            let _ = write!(
                summary,
                "crash: fault pc=0x{pc:08X} lr=0x{lr:08X} xpsr=0x{xpsr:08X} core={core_id} task={task_number}"
            );
            let _ = write!(
                json,
                "{{\"magic\":\"0x{magic:08X}\",\"pc\":\"0x{pc:08X}\",\"lr\":\"0x{lr:08X}\",\"xpsr\":\"0x{xpsr:08X}\",\"core_id\":{core_id},\"task_number\":{task_number},\"version\":1}}"
            );
        }
        SENTINEL_STACK_OVERFLOW => {
            let core_id = (s3 >> 12) & 0xF;
            let task_number = s3 & 0xFFF;
            let _ = write!(summary, "crash: stack overflow core={core_id} task={task_number}");
            let _ = write!(
                json,
                "{{\"magic\":\"0x{magic:08X}\",\"core_id\":{core_id},\"task_number\":{task_number},\"version\":1}}"
            );
        }
        SENTINEL_ALLOC_FAIL => {
            let free_heap = s1;
            let core_id = (s3 >> 12) & 0xF;
            let _ = write!(summary, "crash: alloc failure free_heap={free_heap} core={core_id}");
            let _ = write!(
                json,
                "{{\"magic\":\"0x{magic:08X}\",\"free_heap\":{free_heap},\"core_id\":{core_id},\"version\":1}}"
            );
        }
        SENTINEL_WATCHDOG_TIMEOUT => {
            let missing = s1;
            let ticks = s2;
            let registered = s3;
            let _ = write!(
                summary,
                "crash: cooperative watchdog timeout missing=0x{missing:06X} tick={ticks} registered=0x{registered:06X}"
            );
            let _ = write!(
                json,
                "{{\"magic\":\"0x{magic:08X}\",\"missing_bits\":\"0x{missing:06X}\",\"tick_count\":{ticks},\"registered_bits\":\"0x{registered:06X}\",\"version\":1}}"
            );
        }
        _ => return None,
    }

    Some((summary, json))
}

/// Runs the §4.5 state machine once. `R` brackets channel writes the same
/// way every other channel 0/1/2 writer does.
pub fn run<Reset: ResetCause, Scratch: ScratchRegisters, Store: ByteStore, R: CriticalRegion>(
    channels: &mut Channels,
    reset: &Reset,
    scratch: &mut Scratch,
    store: &mut Store,
) -> Outcome {
    if reset.reset_reason() != ResetReason::Watchdog {
        return Outcome::NoCrash;
    }

    let magic = scratch.read(0);
    if magic == 0 {
        return Outcome::NoCrash;
    }

    let s1 = scratch.read(1);
    let s2 = scratch.read(2);
    let s3 = scratch.read(3);

    let Some((summary, json)) = format_record(magic, s1, s2, s3) else {
        obs_log::log_0!(R, channels, obs_log::Level::Warn, "watchdog reboot without crash data");
        channels.write::<R>(CH_TERMINAL, b"watchdog reboot without crash data\n");
        scratch.write(0, 0);
        return Outcome::WatchdogUnknown;
    };

    channels.write::<R>(CH_TERMINAL, summary.as_bytes());
    channels.write::<R>(CH_TERMINAL, b"\n");

    let persisted = persist(store, json.as_bytes()).is_ok();
    if !persisted {
        obs_log::log_0!(R, channels, obs_log::Level::Warn, "crash record not persisted");
    }

    // Clearing is the single source of truth for "this crash has been
    // handled"; done regardless of whether persistence succeeded, because
    // the on-device report above is already valid and re-reporting the
    // same crash forever would be worse than losing the file.
    scratch.write(0, 0);

    Outcome::Reported { persisted }
}

fn persist<Store: ByteStore>(store: &mut Store, json: &[u8]) -> Result<(), Store::Error> {
    store.ensure_dir(CRASH_DIR)?;
    let mut file = store.create_truncate(CRASH_PATH)?;
    file.write(json)?;
    file.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeScratch([u32; 4]);
    impl ScratchRegisters for FakeScratch {
        fn read(&self, index: usize) -> u32 {
            self.0[index]
        }
        fn write(&mut self, index: usize, value: u32) {
            self.0[index] = value;
        }
    }

    struct FakeReset(ResetReason);
    impl ResetCause for FakeReset {
        fn reset_reason(&self) -> ResetReason {
            self.0
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    struct StoreError;

    struct FakeFile {
        contents: heapless::Vec<u8, 256>,
        fail: bool,
    }
    impl ByteStoreFile for FakeFile {
        type Error = StoreError;
        fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError);
            }
            self.contents.extend_from_slice(bytes).map_err(|_| StoreError)
        }
        fn close(self) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError);
            }
            Ok(())
        }
    }

    struct FakeStore {
        fail: bool,
    }
    impl ByteStore for FakeStore {
        type File = FakeFile;
        type Error = StoreError;
        fn ensure_dir(&mut self, _path: &str) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError);
            }
            Ok(())
        }
        fn create_truncate(&mut self, _path: &str) -> Result<FakeFile, StoreError> {
            if self.fail {
                return Err(StoreError);
            }
            Ok(FakeFile { contents: heapless::Vec::new(), fail: self.fail })
        }
    }

    struct NoRegion;
    impl CriticalRegion for NoRegion {
        type Guard = ();
        fn enter() -> Self::Guard {}
    }

    #[test]
    fn non_watchdog_reset_is_no_crash() {
        let mut channels = obs_channel::init();
        let reset = FakeReset(ResetReason::PowerOn);
        let mut scratch = FakeScratch([obs_faultcap::SENTINEL_FAULT, 0, 0, 0]);
        let mut store = FakeStore { fail: false };
        let outcome = run::<_, _, _, NoRegion>(&mut channels, &reset, &mut scratch, &mut store);
        assert_eq!(outcome, Outcome::NoCrash);
        // scratch untouched: a power-on reset never reads the crash record.
        assert_eq!(scratch.read(0), obs_faultcap::SENTINEL_FAULT);
    }

    #[test]
    fn fault_crash_is_decoded_reported_persisted_and_cleared() {
        let mut channels = obs_channel::init();
        let reset = FakeReset(ResetReason::Watchdog);
        let mut scratch = FakeScratch([
            obs_faultcap::SENTINEL_FAULT,
            0x2000_1234,
            0x1000_1230,
            0x6100_1007,
        ]);
        let mut store = FakeStore { fail: false };

        let outcome = run::<_, _, _, NoRegion>(&mut channels, &reset, &mut scratch, &mut store);
        assert_eq!(outcome, Outcome::Reported { persisted: true });
        assert_eq!(scratch.read(0), 0, "scratch[0] must be cleared after reporting");

        let mut buf = [0u8; 128];
        let n = channels.drain(CH_TERMINAL, &mut buf);
        let text = core::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.contains("0x20001234"), "report: {text}");
    }

    #[test]
    fn reporter_idempotence_second_boot_is_no_crash() {
        let mut channels = obs_channel::init();
        let reset = FakeReset(ResetReason::Watchdog);
        let mut scratch = FakeScratch([
            obs_faultcap::SENTINEL_FAULT,
            0x2000_1234,
            0x1000_1230,
            0x6100_1007,
        ]);
        let mut store = FakeStore { fail: false };

        let first = run::<_, _, _, NoRegion>(&mut channels, &reset, &mut scratch, &mut store);
        assert!(matches!(first, Outcome::Reported { .. }));

        // Unchanged scratch (cleared by the first run) on a second boot.
        let second = run::<_, _, _, NoRegion>(&mut channels, &reset, &mut scratch, &mut store);
        assert_eq!(second, Outcome::NoCrash);
    }

    #[test]
    fn byte_store_failure_still_reports_and_clears() {
        let mut channels = obs_channel::init();
        let reset = FakeReset(ResetReason::Watchdog);
        let mut scratch = FakeScratch([obs_faultcap::SENTINEL_ALLOC_FAIL, 4096, 0, 1 << 12]);
        let mut store = FakeStore { fail: true };

        let outcome = run::<_, _, _, NoRegion>(&mut channels, &reset, &mut scratch, &mut store);
        assert_eq!(outcome, Outcome::Reported { persisted: false });
        assert_eq!(scratch.read(0), 0);
    }

    #[test]
    fn unknown_sentinel_reports_watchdog_unknown() {
        let mut channels = obs_channel::init();
        let reset = FakeReset(ResetReason::Watchdog);
        let mut scratch = FakeScratch([0xABCD_1234, 0, 0, 0]);
        let mut store = FakeStore { fail: false };

        let outcome = run::<_, _, _, NoRegion>(&mut channels, &reset, &mut scratch, &mut store);
        assert_eq!(outcome, Outcome::WatchdogUnknown);
    }
}
