//! C1: three named, host-read/device-write shared-memory up-channels.
//!
//! Each channel wraps a [`circq::CircQ`] over a statically allocated,
//! process-lifetime backing buffer handed out once through
//! `mutable_statics!`, following the same first-mover singleton discipline
//! the teacher uses for its own per-task scratch buffers (e.g.
//! `drv/ignition-flash`'s `PING`/`PONG` pair). `write` is bracketed by a
//! caller-supplied [`obs_hal::CriticalRegion`] guard so the copy-in and
//! pointer advance happen atomically with respect to the peer core.

#![cfg_attr(not(test), no_std)]

use circq::CircQ;
use mutable_statics::mutable_statics;
use obs_hal::CriticalRegion;

/// Channel 0: opaque UTF-8 byte stream, human-readable passthrough.
pub const CH_TERMINAL: usize = 0;
/// Channel 1: tokenized log packets (`obs-log`).
pub const CH_LOG: usize = 1;
/// Channel 2: telemetry vitals packets (`obs-telemetry`).
pub const CH_VITALS: usize = 2;

pub const CHANNEL_COUNT: usize = 3;

pub const DEFAULT_TERMINAL_BUF_LEN: usize = 256;
pub const DEFAULT_LOG_BUF_LEN: usize = 2048;
pub const DEFAULT_VITALS_BUF_LEN: usize = 512;

/// Channel names as seen by the host; at most 8 ASCII bytes, no embedded NUL.
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = ["Terminal", "AiLog", "Vitals"];

static_assertions::const_assert!(CHANNEL_NAMES[0].len() <= 8);
static_assertions::const_assert!(CHANNEL_NAMES[1].len() <= 8);
static_assertions::const_assert!(CHANNEL_NAMES[2].len() <= 8);

/// The three up-channels, created once by [`init`] and handed out as
/// `&'static mut` to the logger, telemetry supervisor, and whatever drives
/// channel 0 passthrough.
pub struct Channels {
    queues: [CircQ<'static>; CHANNEL_COUNT],
    /// Packets refused for lack of room, per channel. Monotonic for the
    /// life of the process; read by diagnostics/tests, never reset.
    dropped: [u32; CHANNEL_COUNT],
}

impl Channels {
    /// Writes `bytes` to `channel` under a critical region. Non-blocking: if
    /// the channel lacks room for the whole packet, nothing is written and
    /// `0` is returned. Never writes a partial packet.
    pub fn write<R: CriticalRegion>(&mut self, channel: usize, bytes: &[u8]) -> usize {
        let _guard = R::enter();
        match self.queues[channel].enqueue(bytes) {
            Ok(()) => bytes.len(),
            Err(_) => {
                self.dropped[channel] = self.dropped[channel].saturating_add(1);
                0
            }
        }
    }

    /// Bytes currently queued but not yet drained by the host, for
    /// diagnostics/tests.
    pub fn available(&self, channel: usize) -> usize {
        self.queues[channel].available()
    }

    /// Packets refused on `channel` so far for lack of room.
    pub fn dropped(&self, channel: usize) -> u32 {
        self.dropped[channel]
    }

    /// Drains up to `dest.len()` bytes from `channel` into `dest`, returning
    /// the number of bytes copied. Test/host-harness use only; the real
    /// consumer is the out-of-band debug-probe transport.
    pub fn drain(&mut self, channel: usize, dest: &mut [u8]) -> usize {
        let n = self.queues[channel].available().min(dest.len());
        if n == 0 {
            return 0;
        }
        self.queues[channel].dequeue_into(&mut dest[..n]).unwrap();
        n
    }
}

/// Configures the three channels with their default buffer sizes. Must be
/// called exactly once; a second call panics, per the `mutable_statics!`
/// first-mover contract (mirrors the teacher's singleton-buffer idiom).
pub fn init() -> Channels {
    let (terminal_buf, log_buf, vitals_buf) = mutable_statics! {
        static mut TERMINAL_BUF: [u8; DEFAULT_TERMINAL_BUF_LEN] = [|| 0; _];
        static mut LOG_BUF: [u8; DEFAULT_LOG_BUF_LEN] = [|| 0; _];
        static mut VITALS_BUF: [u8; DEFAULT_VITALS_BUF_LEN] = [|| 0; _];
    };

    Channels {
        queues: [
            CircQ::new(terminal_buf),
            CircQ::new(log_buf),
            CircQ::new(vitals_buf),
        ],
        dropped: [0; CHANNEL_COUNT],
    }
}
