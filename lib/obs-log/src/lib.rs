//! C2: tokenized binary logging over channel 1.
//!
//! `log!`/`log_0!` are declarative macros, not functions, because the
//! format string has to be hashed at the call site and the argument list is
//! heterogeneous -- the same reason the teacher's `ringbuf_entry!` is a macro
//! rather than a generic function. `MIN_LEVEL` is picked by Cargo feature, so
//! a call site below the compiled-in level disappears entirely rather than
//! being filtered at runtime.

#![cfg_attr(not(test), no_std)]

pub use obs_wire::log::{Arg, Level, MAX_ARGS, SCRATCH_LEN};

use obs_channel::{Channels, CH_LOG};
use obs_hal::CriticalRegion;

/// The compile-time minimum log level. More than one `log-level-*` feature
/// may be enabled at once (e.g. by a dependency); the most verbose wins,
/// exactly like the teacher gating `ringbuf`'s `disabled` feature.
pub const MIN_LEVEL: Level = {
    if cfg!(feature = "log-level-debug") {
        Level::Debug
    } else if cfg!(feature = "log-level-info") {
        Level::Info
    } else if cfg!(feature = "log-level-warn") {
        Level::Warn
    } else if cfg!(feature = "log-level-error") {
        Level::Error
    } else {
        Level::Info
    }
};

/// Returns whether `level` is compiled in. The `log!`/`log_0!` macros guard
/// their body with this; on a target built with a higher `MIN_LEVEL`, the
/// guarded branch is dead code the compiler removes entirely, so the call
/// site "compiles to nothing" per the spec even though there's no literal
/// `#[cfg]` on the call expression itself.
#[inline(always)]
pub const fn level_enabled(level: Level) -> bool {
    (level as u8) <= (MIN_LEVEL as u8)
}

/// Tags a Rust value with the wire-level argument type (signed 32-bit
/// integer or IEEE-754 float) at the call site, so `log!`'s macro expansion
/// never has to guess from the value.
pub trait LogArg {
    fn to_arg(self) -> Arg;
}

impl LogArg for i32 {
    fn to_arg(self) -> Arg {
        Arg::Int(self)
    }
}

impl LogArg for f32 {
    fn to_arg(self) -> Arg {
        Arg::Float(self)
    }
}

/// Encodes and writes one log event. Called by the `log!`/`log_0!` macros;
/// not normally invoked directly. Always takes `<1 us` typical: one FNV-1a
/// pass over the format string, a fixed small serialize, one critical
/// region.
pub fn emit<R: CriticalRegion>(channels: &mut Channels, level: Level, fmt: &str, args: &[Arg]) {
    let mut buf = [0u8; SCRATCH_LEN];
    if let Some(n) = obs_wire::log::encode(fmt, level, args, &mut buf) {
        channels.write::<R>(CH_LOG, &buf[..n]);
    }
}

/// Configures channel 1 with the default 2 KiB buffer (via
/// `obs_channel::init`, which the caller must have already run) and emits
/// the build-identity handshake: the first Info-level event after
/// `log_init`, argc=1, whose sole integer argument is the 32-bit build id.
pub fn init<R: CriticalRegion>(channels: &mut Channels, build_id: u32) {
    emit::<R>(
        channels,
        Level::Info,
        "obs-log build",
        &[Arg::Int(build_id as i32)],
    );
}

/// Logs `fmt` at `level` with up to [`MAX_ARGS`] tagged arguments. Each
/// argument expression must implement [`LogArg`] (`i32` or `f32`); more than
/// `MAX_ARGS` arguments are accepted syntactically but truncated on the wire
/// per the `OversizePacket` policy. `$region` is the `CriticalRegion` impl to
/// bracket the write with, the same turbofish every `Channels::write` call
/// site supplies explicitly.
#[macro_export]
macro_rules! log {
    ($region:ty, $channels:expr, $level:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        if $crate::level_enabled($level) {
            $crate::emit::<$region>($channels, $level, $fmt, &[$($crate::LogArg::to_arg($arg)),*]);
        }
    }};
}

/// The zero-argument fast path: no argument array to build at all.
#[macro_export]
macro_rules! log_0 {
    ($region:ty, $channels:expr, $level:expr, $fmt:literal) => {{
        if $crate::level_enabled($level) {
            $crate::emit::<$region>($channels, $level, $fmt, &[]);
        }
    }};
}
