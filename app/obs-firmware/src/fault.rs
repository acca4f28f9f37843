//! Wires `obs-faultcap`'s RAM-resident exception shim into the real
//! `HardFault` vector.
//!
//! `FaultEntryShim` (defined in `obs-faultcap`) is naked Thumb assembly that
//! reads the stacked frame pointer out of `lr`/`EXC_RETURN` and branches to
//! `fault_entry_rust`, a fixed symbol this binary defines below. `HardFault`
//! itself has to be a second naked trampoline rather than an ordinary Rust
//! function: an ordinary function's prologue would clobber `lr` before the
//! shim ever gets a chance to read it. A bare `b` leaves `lr` untouched, so
//! the vector table can point straight at this `HardFault` symbol and the
//! shim still sees the real exception-entry `lr`.

use obs_faultcap::capture_and_reboot;

use crate::hal::{Rp2040HwWatchdog, Rp2040ScratchRegisters};
use crate::tasks::SimTaskSnapshot;

#[cfg(all(target_arch = "arm", not(test)))]
extern "C" {
    #[allow(dead_code)]
    fn FaultEntryShim();
}

#[cfg(all(target_arch = "arm", not(test)))]
core::arch::global_asm!(
    ".pushsection .ramcode.hard_fault, \"ax\"",
    ".global HardFault",
    ".thumb_func",
    "HardFault:",
    "    b FaultEntryShim",
    ".popsection",
);

/// The fixed symbol `FaultEntryShim` branches to. Lives in `.ramcode`
/// alongside the shim so a fault caused by flash corruption can't take this
/// handler down with it.
///
/// # Safety
/// Only ever reached from `FaultEntryShim` with the frame pointer it
/// computed from `EXC_RETURN`; never called directly from Rust.
#[no_mangle]
#[link_section = ".ramcode.fault_entry_rust"]
unsafe extern "C" fn fault_entry_rust(sp: *const u32) -> ! {
    let mut scratch = Rp2040ScratchRegisters;
    let mut hw = Rp2040HwWatchdog;
    let tasks = SimTaskSnapshot;
    capture_and_reboot(sp, &mut scratch, &mut hw, &tasks)
}
