// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! System timer: a 64-bit microsecond counter.
//!
//! The counter runs from the watchdog tick generator, which the board starts
//! at boot ([`crate::watchdog::Watchdog::start_tick`]). No alarms are used;
//! the control path is polled, so the timer only provides monotonic reads
//! and busy-wait delays.

use kernel::hil::time::ClockSource;
use kernel::utilities::registers::interfaces::Readable;
use kernel::utilities::registers::{register_structs, ReadOnly, ReadWrite, WriteOnly};
use kernel::utilities::StaticRef;

register_structs! {
    TimerRegisters {
        /// Write to bits 63:32 of time, timelw first
        (0x000 => timehw: WriteOnly<u32>),
        /// Write to bits 31:0 of time
        (0x004 => timelw: WriteOnly<u32>),
        /// Read from bits 63:32 of time (latched pair with timelr)
        (0x008 => timehr: ReadOnly<u32>),
        /// Read from bits 31:0 of time
        (0x00C => timelr: ReadOnly<u32>),
        (0x010 => _reserved0),
        /// Raw read from bits 63:32 of time (no side effects)
        (0x024 => timerawh: ReadOnly<u32>),
        /// Raw read from bits 31:0 of time (no side effects)
        (0x028 => timerawl: ReadOnly<u32>),
        /// Set bits high to enable pause when a debug port is active
        (0x02C => dbgpause: ReadWrite<u32>),
        /// Set high to pause the timer
        (0x030 => pause: ReadWrite<u32>),
        (0x034 => _reserved1),
        (0x044 => @END),
    }
}

const TIMER_BASE: StaticRef<TimerRegisters> =
    unsafe { StaticRef::new(0x40054000 as *const TimerRegisters) };

pub struct RPTimer {
    registers: StaticRef<TimerRegisters>,
}

impl RPTimer {
    pub const fn new() -> Self {
        Self {
            registers: TIMER_BASE,
        }
    }

    /// Side-effect-free 64-bit read: the raw halves are sampled until the
    /// high word is consistent, so both cores may call this concurrently.
    fn raw_us(&self) -> u64 {
        loop {
            let high = self.registers.timerawh.get();
            let low = self.registers.timerawl.get();
            if self.registers.timerawh.get() == high {
                return ((high as u64) << 32) | low as u64;
            }
        }
    }
}

impl ClockSource for RPTimer {
    fn now_us(&self) -> u64 {
        self.raw_us()
    }

    fn delay_us(&self, us: u32) {
        let deadline = self.raw_us() + us as u64;
        while self.raw_us() < deadline {}
    }
}
