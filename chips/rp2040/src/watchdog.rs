// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Watchdog block: the 1 MHz tick generator for the system timer and the
//! forced-reboot path used when core 1 stalls.

use kernel::hil::watchdog::SystemReset;
use kernel::utilities::registers::interfaces::{ReadWriteable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadWrite};
use kernel::utilities::StaticRef;

use crate::psm::Psm;

register_structs! {
    WatchdogRegisters {
        /// Watchdog control
        (0x000 => ctrl: ReadWrite<u32, CTRL::Register>),
        /// Load the watchdog timer
        (0x004 => load: ReadWrite<u32>),
        /// Logs the reason for the last reset
        (0x008 => reason: ReadWrite<u32>),
        /// Scratch registers, preserved across a watchdog reset
        (0x00C => scratch: [ReadWrite<u32>; 8]),
        /// Tick generator control
        (0x02C => tick: ReadWrite<u32, TICK::Register>),
        (0x030 => @END),
    }
}

register_bitfields![u32,
    CTRL [
        /// Trigger a watchdog reset immediately
        TRIGGER OFFSET(31) NUMBITS(1) [],
        /// Start the watchdog timer counting down
        ENABLE OFFSET(30) NUMBITS(1) [],
        /// Pause the watchdog while a debugger is attached
        PAUSE_DBG1 OFFSET(26) NUMBITS(1) [],
        PAUSE_DBG0 OFFSET(25) NUMBITS(1) [],
        PAUSE_JTAG OFFSET(24) NUMBITS(1) [],
        /// Remaining time (read only)
        TIME OFFSET(0) NUMBITS(24) []
    ],
    TICK [
        /// Count of ticks generated (read only)
        COUNT OFFSET(11) NUMBITS(9) [],
        /// Is the tick generator running
        RUNNING OFFSET(10) NUMBITS(1) [],
        /// Start the tick generator
        ENABLE OFFSET(9) NUMBITS(1) [],
        /// Total number of clk_tick cycles before the next tick
        CYCLES OFFSET(0) NUMBITS(9) []
    ]
];

const WATCHDOG_BASE: StaticRef<WatchdogRegisters> =
    unsafe { StaticRef::new(0x40058000 as *const WatchdogRegisters) };

pub struct Watchdog {
    registers: StaticRef<WatchdogRegisters>,
    psm: Psm,
}

impl Watchdog {
    pub const fn new() -> Self {
        Self {
            registers: WATCHDOG_BASE,
            psm: Psm::new(),
        }
    }

    /// Start the tick generator that feeds the system timer; `cycles` is the
    /// crystal frequency in MHz so one tick is one microsecond.
    pub fn start_tick(&self, cycles: u32) {
        self.registers
            .tick
            .write(TICK::CYCLES.val(cycles) + TICK::ENABLE::SET);
    }
}

impl SystemReset for Watchdog {
    fn reboot(&self) -> ! {
        // Reset everything except the oscillators, then fire immediately.
        self.psm.watchdog_reset_all_but_oscillators();
        self.registers.ctrl.modify(CTRL::TRIGGER::SET);
        loop {
            cortex_m::asm::nop();
        }
    }
}
