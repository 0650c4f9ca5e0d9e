// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Crystal oscillator.

use kernel::utilities::registers::interfaces::{ReadWriteable, Readable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadWrite};
use kernel::utilities::StaticRef;

use crate::XOSC_FREQ_KHZ;

register_structs! {
    XoscRegisters {
        /// Crystal Oscillator Control
        (0x000 => ctrl: ReadWrite<u32, CTRL::Register>),
        /// Crystal Oscillator Status
        (0x004 => status: ReadWrite<u32, STATUS::Register>),
        /// Dormant mode control; stop the PLLs before using it
        (0x008 => dormant: ReadWrite<u32>),
        /// Controls the startup delay
        (0x00C => startup: ReadWrite<u32, STARTUP::Register>),
        (0x010 => _reserved0),
        /// Down counter running at the xosc frequency
        (0x01C => count: ReadWrite<u32>),
        (0x020 => @END),
    }
}

register_bitfields![u32,
    CTRL [
        /// The 12-bit code gives some protection against accidental writes
        ENABLE OFFSET(12) NUMBITS(12) [
            ENABLE = 0xfab,
            DISABLE = 0xd1e
        ],
        /// Frequency range. This resets to 0xAA0 and cannot be changed.
        FREQ_RANGE OFFSET(0) NUMBITS(12) [
            _1_15MHZ = 0xaa0
        ]
    ],
    STATUS [
        /// Oscillator is running and stable
        STABLE OFFSET(31) NUMBITS(1) [],
        /// An invalid value has been written to CTRL_ENABLE or DORMANT
        BADWRITE OFFSET(24) NUMBITS(1) [],
        /// Oscillator is enabled but not necessarily running and stable
        ENABLED OFFSET(12) NUMBITS(1) []
    ],
    STARTUP [
        /// Multiplies the startup_delay by 4
        X4 OFFSET(20) NUMBITS(1) [],
        /// in multiples of 256*xtal_period
        DELAY OFFSET(0) NUMBITS(14) []
    ]
];

const XOSC_BASE: StaticRef<XoscRegisters> =
    unsafe { StaticRef::new(0x40024000 as *const XoscRegisters) };

pub struct Xosc {
    registers: StaticRef<XoscRegisters>,
}

impl Xosc {
    pub const fn new() -> Self {
        Self {
            registers: XOSC_BASE,
        }
    }

    /// Start the oscillator and wait for it to report stable.
    pub fn init(&self) {
        self.registers.ctrl.modify(CTRL::FREQ_RANGE::_1_15MHZ);
        // ~1 ms of startup grace, expressed in 256-cycle units.
        let startup_delay = (XOSC_FREQ_KHZ + 128) / 256;
        self.registers
            .startup
            .modify(STARTUP::DELAY.val(startup_delay));
        self.registers.ctrl.modify(CTRL::ENABLE::ENABLE);
        while !self.registers.status.is_set(STATUS::STABLE) {}
    }

    pub fn disable(&self) {
        self.registers.ctrl.modify(CTRL::ENABLE::DISABLE);
    }
}
