// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Power-on state machine: per-block power sequencing.

use kernel::utilities::registers::interfaces::{ReadWriteable, Readable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;

register_structs! {
    pub PsmRegisters {
        /// Force block out of reset (i.e. power it on)
        (0x000 => frce_on: ReadWrite<u32, PSM::Register>),
        /// Force into reset (i.e. power it off)
        (0x004 => frce_off: ReadWrite<u32, PSM::Register>),
        /// Set to 1 if the block should be reset when the watchdog fires
        (0x008 => wdsel: ReadWrite<u32, PSM::Register>),
        /// Is the block being powered up
        (0x00C => done: ReadOnly<u32, PSM::Register>),
        (0x010 => @END),
    }
}

register_bitfields![u32,
    pub PSM [
        PROC1 OFFSET(16) NUMBITS(1) [],
        PROC0 OFFSET(15) NUMBITS(1) [],
        SIO OFFSET(14) NUMBITS(1) [],
        VREG_AND_CHIP_RESET OFFSET(13) NUMBITS(1) [],
        XIP OFFSET(12) NUMBITS(1) [],
        SRAM5 OFFSET(11) NUMBITS(1) [],
        SRAM4 OFFSET(10) NUMBITS(1) [],
        SRAM3 OFFSET(9) NUMBITS(1) [],
        SRAM2 OFFSET(8) NUMBITS(1) [],
        SRAM1 OFFSET(7) NUMBITS(1) [],
        SRAM0 OFFSET(6) NUMBITS(1) [],
        ROM OFFSET(5) NUMBITS(1) [],
        BUSFABRIC OFFSET(4) NUMBITS(1) [],
        RESETS OFFSET(3) NUMBITS(1) [],
        CLOCKS OFFSET(2) NUMBITS(1) [],
        XOSC OFFSET(1) NUMBITS(1) [],
        ROSC OFFSET(0) NUMBITS(1) []
    ]
];

const PSM_BASE: StaticRef<PsmRegisters> =
    unsafe { StaticRef::new(0x40010000 as *const PsmRegisters) };

pub struct Psm {
    registers: StaticRef<PsmRegisters>,
}

impl Psm {
    pub const fn new() -> Self {
        Self {
            registers: PSM_BASE,
        }
    }

    /// Power-cycle core 1 so it parks in the bootrom launch handshake.
    pub fn reset_core1(&self) {
        self.registers.frce_off.modify(PSM::PROC1::SET);
        while !self.registers.frce_off.is_set(PSM::PROC1) {}
        self.registers.frce_off.modify(PSM::PROC1::CLEAR);
    }

    /// Arrange for a watchdog trigger to reset everything except the
    /// oscillators.
    pub fn watchdog_reset_all_but_oscillators(&self) {
        self.registers.wdsel.modify(
            PSM::PROC1::SET
                + PSM::PROC0::SET
                + PSM::SIO::SET
                + PSM::VREG_AND_CHIP_RESET::SET
                + PSM::XIP::SET
                + PSM::SRAM5::SET
                + PSM::SRAM4::SET
                + PSM::SRAM3::SET
                + PSM::SRAM2::SET
                + PSM::SRAM1::SET
                + PSM::SRAM0::SET
                + PSM::ROM::SET
                + PSM::BUSFABRIC::SET
                + PSM::RESETS::SET
                + PSM::CLOCKS::SET,
        );
    }
}
