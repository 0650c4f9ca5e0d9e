// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Core voltage regulator.
//!
//! The on-chip regulator is programmable in 50 mV steps up to 1.30 V. The
//! kernel only ever uses the three setpoints of the frequency/voltage
//! interlock.

use kernel::hil::vreg::{CoreVoltage, VoltageRegulator};
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadWrite};
use kernel::utilities::StaticRef;

register_structs! {
    VregAndChipResetRegisters {
        /// Voltage regulator control and status
        (0x000 => vreg: ReadWrite<u32, VREG::Register>),
        /// Brown-out detection control
        (0x004 => bod: ReadWrite<u32>),
        /// Chip reset control and status
        (0x008 => chip_reset: ReadWrite<u32>),
        (0x00C => @END),
    }
}

register_bitfields![u32,
    VREG [
        /// Regulation status: output voltage within spec
        ROK OFFSET(12) NUMBITS(1) [],
        /// Output voltage select
        VSEL OFFSET(4) NUMBITS(4) [
            V0_80 = 0b0101,
            V1_10 = 0b1011,
            V1_20 = 0b1101,
            V1_30 = 0b1111
        ],
        /// High impedance mode select
        HIZ OFFSET(1) NUMBITS(1) [],
        /// Enable
        EN OFFSET(0) NUMBITS(1) []
    ]
];

const VREG_AND_CHIP_RESET_BASE: StaticRef<VregAndChipResetRegisters> =
    unsafe { StaticRef::new(0x40064000 as *const VregAndChipResetRegisters) };

/// Bound on the regulation-ok wait after a setpoint change.
const ROK_SPIN_LIMIT: u32 = 100_000;

pub struct Vreg {
    registers: StaticRef<VregAndChipResetRegisters>,
}

impl Vreg {
    pub const fn new() -> Self {
        Self {
            registers: VREG_AND_CHIP_RESET_BASE,
        }
    }
}

impl VoltageRegulator for Vreg {
    fn set_voltage(&self, voltage: CoreVoltage) {
        let setpoint = match voltage {
            CoreVoltage::V1_10 => VREG::VSEL::V1_10,
            CoreVoltage::V1_20 => VREG::VSEL::V1_20,
            CoreVoltage::V1_30 => VREG::VSEL::V1_30,
        };
        self.registers.vreg.modify(setpoint);
        // Wait for the rail to settle; bounded, and harmless to fall out of
        // early since the interlock always moves the rail before the load.
        let mut spins: u32 = 0;
        while !self.registers.vreg.is_set(VREG::ROK) {
            spins += 1;
            if spins > ROK_SPIN_LIMIT {
                break;
            }
        }
    }
}
