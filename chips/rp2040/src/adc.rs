// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! SAR ADC, polled single conversions, plus the on-die temperature sensor.

use kernel::hil::temperature::TemperatureSource;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadWrite};
use kernel::utilities::StaticRef;

register_structs! {
    AdcRegisters {
        /// ADC Control and Status
        (0x000 => cs: ReadWrite<u32, CS::Register>),
        /// Result of most recent ADC conversion
        (0x004 => result: ReadWrite<u32, RESULT::Register>),
        /// FIFO control and status
        (0x008 => fcs: ReadWrite<u32>),
        /// Conversion result FIFO
        (0x00C => fifo: ReadWrite<u32>),
        /// Clock divider for free-running sampling
        (0x010 => div: ReadWrite<u32>),
        /// Raw Interrupts
        (0x014 => intr: ReadWrite<u32>),
        /// Interrupt Enable
        (0x018 => inte: ReadWrite<u32>),
        /// Interrupt Force
        (0x01C => intf: ReadWrite<u32>),
        /// Interrupt status after masking & forcing
        (0x020 => ints: ReadWrite<u32>),
        (0x024 => @END),
    }
}

register_bitfields![u32,
    CS [
        /// Round-robin sampling. 1 bit per channel.
        RROBIN OFFSET(16) NUMBITS(5) [],
        /// Select analog mux input
        AINSEL OFFSET(12) NUMBITS(3) [],
        /// Some past conversion encountered an error. Write 1 to clear.
        ERR_STICKY OFFSET(10) NUMBITS(1) [],
        /// The most recent conversion encountered an error
        ERR OFFSET(9) NUMBITS(1) [],
        /// 1 if the ADC is ready to start a new conversion
        READY OFFSET(8) NUMBITS(1) [],
        /// Continuously perform conversions
        START_MANY OFFSET(3) NUMBITS(1) [],
        /// Start a single conversion. Self-clearing.
        START_ONCE OFFSET(2) NUMBITS(1) [],
        /// Power on temperature sensor
        TS_EN OFFSET(1) NUMBITS(1) [],
        /// Power on ADC and enable its clock
        EN OFFSET(0) NUMBITS(1) []
    ],
    RESULT [
        RESULT OFFSET(0) NUMBITS(12) []
    ]
];

const ADC_BASE: StaticRef<AdcRegisters> =
    unsafe { StaticRef::new(0x4004C000 as *const AdcRegisters) };

#[allow(dead_code)]
#[repr(u32)]
#[derive(Copy, Clone, PartialEq)]
pub enum Channel {
    Channel0 = 0,
    Channel1 = 1,
    Channel2 = 2,
    Channel3 = 3,
    /// The internal temperature sensor.
    Channel4 = 4,
}

pub struct Adc {
    registers: StaticRef<AdcRegisters>,
}

impl Adc {
    pub const fn new() -> Self {
        Self {
            registers: ADC_BASE,
        }
    }

    pub fn init(&self) {
        self.registers.cs.modify(CS::EN::SET);
        while !self.registers.cs.is_set(CS::READY) {}
    }

    pub fn enable_temperature_sensor(&self) {
        self.registers.cs.modify(CS::TS_EN::SET);
    }

    /// One blocking conversion; a few microseconds at the ADC clock.
    pub fn read_single(&self, channel: Channel) -> u16 {
        self.registers.cs.modify(CS::AINSEL.val(channel as u32));
        self.registers.cs.modify(CS::START_ONCE::SET);
        while !self.registers.cs.is_set(CS::READY) {}
        self.registers.result.read(RESULT::RESULT) as u16
    }
}

/// RP2040 datasheet conversion: the sensor reads 0.706 V at 27 C with a
/// -1.721 mV/C slope against a 3.3 V reference.
pub struct TempSensor<'a> {
    adc: &'a Adc,
}

impl<'a> TempSensor<'a> {
    pub const fn new(adc: &'a Adc) -> Self {
        Self { adc }
    }
}

impl TemperatureSource for TempSensor<'_> {
    fn read_celsius(&self) -> f32 {
        let raw = self.adc.read_single(Channel::Channel4);
        let volts = raw as f32 * 3.3 / 4096.0;
        27.0 - (volts - 0.706) / 0.001721
    }
}
