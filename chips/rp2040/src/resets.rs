// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Subsystem reset controller.

use kernel::utilities::registers::interfaces::{Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;

register_structs! {
    ResetsRegisters {
        /// Reset control: 1 holds the peripheral in reset
        (0x000 => reset: ReadWrite<u32, PERIPHERALS::Register>),
        /// Watchdog select
        (0x004 => wdsel: ReadWrite<u32, PERIPHERALS::Register>),
        /// Reset done: 1 once the peripheral has left reset
        (0x008 => reset_done: ReadOnly<u32, PERIPHERALS::Register>),
        (0x00C => @END),
    }
}

register_bitfields![u32,
    pub PERIPHERALS [
        USBCTRL OFFSET(24) NUMBITS(1) [],
        UART1 OFFSET(23) NUMBITS(1) [],
        UART0 OFFSET(22) NUMBITS(1) [],
        TIMER OFFSET(21) NUMBITS(1) [],
        TBMAN OFFSET(20) NUMBITS(1) [],
        SYSINFO OFFSET(19) NUMBITS(1) [],
        SYSCFG OFFSET(18) NUMBITS(1) [],
        SPI1 OFFSET(17) NUMBITS(1) [],
        SPI0 OFFSET(16) NUMBITS(1) [],
        RTC OFFSET(15) NUMBITS(1) [],
        PWM OFFSET(14) NUMBITS(1) [],
        PLL_USB OFFSET(13) NUMBITS(1) [],
        PLL_SYS OFFSET(12) NUMBITS(1) [],
        PIO1 OFFSET(11) NUMBITS(1) [],
        PIO0 OFFSET(10) NUMBITS(1) [],
        PADS_QSPI OFFSET(9) NUMBITS(1) [],
        PADS_BANK0 OFFSET(8) NUMBITS(1) [],
        JTAG OFFSET(7) NUMBITS(1) [],
        IO_QSPI OFFSET(6) NUMBITS(1) [],
        IO_BANK0 OFFSET(5) NUMBITS(1) [],
        I2C1 OFFSET(4) NUMBITS(1) [],
        I2C0 OFFSET(3) NUMBITS(1) [],
        DMA OFFSET(2) NUMBITS(1) [],
        BUSCTRL OFFSET(1) NUMBITS(1) [],
        ADC OFFSET(0) NUMBITS(1) []
    ]
];

const RESETS_BASE: StaticRef<ResetsRegisters> =
    unsafe { StaticRef::new(0x4000C000 as *const ResetsRegisters) };

pub struct Resets {
    registers: StaticRef<ResetsRegisters>,
}

impl Resets {
    pub const fn new() -> Self {
        Self {
            registers: RESETS_BASE,
        }
    }

    /// Release the peripherals the kernel uses from reset and wait for each
    /// of them to come up.
    pub fn unreset_used_peripherals(&self) {
        let used = PERIPHERALS::ADC::SET
            + PERIPHERALS::IO_BANK0::SET
            + PERIPHERALS::PADS_BANK0::SET
            + PERIPHERALS::PIO0::SET
            + PERIPHERALS::PLL_SYS::SET
            + PERIPHERALS::TIMER::SET
            + PERIPHERALS::UART0::SET;
        let mask = used.value;
        self.registers.reset.set(self.registers.reset.get() & !mask);
        while self.registers.reset_done.get() & mask != mask {}
    }
}
