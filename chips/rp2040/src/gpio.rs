// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! GPIO pin muxing and software-driven outputs.
//!
//! Only what the kernel needs: function selection for the UART pins and the
//! two SIO-driven measurement pins (IDLE on 20, HB on 21). The PIO observes
//! those pads through the always-connected input path, so they stay on the
//! SIO function while both counters watch them.

use kernel::hil::gpio::OutputPin;
use kernel::utilities::registers::interfaces::ReadWriteable;
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;

use crate::sio::Sio;

const NUM_PINS: usize = 30;

#[repr(C)]
struct PinRegisters {
    /// GPIO status
    status: ReadOnly<u32>,
    /// GPIO control including function select and overrides
    ctrl: ReadWrite<u32, GPIOx_CTRL::Register>,
}

register_structs! {
    IoBank0Registers {
        (0x000 => pin: [PinRegisters; NUM_PINS]),
        (0x0F0 => @END),
    },
    PadsBank0Registers {
        /// Voltage select
        (0x000 => voltage_select: ReadWrite<u32>),
        /// Pad control, one register per pin
        (0x004 => pad: [ReadWrite<u32, PAD::Register>; NUM_PINS]),
        (0x07C => @END),
    }
}

register_bitfields![u32,
    GPIOx_CTRL [
        /// Override the interrupt output
        IRQOVER OFFSET(28) NUMBITS(2) [],
        /// Override the input
        INOVER OFFSET(16) NUMBITS(2) [],
        /// Override the output enable
        OEOVER OFFSET(12) NUMBITS(2) [],
        /// Override the output
        OUTOVER OFFSET(8) NUMBITS(2) [],
        /// Function select; 0x1f disconnects the pin
        FUNCSEL OFFSET(0) NUMBITS(5) []
    ],
    PAD [
        /// Output disable
        OD OFFSET(7) NUMBITS(1) [],
        /// Input enable
        IE OFFSET(6) NUMBITS(1) [],
        /// Drive strength
        DRIVE OFFSET(4) NUMBITS(2) [],
        /// Pull up enable
        PUE OFFSET(3) NUMBITS(1) [],
        /// Pull down enable
        PDE OFFSET(2) NUMBITS(1) [],
        /// Schmitt trigger
        SCHMITT OFFSET(1) NUMBITS(1) [],
        /// Slew rate control
        SLEWFAST OFFSET(0) NUMBITS(1) []
    ]
];

const IO_BANK0_BASE: StaticRef<IoBank0Registers> =
    unsafe { StaticRef::new(0x40014000 as *const IoBank0Registers) };
const PADS_BANK0_BASE: StaticRef<PadsBank0Registers> =
    unsafe { StaticRef::new(0x4001C000 as *const PadsBank0Registers) };

#[derive(Clone, Copy, PartialEq)]
#[repr(u32)]
pub enum GpioFunction {
    Spi = 1,
    Uart = 2,
    I2c = 3,
    Pwm = 4,
    Sio = 5,
    Pio0 = 6,
    Pio1 = 7,
    Null = 0x1f,
}

pub struct RPGpioPin {
    pin: usize,
    io_registers: StaticRef<IoBank0Registers>,
    pads_registers: StaticRef<PadsBank0Registers>,
    sio: Sio,
}

impl RPGpioPin {
    pub const fn new(pin: usize) -> Self {
        Self {
            pin,
            io_registers: IO_BANK0_BASE,
            pads_registers: PADS_BANK0_BASE,
            sio: Sio::new(),
        }
    }

    /// Route the pad to a peripheral function, with the input buffer and
    /// output driver enabled.
    pub fn set_function(&self, function: GpioFunction) {
        self.pads_registers.pad[self.pin].modify(PAD::IE::SET + PAD::OD::CLEAR);
        self.io_registers.pin[self.pin]
            .ctrl
            .modify(GPIOx_CTRL::FUNCSEL.val(function as u32));
    }

    /// Claim the pin for the SIO function and drive it as an output,
    /// initially low.
    pub fn make_sio_output(&self) {
        self.set_function(GpioFunction::Sio);
        self.sio.gpio_out_clr(1 << self.pin);
        self.sio.gpio_oe_set(1 << self.pin);
    }
}

impl OutputPin for RPGpioPin {
    fn set(&self) {
        self.sio.gpio_out_set(1 << self.pin);
    }

    fn clear(&self) {
        self.sio.gpio_out_clr(1 << self.pin);
    }
}
