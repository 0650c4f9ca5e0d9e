// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! PL011 UART, polled.
//!
//! The console path is deliberately simple: blocking byte writes and a
//! zero-timeout read, which is exactly the contract the core-0 loop needs.
//! The peripheral clock is fed from the crystal, so the divisors computed at
//! init stay correct across system-clock ramps.

use kernel::hil::console::Console;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;

register_structs! {
    UartRegisters {
        /// Data register
        (0x000 => dr: ReadWrite<u32>),
        /// Receive status / error clear
        (0x004 => rsr: ReadWrite<u32>),
        (0x008 => _reserved0),
        /// Flag register
        (0x018 => fr: ReadOnly<u32, FR::Register>),
        (0x01C => _reserved1),
        /// Integer baud rate divisor
        (0x024 => ibrd: ReadWrite<u32>),
        /// Fractional baud rate divisor
        (0x028 => fbrd: ReadWrite<u32>),
        /// Line control
        (0x02C => lcr_h: ReadWrite<u32, LCR_H::Register>),
        /// Control register
        (0x030 => cr: ReadWrite<u32, CR::Register>),
        (0x034 => _reserved2),
        (0x048 => @END),
    }
}

register_bitfields![u32,
    FR [
        /// Transmit FIFO empty
        TXFE OFFSET(7) NUMBITS(1) [],
        /// Receive FIFO full
        RXFF OFFSET(6) NUMBITS(1) [],
        /// Transmit FIFO full
        TXFF OFFSET(5) NUMBITS(1) [],
        /// Receive FIFO empty
        RXFE OFFSET(4) NUMBITS(1) [],
        /// UART busy transmitting
        BUSY OFFSET(3) NUMBITS(1) []
    ],
    LCR_H [
        /// Word length: 0b11 = 8 bits
        WLEN OFFSET(5) NUMBITS(2) [],
        /// Enable FIFOs
        FEN OFFSET(4) NUMBITS(1) [],
        /// Two stop bits select
        STP2 OFFSET(3) NUMBITS(1) [],
        /// Even parity select
        EPS OFFSET(2) NUMBITS(1) [],
        /// Parity enable
        PEN OFFSET(1) NUMBITS(1) []
    ],
    CR [
        /// Receive enable
        RXE OFFSET(9) NUMBITS(1) [],
        /// Transmit enable
        TXE OFFSET(8) NUMBITS(1) [],
        /// UART enable
        UARTEN OFFSET(0) NUMBITS(1) []
    ]
];

const UART0_BASE: StaticRef<UartRegisters> =
    unsafe { StaticRef::new(0x40034000 as *const UartRegisters) };

pub struct Uart {
    registers: StaticRef<UartRegisters>,
}

impl Uart {
    pub const fn new_uart0() -> Self {
        Self {
            registers: UART0_BASE,
        }
    }

    /// 8N1 at `baud` against `clk_peri_hz`.
    pub fn init(&self, clk_peri_hz: u32, baud: u32) {
        self.registers.cr.modify(CR::UARTEN::CLEAR);

        // divisor = clk / (16 * baud), in 16.6 fixed point
        let divisor = 8 * clk_peri_hz / baud;
        let ibrd = divisor >> 7;
        let fbrd = ((divisor & 0x7F) + 1) / 2;
        self.registers.ibrd.set(ibrd);
        self.registers.fbrd.set(fbrd);

        self.registers
            .lcr_h
            .modify(LCR_H::WLEN.val(0b11) + LCR_H::FEN::SET);
        self.registers
            .cr
            .modify(CR::UARTEN::SET + CR::TXE::SET + CR::RXE::SET);
    }
}

impl Console for Uart {
    fn read_byte(&self) -> Option<u8> {
        if self.registers.fr.is_set(FR::RXFE) {
            None
        } else {
            Some(self.registers.dr.get() as u8)
        }
    }

    fn write_byte(&self, byte: u8) {
        while self.registers.fr.is_set(FR::TXFF) {}
        self.registers.dr.set(byte as u32);
    }
}
