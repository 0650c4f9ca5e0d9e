// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Single-cycle IO block: processor id, the inter-core mailbox FIFOs, the
//! hardware spinlocks and the software-driven GPIO path.

use cortex_m::asm;
use kernel::hil::sync::Spinlock;
use kernel::utilities::registers::interfaces::{Readable, Writeable};
use kernel::utilities::registers::{
    register_bitfields, register_structs, ReadOnly, ReadWrite, WriteOnly,
};
use kernel::utilities::StaticRef;

register_structs! {
    pub SioRegisters {
        /// Processor core identifier
        (0x000 => cpuid: ReadOnly<u32>),
        /// Input value for GPIO pins
        (0x004 => gpio_in: ReadOnly<u32>),
        /// Input value for QSPI pins
        (0x008 => gpio_hi_in: ReadOnly<u32>),
        (0x00C => _reserved0),
        /// GPIO output value
        (0x010 => gpio_out: ReadWrite<u32>),
        /// GPIO output value set
        (0x014 => gpio_out_set: WriteOnly<u32>),
        /// GPIO output value clear
        (0x018 => gpio_out_clr: WriteOnly<u32>),
        /// GPIO output value XOR
        (0x01C => gpio_out_xor: WriteOnly<u32>),
        /// GPIO output enable
        (0x020 => gpio_oe: ReadWrite<u32>),
        /// GPIO output enable set
        (0x024 => gpio_oe_set: WriteOnly<u32>),
        /// GPIO output enable clear
        (0x028 => gpio_oe_clr: WriteOnly<u32>),
        /// GPIO output enable XOR
        (0x02C => gpio_oe_xor: WriteOnly<u32>),
        (0x030 => _reserved1),
        /// Status register for inter-core FIFOs (mailboxes).
        (0x050 => fifo_st: ReadWrite<u32, FIFO_ST::Register>),
        /// Write access to this core's TX FIFO
        (0x054 => fifo_wr: WriteOnly<u32>),
        /// Read access to this core's RX FIFO
        (0x058 => fifo_rd: ReadOnly<u32>),
        /// Spinlock state (one bit per lock)
        (0x05C => spinlock_st: ReadOnly<u32>),
        (0x060 => _reserved2),
        /// Reading claims the lock (nonzero on success), writing releases it
        (0x100 => spinlock: [ReadWrite<u32>; 32]),
        (0x180 => @END),
    }
}

register_bitfields![u32,
    FIFO_ST [
        /// RX FIFO read-on-empty happened. Write 1 to clear.
        ROE OFFSET(3) NUMBITS(1) [],
        /// TX FIFO write-on-full happened. Write 1 to clear.
        WOF OFFSET(2) NUMBITS(1) [],
        /// This core's TX FIFO is not full
        RDY OFFSET(1) NUMBITS(1) [],
        /// This core's RX FIFO is not empty
        VLD OFFSET(0) NUMBITS(1) []
    ]
];

const SIO_BASE: StaticRef<SioRegisters> =
    unsafe { StaticRef::new(0xD0000000 as *const SioRegisters) };

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Processor {
    Processor0 = 0,
    Processor1 = 1,
}

pub struct Sio {
    registers: StaticRef<SioRegisters>,
}

impl Sio {
    pub const fn new() -> Self {
        Self {
            registers: SIO_BASE,
        }
    }

    /// Which core is executing this.
    pub fn get_processor(&self) -> Processor {
        match self.registers.cpuid.get() {
            0 => Processor::Processor0,
            _ => Processor::Processor1,
        }
    }

    pub fn fifo_ready(&self) -> bool {
        self.registers.fifo_st.is_set(FIFO_ST::RDY)
    }

    pub fn fifo_valid(&self) -> bool {
        self.registers.fifo_st.is_set(FIFO_ST::VLD)
    }

    /// Push to the other core's mailbox, spinning while it is full. The SEV
    /// wakes a core that parked itself with WFE.
    pub fn fifo_push_blocking(&self, value: u32) {
        while !self.fifo_ready() {}
        self.registers.fifo_wr.set(value);
        asm::sev();
    }

    /// Pop from this core's mailbox, spinning until a word arrives.
    pub fn fifo_pop_blocking(&self) -> u32 {
        while !self.fifo_valid() {
            asm::wfe();
        }
        self.registers.fifo_rd.get()
    }

    pub fn fifo_try_pop(&self) -> Option<u32> {
        if self.fifo_valid() {
            Some(self.registers.fifo_rd.get())
        } else {
            None
        }
    }

    /// Discard anything pending in this core's RX FIFO and clear the sticky
    /// error flags.
    pub fn fifo_drain(&self) {
        while self.fifo_valid() {
            let _ = self.registers.fifo_rd.get();
        }
        self.registers
            .fifo_st
            .write(FIFO_ST::ROE::SET + FIFO_ST::WOF::SET);
    }

    /// Software GPIO output drive, used by `gpio::RPGpioPin`.
    pub fn gpio_out_set(&self, mask: u32) {
        self.registers.gpio_out_set.set(mask);
    }

    pub fn gpio_out_clr(&self, mask: u32) {
        self.registers.gpio_out_clr.set(mask);
    }

    pub fn gpio_oe_set(&self, mask: u32) {
        self.registers.gpio_oe_set.set(mask);
    }
}

/// One of the 32 SIO hardware spinlocks. Reading the lock register claims it
/// (the read returns nonzero exactly once); any write releases it.
pub struct SioSpinlock {
    registers: StaticRef<SioRegisters>,
    index: usize,
}

impl SioSpinlock {
    pub const fn new(index: usize) -> Self {
        Self {
            registers: SIO_BASE,
            index,
        }
    }
}

impl Spinlock for SioSpinlock {
    fn claim(&self) {
        loop {
            if self.registers.spinlock[self.index].get() != 0 {
                return;
            }
            asm::nop();
        }
    }

    fn release(&self) {
        self.registers.spinlock[self.index].set(1);
    }
}
