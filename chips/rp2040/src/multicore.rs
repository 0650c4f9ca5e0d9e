// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Core-1 launch and the inter-core lockout.
//!
//! Launching follows the bootrom mailbox handshake. The lockout reuses the
//! same FIFOs afterwards: the initiator (core 1's ramp engine) posts a pause
//! request and waits for the acknowledgement; the victim (core 0's main
//! loop) answers from its poll and spins until the matching resume. No
//! interrupts are involved, so victim latency is bounded by one loop
//! iteration.

use cortex_m::asm;
use kernel::hil::multicore::{CoreLockout, LockoutVictim};

use crate::psm::Psm;
use crate::sio::Sio;

/// Mailbox words of the lockout protocol.
const PAUSE_REQ: u32 = 0x5041_5553; // "PAUS"
const RESUME_REQ: u32 = 0x5245_534D; // "RESM"
const LOCKOUT_ACK: u32 = 0x4F4B_4159; // "OKAY"

pub struct Multicore<'a> {
    sio: &'a Sio,
    psm: &'a Psm,
}

impl<'a> Multicore<'a> {
    pub const fn new(sio: &'a Sio, psm: &'a Psm) -> Self {
        Self { sio, psm }
    }

    /// Take core 1 out of reset and hand it an entry point. `stack` becomes
    /// core 1's stack, full-descending from its top.
    ///
    /// The bootrom on core 1 echoes each command word; any mismatch restarts
    /// the sequence from the beginning.
    pub fn launch_core1(&self, entry: extern "C" fn() -> !, stack: &'static mut [usize]) {
        self.psm.reset_core1();

        // SAFETY: reading the VTOR of the launching core; the same table is
        // installed on core 1.
        let vector_table = unsafe { core::ptr::read_volatile(0xE000_ED08 as *const u32) };
        let stack_top = stack.as_ptr() as u32 + (stack.len() * core::mem::size_of::<usize>()) as u32;
        let sequence: [u32; 6] = [0, 0, 1, vector_table, stack_top, entry as usize as u32];

        let mut index = 0;
        while index < sequence.len() {
            let command = sequence[index];
            if command == 0 {
                // Always drain before a zero command; the SEV unblocks a
                // bootrom parked in WFE.
                self.sio.fifo_drain();
                asm::sev();
            }
            self.sio.fifo_push_blocking(command);
            let response = self.sio.fifo_pop_blocking();
            index = if response == command { index + 1 } else { 0 };
        }
    }
}

impl CoreLockout for Multicore<'_> {
    fn pause_other_core(&self) {
        self.sio.fifo_push_blocking(PAUSE_REQ);
        while self.sio.fifo_pop_blocking() != LOCKOUT_ACK {}
    }

    fn resume_other_core(&self) {
        self.sio.fifo_push_blocking(RESUME_REQ);
        while self.sio.fifo_pop_blocking() != LOCKOUT_ACK {}
    }
}

impl LockoutVictim for Multicore<'_> {
    fn poll(&self) {
        if let Some(word) = self.sio.fifo_try_pop() {
            if word != PAUSE_REQ {
                return;
            }
            self.sio.fifo_push_blocking(LOCKOUT_ACK);
            // Parked: nothing but the mailbox until the initiator releases
            // us. The PLL reconfigure on the other side takes under 2 ms.
            loop {
                if self.sio.fifo_pop_blocking() == RESUME_REQ {
                    self.sio.fifo_push_blocking(LOCKOUT_ACK);
                    return;
                }
            }
        }
    }
}
