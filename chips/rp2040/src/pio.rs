// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Programmable IO block, plus the idle/heartbeat measurement pair.
//!
//! Two state machines on PIO0 run autonomously, freeing both ARM cores from
//! any timing obligation:
//!
//!  - SM0 `idle_measure` counts how long core 0 holds the IDLE pin high
//!    (its character-wait spin) and pushes the tick count on the falling
//!    edge.
//!  - SM1 `period_measure` times the LOW phase between consecutive heartbeat
//!    pulses and pushes each period.
//!
//! Both loops are two instructions, so one counter tick is exactly two
//! system-clock cycles at divider 1 regardless of the current frequency.

use kernel::hil::counters::CycleCounters;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::registers::{
    register_bitfields, register_structs, ReadOnly, ReadWrite, WriteOnly,
};
use kernel::utilities::StaticRef;

const NUMBER_STATE_MACHINES: usize = 4;
const NUMBER_INSTR_MEMORY_LOCATIONS: usize = 32;

#[repr(C)]
struct StateMachine {
    /// Clock divisor register for state machine x
    /// Frequency = clock freq / (CLKDIV_INT + CLKDIV_FRAC / 256)
    clkdiv: ReadWrite<u32, SMx_CLKDIV::Register>,
    /// Execution/behavioural settings for state machine x
    execctrl: ReadWrite<u32, SMx_EXECCTRL::Register>,
    /// Control behaviour of the input/output shift registers
    shiftctrl: ReadWrite<u32, SMx_SHIFTCTRL::Register>,
    /// Current instruction address of state machine x
    addr: ReadOnly<u32>,
    /// Write to execute an instruction immediately
    instr: ReadWrite<u32, SMx_INSTR::Register>,
    /// State machine pin control
    pinctrl: ReadWrite<u32, SMx_PINCTRL::Register>,
}

register_structs! {
    PioRegisters {
        /// PIO control register
        (0x000 => ctrl: ReadWrite<u32, CTRL::Register>),
        /// FIFO status register
        (0x004 => fstat: ReadOnly<u32, FSTAT::Register>),
        /// FIFO debug register
        (0x008 => fdebug: ReadWrite<u32, FDEBUG::Register>),
        /// FIFO levels
        (0x00C => flevel: ReadOnly<u32>),
        /// Direct write access to the TX FIFO for this state machine
        (0x010 => txf: [WriteOnly<u32>; NUMBER_STATE_MACHINES]),
        /// Direct read access to the RX FIFO for this state machine. Reading
        /// from an empty FIFO sets the sticky FDEBUG_RXUNDER flag and
        /// returns undefined data.
        (0x020 => rxf: [ReadOnly<u32>; NUMBER_STATE_MACHINES]),
        /// State machine IRQ flags register. Write 1 to clear.
        (0x030 => irq: ReadWrite<u32>),
        /// Force IRQ flags
        (0x034 => irq_force: ReadWrite<u32>),
        /// Bypass the 2-flipflop input synchronizer, per GPIO
        (0x038 => input_sync_bypass: ReadWrite<u32>),
        (0x03C => _reserved0),
        /// Write-only access to instruction memory locations 0-31
        (0x048 => instr_mem: [WriteOnly<u32>; NUMBER_INSTR_MEMORY_LOCATIONS]),
        /// State machines
        (0x0C8 => sm: [StateMachine; NUMBER_STATE_MACHINES]),
        (0x128 => _reserved1),
        (0x144 => @END),
    }
}

register_bitfields![u32,
    CTRL [
        /// Restart a state machine's clock divider from phase 0
        CLKDIV_RESTART OFFSET(8) NUMBITS(4) [],
        /// Clear internal state (shift counters, delay counter, stalls)
        SM_RESTART OFFSET(4) NUMBITS(4) [],
        /// Enable/disable each of the four state machines
        SM_ENABLE OFFSET(0) NUMBITS(4) []
    ],
    FSTAT [
        /// State machine TX FIFO is empty
        TXEMPTY OFFSET(24) NUMBITS(4) [],
        /// State machine TX FIFO is full
        TXFULL OFFSET(16) NUMBITS(4) [],
        /// State machine RX FIFO is empty
        RXEMPTY OFFSET(8) NUMBITS(4) [],
        /// State machine RX FIFO is full
        RXFULL OFFSET(0) NUMBITS(4) []
    ],
    FDEBUG [
        /// TX stall on empty FIFO. Write 1 to clear.
        TXSTALL OFFSET(24) NUMBITS(4) [],
        /// TX overflow. Write 1 to clear.
        TXOVER OFFSET(16) NUMBITS(4) [],
        /// RX underflow. Write 1 to clear.
        RXUNDER OFFSET(8) NUMBITS(4) [],
        /// RX stall: a nonblocking PUSH to a full FIFO dropped data.
        /// Write 1 to clear.
        RXSTALL OFFSET(0) NUMBITS(4) []
    ],
    SMx_CLKDIV [
        /// Effective frequency is sysclk/(int + frac/256).
        INT OFFSET(16) NUMBITS(16) [],
        /// Fractional part of clock divisor
        FRAC OFFSET(8) NUMBITS(8) []
    ],
    SMx_EXECCTRL [
        /// An instruction written to SMx_INSTR is stalled
        EXEC_STALLED OFFSET(31) NUMBITS(1) [],
        /// The GPIO number to use as condition for JMP PIN
        JMP_PIN OFFSET(24) NUMBITS(5) [],
        /// After reaching this address, execution wraps to wrap_bottom
        WRAP_TOP OFFSET(12) NUMBITS(5) [],
        /// After reaching wrap_top, execution wraps to this address
        WRAP_BOTTOM OFFSET(7) NUMBITS(5) []
    ],
    SMx_SHIFTCTRL [
        /// RX FIFO steals the TX FIFO's storage and becomes twice as deep
        FJOIN_RX OFFSET(31) NUMBITS(1) [],
        /// TX FIFO steals the RX FIFO's storage
        FJOIN_TX OFFSET(30) NUMBITS(1) [],
        /// Shift direction of the input shift register
        IN_SHIFTDIR OFFSET(18) NUMBITS(1) [],
        /// Push automatically when the input shift register fills
        AUTOPUSH OFFSET(16) NUMBITS(1) []
    ],
    SMx_INSTR [
        INSTR OFFSET(0) NUMBITS(16) []
    ],
    SMx_PINCTRL [
        /// Number of side-set bits
        SIDESET_COUNT OFFSET(29) NUMBITS(3) [],
        /// Number of pins asserted by a SET
        SET_COUNT OFFSET(26) NUMBITS(3) [],
        /// Number of pins asserted by an OUT
        OUT_COUNT OFFSET(20) NUMBITS(6) [],
        /// Pin mapped to the least-significant IN data bit
        IN_BASE OFFSET(15) NUMBITS(5) [],
        /// Lowest pin affected by side-set
        SIDESET_BASE OFFSET(10) NUMBITS(5) [],
        /// Lowest pin affected by SET
        SET_BASE OFFSET(5) NUMBITS(5) [],
        /// Lowest pin affected by OUT
        OUT_BASE OFFSET(0) NUMBITS(5) []
    ]
];

const PIO0_BASE: StaticRef<PioRegisters> =
    unsafe { StaticRef::new(0x50200000 as *const PioRegisters) };

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum SMNumber {
    SM0 = 0,
    SM1 = 1,
    SM2 = 2,
    SM3 = 3,
}

/// Per-SM settings the measurement programs need.
pub struct StateMachineConfiguration {
    pub in_pins_base: u32,
    pub jmp_pin: u32,
    pub wrap_bottom: u32,
    pub wrap_top: u32,
    pub clkdiv_int: u32,
    pub clkdiv_frac: u32,
}

pub struct Pio {
    registers: StaticRef<PioRegisters>,
}

impl Pio {
    pub const fn new_pio0() -> Self {
        Self {
            registers: PIO0_BASE,
        }
    }

    /// Install a program at `origin`. Jump targets in the words are absolute
    /// addresses, so the assembly must be encoded for its origin.
    pub fn add_program(&self, origin: usize, program: &[u16]) {
        for (offset, &instruction) in program.iter().enumerate() {
            self.registers.instr_mem[origin + offset].set(instruction as u32);
        }
    }

    pub fn sm_config(&self, sm: SMNumber, config: &StateMachineConfiguration) {
        let registers = &self.registers.sm[sm as usize];
        registers
            .pinctrl
            .modify(SMx_PINCTRL::IN_BASE.val(config.in_pins_base));
        registers
            .execctrl
            .modify(SMx_EXECCTRL::JMP_PIN.val(config.jmp_pin));
        registers.execctrl.modify(
            SMx_EXECCTRL::WRAP_BOTTOM.val(config.wrap_bottom)
                + SMx_EXECCTRL::WRAP_TOP.val(config.wrap_top),
        );
        registers.clkdiv.modify(
            SMx_CLKDIV::INT.val(config.clkdiv_int) + SMx_CLKDIV::FRAC.val(config.clkdiv_frac),
        );
    }

    /// Execute one instruction immediately on a (possibly stopped) SM.
    pub fn exec(&self, sm: SMNumber, instruction: u16) {
        self.registers.sm[sm as usize]
            .instr
            .write(SMx_INSTR::INSTR.val(instruction as u32));
    }

    /// Clear residual SM state and restart the clock divider from phase 0.
    pub fn sm_restart(&self, sm: SMNumber) {
        let bit = 1 << (sm as u32);
        let enabled = self.registers.ctrl.read(CTRL::SM_ENABLE);
        self.registers.ctrl.write(
            CTRL::SM_ENABLE.val(enabled)
                + CTRL::SM_RESTART.val(bit)
                + CTRL::CLKDIV_RESTART.val(bit),
        );
    }

    pub fn sm_set_enabled(&self, sm: SMNumber, enabled: bool) {
        let bit = 1 << (sm as u32);
        let mask = self.registers.ctrl.read(CTRL::SM_ENABLE);
        let mask = if enabled { mask | bit } else { mask & !bit };
        self.registers.ctrl.modify(CTRL::SM_ENABLE.val(mask));
    }

    /// Pop one word from the SM's RX FIFO, without ever reading on empty.
    pub fn rx_pop(&self, sm: SMNumber) -> Option<u32> {
        let empty = self.registers.fstat.read(FSTAT::RXEMPTY) & (1 << (sm as u32)) != 0;
        if empty {
            None
        } else {
            Some(self.registers.rxf[sm as usize].get())
        }
    }
}

/// Encoded `jmp <addr>` used to point a stopped SM at its program.
const fn jmp_instruction(address: u16) -> u16 {
    address & 0x1F
}

/// SM0 program, origin 0. Counts system-clock ticks while the IDLE pin is
/// high; pushes the count on the falling edge.
///
/// ```text
/// .wrap_target
///     mov x, ~null        ; x = 0xFFFFFFFF
///     wait 1 pin 0        ; idle window opens
/// high:
///     jmp x-- cont        ; one tick (always taken)
/// cont:
///     jmp pin high        ; still idle?
///     mov isr, ~x         ; elapsed ticks
///     push noblock
/// .wrap
/// ```
const IDLE_MEASURE_ORIGIN: usize = 0;
const IDLE_MEASURE_PROGRAM: [u16; 6] = [
    0xA02B, // mov x, ~null
    0x20A0, // wait 1 pin 0
    0x0043, // jmp x-- 3
    0x00C2, // jmp pin 2
    0xA0C9, // mov isr, ~x
    0x8000, // push noblock
];

/// SM1 program, origin 8. Times the LOW phase between heartbeat pulses.
///
/// ```text
/// .wrap_target
///     mov x, ~null
///     wait 0 pin 0        ; previous pulse has ended
/// low:
///     jmp pin done        ; next pulse arrived
///     jmp x-- low         ; one tick
/// done:
///     mov isr, ~x
///     push noblock
/// .wrap
/// ```
const PERIOD_MEASURE_ORIGIN: usize = 8;
const PERIOD_MEASURE_PROGRAM: [u16; 6] = [
    0xA02B, // mov x, ~null
    0x2020, // wait 0 pin 0
    0x00CC, // jmp pin 12
    0x004A, // jmp x-- 10
    0xA0C9, // mov isr, ~x
    0x8000, // push noblock
];

/// Default measurement pins: core-0 outputs observed by the PIO.
pub const IDLE_PIN: u32 = 20;
pub const HB_PIN: u32 = 21;

/// The idle/heartbeat measurement pair on PIO0.
pub struct PioIdleMonitor {
    pio: Pio,
}

impl PioIdleMonitor {
    pub const fn new() -> Self {
        Self {
            pio: Pio::new_pio0(),
        }
    }

    /// Install both programs and start both state machines. Call once,
    /// before the governor core launches.
    pub fn init(&self) {
        let pio = &self.pio;
        pio.add_program(IDLE_MEASURE_ORIGIN, &IDLE_MEASURE_PROGRAM);
        pio.add_program(PERIOD_MEASURE_ORIGIN, &PERIOD_MEASURE_PROGRAM);

        pio.sm_config(
            SMNumber::SM0,
            &StateMachineConfiguration {
                in_pins_base: IDLE_PIN,
                jmp_pin: IDLE_PIN,
                wrap_bottom: IDLE_MEASURE_ORIGIN as u32,
                wrap_top: (IDLE_MEASURE_ORIGIN + IDLE_MEASURE_PROGRAM.len() - 1) as u32,
                clkdiv_int: 1,
                clkdiv_frac: 0,
            },
        );
        pio.sm_config(
            SMNumber::SM1,
            &StateMachineConfiguration {
                in_pins_base: HB_PIN,
                jmp_pin: HB_PIN,
                wrap_bottom: PERIOD_MEASURE_ORIGIN as u32,
                wrap_top: (PERIOD_MEASURE_ORIGIN + PERIOD_MEASURE_PROGRAM.len() - 1) as u32,
                clkdiv_int: 1,
                clkdiv_frac: 0,
            },
        );

        pio.sm_restart(SMNumber::SM0);
        pio.sm_restart(SMNumber::SM1);
        pio.exec(SMNumber::SM0, jmp_instruction(IDLE_MEASURE_ORIGIN as u16));
        pio.exec(SMNumber::SM1, jmp_instruction(PERIOD_MEASURE_ORIGIN as u16));
        pio.sm_set_enabled(SMNumber::SM0, true);
        pio.sm_set_enabled(SMNumber::SM1, true);
    }
}

impl CycleCounters for PioIdleMonitor {
    fn take_idle_sample(&self) -> Option<u32> {
        self.pio.rx_pop(SMNumber::SM0)
    }

    fn take_period_sample(&self) -> Option<u32> {
        self.pio.rx_pop(SMNumber::SM1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The program words are hand-assembled; pin down the fields that matter
    // so a typo cannot silently retarget a jump.

    #[test]
    fn idle_program_loop_is_two_instructions() {
        // jmp x-- 3 and jmp pin 2: opcode 000, conditions 010 and 110.
        assert_eq!(IDLE_MEASURE_PROGRAM[2], 0x0040 | 3);
        assert_eq!(IDLE_MEASURE_PROGRAM[3], 0x00C0 | 2);
    }

    #[test]
    fn period_program_jumps_stay_inside_its_origin() {
        // Targets are absolute: the loop lives at 10..=11, done at 12.
        assert_eq!(PERIOD_MEASURE_PROGRAM[2], 0x00C0 | 12);
        assert_eq!(PERIOD_MEASURE_PROGRAM[3], 0x0040 | 10);
        for &instruction in PERIOD_MEASURE_PROGRAM.iter() {
            if instruction & 0xE000 == 0 {
                let target = (instruction & 0x1F) as usize;
                assert!(
                    (PERIOD_MEASURE_ORIGIN
                        ..PERIOD_MEASURE_ORIGIN + PERIOD_MEASURE_PROGRAM.len())
                        .contains(&target)
                );
            }
        }
    }

    #[test]
    fn both_programs_end_with_nonblocking_push() {
        assert_eq!(*IDLE_MEASURE_PROGRAM.last().unwrap(), 0x8000);
        assert_eq!(*PERIOD_MEASURE_PROGRAM.last().unwrap(), 0x8000);
    }
}
