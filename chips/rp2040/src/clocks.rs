// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Clock tree and system PLL.
//!
//! Only the slices the control kernel touches are mapped: the glitchless
//! reference and system slices, the peripheral slice, and resus. The system
//! clock is always `XOSC -> PLL_SYS -> clk_sys`; the peripheral clock is fed
//! straight from the crystal so the console baud rate survives frequency
//! ramps.
//!
//! `sys = 12 MHz x fbdiv / (postdiv1 x postdiv2)` with VCO in [750, 1600] MHz,
//! fbdiv in [16, 320] and postdivs in [1, 7]; not every kilohertz has a
//! solution, which is why callers probe with [`pll_params_for_khz`] before
//! committing.

use core::cell::Cell;

use kernel::hil::clocks::SystemClockControl;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;
use kernel::ErrorCode;

use crate::XOSC_FREQ_KHZ;

register_structs! {
    ClocksRegisters {
        (0x000 => _reserved0),
        /// Clock control, can be changed on-the-fly (except for auxsrc)
        (0x030 => clk_ref_ctrl: ReadWrite<u32, CLK_REF_CTRL::Register>),
        /// Clock divisor, can be changed on-the-fly
        (0x034 => clk_ref_div: ReadWrite<u32>),
        /// Indicates which src is currently selected (one-hot)
        (0x038 => clk_ref_selected: ReadOnly<u32>),
        /// Clock control, can be changed on-the-fly (except for auxsrc)
        (0x03C => clk_sys_ctrl: ReadWrite<u32, CLK_SYS_CTRL::Register>),
        /// Clock divisor, can be changed on-the-fly
        (0x040 => clk_sys_div: ReadWrite<u32, CLK_SYS_DIV::Register>),
        /// Indicates which src is currently selected (one-hot)
        (0x044 => clk_sys_selected: ReadOnly<u32>),
        /// Clock control, can be changed on-the-fly (except for auxsrc)
        (0x048 => clk_peri_ctrl: ReadWrite<u32, CLK_PERI_CTRL::Register>),
        (0x04C => _reserved1),
        /// Indicates which src is currently selected (one-hot)
        (0x050 => clk_peri_selected: ReadOnly<u32>),
        (0x054 => _reserved2),
        (0x078 => clk_sys_resus_ctrl: ReadWrite<u32, CLK_SYS_RESUS_CTRL::Register>),
        (0x07C => _reserved3),
        (0x0C8 => @END),
    },
    PllRegisters {
        /// Control and Status
        /// GENERAL CONSTRAINTS:
        /// Reference clock frequency min=5MHz, max=800MHz
        /// Feedback divider min=16, max=320
        /// VCO frequency min=750MHz, max=1600MHz
        (0x000 => cs: ReadWrite<u32, CS::Register>),
        /// Controls the PLL power modes.
        (0x004 => pwr: ReadWrite<u32, PWR::Register>),
        /// Feedback divisor
        /// (note: this PLL does not support fractional division)
        (0x008 => fbdiv_int: ReadWrite<u32, FBDIV_INT::Register>),
        /// Controls the PLL post dividers for the primary output
        /// the primary output is driven from VCO divided by postdiv1*postdiv2
        (0x00C => prim: ReadWrite<u32, PRIM::Register>),
        (0x010 => @END),
    }
}

register_bitfields![u32,
    CLK_REF_CTRL [
        /// Selects the auxiliary clock source, will glitch when switching
        AUXSRC OFFSET(5) NUMBITS(2) [
            CLKSRC_PLL_USB = 0x0,
            CLKSRC_GPIN0 = 0x1,
            CLKSRC_GPIN1 = 0x2
        ],
        /// Selects the clock source glitchlessly, can be changed on-the-fly
        SRC OFFSET(0) NUMBITS(2) [
            ROSC_CLKSRC_PH = 0x0,
            CLKSRC_CLK_REF_AUX = 0x1,
            XOSC_CLKSRC = 0x2
        ]
    ],
    CLK_SYS_CTRL [
        /// Selects the auxiliary clock source, will glitch when switching
        AUXSRC OFFSET(5) NUMBITS(3) [
            CLKSRC_PLL_SYS = 0x0,
            CLKSRC_PLL_USB = 0x1,
            ROSC_CLKSRC = 0x2,
            XOSC_CLKSRC = 0x3,
            CLKSRC_GPIN0 = 0x4,
            CLKSRC_GPIN1 = 0x5
        ],
        /// Selects the clock source glitchlessly, can be changed on-the-fly
        SRC OFFSET(0) NUMBITS(1) [
            CLKSRC_CLK_SYS_AUX = 1,
            CLK_REF = 0,
        ]
    ],
    CLK_SYS_DIV [
        /// Integer component of the divisor, 0 -> divide by 2^16
        INT OFFSET(8) NUMBITS(24) [],
        /// Fractional component of the divisor
        FRAC OFFSET(0) NUMBITS(8) []
    ],
    CLK_PERI_CTRL [
        /// Starts and stops the clock generator cleanly
        ENABLE OFFSET(11) NUMBITS(1) [],
        /// Asynchronously kills the clock generator
        KILL OFFSET(10) NUMBITS(1) [],
        /// Selects the auxiliary clock source, will glitch when switching
        AUXSRC OFFSET(5) NUMBITS(3) [
            CLK_SYS = 0,
            CLKSRC_PLL_SYS = 1,
            CLKSRC_PLL_USB = 2,
            ROSC_CLKSRC_PH = 3,
            XOSC_CLKSRC = 4,
            CLKSRC_GPIN0 = 5,
            CLKSRC_GPIN1 = 6
        ]
    ],
    CLK_SYS_RESUS_CTRL [
        /// For clearing the resus after the fault that triggered it has been corrected
        CLEAR OFFSET(16) NUMBITS(1) [],
        /// Force a resus, for test purposes only
        FRCE OFFSET(12) NUMBITS(1) [],
        /// Enable resus
        ENABLE OFFSET(8) NUMBITS(1) [],
        /// This is expressed as a number of clk_ref cycles
        /// and must be >= 2x clk_ref_freq/min_clk_tst_freq
        TIMEOUT OFFSET(0) NUMBITS(8) []
    ],
    CS [
        /// PLL is locked
        LOCK OFFSET(31) NUMBITS(1) [],
        /// Passes the reference clock to the output instead of the divided VCO.
        BYPASS OFFSET(8) NUMBITS(1) [],
        /// Divides the PLL input reference clock.
        /// Behaviour is undefined for div=0.
        REFDIV OFFSET(0) NUMBITS(6) []
    ],
    PWR [
        /// PLL VCO powerdown
        VCOPD OFFSET(5) NUMBITS(1) [],
        /// PLL post divider powerdown
        POSTDIVPD OFFSET(3) NUMBITS(1) [],
        /// PLL DSM powerdown
        /// Nothing is achieved by setting this low.
        DSMPD OFFSET(2) NUMBITS(1) [],
        /// PLL powerdown
        PD OFFSET(0) NUMBITS(1) []
    ],
    FBDIV_INT [
        /// see ctrl reg description for constraints
        FBDIV_INT OFFSET(0) NUMBITS(12) []
    ],
    PRIM [
        /// divide by 1-7
        POSTDIV1 OFFSET(16) NUMBITS(3) [],
        /// divide by 1-7
        POSTDIV2 OFFSET(12) NUMBITS(3) []
    ]
];

const CLOCKS_BASE: StaticRef<ClocksRegisters> =
    unsafe { StaticRef::new(0x40008000 as *const ClocksRegisters) };

const PLL_SYS_BASE: StaticRef<PllRegisters> =
    unsafe { StaticRef::new(0x40028000 as *const PllRegisters) };

/// VCO and divider limits of the synthesizer.
const VCO_MIN_KHZ: u32 = 750_000;
const VCO_MAX_KHZ: u32 = 1_600_000;
const FBDIV_MIN: u32 = 16;
const FBDIV_MAX: u32 = 320;

/// Bound on the lock wait; a PLL that has not locked by then is treated as
/// having rejected the configuration.
const PLL_LOCK_SPIN_LIMIT: u32 = 1_000_000;

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PllParams {
    pub refdiv: u32,
    pub vco_khz: u32,
    pub post_div1: u32,
    pub post_div2: u32,
}

/// Exact divisor solution for `sys_khz`, preferring the highest VCO the
/// constraints allow (lower jitter), or `None` when the frequency is not
/// synthesizable from the crystal.
pub fn pll_params_for_khz(xosc_khz: u32, sys_khz: u32) -> Option<PllParams> {
    if sys_khz == 0 {
        return None;
    }
    let ref_khz = xosc_khz; // refdiv is 1 on this board
    let mut fbdiv = FBDIV_MAX;
    while fbdiv >= FBDIV_MIN {
        let vco = fbdiv * ref_khz;
        if vco >= VCO_MIN_KHZ && vco <= VCO_MAX_KHZ {
            for post_div1 in (1..=7u32).rev() {
                for post_div2 in (1..=post_div1).rev() {
                    let divisor = post_div1 * post_div2;
                    if vco % divisor == 0 && vco / divisor == sys_khz {
                        return Some(PllParams {
                            refdiv: 1,
                            vco_khz: vco,
                            post_div1,
                            post_div2,
                        });
                    }
                }
            }
        }
        fbdiv -= 1;
    }
    None
}

#[derive(Copy, Clone, PartialEq, Debug)]
#[repr(usize)]
pub enum Clock {
    Reference = 0,
    System = 1,
    Peripheral = 2,
}

pub struct Clocks {
    registers: StaticRef<ClocksRegisters>,
    pll_sys: StaticRef<PllRegisters>,
    frequencies: [Cell<u32>; 3],
    current_pll: Cell<Option<PllParams>>,
}

impl Clocks {
    pub const fn new() -> Self {
        Self {
            registers: CLOCKS_BASE,
            pll_sys: PLL_SYS_BASE,
            frequencies: [Cell::new(0), Cell::new(0), Cell::new(0)],
            current_pll: Cell::new(None),
        }
    }

    pub fn set_frequency(&self, clock: Clock, freq_hz: u32) {
        self.frequencies[clock as usize].set(freq_hz);
    }

    pub fn get_frequency(&self, clock: Clock) -> u32 {
        self.frequencies[clock as usize].get()
    }

    pub fn enable_resus(&self) {
        self.registers
            .clk_sys_resus_ctrl
            .modify(CLK_SYS_RESUS_CTRL::ENABLE::SET);
    }

    /// Run the reference slice from the crystal with divisor 1. Must happen
    /// after the XOSC reports stable and before the first PLL switch.
    pub fn configure_reference_from_xosc(&self) {
        self.registers
            .clk_ref_ctrl
            .modify(CLK_REF_CTRL::SRC::XOSC_CLKSRC);
        // Selected is one-hot over the glitchless sources; XOSC is source 2.
        while self.registers.clk_ref_selected.get() & (1 << 2) == 0 {}
        self.registers.clk_ref_div.set(1 << 8);
        self.set_frequency(Clock::Reference, XOSC_FREQ_KHZ * 1000);
    }

    /// Feed the peripheral slice straight from the crystal so UART timing is
    /// independent of system-clock ramps.
    pub fn configure_peripheral_from_xosc(&self) {
        self.registers
            .clk_peri_ctrl
            .modify(CLK_PERI_CTRL::ENABLE::CLEAR);
        // ENABLE propagation takes a few cycles of the slice's own clock.
        for _ in 0..16 {
            cortex_m::asm::nop();
        }
        self.registers
            .clk_peri_ctrl
            .modify(CLK_PERI_CTRL::AUXSRC::XOSC_CLKSRC);
        self.registers
            .clk_peri_ctrl
            .modify(CLK_PERI_CTRL::ENABLE::SET);
        self.set_frequency(Clock::Peripheral, XOSC_FREQ_KHZ * 1000);
    }

    /// Park clk_sys on the glitchless reference slice.
    fn switch_sys_to_reference(&self) {
        self.registers.clk_sys_ctrl.modify(CLK_SYS_CTRL::SRC::CLK_REF);
        while self.registers.clk_sys_selected.get() & 0x1 == 0 {}
    }

    /// Route clk_sys from the system PLL, divisor 1.
    fn switch_sys_to_pll(&self) {
        self.registers
            .clk_sys_ctrl
            .modify(CLK_SYS_CTRL::AUXSRC::CLKSRC_PLL_SYS);
        self.registers
            .clk_sys_ctrl
            .modify(CLK_SYS_CTRL::SRC::CLKSRC_CLK_SYS_AUX);
        while self.registers.clk_sys_selected.get() & 0x2 == 0 {}
        self.registers
            .clk_sys_div
            .modify(CLK_SYS_DIV::INT.val(1) + CLK_SYS_DIV::FRAC.val(0));
    }

    /// Program the system PLL. The lock wait is bounded; a timeout powers
    /// the PLL back down and reports failure.
    fn pll_sys_reconfigure(&self, params: PllParams) -> Result<(), ErrorCode> {
        let pll = self.pll_sys;

        pll.pwr
            .modify(PWR::PD::SET + PWR::DSMPD::SET + PWR::POSTDIVPD::SET + PWR::VCOPD::SET);
        pll.fbdiv_int.modify(FBDIV_INT::FBDIV_INT.val(0));

        let ref_khz = XOSC_FREQ_KHZ / params.refdiv;
        pll.cs.modify(CS::REFDIV.val(params.refdiv));
        let fbdiv = params.vco_khz / ref_khz;
        pll.fbdiv_int.modify(FBDIV_INT::FBDIV_INT.val(fbdiv));

        pll.pwr.modify(PWR::PD::CLEAR + PWR::VCOPD::CLEAR);

        let mut spins: u32 = 0;
        while !pll.cs.is_set(CS::LOCK) {
            spins += 1;
            if spins > PLL_LOCK_SPIN_LIMIT {
                pll.pwr.modify(
                    PWR::PD::SET + PWR::DSMPD::SET + PWR::POSTDIVPD::SET + PWR::VCOPD::SET,
                );
                return Err(ErrorCode::FAIL);
            }
        }

        pll.prim
            .modify(PRIM::POSTDIV1.val(params.post_div1) + PRIM::POSTDIV2.val(params.post_div2));
        pll.pwr.modify(PWR::POSTDIVPD::CLEAR);
        Ok(())
    }

    /// Retune clk_sys to `khz`. The core keeps executing from the reference
    /// clock while the PLL relocks. On failure the previous configuration is
    /// restored when possible; the system stays on the 12 MHz reference as a
    /// last resort.
    pub fn set_sys_clock_khz(&self, khz: u32) -> Result<(), ErrorCode> {
        let params = pll_params_for_khz(XOSC_FREQ_KHZ, khz).ok_or(ErrorCode::INVAL)?;

        self.switch_sys_to_reference();
        match self.pll_sys_reconfigure(params) {
            Ok(()) => {
                self.switch_sys_to_pll();
                self.current_pll.set(Some(params));
                self.set_frequency(Clock::System, khz * 1000);
                Ok(())
            }
            Err(error) => {
                if let Some(previous) = self.current_pll.get() {
                    if self.pll_sys_reconfigure(previous).is_ok() {
                        self.switch_sys_to_pll();
                    }
                }
                Err(error)
            }
        }
    }
}

impl SystemClockControl for Clocks {
    fn probe_khz(&self, khz: u32) -> bool {
        pll_params_for_khz(XOSC_FREQ_KHZ, khz).is_some()
    }

    fn set_khz(&self, khz: u32) -> Result<(), ErrorCode> {
        self.set_sys_clock_khz(khz)
    }

    fn khz(&self) -> u32 {
        self.get_frequency(Clock::System) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_endpoints_are_synthesizable() {
        let low = pll_params_for_khz(12_000, 125_000).unwrap();
        assert_eq!(low.vco_khz / (low.post_div1 * low.post_div2), 125_000);

        let high = pll_params_for_khz(12_000, 264_000).unwrap();
        assert_eq!(high.vco_khz / (high.post_div1 * high.post_div2), 264_000);
    }

    #[test]
    fn stock_125_mhz_solution_matches_datasheet() {
        // 1500 MHz VCO / (6 * 2) is the canonical 125 MHz configuration.
        let params = pll_params_for_khz(12_000, 125_000).unwrap();
        assert_eq!(params.vco_khz, 1_500_000);
        assert_eq!(params.post_div1 * params.post_div2, 12);
    }

    #[test]
    fn unsynthesizable_frequencies_are_rejected() {
        // 265 MHz has no divisor triple; this is why MAX_KHZ is 264000.
        assert!(pll_params_for_khz(12_000, 265_000).is_none());
        assert!(pll_params_for_khz(12_000, 0).is_none());
        assert!(pll_params_for_khz(12_000, 133_337).is_none());
    }

    #[test]
    fn solutions_respect_vco_and_divider_limits() {
        for khz in [125_000u32, 150_000, 200_000, 230_000, 250_000, 264_000] {
            let params = pll_params_for_khz(12_000, khz).unwrap();
            assert!(params.vco_khz >= VCO_MIN_KHZ && params.vco_khz <= VCO_MAX_KHZ);
            assert!((1..=7).contains(&params.post_div1));
            assert!((1..=7).contains(&params.post_div2));
            assert!(params.post_div2 <= params.post_div1);
            let fbdiv = params.vco_khz / 12_000;
            assert!((FBDIV_MIN..=FBDIV_MAX).contains(&fbdiv));
        }
    }
}
