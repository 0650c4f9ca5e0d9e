// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Shared kernel state.
//!
//! A single facade of word-aligned 32-bit cells read and written from both
//! cores. ARMv6-M guarantees atomic word loads and stores (there are no
//! atomic read-modify-write instructions on this core), so every field is a
//! plain load/store cell and each field has exactly one writer context:
//! `current_khz` and `current_voltage_mv` belong to the ramp engine,
//! `target_khz` to governors (and the shell collaborator, whose racing store
//! is benign because the ramp engine re-reads it each step), and
//! `core1_wdt_ping` to core 1.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::hil::vreg::CoreVoltage;

/// Frequency limits of the supported operating range (kHz).
///
/// 264_000 is the top: 265_000 has no valid PLL divisor triple.
pub const MIN_KHZ: u32 = 125_000;
pub const MAX_KHZ: u32 = 264_000;

/// Largest single ramp step (kHz) and the pacing delay between steps.
pub const RAMP_STEP_KHZ: u32 = 5_000;
pub const RAMP_DELAY_MS: u32 = 10;

/// Voltage required to run at `khz`; the sole authority for the
/// voltage-before-frequency interlock.
pub fn voltage_for_khz(khz: u32) -> CoreVoltage {
    if khz > 250_000 {
        CoreVoltage::V1_30
    } else if khz > 200_000 {
        CoreVoltage::V1_20
    } else {
        CoreVoltage::V1_10
    }
}

pub fn voltage_label(mv: u32) -> &'static str {
    match mv {
        1100 => "1.10V (default)",
        1200 => "1.20V",
        1300 => "1.30V",
        _ => "unknown",
    }
}

pub struct SystemState {
    target_khz: AtomicU32,
    current_khz: AtomicU32,
    current_voltage_mv: AtomicU32,
    throttle_active: AtomicBool,
    core1_wdt_ping: AtomicU32,
    live_stats: AtomicBool,
    stat_period_ms: AtomicU32,
}

impl SystemState {
    pub const fn new() -> SystemState {
        SystemState {
            target_khz: AtomicU32::new(MAX_KHZ),
            current_khz: AtomicU32::new(MIN_KHZ),
            current_voltage_mv: AtomicU32::new(1100),
            throttle_active: AtomicBool::new(false),
            core1_wdt_ping: AtomicU32::new(0),
            live_stats: AtomicBool::new(false),
            stat_period_ms: AtomicU32::new(500),
        }
    }

    pub fn target_khz(&self) -> u32 {
        self.target_khz.load(Ordering::Acquire)
    }

    pub fn set_target_khz(&self, khz: u32) {
        self.target_khz.store(khz, Ordering::Release);
    }

    pub fn current_khz(&self) -> u32 {
        self.current_khz.load(Ordering::Acquire)
    }

    /// Written only by the ramp engine, after the PLL has settled.
    pub fn set_current_khz(&self, khz: u32) {
        self.current_khz.store(khz, Ordering::Release);
    }

    pub fn current_voltage_mv(&self) -> u32 {
        self.current_voltage_mv.load(Ordering::Acquire)
    }

    /// Written only on the ramp/pre-warm path, at the instant the regulator
    /// is programmed.
    pub fn set_current_voltage_mv(&self, mv: u32) {
        self.current_voltage_mv.store(mv, Ordering::Release);
    }

    pub fn throttle_active(&self) -> bool {
        self.throttle_active.load(Ordering::Relaxed)
    }

    pub fn set_throttle_active(&self, active: bool) {
        self.throttle_active.store(active, Ordering::Relaxed);
    }

    pub fn core1_wdt_ping(&self) -> u32 {
        self.core1_wdt_ping.load(Ordering::Relaxed)
    }

    /// Advance the liveness counter. Single writer (core 1), so the
    /// load/store pair needs no atomicity beyond word access.
    pub fn ping_core1_wdt(&self) {
        let ping = self.core1_wdt_ping.load(Ordering::Relaxed);
        self.core1_wdt_ping
            .store(ping.wrapping_add(1), Ordering::Relaxed);
    }

    pub fn live_stats(&self) -> bool {
        self.live_stats.load(Ordering::Relaxed)
    }

    pub fn set_live_stats(&self, on: bool) {
        self.live_stats.store(on, Ordering::Relaxed);
    }

    pub fn stat_period_ms(&self) -> u32 {
        self.stat_period_ms.load(Ordering::Relaxed)
    }

    pub fn set_stat_period_ms(&self, ms: u32) {
        self.stat_period_ms.store(ms, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_bands() {
        assert_eq!(voltage_for_khz(125_000), CoreVoltage::V1_10);
        assert_eq!(voltage_for_khz(200_000), CoreVoltage::V1_10);
        assert_eq!(voltage_for_khz(200_001), CoreVoltage::V1_20);
        assert_eq!(voltage_for_khz(250_000), CoreVoltage::V1_20);
        assert_eq!(voltage_for_khz(250_001), CoreVoltage::V1_30);
        assert_eq!(voltage_for_khz(MAX_KHZ), CoreVoltage::V1_30);
    }

    #[test]
    fn ping_is_monotone() {
        let state = SystemState::new();
        assert_eq!(state.core1_wdt_ping(), 0);
        state.ping_core1_wdt();
        state.ping_core1_wdt();
        assert_eq!(state.core1_wdt_ping(), 2);
    }

    #[test]
    fn initial_values() {
        let state = SystemState::new();
        assert_eq!(state.target_khz(), MAX_KHZ);
        assert_eq!(state.current_khz(), MIN_KHZ);
        assert_eq!(state.current_voltage_mv(), 1100);
        assert_eq!(state.stat_period_ms(), 500);
        assert!(!state.live_stats());
        assert!(!state.throttle_active());
    }
}
