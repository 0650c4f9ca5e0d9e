// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Clock/voltage ramp engine.
//!
//! Moves the system clock one bounded step at a time toward a target while
//! maintaining the voltage-before-frequency interlock: stepping up, the rail
//! is raised before the PLL is touched; stepping down, it is lowered only
//! after the PLL has settled. The other core is parked across the PLL
//! reconfigure.
//!
//! Not every kilohertz has a PLL divisor solution, so each candidate is
//! probed first. A failed reconfigure ("PLL edge") is never fatal: it is
//! logged, `target_khz` is clamped to the unchanged `current_khz`, and the
//! step reports done so governors move on instead of retrying the same value.

use core::fmt::Write;

use crate::hil::clocks::SystemClockControl;
use crate::hil::log::LogSink;
use crate::hil::multicore::CoreLockout;
use crate::hil::time::ClockSource;
use crate::hil::vreg::VoltageRegulator;
use crate::state::{voltage_for_khz, voltage_label, SystemState};
use crate::state::{MAX_KHZ, MIN_KHZ, RAMP_DELAY_MS, RAMP_STEP_KHZ};
use crate::utilities::fmt::WriteBuf;

/// How far `find_achievable_khz` walks (kHz, 1 kHz at a time) looking for a
/// frequency the PLL can actually produce.
pub const PROBE_SPAN_KHZ: u32 = 50;

pub struct RampEngine<'a> {
    state: &'a SystemState,
    clock: &'a dyn SystemClockControl,
    vreg: &'a dyn VoltageRegulator,
    lockout: &'a dyn CoreLockout,
    time: &'a dyn ClockSource,
    log: &'a dyn LogSink,
}

impl<'a> RampEngine<'a> {
    pub const fn new(
        state: &'a SystemState,
        clock: &'a dyn SystemClockControl,
        vreg: &'a dyn VoltageRegulator,
        lockout: &'a dyn CoreLockout,
        time: &'a dyn ClockSource,
        log: &'a dyn LogSink,
    ) -> RampEngine<'a> {
        RampEngine {
            state,
            clock,
            vreg,
            lockout,
            time,
            log,
        }
    }

    /// Advance one step toward `new_khz`. Returns true iff already at the
    /// target (or the step was abandoned on a PLL edge). Never sleeps; safe
    /// to call from the governor core.
    pub fn ramp_step(&self, new_khz: u32) -> bool {
        let current = self.state.current_khz();
        if current == new_khz {
            return true;
        }

        let candidate = if new_khz > current {
            current.saturating_add(RAMP_STEP_KHZ).min(new_khz)
        } else {
            current.saturating_sub(RAMP_STEP_KHZ).max(new_khz)
        };
        let candidate = candidate.clamp(MIN_KHZ, MAX_KHZ);
        if candidate == current {
            // Target lies outside the operating range; nothing to do.
            return true;
        }
        let next = self.find_achievable_khz(candidate, new_khz);

        if next > current {
            let needed = voltage_for_khz(next);
            if needed.millivolts() > self.state.current_voltage_mv() {
                self.vreg.set_voltage(needed);
                self.state.set_current_voltage_mv(needed.millivolts());
            }
        }

        self.lockout.pause_other_core();
        let result = self.clock.set_khz(next);
        self.lockout.resume_other_core();

        if result.is_err() {
            let mut buf = [0u8; 96];
            let mut line = WriteBuf::new(&mut buf);
            let _ = write!(
                line,
                "PLL edge at {} kHz; holding {} kHz",
                next, current
            );
            self.log.log(line.as_str());
            self.state.set_target_khz(current);
            return true;
        }

        if next < current {
            let needed = voltage_for_khz(next);
            if needed.millivolts() < self.state.current_voltage_mv() {
                self.vreg.set_voltage(needed);
                self.state.set_current_voltage_mv(needed.millivolts());
            }
        }

        self.state.set_current_khz(next);
        next == new_khz
    }

    /// Blocking convenience loop: steps to `new_khz` with inter-step pacing
    /// and a core-1 watchdog ping per step, so the liveness watchdog cannot
    /// fire during a long ramp (worst case ~28 steps).
    pub fn ramp_to(&self, new_khz: u32) {
        {
            let mut buf = [0u8; 64];
            let mut line = WriteBuf::new(&mut buf);
            let _ = write!(line, "ramp requested to {} kHz", new_khz);
            self.log.log(line.as_str());
        }

        loop {
            self.state.ping_core1_wdt();
            if self.ramp_step(new_khz) {
                break;
            }
            self.time.delay_ms(RAMP_DELAY_MS);
        }

        let mut buf = [0u8; 64];
        let mut line = WriteBuf::new(&mut buf);
        let _ = write!(
            line,
            "clock set to {} kHz @ {}",
            self.state.current_khz(),
            voltage_label(self.state.current_voltage_mv())
        );
        self.log.log(line.as_str());
    }

    /// First frequency with a valid PLL divisor solution within
    /// [`PROBE_SPAN_KHZ`] of `want`, walking 1 kHz at a time in the
    /// direction of `toward` (nearest-first in both directions when
    /// `want == toward`). Falls back to `want` and lets the hardware reject
    /// it when nothing in range probes valid.
    pub fn find_achievable_khz(&self, want: u32, toward: u32) -> u32 {
        if want == toward {
            for offset in 0..=PROBE_SPAN_KHZ {
                if self.clock.probe_khz(want + offset) {
                    return want + offset;
                }
                if offset != 0 && offset < want && self.clock.probe_khz(want - offset) {
                    return want - offset;
                }
            }
        } else if toward > want {
            for offset in 0..=PROBE_SPAN_KHZ {
                if self.clock.probe_khz(want + offset) {
                    return want + offset;
                }
            }
        } else {
            for offset in 0..=PROBE_SPAN_KHZ {
                let candidate = want.saturating_sub(offset);
                if self.clock.probe_khz(candidate) {
                    return candidate;
                }
            }
        }
        want
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hil::clocks::SystemClockControl;
    use crate::hil::vreg::CoreVoltage;
    use crate::testing::{CountingLockout, FakeClock, RecordingLog, RecordingVreg};
    use crate::ErrorCode;
    use std::cell::{Cell, RefCell};

    /// System clock mock: a predicate decides which frequencies have divisor
    /// solutions, a flag makes `set_khz` fail, and every accepted set is
    /// recorded.
    struct TestClock {
        valid: fn(u32) -> bool,
        fail_set: Cell<bool>,
        khz: Cell<u32>,
        sets: RefCell<Vec<u32>>,
    }

    impl TestClock {
        fn accepting_all(start_khz: u32) -> TestClock {
            TestClock {
                valid: |_| true,
                fail_set: Cell::new(false),
                khz: Cell::new(start_khz),
                sets: RefCell::new(Vec::new()),
            }
        }
    }

    impl SystemClockControl for TestClock {
        fn probe_khz(&self, khz: u32) -> bool {
            (self.valid)(khz)
        }
        fn set_khz(&self, khz: u32) -> Result<(), ErrorCode> {
            if self.fail_set.get() {
                return Err(ErrorCode::FAIL);
            }
            self.khz.set(khz);
            self.sets.borrow_mut().push(khz);
            Ok(())
        }
        fn khz(&self) -> u32 {
            self.khz.get()
        }
    }

    struct Harness {
        state: SystemState,
        clock: TestClock,
        vreg: RecordingVreg,
        lockout: CountingLockout,
        time: FakeClock,
        log: RecordingLog,
    }

    impl Harness {
        fn new(clock: TestClock) -> Harness {
            Harness {
                state: SystemState::new(),
                clock,
                vreg: RecordingVreg::new(),
                lockout: CountingLockout::new(),
                time: FakeClock::new(),
                log: RecordingLog::new(),
            }
        }

        fn engine(&self) -> RampEngine<'_> {
            RampEngine::new(
                &self.state,
                &self.clock,
                &self.vreg,
                &self.lockout,
                &self.time,
                &self.log,
            )
        }
    }

    #[test]
    fn full_ramp_up_is_monotone_with_voltage_interlock() {
        let h = Harness::new(TestClock::accepting_all(MIN_KHZ));
        let engine = h.engine();
        // current = 125 MHz @ 1.10 V, targeting the top of the range
        h.state.set_target_khz(MAX_KHZ);

        let mut guard = 0;
        while !engine.ramp_step(MAX_KHZ) {
            guard += 1;
            assert!(guard < 100, "ramp failed to terminate");
        }

        assert_eq!(h.state.current_khz(), MAX_KHZ);
        let sets = h.clock.sets.borrow();
        let mut previous = MIN_KHZ;
        for &khz in sets.iter() {
            assert!(khz > previous, "ramp must be monotone");
            assert!(khz - previous <= RAMP_STEP_KHZ);
            previous = khz;
        }
        assert_eq!(previous, MAX_KHZ);

        // Voltage raised to 1.20 V before the first step over 200 MHz and to
        // 1.30 V before the first step over 250 MHz.
        let writes = h.vreg.writes.borrow();
        assert_eq!(*writes, vec![CoreVoltage::V1_20, CoreVoltage::V1_30]);
        assert_eq!(h.state.current_voltage_mv(), 1300);

        // The other core was parked exactly once per PLL reconfigure.
        assert_eq!(h.lockout.pauses.get(), sets.len() as u32);
        assert_eq!(h.lockout.resumes.get(), sets.len() as u32);
    }

    #[test]
    fn ramp_down_lowers_voltage_after_the_fact() {
        let h = Harness::new(TestClock::accepting_all(MAX_KHZ));
        h.state.set_current_khz(MAX_KHZ);
        h.state.set_current_voltage_mv(1300);
        let engine = h.engine();

        let mut guard = 0;
        while !engine.ramp_step(MIN_KHZ) {
            guard += 1;
            assert!(guard < 100);
        }
        assert_eq!(h.state.current_khz(), MIN_KHZ);
        assert_eq!(h.state.current_voltage_mv(), 1100);
        let writes = h.vreg.writes.borrow();
        assert_eq!(*writes, vec![CoreVoltage::V1_20, CoreVoltage::V1_10]);
    }

    #[test]
    fn step_is_idempotent_at_target() {
        let h = Harness::new(TestClock::accepting_all(MIN_KHZ));
        let engine = h.engine();
        assert!(engine.ramp_step(MIN_KHZ));
        assert!(h.clock.sets.borrow().is_empty());
        assert!(h.vreg.writes.borrow().is_empty());
    }

    #[test]
    fn pll_edge_clamps_target_and_keeps_current() {
        // Probe accepts 145 MHz but the hardware set fails.
        let clock = TestClock {
            valid: |khz| khz == 145_000 || khz == 140_000,
            fail_set: Cell::new(true),
            khz: Cell::new(140_000),
            sets: RefCell::new(Vec::new()),
        };
        let h = Harness::new(clock);
        h.state.set_current_khz(140_000);
        h.state.set_target_khz(150_000);
        let engine = h.engine();

        assert!(engine.ramp_step(150_000), "edge step must report done");
        assert_eq!(h.state.current_khz(), 140_000);
        assert_eq!(h.state.target_khz(), 140_000);
        assert_eq!(h.log.count_containing("PLL edge"), 1);
    }

    #[test]
    fn probe_walks_to_nearest_achievable() {
        let clock = TestClock {
            // Divisor solutions exist every 16 kHz.
            valid: |khz| khz % 16 == 0,
            fail_set: Cell::new(false),
            khz: Cell::new(MIN_KHZ),
            sets: RefCell::new(Vec::new()),
        };
        let h = Harness::new(clock);
        let engine = h.engine();

        // Exact identity when the frequency is valid.
        assert_eq!(engine.find_achievable_khz(128_000, 128_000), 128_000);
        // Nearest valid value when it is not (+7 beats -9).
        assert_eq!(engine.find_achievable_khz(127_001, 127_001), 127_008);
        // Direction of travel is respected.
        assert_eq!(engine.find_achievable_khz(130_001, 140_000), 130_016);
        assert_eq!(engine.find_achievable_khz(130_001, 125_000), 130_000);
    }

    #[test]
    fn probe_falls_back_to_target_when_nothing_matches() {
        let clock = TestClock {
            valid: |_| false,
            fail_set: Cell::new(false),
            khz: Cell::new(MIN_KHZ),
            sets: RefCell::new(Vec::new()),
        };
        let h = Harness::new(clock);
        let engine = h.engine();
        assert_eq!(engine.find_achievable_khz(130_000, 140_000), 130_000);
    }

    #[test]
    fn ramp_to_pings_the_watchdog() {
        let h = Harness::new(TestClock::accepting_all(MIN_KHZ));
        let engine = h.engine();
        let before = h.state.core1_wdt_ping();
        engine.ramp_to(150_000);
        assert_eq!(h.state.current_khz(), 150_000);
        assert!(h.state.core1_wdt_ping() > before);
        assert!(h.log.contains("ramp requested to 150000 kHz"));
        assert!(h.log.contains("clock set to 150000 kHz @ 1.10V (default)"));
    }
}
