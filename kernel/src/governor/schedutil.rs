// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Schedutil-style governor: follow a utilization estimate linearly.
//!
//! App-reported intensity is the utilization signal when samples are
//! available; otherwise temperature stands in as a rough proxy. The target
//! maps utilization onto [MIN_KHZ, MAX_KHZ] with +/-5% hysteresis so PLL
//! quantization noise does not cause constant re-targeting.

use crate::hil::log::LogSink;
use crate::hil::temperature::TemperatureSource;
use crate::hil::time::ClockSource;
use crate::metrics::MetricsAggregate;
use crate::state::{SystemState, MAX_KHZ, MIN_KHZ};

use super::{Governor, RampDriver};

const TICK_SLEEP_MS: u32 = 60;

/// Hysteresis band as a percentage of the frequency range.
const HYSTERESIS_PCT: u32 = 5;

pub struct SchedutilGovernor<'a> {
    state: &'a SystemState,
    driver: &'a RampDriver<'a>,
    temperature: &'a dyn TemperatureSource,
    time: &'a dyn ClockSource,
    log: &'a dyn LogSink,
}

impl<'a> SchedutilGovernor<'a> {
    pub const fn new(
        state: &'a SystemState,
        driver: &'a RampDriver<'a>,
        temperature: &'a dyn TemperatureSource,
        time: &'a dyn ClockSource,
        log: &'a dyn LogSink,
    ) -> SchedutilGovernor<'a> {
        SchedutilGovernor {
            state,
            driver,
            temperature,
            time,
            log,
        }
    }

    fn utilization_pct(&self, aggregate: &MetricsAggregate) -> u32 {
        let util = if aggregate.count > 0 {
            aggregate.avg_intensity
        } else {
            // Temperature proxy: ~30 C maps to zero utilization.
            self.temperature.read_celsius() - 30.0
        };
        util.clamp(0.0, 100.0) as u32
    }
}

impl<'a> Governor for SchedutilGovernor<'a> {
    fn name(&self) -> &'static str {
        "schedutil"
    }

    fn init(&self) {}

    fn tick(&self, aggregate: &MetricsAggregate) {
        self.state.ping_core1_wdt();
        let util = self.utilization_pct(aggregate);
        let span = MAX_KHZ - MIN_KHZ;
        let target = MIN_KHZ + span * util / 100;

        let previous = self.state.target_khz();
        if target.abs_diff(previous) > span * HYSTERESIS_PCT / 100 {
            self.state.set_target_khz(target);
            self.log.log("gov:schedutil adjusted target");
        }

        self.driver.drive();
        self.time.delay_ms(TICK_SLEEP_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::RampDriver;
    use crate::hil::clocks::SystemClockControl;
    use crate::ramp::RampEngine;
    use crate::stability::StabilityArbiter;
    use crate::testing::{
        CountingLockout, FakeClock, FakeTemp, NoopLock, RecordingLog, RecordingVreg,
    };
    use crate::ErrorCode;
    use std::cell::Cell;

    struct AcceptAllClock {
        khz: Cell<u32>,
    }

    impl SystemClockControl for AcceptAllClock {
        fn probe_khz(&self, _khz: u32) -> bool {
            true
        }
        fn set_khz(&self, khz: u32) -> Result<(), ErrorCode> {
            self.khz.set(khz);
            Ok(())
        }
        fn khz(&self) -> u32 {
            self.khz.get()
        }
    }

    #[test]
    fn intensity_maps_linearly_with_hysteresis() {
        let lock = NoopLock;
        let state = crate::state::SystemState::new();
        let clock = AcceptAllClock {
            khz: Cell::new(MIN_KHZ),
        };
        let vreg = RecordingVreg::new();
        let lockout = CountingLockout::new();
        let time = FakeClock::new();
        let log = RecordingLog::new();
        let temp = FakeTemp::new(40.0);

        let ramp = RampEngine::new(&state, &clock, &vreg, &lockout, &time, &log);
        let arbiter = StabilityArbiter::new(&lock);
        let driver = RampDriver::new(&state, &ramp, &arbiter, &time, &log);
        let governor = SchedutilGovernor::new(&state, &driver, &temp, &time, &log);

        let at = |intensity: f32| MetricsAggregate {
            count: 1,
            avg_workload: 0.0,
            avg_intensity: intensity,
            avg_duration_ms: 100.0,
            last_ts_ms: 0,
        };

        governor.tick(&at(0.0));
        assert_eq!(state.target_khz(), MIN_KHZ);
        governor.tick(&at(100.0));
        assert_eq!(state.target_khz(), MAX_KHZ);
        governor.tick(&at(50.0));
        assert_eq!(state.target_khz(), MIN_KHZ + (MAX_KHZ - MIN_KHZ) / 2);

        // A 2% wiggle sits inside the hysteresis band.
        governor.tick(&at(52.0));
        assert_eq!(state.target_khz(), MIN_KHZ + (MAX_KHZ - MIN_KHZ) / 2);
        // A 10% move does not.
        governor.tick(&at(60.0));
        assert_eq!(state.target_khz(), MIN_KHZ + (MAX_KHZ - MIN_KHZ) * 60 / 100);
    }
}
