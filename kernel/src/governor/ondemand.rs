// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! On-demand governor: ramp up aggressively when activity is seen, back off
//! slowly. Temperature doubles as an activity proxy when no metrics arrive.

use core::cell::Cell;

use crate::hil::log::LogSink;
use crate::hil::temperature::TemperatureSource;
use crate::hil::time::ClockSource;
use crate::metrics::MetricsAggregate;
use crate::state::{SystemState, MAX_KHZ, MIN_KHZ};

use super::{Governor, RampDriver};

const TICK_SLEEP_MS: u32 = 80;

/// Step sizes; the backoff step is large enough to clear PLL quantization
/// boundaries.
const METRICS_UP_STEP_KHZ: u32 = 30_000;
const COLD_UP_STEP_KHZ: u32 = 20_000;
const DOWN_STEP_KHZ: u32 = 10_000;

/// Minimum interval between idle backoffs, preventing oscillation.
const IDLE_BACKOFF_COOLDOWN_MS: u32 = 500;

pub struct OndemandGovernor<'a> {
    state: &'a SystemState,
    driver: &'a RampDriver<'a>,
    temperature: &'a dyn TemperatureSource,
    time: &'a dyn ClockSource,
    log: &'a dyn LogSink,
    last_idle_backoff_ms: Cell<u32>,
}

impl<'a> OndemandGovernor<'a> {
    pub const fn new(
        state: &'a SystemState,
        driver: &'a RampDriver<'a>,
        temperature: &'a dyn TemperatureSource,
        time: &'a dyn ClockSource,
        log: &'a dyn LogSink,
    ) -> OndemandGovernor<'a> {
        OndemandGovernor {
            state,
            driver,
            temperature,
            time,
            log,
            last_idle_backoff_ms: Cell::new(0),
        }
    }
}

impl<'a> Governor for OndemandGovernor<'a> {
    fn name(&self) -> &'static str {
        "ondemand"
    }

    fn init(&self) {
        self.last_idle_backoff_ms.set(self.time.now_ms());
    }

    fn tick(&self, aggregate: &MetricsAggregate) {
        self.state.ping_core1_wdt();
        let temperature = self.temperature.read_celsius();
        let now = self.time.now_ms();
        let target = self.state.target_khz();

        let is_idle = aggregate.count == 0 || aggregate.avg_intensity < 30.0;

        if aggregate.count > 0 && aggregate.avg_intensity > 70.0 {
            if target < MAX_KHZ {
                self.state
                    .set_target_khz(target.saturating_add(METRICS_UP_STEP_KHZ).min(MAX_KHZ));
                self.log.log("gov:ondemand ramp up (metrics)");
            }
        } else if !is_idle && temperature < 50.0 && target < MAX_KHZ {
            self.state
                .set_target_khz(target.saturating_add(COLD_UP_STEP_KHZ).min(MAX_KHZ));
            self.log.log("gov:ondemand ramp up");
        } else if temperature > 65.0 && target > MIN_KHZ {
            self.state
                .set_target_khz(target.saturating_sub(DOWN_STEP_KHZ).max(MIN_KHZ));
            self.log.log("gov:ondemand backoff (hot)");
        } else if is_idle
            && temperature < 48.0
            && target > MIN_KHZ
            && now.wrapping_sub(self.last_idle_backoff_ms.get()) >= IDLE_BACKOFF_COOLDOWN_MS
        {
            self.state
                .set_target_khz(target.saturating_sub(DOWN_STEP_KHZ).max(MIN_KHZ));
            self.last_idle_backoff_ms.set(now);
            self.log.log("gov:ondemand idle backoff");
        }

        self.driver.drive();
        self.time.delay_ms(TICK_SLEEP_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::tests::{config_with_buffer, MemStore};
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
    fn hot_chip_backs_off_and_idle_backoff_is_rate_limited() {
        let lock = NoopLock;
        let state = crate::state::SystemState::new();
        let clock = AcceptAllClock {
            khz: Cell::new(MIN_KHZ),
        };
        let vreg = RecordingVreg::new();
        let lockout = CountingLockout::new();
        let time = FakeClock::new();
        let log = RecordingLog::new();
        let temp = FakeTemp::new(70.0);
        let store = MemStore::new();
        let _config = config_with_buffer(&store);

        let ramp = RampEngine::new(&state, &clock, &vreg, &lockout, &time, &log);
        let arbiter = StabilityArbiter::new(&lock);
        let driver = RampDriver::new(&state, &ramp, &arbiter, &time, &log);
        let governor = OndemandGovernor::new(&state, &driver, &temp, &time, &log);

        state.set_target_khz(200_000);
        governor.tick(&MetricsAggregate::default());
        assert_eq!(state.target_khz(), 190_000);
        assert!(log.contains("backoff (hot)"));

        // Cool and idle: backoffs are spaced by the idle cooldown.
        temp.celsius.set(40.0);
        governor.init();
        governor.tick(&MetricsAggregate::default());
        let after_first = state.target_khz();
        governor.tick(&MetricsAggregate::default());
        // 80 ms of tick pacing < 500 ms cooldown: no second backoff yet.
        assert_eq!(state.target_khz(), after_first);
        time.advance_ms(600);
        governor.tick(&MetricsAggregate::default());
        assert_eq!(state.target_khz(), after_first - DOWN_STEP_KHZ);
    }

    #[test]
    fn busy_metrics_ramp_up_aggressively() {
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
        let store = MemStore::new();
        let _config = config_with_buffer(&store);

        let ramp = RampEngine::new(&state, &clock, &vreg, &lockout, &time, &log);
        let arbiter = StabilityArbiter::new(&lock);
        let driver = RampDriver::new(&state, &ramp, &arbiter, &time, &log);
        let governor = OndemandGovernor::new(&state, &driver, &temp, &time, &log);

        state.set_target_khz(200_000);
        let busy = MetricsAggregate {
            count: 3,
            avg_workload: 1.0,
            avg_intensity: 85.0,
            avg_duration_ms: 100.0,
            last_ts_ms: 0,
        };
        governor.tick(&busy);
        assert_eq!(state.target_khz(), 230_000);
        governor.tick(&busy);
        governor.tick(&busy);
        // Clamped at the top of the range.
        assert_eq!(state.target_khz(), MAX_KHZ);
    }
}
