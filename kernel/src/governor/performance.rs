// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Performance governor: always aim for the maximum frequency.

use crate::hil::log::LogSink;
use crate::hil::time::ClockSource;
use crate::metrics::MetricsAggregate;
use crate::state::{SystemState, MAX_KHZ};

use super::{Governor, RampDriver};

const TICK_SLEEP_MS: u32 = 200;

pub struct PerformanceGovernor<'a> {
    state: &'a SystemState,
    driver: &'a RampDriver<'a>,
    time: &'a dyn ClockSource,
    log: &'a dyn LogSink,
}

impl<'a> PerformanceGovernor<'a> {
    pub const fn new(
        state: &'a SystemState,
        driver: &'a RampDriver<'a>,
        time: &'a dyn ClockSource,
        log: &'a dyn LogSink,
    ) -> PerformanceGovernor<'a> {
        PerformanceGovernor {
            state,
            driver,
            time,
            log,
        }
    }
}

impl<'a> Governor for PerformanceGovernor<'a> {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn init(&self) {
        self.state.set_target_khz(MAX_KHZ);
    }

    fn tick(&self, _aggregate: &MetricsAggregate) {
        self.state.ping_core1_wdt();
        if self.state.target_khz() != MAX_KHZ {
            self.state.set_target_khz(MAX_KHZ);
            self.log.log("gov:performance target reset to MAX");
        }
        self.driver.drive();
        self.time.delay_ms(TICK_SLEEP_MS);
    }
}
