// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Shared mock implementations of the HIL contracts for host unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::hil::counters::CycleCounters;
use crate::hil::log::LogSink;
use crate::hil::multicore::CoreLockout;
use crate::hil::sync::Spinlock;
use crate::hil::temperature::TemperatureSource;
use crate::hil::time::ClockSource;
use crate::hil::vreg::{CoreVoltage, VoltageRegulator};

/// Host tests are single threaded; locking is a no-op.
pub struct NoopLock;

impl Spinlock for NoopLock {
    fn claim(&self) {}
    fn release(&self) {}
}

/// A manually advanced clock. `delay_*` advances it so paced loops make
/// progress under test.
pub struct FakeClock {
    pub us: Cell<u64>,
}

impl FakeClock {
    pub fn new() -> FakeClock {
        FakeClock { us: Cell::new(0) }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.us.set(self.us.get() + ms * 1000);
    }
}

impl ClockSource for FakeClock {
    fn now_us(&self) -> u64 {
        self.us.get()
    }
    fn delay_us(&self, us: u32) {
        self.us.set(self.us.get() + us as u64);
    }
}

/// Captures log lines for assertions.
pub struct RecordingLog {
    pub lines: RefCell<Vec<String>>,
}

impl RecordingLog {
    pub fn new() -> RecordingLog {
        RecordingLog {
            lines: RefCell::new(Vec::new()),
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|l| l.contains(needle))
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines.borrow().iter().filter(|l| l.contains(needle)).count()
    }
}

impl LogSink for RecordingLog {
    fn log(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }
}

/// Records regulator writes in order.
pub struct RecordingVreg {
    pub writes: RefCell<Vec<CoreVoltage>>,
}

impl RecordingVreg {
    pub fn new() -> RecordingVreg {
        RecordingVreg {
            writes: RefCell::new(Vec::new()),
        }
    }
}

impl VoltageRegulator for RecordingVreg {
    fn set_voltage(&self, voltage: CoreVoltage) {
        self.writes.borrow_mut().push(voltage);
    }
}

/// Counts pause/resume pairs.
pub struct CountingLockout {
    pub pauses: Cell<u32>,
    pub resumes: Cell<u32>,
}

impl CountingLockout {
    pub fn new() -> CountingLockout {
        CountingLockout {
            pauses: Cell::new(0),
            resumes: Cell::new(0),
        }
    }
}

impl CoreLockout for CountingLockout {
    fn pause_other_core(&self) {
        self.pauses.set(self.pauses.get() + 1);
    }
    fn resume_other_core(&self) {
        self.resumes.set(self.resumes.get() + 1);
    }
}

/// Fixed-reading thermometer.
pub struct FakeTemp {
    pub celsius: Cell<f32>,
}

impl FakeTemp {
    pub fn new(celsius: f32) -> FakeTemp {
        FakeTemp {
            celsius: Cell::new(celsius),
        }
    }
}

impl TemperatureSource for FakeTemp {
    fn read_celsius(&self) -> f32 {
        self.celsius.get()
    }
}

/// Queued PIO counter samples.
pub struct FakeCounters {
    pub idle: RefCell<VecDeque<u32>>,
    pub periods: RefCell<VecDeque<u32>>,
}

impl FakeCounters {
    pub fn new() -> FakeCounters {
        FakeCounters {
            idle: RefCell::new(VecDeque::new()),
            periods: RefCell::new(VecDeque::new()),
        }
    }

    pub fn push_period(&self, ticks: u32) {
        self.periods.borrow_mut().push_back(ticks);
    }

    pub fn push_idle(&self, ticks: u32) {
        self.idle.borrow_mut().push_back(ticks);
    }
}

impl CycleCounters for FakeCounters {
    fn take_idle_sample(&self) -> Option<u32> {
        self.idle.borrow_mut().pop_front()
    }
    fn take_period_sample(&self) -> Option<u32> {
        self.periods.borrow_mut().pop_front()
    }
}
