// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Governor framework.
//!
//! A governor is a named policy that turns workload metrics and temperature
//! into `target_khz` updates. Governors are registered statically at board
//! wiring time; exactly one is current. The selection is persisted so it
//! survives reboot.

pub mod ondemand;
pub mod performance;
pub mod rp2040_perf;
pub mod schedutil;

use core::cell::Cell;
use core::fmt;
use core::fmt::Write;

use crate::hil::log::LogSink;
use crate::hil::time::ClockSource;
use crate::metrics::MetricsAggregate;
use crate::persist::{PersistentConfig, NAME_LEN};
use crate::ramp::RampEngine;
use crate::stability::StabilityArbiter;
use crate::state::SystemState;
use crate::utilities::cells::OptionalCell;
use crate::utilities::fmt::WriteBuf;
use crate::ErrorCode;

/// Decision policy invoked once per core-1 loop iteration.
pub trait Governor {
    fn name(&self) -> &'static str;

    /// Called when the governor becomes current (and once at boot for the
    /// restored selection).
    fn init(&self);

    /// One decision pass over the tick's metrics aggregate (`count == 0`
    /// when no samples arrived). Runs on core 1; paces itself with a short
    /// sleep.
    fn tick(&self, aggregate: &MetricsAggregate);

    /// Render human-readable runtime statistics.
    fn export_stats(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let _ = out;
        Ok(())
    }
}

pub const MAX_GOVERNORS: usize = 8;

/// Fallback selection when nothing was persisted.
const DEFAULT_GOVERNOR: &str = "rp2040_perf";

pub struct GovernorRegistry<'a> {
    slots: [OptionalCell<&'a dyn Governor>; MAX_GOVERNORS],
    current: OptionalCell<&'a dyn Governor>,
    config: &'a PersistentConfig<'a>,
    log: &'a dyn LogSink,
}

impl<'a> GovernorRegistry<'a> {
    pub const fn new(
        config: &'a PersistentConfig<'a>,
        log: &'a dyn LogSink,
    ) -> GovernorRegistry<'a> {
        GovernorRegistry {
            slots: [
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
            ],
            current: OptionalCell::empty(),
            config,
            log,
        }
    }

    pub fn register(&self, governor: &'a dyn Governor) -> Result<(), ErrorCode> {
        for slot in self.slots.iter() {
            if slot.is_none() {
                slot.set(governor);
                return Ok(());
            }
        }
        Err(ErrorCode::NOMEM)
    }

    /// Select the persisted governor (falling back to `rp2040_perf`, then to
    /// the first registered) and run its `init`.
    pub fn init(&self) {
        if self.current.is_some() {
            return;
        }

        let mut saved = [0u8; NAME_LEN];
        let restored = match self.config.load_name(&mut saved) {
            Ok(len) => core::str::from_utf8(&saved[..len])
                .ok()
                .and_then(|name| self.find_by_name(name)),
            Err(_) => None,
        };

        let selected = restored
            .or_else(|| self.find_by_name(DEFAULT_GOVERNOR))
            .or_else(|| self.get(0));

        if let Some(governor) = selected {
            self.current.set(governor);
            governor.init();
        }
    }

    pub fn current(&self) -> Option<&'a dyn Governor> {
        self.current.get()
    }

    /// Switch policies: runs the new governor's `init` and persists the
    /// selection.
    pub fn set_current(&self, governor: &'a dyn Governor) {
        self.current.set(governor);
        governor.init();
        if self.config.save_name(governor.name()).is_err() {
            self.log.log("gov: failed to persist selection");
        }
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn get(&self, index: usize) -> Option<&'a dyn Governor> {
        self.slots.get(index).and_then(|slot| slot.get())
    }

    pub fn find_by_name(&self, name: &str) -> Option<&'a dyn Governor> {
        for slot in self.slots.iter() {
            if let Some(governor) = slot.get() {
                if governor.name() == name {
                    return Some(governor);
                }
            }
        }
        None
    }
}

/// Minimum interval between repeated stability-deferral log lines.
const DEFER_LOG_INTERVAL_MS: u32 = 2000;

/// Stability thresholds governors pass to the arbiter.
const GATE_IDLE_THRESH: f32 = 0.03;
const GATE_JITTER_THRESH_PCT: f32 = 3.0;
const GATE_MIN_STABLE: u32 = 4;

/// Stability-gated stepping shared by all governors.
///
/// One bounded ramp step per invocation: consult the arbiter first, defer
/// (with a rate-limited log) while the system is not stable, and tell the
/// arbiter about every frequency change so it can restart its window.
pub struct RampDriver<'a> {
    state: &'a SystemState,
    ramp: &'a RampEngine<'a>,
    arbiter: &'a StabilityArbiter<'a>,
    time: &'a dyn ClockSource,
    log: &'a dyn LogSink,
    last_defer_log_ms: Cell<u32>,
}

impl<'a> RampDriver<'a> {
    pub const fn new(
        state: &'a SystemState,
        ramp: &'a RampEngine<'a>,
        arbiter: &'a StabilityArbiter<'a>,
        time: &'a dyn ClockSource,
        log: &'a dyn LogSink,
    ) -> RampDriver<'a> {
        RampDriver {
            state,
            ramp,
            arbiter,
            time,
            log,
            last_defer_log_ms: Cell::new(0),
        }
    }

    pub fn drive(&self) {
        let target = self.state.target_khz();
        let current = self.state.current_khz();
        if target == current {
            return;
        }

        if !self
            .arbiter
            .safe_to_scale(GATE_IDLE_THRESH, GATE_JITTER_THRESH_PCT, GATE_MIN_STABLE)
        {
            let now = self.time.now_ms();
            if now.wrapping_sub(self.last_defer_log_ms.get()) >= DEFER_LOG_INTERVAL_MS {
                let mut buf = [0u8; 80];
                let mut line = WriteBuf::new(&mut buf);
                let _ = write!(
                    line,
                    "gov: hold at {} kHz, waiting for stability",
                    current
                );
                self.log.log(line.as_str());
                self.last_defer_log_ms.set(now);
            }
            return;
        }

        self.ramp.ramp_step(target);
        let after = self.state.current_khz();
        if after != current {
            self.arbiter.notify_freq_change(after);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hil::storage::SectorStore;
    use crate::metrics::MetricsAggregate;
    use crate::persist::PERSIST_SECTOR_SIZE;
    use crate::testing::RecordingLog;
    use std::cell::{Cell, RefCell};

    pub(crate) struct MemStore {
        data: RefCell<Vec<u8>>,
    }

    impl MemStore {
        pub fn new() -> MemStore {
            MemStore {
                data: RefCell::new(vec![0xFF; PERSIST_SECTOR_SIZE]),
            }
        }
    }

    impl SectorStore for MemStore {
        fn size(&self) -> usize {
            PERSIST_SECTOR_SIZE
        }
        fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), ErrorCode> {
            let data = self.data.borrow();
            buf.copy_from_slice(&data[offset..offset + buf.len()]);
            Ok(())
        }
        fn rewrite(&self, sector: &[u8]) -> Result<(), ErrorCode> {
            self.data.borrow_mut().copy_from_slice(sector);
            Ok(())
        }
    }

    pub(crate) fn config_with_buffer(store: &MemStore) -> PersistentConfig<'_> {
        let config = PersistentConfig::new(store);
        config.set_buffer(Box::leak(vec![0u8; PERSIST_SECTOR_SIZE].into_boxed_slice()));
        config
    }

    struct NamedGovernor {
        name: &'static str,
        inits: Cell<u32>,
    }

    impl NamedGovernor {
        fn new(name: &'static str) -> NamedGovernor {
            NamedGovernor {
                name,
                inits: Cell::new(0),
            }
        }
    }

    impl Governor for NamedGovernor {
        fn name(&self) -> &'static str {
            self.name
        }
        fn init(&self) {
            self.inits.set(self.inits.get() + 1);
        }
        fn tick(&self, _aggregate: &MetricsAggregate) {}
    }

    #[test]
    fn registry_selects_default_governor() {
        let store = MemStore::new();
        let config = config_with_buffer(&store);
        let log = RecordingLog::new();
        let registry = GovernorRegistry::new(&config, &log);

        let ondemand = NamedGovernor::new("ondemand");
        let reference = NamedGovernor::new("rp2040_perf");
        registry.register(&ondemand).unwrap();
        registry.register(&reference).unwrap();

        registry.init();
        assert_eq!(registry.current().unwrap().name(), "rp2040_perf");
        assert_eq!(reference.inits.get(), 1);
        // Second init is a no-op.
        registry.init();
        assert_eq!(reference.inits.get(), 1);
    }

    #[test]
    fn selection_is_persisted_and_restored() {
        let store = MemStore::new();
        let config = config_with_buffer(&store);
        let log = RecordingLog::new();

        {
            let registry = GovernorRegistry::new(&config, &log);
            let ondemand = NamedGovernor::new("ondemand");
            let reference = NamedGovernor::new("rp2040_perf");
            registry.register(&ondemand).unwrap();
            registry.register(&reference).unwrap();
            registry.set_current(&ondemand);
            assert_eq!(ondemand.inits.get(), 1);
        }

        // A fresh registry (fresh boot) restores the persisted choice.
        let registry = GovernorRegistry::new(&config, &log);
        let ondemand = NamedGovernor::new("ondemand");
        let reference = NamedGovernor::new("rp2040_perf");
        registry.register(&ondemand).unwrap();
        registry.register(&reference).unwrap();
        registry.init();
        assert_eq!(registry.current().unwrap().name(), "ondemand");
    }

    #[test]
    fn falls_back_to_first_registered() {
        let store = MemStore::new();
        let config = config_with_buffer(&store);
        let log = RecordingLog::new();
        let registry = GovernorRegistry::new(&config, &log);
        let only = NamedGovernor::new("performance");
        registry.register(&only).unwrap();
        registry.init();
        assert_eq!(registry.current().unwrap().name(), "performance");
    }

    #[test]
    fn registry_capacity_is_bounded() {
        let store = MemStore::new();
        let config = config_with_buffer(&store);
        let log = RecordingLog::new();
        let registry = GovernorRegistry::new(&config, &log);

        let governors: Vec<NamedGovernor> =
            (0..MAX_GOVERNORS).map(|_| NamedGovernor::new("g")).collect();
        for governor in governors.iter() {
            registry.register(governor).unwrap();
        }
        assert_eq!(registry.count(), MAX_GOVERNORS);
        let extra = NamedGovernor::new("extra");
        assert_eq!(registry.register(&extra), Err(ErrorCode::NOMEM));
    }
}
