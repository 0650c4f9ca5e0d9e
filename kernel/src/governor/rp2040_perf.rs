// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! RP2040-tuned performance governor, the reference policy.
//!
//! Goals:
//!  - reach `MAX_KHZ` aggressively but safely
//!  - pre-set the regulator for a quicker stable ramp
//!  - back off quickly on thermal excursion, restore with hysteresis
//!  - drop to an idle target on sustained inactivity
//!  - keep the tick short and cooperative
//!
//! All parameters are runtime-tunable and persisted as an opaque blob on
//! every change.

use core::fmt;
use core::fmt::Write;

use crate::hil::log::LogSink;
use crate::hil::sync::Spinlock;
use crate::hil::temperature::TemperatureSource;
use crate::hil::time::ClockSource;
use crate::hil::vreg::VoltageRegulator;
use crate::metrics::MetricsAggregate;
use crate::persist::PersistentConfig;
use crate::state::{voltage_for_khz, SystemState, MAX_KHZ, MIN_KHZ};
use crate::sync::Mutex;
use crate::utilities::fmt::WriteBuf;
use crate::ErrorCode;

use super::{Governor, RampDriver};

/// Mid-band target for medium sustained load.
const MED_TARGET_KHZ: u32 = 230_000;

/// Activity at or above this intensity is high regardless of duration.
const BURST_INTENSITY_PCT: f32 = 90.0;

/// Activity at or below this intensity favours the idle target.
const CALM_INTENSITY_PCT: f32 = 40.0;

/// Tick pacing.
const TICK_SLEEP_MS: u32 = 40;

#[derive(Clone, Copy)]
pub struct RpPerfParams {
    pub cooldown_ms: u32,
    pub ramp_up_cooldown_ms: u32,
    pub thr_high_intensity: f32,
    pub thr_med_intensity: f32,
    pub thr_low_intensity: f32,
    pub dur_high_ms: f32,
    pub dur_med_ms: f32,
    pub dur_short_ms: f32,
    pub temp_backoff_c: f32,
    pub temp_restore_c: f32,
    pub backoff_target_khz: u32,
    pub idle_target_khz: u32,
    pub idle_timeout_ms: u32,
}

impl RpPerfParams {
    pub const DEFAULT: RpPerfParams = RpPerfParams {
        cooldown_ms: 2000,
        ramp_up_cooldown_ms: 500,
        thr_high_intensity: 80.0,
        thr_med_intensity: 60.0,
        thr_low_intensity: 20.0,
        dur_high_ms: 500.0,
        dur_med_ms: 250.0,
        dur_short_ms: 200.0,
        temp_backoff_c: 72.0,
        temp_restore_c: 65.0,
        backoff_target_khz: 200_000,
        idle_target_khz: 100_000,
        idle_timeout_ms: 5000,
    };

    pub const ENCODED_LEN: usize = 13 * 4;

    /// Fixed little-endian field order; the persistence magic guards the
    /// layout, so any change here must bump that magic.
    pub fn encode(&self, out: &mut [u8; Self::ENCODED_LEN]) {
        let words: [u32; 13] = [
            self.cooldown_ms,
            self.ramp_up_cooldown_ms,
            self.thr_high_intensity.to_bits(),
            self.thr_med_intensity.to_bits(),
            self.thr_low_intensity.to_bits(),
            self.dur_high_ms.to_bits(),
            self.dur_med_ms.to_bits(),
            self.dur_short_ms.to_bits(),
            self.temp_backoff_c.to_bits(),
            self.temp_restore_c.to_bits(),
            self.backoff_target_khz,
            self.idle_target_khz,
            self.idle_timeout_ms,
        ];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    pub fn decode(bytes: &[u8]) -> Option<RpPerfParams> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let mut words = [0u32; 13];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(chunk);
            *word = u32::from_le_bytes(raw);
        }
        Some(RpPerfParams {
            cooldown_ms: words[0],
            ramp_up_cooldown_ms: words[1],
            thr_high_intensity: f32::from_bits(words[2]),
            thr_med_intensity: f32::from_bits(words[3]),
            thr_low_intensity: f32::from_bits(words[4]),
            dur_high_ms: f32::from_bits(words[5]),
            dur_med_ms: f32::from_bits(words[6]),
            dur_short_ms: f32::from_bits(words[7]),
            temp_backoff_c: f32::from_bits(words[8]),
            temp_restore_c: f32::from_bits(words[9]),
            backoff_target_khz: words[10],
            idle_target_khz: words[11],
            idle_timeout_ms: words[12],
        })
    }
}

pub const PARAM_NAMES: &[&str] = &[
    "cooldown_ms",
    "ramp_up_cooldown_ms",
    "thr_high_intensity",
    "thr_med_intensity",
    "thr_low_intensity",
    "dur_high_ms",
    "dur_med_ms",
    "dur_short_ms",
    "temp_backoff_C",
    "temp_restore_C",
    "backoff_target_khz",
    "idle_target_khz",
    "idle_timeout_ms",
];

#[derive(Clone, Copy, Default)]
struct RpPerfStats {
    last_adjust_ms: u32,
    last_target_khz: u32,
    adjust_count: u32,
    idle_switch_count: u32,
    last_idle_ms: u32,
    last_sample_ms: u32,
    idle_state: bool,
}

pub struct RpPerfGovernor<'a> {
    params: Mutex<'a, RpPerfParams>,
    stats: Mutex<'a, RpPerfStats>,
    state: &'a SystemState,
    driver: &'a RampDriver<'a>,
    vreg: &'a dyn VoltageRegulator,
    temperature: &'a dyn TemperatureSource,
    time: &'a dyn ClockSource,
    log: &'a dyn LogSink,
    config: &'a PersistentConfig<'a>,
}

impl<'a> RpPerfGovernor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        params_lock: &'a dyn Spinlock,
        stats_lock: &'a dyn Spinlock,
        state: &'a SystemState,
        driver: &'a RampDriver<'a>,
        vreg: &'a dyn VoltageRegulator,
        temperature: &'a dyn TemperatureSource,
        time: &'a dyn ClockSource,
        log: &'a dyn LogSink,
        config: &'a PersistentConfig<'a>,
    ) -> RpPerfGovernor<'a> {
        RpPerfGovernor {
            params: Mutex::new(params_lock, RpPerfParams::DEFAULT),
            stats: Mutex::new(
                stats_lock,
                RpPerfStats {
                    last_adjust_ms: 0,
                    last_target_khz: 0,
                    adjust_count: 0,
                    idle_switch_count: 0,
                    last_idle_ms: 0,
                    last_sample_ms: 0,
                    idle_state: false,
                },
            ),
            state,
            driver,
            vreg,
            temperature,
            time,
            log,
            config,
        }
    }

    pub fn params(&self) -> RpPerfParams {
        self.params.with(|params| *params)
    }

    pub fn get_param(&self, name: &str) -> Option<f32> {
        let params = self.params();
        match name {
            "cooldown_ms" => Some(params.cooldown_ms as f32),
            "ramp_up_cooldown_ms" => Some(params.ramp_up_cooldown_ms as f32),
            "thr_high_intensity" => Some(params.thr_high_intensity),
            "thr_med_intensity" => Some(params.thr_med_intensity),
            "thr_low_intensity" => Some(params.thr_low_intensity),
            "dur_high_ms" => Some(params.dur_high_ms),
            "dur_med_ms" => Some(params.dur_med_ms),
            "dur_short_ms" => Some(params.dur_short_ms),
            "temp_backoff_C" => Some(params.temp_backoff_c),
            "temp_restore_C" => Some(params.temp_restore_c),
            "backoff_target_khz" => Some(params.backoff_target_khz as f32),
            "idle_target_khz" => Some(params.idle_target_khz as f32),
            "idle_timeout_ms" => Some(params.idle_timeout_ms as f32),
            _ => None,
        }
    }

    /// Update one parameter and persist the whole blob. Frequency targets
    /// are range-checked against the operating limits.
    pub fn set_param(&self, name: &str, value: f32) -> Result<(), ErrorCode> {
        let in_range = |khz: f32| khz >= MIN_KHZ as f32 && khz <= MAX_KHZ as f32;
        self.params.with(|params| match name {
            "cooldown_ms" => {
                params.cooldown_ms = value as u32;
                Ok(())
            }
            "ramp_up_cooldown_ms" => {
                params.ramp_up_cooldown_ms = value as u32;
                Ok(())
            }
            "thr_high_intensity" => {
                params.thr_high_intensity = value;
                Ok(())
            }
            "thr_med_intensity" => {
                params.thr_med_intensity = value;
                Ok(())
            }
            "thr_low_intensity" => {
                params.thr_low_intensity = value;
                Ok(())
            }
            "dur_high_ms" => {
                params.dur_high_ms = value;
                Ok(())
            }
            "dur_med_ms" => {
                params.dur_med_ms = value;
                Ok(())
            }
            "dur_short_ms" => {
                params.dur_short_ms = value;
                Ok(())
            }
            "temp_backoff_C" => {
                params.temp_backoff_c = value;
                Ok(())
            }
            "temp_restore_C" => {
                params.temp_restore_c = value;
                Ok(())
            }
            "backoff_target_khz" => {
                if !in_range(value) {
                    return Err(ErrorCode::SIZE);
                }
                params.backoff_target_khz = value as u32;
                Ok(())
            }
            "idle_target_khz" => {
                if !in_range(value) {
                    return Err(ErrorCode::SIZE);
                }
                params.idle_target_khz = value as u32;
                Ok(())
            }
            "idle_timeout_ms" => {
                params.idle_timeout_ms = value as u32;
                Ok(())
            }
            _ => Err(ErrorCode::INVAL),
        })?;
        self.persist_params();
        Ok(())
    }

    fn persist_params(&self) {
        let mut blob = [0u8; RpPerfParams::ENCODED_LEN];
        self.params().encode(&mut blob);
        if self.config.save_params(&blob).is_err() {
            self.log.log("gov:rp2040_perf failed to persist params");
        }
    }

    /// Raise the regulator to what the given frequency will need, ahead of
    /// the ramp.
    fn prewarm_voltage(&self, khz: u32) {
        let needed = voltage_for_khz(khz);
        if needed.millivolts() > self.state.current_voltage_mv() {
            self.vreg.set_voltage(needed);
            self.state.set_current_voltage_mv(needed.millivolts());
        }
    }

    fn log_target_change(&self, target: u32, aggregate: &MetricsAggregate) {
        let mut buf = [0u8; 120];
        let mut line = WriteBuf::new(&mut buf);
        let _ = write!(
            line,
            "gov:rp2040_perf metrics -> target {} (i={:.1}% dur={:.0}ms cnt={})",
            target, aggregate.avg_intensity, aggregate.avg_duration_ms, aggregate.count
        );
        self.log.log(line.as_str());
    }
}

impl<'a> Governor for RpPerfGovernor<'a> {
    fn name(&self) -> &'static str {
        "rp2040_perf"
    }

    fn init(&self) {
        let mut blob = [0u8; RpPerfParams::ENCODED_LEN];
        if let Ok(len) = self.config.load_params(&mut blob) {
            if let Some(loaded) = RpPerfParams::decode(&blob[..len]) {
                self.params.with(|params| *params = loaded);
                self.log.log("gov:rp2040_perf loaded persisted params");
            }
        }

        // Pre-warm the rail for the top frequency and request it; the ramp
        // performs the guarded stepping from there.
        self.prewarm_voltage(MAX_KHZ);
        self.state.set_target_khz(MAX_KHZ);
        let now = self.time.now_ms();
        self.stats.with(|stats| {
            stats.last_sample_ms = now;
            stats.idle_state = false;
        });
        self.log.log("gov:rp2040_perf initialized (target requested)");
    }

    fn tick(&self, aggregate: &MetricsAggregate) {
        self.state.ping_core1_wdt();
        let now = self.time.now_ms();
        let params = self.params();
        let temperature = self.temperature.read_celsius();
        let idle_state = self.stats.with(|stats| stats.idle_state);

        // Thermal decisions take priority and bypass the cooldown gate.
        if temperature > params.temp_backoff_c
            && self.state.target_khz() > params.backoff_target_khz
        {
            self.state.set_target_khz(params.backoff_target_khz);
            self.state.set_throttle_active(true);
            self.stats.with(|stats| {
                stats.last_adjust_ms = now;
                stats.last_target_khz = params.backoff_target_khz;
                stats.adjust_count += 1;
            });
            self.log.log("gov:rp2040_perf thermal backoff");
        } else if temperature < params.temp_restore_c
            && self.state.target_khz() < MAX_KHZ
            && !idle_state
        {
            self.state.set_target_khz(MAX_KHZ);
            self.state.set_throttle_active(false);
            self.log.log("gov:rp2040_perf restoring target -> MAX");
        }

        // Activity classification on this tick's aggregate, or the idle
        // timeout when no samples arrived for long enough.
        let mut new_target: Option<u32> = None;
        let mut enters_idle = false;
        if aggregate.count > 0 {
            self.stats.with(|stats| stats.last_sample_ms = now);
            let intensity = aggregate.avg_intensity;
            let duration = aggregate.avg_duration_ms;
            if intensity >= BURST_INTENSITY_PCT
                || (intensity >= params.thr_high_intensity && duration >= params.dur_high_ms)
            {
                new_target = Some(MAX_KHZ);
            } else if intensity >= params.thr_med_intensity && duration >= params.dur_med_ms {
                new_target = Some(MED_TARGET_KHZ.min(MAX_KHZ));
            } else if (intensity <= params.thr_low_intensity
                && duration < params.dur_short_ms)
                || intensity <= CALM_INTENSITY_PCT
            {
                new_target = Some(params.idle_target_khz);
                enters_idle = true;
            }
        } else {
            let last_sample = self.stats.with(|stats| stats.last_sample_ms);
            if !idle_state && now.wrapping_sub(last_sample) >= params.idle_timeout_ms {
                new_target = Some(params.idle_target_khz);
                enters_idle = true;
            }
        }

        if let Some(target) = new_target {
            let previous = self.state.target_khz();
            if target != previous {
                let last_adjust = self.stats.with(|stats| stats.last_adjust_ms);
                let upward = target > previous;
                let effective_cooldown = if upward && !idle_state {
                    params.ramp_up_cooldown_ms
                } else {
                    params.cooldown_ms
                };
                if now.wrapping_sub(last_adjust) > effective_cooldown {
                    if target == MAX_KHZ {
                        // Sustained high activity: leave idle and pre-set
                        // the rail before the ramp starts.
                        self.prewarm_voltage(MAX_KHZ);
                    }
                    self.state.set_target_khz(target);
                    self.log_target_change(target, aggregate);
                    self.stats.with(|stats| {
                        stats.last_adjust_ms = now;
                        stats.last_target_khz = target;
                        stats.adjust_count += 1;
                        stats.idle_state = enters_idle;
                        if enters_idle {
                            stats.idle_switch_count += 1;
                            stats.last_idle_ms = now;
                        }
                    });
                }
            }
        }

        self.driver.drive();
        self.time.delay_ms(TICK_SLEEP_MS);
    }

    fn export_stats(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let stats = self.stats.with(|stats| *stats);
        write!(
            out,
            "rp2040_perf: adjustments={} last_target={}kHz last_adj_ms={} idle_switches={} last_idle_ms={}",
            stats.adjust_count,
            stats.last_target_khz,
            stats.last_adjust_ms,
            stats.idle_switch_count,
            stats.last_idle_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::tests::{config_with_buffer, MemStore};
    use crate::hil::clocks::SystemClockControl;
    use crate::ramp::RampEngine;
    use crate::stability::StabilityArbiter;
    use crate::testing::{
        CountingLockout, FakeClock, FakeTemp, NoopLock, RecordingLog, RecordingVreg,
    };
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

    /// Everything a governor tick touches, wired against mocks. The arbiter
    /// has no counters installed, so the stability gate fails open.
    struct Bench {
        lock: NoopLock,
        state: SystemState,
        clock: AcceptAllClock,
        vreg: RecordingVreg,
        lockout: CountingLockout,
        time: FakeClock,
        log: RecordingLog,
        temp: FakeTemp,
        store: MemStore,
    }

    impl Bench {
        fn new() -> Bench {
            Bench {
                lock: NoopLock,
                state: SystemState::new(),
                clock: AcceptAllClock {
                    khz: Cell::new(MIN_KHZ),
                },
                vreg: RecordingVreg::new(),
                lockout: CountingLockout::new(),
                time: FakeClock::new(),
                log: RecordingLog::new(),
                temp: FakeTemp::new(40.0),
                store: MemStore::new(),
            }
        }
    }

    macro_rules! governor_fixture {
        ($bench:ident, $gov:ident, $config:ident) => {
            let ramp = RampEngine::new(
                &$bench.state,
                &$bench.clock,
                &$bench.vreg,
                &$bench.lockout,
                &$bench.time,
                &$bench.log,
            );
            let arbiter = StabilityArbiter::new(&$bench.lock);
            let driver = RampDriver::new(
                &$bench.state,
                &ramp,
                &arbiter,
                &$bench.time,
                &$bench.log,
            );
            let $config = config_with_buffer(&$bench.store);
            let $gov = RpPerfGovernor::new(
                &$bench.lock,
                &$bench.lock,
                &$bench.state,
                &driver,
                &$bench.vreg,
                &$bench.temp,
                &$bench.time,
                &$bench.log,
                &$config,
            );
        };
    }

    fn no_samples() -> MetricsAggregate {
        MetricsAggregate::default()
    }

    fn samples(count: u32, intensity: f32, duration_ms: f32) -> MetricsAggregate {
        MetricsAggregate {
            count,
            avg_workload: 1.0,
            avg_intensity: intensity,
            avg_duration_ms: duration_ms,
            last_ts_ms: 0,
        }
    }

    #[test]
    fn thermal_backoff_and_restore() {
        let bench = Bench::new();
        governor_fixture!(bench, governor, _config);
        bench.state.set_current_khz(MAX_KHZ);
        bench.state.set_target_khz(MAX_KHZ);

        bench.time.advance_ms(1000);
        bench.temp.celsius.set(75.0);
        governor.tick(&no_samples());
        assert_eq!(bench.state.target_khz(), 200_000);
        assert!(bench.state.throttle_active());
        assert!(bench.log.contains("thermal backoff"));

        bench.temp.celsius.set(60.0);
        governor.tick(&no_samples());
        assert_eq!(bench.state.target_khz(), MAX_KHZ);
        assert!(!bench.state.throttle_active());
        assert!(bench.log.contains("restoring target -> MAX"));
    }

    #[test]
    fn idle_timeout_switches_to_idle_target() {
        let bench = Bench::new();
        governor_fixture!(bench, governor, _config);
        governor.init();
        bench.state.set_current_khz(MAX_KHZ);

        // Stay below the idle timeout: target remains MAX.
        bench.time.advance_ms(1000);
        governor.tick(&no_samples());
        assert_eq!(bench.state.target_khz(), MAX_KHZ);

        // Pass it: one idle switch is recorded.
        bench.time.advance_ms(6000);
        governor.tick(&no_samples());
        assert_eq!(bench.state.target_khz(), 100_000);
        let mut out = String::new();
        governor.export_stats(&mut out).unwrap();
        assert!(out.contains("idle_switches=1"), "{}", out);

        // Idle state holds: the thermal restore path must not flap the
        // target back up while idle.
        bench.time.advance_ms(100);
        governor.tick(&no_samples());
        assert_eq!(bench.state.target_khz(), 100_000);
    }

    #[test]
    fn high_activity_requests_max_and_prewarms() {
        let bench = Bench::new();
        governor_fixture!(bench, governor, _config);
        bench.state.set_target_khz(150_000);
        bench.state.set_current_khz(150_000);
        bench.temp.celsius.set(66.0); // between restore and backoff: no thermal action

        bench.time.advance_ms(3000);
        governor.tick(&samples(4, 95.0, 600.0));
        assert_eq!(bench.state.target_khz(), MAX_KHZ);
        // Pre-warm went straight to the top rail.
        assert_eq!(
            bench.vreg.writes.borrow().first().copied(),
            Some(crate::hil::vreg::CoreVoltage::V1_30)
        );
    }

    #[test]
    fn medium_activity_takes_the_mid_band() {
        let bench = Bench::new();
        governor_fixture!(bench, governor, _config);
        bench.state.set_target_khz(150_000);
        bench.state.set_current_khz(150_000);
        bench.temp.celsius.set(66.0);

        bench.time.advance_ms(3000);
        governor.tick(&samples(4, 65.0, 300.0));
        assert_eq!(bench.state.target_khz(), 230_000);
    }

    #[test]
    fn cooldown_gates_repeated_changes() {
        let bench = Bench::new();
        governor_fixture!(bench, governor, _config);
        bench.state.set_target_khz(150_000);
        bench.state.set_current_khz(150_000);
        bench.temp.celsius.set(66.0); // between restore and backoff: no thermal action

        bench.time.advance_ms(3000);
        governor.tick(&samples(2, 10.0, 50.0));
        assert_eq!(bench.state.target_khz(), 100_000);

        // Inside the cooldown window an opposing classification is ignored.
        governor.tick(&samples(2, 95.0, 600.0));
        assert_eq!(bench.state.target_khz(), 100_000);

        // Outside it (leaving idle uses the full cooldown) it is applied.
        bench.time.advance_ms(2500);
        governor.tick(&samples(2, 95.0, 600.0));
        assert_eq!(bench.state.target_khz(), MAX_KHZ);
    }

    #[test]
    fn params_roundtrip_through_persistence() {
        let bench = Bench::new();
        {
            governor_fixture!(bench, governor, _config);
            governor.set_param("cooldown_ms", 1234.0).unwrap();
            governor.set_param("temp_backoff_C", 70.5).unwrap();
        }
        // A fresh governor over the same store restores the tuning.
        governor_fixture!(bench, governor, _config);
        governor.init();
        let params = governor.params();
        assert_eq!(params.cooldown_ms, 1234);
        assert_eq!(params.temp_backoff_c, 70.5);
        assert!(bench.log.contains("loaded persisted params"));
    }

    #[test]
    fn unknown_and_out_of_range_params_are_rejected() {
        let bench = Bench::new();
        governor_fixture!(bench, governor, _config);
        assert_eq!(governor.set_param("nope", 1.0), Err(ErrorCode::INVAL));
        assert_eq!(
            governor.set_param("idle_target_khz", 1_000.0),
            Err(ErrorCode::SIZE)
        );
        assert!(governor.get_param("nope").is_none());
        assert_eq!(governor.get_param("cooldown_ms"), Some(2000.0));
    }

    #[test]
    fn encode_decode_is_stable() {
        let mut blob = [0u8; RpPerfParams::ENCODED_LEN];
        let params = RpPerfParams::DEFAULT;
        params.encode(&mut blob);
        let decoded = RpPerfParams::decode(&blob).unwrap();
        assert_eq!(decoded.cooldown_ms, params.cooldown_ms);
        assert_eq!(decoded.thr_high_intensity, params.thr_high_intensity);
        assert_eq!(decoded.idle_timeout_ms, params.idle_timeout_ms);
        assert!(RpPerfParams::decode(&blob[..8]).is_none());
    }
}
