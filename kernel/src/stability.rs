// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Stability arbiter over the PIO cycle counters.
//!
//! Two autonomous state machines measure how long core 0 spends in its
//! character-wait spin (idle windows) and the period between core-0 heartbeat
//! pulses. A sudden change in consecutive period readings means a PLL
//! transition is still settling; once the rolling window's coefficient of
//! variation stays low, the system is declared stable and the governor may
//! request the next frequency step.
//!
//! After every successful ramp step [`StabilityArbiter::notify_freq_change`]
//! must be called so stale pre-transition samples are discarded while the
//! PLL relocks.

use crate::hil::counters::CycleCounters;
use crate::hil::sync::Spinlock;
use crate::sync::Mutex;
use crate::utilities::cells::OptionalCell;
use crate::utilities::math;

/// Coefficient-of-variation ceiling (percent) for a poll to count as stable.
pub const STABLE_CV_PCT: f32 = 1.5;

/// Polls during which `safe_to_scale` is forced false after a frequency
/// change.
pub const SETTLE_POLLS: u32 = 8;

/// Heartbeat periods kept in the rolling window.
pub const HB_WINDOW: usize = 8;

/// Smoothing factor of the idle-fraction EMA.
const IDLE_EMA_ALPHA: f32 = 0.25;

/// Default `safe_to_scale` thresholds, used for the cached flag in the
/// snapshot.
const DEFAULT_JITTER_THRESH_PCT: f32 = 3.0;
const DEFAULT_MIN_STABLE: u32 = 4;

/// Convert a raw counter value to microseconds. Both state machines run
/// two-instruction loops, so one tick is two system-clock cycles at
/// divider 1.
pub fn ticks_to_us(ticks: u32, sys_khz: u32) -> f32 {
    if sys_khz == 0 {
        return 0.0;
    }
    ticks as f32 * 2000.0 / sys_khz as f32
}

/// Snapshot filled by the poller and read by governors and the shell.
#[derive(Clone, Copy, Default)]
pub struct PioStats {
    /// Raw ticks of the last idle window.
    pub idle_ticks: u32,
    /// EMA of idle/loop-period, always within [0, 1].
    pub idle_fraction: f32,
    /// Latest heartbeat period and the one before it.
    pub hb_period_ticks: u32,
    pub hb_period_prev: u32,
    /// Signed sample-to-sample delta and its magnitude in percent.
    pub hb_jitter_ticks: i32,
    pub hb_jitter_pct: f32,
    /// Consecutive low-CV samples seen since the last disturbance.
    pub stable_count: u32,
    /// Cached result of the default thresholds.
    pub safe_to_scale: bool,
}

struct Inner {
    stats: PioStats,
    window: [u32; HB_WINDOW],
    window_len: usize,
    window_pos: usize,
    settle_left: u32,
}

impl Inner {
    fn record_idle(&mut self, ticks: u32) {
        self.stats.idle_ticks = ticks;
        let period = self.stats.hb_period_ticks;
        if period == 0 {
            return;
        }
        let ratio = (ticks as f32 / period as f32).clamp(0.0, 1.0);
        let ema = IDLE_EMA_ALPHA * ratio + (1.0 - IDLE_EMA_ALPHA) * self.stats.idle_fraction;
        self.stats.idle_fraction = ema.clamp(0.0, 1.0);
    }

    fn record_period(&mut self, ticks: u32) {
        let prev = self.stats.hb_period_ticks;
        self.stats.hb_period_prev = prev;
        self.stats.hb_period_ticks = ticks;
        if prev != 0 {
            let jitter = ticks as i64 - prev as i64;
            self.stats.hb_jitter_ticks = jitter as i32;
            self.stats.hb_jitter_pct = 100.0 * jitter.unsigned_abs() as f32 / prev as f32;
        }

        self.window[self.window_pos] = ticks;
        self.window_pos = (self.window_pos + 1) % HB_WINDOW;
        if self.window_len < HB_WINDOW {
            self.window_len += 1;
        }

        if self.window_len >= 2 {
            if self.window_cv_pct() < STABLE_CV_PCT {
                self.stats.stable_count += 1;
            } else {
                self.stats.stable_count = 0;
            }
        }
    }

    /// Coefficient of variation (percent) of the current window contents.
    fn window_cv_pct(&self) -> f32 {
        let n = self.window_len as f32;
        let mut mean = 0.0f32;
        for &period in &self.window[..self.window_len] {
            mean += period as f32;
        }
        mean /= n;
        if mean <= 0.0 {
            return 100.0;
        }
        let mut variance = 0.0f32;
        for &period in &self.window[..self.window_len] {
            let delta = period as f32 - mean;
            variance += delta * delta;
        }
        variance /= n;
        100.0 * math::sqrt(variance) / mean
    }

    fn reset_window(&mut self) {
        self.window_len = 0;
        self.window_pos = 0;
        self.stats.stable_count = 0;
        self.settle_left = SETTLE_POLLS;
    }

    fn evaluate(&self, jitter_thresh: f32, min_stable: u32) -> bool {
        self.settle_left == 0
            && self.stats.stable_count >= min_stable
            && math::abs(self.stats.hb_jitter_pct) <= jitter_thresh
    }
}

pub struct StabilityArbiter<'a> {
    counters: OptionalCell<&'a dyn CycleCounters>,
    inner: Mutex<'a, Inner>,
}

impl<'a> StabilityArbiter<'a> {
    pub const fn new(lock: &'a dyn Spinlock) -> StabilityArbiter<'a> {
        StabilityArbiter {
            counters: OptionalCell::empty(),
            inner: Mutex::new(
                lock,
                Inner {
                    stats: PioStats {
                        idle_ticks: 0,
                        idle_fraction: 0.0,
                        hb_period_ticks: 0,
                        hb_period_prev: 0,
                        hb_jitter_ticks: 0,
                        hb_jitter_pct: 0.0,
                        stable_count: 0,
                        safe_to_scale: false,
                    },
                    window: [0; HB_WINDOW],
                    window_len: 0,
                    window_pos: 0,
                    settle_left: 0,
                },
            ),
        }
    }

    /// Install the hardware counters. Until this is called the arbiter is
    /// considered uninitialized and `safe_to_scale` fails open.
    pub fn set_counters(&self, counters: &'a dyn CycleCounters) {
        self.counters.set(counters);
    }

    /// Drain both counter FIFOs and update the snapshot. Non-blocking; called
    /// at least once per core-0 loop iteration.
    pub fn poll(&self) {
        self.counters.map(|counters| {
            self.inner.with(|inner| {
                while let Some(ticks) = counters.take_period_sample() {
                    inner.record_period(ticks);
                }
                while let Some(ticks) = counters.take_idle_sample() {
                    inner.record_idle(ticks);
                }
                if inner.settle_left > 0 {
                    inner.settle_left -= 1;
                }
                inner.stats.safe_to_scale =
                    inner.evaluate(DEFAULT_JITTER_THRESH_PCT, DEFAULT_MIN_STABLE);
            });
        });
    }

    /// Discard the rolling window and hold `safe_to_scale` false for the
    /// next [`SETTLE_POLLS`] polls. Must be invoked after every successful
    /// ramp step, once `current_khz` has been updated.
    pub fn notify_freq_change(&self, _new_khz: u32) {
        self.inner.with(|inner| {
            inner.reset_window();
            inner.stats.safe_to_scale = false;
        });
    }

    /// The gate governors consult before a ramp step: enough consecutive
    /// low-CV samples, recent jitter within bounds, and no settle window in
    /// progress. `idle_thresh` is advisory and currently unused. Fails open
    /// when the PIO subsystem was never initialized so governors never block
    /// on an absent arbiter.
    pub fn safe_to_scale(&self, idle_thresh: f32, jitter_thresh: f32, min_stable: u32) -> bool {
        let _ = idle_thresh;
        if self.counters.is_none() {
            return true;
        }
        self.inner
            .with(|inner| inner.evaluate(jitter_thresh, min_stable))
    }

    /// Copy of the latest snapshot.
    pub fn stats(&self) -> PioStats {
        self.inner.with(|inner| inner.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCounters, NoopLock};

    fn arbiter_with<'a>(
        lock: &'a NoopLock,
        counters: &'a FakeCounters,
    ) -> StabilityArbiter<'a> {
        let arbiter = StabilityArbiter::new(lock);
        arbiter.set_counters(counters);
        arbiter
    }

    fn feed_periods(arbiter: &StabilityArbiter, counters: &FakeCounters, periods: &[u32]) {
        for &p in periods {
            counters.push_period(p);
            arbiter.poll();
        }
    }

    #[test]
    fn fails_open_without_counters() {
        let lock = NoopLock;
        let arbiter = StabilityArbiter::new(&lock);
        assert!(arbiter.safe_to_scale(0.03, 3.0, 4));
    }

    #[test]
    fn steady_heartbeat_is_safe() {
        let lock = NoopLock;
        let counters = FakeCounters::new();
        let arbiter = arbiter_with(&lock, &counters);

        feed_periods(&arbiter, &counters, &[1000, 1003, 998, 1002, 1001, 999, 1000, 1001]);
        assert!(arbiter.safe_to_scale(0.03, 3.0, 4));
        let stats = arbiter.stats();
        assert!(stats.stable_count >= 4);
        assert!(stats.safe_to_scale);
    }

    #[test]
    fn period_jump_resets_stable_count() {
        let lock = NoopLock;
        let counters = FakeCounters::new();
        let arbiter = arbiter_with(&lock, &counters);

        feed_periods(&arbiter, &counters, &[1000, 1003, 998, 1002, 1001, 999, 1000, 1001]);
        assert!(arbiter.safe_to_scale(0.03, 3.0, 4));

        feed_periods(&arbiter, &counters, &[1000, 1200]);
        assert!(!arbiter.safe_to_scale(0.03, 3.0, 4));
        assert_eq!(arbiter.stats().stable_count, 0);
    }

    #[test]
    fn settle_window_blocks_for_eight_polls() {
        let lock = NoopLock;
        let counters = FakeCounters::new();
        let arbiter = arbiter_with(&lock, &counters);

        feed_periods(&arbiter, &counters, &[1000, 1001, 1000, 999, 1000, 1001, 1000, 1000]);
        assert!(arbiter.safe_to_scale(0.03, 3.0, 4));

        arbiter.notify_freq_change(130_000);
        for poll in 0..SETTLE_POLLS {
            assert!(
                !arbiter.safe_to_scale(0.03, 3.0, 4),
                "settle poll {} should be unsafe",
                poll
            );
            arbiter.poll();
        }
        // Settle has elapsed; the cleared window still has to re-earn
        // min_stable consecutive low-CV samples.
        assert!(!arbiter.safe_to_scale(0.03, 3.0, 4));
        feed_periods(&arbiter, &counters, &[1000, 1000, 1000, 1000, 1000]);
        assert!(arbiter.safe_to_scale(0.03, 3.0, 4));
    }

    #[test]
    fn jitter_threshold_gates_even_when_stable_count_high() {
        let lock = NoopLock;
        let counters = FakeCounters::new();
        let arbiter = arbiter_with(&lock, &counters);

        feed_periods(&arbiter, &counters, &[1000, 1001, 1000, 1001, 1000, 1001]);
        assert!(arbiter.safe_to_scale(0.03, 3.0, 4));
        // 0.1% jitter passes a tight gate, but not one below it.
        assert!(!arbiter.safe_to_scale(0.03, 0.05, 4));
    }

    #[test]
    fn idle_fraction_stays_in_unit_interval() {
        let lock = NoopLock;
        let counters = FakeCounters::new();
        let arbiter = arbiter_with(&lock, &counters);

        // Periods of 1000 ticks with idle windows both below and far above
        // the loop period (raw FIFO garbage must not escape [0, 1]).
        for &(period, idle) in &[(1000, 250), (1000, 4_000_000), (1000, 0), (1000, 999)] {
            counters.push_period(period);
            counters.push_idle(idle);
            arbiter.poll();
            let fraction = arbiter.stats().idle_fraction;
            assert!((0.0..=1.0).contains(&fraction), "fraction {}", fraction);
        }
    }

    #[test]
    fn idle_fraction_tracks_ema() {
        let lock = NoopLock;
        let counters = FakeCounters::new();
        let arbiter = arbiter_with(&lock, &counters);

        counters.push_period(1000);
        arbiter.poll();
        counters.push_idle(500);
        arbiter.poll();
        // First sample: 0.25 * 0.5 + 0.75 * 0.0
        let fraction = arbiter.stats().idle_fraction;
        assert!((fraction - 0.125).abs() < 1e-6);
    }

    #[test]
    fn tick_conversion_scales_with_sys_clock() {
        // Two sys cycles per tick: 1000 ticks at 125 MHz is 16 us.
        assert!((ticks_to_us(1000, 125_000) - 16.0).abs() < 1e-4);
        assert!((ticks_to_us(1000, 250_000) - 8.0).abs() < 1e-4);
        assert_eq!(ticks_to_us(1000, 0), 0.0);
    }

    #[test]
    fn jitter_fields_follow_last_two_periods() {
        let lock = NoopLock;
        let counters = FakeCounters::new();
        let arbiter = arbiter_with(&lock, &counters);

        feed_periods(&arbiter, &counters, &[1000, 1200]);
        let stats = arbiter.stats();
        assert_eq!(stats.hb_period_ticks, 1200);
        assert_eq!(stats.hb_period_prev, 1000);
        assert_eq!(stats.hb_jitter_ticks, 200);
        assert!((stats.hb_jitter_pct - 20.0).abs() < 1e-4);
    }
}
