// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Workload metrics aggregator.
//!
//! Applications describe recent work with [`Metrics::submit`]; the governor
//! loop reduces the stored samples to one aggregate per tick, clearing the
//! ring so every sample is consumed exactly once. A second, simpler channel
//! publishes a small kernel snapshot (tick counters) by copy-under-lock.

use crate::hil::sync::Spinlock;
use crate::hil::time::ClockSource;
use crate::sync::Mutex;

pub const METRICS_CAPACITY: usize = 128;

#[derive(Clone, Copy)]
struct MetricSample {
    workload: u32,
    intensity: u32,
    duration_ms: u32,
    ts_ms: u32,
}

const EMPTY_SAMPLE: MetricSample = MetricSample {
    workload: 0,
    intensity: 0,
    duration_ms: 0,
    ts_ms: 0,
};

struct Ring {
    samples: [MetricSample; METRICS_CAPACITY],
    head: usize,
    tail: usize,
    count: usize,
}

/// Reduction over the live region of the ring.
#[derive(Clone, Copy, Default)]
pub struct MetricsAggregate {
    pub count: u32,
    pub avg_workload: f32,
    pub avg_intensity: f32,
    pub avg_duration_ms: f32,
    pub last_ts_ms: u32,
}

/// Snapshot the core-1 loop publishes after each governor tick.
#[derive(Clone, Copy, Default)]
pub struct KernelSnapshot {
    pub gov_tick_count: u32,
    pub gov_tick_avg_ms: f32,
    pub last_ts_ms: u32,
}

pub struct Metrics<'a> {
    ring: Mutex<'a, Ring>,
    snapshot: Mutex<'a, KernelSnapshot>,
    time: &'a dyn ClockSource,
}

impl<'a> Metrics<'a> {
    pub const fn new(
        ring_lock: &'a dyn Spinlock,
        snapshot_lock: &'a dyn Spinlock,
        time: &'a dyn ClockSource,
    ) -> Metrics<'a> {
        Metrics {
            ring: Mutex::new(
                ring_lock,
                Ring {
                    samples: [EMPTY_SAMPLE; METRICS_CAPACITY],
                    head: 0,
                    tail: 0,
                    count: 0,
                },
            ),
            snapshot: Mutex::new(
                snapshot_lock,
                KernelSnapshot {
                    gov_tick_count: 0,
                    gov_tick_avg_ms: 0.0,
                    last_ts_ms: 0,
                },
            ),
            time,
        }
    }

    /// Record one sample; the oldest entry is overwritten when the ring is
    /// full. `intensity` is a percentage and is clamped to 100.
    pub fn submit(&self, workload: u32, intensity: u32, duration_ms: u32) {
        let ts_ms = self.time.now_ms();
        self.ring.with(|ring| {
            ring.samples[ring.head] = MetricSample {
                workload,
                intensity: intensity.min(100),
                duration_ms,
                ts_ms,
            };
            ring.head = (ring.head + 1) % METRICS_CAPACITY;
            if ring.count < METRICS_CAPACITY {
                ring.count += 1;
            } else {
                ring.tail = ring.head;
            }
        });
    }

    /// Reduce the live region to an aggregate. With `clear` the stored
    /// samples are consumed; the governor loop passes `true` so each sample
    /// feeds exactly one tick.
    pub fn get_aggregate(&self, clear: bool) -> MetricsAggregate {
        let (count, sum_workload, sum_intensity, sum_duration, last_ts) =
            self.ring.with(|ring| {
                let mut sum_workload: u64 = 0;
                let mut sum_intensity: u64 = 0;
                let mut sum_duration: u64 = 0;
                let mut last_ts: u32 = 0;
                let mut index = ring.tail;
                for _ in 0..ring.count {
                    let sample = &ring.samples[index];
                    sum_workload += sample.workload as u64;
                    sum_intensity += sample.intensity as u64;
                    sum_duration += sample.duration_ms as u64;
                    last_ts = sample.ts_ms;
                    index = (index + 1) % METRICS_CAPACITY;
                }
                let count = ring.count as u32;
                if clear {
                    ring.head = 0;
                    ring.tail = 0;
                    ring.count = 0;
                }
                (count, sum_workload, sum_intensity, sum_duration, last_ts)
            });

        if count == 0 {
            return MetricsAggregate::default();
        }
        MetricsAggregate {
            count,
            avg_workload: sum_workload as f32 / count as f32,
            avg_intensity: sum_intensity as f32 / count as f32,
            avg_duration_ms: sum_duration as f32 / count as f32,
            last_ts_ms: last_ts,
        }
    }

    /// Publish a fresh kernel snapshot (called from the core-1 loop).
    pub fn publish_kernel(&self, snapshot: KernelSnapshot) {
        self.snapshot.with(|slot| *slot = snapshot);
    }

    /// A consistent copy of the latest snapshot, or `None` before the first
    /// governor tick has been published.
    pub fn kernel_snapshot(&self) -> Option<KernelSnapshot> {
        let copy = self.snapshot.with(|slot| *slot);
        if copy.gov_tick_count == 0 {
            None
        } else {
            Some(copy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, NoopLock};

    #[test]
    fn aggregate_and_clear() {
        let lock_a = NoopLock;
        let lock_b = NoopLock;
        let clock = FakeClock::new();
        let metrics = Metrics::new(&lock_a, &lock_b, &clock);

        for (intensity, duration) in
            [(10, 100), (20, 200), (30, 300), (40, 400), (50, 500)]
        {
            clock.us.set(clock.us.get() + 1000);
            metrics.submit(1, intensity, duration);
        }

        let agg = metrics.get_aggregate(true);
        assert_eq!(agg.count, 5);
        assert_eq!(agg.avg_intensity, 30.0);
        assert_eq!(agg.avg_duration_ms, 300.0);
        assert_eq!(agg.last_ts_ms, 5);

        let empty = metrics.get_aggregate(false);
        assert_eq!(empty.count, 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let lock_a = NoopLock;
        let lock_b = NoopLock;
        let clock = FakeClock::new();
        let metrics = Metrics::new(&lock_a, &lock_b, &clock);
        metrics.submit(7, 50, 10);
        assert_eq!(metrics.get_aggregate(false).count, 1);
        assert_eq!(metrics.get_aggregate(false).count, 1);
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let lock_a = NoopLock;
        let lock_b = NoopLock;
        let clock = FakeClock::new();
        let metrics = Metrics::new(&lock_a, &lock_b, &clock);

        // 0..=9 fall off; the newest 128 (10..138) remain.
        for i in 0..(METRICS_CAPACITY as u32 + 10) {
            metrics.submit(i, 100, i);
        }
        let agg = metrics.get_aggregate(true);
        assert_eq!(agg.count, METRICS_CAPACITY as u32);
        let expected_avg = (10 + METRICS_CAPACITY as u32 + 9) as f32 / 2.0;
        assert_eq!(agg.avg_duration_ms, expected_avg);
    }

    #[test]
    fn intensity_clamped_to_percent() {
        let lock_a = NoopLock;
        let lock_b = NoopLock;
        let clock = FakeClock::new();
        let metrics = Metrics::new(&lock_a, &lock_b, &clock);
        metrics.submit(0, 250, 0);
        assert_eq!(metrics.get_aggregate(true).avg_intensity, 100.0);
    }

    #[test]
    fn snapshot_roundtrip() {
        let lock_a = NoopLock;
        let lock_b = NoopLock;
        let clock = FakeClock::new();
        let metrics = Metrics::new(&lock_a, &lock_b, &clock);

        assert!(metrics.kernel_snapshot().is_none());
        metrics.publish_kernel(KernelSnapshot {
            gov_tick_count: 3,
            gov_tick_avg_ms: 1.5,
            last_ts_ms: 42,
        });
        let snap = metrics.kernel_snapshot().unwrap();
        assert_eq!(snap.gov_tick_count, 3);
        assert_eq!(snap.gov_tick_avg_ms, 1.5);
        assert_eq!(snap.last_ts_ms, 42);
    }
}
