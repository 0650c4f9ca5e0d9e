// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Autonomous hardware cycle counters.

/// The two PIO state machines measuring core-0 idle windows and heartbeat
/// periods. One counter tick is two system-clock cycles (two-instruction
/// PIO loops at divider 1).
pub trait CycleCounters {
    /// Pop one idle-window measurement, if available. Non-blocking.
    fn take_idle_sample(&self) -> Option<u32>;

    /// Pop one heartbeat-period measurement, if available. Non-blocking.
    fn take_period_sample(&self) -> Option<u32>;
}
