// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Monotonic time source.

/// A free-running microsecond counter plus busy-wait delays.
///
/// Both cores run cooperative loops with explicit short sleeps; there is no
/// alarm or async machinery. The 32-bit millisecond view wraps after ~49
/// days, so interval arithmetic uses `wrapping_sub`.
pub trait ClockSource {
    /// Microseconds since power-on.
    fn now_us(&self) -> u64;

    /// Milliseconds since power-on, truncated to 32 bits.
    fn now_ms(&self) -> u32 {
        (self.now_us() / 1000) as u32
    }

    /// Busy-wait for at least `us` microseconds.
    fn delay_us(&self, us: u32);

    /// Busy-wait for at least `ms` milliseconds.
    fn delay_ms(&self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }
}
