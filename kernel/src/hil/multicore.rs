// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Multicore lockout.
//!
//! The PLL reconfigure is the only operation that stops forward progress
//! anywhere: the initiating core (core 1, in the ramp engine) parks the other
//! core for the duration, typically under 2 ms. No interrupts are used on the
//! core control path; the victim side is serviced by polling from the core-0
//! main loop, so acknowledgement latency is bounded by one loop iteration.

/// Initiator side, called by the ramp engine around `set_khz`.
pub trait CoreLockout {
    /// Park the other core; returns once it acknowledges.
    fn pause_other_core(&self);

    /// Let the other core resume; returns once it acknowledges.
    fn resume_other_core(&self);
}

/// Victim side, serviced from the core-0 main loop.
pub trait LockoutVictim {
    /// Answer a pending pause request, spinning until the matching resume
    /// arrives. No-op when nothing is pending.
    fn poll(&self);
}
