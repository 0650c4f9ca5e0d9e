// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Hardware reset contract.

/// Full-chip reboot, used when the core-1 liveness watchdog trips.
pub trait SystemReset {
    fn reboot(&self) -> !;
}
