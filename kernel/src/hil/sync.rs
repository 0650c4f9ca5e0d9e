// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Inter-core locking primitive.

/// One hardware spinlock.
///
/// ARMv6-M has no atomic read-modify-write instructions, so mutual exclusion
/// between the two cores rides on the SIO hardware spinlocks. Hold times in
/// this kernel are bounded by O(N) reductions with N <= 128.
pub trait Spinlock {
    /// Spin until the lock is acquired. Must not be called again on the same
    /// core before `release` (no recursion).
    fn claim(&self);

    /// Release a lock previously acquired with `claim`.
    fn release(&self);
}
