// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Spinlock-guarded shared data.

use core::cell::UnsafeCell;

use crate::hil::sync::Spinlock;

/// Data shared between the two cores, guarded by a hardware spinlock.
///
/// The metrics ring, the kernel snapshot and the PIO stats snapshot each get
/// their own `Mutex` with a distinct lock, so the critical sections stay
/// independent and short.
pub struct Mutex<'a, T> {
    lock: &'a dyn Spinlock,
    value: UnsafeCell<T>,
}

impl<'a, T> Mutex<'a, T> {
    pub const fn new(lock: &'a dyn Spinlock, value: T) -> Mutex<'a, T> {
        Mutex {
            lock,
            value: UnsafeCell::new(value),
        }
    }

    /// Run `f` with exclusive access to the protected value.
    ///
    /// Must not be nested on the same mutex from the same core; the hardware
    /// lock does not support recursion.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.lock.claim();
        // SAFETY: the spinlock serializes access across cores and `with` is
        // not reentrant, so this is the only live reference to the value.
        let result = f(unsafe { &mut *self.value.get() });
        self.lock.release();
        result
    }
}
