// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Support for statically initializing objects in memory.

/// Allocates space for `$T` in a static and initializes it with `$e`,
/// evaluating to a `&'static mut $T`.
///
/// Board `main` uses this to wire kernel and chip objects together: the
/// objects hold `&'static` references to each other, so they must live in
/// statics, but most of them cannot be built in a `const` context.
///
/// # Safety
///
/// The expansion writes to a hidden `static mut` without synchronization.
/// Each `static_init!` expression must be executed at most once (boards call
/// it from `main` before the second core is launched).
#[macro_export]
macro_rules! static_init {
    ($T:ty, $e:expr $(,)?) => {{
        static mut BUF: core::mem::MaybeUninit<$T> = core::mem::MaybeUninit::uninit();
        // SAFETY: single execution is promised by the caller; the raw-pointer
        // round trip avoids taking a reference to the `static mut` directly.
        let buf = unsafe { &mut *core::ptr::addr_of_mut!(BUF) };
        buf.write($e)
    }};
}
