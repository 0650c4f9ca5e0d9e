// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Log sink contract.

/// Accepts short human-readable lines from kernel components.
///
/// The ring-buffer log and its UART backend are external collaborators; the
/// kernel only requires this one-way sink. Implementations drop messages on
/// resource pressure rather than report errors, so logging is never on a
/// failure path.
pub trait LogSink {
    fn log(&self, message: &str);
}
