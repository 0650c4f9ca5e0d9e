// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Standard error enum for invoking operations.

/// Standard errors across the kernel and chip crates.
///
/// Operations that can fail return `Result<_, ErrorCode>`; there are no
/// success variants here, so a bare `Ok(())` always means the operation
/// completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ErrorCode {
    /// Generic failure condition
    FAIL = 0,
    /// Underlying system is busy; retry
    BUSY = 1,
    /// The state requested is already set
    ALREADY = 2,
    /// The component is powered down
    OFF = 3,
    /// An invalid parameter was passed
    INVAL = 4,
    /// Parameter passed was too large
    SIZE = 5,
    /// Memory required not available
    NOMEM = 6,
    /// Operation or command is unsupported
    NOSUPPORT = 7,
    /// Device does not exist
    NODEVICE = 8,
}

impl From<ErrorCode> for usize {
    fn from(err: ErrorCode) -> usize {
        err as usize
    }
}
