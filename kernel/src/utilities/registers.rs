// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Re-export the `tock-registers` crate.
//!
//! Chip drivers describe memory-mapped peripherals with `register_structs!`
//! and `register_bitfields!` and access them through the typed interfaces
//! re-exported here, so they only ever name `kernel::utilities::registers`.

pub use tock_registers::fields;
pub use tock_registers::interfaces;
pub use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
pub use tock_registers::{register_bitfields, register_structs};
pub use tock_registers::{LocalRegisterCopy, RegisterLongName};
