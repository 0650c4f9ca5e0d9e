// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Panic output and recovery.

use core::fmt;
use core::fmt::Write;
use core::panic::PanicInfo;

use kernel::hil::console::Console;
use kernel::hil::watchdog::SystemReset;
use rp2040::uart::Uart;
use rp2040::watchdog::Watchdog;

struct PanicWriter {
    uart: Uart,
}

impl fmt::Write for PanicWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.uart.write_str(s);
        Ok(())
    }
}

/// Dump the panic to the console (best effort; the UART may not be up yet)
/// and reboot through the watchdog, matching the liveness-failure policy.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let mut writer = PanicWriter {
        uart: Uart::new_uart0(),
    };
    let _ = write!(writer, "\r\npanic: {}\r\n", info);
    Watchdog::new().reboot()
}
