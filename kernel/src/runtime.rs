// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! The two per-core cooperative loops.
//!
//! Core 0 services the serial line (line editing only; parsing belongs to the
//! external shell collaborator), emits the heartbeat the PIO period counter
//! watches, raises the IDLE flag around its zero-timeout read, polls the
//! stability arbiter and the lockout victim, prints live telemetry, and
//! watches core 1's liveness counter, rebooting the chip when it stalls.
//!
//! Core 1 runs the governor loop: one metrics aggregate in, one policy tick
//! out, tick timing published as the kernel snapshot.

use core::fmt::Write;

use crate::governor::GovernorRegistry;
use crate::hil::console::{CommandDispatcher, Console};
use crate::hil::gpio::OutputPin;
use crate::hil::log::LogSink;
use crate::hil::multicore::LockoutVictim;
use crate::hil::temperature::TemperatureSource;
use crate::hil::time::ClockSource;
use crate::hil::watchdog::SystemReset;
use crate::metrics::{KernelSnapshot, Metrics};
use crate::stability::StabilityArbiter;
use crate::state::{voltage_label, SystemState};
use crate::utilities::fmt::WriteBuf;

/// Maximum command-line length, terminator included.
const LINE_CAPACITY: usize = 64;

/// Pacing of the character-wait path.
const CHAR_WAIT_SLEEP_US: u32 = 100;

/// Core-1 liveness: sample interval and the grace period before reboot so
/// the critical log line gets out.
const CORE1_WDT_INTERVAL_MS: u32 = 5000;
const CORE1_WDT_GRACE_MS: u32 = 200;

/// Sleep when no governor is selected.
const NO_GOVERNOR_SLEEP_MS: u32 = 50;

pub struct Core0Runtime<'a> {
    pub console: &'a dyn Console,
    pub dispatcher: &'a dyn CommandDispatcher,
    pub idle_pin: &'a dyn OutputPin,
    pub heartbeat_pin: &'a dyn OutputPin,
    pub arbiter: &'a StabilityArbiter<'a>,
    pub lockout_victim: &'a dyn LockoutVictim,
    pub temperature: &'a dyn TemperatureSource,
    pub state: &'a SystemState,
    pub time: &'a dyn ClockSource,
    pub log: &'a dyn LogSink,
    pub reset: &'a dyn SystemReset,
}

impl<'a> Core0Runtime<'a> {
    pub fn run(&self) -> ! {
        let mut line = [0u8; LINE_CAPACITY];
        let mut length = 0usize;
        let mut last_stat_ms = self.time.now_ms();
        let mut last_ping_value = 0u32;
        let mut last_ping_ms = self.time.now_ms();

        self.console.write_str("\n> ");

        loop {
            // Heartbeat pulse for the period counter; the timer-paced width
            // is comfortably over the 8-cycle minimum at any sys clock.
            self.heartbeat_pin.set();
            self.time.delay_us(1);
            self.heartbeat_pin.clear();

            self.arbiter.poll();
            self.lockout_victim.poll();

            // The idle counter measures exactly the character-wait window.
            self.idle_pin.set();
            let received = self.console.read_byte();
            self.idle_pin.clear();

            let byte = match received {
                Some(byte) => byte,
                None => {
                    self.time.delay_us(CHAR_WAIT_SLEEP_US);

                    let now = self.time.now_ms();
                    if self.state.live_stats()
                        && now.wrapping_sub(last_stat_ms) >= self.state.stat_period_ms()
                    {
                        self.emit_live_stats();
                        last_stat_ms = now;
                    }

                    if now.wrapping_sub(last_ping_ms) >= CORE1_WDT_INTERVAL_MS {
                        let ping = self.state.core1_wdt_ping();
                        if ping == last_ping_value {
                            self.log
                                .log("CRITICAL: core 1 watchdog timeout, rebooting");
                            self.console
                                .write_str("\nCRITICAL: core 1 watchdog timeout. Rebooting...\n");
                            self.time.delay_ms(CORE1_WDT_GRACE_MS);
                            self.reset.reboot();
                        }
                        last_ping_value = ping;
                        last_ping_ms = now;
                    }
                    continue;
                }
            };

            match byte {
                b'\r' | b'\n' => {
                    self.console.write_str("\n");
                    if let Ok(command) = core::str::from_utf8(&line[..length]) {
                        self.dispatcher.dispatch(command);
                    }
                    length = 0;
                    self.console.write_str("\n> ");
                }
                // Backspace or DEL removes one character.
                0x08 | 0x7F => {
                    if length > 0 {
                        length -= 1;
                        self.console.write_str("\x08 \x08");
                    }
                }
                _ => {
                    if length < LINE_CAPACITY - 1 {
                        line[length] = byte;
                        length += 1;
                        self.console.write_byte(byte);
                    }
                }
            }
        }
    }

    fn emit_live_stats(&self) {
        let mut buf = [0u8; 128];
        let mut stats = WriteBuf::new(&mut buf);
        let _ = write!(
            stats,
            "\rSTAT clk={:.2}MHz target={:.2}MHz temp={:.1}C vreg={}    ",
            self.state.current_khz() as f32 / 1000.0,
            self.state.target_khz() as f32 / 1000.0,
            self.temperature.read_celsius(),
            voltage_label(self.state.current_voltage_mv()),
        );
        self.console.write_str(stats.as_str());
    }
}

pub struct Core1Runtime<'a> {
    pub registry: &'a GovernorRegistry<'a>,
    pub metrics: &'a Metrics<'a>,
    pub state: &'a SystemState,
    pub time: &'a dyn ClockSource,
    pub log: &'a dyn LogSink,
}

impl<'a> Core1Runtime<'a> {
    pub fn run(&self) -> ! {
        self.log.log("governor loop started on core 1");
        self.registry.init();

        // Tick timing accumulates per-core and is published as a snapshot
        // after every tick, so readers never see a partial update.
        let mut tick_count: u32 = 0;
        let mut tick_avg_ms: f32 = 0.0;

        loop {
            let governor = match self.registry.current() {
                Some(governor) => governor,
                None => {
                    self.state.ping_core1_wdt();
                    self.time.delay_ms(NO_GOVERNOR_SLEEP_MS);
                    continue;
                }
            };

            let aggregate = self.metrics.get_aggregate(true);
            let started_us = self.time.now_us();
            governor.tick(&aggregate);
            let elapsed_ms = self.time.now_us().wrapping_sub(started_us) as f32 / 1000.0;

            tick_count = tick_count.wrapping_add(1);
            tick_avg_ms += (elapsed_ms - tick_avg_ms) / tick_count as f32;
            self.metrics.publish_kernel(KernelSnapshot {
                gov_tick_count: tick_count,
                gov_tick_avg_ms: tick_avg_ms,
                last_ts_ms: self.time.now_ms(),
            });
        }
    }
}
