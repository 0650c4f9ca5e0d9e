// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! picofreq on the Raspberry Pi Pico (RP2040).
//!
//! Board wiring and boot sequencing. Core 0 owns the serial line, the PIO
//! poller and the core-1 liveness watchdog; core 1 runs the governor loop.
//! The out-of-scope collaborators (command shell, log ring, flash driver)
//! appear here only as minimal stand-ins behind their kernel contracts.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod io;

use core::ptr::addr_of;
use core::sync::atomic::{compiler_fence, Ordering};

#[cfg(target_os = "none")]
use cortex_m_rt::entry;

use kernel::governor::ondemand::OndemandGovernor;
use kernel::governor::performance::PerformanceGovernor;
use kernel::governor::rp2040_perf::RpPerfGovernor;
use kernel::governor::schedutil::SchedutilGovernor;
use kernel::governor::{GovernorRegistry, RampDriver};
use kernel::hil::console::{CommandDispatcher, Console};
use kernel::hil::log::LogSink;
use kernel::hil::storage::SectorStore;
use kernel::hil::sync::Spinlock;
use kernel::metrics::Metrics;
use kernel::persist::{PersistentConfig, PERSIST_SECTOR_SIZE};
use kernel::ramp::RampEngine;
use kernel::runtime::{Core0Runtime, Core1Runtime};
use kernel::stability::StabilityArbiter;
use kernel::state::{SystemState, MIN_KHZ};
use kernel::static_init;
use kernel::utilities::cells::TakeCell;
use kernel::ErrorCode;

use rp2040::adc::{Adc, TempSensor};
use rp2040::clocks::{Clock, Clocks};
use rp2040::gpio::{GpioFunction, RPGpioPin};
use rp2040::multicore::Multicore;
use rp2040::pio::{PioIdleMonitor, HB_PIN, IDLE_PIN};
use rp2040::psm::Psm;
use rp2040::resets::Resets;
use rp2040::sio::{Processor, Sio, SioSpinlock};
use rp2040::timer::RPTimer;
use rp2040::uart::Uart;
use rp2040::vreg::Vreg;
use rp2040::watchdog::Watchdog;
use rp2040::XOSC_FREQ_KHZ;

/// Second-stage bootloader, checksummed for the W25Q080 flash on the Pico.
#[cfg(target_os = "none")]
#[link_section = ".boot2"]
#[used]
static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

const UART_BAUD: u32 = 115_200;
const CORE1_STACK_WORDS: usize = 1024;

/// Spinlock assignments; 31 is left free for debug probes.
const LOCK_GOV_PARAMS: usize = 25;
const LOCK_GOV_STATS: usize = 26;
const LOCK_LOG: usize = 27;
const LOCK_METRICS: usize = 28;
const LOCK_SNAPSHOT: usize = 29;
const LOCK_PIO_STATS: usize = 30;

/// UART-backed log sink. The ring-buffer log with its DMA backend is an
/// external collaborator; this stand-in serializes whole lines with a
/// spinlock since both cores log.
struct UartLogSink<'a> {
    uart: &'a Uart,
    lock: &'a SioSpinlock,
}

impl LogSink for UartLogSink<'_> {
    fn log(&self, message: &str) {
        self.lock.claim();
        self.uart.write_str("[klog] ");
        self.uart.write_str(message);
        self.uart.write_str("\r\n");
        self.lock.release();
    }
}

/// Stand-in for the interactive shell collaborator: every line is reported
/// back, nothing is interpreted.
struct ShellStub<'a> {
    console: &'a Uart,
}

impl CommandDispatcher for ShellStub<'_> {
    fn dispatch(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.console.write_str("unknown command: ");
        self.console.write_str(line);
        self.console.write_str(" (no shell in this build)\r\n");
    }
}

/// RAM-backed stand-in for the flash collaborator holding the persistent
/// sector. Contents survive a core-1 watchdog reboot only as long as power
/// stays on; the contract is identical to the flash-backed store.
struct RamSectorStore {
    data: TakeCell<'static, [u8]>,
}

impl SectorStore for RamSectorStore {
    fn size(&self) -> usize {
        PERSIST_SECTOR_SIZE
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), ErrorCode> {
        self.data.map_or(Err(ErrorCode::NOMEM), |data| {
            if offset + buf.len() > data.len() {
                return Err(ErrorCode::SIZE);
            }
            buf.copy_from_slice(&data[offset..offset + buf.len()]);
            Ok(())
        })
    }

    fn rewrite(&self, sector: &[u8]) -> Result<(), ErrorCode> {
        self.data.map_or(Err(ErrorCode::NOMEM), |data| {
            if sector.len() != data.len() {
                return Err(ErrorCode::SIZE);
            }
            data.copy_from_slice(sector);
            Ok(())
        })
    }
}

/// Handoff slot for core 1's runtime; written by core 0 before the launch
/// handshake, read exactly once by core 1.
static mut CORE1_RUNTIME: Option<&'static Core1Runtime<'static>> = None;

extern "C" fn core1_entry() -> ! {
    // Leftover launch-handshake words must not reach the lockout protocol.
    let sio = Sio::new();
    sio.fifo_drain();

    compiler_fence(Ordering::Acquire);
    // SAFETY: written once on core 0 before launch_core1, never mutated
    // afterwards.
    let runtime = unsafe { (*addr_of!(CORE1_RUNTIME)).unwrap() };
    runtime.run()
}

#[cfg_attr(target_os = "none", entry)]
fn main() -> ! {
    let sio = static_init!(Sio, Sio::new());
    if let Processor::Processor1 = sio.get_processor() {
        panic!("boot must run on processor 0");
    }

    let resets = static_init!(Resets, Resets::new());
    resets.unreset_used_peripherals();

    let xosc = static_init!(rp2040::xosc::Xosc, rp2040::xosc::Xosc::new());
    xosc.init();

    let clocks = static_init!(Clocks, Clocks::new());
    clocks.configure_reference_from_xosc();
    clocks.enable_resus();

    let watchdog = static_init!(Watchdog, Watchdog::new());
    // clk_ref now runs at crystal speed: 12 cycles per tick is 1 us.
    watchdog.start_tick(XOSC_FREQ_KHZ / 1000);
    // Boot at the bottom of the operating range; the governor ramps from
    // here once core 1 is up.
    let _ = clocks.set_sys_clock_khz(MIN_KHZ);
    clocks.configure_peripheral_from_xosc();

    let timer = static_init!(RPTimer, RPTimer::new());

    let uart_tx = static_init!(RPGpioPin, RPGpioPin::new(0));
    let uart_rx = static_init!(RPGpioPin, RPGpioPin::new(1));
    uart_tx.set_function(GpioFunction::Uart);
    uart_rx.set_function(GpioFunction::Uart);
    let uart = static_init!(Uart, Uart::new_uart0());
    uart.init(clocks.get_frequency(Clock::Peripheral), UART_BAUD);

    let log_lock = static_init!(SioSpinlock, SioSpinlock::new(LOCK_LOG));
    let log = static_init!(
        UartLogSink<'static>,
        UartLogSink {
            uart,
            lock: log_lock,
        }
    );

    uart.write_str("\r\n--- picofreq (boot) ---\r\n");

    // Measurement pins: core-0 outputs, observed by the PIO counters.
    let idle_pin = static_init!(RPGpioPin, RPGpioPin::new(IDLE_PIN as usize));
    let hb_pin = static_init!(RPGpioPin, RPGpioPin::new(HB_PIN as usize));
    idle_pin.make_sio_output();
    hb_pin.make_sio_output();

    let adc = static_init!(Adc, Adc::new());
    adc.init();
    adc.enable_temperature_sensor();
    let temperature = static_init!(TempSensor<'static>, TempSensor::new(adc));

    let state = static_init!(SystemState, SystemState::new());

    let metrics_lock = static_init!(SioSpinlock, SioSpinlock::new(LOCK_METRICS));
    let snapshot_lock = static_init!(SioSpinlock, SioSpinlock::new(LOCK_SNAPSHOT));
    let metrics = static_init!(
        Metrics<'static>,
        Metrics::new(metrics_lock, snapshot_lock, timer)
    );

    let pio_lock = static_init!(SioSpinlock, SioSpinlock::new(LOCK_PIO_STATS));
    let arbiter = static_init!(StabilityArbiter<'static>, StabilityArbiter::new(pio_lock));
    let pio_monitor = static_init!(PioIdleMonitor, PioIdleMonitor::new());
    pio_monitor.init();
    arbiter.set_counters(pio_monitor);

    let psm = static_init!(Psm, Psm::new());
    let multicore = static_init!(Multicore<'static>, Multicore::new(sio, psm));

    let vreg = static_init!(Vreg, Vreg::new());
    let ramp = static_init!(
        RampEngine<'static>,
        RampEngine::new(state, clocks, vreg, multicore, timer, log)
    );
    let driver = static_init!(
        RampDriver<'static>,
        RampDriver::new(state, ramp, arbiter, timer, log)
    );

    // Persistence: the flash driver is out of scope, so the sector lives in
    // RAM behind the same contract.
    let store_data = static_init!([u8; PERSIST_SECTOR_SIZE], [0xFF; PERSIST_SECTOR_SIZE]);
    let store = static_init!(
        RamSectorStore,
        RamSectorStore {
            data: TakeCell::new(store_data),
        }
    );
    let staging = static_init!([u8; PERSIST_SECTOR_SIZE], [0; PERSIST_SECTOR_SIZE]);
    let config = static_init!(PersistentConfig<'static>, PersistentConfig::new(store));
    config.set_buffer(staging);

    let registry = static_init!(
        GovernorRegistry<'static>,
        GovernorRegistry::new(config, log)
    );
    let gov_param_lock = static_init!(SioSpinlock, SioSpinlock::new(LOCK_GOV_PARAMS));
    let gov_stats_lock = static_init!(SioSpinlock, SioSpinlock::new(LOCK_GOV_STATS));
    let rp2040_perf = static_init!(
        RpPerfGovernor<'static>,
        RpPerfGovernor::new(
            gov_param_lock,
            gov_stats_lock,
            state,
            driver,
            vreg,
            temperature,
            timer,
            log,
            config,
        )
    );
    let ondemand = static_init!(
        OndemandGovernor<'static>,
        OndemandGovernor::new(state, driver, temperature, timer, log)
    );
    let schedutil = static_init!(
        SchedutilGovernor<'static>,
        SchedutilGovernor::new(state, driver, temperature, timer, log)
    );
    let performance = static_init!(
        PerformanceGovernor<'static>,
        PerformanceGovernor::new(state, driver, timer, log)
    );
    let _ = registry.register(ondemand);
    let _ = registry.register(schedutil);
    let _ = registry.register(performance);
    let _ = registry.register(rp2040_perf);

    let core1 = static_init!(
        Core1Runtime<'static>,
        Core1Runtime {
            registry,
            metrics,
            state,
            time: timer,
            log,
        }
    );
    // SAFETY: single store before the launch handshake; core 1 is still
    // parked in the bootrom.
    unsafe {
        CORE1_RUNTIME = Some(core1);
    }
    compiler_fence(Ordering::Release);

    let core1_stack = static_init!([usize; CORE1_STACK_WORDS], [0; CORE1_STACK_WORDS]);
    multicore.launch_core1(core1_entry, core1_stack);
    log.log("system boot complete");

    let dispatcher = static_init!(ShellStub<'static>, ShellStub { console: uart });
    let core0 = static_init!(
        Core0Runtime<'static>,
        Core0Runtime {
            console: uart,
            dispatcher,
            idle_pin,
            heartbeat_pin: hb_pin,
            arbiter,
            lockout_victim: multicore,
            temperature,
            state,
            time: timer,
            log,
            reset: watchdog,
        }
    );
    core0.run()
}
