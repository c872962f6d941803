//! Desktop simulator for the wellbeing pump runtime monitor.
//!
//! Runs the monitor core against host stand-ins for the device: a synthetic
//! current waveform instead of the ADC, a file for the cycle log, the host
//! clock, and logged relay/lamp outputs. Operator requests are read from
//! stdin, one per line (see [`console`]).
//!
//! # Environment
//!
//! | Variable          | Meaning                                   |
//! |-------------------|-------------------------------------------|
//! | `RUST_LOG`        | log filter, default `info`                |
//! | `WELLBEING_DB`    | cycle log path, default `database.bin`    |
//! | `WELLBEING_SPEED` | pump profile speed-up, default `1`        |
//!
//! `--volatile` keeps the cycle log in the temp directory and deletes it when
//! stdin closes.

mod config;
mod console;
mod file_medium;
mod hardware;
mod observer;

use std::fs;
use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use embassy_futures::block_on;
use log::{error, info, warn};
use static_cell::StaticCell;

use wellbeing_core::hardware::{ALERT_PIN, LAMP_PIN, RELAY_PIN, WATCHDOG_TIMEOUT_MS};
use wellbeing_core::{Calibration, PumpMonitor, READING_QUEUE_DEPTH, ReadingChannel, SignalAcquirer};

use crate::config::SimulatorConfig;
use crate::file_medium::FileMedium;
use crate::hardware::{
    HostClock, HostWatchdog, LoggedPin, ProcessReset, SAMPLE_RATE_HZ, SimulatedAdc, ThreadDelay,
};
use crate::observer::LogObserver;

type SimMonitor = PumpMonitor<FileMedium, HostClock, LoggedPin, LoggedPin, ProcessReset>;

static READINGS: ReadingChannel<READING_QUEUE_DEPTH> = ReadingChannel::new();
static MONITOR: StaticCell<SimMonitor> = StaticCell::new();
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

const SAMPLE_PERIOD: Duration = Duration::from_micros(1_000_000 / SAMPLE_RATE_HZ as u64);

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting wellbeing simulator");

    let config = SimulatorConfig::from_env();
    info!(
        "Cycle log: {}{}",
        config.db_path.display(),
        if config.volatile { " (volatile)" } else { "" }
    );
    info!("Pump profile speed: {}x", config.speed);

    let booted = block_on(PumpMonitor::boot(
        FileMedium::new(&config.db_path),
        HostClock::new(),
        LoggedPin::new("relay", RELAY_PIN),
        LoggedPin::new("lamp", LAMP_PIN),
        ProcessReset,
    ));
    let monitor: &'static SimMonitor = match booted {
        Ok(monitor) => MONITOR.init(monitor),
        Err(e) => {
            error!("Boot failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Booted at {}", monitor.boot_time());
    block_on(monitor.notifier().register(Box::new(LogObserver::new())));

    // Stands in for the ALERT/RDY pin interrupt.
    let watchdog = HostWatchdog::start(Duration::from_millis(u64::from(WATCHDOG_TIMEOUT_MS)));
    let mut acquirer = SignalAcquirer::new(
        SimulatedAdc::new(config.speed),
        watchdog,
        Calibration::DEFAULT,
        &READINGS,
    );
    let Ok(()) = acquirer.start();
    info!("Sampling ALERT pin {} at {} Hz", ALERT_PIN, SAMPLE_RATE_HZ);
    let sampler = thread::spawn(move || {
        while acquirer.is_running() && !SHUTDOWN.load(Ordering::Acquire) {
            acquirer.on_interrupt();
            thread::sleep(SAMPLE_PERIOD);
        }
        acquirer.stop();
    });

    thread::spawn(move || {
        let err = block_on(monitor.run(&READINGS, &mut ThreadDelay));
        error!("Cycle log failed, restarting: {}", err);
        log::logger().flush();
        std::process::exit(1);
    });

    info!("Console ready, one request per line");
    let served = console::serve(monitor, io::stdin().lock(), io::stdout().lock());

    SHUTDOWN.store(true, Ordering::Release);
    if sampler.join().is_err() {
        warn!("Sampler thread panicked");
    }
    if READINGS.dropped() > 0 {
        warn!("{} readings dropped on overflow", READINGS.dropped());
    }

    if config.volatile {
        if let Err(e) = fs::remove_file(&config.db_path) {
            warn!("Failed to remove {}: {}", config.db_path.display(), e);
        }
    }

    match served {
        Ok(()) => {
            info!("Simulator exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Console failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
