//! Current sampling in interrupt context
//!
//! The ADC converts continuously at 250 samples per second and raises its
//! alert pin after every conversion. Each interrupt stores one raw code into
//! a fixed window; when the window fills, its RMS is converted to amps and
//! pushed onto the [`ReadingChannel`].
//!
//! Everything here runs inside the interrupt handler: no allocation, no
//! logging, no locks other than the channel's short critical section.

use crate::channel::ReadingChannel;
use crate::hardware::{AlertAdc, Watchdog};

/// Raw codes per RMS window (about one second at 250 SPS)
pub const WINDOW_SAMPLES: usize = 240;

/// Linear conversion from raw RMS code to amps.
///
/// `amps = raw_rms * factor_milli / 1000 / divisor`, rounded to milliamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Calibration factor in thousandths (22.438 -> 22_438)
    pub factor_milli: u64,
    /// Scale divisor applied after the factor
    pub divisor: u64,
}

impl Calibration {
    /// Factor found by manual testing and line fitting against a clamp meter
    pub const DEFAULT: Self = Self {
        factor_milli: 22_438,
        divisor: 1000,
    };

    /// Convert an RMS code given in thousandths into whole milliamps.
    pub const fn rms_to_milliamps(&self, rms_milli: u64) -> u64 {
        // rms * factor / divisor amps == rms_milli * factor_milli / divisor / 1000 milliamps
        let scale = self.divisor * 1000;
        (rms_milli * self.factor_milli + scale / 2) / scale
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Root-mean-square of a full window, in thousandths of a raw code.
///
/// Integer fixed-point so the interrupt path needs no floating-point sqrt.
pub fn window_rms_milli(samples: &[i16]) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let sum_sq: u64 = samples
        .iter()
        .map(|&s| {
            let s = i64::from(s).unsigned_abs();
            s * s
        })
        .sum();
    (sum_sq * 1_000_000 / samples.len() as u64).isqrt()
}

/// Turns alert-pin interrupts into one calibrated reading per window.
pub struct SignalAcquirer<'a, A, W, const N: usize>
where
    A: AlertAdc,
    W: Watchdog,
{
    adc: A,
    watchdog: W,
    calibration: Calibration,
    samples: [i16; WINDOW_SAMPLES],
    collected: usize,
    running: bool,
    channel: &'a ReadingChannel<N>,
}

impl<'a, A, W, const N: usize> SignalAcquirer<'a, A, W, N>
where
    A: AlertAdc,
    W: Watchdog,
{
    pub fn new(adc: A, watchdog: W, calibration: Calibration, channel: &'a ReadingChannel<N>) -> Self {
        Self {
            adc,
            watchdog,
            calibration,
            samples: [0; WINDOW_SAMPLES],
            collected: 0,
            running: false,
            channel,
        }
    }

    /// Start conversions and begin accepting interrupts.
    pub fn start(&mut self) -> Result<(), A::Error> {
        self.collected = 0;
        self.adc.start_conversions()?;
        self.running = true;
        Ok(())
    }

    /// Disable the interrupt source. Called first during shutdown so no
    /// reading is produced mid-teardown.
    pub fn stop(&mut self) {
        self.running = false;
        self.adc.stop_conversions();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Interrupt handler body: feed the watchdog, take one sample, and emit
    /// a reading when the window is full.
    ///
    /// A failed ADC read is swallowed; the window simply takes one more
    /// interrupt to fill.
    pub fn on_interrupt(&mut self) {
        if !self.running {
            return;
        }
        self.watchdog.feed();

        let Ok(raw) = self.adc.read_alert() else {
            return;
        };

        if self.collected < WINDOW_SAMPLES {
            self.samples[self.collected] = raw;
            self.collected += 1;
        }

        if self.collected >= WINDOW_SAMPLES {
            let amps = self.window_amps();
            self.channel.push(amps);
            self.collected = 0;
        }
    }

    /// Samples collected towards the current window.
    pub fn collected(&self) -> usize {
        self.collected
    }

    fn window_amps(&self) -> f32 {
        let rms_milli = window_rms_milli(&self.samples);
        self.calibration.rms_to_milliamps(rms_milli) as f32 / 1000.0
    }
}
