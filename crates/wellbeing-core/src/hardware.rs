//! Hardware seams of the monitor
//!
//! The core never touches peripherals directly. Boards supply the current
//! sensor ADC, the liveness watchdog and the reset line through these traits,
//! and the relay and lamp through `embedded_hal::digital::OutputPin`.

/// GPIO wired to the ADC's conversion-ready (ALERT/RDY) output
pub const ALERT_PIN: u8 = 4;
/// GPIO driving the pump interlock relay
pub const RELAY_PIN: u8 = 5;
/// GPIO driving the fault indicator lamp
pub const LAMP_PIN: u8 = 2;

/// Watchdog timeout: five minutes without a sampling interrupt restarts the device
pub const WATCHDOG_TIMEOUT_MS: u32 = 5 * 60 * 1000;

/// Differential ADC sampling the current transformer.
///
/// The ADC runs in continuous conversion mode and pulses its alert pin once
/// per finished conversion; `read_alert` is called from that interrupt.
pub trait AlertAdc {
    type Error;

    /// Start continuous conversions and arm the alert pin.
    fn start_conversions(&mut self) -> Result<(), Self::Error>;

    /// Disarm the alert pin so no further interrupts arrive.
    fn stop_conversions(&mut self);

    /// Read the conversion that raised the current interrupt.
    ///
    /// Called from interrupt context: must not block or allocate.
    fn read_alert(&mut self) -> Result<i16, Self::Error>;
}

/// Hardware liveness watchdog.
///
/// Once started it restarts the whole device unless fed within its timeout.
/// A stalled sampling path is not recoverable in-process, so nothing in the
/// monitor catches this.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Unconditional restart of the whole device.
pub trait SystemReset {
    fn hard_reset(&mut self) -> !;
}
