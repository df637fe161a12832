//! Logging setup.
//!
//! The driver logs through the `log` facade; binaries call
//! [`init_logger`] once at startup. Frame- and radio-level tracing are
//! per-channel options (see [`crate::radio::Radio`] and
//! [`crate::pump::Pump`]), emitted at `debug!` level under the targets
//! below.

/// Log target for radio call tracing.
pub const RADIO_TARGET: &str = "pumprf::radio";

/// Log target for pump frame tracing.
pub const FRAME_TARGET: &str = "pumprf::frame";

/// Initializes the logger with the `env_logger` crate.
pub fn init_logger() {
    env_logger::init();
}
