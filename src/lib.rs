//! # pumprf-rs - Radio Remote Control for a Combo-Capable Insulin Pump
//!
//! This crate drives an insulin infusion pump over its proprietary
//! short-range radio link, by way of a USB/serial bridge that owns the
//! RF PHY. It impersonates the vendor's remote-control handset closely
//! enough that the pump accepts its commands.
//!
//! ## Features
//!
//! - Open a `tty:` (raw serial) or `usb:` (hex-ASCII serial) bridge link
//! - Speak the radio call transport: one-shot transmits, timed
//!   receives, and atomic transmit-then-receive with a carrier preamble
//! - Speak the pump call session protocol: checksummed frames, the
//!   fixed tag sequence, per-call timing profiles, timeout retries, and
//!   keepalive backoff
//! - Read consolidated pump status (basal, reservoir, IOB, temp, combo,
//!   daily totals)
//! - Cancel a running combo bolus, clear warnings, deliver immediate
//!   and extended boluses
//! - Converge the pump's effective delivery rate onto a target via
//!   repeated [`Pump::set_rate`] steps
//!
//! ## Usage
//!
//! ```no_run
//! use pumprf_rs::{Pump, Rate};
//!
//! # async fn run() -> pumprf_rs::Result<()> {
//! let mut pump = Pump::dial("usb:/dev/ttyACM0")?;
//! let stat = pump.stat().await?;
//! println!("reservoir {}", stat.reservoir);
//!
//! let target = Rate::units_per_hour(1);
//! while !pump.set_rate(target).await? {}
//! # Ok(())
//! # }
//! ```
//!
//! The pump session is strictly serial and single-owner: a [`Pump`]
//! takes `&mut self` for every call, and nothing is pipelined; the
//! pump's tag counter tracks the driver's, so requests cannot overlap.

pub mod constants;
pub mod error;
pub mod logging;
pub mod pump;
pub mod radio;
pub mod util;

pub use error::{PumpError, Result};
pub use logging::init_logger;
pub use pump::{Amount, Bolus, Frame, Pump, PumpStat, PumpTime, Rate};
pub use radio::rcall::{RadioCall, RadioErr};
pub use radio::Radio;
