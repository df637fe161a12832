//! # Pump Session Layer
//!
//! The pump call protocol: checksummed, tag-sequenced frames carried in
//! radio packets, a session engine that paces and retries them, and the
//! handset orchestrations built on top.

pub mod codec;
pub mod crc;
pub mod device;
pub mod frame;
pub mod message;
pub mod protocol;

pub use device::PumpStat;
pub use frame::Frame;
pub use message::{
    Amount, Bolus, BolusProgress, ClearWarn, DeliveryStatus, Keepalive, PumpTime, Rate, Reply,
    Request, Status, Status2, Status3, Status4, Wakeup,
};
pub use protocol::Pump;
