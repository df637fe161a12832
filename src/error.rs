//! # Pump Driver Error Handling
//!
//! This module defines the [`PumpError`] enum covering every failure the
//! driver can surface: radio channel I/O, bridge error replies, checksum
//! and tag validation, decode faults, and usage errors caught before any
//! I/O happens.

use std::time::Duration;

use thiserror::Error;

use crate::radio::rcall::RadioErr;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, PumpError>;

/// Represents the different error types that can occur in the driver.
#[derive(Error, Debug)]
pub enum PumpError {
    /// Read or write failure on the underlying byte channel.
    #[error("radio channel I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    SerialPort(String),

    /// A radio spec string that is not `<tty|usb>:<path>`.
    #[error("invalid radio spec {spec:?}: expected <tty|usb>:<path>")]
    InvalidRadioSpec { spec: String },

    /// The bridge answered a call with an error reply.
    #[error("radio bridge error: {0}")]
    Radio(RadioErr),

    /// Every receive attempt for one pump call timed out.
    #[error("radio call timed out after {tries} tries")]
    RadioTimeout { tries: u32 },

    /// A radio call length byte out of range, or not matching the data.
    #[error("invalid radio call length {len}: maximum {max}")]
    InvalidCallLength { len: usize, max: usize },

    /// A radio call type byte outside the known set.
    #[error("invalid radio call type 0x{0:02x}")]
    InvalidCallType(u8),

    /// The bridge reply type does not correspond to the request type.
    #[error("bad radio reply type 0x{got:02x} for request type 0x{sent:02x}")]
    BadRadioReply { sent: u8, got: u8 },

    /// A frame header outside the known-header set on the encode path.
    #[error("no header checksum known for header {header:02x?}")]
    MissingHeaderCrc { header: [u8; 4] },

    /// A known frame header whose stored checksum does not validate.
    #[error("header checksum mismatch: expected {expected:08x}, got {got:08x}")]
    HeaderCrcMismatch { expected: u32, got: u32 },

    /// A frame body whose trailing checksum does not validate.
    #[error("payload checksum mismatch: expected {expected:08x}, got {got:08x}")]
    PayloadCrcMismatch { expected: u32, got: u32 },

    /// A pump frame body larger than the radio packet allows.
    #[error("frame body too large for radio packet: {len} bytes, maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// A reply tag that is not the request tag XOR 0xff.
    #[error("bad reply tag 0x{got:02x}: expected 0x{expected:02x}")]
    BadReplyTag { expected: u8, got: u8 },

    /// A settled (post-keepalive) reply of a different type than requested.
    #[error("unexpected reply type 0x{got:02x} to 0x{requested:02x} request")]
    UnexpectedReplyType { requested: u8, got: u8 },

    /// Underflow or malformed content while parsing a message or frame.
    #[error("decode fault at byte {offset}")]
    Decode { offset: usize },

    /// The session drew past the last entry of the tag table.
    #[error("ran out of session tags")]
    TagsExhausted,

    /// A combo duration the pump cannot express.
    #[error("combo duration {0:?} is not a whole multiple of 6 minutes")]
    InvalidComboDuration(Duration),

    /// The pump echoed a bolus different from the one requested.
    #[error("pump echoed mismatched bolus: sent {sent}, received {received}")]
    BolusMismatch { sent: String, received: String },
}
