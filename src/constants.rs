//! Pump Protocol Constants
//!
//! This module defines the call codes, session tag table, radio geometry,
//! and timing profiles of the pump call protocol.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Pump call codes (frame type byte)
// ----------------------------------------------------------------------------

/// Open a session; the pump replies from its home screen
pub const CALL_WAKEUP: u8 = 0x00;

/// Busy indication carrying a backoff interval in milliseconds
pub const CALL_KEEPALIVE: u8 = 0x03;

/// Close the session; fire-and-forget, no reply
pub const CALL_ADJOURN: u8 = 0x05;

/// Home-screen status snapshot
pub const CALL_STATUS: u8 = 0x50;

/// Reserved status page; named for tracing, never issued by the driver
pub const CALL_STATUS1: u8 = 0x20;

/// Last bolus and insulin-on-board
pub const CALL_STATUS2: u8 = 0x25;

/// Daily totals and temp/suspend flags
pub const CALL_STATUS3: u8 = 0x27;

/// Extended (combo) bolus state
pub const CALL_STATUS4: u8 = 0x26;

/// Cancel the active combo; also carries the clear-warning body
pub const CALL_CANCEL_COMBO: u8 = 0x35;

/// Acknowledge an immediate bolus
pub const CALL_BOLUS_ACK: u8 = 0x30;

/// Acknowledge a combo bolus
pub const CALL_COMBO_ACK: u8 = 0x31;

/// Keep a delivery poll loop alive
pub const CALL_DELIVERY_CONTINUE: u8 = 0x32;

/// Delivery progress report
pub const CALL_DELIVERY_STATUS: u8 = 0x33;

/// Program a bolus; the reply echoes the request
pub const CALL_BOLUS: u8 = 0x37;

/// Clear-warning marker (the body is sent under [`CALL_CANCEL_COMBO`])
pub const CALL_CLEAR_WARN: u8 = 0x45;

/// Human-readable name of a pump call code, for tracing.
pub fn call_name(code: u8) -> &'static str {
    match code {
        CALL_WAKEUP => "Wakeup",
        CALL_KEEPALIVE => "Keepalive",
        CALL_ADJOURN => "Adjourn",
        CALL_STATUS => "Status",
        CALL_STATUS1 => "Status1",
        CALL_STATUS2 => "Status2",
        CALL_STATUS3 => "Status3",
        CALL_STATUS4 => "Status4",
        CALL_CANCEL_COMBO => "CancelCombo",
        CALL_BOLUS_ACK => "BolusAck",
        CALL_COMBO_ACK => "ComboAck",
        CALL_DELIVERY_CONTINUE => "DeliveryContinue",
        CALL_DELIVERY_STATUS => "DeliveryStatus",
        CALL_BOLUS => "Bolus",
        CALL_CLEAR_WARN => "ClearWarn",
        _ => "<unknown>",
    }
}

/// Whether `code` is a call the driver can emit or receive.
pub fn is_known_call(code: u8) -> bool {
    call_name(code) != "<unknown>"
}

// ----------------------------------------------------------------------------
// Session tags
// ----------------------------------------------------------------------------

/// The fixed tag sequence the handset draws from, in order. The pump
/// tracks the same sequence and answers with the tag XORed with 0xff.
/// The index resets on session resume; drawing past the end is a hard
/// error.
pub const TAG_SEQUENCE: [u8; 11] = [
    0x00, 0x0e, 0xf8, 0x12, 0xea, 0x24, 0xdc, 0x36, 0xc0, 0x4e, 0xb6,
];

/// Whether `tag` can appear in a frame header: an entry of the session
/// table, or the XOR complement of one (a reply tag).
pub fn is_session_tag(tag: u8) -> bool {
    TAG_SEQUENCE.contains(&tag) || TAG_SEQUENCE.contains(&(tag ^ 0xff))
}

// ----------------------------------------------------------------------------
// Radio geometry
// ----------------------------------------------------------------------------

/// Fixed radio packet size; pump frames are zero-padded to this length
pub const NPKT: usize = 78;

/// Largest radio call on the wire: len + type + flag + timeout +
/// preamble + filter byte + packet
pub const CALLMAX: usize = 1 + 1 + 2 + 2 + 1 + 1 + NPKT;

/// Baud rate of the USB/serial bridge
pub const SERIAL_BAUD: u32 = 19200;

// ----------------------------------------------------------------------------
// Timing profiles (applied per call type by the session engine)
// ----------------------------------------------------------------------------

/// Carrier preamble ahead of a wakeup transmit
pub const WAKEUP_PREAMBLE: Duration = Duration::from_secs(2);

/// Per-try receive timeout for wakeup
pub const WAKEUP_TIMEOUT: Duration = Duration::from_millis(200);

/// Timeout retries for wakeup
pub const WAKEUP_TRIES: u32 = 10;

/// Per-try receive timeout for ordinary calls
pub const CALL_TIMEOUT: Duration = Duration::from_millis(300);

/// Timeout retries for ordinary calls
pub const CALL_TRIES: u32 = 15;

/// Timeout retries while re-polling after a keepalive backoff
pub const KEEPALIVE_TRIES: u32 = 10;

/// Backoff value the pump reports when it actually needs longer; the
/// handset shipped with this pump waits 450 ms instead
pub const KEEPALIVE_QUIRK_BACKOFF: Duration = Duration::from_millis(300);

/// Substitute sleep for [`KEEPALIVE_QUIRK_BACKOFF`]
pub const KEEPALIVE_QUIRK_SLEEP: Duration = Duration::from_millis(450);
