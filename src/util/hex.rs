//! Hex encoding/decoding helpers.
//!
//! Used by the `usb:` bridge codec (which speaks hex-ASCII on the wire),
//! by trace logging, and by tests working from captured frames.

use thiserror::Error;

/// Errors that can occur while decoding hex text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("hex decoding error: {0}")]
    Decode(String),
}

/// Encode bytes as a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string to bytes. Accepts upper and lower case.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, HexError> {
    if text.len() % 2 != 0 {
        return Err(HexError::OddLength(text.len()));
    }
    hex::decode(text).map_err(|e| HexError::Decode(e.to_string()))
}

/// Format bytes as `01 2d 14` for log output.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build test data from a hex string. Panics on invalid hex; intended
/// for test code working from captured frames.
pub fn hex_to_bytes(text: &str) -> Vec<u8> {
    decode_hex(text).expect("invalid hex in test data")
}
