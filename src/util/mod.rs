//! # Utility Modules
//!
//! Common helpers shared by the radio and pump layers: hex
//! encoding/decoding and wire-codec primitives.

pub mod codec;
pub mod hex;

pub use hex::{decode_hex, encode_hex, format_hex_compact, hex_to_bytes};
