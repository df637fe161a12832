//! # Frame Checksums
//!
//! Every pump frame carries two checksums: one over the 4-byte header,
//! stored little-endian right after it, and one over the body, stored
//! big-endian at the end. Both are CRC-32, but they are validated
//! differently: the header checksum is checked against a fixed set of
//! known headers, because the pump only ever exchanges headers drawn
//! from the known call codes and the session tag table. Headers outside
//! that set have no known value: encoding one is a hard error, while
//! decoding one is tolerated for forward compatibility.

use once_cell::sync::Lazy;

use crate::constants::{is_known_call, is_session_tag};

const CRC32_POLY: u32 = 0xedb8_8320;

static CRC32_TABLE: Lazy<[u32; 256]> = Lazy::new(|| {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC32_POLY;
            } else {
                crc >>= 1;
            }
        }
        *entry = crc;
    }
    table
});

/// Byte-wise CRC-32 over `data`. Applied to frame bodies.
pub fn crc32(data: &[u8]) -> u32 {
    let table = &*CRC32_TABLE;
    let mut crc = !0u32;
    for &byte in data {
        crc = (crc >> 8) ^ table[((crc ^ u32::from(byte)) & 0xff) as usize];
    }
    !crc
}

/// Checksum for a 4-byte frame header, if the header is in the known
/// set: a known call code, a zero second byte, and a tag drawn from the
/// session table or its XOR complement. Returns `None` otherwise.
pub fn header_crc(header: &[u8; 4]) -> Option<u32> {
    if !is_known_call(header[0]) || header[1] != 0 || !is_session_tag(header[2]) {
        return None;
    }
    Some(crc32(header))
}
