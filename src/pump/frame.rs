//! # Pump Frame Codec
//!
//! The session-layer framing spoken through the radio to the pump:
//!
//! ```text
//! ┌─────────┬──────┬────────┬─────────┬────────────┬─ body > 0 ─────────────────┐
//! │ type u8 │ 0 u8 │ tag u8 │ size u8 │ hdr_crc    │ body bytes │ payload_crc   │
//! │         │      │        │         │ u32 LE     │            │ u32 BE        │
//! └─────────┴──────┴────────┴─────────┴────────────┴────────────┴───────────────┘
//! ```
//!
//! The header checksum is stored little-endian while the payload
//! checksum is stored big-endian; the asymmetry is an artifact of how
//! the vendor generates them, and it is load-bearing. On decode, a
//! header outside the known set is tolerated (its checksum cannot be
//! checked); a checksum mismatch on a known header, or any payload
//! checksum mismatch, is a hard error.

use std::fmt;

use nom::bytes::complete::take;
use nom::number::complete::{be_u32, le_u32};
use nom::IResult;

use crate::constants::{call_name, NPKT};
use crate::error::{PumpError, Result};
use crate::pump::crc::{crc32, header_crc};
use crate::util::codec::{finish, put_u32_be, put_u32_le};
use crate::util::hex::format_hex_compact;

/// Largest body a frame can carry and still fit the radio packet
/// alongside its header and checksums.
pub const MAX_BODY: usize = NPKT - 12;

/// A pump frame: call type, session tag, and message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub call: u8,
    pub tag: u8,
    pub body: Vec<u8>,
}

impl Frame {
    /// Encode to wire bytes. Fails if the header is outside the known
    /// checksum set or the body exceeds [`MAX_BODY`].
    pub fn pack(&self) -> Result<Vec<u8>> {
        if self.body.len() > MAX_BODY {
            return Err(PumpError::FrameTooLarge {
                len: self.body.len(),
                max: MAX_BODY,
            });
        }

        let header = [self.call, 0, self.tag, self.body.len() as u8];
        let crc = header_crc(&header).ok_or(PumpError::MissingHeaderCrc { header })?;

        let mut buf = Vec::with_capacity(8 + self.body.len() + 4);
        buf.extend_from_slice(&header);
        put_u32_le(&mut buf, crc);
        if !self.body.is_empty() {
            buf.extend_from_slice(&self.body);
            put_u32_be(&mut buf, crc32(&self.body));
        }
        Ok(buf)
    }

    /// Decode wire bytes, validating both checksums. Bytes past the end
    /// of the frame are radio padding and are ignored.
    pub fn parse(b: &[u8]) -> Result<Frame> {
        let (frame, header, stored_header_crc, stored_payload_crc) = finish(b, parse_frame(b))?;

        // Look the raw wire header up; a reserved byte the driver does
        // not know about must land in the lenient unknown-header path.
        if let Some(expected) = header_crc(&header) {
            if expected != stored_header_crc {
                return Err(PumpError::HeaderCrcMismatch {
                    expected,
                    got: stored_header_crc,
                });
            }
        }

        if let Some(stored) = stored_payload_crc {
            let expected = crc32(&frame.body);
            if expected != stored {
                return Err(PumpError::PayloadCrcMismatch {
                    expected,
                    got: stored,
                });
            }
        }

        Ok(frame)
    }
}

#[allow(clippy::type_complexity)]
fn parse_frame(input: &[u8]) -> IResult<&[u8], (Frame, [u8; 4], u32, Option<u32>)> {
    let (i, header_bytes) = take(4usize)(input)?;
    let mut header = [0u8; 4];
    header.copy_from_slice(header_bytes);
    let (call, tag, size) = (header[0], header[2], header[3] as usize);
    let (i, stored_header_crc) = le_u32(i)?;

    if size == 0 {
        let frame = Frame {
            call,
            tag,
            body: Vec::new(),
        };
        return Ok((i, (frame, header, stored_header_crc, None)));
    }

    let (i, body) = take(size)(i)?;
    let (i, stored_payload_crc) = be_u32(i)?;
    let frame = Frame {
        call,
        tag,
        body: body.to_vec(),
    };
    Ok((i, (frame, header, stored_header_crc, Some(stored_payload_crc))))
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type {} tag {:02x} body[{}] {}",
            call_name(self.call),
            self.tag,
            self.body.len(),
            format_hex_compact(&self.body)
        )
    }
}
