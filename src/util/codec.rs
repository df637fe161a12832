//! Wire-codec primitives shared by the radio and pump layers.
//!
//! Parsing is built on `nom`; [`finish`] runs a parser to completion and
//! converts a failure into a [`PumpError::Decode`] carrying the byte
//! offset where parsing stopped, so malformed input can never panic out
//! of the driver. Encoding appends to plain `Vec<u8>` buffers.

use nom::bytes::complete::take;
use nom::number::complete::le_u16;
use nom::IResult;

use crate::error::PumpError;

/// Run a parser over `input`, discarding any unparsed remainder.
///
/// Pump frames arrive zero-padded to the radio packet size, so trailing
/// bytes after a successful parse are expected and ignored.
pub fn finish<T>(input: &[u8], result: IResult<&[u8], T>) -> Result<T, PumpError> {
    match result {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(PumpError::Decode {
            offset: input.len() - e.input.len(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(PumpError::Decode {
            offset: input.len(),
        }),
    }
}

/// Fail the surrounding parser at `input` with a verification error.
pub(crate) fn fail<T>(input: &[u8]) -> IResult<&[u8], T> {
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Verify,
    )))
}

/// Append a `u16` little-endian.
pub fn put_u16_le(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append a `u32` little-endian.
pub fn put_u32_le(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append a `u16` big-endian.
pub fn put_u16_be(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Append a `u32` big-endian.
pub fn put_u32_be(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Parse a length-prefixed string (u16 LE length, then bytes).
pub fn string(input: &[u8]) -> IResult<&[u8], String> {
    let (input, len) = le_u16(input)?;
    let (input, bytes) = take(len as usize)(input)?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok((input, s.to_string())),
        Err(_) => fail(input),
    }
}

/// Append a length-prefixed string (u16 LE length, then bytes).
pub fn put_string(buf: &mut Vec<u8>, value: &str) {
    put_u16_le(buf, value.len() as u16);
    buf.extend_from_slice(value.as_bytes());
}
