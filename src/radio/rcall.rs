//! # Radio Call Codec
//!
//! Wire format of the request/response calls spoken to the USB/serial
//! radio bridge. Every call is length-prefixed, with the length byte
//! counting itself:
//!
//! ```text
//! ┌─────────┬─────────┬─────────┬────────────────────────────┐
//! │ len u8  │ type u8 │ flag u8 │ type-dependent tail        │
//! └─────────┴─────────┴─────────┴────────────────────────────┘
//! ```
//!
//! Tails by type (timeouts and preambles are u16 big-endian
//! milliseconds; `pkt` is a fixed 78-byte packet):
//!
//! | type    | tail                                      |
//! |---------|-------------------------------------------|
//! | `Trx`   | timeout, filter byte                      |
//! | `Ttxrx` | timeout, filter byte, preamble, pkt       |
//! | `Ttx`   | preamble, pkt                             |
//! | `Rrx`, `Rtxrx` | pkt                                |
//! | `Rtx`, `Tping`, `Rping`, `Treset`, `Rreset` | none  |
//! | `Rerr`  | error code                                |
//!
//! A reply's type is the request's type plus one, or `Rerr`.

use std::fmt;
use std::time::Duration;

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, u8 as any_u8};
use nom::IResult;
use thiserror::Error;

use crate::constants::{CALLMAX, NPKT};
use crate::error::PumpError;
use crate::util::codec::{fail, finish};
use crate::util::hex::encode_hex;

// Wire type codes.
const TRX: u8 = 1;
const RRX: u8 = 2;
const TTX: u8 = 3;
const RTX: u8 = 4;
const TTXRX: u8 = 5;
const RTXRX: u8 = 6;
const TPING: u8 = 7;
const RPING: u8 = 8;
const RERR: u8 = 128;
const TRESET: u8 = 0xfe;
const RRESET: u8 = 0xff;

/// Error codes the bridge reports in an `Rerr` reply.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioErr {
    /// Nothing to transmit or deliver.
    #[error("missing packet")]
    Missing,

    /// The bridge rejected the call as malformed.
    #[error("malformed call")]
    BadCall,

    /// No packet arrived within the receive window.
    #[error("receive timeout")]
    Timeout,
}

impl RadioErr {
    pub fn code(self) -> u8 {
        match self {
            RadioErr::Missing => 1,
            RadioErr::BadCall => 2,
            RadioErr::Timeout => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<RadioErr> {
        match code {
            1 => Some(RadioErr::Missing),
            2 => Some(RadioErr::BadCall),
            3 => Some(RadioErr::Timeout),
            _ => None,
        }
    }
}

/// Fixed-size radio packet. Pump frames shorter than this are
/// zero-padded by the sender and the padding is ignored by the parser.
pub type Packet = [u8; NPKT];

/// A low-level radio call, as exchanged with the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    /// Receive with a timeout.
    Trx { timeout: Duration, filter: u8 },
    /// Reply to `Trx`, carrying the received packet.
    Rrx { pkt: Packet },
    /// One-shot transmit with a carrier preamble.
    Ttx { preamble: Duration, pkt: Packet },
    /// Reply to `Ttx`.
    Rtx,
    /// Atomic transmit-then-receive.
    Ttxrx {
        timeout: Duration,
        filter: u8,
        preamble: Duration,
        pkt: Packet,
    },
    /// Reply to `Ttxrx`, carrying the received packet.
    Rtxrx { pkt: Packet },
    /// Liveness probe.
    Tping,
    /// Reply to `Tping`.
    Rping,
    /// Error reply to any call.
    Rerr(RadioErr),
    /// Reset the bridge radio.
    Treset,
    /// Reply to `Treset`.
    Rreset,
}

impl RadioCall {
    /// The wire type code of this call.
    pub fn wire_type(&self) -> u8 {
        match self {
            RadioCall::Trx { .. } => TRX,
            RadioCall::Rrx { .. } => RRX,
            RadioCall::Ttx { .. } => TTX,
            RadioCall::Rtx => RTX,
            RadioCall::Ttxrx { .. } => TTXRX,
            RadioCall::Rtxrx { .. } => RTXRX,
            RadioCall::Tping => TPING,
            RadioCall::Rping => RPING,
            RadioCall::Rerr(_) => RERR,
            RadioCall::Treset => TRESET,
            RadioCall::Rreset => RRESET,
        }
    }

    /// Whether this call is a well-formed reply to `req`.
    pub fn is_reply_to(&self, req: &RadioCall) -> bool {
        matches!(self, RadioCall::Rerr(_)) || self.wire_type() == req.wire_type().wrapping_add(1)
    }

    /// Encode to wire bytes. The length byte is written last by
    /// back-patching position 0.
    pub fn pack(&self) -> Vec<u8> {
        let mut b = vec![0u8, self.wire_type(), 0];
        match self {
            RadioCall::Trx { timeout, filter } => {
                put_ms(&mut b, *timeout);
                b.push(*filter);
            }
            RadioCall::Ttxrx {
                timeout,
                filter,
                preamble,
                pkt,
            } => {
                put_ms(&mut b, *timeout);
                b.push(*filter);
                put_ms(&mut b, *preamble);
                b.extend_from_slice(pkt);
            }
            RadioCall::Ttx { preamble, pkt } => {
                put_ms(&mut b, *preamble);
                b.extend_from_slice(pkt);
            }
            RadioCall::Rrx { pkt } | RadioCall::Rtxrx { pkt } => {
                b.extend_from_slice(pkt);
            }
            RadioCall::Rerr(err) => b.push(err.code()),
            RadioCall::Rtx
            | RadioCall::Tping
            | RadioCall::Rping
            | RadioCall::Treset
            | RadioCall::Rreset => {}
        }
        b[0] = b.len() as u8;
        b
    }

    /// Decode wire bytes. The length byte must match the actual length
    /// and stay within [`CALLMAX`].
    pub fn parse(b: &[u8]) -> Result<RadioCall, PumpError> {
        if b.is_empty() {
            return Err(PumpError::Decode { offset: 0 });
        }
        let len = b[0] as usize;
        if len != b.len() || len > CALLMAX || len < 3 {
            return Err(PumpError::InvalidCallLength { len, max: CALLMAX });
        }

        let typ = b[1];
        // b[2] is the flag byte; always zero from this bridge.
        let tail = &b[3..];
        let parsed = match typ {
            TRX => finish(tail, parse_trx(tail)),
            RRX => finish(tail, parse_pkt_only(tail, |pkt| RadioCall::Rrx { pkt })),
            TTX => finish(tail, parse_ttx(tail)),
            TTXRX => finish(tail, parse_ttxrx(tail)),
            RTXRX => finish(tail, parse_pkt_only(tail, |pkt| RadioCall::Rtxrx { pkt })),
            RERR => finish(tail, parse_rerr(tail)),
            RTX => Ok(RadioCall::Rtx),
            TPING => Ok(RadioCall::Tping),
            RPING => Ok(RadioCall::Rping),
            TRESET => Ok(RadioCall::Treset),
            RRESET => Ok(RadioCall::Rreset),
            _ => return Err(PumpError::InvalidCallType(typ)),
        };

        // Decode offsets are relative to the tail; report them against
        // the whole call.
        parsed.map_err(|err| match err {
            PumpError::Decode { offset } => PumpError::Decode { offset: offset + 3 },
            other => other,
        })
    }
}

fn put_ms(buf: &mut Vec<u8>, d: Duration) {
    let ms = u16::try_from(d.as_millis()).unwrap_or(u16::MAX);
    buf.extend_from_slice(&ms.to_be_bytes());
}

fn duration_ms(i: &[u8]) -> IResult<&[u8], Duration> {
    let (i, ms) = be_u16(i)?;
    Ok((i, Duration::from_millis(u64::from(ms))))
}

fn packet(i: &[u8]) -> IResult<&[u8], Packet> {
    let (i, bytes) = take(NPKT)(i)?;
    let mut pkt = [0u8; NPKT];
    pkt.copy_from_slice(bytes);
    Ok((i, pkt))
}

fn parse_trx(i: &[u8]) -> IResult<&[u8], RadioCall> {
    let (i, timeout) = duration_ms(i)?;
    let (i, filter) = any_u8(i)?;
    Ok((i, RadioCall::Trx { timeout, filter }))
}

fn parse_ttx(i: &[u8]) -> IResult<&[u8], RadioCall> {
    let (i, preamble) = duration_ms(i)?;
    let (i, pkt) = packet(i)?;
    Ok((i, RadioCall::Ttx { preamble, pkt }))
}

fn parse_ttxrx(i: &[u8]) -> IResult<&[u8], RadioCall> {
    let (i, timeout) = duration_ms(i)?;
    let (i, filter) = any_u8(i)?;
    let (i, preamble) = duration_ms(i)?;
    let (i, pkt) = packet(i)?;
    Ok((
        i,
        RadioCall::Ttxrx {
            timeout,
            filter,
            preamble,
            pkt,
        },
    ))
}

fn parse_pkt_only(i: &[u8], build: impl Fn(Packet) -> RadioCall) -> IResult<&[u8], RadioCall> {
    let (i, pkt) = packet(i)?;
    Ok((i, build(pkt)))
}

fn parse_rerr(i: &[u8]) -> IResult<&[u8], RadioCall> {
    let (rest, code) = any_u8(i)?;
    match RadioErr::from_code(code) {
        Some(err) => Ok((rest, RadioCall::Rerr(err))),
        None => fail(i),
    }
}

impl fmt::Display for RadioCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioCall::Trx { timeout, .. } => write!(f, "Trx timeout {timeout:?}"),
            RadioCall::Rrx { pkt } => write!(f, "Rrx pkt {}", encode_hex(pkt)),
            RadioCall::Ttx { preamble, pkt } => {
                write!(f, "Ttx preamble {preamble:?} pkt {}", encode_hex(pkt))
            }
            RadioCall::Rtx => write!(f, "Rtx"),
            RadioCall::Ttxrx {
                timeout, preamble, pkt, ..
            } => write!(
                f,
                "Ttxrx timeout {timeout:?} preamble {preamble:?} pkt {}",
                encode_hex(pkt)
            ),
            RadioCall::Rtxrx { pkt } => write!(f, "Rtxrx pkt {}", encode_hex(pkt)),
            RadioCall::Tping => write!(f, "Tping"),
            RadioCall::Rping => write!(f, "Rping"),
            RadioCall::Rerr(err) => write!(f, "Rerr {err}"),
            RadioCall::Treset => write!(f, "Treset"),
            RadioCall::Rreset => write!(f, "Rreset"),
        }
    }
}
