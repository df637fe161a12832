//! # Session Engine
//!
//! Session management over the radio channel: tag allocation from the
//! fixed sequence, per-call-type timing profiles, timeout retries, the
//! keepalive backoff sub-protocol, and reply validation.
//!
//! The pump runs a tag counter in lockstep with the driver. Tags are
//! consumed on every transmit attempt whether or not it succeeds; a
//! timeout retry reuses its tag (the pump never saw it), but a
//! keepalive re-poll draws a fresh one. Orchestrations that need more
//! tags than the table holds must split their work across sessions.

use std::time::Duration;

use log::debug;
use tokio::time::sleep;

use crate::constants::{
    CALL_ADJOURN, CALL_KEEPALIVE, CALL_TIMEOUT, CALL_TRIES, CALL_WAKEUP, KEEPALIVE_QUIRK_BACKOFF,
    KEEPALIVE_QUIRK_SLEEP, KEEPALIVE_TRIES, NPKT, TAG_SEQUENCE, WAKEUP_PREAMBLE, WAKEUP_TIMEOUT,
    WAKEUP_TRIES,
};
use crate::error::{PumpError, Result};
use crate::logging::FRAME_TARGET;
use crate::pump::frame::Frame;
use crate::pump::message::{Keepalive, Reply, Request, Wakeup};
use crate::radio::rcall::{Packet, RadioCall, RadioErr};
use crate::radio::Radio;

/// A session-capable handle to the pump. Owns the radio channel; one
/// logical caller at a time (`&mut self` everywhere).
pub struct Pump {
    radio: Radio,
    tag_index: usize,
    trace_frames: bool,
}

impl Pump {
    pub fn new(radio: Radio) -> Pump {
        Pump {
            radio,
            tag_index: 0,
            trace_frames: false,
        }
    }

    /// Open the radio named by `spec` (`<tty|usb>:<path>`) and wrap it.
    pub fn dial(spec: &str) -> Result<Pump> {
        Ok(Pump::new(Radio::dial(spec)?))
    }

    /// Log each frame sent and received at debug level.
    pub fn with_frame_trace(mut self, on: bool) -> Pump {
        self.trace_frames = on;
        self
    }

    fn next_tag(&mut self) -> Result<u8> {
        let tag = *TAG_SEQUENCE
            .get(self.tag_index)
            .ok_or(PumpError::TagsExhausted)?;
        self.tag_index += 1;
        Ok(tag)
    }

    /// Open a session: rewind the tag sequence and wake the pump.
    pub async fn resume(&mut self) -> Result<()> {
        self.tag_index = 0;
        let body = Wakeup.pack()?;
        self.call(CALL_WAKEUP, &body).await.map(drop)
    }

    /// Close the session. Fire-and-forget; the pump does not reply.
    pub async fn adjourn(&mut self) -> Result<()> {
        self.call(CALL_ADJOURN, &[]).await.map(drop)
    }

    /// Session boundary between sub-sequences of one orchestration:
    /// adjourn, then resume. The adjourn result is not reported; a pump
    /// that already dropped the session will still take the wakeup.
    pub async fn reset(&mut self) -> Result<()> {
        let _ = self.adjourn().await;
        self.resume().await
    }

    /// Issue one pump call and return the settled reply body.
    ///
    /// Applies the timing profile for `call`, allocates tags, retries
    /// timeouts, and serves any keepalive backoffs the pump interposes
    /// before the real reply arrives. The settled reply must carry the
    /// requested type.
    pub async fn call(&mut self, call: u8, body: &[u8]) -> Result<Vec<u8>> {
        let (preamble, timeout, tries) = if call == CALL_WAKEUP {
            (WAKEUP_PREAMBLE, WAKEUP_TIMEOUT, WAKEUP_TRIES)
        } else {
            (Duration::ZERO, CALL_TIMEOUT, CALL_TRIES)
        };

        let mut tx = Frame {
            call,
            tag: 0,
            body: body.to_vec(),
        };

        if call == CALL_ADJOURN {
            return self.tx(&mut tx).await.map(|()| Vec::new());
        }

        let mut rx = self.txrx(&mut tx, preamble, tries, timeout).await?;

        // The pump's "I'm busy" sub-protocol: honor the backoff, then
        // re-poll with an empty keepalive frame until the real reply
        // settles.
        while rx.call == CALL_KEEPALIVE {
            let keepalive = Keepalive::parse(&rx.body)?;
            let backoff = if keepalive.backoff == KEEPALIVE_QUIRK_BACKOFF {
                // The stock handset waits longer than this particular
                // backoff asks; so must we, or the pump drops us.
                KEEPALIVE_QUIRK_SLEEP
            } else {
                keepalive.backoff
            };
            sleep(backoff).await;

            tx.call = CALL_KEEPALIVE;
            tx.body.clear();
            rx = self
                .txrx(&mut tx, Duration::ZERO, KEEPALIVE_TRIES, 2 * timeout)
                .await?;
        }

        if rx.call != call {
            return Err(PumpError::UnexpectedReplyType {
                requested: call,
                got: rx.call,
            });
        }
        Ok(rx.body)
    }

    /// Transmit `tx` and receive its reply with the given radio
    /// parameters. Only timeouts are retried, and a retry reuses the
    /// tag drawn at entry.
    async fn txrx(
        &mut self,
        tx: &mut Frame,
        preamble: Duration,
        tries: u32,
        timeout: Duration,
    ) -> Result<Frame> {
        tx.tag = self.next_tag()?;
        if self.trace_frames {
            debug!(target: FRAME_TARGET, "tx: {tx}");
        }

        let req = RadioCall::Ttxrx {
            timeout,
            filter: 0,
            preamble,
            pkt: pad_packet(&tx.pack()?),
        };

        let mut tries_left = tries;
        loop {
            match self.radio.call(&req).await? {
                RadioCall::Rerr(RadioErr::Timeout) if tries_left > 0 => {
                    tries_left -= 1;
                }
                RadioCall::Rerr(RadioErr::Timeout) => {
                    return Err(PumpError::RadioTimeout { tries })
                }
                RadioCall::Rerr(err) => return Err(PumpError::Radio(err)),
                RadioCall::Rtxrx { pkt } => {
                    let rx = Frame::parse(&pkt)?;
                    if rx.tag != (tx.tag ^ 0xff) {
                        return Err(PumpError::BadReplyTag {
                            expected: tx.tag ^ 0xff,
                            got: rx.tag,
                        });
                    }
                    if self.trace_frames {
                        debug!(target: FRAME_TARGET, "rx: {rx}");
                    }
                    return Ok(rx);
                }
                other => {
                    return Err(PumpError::BadRadioReply {
                        sent: req.wire_type(),
                        got: other.wire_type(),
                    })
                }
            }
        }
    }

    /// Transmit `frame` with no expected reply.
    async fn tx(&mut self, frame: &mut Frame) -> Result<()> {
        frame.tag = self.next_tag()?;
        if self.trace_frames {
            debug!(target: FRAME_TARGET, "tx (no reply): {frame}");
        }

        let req = RadioCall::Ttx {
            preamble: Duration::ZERO,
            pkt: pad_packet(&frame.pack()?),
        };

        match self.radio.call(&req).await? {
            RadioCall::Rerr(err) => Err(PumpError::Radio(err)),
            _ => Ok(()),
        }
    }
}

/// Zero-pad an encoded frame to the fixed radio packet size. Frames
/// are bounded by [`MAX_BODY`], so they always fit.
///
/// [`MAX_BODY`]: crate::pump::frame::MAX_BODY
fn pad_packet(bytes: &[u8]) -> Packet {
    let mut pkt = [0u8; NPKT];
    pkt[..bytes.len()].copy_from_slice(bytes);
    pkt
}
