//! Scripted pump simulator for session-level tests.
//!
//! `SimPump` plays both the radio bridge and the pump behind it: it
//! parses the radio calls the driver writes, records every pump frame
//! it receives, and queues back replies with correctly complemented
//! tags and valid checksums. Tests configure status bodies, keepalive
//! storms, timeout runs, and delivery progress through the shared
//! state handle.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pumprf_rs::constants::{
    CALL_BOLUS, CALL_CANCEL_COMBO, CALL_DELIVERY_STATUS, CALL_KEEPALIVE, CALL_STATUS,
    CALL_STATUS2, CALL_STATUS3, CALL_STATUS4, CALL_WAKEUP, NPKT,
};
use pumprf_rs::pump::codec::{put_duration_hm, put_pump_time};
use pumprf_rs::pump::frame::Frame;
use pumprf_rs::pump::message::PumpTime;
use pumprf_rs::radio::link::Link;
use pumprf_rs::radio::rcall::{RadioCall, RadioErr};
use pumprf_rs::util::codec::{put_u16_le, put_u32_le};
use pumprf_rs::util::hex::hex_to_bytes;

/// Shared simulator state. Tests hold one handle while the driver's
/// radio owns the other.
pub struct SimState {
    /// Every pump frame received, in order.
    pub frames: Vec<Frame>,
    /// Keepalive backoffs (ms) to interpose before the next settled reply.
    pub keepalives: VecDeque<u16>,
    /// Timeout error replies to issue before answering at all.
    pub timeouts: u32,
    /// Delivery progress codes reported by successive DeliveryStatus calls.
    pub delivery: VecDeque<u8>,
    /// Status page bodies.
    pub status_body: Vec<u8>,
    pub status2_body: Vec<u8>,
    pub status3_body: Vec<u8>,
    pub status4_body: Vec<u8>,
    /// XOR applied to reply tags; 0xff unless a test corrupts it.
    pub reply_tag_xor: u8,
    /// Add 50 mU to the bolus echo, to provoke a mismatch.
    pub corrupt_bolus_echo: bool,
    /// The last accepted bolus as (milliunits, sixths-of-duration).
    pub bolus: Option<(u16, u8)>,
    last_request: u8,
    last_request_body: Vec<u8>,
    out: VecDeque<u8>,
}

impl Default for SimState {
    fn default() -> Self {
        SimState {
            frames: Vec::new(),
            keepalives: VecDeque::new(),
            timeouts: 0,
            delivery: VecDeque::new(),
            status_body: hex_to_bytes("0103000059040e0300000000fa0008000000000000000400"),
            status2_body: hex_to_bytes("01290100fa0059051209a0860100b88818003b0400000700"),
            status3_body: hex_to_bytes("0164e107fa00000099030000"),
            status4_body: hex_to_bytes("0102590516211625d200e80300000000"),
            reply_tag_xor: 0xff,
            corrupt_bolus_echo: false,
            bolus: None,
            last_request: 0,
            last_request_body: Vec::new(),
            out: VecDeque::new(),
        }
    }
}

impl SimState {
    /// Call codes received so far.
    pub fn calls(&self) -> Vec<u8> {
        self.frames.iter().map(|f| f.call).collect()
    }

    /// Tags received so far.
    pub fn tags(&self) -> Vec<u8> {
        self.frames.iter().map(|f| f.tag).collect()
    }
}

#[derive(Clone, Default)]
pub struct SimPump(pub Arc<Mutex<SimState>>);

impl SimPump {
    pub fn new() -> SimPump {
        SimPump::default()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.0.lock().unwrap()
    }

    fn respond(state: &mut SimState, call: &RadioCall) {
        match call {
            RadioCall::Ttx { pkt, .. } => {
                // Fire-and-forget transmit; the bridge still acks it.
                let frame = Frame::parse(pkt).expect("sim received invalid frame");
                state.frames.push(frame);
                state.out.extend(RadioCall::Rtx.pack());
            }
            RadioCall::Ttxrx { pkt, .. } => {
                let frame = Frame::parse(pkt).expect("sim received invalid frame");
                let tag = frame.tag;
                state.frames.push(frame.clone());

                if state.timeouts > 0 {
                    state.timeouts -= 1;
                    state
                        .out
                        .extend(RadioCall::Rerr(RadioErr::Timeout).pack());
                    return;
                }

                if frame.call != CALL_KEEPALIVE {
                    state.last_request = frame.call;
                    state.last_request_body = frame.body.clone();
                }

                let reply = if let Some(backoff) = state.keepalives.pop_front() {
                    let mut body = Vec::new();
                    put_u16_le(&mut body, backoff);
                    Frame {
                        call: CALL_KEEPALIVE,
                        tag: tag ^ state.reply_tag_xor,
                        body,
                    }
                } else {
                    Frame {
                        call: state.last_request,
                        tag: tag ^ state.reply_tag_xor,
                        body: Self::settled_body(state),
                    }
                };

                let bytes = reply.pack().expect("sim built invalid frame");
                let mut pkt = [0u8; NPKT];
                pkt[..bytes.len()].copy_from_slice(&bytes);
                state.out.extend(RadioCall::Rtxrx { pkt }.pack());
            }
            other => panic!("sim received unexpected radio call {other}"),
        }
    }

    fn settled_body(state: &mut SimState) -> Vec<u8> {
        match state.last_request {
            CALL_WAKEUP | CALL_CANCEL_COMBO => Vec::new(),
            CALL_STATUS => state.status_body.clone(),
            CALL_STATUS2 => state.status2_body.clone(),
            CALL_STATUS3 => state.status3_body.clone(),
            CALL_STATUS4 => state.status4_body.clone(),
            CALL_DELIVERY_STATUS => {
                vec![0x00, state.delivery.pop_front().unwrap_or(0x02)]
            }
            CALL_BOLUS => {
                let mut echo = state.last_request_body.clone();
                let milliunits = u16::from_le_bytes([echo[2], echo[3]]);
                let sixths = echo[6];
                state.bolus = Some((milliunits, sixths));

                // A programmed combo shows up on the combo status page.
                state.status4_body = status4_body(
                    true,
                    PumpTime::from_ymd_hm(2016, 6, 5, 12, 0).unwrap(),
                    Duration::from_secs(u64::from(sixths) * 6 * 60),
                    0,
                    milliunits,
                );

                if state.corrupt_bolus_echo {
                    let bad = milliunits + 50;
                    echo[2..4].copy_from_slice(&bad.to_le_bytes());
                    echo[4..6].copy_from_slice(&(!bad).to_le_bytes());
                }
                echo
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Link for SimPump {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let call = RadioCall::parse(buf).expect("sim received invalid radio call");
        Self::respond(&mut self.state(), &call);
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut state = self.state();
        if state.out.len() < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "sim has no reply pending",
            ));
        }
        for slot in buf.iter_mut() {
            *slot = state.out.pop_front().unwrap();
        }
        Ok(())
    }
}

/// Build a home-screen status body.
pub fn status_body(
    warn: bool,
    now: PumpTime,
    basal_milliunits: u16,
    reservoir_units: u8,
    temp: Option<(i8, Duration, Duration)>,
) -> Vec<u8> {
    let mut body = vec![if warn { 0x11 } else { 0x01 }, 0, 0, 0];
    put_pump_time(&mut body, now);
    body.extend_from_slice(&[0, 0, 0, 0]);
    put_u16_le(&mut body, basal_milliunits);
    body.push(reservoir_units);
    body.extend_from_slice(&[0, 0]);
    match temp {
        Some((percent, remaining, duration)) => {
            body.push(0x01);
            body.push(percent as u8);
            body.push(0);
            put_duration_hm(&mut body, remaining);
            put_duration_hm(&mut body, duration);
        }
        None => {
            body.push(0x00);
            body.extend_from_slice(&[0, 0, 0, 0, 0]);
        }
    }
    body
}

/// Build a combo status body; the end is encoded as an hour/minute pair
/// derived from `start + running`.
pub fn status4_body(
    active: bool,
    start: PumpTime,
    running: Duration,
    delivered_milliunits: u16,
    total_milliunits: u16,
) -> Vec<u8> {
    use chrono::Timelike;

    let end = start + running;
    let mut body = vec![0x01, u8::from(active)];
    put_pump_time(&mut body, start);
    body.push(end.naive().hour() as u8);
    body.push(end.naive().minute() as u8);
    put_u16_le(&mut body, delivered_milliunits);
    put_u16_le(&mut body, total_milliunits);
    body
}

/// Build a daily-totals status body.
pub fn status3_body(
    temp_active: bool,
    suspend: bool,
    daily_bolus_milliunits: u32,
    daily_basal_milliunits: u32,
) -> Vec<u8> {
    let mut body = vec![0x01, 0x64];
    body.push(u8::from(temp_active) | (u8::from(suspend) << 1));
    body.push(0x07);
    put_u32_le(&mut body, daily_bolus_milliunits);
    put_u32_le(&mut body, daily_basal_milliunits);
    body
}
