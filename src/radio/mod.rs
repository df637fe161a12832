//! # Radio Channel
//!
//! The transport layer of the driver: a request/response channel to the
//! USB/serial radio bridge that owns the RF PHY. The bridge accepts one
//! call at a time and always answers, with the matching reply type or
//! an error reply. Retries and backoff live a layer up, in the session
//! engine; this channel performs exactly one round-trip per invocation.

pub mod link;
pub mod mock;
pub mod rcall;

use log::debug;

use crate::constants::CALLMAX;
use crate::error::{PumpError, Result};
use crate::logging::RADIO_TARGET;
use link::{HexLink, Link, SerialLink};
use rcall::RadioCall;

/// A channel to the radio bridge. Owns the underlying byte link;
/// exclusive use is enforced by `&mut self` receivers.
pub struct Radio {
    link: Box<dyn Link>,
    trace: bool,
}

impl Radio {
    /// Wrap an already-open link. Used by tests and by callers that
    /// open their own transport.
    pub fn new(link: Box<dyn Link>) -> Radio {
        Radio { link, trace: false }
    }

    /// Open the transport named by a radio spec string,
    /// `<tty|usb>:<path>`.
    pub fn dial(spec: &str) -> Result<Radio> {
        let (device, path) = spec.split_once(':').ok_or_else(|| PumpError::InvalidRadioSpec {
            spec: spec.to_string(),
        })?;
        let link: Box<dyn Link> = match device {
            "tty" => Box::new(SerialLink::open(path)?),
            "usb" => Box::new(HexLink::new(SerialLink::open(path)?)),
            _ => {
                return Err(PumpError::InvalidRadioSpec {
                    spec: spec.to_string(),
                })
            }
        };
        Ok(Radio::new(link))
    }

    /// Log each call and reply at debug level.
    pub fn with_trace(mut self, on: bool) -> Radio {
        self.trace = on;
        self
    }

    /// Perform one round-trip: write the request, read the
    /// length-prefixed reply, and validate the reply type.
    pub async fn call(&mut self, req: &RadioCall) -> Result<RadioCall> {
        if self.trace {
            debug!(target: RADIO_TARGET, "radio tx: {req}");
        }

        self.link.write_all(&req.pack()).await?;

        let mut len_buf = [0u8; 1];
        self.link.read_exact(&mut len_buf).await?;
        let len = len_buf[0] as usize;
        if len > CALLMAX || len == 0 {
            return Err(PumpError::InvalidCallLength { len, max: CALLMAX });
        }

        let mut buf = vec![0u8; len];
        buf[0] = len_buf[0];
        self.link.read_exact(&mut buf[1..]).await?;

        let rep = RadioCall::parse(&buf)?;
        if !rep.is_reply_to(req) {
            return Err(PumpError::BadRadioReply {
                sent: req.wire_type(),
                got: rep.wire_type(),
            });
        }

        if self.trace {
            debug!(target: RADIO_TARGET, "radio rx: {rep}");
        }

        Ok(rep)
    }

    /// Reset the bridge radio.
    pub async fn reset(&mut self) -> Result<()> {
        match self.call(&RadioCall::Treset).await? {
            RadioCall::Rerr(err) => Err(PumpError::Radio(err)),
            _ => Ok(()),
        }
    }
}
