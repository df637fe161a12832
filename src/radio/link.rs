//! Byte links to the radio bridge.
//!
//! The bridge is reached over one of two transports, selected by the
//! radio spec string:
//!
//! - `tty:<path>`: raw serial at 19200 baud.
//! - `usb:<path>`: the same serial line wrapped in a hex-ASCII codec:
//!   every byte travels as two hex digits in each direction.
//!
//! [`Link`] is the seam between transports and the [`Radio`] channel;
//! tests substitute scripted implementations for it.
//!
//! [`Radio`]: crate::radio::Radio

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::constants::SERIAL_BAUD;
use crate::error::PumpError;
use crate::util::hex::{decode_hex, encode_hex};

/// A full-duplex byte channel to the radio bridge.
#[async_trait]
pub trait Link: Send {
    /// Write the whole buffer.
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Read exactly `buf.len()` bytes.
    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

/// Raw serial link (`tty:` flavor).
pub struct SerialLink {
    port: SerialStream,
}

impl SerialLink {
    /// Open `path` at 19200 baud, 8N1, raw.
    pub fn open(path: &str) -> Result<SerialLink, PumpError> {
        let port = tokio_serial::new(path, SERIAL_BAUD)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .open_native_async()
            .map_err(|e| PumpError::SerialPort(e.to_string()))?;
        Ok(SerialLink { port })
    }
}

#[async_trait]
impl Link for SerialLink {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf).await?;
        self.port.flush().await
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.port.read_exact(buf).await.map(|_| ())
    }
}

/// Hex-ASCII codec over an inner link (`usb:` flavor). Each 8-bit byte
/// is transmitted as two hex digits; reads are decoded symmetrically.
pub struct HexLink<L> {
    inner: L,
}

impl<L: Link> HexLink<L> {
    pub fn new(inner: L) -> HexLink<L> {
        HexLink { inner }
    }
}

#[async_trait]
impl<L: Link> Link for HexLink<L> {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(encode_hex(buf).as_bytes()).await
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut raw = vec![0u8; buf.len() * 2];
        self.inner.read_exact(&mut raw).await?;
        let text = std::str::from_utf8(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let decoded =
            decode_hex(text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        buf.copy_from_slice(&decoded);
        Ok(())
    }
}
