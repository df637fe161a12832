//! Mock link for testing.
//!
//! Simulates the bridge side of the byte channel without hardware:
//! reads are served from a queued script, writes are captured for
//! assertions, and I/O errors can be injected.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::radio::link::Link;

/// Scripted [`Link`] test double. Clones share the same buffers, so a
/// test can keep one handle while the radio owns another.
#[derive(Clone, Default)]
pub struct MockLink {
    tx: Arc<Mutex<Vec<u8>>>,
    rx: Arc<Mutex<VecDeque<u8>>>,
    next_error: Arc<Mutex<Option<io::Error>>>,
}

impl MockLink {
    pub fn new() -> MockLink {
        MockLink::default()
    }

    /// Queue bytes for the driver to read.
    pub fn queue_rx(&self, data: &[u8]) {
        self.rx.lock().unwrap().extend(data);
    }

    /// Everything the driver has written so far.
    pub fn tx_data(&self) -> Vec<u8> {
        self.tx.lock().unwrap().clone()
    }

    /// Drop captured writes and any unread script.
    pub fn clear(&self) {
        self.tx.lock().unwrap().clear();
        self.rx.lock().unwrap().clear();
    }

    /// Fail the next operation with `error`.
    pub fn set_next_error(&self, error: io::Error) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    fn take_error(&self) -> Option<io::Error> {
        self.next_error.lock().unwrap().take()
    }
}

#[async_trait]
impl Link for MockLink {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        self.tx.lock().unwrap().extend_from_slice(buf);
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        let mut rx = self.rx.lock().unwrap();
        if rx.len() < buf.len() {
            // A real bridge would block; failing fast keeps tests honest.
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mock link out of scripted data",
            ));
        }
        for slot in buf.iter_mut() {
            *slot = rx.pop_front().unwrap();
        }
        Ok(())
    }
}
