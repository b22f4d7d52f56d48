//! Blocking byte-link abstraction and framed combinator
//!
//! The two nodes exchange frames over whatever byte pipe connects them:
//! a real serial port in deployment, process stdio for the simulator, or
//! an in-memory duplex pair in tests. [`LinkTx`] and [`LinkRx`] are the
//! seams; [`FramedLink`] layers the [`LineFramer`] and frame codec on a
//! receive half, and [`write_frame`] terminates and sends an encoded
//! frame on a transmit half.
//!
//! Lines that fail to decode are logged and dropped here — corruption on
//! the wire must never crash a receiver or surface as a frame.

use std::time::Duration;
use std::vec::Vec;

use thiserror_no_std::Error;

use crate::frame::Frame;
use crate::framer::{FramerStats, LineFramer};
use crate::ProtocolError;

/// Errors surfaced by a byte link.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Peer went away; reads and writes will never succeed again.
    #[error("link closed")]
    Closed,

    /// Underlying transport failure.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded for transmission.
    #[error("frame encoding failed: {0}")]
    Encode(ProtocolError),
}

/// Transmit half of a byte link.
pub trait LinkTx: Send {
    /// Write the whole buffer, blocking as needed.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Receive half of a byte link.
pub trait LinkRx: Send {
    /// Read available bytes into `buf`, waiting up to `timeout`.
    ///
    /// Returns `Ok(0)` when the timeout elapses with nothing to read.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError>;
}

/// Encode `frame`, terminate it, and send it on `tx`.
pub fn write_frame(tx: &mut dyn LinkTx, frame: &Frame) -> Result<(), LinkError> {
    let line = frame.encode().map_err(LinkError::Encode)?;
    tx.write_all(line.as_bytes())?;
    tx.write_all(b"\n")
}

/// A receive half with framing and decoding layered on top.
pub struct FramedLink<R: LinkRx> {
    rx: R,
    framer: LineFramer,
    decode_errors: u32,
}

impl<R: LinkRx> FramedLink<R> {
    /// Wrap a receive half.
    pub fn new(rx: R) -> Self {
        Self {
            rx,
            framer: LineFramer::new(),
            decode_errors: 0,
        }
    }

    /// Perform one read with the given timeout and return every frame it
    /// completed. An empty vec means the timeout elapsed quietly.
    ///
    /// Undecodable lines are logged at warn level and dropped.
    pub fn poll(&mut self, timeout: Duration) -> Result<Vec<Frame>, LinkError> {
        let mut chunk = [0u8; 256];
        let n = self.rx.read(&mut chunk, timeout)?;
        let mut frames = Vec::new();
        let decode_errors = &mut self.decode_errors;
        self.framer.push(&chunk[..n], |line| match Frame::decode(line) {
            Ok(frame) => frames.push(frame),
            Err(e) => {
                *decode_errors += 1;
                log::warn!("dropping corrupt frame ({e}): {line:?}");
            }
        });
        Ok(frames)
    }

    /// Framing-level counters.
    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// Lines framed correctly but rejected by the frame codec.
    pub fn decode_errors(&self) -> u32 {
        self.decode_errors
    }
}

/// One endpoint of an in-memory duplex link.
///
/// Test double for the serial port, in the same spirit as a fixed test
/// clock: both node loops can run against it unmodified while a test
/// drives the other end programmatically.
pub struct MemoryLink {
    /// Transmit half.
    pub tx: MemoryTx,
    /// Receive half.
    pub rx: MemoryRx,
}

impl MemoryLink {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = std::sync::mpsc::channel();
        let (b_tx, a_rx) = std::sync::mpsc::channel();
        (
            MemoryLink {
                tx: MemoryTx(a_tx),
                rx: MemoryRx {
                    chan: a_rx,
                    pending: Vec::new(),
                },
            },
            MemoryLink {
                tx: MemoryTx(b_tx),
                rx: MemoryRx {
                    chan: b_rx,
                    pending: Vec::new(),
                },
            },
        )
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (MemoryTx, MemoryRx) {
        (self.tx, self.rx)
    }
}

/// Transmit half of a [`MemoryLink`]. Clones feed the same receiver,
/// so several writers can share one simulated wire.
#[derive(Clone)]
pub struct MemoryTx(std::sync::mpsc::Sender<Vec<u8>>);

impl LinkTx for MemoryTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.0.send(bytes.to_vec()).map_err(|_| LinkError::Closed)
    }
}

/// Receive half of a [`MemoryLink`].
pub struct MemoryRx {
    chan: std::sync::mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl LinkRx for MemoryRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        use std::sync::mpsc::RecvTimeoutError;

        if self.pending.is_empty() {
            match self.chan.recv_timeout(timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(LinkError::Closed),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
