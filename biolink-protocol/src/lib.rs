//! Wire protocol for the biolink control-and-telemetry link
//!
//! Defines the frames exchanged between the supervisory host and the
//! sensor-bearing field node over a single serial byte stream, plus the
//! line framing needed to recover discrete messages from that stream.
//!
//! Frames are newline-terminated ASCII lines: a leading tag (`TEL`, `CMD`,
//! `ACK`, `EVT`) followed by `key=value` pairs. The format is deliberately
//! human-readable so a raw serial console stays useful for debugging.
//!
//! ```
//! use biolink_protocol::{Command, CommandFrame, Frame};
//!
//! let frame = Frame::Command(CommandFrame {
//!     id: 7,
//!     command: Command::Feed { grams: 500.0 },
//! });
//! let line = frame.encode().unwrap();
//! assert_eq!(line.as_str(), "CMD id=7 op=feed val=500");
//! assert_eq!(Frame::decode(&line).unwrap(), frame);
//! ```
//!
//! The crate is `no_std`-capable: frame encoding uses bounded [`heapless`]
//! buffers so the same codec runs on the field node's microcontroller and
//! on the host. The `std` feature (default) additionally enables the
//! [`link`] module with blocking byte-link traits and an in-memory duplex
//! pair for tests.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod framer;

#[cfg(feature = "std")]
pub mod link;

pub use error::ProtocolError;
pub use frame::{
    Ack, AckError, AckOutcome, Command, CommandFrame, CorrelationId, Event, Frame, FrameBuf,
    TelemetrySample, Timestamp,
};
pub use framer::{FramerStats, LineFramer};

#[cfg(feature = "std")]
pub use link::{write_frame, FramedLink, LinkError, LinkRx, LinkTx, MemoryLink, MemoryRx, MemoryTx};

/// Maximum encoded frame length in bytes, terminator excluded.
///
/// Anything longer on the wire is treated as corruption and discarded up
/// to the next terminator.
pub const MAX_FRAME_LEN: usize = 256;
