//! Field node error taxonomy
//!
//! Only storage failure is fatal: without durable logging the node's
//! primary duty cannot be met. Peripheral failures are reported to the
//! host via error acknowledgements and the sampling loop keeps running.

use thiserror::Error;

use biolink_protocol::LinkError;

use crate::ports::PeripheralError;

/// Errors surfaced by the field node.
#[derive(Error, Debug)]
pub enum FieldError {
    /// Data log could not be written or flushed. Fatal.
    #[error("data log failure: {0}")]
    Storage(#[from] csv::Error),

    /// Data log file could not be opened or synced. Fatal.
    #[error("data log I/O failure: {0}")]
    StorageIo(#[from] std::io::Error),

    /// Sensor, RTC, or wake peripheral misbehaved.
    #[error("peripheral failure: {0}")]
    Peripheral(#[from] PeripheralError),

    /// Serial link failed below the framing layer.
    #[error("link failure: {0}")]
    Link(#[from] LinkError),
}
