//! Field node for the biolink control-and-telemetry link
//!
//! The field node owns the sensor hardware, the append-only data log, and
//! the aggressive power-saving sleep/wake cycle. It samples on a fixed
//! cadence, executes host commands synchronously, and parks on the
//! physical wake line while in deep sleep — the serial link is unpowered
//! in that state and cannot revive it.
//!
//! Hardware is reached exclusively through the traits in [`ports`], so
//! the whole state machine runs deterministically against test doubles.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod node;
pub mod ports;
pub mod store;

pub use config::FieldConfig;
pub use error::FieldError;
pub use node::{FieldNode, PowerState};
pub use ports::{PeripheralError, Rtc, SensorBank, SensorReadings, WakeLine};
pub use store::DataLog;
