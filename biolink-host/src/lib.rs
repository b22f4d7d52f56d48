//! Host node for the biolink control-and-telemetry link
//!
//! The host supervises a single field node over a serial line: it
//! issues commands and matches their acknowledgements, ingests
//! unsolicited telemetry, evaluates CO2 alerts with hysteresis, keeps
//! the field RTC synced to wall-clock time, and drives the physical
//! wake line that is the only way out of the node's deep sleep.
//!
//! Three concerns run concurrently without blocking one another: a
//! reader thread feeding the inbound frame queue, timed tasks (time
//! sync), and the operator prompt. The [`dispatch::Dispatcher`] is the
//! shared hub they all issue commands through.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod alert;
pub mod command_log;
pub mod credentials;
pub mod dispatch;
pub mod notify;
pub mod router;
pub mod serial;
pub mod timesync;
pub mod wake;

pub use alert::{Alert, AlertEngine};
pub use command_log::CommandLog;
pub use credentials::Credentials;
pub use dispatch::{DispatchError, Dispatcher, DEFAULT_ACK_TIMEOUT};
pub use notify::{LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use router::{spawn_reader, Router};
pub use wake::{MarkerFilePin, SysfsGpioPin, WakeController, WakePin};
