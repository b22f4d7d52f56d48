//! Append-only persistent data log
//!
//! Every sample and every feed/recalibration event becomes one CSV row:
//!
//! ```text
//! timestamp,co2,temperature,humidity,pressure,altitude,feed_amount,recalibration
//! 2024-09-13 14:30:00,812.5,24.1,61.2,1008.2,44.6,,
//! 2024-09-13 14:45:00,815.0,24.2,61.0,1008.1,44.6,500,
//! ```
//!
//! The two trailing columns are blank except on the distinguished feed
//! and recalibration rows. Rows are never mutated or deleted, and a
//! write failure here is the one condition the field node treats as
//! fatal.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::Serialize;

use biolink_protocol::{TelemetrySample, Timestamp};

use crate::error::FieldError;

const COLUMNS: [&str; 8] = [
    "timestamp",
    "co2",
    "temperature",
    "humidity",
    "pressure",
    "altitude",
    "feed_amount",
    "recalibration",
];

#[derive(Serialize)]
struct DataRow {
    timestamp: String,
    co2: f32,
    temperature: f32,
    humidity: f32,
    pressure: f32,
    altitude: f32,
    feed_amount: Option<f32>,
    recalibration: Option<f32>,
}

/// Render an RTC timestamp the way the log stores it.
pub fn format_timestamp(epoch_s: Timestamp) -> String {
    match chrono::DateTime::from_timestamp(epoch_s as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch_s.to_string(),
    }
}

/// Append-only CSV log owned exclusively by the field node.
pub struct DataLog {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    last_timestamp: Option<Timestamp>,
}

impl DataLog {
    /// Open (or create) the log at `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FieldError> {
        let mut log = Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            last_timestamp: None,
        };
        log.reopen()?;
        Ok(log)
    }

    /// Reopen after a deep-sleep cycle closed the file.
    pub fn reopen(&mut self) -> Result<(), FieldError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let fresh = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer.write_record(COLUMNS)?;
            writer.flush()?;
        }
        self.writer = Some(writer);
        Ok(())
    }

    /// Append one row and flush it to durable storage.
    pub fn append(&mut self, sample: &TelemetrySample) -> Result<(), FieldError> {
        if let Some(prev) = self.last_timestamp {
            if sample.timestamp < prev {
                // Only a backwards RTC step (e.g. a time sync) can cause
                // this within one run; worth noticing, not clamping.
                log::warn!(
                    "data log timestamp regressed: {} after {}",
                    sample.timestamp,
                    prev
                );
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("data log is closed"))?;
        writer.serialize(DataRow {
            timestamp: format_timestamp(sample.timestamp),
            co2: sample.co2_ppm,
            temperature: sample.temperature_c,
            humidity: sample.humidity_pct,
            pressure: sample.pressure_hpa,
            altitude: sample.altitude_m,
            feed_amount: sample.feed_amount_g,
            recalibration: sample.recalibration_ppm,
        })?;
        writer.flush()?;
        self.last_timestamp = Some(sample.timestamp);
        Ok(())
    }

    /// Flush and close ahead of deep sleep. Appends fail until
    /// [`reopen`](Self::reopen).
    pub fn close(&mut self) -> Result<(), FieldError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
