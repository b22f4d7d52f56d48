//! Append-only record of every issued command
//!
//! Every attempt is recorded, including local rejections, send
//! failures, and timeouts, so an operator can reconstruct what the
//! host tried to do and when. Rows are never rewritten.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;

use biolink_protocol::Command;

#[derive(Serialize)]
struct LogRow<'a> {
    timestamp: String,
    command: &'a str,
    payload: String,
    outcome: &'a str,
}

/// CSV-backed command history.
pub struct CommandLog {
    path: PathBuf,
    writer: csv::Writer<std::fs::File>,
}

impl CommandLog {
    /// Open or create the log at `path`, appending to existing rows.
    pub fn open(path: &Path) -> Result<Self, csv::Error> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let empty = file.seek(SeekFrom::End(0))? == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if empty {
            writer.write_record(["timestamp", "command", "payload", "outcome"])?;
            writer.flush()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    /// Append one attempt. Flushed per row so a crash loses nothing.
    pub fn record(&mut self, command: &Command, outcome: &str) -> Result<(), csv::Error> {
        let row = LogRow {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            command: command.op(),
            payload: command
                .payload()
                .map(|v| v.to_string())
                .unwrap_or_default(),
            outcome,
        };
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Path the log lives at.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
