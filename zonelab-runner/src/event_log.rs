//! Append-only JSONL event log.
//!
//! One JSON object per line, tagged `"stream": "zone"` or
//! `"stream": "lifecycle"`. Lines are independent, so a partial write only
//! loses its own record; unreadable lines are skipped on read.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use zonelab_core::{LifecycleEvent, SymbolZones, ZoneEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum EventRecord {
    Zone(ZoneEvent),
    Lifecycle(LifecycleEvent),
}

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append records in order. Returns how many were written.
    pub fn append<'a, I>(&self, records: I) -> io::Result<usize>
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);

        let mut written = 0;
        for record in records {
            let json = serde_json::to_string(record)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }

    /// Append one cycle's lifecycle decisions, then its zone events.
    pub fn append_cycle(&self, zones: &SymbolZones) -> io::Result<usize> {
        let records: Vec<EventRecord> = zones
            .lifecycle_events
            .iter()
            .cloned()
            .map(EventRecord::Lifecycle)
            .chain(zones.events.iter().cloned().map(EventRecord::Zone))
            .collect();
        if records.is_empty() {
            return Ok(0);
        }
        self.append(&records)
    }

    pub fn read_all(&self) -> io::Result<Vec<EventRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping malformed event line");
                }
            }
        }
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
