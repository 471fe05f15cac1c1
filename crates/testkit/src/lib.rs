#![warn(missing_docs)]
//! Deterministic testing surfaces: event streams and golden snapshots.

mod snapshot;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use voxsim_core::SimTick;

pub use snapshot::*;

/// One simulation event captured by headless runs and worldtests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Simulation tick when the event occurred.
    pub tick: SimTick,
    /// Short kind label, e.g. `"step"` or `"path"`.
    pub kind: String,
    /// Structured payload.
    pub payload: Value,
}

impl EventRecord {
    /// Build a record from any serializable payload.
    pub fn new<T: Serialize>(tick: SimTick, kind: &str, payload: &T) -> Result<Self> {
        Ok(Self {
            tick,
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).context("Failed to serialize event payload")?,
        })
    }
}

/// A sink that writes newline-delimited JSON to disk.
pub struct JsonlSink {
    out: BufWriter<File>,
    written: usize,
}

impl JsonlSink {
    /// Create a new sink at `path`, creating parent directories if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create event log {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
            written: 0,
        })
    }

    /// Append an event to the log.
    pub fn write(&mut self, event: &EventRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Number of events written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered events to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// In-memory event stream, used to compare two runs of the same scenario.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventLog {
    events: Vec<EventRecord>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    pub fn record<T: Serialize>(&mut self, tick: SimTick, kind: &str, payload: &T) -> Result<()> {
        self.events.push(EventRecord::new(tick, kind, payload)?);
        Ok(())
    }

    /// Recorded events in insertion order.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Render the log as JSON lines.
    pub fn to_jsonl(&self) -> Result<String> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
