//! Ingest progress reporting.
//!
//! Reports observable progress during `memedoc ingest` so users see what
//! is being discovered, how many items have settled, and when the batch is
//! being persisted. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

/// A single progress event for an ingest run.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// The source is being asked for items. Total unknown.
    Discovering { source: String },
    /// `n` of `total` items have settled (extracted or failed).
    Processing { source: String, n: u64, total: u64 },
    /// Extracted records are being written to the store.
    Persisting { source: String, records: u64 },
}

/// Receives ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingestion pipeline.
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest memes  processing  12 / 40 items".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovering { source } => {
                format!("ingest {}  discovering...\n", source)
            }
            IngestProgressEvent::Processing { source, n, total } => format!(
                "ingest {}  processing  {} / {} items\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
            IngestProgressEvent::Persisting { source, records } => format!(
                "ingest {}  persisting  {} records\n",
                source,
                format_number(*records)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Discovering { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "discovering"
            }),
            IngestProgressEvent::Processing { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "processing",
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Persisting { source, records } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "persisting",
                "records": records
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
