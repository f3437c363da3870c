use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};

/// Append-only log of ids whose artwork could not be resolved.
/// Each line is `[<timestamp>] <message>`.
#[derive(Debug, Clone)]
pub struct MissingImageLog {
    path: PathBuf,
}

impl MissingImageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let ts = Local::now().to_rfc3339_opts(SecondsFormat::Micros, false);
        writeln!(file, "[{ts}] {message}")?;
        Ok(())
    }

    /// Like `record`, but a failing log write only produces a warning.
    pub fn record_or_warn(&self, message: &str) {
        if let Err(err) = self.record(message) {
            tracing::warn!(error = %err, entry = message, "failed to append to missing image log");
        }
    }
}
