//! Rolling CSV telemetry files.
//!
//! Every control tick appends one row per stream. The files are strictly
//! best-effort: telemetry must never break control, so every I/O failure is
//! reported to the log and swallowed. Writes only happen at all when the
//! `thermal_csv` target is enabled at DEBUG level.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, Level};

/// Default directory for the telemetry files.
pub const CSV_LOG_DIR: &str = "/var/log/thermal_control";
/// Soft size cap per file before trimming, in MiB.
pub const CSV_MAX_FILE_SIZE_MB: u64 = 50;
/// Fraction of the newest lines kept when trimming.
pub const CSV_TRIM_RATIO: f64 = 0.8;

/// Whether CSV telemetry is currently enabled.
///
/// Hosts opt in by enabling the `thermal_csv` target at DEBUG in their
/// tracing subscriber; otherwise [`CsvLogger::log_row`] is a no-op with zero
/// I/O.
pub fn csv_logging_enabled() -> bool {
    tracing::enabled!(target: "thermal_csv", Level::DEBUG)
}

/// An append-only CSV file with a fixed header row and a soft size cap.
#[derive(Debug, Clone)]
pub struct CsvLogger {
    dir: PathBuf,
    filepath: PathBuf,
    headers: Vec<String>,
}

impl CsvLogger {
    /// Creates a logger for `filename` under `dir`. Nothing touches the
    /// filesystem until the first row is written.
    pub fn new(dir: impl Into<PathBuf>, filename: &str, headers: Vec<String>) -> Self {
        let dir = dir.into();
        let filepath = dir.join(filename);
        Self {
            dir,
            filepath,
            headers,
        }
    }

    /// The file this logger appends to.
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Appends one data row, creating the directory and header as needed and
    /// trimming the file when it exceeds the size cap.
    ///
    /// Errors are logged and swallowed.
    pub fn log_row(&self, row: &[String]) {
        if !csv_logging_enabled() {
            return;
        }
        self.write_row(row);
    }

    fn write_row(&self, row: &[String]) {
        if let Err(e) = self.ensure_initialized() {
            error!(
                target: "thermal_csv",
                "failed to initialize CSV file {}: {e:#}",
                self.filepath.display()
            );
        }
        if let Err(e) = self.check_and_trim() {
            error!(
                target: "thermal_csv",
                "failed to trim CSV file {}: {e:#}",
                self.filepath.display()
            );
        }
        if let Err(e) = self.append(row) {
            error!(
                target: "thermal_csv",
                "failed to write CSV row to {}: {e:#}",
                self.filepath.display()
            );
        }
    }

    /// Writes the header iff the file is absent or empty.
    fn ensure_initialized(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating CSV log directory {}", self.dir.display()))?;
        let has_content = self
            .filepath
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !has_content {
            let mut writer = csv::Writer::from_path(&self.filepath)
                .with_context(|| format!("creating {}", self.filepath.display()))?;
            writer.write_record(&self.headers)?;
            writer.flush()?;
        }
        Ok(())
    }

    fn check_and_trim(&self) -> Result<()> {
        let Ok(metadata) = self.filepath.metadata() else {
            return Ok(());
        };
        if metadata.len() < CSV_MAX_FILE_SIZE_MB * 1024 * 1024 {
            return Ok(());
        }
        self.trim()
    }

    /// Rewrites the file keeping the header plus the newest data rows.
    fn trim(&self) -> Result<()> {
        let content = fs::read_to_string(&self.filepath)
            .with_context(|| format!("reading {}", self.filepath.display()))?;
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() <= 1 {
            return Ok(());
        }
        let lines_to_keep = 2.max((lines.len() as f64 * CSV_TRIM_RATIO) as usize);
        let data_lines_to_keep = lines_to_keep - 1;
        let first_kept = lines.len().saturating_sub(data_lines_to_keep).max(1);

        let mut trimmed = String::with_capacity(content.len());
        trimmed.push_str(lines[0]);
        trimmed.push('\n');
        for line in &lines[first_kept..] {
            trimmed.push_str(line);
            trimmed.push('\n');
        }
        fs::write(&self.filepath, trimmed)
            .with_context(|| format!("rewriting {}", self.filepath.display()))?;
        Ok(())
    }

    fn append(&self, row: &[String]) -> Result<()> {
        let file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.filepath)
            .with_context(|| format!("opening {}", self.filepath.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(row)?;
        writer.flush()?;
        Ok(())
    }
}
