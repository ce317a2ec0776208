// crates/safer-migrations-core/src/output.rs
// ============================================================================
// Module: Operator Output
// Description: Line sinks for migration output with timestamped messages.
// Purpose: Route operator-facing lines without a hard logging dependency.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Everything the core prints goes through a [`MigrationOutput`] sink.
//! [`MigrationOutput::say`] prefixes each message with a local wall-clock
//! timestamp in the form `YYYY-MM-DD HH:MM:SS.mmm`; `write_line` writes text
//! as-is. Deployments pick stdout, stderr, or an append-only file; tests use
//! [`MemoryOutput`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::PoisonError;

use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::formatting::Formattable;
use time::macros::format_description;

// ============================================================================
// SECTION: Timestamps
// ============================================================================

/// Timestamp layout used for operator messages.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

/// Formats `at` as `YYYY-MM-DD HH:MM:SS.mmm`.
#[must_use]
pub fn format_timestamp(at: OffsetDateTime) -> String {
    format_or_fallback(at, TIMESTAMP_FORMAT)
}

/// Formats `at` with `format`, falling back to UTC RFC 3339 and then to Unix
/// seconds so a message never loses its timestamp.
fn format_or_fallback(at: OffsetDateTime, format: &(impl Formattable + ?Sized)) -> String {
    at.format(format)
        .or_else(|_| at.to_offset(UtcOffset::UTC).format(&Rfc3339))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Returns the current local time formatted for operator messages.
///
/// Falls back to UTC when the local offset cannot be determined.
#[must_use]
pub fn timestamp_now() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_timestamp(now)
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for operator-facing migration output.
pub trait MigrationOutput: Send + Sync {
    /// Writes one line verbatim.
    fn write_line(&self, line: &str);

    /// Writes `message` prefixed with the current timestamp.
    fn say(&self, message: &str) {
        self.write_line(&format!("{}: {message}", timestamp_now()));
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Writes lines to stdout.
pub struct StdoutOutput;

impl MigrationOutput for StdoutOutput {
    fn write_line(&self, line: &str) {
        let _ = writeln!(io::stdout().lock(), "{line}");
    }
}

/// Writes lines to stderr.
pub struct StderrOutput;

impl MigrationOutput for StderrOutput {
    fn write_line(&self, line: &str) {
        let _ = writeln!(io::stderr().lock(), "{line}");
    }
}

/// Appends lines to a file.
pub struct FileOutput {
    /// File handle used for append-only output.
    file: Mutex<File>,
}

impl FileOutput {
    /// Opens `path` in append mode, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl MigrationOutput for FileOutput {
    fn write_line(&self, line: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Discards every line.
pub struct NoopOutput;

impl MigrationOutput for NoopOutput {
    fn write_line(&self, _line: &str) {}
}

/// Keeps lines in memory.
#[derive(Default)]
pub struct MemoryOutput {
    /// Captured lines in write order.
    lines: Mutex<Vec<String>>,
}

impl MemoryOutput {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns true when any captured line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl MigrationOutput for MemoryOutput {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(line.to_string());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
