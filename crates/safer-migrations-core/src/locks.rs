// crates/safer-migrations-core/src/locks.rs
// ============================================================================
// Module: Lock Contention Diagnostics
// Description: Lock-queue snapshot rows and the operator-facing reporter.
// Purpose: Explain a lock-timeout failure before it propagates.
// Dependencies: crate::output, crate::session
// ============================================================================

//! ## Overview
//! When a migration step fails waiting on a lock, the operator needs to know
//! who held it. [`LockContentionReporter`] reads the lock queue on the same
//! connection, prints it oldest-first, and hands the rows back for callers
//! that want to assert on them. The report is advisory: any error while
//! producing it is printed and dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::output::MigrationOutput;
use crate::session::SessionConnection;
use crate::session::SessionError;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One held or awaited lock, annotated with the owning session's query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshotRow {
    /// Backend process id of the session.
    pub pid: i32,
    /// Locked relation, when the lock targets one that can be resolved.
    pub relation: Option<String>,
    /// Query text of the session.
    pub query: Option<String>,
    /// Lock mode (for example `AccessExclusiveLock`).
    pub mode: String,
    /// True when the lock is held, false when it is being waited for.
    pub granted: bool,
    /// Time since the session's query started.
    pub age: Duration,
}

impl LockSnapshotRow {
    /// Returns `granted` or `waiting`.
    #[must_use]
    pub const fn state_label(&self) -> &'static str {
        if self.granted { "granted" } else { "waiting" }
    }
}

impl fmt::Display for LockSnapshotRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}, {} {}, age={}, pid={}",
            self.relation.as_deref().unwrap_or("(none)"),
            self.mode,
            self.state_label(),
            format_age(self.age),
            self.pid
        )?;
        match &self.query {
            Some(query) => write!(f, "  query: \"{}\"", query.escape_debug()),
            None => write!(f, "  query: (none)"),
        }
    }
}

/// Formats a duration as `HH:MM:SS.mmm`, hours unbounded.
#[must_use]
pub fn format_age(age: Duration) -> String {
    let total_ms = age.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

// ============================================================================
// SECTION: Reporter
// ============================================================================

/// Captures and prints the lock queue of a connection.
#[derive(Clone)]
pub struct LockContentionReporter {
    /// Operator output for the printed report.
    output: Arc<dyn MigrationOutput>,
}

impl LockContentionReporter {
    /// Creates a reporter writing to `output`.
    #[must_use]
    pub fn new(output: Arc<dyn MigrationOutput>) -> Self {
        Self {
            output,
        }
    }

    /// Reads the lock queue, oldest query first.
    ///
    /// Rows with equal age keep the order the connection returned them in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the lock query fails.
    pub fn capture<C: SessionConnection + ?Sized>(
        &self,
        connection: &mut C,
    ) -> Result<Vec<LockSnapshotRow>, SessionError> {
        let mut rows = connection.lock_snapshot()?;
        rows.sort_by(|left, right| right.age.cmp(&left.age));
        Ok(rows)
    }

    /// Prints a lock-queue report for `failure` and returns the rows.
    ///
    /// The failed transaction is rolled back first so the diagnostic query can
    /// run. Errors are printed as a secondary notice and yield `None`; they
    /// never replace `failure`.
    pub fn report<C: SessionConnection + ?Sized>(
        &self,
        connection: &mut C,
        failure: &(dyn Error + 'static),
    ) -> Option<Vec<LockSnapshotRow>> {
        match self.try_report(connection, failure) {
            Ok(rows) => Some(rows),
            Err(err) => {
                self.output.say(&format!("Failed to capture lock report: {err}"));
                None
            }
        }
    }

    /// Fallible body of [`Self::report`].
    fn try_report<C: SessionConnection + ?Sized>(
        &self,
        connection: &mut C,
        failure: &(dyn Error + 'static),
    ) -> Result<Vec<LockSnapshotRow>, SessionError> {
        connection.abort_transaction()?;
        self.output.write_line("");
        self.output.say(&connection.describe_failure(failure));
        self.output.say("Current state of lock queue:");
        let rows = self.capture(connection)?;
        for row in &rows {
            for line in row.to_string().lines() {
                self.output.say(line);
            }
        }
        self.output.write_line("");
        Ok(rows)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
