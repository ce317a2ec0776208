// crates/safer-migrations-core/src/session.rs
// ============================================================================
// Module: Session Interfaces
// Description: Session parameters, values, and the connection contract.
// Purpose: Decouple scoped settings and diagnostics from a concrete driver.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`SessionConnection`] is the only thing the core needs from a database
//! driver: read and write a session parameter, end an aborted transaction,
//! read the lock queue, and classify a failure raised by a migration step.
//! Backends (see `safer-migrations-postgres`) implement it over a live
//! connection; tests implement it in memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::locks::LockSnapshotRow;

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Session parameter controlled by a scoped setting. Values are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionParameter {
    /// Maximum time a statement may wait to acquire a lock.
    LockTimeout,
    /// Maximum time any single statement may run.
    StatementTimeout,
}

impl SessionParameter {
    /// All supported parameters, in the order the executor applies them.
    pub const ALL: [Self; 2] = [Self::LockTimeout, Self::StatementTimeout];

    /// Returns the database parameter name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LockTimeout => "lock_timeout",
            Self::StatementTimeout => "statement_timeout",
        }
    }

    /// Returns the human label used in operator messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LockTimeout => "lock timeout",
            Self::StatementTimeout => "statement timeout",
        }
    }
}

impl fmt::Display for SessionParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Effective session value of a parameter.
///
/// `Unset` means the session carries no override and inherits the configured
/// default. `Millis(0)` is an explicit "timeout disabled" and is never the same
/// thing as `Unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingValue {
    /// No session-level override.
    Unset,
    /// Explicit session value in milliseconds.
    Millis(u64),
}

impl SettingValue {
    /// Returns the explicit millisecond value, if any.
    #[must_use]
    pub const fn millis(self) -> Option<u64> {
        match self {
            Self::Unset => None,
            Self::Millis(value) => Some(value),
        }
    }

    /// Returns true when this value disables the timeout.
    #[must_use]
    pub const fn is_disabled(self) -> bool {
        matches!(self, Self::Millis(0))
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("DEFAULT"),
            Self::Millis(value) => write!(f, "{value}"),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by session operations on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The surrounding transaction is aborted; commands are ignored until it ends.
    #[error("session transaction aborted: {0}")]
    TransactionAborted(String),
    /// Database or driver error.
    #[error("session database error: {0}")]
    Database(String),
    /// The database returned a value the core cannot interpret.
    #[error("session invalid data: {0}")]
    Invalid(String),
}

/// Classification of a migration step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A lock wait exceeded the lock timeout.
    LockTimeout,
    /// A running statement exceeded the statement timeout.
    StatementTimeout,
    /// Any other failure.
    Other,
}

// ============================================================================
// SECTION: Connection Contract
// ============================================================================

/// Connection operations required by scoped settings and lock diagnostics.
///
/// Implementations are used from a single thread for the duration of one
/// migration step; the `&mut self` receivers enforce exclusive access.
pub trait SessionConnection {
    /// Reads the effective session value of `parameter`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the value cannot be read or parsed.
    fn current_setting(
        &mut self,
        parameter: SessionParameter,
    ) -> Result<SettingValue, SessionError>;

    /// Applies `value` to `parameter`; `SettingValue::Unset` resets it to the
    /// configured default.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransactionAborted`] when the connection sits in
    /// an aborted transaction, or another [`SessionError`] on failure.
    fn apply_setting(
        &mut self,
        parameter: SessionParameter,
        value: SettingValue,
    ) -> Result<(), SessionError>;

    /// Ends the current (aborted) transaction so new commands can run.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the rollback cannot be issued.
    fn abort_transaction(&mut self) -> Result<(), SessionError>;

    /// Reads the current lock holders and waiters, excluding this session and
    /// system relations.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the lock query fails.
    fn lock_snapshot(&mut self) -> Result<Vec<LockSnapshotRow>, SessionError>;

    /// Classifies a failure raised by a migration step run on this connection.
    fn classify_failure(&self, failure: &(dyn Error + 'static)) -> FailureKind;

    /// Describes the low-level error behind a failure for operator output.
    ///
    /// The default walks to the innermost `source()`.
    fn describe_failure(&self, failure: &(dyn Error + 'static)) -> String {
        let mut current = failure;
        while let Some(next) = current.source() {
            current = next;
        }
        current.to_string()
    }
}

impl<C: SessionConnection + ?Sized> SessionConnection for &mut C {
    fn current_setting(
        &mut self,
        parameter: SessionParameter,
    ) -> Result<SettingValue, SessionError> {
        (**self).current_setting(parameter)
    }

    fn apply_setting(
        &mut self,
        parameter: SessionParameter,
        value: SettingValue,
    ) -> Result<(), SessionError> {
        (**self).apply_setting(parameter, value)
    }

    fn abort_transaction(&mut self) -> Result<(), SessionError> {
        (**self).abort_transaction()
    }

    fn lock_snapshot(&mut self) -> Result<Vec<LockSnapshotRow>, SessionError> {
        (**self).lock_snapshot()
    }

    fn classify_failure(&self, failure: &(dyn Error + 'static)) -> FailureKind {
        (**self).classify_failure(failure)
    }

    fn describe_failure(&self, failure: &(dyn Error + 'static)) -> String {
        (**self).describe_failure(failure)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
