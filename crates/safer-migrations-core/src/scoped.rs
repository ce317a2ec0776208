// crates/safer-migrations-core/src/scoped.rs
// ============================================================================
// Module: Scoped Session Settings
// Description: RAII application and restoration of a session parameter.
// Purpose: Guarantee a parameter returns to its prior value on every exit path.
// Dependencies: crate::session
// ============================================================================

//! ## Overview
//! [`ScopedSetting::enter`] captures the current value of a parameter and
//! applies a new one; [`ScopedSetting::exit`] (or `Drop`) puts the captured
//! value back, exactly once. The guard dereferences to the connection, so the
//! enclosed work and a nested scope both run through it:
//!
//! ```text
//! let mut lock = ScopedSetting::enter(conn, LockTimeout, Millis(5_000))?;
//! let mut stmt = ScopedSetting::enter(&mut *lock, StatementTimeout, Millis(2_000))?;
//! work(&mut *stmt);
//! stmt.exit()?;
//! lock.exit()?;
//! ```
//!
//! The borrow checker enforces reverse-order restoration: the outer guard
//! cannot be exited while the inner one still borrows it.
//!
//! Precondition: two live scopes must never target the same parameter on the
//! same connection. The inner scope would capture the outer's requested value
//! and the restores would interleave incorrectly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ops::Deref;
use std::ops::DerefMut;

use crate::session::SessionConnection;
use crate::session::SessionError;
use crate::session::SessionParameter;
use crate::session::SettingValue;

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Active application of one session parameter to a borrowed connection.
pub struct ScopedSetting<'c, C: SessionConnection + ?Sized> {
    /// Connection the parameter was applied to.
    connection: &'c mut C,
    /// Parameter under control.
    parameter: SessionParameter,
    /// Value applied on entry.
    requested: SettingValue,
    /// Value captured before entry; restored on exit.
    previous: SettingValue,
    /// Cleared once the restore has been attempted.
    active: bool,
}

impl<'c, C: SessionConnection + ?Sized> ScopedSetting<'c, C> {
    /// Captures the current value of `parameter` and applies `value`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the current value cannot be read or the
    /// new value cannot be applied. No guard exists in that case, so there is
    /// nothing to restore.
    pub fn enter(
        connection: &'c mut C,
        parameter: SessionParameter,
        value: SettingValue,
    ) -> Result<Self, SessionError> {
        let previous = connection.current_setting(parameter)?;
        connection.apply_setting(parameter, value)?;
        Ok(Self {
            connection,
            parameter,
            requested: value,
            previous,
            active: true,
        })
    }

    /// Returns the parameter under control.
    #[must_use]
    pub const fn parameter(&self) -> SessionParameter {
        self.parameter
    }

    /// Returns the value applied on entry.
    #[must_use]
    pub const fn requested(&self) -> SettingValue {
        self.requested
    }

    /// Returns the value that will be restored on exit.
    #[must_use]
    pub const fn previous(&self) -> SettingValue {
        self.previous
    }

    /// Returns true until the restore has run.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Restores the captured value and ends the scope.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the restore cannot be applied.
    pub fn exit(mut self) -> Result<(), SessionError> {
        self.restore()
    }

    /// Runs the restore once; later calls are no-ops.
    fn restore(&mut self) -> Result<(), SessionError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        restore_setting(&mut *self.connection, self.parameter, self.previous)
    }
}

impl<C: SessionConnection + ?Sized> Deref for ScopedSetting<'_, C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.connection
    }
}

impl<C: SessionConnection + ?Sized> DerefMut for ScopedSetting<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
    }
}

impl<C: SessionConnection + ?Sized> Drop for ScopedSetting<'_, C> {
    fn drop(&mut self) {
        // Nothing to report to from a destructor; `exit` surfaces failures.
        let _ = self.restore();
    }
}

/// Applies `previous` back to `parameter`.
///
/// When the connection is stuck in an aborted transaction the restore cannot
/// run inside it, so the transaction is ended first and the restore is issued
/// again outside of it.
fn restore_setting<C: SessionConnection + ?Sized>(
    connection: &mut C,
    parameter: SessionParameter,
    previous: SettingValue,
) -> Result<(), SessionError> {
    match connection.apply_setting(parameter, previous) {
        Err(SessionError::TransactionAborted(_)) => {
            connection.abort_transaction()?;
            connection.apply_setting(parameter, previous)
        }
        other => other,
    }
}

// ============================================================================
// SECTION: Closure Form
// ============================================================================

/// Result of [`with_setting`]: the work's own result and the restore result,
/// kept apart so a restore failure never masks the work's outcome.
#[derive(Debug)]
pub struct ScopedOutcome<T> {
    /// Value returned by the enclosed work.
    pub result: T,
    /// Outcome of restoring the previous value.
    pub restore: Result<(), SessionError>,
}

/// Runs `work` with `parameter = value` applied to `connection`, restoring the
/// previous value afterwards.
///
/// # Errors
///
/// Returns [`SessionError`] only when the scope cannot be entered; `work` has
/// not run in that case.
pub fn with_setting<C, T, F>(
    connection: &mut C,
    parameter: SessionParameter,
    value: SettingValue,
    work: F,
) -> Result<ScopedOutcome<T>, SessionError>
where
    C: SessionConnection + ?Sized,
    F: FnOnce(&mut C) -> T,
{
    let mut scope = ScopedSetting::enter(connection, parameter, value)?;
    let result = work(&mut *scope);
    let restore = scope.exit();
    Ok(ScopedOutcome {
        result,
        restore,
    })
}
