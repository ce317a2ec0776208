// crates/safer-migrations-core/src/timeouts.rs
// ============================================================================
// Module: Migration Timeout Declarations
// Description: Per-migration timeout overrides and value resolution.
// Purpose: Reject accidental zero timeouts at declaration time.
// Dependencies: crate::output, crate::session, thiserror
// ============================================================================

//! ## Overview
//! A migration declares optional overrides for the lock timeout and the
//! statement timeout. Zero disables a timeout in the database rather than
//! timing out instantly, so the ordinary setters reject it and only the
//! `disable_*` operations can store it, with a warning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::output::MigrationOutput;
use crate::session::SessionParameter;
use crate::session::SettingValue;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Invalid timeout declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutConfigError {
    /// A zero timeout was declared through the ordinary setter.
    #[error(
        "setting {parameter} to 0 is dangerous - it disables the timeout rather than instantly \
         timing out; if you actually want to disable it (not recommended), use the explicit \
         disable_{parameter} operation"
    )]
    ZeroTimeout {
        /// Parameter the zero was declared for.
        parameter: SessionParameter,
    },
}

// ============================================================================
// SECTION: Declarations
// ============================================================================

/// Timeout overrides attached to one migration, in milliseconds.
///
/// `None` defers to the process-wide default; `Some(0)` disables the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationTimeoutConfig {
    /// Lock timeout override.
    lock_timeout: Option<u64>,
    /// Statement timeout override.
    statement_timeout: Option<u64>,
}

impl MigrationTimeoutConfig {
    /// Creates a config with no overrides.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock_timeout: None,
            statement_timeout: None,
        }
    }

    /// Returns the override for `parameter`.
    #[must_use]
    pub const fn get(&self, parameter: SessionParameter) -> Option<u64> {
        match parameter {
            SessionParameter::LockTimeout => self.lock_timeout,
            SessionParameter::StatementTimeout => self.statement_timeout,
        }
    }

    /// Returns the lock timeout override.
    #[must_use]
    pub const fn lock_timeout(&self) -> Option<u64> {
        self.lock_timeout
    }

    /// Returns the statement timeout override.
    #[must_use]
    pub const fn statement_timeout(&self) -> Option<u64> {
        self.statement_timeout
    }

    /// Declares a positive override for `parameter`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutConfigError::ZeroTimeout`] when `millis` is zero; the
    /// stored value is left untouched.
    pub fn set_timeout(
        &mut self,
        parameter: SessionParameter,
        millis: u64,
    ) -> Result<(), TimeoutConfigError> {
        if millis == 0 {
            return Err(TimeoutConfigError::ZeroTimeout {
                parameter,
            });
        }
        *self.slot_mut(parameter) = Some(millis);
        Ok(())
    }

    /// Disables `parameter` for this migration and warns on `output`.
    pub fn disable_timeout(&mut self, parameter: SessionParameter, output: &dyn MigrationOutput) {
        output.say(&format!(
            "WARNING: disabling the {}. This is very dangerous.",
            parameter.label()
        ));
        *self.slot_mut(parameter) = Some(0);
    }

    /// Declares a positive lock timeout override.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutConfigError::ZeroTimeout`] when `millis` is zero.
    pub fn set_lock_timeout(&mut self, millis: u64) -> Result<(), TimeoutConfigError> {
        self.set_timeout(SessionParameter::LockTimeout, millis)
    }

    /// Declares a positive statement timeout override.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutConfigError::ZeroTimeout`] when `millis` is zero.
    pub fn set_statement_timeout(&mut self, millis: u64) -> Result<(), TimeoutConfigError> {
        self.set_timeout(SessionParameter::StatementTimeout, millis)
    }

    /// Disables the lock timeout for this migration.
    pub fn disable_lock_timeout(&mut self, output: &dyn MigrationOutput) {
        self.disable_timeout(SessionParameter::LockTimeout, output);
    }

    /// Disables the statement timeout for this migration.
    pub fn disable_statement_timeout(&mut self, output: &dyn MigrationOutput) {
        self.disable_timeout(SessionParameter::StatementTimeout, output);
    }

    /// Builder form of [`Self::set_lock_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutConfigError::ZeroTimeout`] when `millis` is zero.
    pub fn with_lock_timeout(mut self, millis: u64) -> Result<Self, TimeoutConfigError> {
        self.set_lock_timeout(millis)?;
        Ok(self)
    }

    /// Builder form of [`Self::set_statement_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutConfigError::ZeroTimeout`] when `millis` is zero.
    pub fn with_statement_timeout(mut self, millis: u64) -> Result<Self, TimeoutConfigError> {
        self.set_statement_timeout(millis)?;
        Ok(self)
    }

    /// Builder form of [`Self::disable_lock_timeout`].
    #[must_use]
    pub fn without_lock_timeout(mut self, output: &dyn MigrationOutput) -> Self {
        self.disable_lock_timeout(output);
        self
    }

    /// Builder form of [`Self::disable_statement_timeout`].
    #[must_use]
    pub fn without_statement_timeout(mut self, output: &dyn MigrationOutput) -> Self {
        self.disable_statement_timeout(output);
        self
    }

    /// Mutable access to the override slot for `parameter`.
    fn slot_mut(&mut self, parameter: SessionParameter) -> &mut Option<u64> {
        match parameter {
            SessionParameter::LockTimeout => &mut self.lock_timeout,
            SessionParameter::StatementTimeout => &mut self.statement_timeout,
        }
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Picks the value to apply: the explicit override when present, otherwise
/// the process-wide default.
#[must_use]
pub const fn resolve(explicit: Option<u64>, default: u64) -> SettingValue {
    match explicit {
        Some(millis) => SettingValue::Millis(millis),
        None => SettingValue::Millis(default),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
