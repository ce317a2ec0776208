// crates/safer-migrations-core/src/executor.rs
// ============================================================================
// Module: Migration Executor
// Description: Safety envelope around one migration step.
// Purpose: Apply scoped timeouts and report lock contention on failure.
// Dependencies: crate::locks, crate::output, crate::scoped, crate::session,
//               crate::timeouts, thiserror
// ============================================================================

//! ## Overview
//! [`SaferMigrator`] wraps a migration step in two nested scoped settings
//! (lock timeout outside, statement timeout inside). If the step fails on a
//! lock timeout and lock-queue dumps are enabled, the lock queue is printed
//! before the error is returned. Both settings are restored in reverse order
//! whatever the outcome, and the step's own error is always the one returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::locks::LockContentionReporter;
use crate::output::MigrationOutput;
use crate::scoped::ScopedSetting;
use crate::session::FailureKind;
use crate::session::SessionConnection;
use crate::session::SessionError;
use crate::session::SessionParameter;
use crate::timeouts::MigrationTimeoutConfig;
use crate::timeouts::TimeoutConfigError;
use crate::timeouts::resolve;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default lock timeout applied when a migration declares none (ms).
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 750;
/// Default statement timeout applied when a migration declares none (ms).
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 1_500;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Process-wide executor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigratorSettings {
    /// Lock timeout used when a migration has no override (ms).
    default_lock_timeout_ms: u64,
    /// Statement timeout used when a migration has no override (ms).
    default_statement_timeout_ms: u64,
    /// Whether to print the lock queue on lock-timeout failures.
    dump_lock_queue: bool,
}

impl Default for MigratorSettings {
    fn default() -> Self {
        Self {
            default_lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            default_statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
            dump_lock_queue: true,
        }
    }
}

impl MigratorSettings {
    /// Creates settings with explicit defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutConfigError::ZeroTimeout`] when either default is zero;
    /// a process-wide default never disables a timeout.
    pub const fn new(
        default_lock_timeout_ms: u64,
        default_statement_timeout_ms: u64,
        dump_lock_queue: bool,
    ) -> Result<Self, TimeoutConfigError> {
        if default_lock_timeout_ms == 0 {
            return Err(TimeoutConfigError::ZeroTimeout {
                parameter: SessionParameter::LockTimeout,
            });
        }
        if default_statement_timeout_ms == 0 {
            return Err(TimeoutConfigError::ZeroTimeout {
                parameter: SessionParameter::StatementTimeout,
            });
        }
        Ok(Self {
            default_lock_timeout_ms,
            default_statement_timeout_ms,
            dump_lock_queue,
        })
    }

    /// Returns the default for `parameter` (ms).
    #[must_use]
    pub const fn default_for(&self, parameter: SessionParameter) -> u64 {
        match parameter {
            SessionParameter::LockTimeout => self.default_lock_timeout_ms,
            SessionParameter::StatementTimeout => self.default_statement_timeout_ms,
        }
    }

    /// Returns whether lock-queue dumps are enabled.
    #[must_use]
    pub const fn dump_lock_queue(&self) -> bool {
        self.dump_lock_queue
    }

    /// Returns a copy with lock-queue dumps switched on or off.
    #[must_use]
    pub const fn with_dump_lock_queue(mut self, enabled: bool) -> Self {
        self.dump_lock_queue = enabled;
        self
    }
}

// ============================================================================
// SECTION: Migration Contract
// ============================================================================

/// Direction a migration step runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply the migration.
    Up,
    /// Revert the migration.
    Down,
}

/// A migration step runnable on connection type `C`.
pub trait Migration<C: SessionConnection + ?Sized> {
    /// Error raised by the step.
    type Error: Error + 'static;

    /// Timeout overrides; none by default.
    fn timeouts(&self) -> MigrationTimeoutConfig {
        MigrationTimeoutConfig::new()
    }

    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Returns the step's error unchanged.
    fn migrate(&self, connection: &mut C, direction: Direction) -> Result<(), Self::Error>;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure of a guarded migration step.
#[derive(Debug, Error)]
pub enum ExecError<E> {
    /// The step itself failed; the error is the step's own, unchanged.
    #[error(transparent)]
    Migration(E),
    /// A session setting could not be applied or restored.
    #[error("session setting failed: {0}")]
    Setting(#[source] SessionError),
}

impl<E> ExecError<E> {
    /// Returns the step's error, if the step failed.
    #[must_use]
    pub const fn migration_error(&self) -> Option<&E> {
        match self {
            Self::Migration(error) => Some(error),
            Self::Setting(_) => None,
        }
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Runs migration steps inside scoped timeouts.
#[derive(Clone)]
pub struct SaferMigrator {
    /// Process-wide settings.
    settings: MigratorSettings,
    /// Operator output.
    output: Arc<dyn MigrationOutput>,
}

impl SaferMigrator {
    /// Creates an executor.
    #[must_use]
    pub fn new(settings: MigratorSettings, output: Arc<dyn MigrationOutput>) -> Self {
        Self {
            settings,
            output,
        }
    }

    /// Returns the process-wide settings.
    #[must_use]
    pub const fn settings(&self) -> &MigratorSettings {
        &self.settings
    }

    /// Returns the operator output.
    #[must_use]
    pub fn output(&self) -> Arc<dyn MigrationOutput> {
        Arc::clone(&self.output)
    }

    /// Writes a timestamped operator message.
    pub fn say(&self, message: &str) {
        self.output.say(message);
    }

    /// Returns a lock reporter sharing this executor's output.
    #[must_use]
    pub fn reporter(&self) -> LockContentionReporter {
        LockContentionReporter::new(Arc::clone(&self.output))
    }

    /// Runs `migration` in `direction` inside the safety envelope.
    ///
    /// # Errors
    ///
    /// See [`Self::run_guarded`].
    pub fn exec_migration<C, M>(
        &self,
        migration: &M,
        connection: &mut C,
        direction: Direction,
    ) -> Result<(), ExecError<M::Error>>
    where
        C: SessionConnection + ?Sized,
        M: Migration<C> + ?Sized,
    {
        let timeouts = migration.timeouts();
        self.run_guarded(connection, &timeouts, |conn| migration.migrate(conn, direction))
    }

    /// Runs `work` with the resolved lock and statement timeouts applied.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Migration`] with the work's own error when the
    /// work fails, or [`ExecError::Setting`] when a timeout cannot be applied,
    /// or cannot be restored after successful work.
    pub fn run_guarded<C, T, E, F>(
        &self,
        connection: &mut C,
        timeouts: &MigrationTimeoutConfig,
        work: F,
    ) -> Result<T, ExecError<E>>
    where
        C: SessionConnection + ?Sized,
        E: Error + 'static,
        F: FnOnce(&mut C) -> Result<T, E>,
    {
        let lock_value = resolve(
            timeouts.lock_timeout(),
            self.settings.default_for(SessionParameter::LockTimeout),
        );
        let statement_value = resolve(
            timeouts.statement_timeout(),
            self.settings.default_for(SessionParameter::StatementTimeout),
        );

        let mut lock_scope =
            ScopedSetting::enter(connection, SessionParameter::LockTimeout, lock_value)
                .map_err(ExecError::Setting)?;
        // The failed `enter` result must be dropped before `lock_scope` can be
        // exited, so the error is moved out of the match before restoring.
        let mut statement_scope = 'entered: {
            let err;
            match ScopedSetting::enter(
                &mut *lock_scope,
                SessionParameter::StatementTimeout,
                statement_value,
            ) {
                Ok(scope) => break 'entered scope,
                Err(enter_error) => err = enter_error,
            }
            if let Err(restore_error) = lock_scope.exit() {
                self.report_restore_failure(&restore_error);
            }
            return Err(ExecError::Setting(err));
        };

        let result = work(&mut *statement_scope);
        if let Err(failure) = &result {
            self.on_failure(&mut *statement_scope, failure);
        }

        let statement_restore = statement_scope.exit();
        let lock_restore = lock_scope.exit();
        match result {
            Ok(value) => {
                statement_restore.map_err(ExecError::Setting)?;
                lock_restore.map_err(ExecError::Setting)?;
                Ok(value)
            }
            Err(failure) => {
                let restore_errors =
                    [statement_restore, lock_restore].into_iter().filter_map(Result::err);
                for restore_error in restore_errors {
                    self.report_restore_failure(&restore_error);
                }
                Err(ExecError::Migration(failure))
            }
        }
    }

    /// Prints a restore failure that cannot be returned to the caller.
    fn report_restore_failure(&self, err: &SessionError) {
        self.output.say(&format!("Failed to restore session setting: {err}"));
    }

    /// Classifies a failed step and reports lock contention when warranted.
    fn on_failure<C: SessionConnection + ?Sized>(
        &self,
        connection: &mut C,
        failure: &(dyn Error + 'static),
    ) {
        if !self.settings.dump_lock_queue {
            return;
        }
        if connection.classify_failure(failure) == FailureKind::LockTimeout {
            self.reporter().report(connection, failure);
        }
    }
}
