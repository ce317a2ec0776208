// crates/safer-migrations-core/tests/common/mod.rs
// =============================================================================
// Module: Core Test Helpers
// Description: In-memory session connection and simulated database errors.
// Purpose: Exercise scoped settings and diagnostics without a live database.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use safer_migrations_core::FailureKind;
use safer_migrations_core::LockSnapshotRow;
use safer_migrations_core::SessionConnection;
use safer_migrations_core::SessionError;
use safer_migrations_core::SessionParameter;
use safer_migrations_core::SettingValue;
use thiserror::Error;

/// SQLSTATE raised when a lock wait exceeds `lock_timeout`.
pub const LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE raised when a statement exceeds `statement_timeout`.
pub const QUERY_CANCELED: &str = "57014";

// =============================================================================
// Simulated errors
// =============================================================================

/// Low-level database error carrying a SQLSTATE code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FakeDbError {
    /// SQLSTATE code.
    pub code: &'static str,
    /// Server message.
    pub message: String,
}

/// Framework-level error wrapping the low-level cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("migration failed: {source}")]
pub struct StepError {
    /// Underlying database error.
    #[source]
    pub source: FakeDbError,
}

/// Builds a lock-timeout failure.
pub fn lock_timeout_error() -> StepError {
    StepError {
        source: FakeDbError {
            code: LOCK_NOT_AVAILABLE,
            message: "canceling statement due to lock timeout".to_string(),
        },
    }
}

/// Builds a statement-timeout failure.
pub fn statement_timeout_error() -> StepError {
    StepError {
        source: FakeDbError {
            code: QUERY_CANCELED,
            message: "canceling statement due to statement timeout".to_string(),
        },
    }
}

/// Builds an unrelated failure.
pub fn other_error() -> StepError {
    StepError {
        source: FakeDbError {
            code: "42P01",
            message: "relation \"missing\" does not exist".to_string(),
        },
    }
}

// =============================================================================
// In-memory session
// =============================================================================

/// Connection model with session values, transactional SET and a lock table.
#[derive(Debug, Default)]
pub struct InMemorySession {
    /// Explicit session values; absent means unset.
    values: HashMap<SessionParameter, u64>,
    /// Session values at BEGIN, restored on ROLLBACK.
    snapshot: Option<HashMap<SessionParameter, u64>>,
    /// Whether the open transaction has failed.
    aborted: bool,
    /// Seeded lock rows, returned as-is.
    locks: Vec<LockSnapshotRow>,
    /// Error returned by the lock query, when set.
    lock_query_error: Option<String>,
    /// Remaining successful applies per parameter; absent means unlimited.
    apply_budget: HashMap<SessionParameter, usize>,
    /// Statements issued, in order.
    statements: Vec<String>,
}

impl InMemorySession {
    /// Creates a session with every parameter unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a session value directly (as a prior `SET` would).
    pub fn with_value(mut self, parameter: SessionParameter, millis: u64) -> Self {
        self.values.insert(parameter, millis);
        self
    }

    /// Seeds a competing session lock.
    pub fn with_lock(mut self, row: LockSnapshotRow) -> Self {
        self.locks.push(row);
        self
    }

    /// Makes the lock query fail.
    pub fn with_failing_lock_query(mut self, message: &str) -> Self {
        self.lock_query_error = Some(message.to_string());
        self
    }

    /// Lets `parameter` be applied `count` times, then rejects it.
    pub fn with_apply_budget(mut self, parameter: SessionParameter, count: usize) -> Self {
        self.apply_budget.insert(parameter, count);
        self
    }

    /// Opens a transaction.
    pub fn begin(&mut self) {
        self.statements.push("BEGIN".to_string());
        self.snapshot = Some(self.values.clone());
    }

    /// Fails the open transaction (as any statement error would) and returns `error`.
    pub fn fail<E>(&mut self, error: E) -> E {
        if self.snapshot.is_some() {
            self.aborted = true;
        }
        error
    }

    /// Returns the effective value without logging.
    pub fn value(&self, parameter: SessionParameter) -> SettingValue {
        self.values
            .get(&parameter)
            .map_or(SettingValue::Unset, |millis| SettingValue::Millis(*millis))
    }

    /// Returns true while the open transaction is failed.
    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Returns true while a transaction is open.
    pub const fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Returns issued statements.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Returns how many issued statements start with `prefix`.
    pub fn count_statements(&self, prefix: &str) -> usize {
        self.statements.iter().filter(|statement| statement.starts_with(prefix)).count()
    }

    /// Rejects commands while the transaction is failed.
    fn check_not_aborted(&self) -> Result<(), SessionError> {
        if self.aborted {
            return Err(SessionError::TransactionAborted(
                "current transaction is aborted, commands ignored until end of transaction block"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl SessionConnection for InMemorySession {
    fn current_setting(
        &mut self,
        parameter: SessionParameter,
    ) -> Result<SettingValue, SessionError> {
        self.check_not_aborted()?;
        self.statements.push(format!("SHOW {}", parameter.name()));
        Ok(self.value(parameter))
    }

    fn apply_setting(
        &mut self,
        parameter: SessionParameter,
        value: SettingValue,
    ) -> Result<(), SessionError> {
        self.check_not_aborted()?;
        if let Some(remaining) = self.apply_budget.get_mut(&parameter) {
            if *remaining == 0 {
                return Err(SessionError::Database(format!(
                    "permission denied to set parameter \"{}\"",
                    parameter.name()
                )));
            }
            *remaining -= 1;
        }
        match value {
            SettingValue::Unset => {
                self.statements.push(format!("RESET {}", parameter.name()));
                self.values.remove(&parameter);
            }
            SettingValue::Millis(millis) => {
                self.statements.push(format!("SET {} = {millis}", parameter.name()));
                self.values.insert(parameter, millis);
            }
        }
        Ok(())
    }

    fn abort_transaction(&mut self) -> Result<(), SessionError> {
        self.statements.push("ROLLBACK".to_string());
        if let Some(snapshot) = self.snapshot.take() {
            self.values = snapshot;
        }
        self.aborted = false;
        Ok(())
    }

    fn lock_snapshot(&mut self) -> Result<Vec<LockSnapshotRow>, SessionError> {
        self.check_not_aborted()?;
        self.statements.push("SELECT lock queue".to_string());
        if let Some(message) = &self.lock_query_error {
            return Err(SessionError::Database(message.clone()));
        }
        Ok(self.locks.clone())
    }

    fn classify_failure(&self, failure: &(dyn Error + 'static)) -> FailureKind {
        let mut current = Some(failure);
        while let Some(error) = current {
            if let Some(db) = error.downcast_ref::<FakeDbError>() {
                if db.code == LOCK_NOT_AVAILABLE && db.message.contains("lock timeout") {
                    return FailureKind::LockTimeout;
                }
                if db.code == QUERY_CANCELED && db.message.contains("statement timeout") {
                    return FailureKind::StatementTimeout;
                }
                return FailureKind::Other;
            }
            current = error.source();
        }
        FailureKind::Other
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Builds a lock row.
pub fn lock_row(
    pid: i32,
    relation: &str,
    mode: &str,
    granted: bool,
    age_ms: u64,
) -> LockSnapshotRow {
    LockSnapshotRow {
        pid,
        relation: Some(relation.to_string()),
        query: Some(format!("-- session {pid}")),
        mode: mode.to_string(),
        granted,
        age: Duration::from_millis(age_ms),
    }
}

/// Seeds a holder and a waiter on `users` plus an older idle holder.
pub fn contended_session() -> InMemorySession {
    InMemorySession::new()
        .with_lock(lock_row(201, "users", "AccessExclusiveLock", false, 1_200))
        .with_lock(lock_row(101, "users", "RowExclusiveLock", true, 45_000))
        .with_lock(lock_row(150, "orders", "AccessShareLock", true, 9_000))
}

/// Returns true when `line` starts with a `YYYY-MM-DD HH:MM:SS.mmm: ` prefix.
pub fn is_timestamped(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 25 {
        return false;
    }
    let digits = [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 14, 15, 17, 18, 20, 21, 22];
    digits.iter().all(|index| bytes[*index].is_ascii_digit())
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[10] == b' '
        && bytes[13] == b':'
        && bytes[16] == b':'
        && bytes[19] == b'.'
        && &line[23..25] == ": "
}
