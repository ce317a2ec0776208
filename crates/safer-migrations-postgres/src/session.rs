// crates/safer-migrations-postgres/src/session.rs
// ============================================================================
// Module: Postgres Session
// Description: SessionConnection implementation over a blocking postgres client.
// Purpose: Apply scoped timeouts and read the lock queue on a live connection.
// Dependencies: postgres, safer-migrations-core
// ============================================================================

//! ## Overview
//! [`PostgresSession`] borrows the migration's own [`Client`] so settings and
//! diagnostics run on the exact session the migration uses. Session values are
//! read from `pg_settings`, where a `source` of `session` marks an explicit
//! override; every other source reads back as [`SettingValue::Unset`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::time::Duration;

use postgres::Client;
use postgres::Row;
use postgres::error::DbError;
use postgres::error::SqlState;
use safer_migrations_core::FailureKind;
use safer_migrations_core::LockSnapshotRow;
use safer_migrations_core::SessionConnection;
use safer_migrations_core::SessionError;
use safer_migrations_core::SessionParameter;
use safer_migrations_core::SettingValue;

// ============================================================================
// SECTION: SQL
// ============================================================================

/// Reads a parameter's value and where it came from.
const SETTING_SQL: &str = "SELECT setting, source FROM pg_settings WHERE name = $1";

/// Lock holders and waiters of other sessions, oldest query first.
///
/// Locks without a resolvable relation (transaction ids, advisory locks) are
/// kept; `pg_*` system relations are not.
const LOCK_QUEUE_SQL: &str = r"
SELECT
    a.pid,
    c.relname::text AS relation,
    a.query,
    l.mode,
    l.granted,
    COALESCE(
        GREATEST((EXTRACT(EPOCH FROM (now() - a.query_start)) * 1000)::bigint, 0),
        0
    ) AS age_ms
FROM pg_stat_activity a
JOIN pg_locks l ON l.pid = a.pid
LEFT OUTER JOIN pg_class c ON l.relation = c.oid
WHERE (c.relname IS NULL OR c.relname NOT LIKE 'pg\_%')
  AND a.pid <> pg_backend_pid()
ORDER BY age_ms DESC
";

/// `pg_settings.source` value for an explicit session override.
const SESSION_SOURCE: &str = "session";

/// Builds the statement that applies `value` to `parameter`.
#[must_use]
pub fn setting_statement(parameter: SessionParameter, value: SettingValue) -> String {
    match value {
        SettingValue::Unset => format!("RESET {}", parameter.name()),
        SettingValue::Millis(millis) => format!("SET {} = {millis}", parameter.name()),
    }
}

/// Interprets a `pg_settings` row for a millisecond-valued parameter.
///
/// # Errors
///
/// Returns [`SessionError::Invalid`] when an explicit value is not an integer.
pub fn parse_setting(setting: &str, source: &str) -> Result<SettingValue, SessionError> {
    if source != SESSION_SOURCE {
        return Ok(SettingValue::Unset);
    }
    setting
        .trim()
        .parse::<u64>()
        .map(SettingValue::Millis)
        .map_err(|err| SessionError::Invalid(format!("setting value \"{setting}\": {err}")))
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Session operations on a borrowed `PostgreSQL` client.
pub struct PostgresSession<'a> {
    /// Connection shared with the migration body.
    client: &'a mut Client,
}

impl<'a> PostgresSession<'a> {
    /// Wraps the migration's client.
    pub const fn new(client: &'a mut Client) -> Self {
        Self {
            client,
        }
    }

    /// Returns the underlying client for migration statements.
    pub fn client(&mut self) -> &mut Client {
        &mut *self.client
    }
}

impl SessionConnection for PostgresSession<'_> {
    fn current_setting(
        &mut self,
        parameter: SessionParameter,
    ) -> Result<SettingValue, SessionError> {
        let row = self
            .client
            .query_opt(SETTING_SQL, &[&parameter.name()])
            .map_err(session_error)?
            .ok_or_else(|| SessionError::Invalid(format!("unknown parameter {parameter}")))?;
        let setting: String = row.try_get(0).map_err(session_error)?;
        let source: String = row.try_get(1).map_err(session_error)?;
        parse_setting(&setting, &source)
    }

    fn apply_setting(
        &mut self,
        parameter: SessionParameter,
        value: SettingValue,
    ) -> Result<(), SessionError> {
        self.client.batch_execute(&setting_statement(parameter, value)).map_err(session_error)
    }

    fn abort_transaction(&mut self) -> Result<(), SessionError> {
        self.client.batch_execute("ROLLBACK").map_err(session_error)
    }

    fn lock_snapshot(&mut self) -> Result<Vec<LockSnapshotRow>, SessionError> {
        let rows = self.client.query(LOCK_QUEUE_SQL, &[]).map_err(session_error)?;
        rows.iter().map(lock_row).collect()
    }

    fn classify_failure(&self, failure: &(dyn Error + 'static)) -> FailureKind {
        match find_db_error(failure) {
            Some(db) => classify_code(db.code(), db.message()),
            None => classify_message(&innermost_message(failure)),
        }
    }

    fn describe_failure(&self, failure: &(dyn Error + 'static)) -> String {
        match find_db_error(failure) {
            Some(db) => format!("{} {}: {}", db.severity(), db.code().code(), db.message()),
            None => failure.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a driver error, recognizing statements rejected by an aborted transaction.
fn session_error(err: postgres::Error) -> SessionError {
    if err.code() == Some(&SqlState::IN_FAILED_SQL_TRANSACTION) {
        SessionError::TransactionAborted(err.to_string())
    } else {
        SessionError::Database(err.to_string())
    }
}

/// Decodes one lock-queue row.
fn lock_row(row: &Row) -> Result<LockSnapshotRow, SessionError> {
    let age_ms: i64 = row.try_get("age_ms").map_err(session_error)?;
    Ok(LockSnapshotRow {
        pid: row.try_get("pid").map_err(session_error)?,
        relation: row.try_get("relation").map_err(session_error)?,
        query: row.try_get("query").map_err(session_error)?,
        mode: row.try_get("mode").map_err(session_error)?,
        granted: row.try_get("granted").map_err(session_error)?,
        age: Duration::from_millis(u64::try_from(age_ms).unwrap_or(0)),
    })
}

/// Maps a SQLSTATE and server message to a failure kind.
///
/// Both must agree: `57014` is also raised for user cancellation, and `55P03`
/// for `NOWAIT` lock requests.
#[must_use]
pub fn classify_code(code: &SqlState, message: &str) -> FailureKind {
    if *code == SqlState::LOCK_NOT_AVAILABLE && message.contains("lock timeout") {
        FailureKind::LockTimeout
    } else if *code == SqlState::QUERY_CANCELED && message.contains("statement timeout") {
        FailureKind::StatementTimeout
    } else {
        FailureKind::Other
    }
}

/// Classifies a failure that carries no SQLSTATE, such as one flattened to text
/// by an outer layer, from the server's message wording alone.
#[must_use]
pub fn classify_message(message: &str) -> FailureKind {
    if message.contains("canceling statement due to lock timeout") {
        FailureKind::LockTimeout
    } else if message.contains("canceling statement due to statement timeout") {
        FailureKind::StatementTimeout
    } else {
        FailureKind::Other
    }
}

/// Returns the message of the innermost error in the chain.
fn innermost_message(failure: &(dyn Error + 'static)) -> String {
    let mut current = failure;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}

/// Finds the server error anywhere in a failure's source chain.
fn find_db_error<'e>(failure: &'e (dyn Error + 'static)) -> Option<&'e DbError> {
    let mut current = Some(failure);
    while let Some(err) = current {
        let driver = err.downcast_ref::<postgres::Error>();
        if let Some(db) = driver.and_then(postgres::Error::as_db_error) {
            return Some(db);
        }
        if let Some(db) = err.downcast_ref::<DbError>() {
            return Some(db);
        }
        current = err.source();
    }
    None
}

// ============================================================================
// SECTION: Tests
// ============================================================================
