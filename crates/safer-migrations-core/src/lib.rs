// crates/safer-migrations-core/src/lib.rs
// ============================================================================
// Module: Safer Migrations Core
// Description: Scoped session timeouts and lock-contention diagnostics.
// Purpose: Safety envelope around executing one schema-migration step.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! `safer-migrations-core` keeps a migration step from stalling behind
//! contended locks or runaway statements. It applies a lock timeout and a
//! statement timeout to the migration's connection for exactly the duration
//! of the step, restores the previous values on every exit path, and when the
//! step dies waiting on a lock it prints who was holding what before the
//! error propagates.
//!
//! The database is reached only through [`SessionConnection`]; see
//! `safer-migrations-postgres` for the `PostgreSQL` implementation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod executor;
pub mod locks;
pub mod output;
pub mod scoped;
pub mod session;
pub mod timeouts;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use executor::DEFAULT_LOCK_TIMEOUT_MS;
pub use executor::DEFAULT_STATEMENT_TIMEOUT_MS;
pub use executor::Direction;
pub use executor::ExecError;
pub use executor::Migration;
pub use executor::MigratorSettings;
pub use executor::SaferMigrator;
pub use locks::LockContentionReporter;
pub use locks::LockSnapshotRow;
pub use output::FileOutput;
pub use output::MemoryOutput;
pub use output::MigrationOutput;
pub use output::NoopOutput;
pub use output::StderrOutput;
pub use output::StdoutOutput;
pub use scoped::ScopedOutcome;
pub use scoped::ScopedSetting;
pub use scoped::with_setting;
pub use session::FailureKind;
pub use session::SessionConnection;
pub use session::SessionError;
pub use session::SessionParameter;
pub use session::SettingValue;
pub use timeouts::MigrationTimeoutConfig;
pub use timeouts::TimeoutConfigError;
pub use timeouts::resolve;
