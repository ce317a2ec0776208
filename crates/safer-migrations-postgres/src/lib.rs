// crates/safer-migrations-postgres/src/lib.rs
// ============================================================================
// Module: Safer Migrations Postgres
// Description: PostgreSQL backend for scoped migration timeouts.
// Purpose: Bind the core session contract to the blocking postgres client.
// Dependencies: postgres, safer-migrations-core
// ============================================================================

//! ## Overview
//! Wrap the migration's [`postgres::Client`] in a [`PostgresSession`] and hand
//! it to [`safer_migrations_core::SaferMigrator::exec_migration`]. Migration
//! bodies reach the client through [`PostgresSession::client`].

pub mod session;

pub use session::PostgresSession;
pub use session::classify_code;
pub use session::classify_message;
pub use session::parse_setting;
pub use session::setting_statement;
