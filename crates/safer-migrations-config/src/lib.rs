// crates/safer-migrations-config/src/lib.rs
// ============================================================================
// Module: Safer Migrations Config
// Description: TOML configuration for the migration safety envelope.
// Purpose: Turn an operator config file into executor settings and output.
// Dependencies: safer-migrations-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`SaferMigrationsConfig::load`] reads `safer-migrations.toml` (or the path
//! in `SAFER_MIGRATIONS_CONFIG`) and [`SaferMigrationsConfig::build_migrator`]
//! turns it into a ready [`safer_migrations_core::SaferMigrator`].

pub mod config;

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DiagnosticsConfig;
pub use config::MAX_CONFIG_FILE_SIZE;
pub use config::OutputConfig;
pub use config::OutputTarget;
pub use config::SaferMigrationsConfig;
pub use config::TimeoutDefaultsConfig;
