// crates/safer-migrations-config/src/config.rs
// ============================================================================
// Module: Safer Migrations Configuration
// Description: Loading and validation of process-wide migration settings.
// Purpose: Fail closed on configuration that would silently weaken timeouts.
// Dependencies: safer-migrations-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is read from a TOML file with size and path limits. Every
//! section is optional and defaults to the core defaults; unknown keys are
//! rejected. A process-wide default of zero is invalid because zero disables
//! the timeout instead of tightening it. Individual migrations opt out
//! explicitly through their own timeout declarations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use safer_migrations_core::DEFAULT_LOCK_TIMEOUT_MS;
use safer_migrations_core::DEFAULT_STATEMENT_TIMEOUT_MS;
use safer_migrations_core::FileOutput;
use safer_migrations_core::MigrationOutput;
use safer_migrations_core::MigratorSettings;
use safer_migrations_core::SaferMigrator;
use safer_migrations_core::StderrOutput;
use safer_migrations_core::StdoutOutput;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "safer-migrations.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SAFER_MIGRATIONS_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 64 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaferMigrationsConfig {
    /// Process-wide timeout defaults.
    #[serde(default)]
    pub timeouts: TimeoutDefaultsConfig,
    /// Failure diagnostics.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// Operator output routing.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Defaults applied when a migration declares no override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutDefaultsConfig {
    /// Lock timeout in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub default_lock_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub default_statement_timeout_ms: u64,
}

impl Default for TimeoutDefaultsConfig {
    fn default() -> Self {
        Self {
            default_lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            default_statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
        }
    }
}

/// Failure diagnostics settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Print the lock queue when a step fails on a lock timeout.
    #[serde(default = "default_dump_lock_queue")]
    pub dump_lock_queue: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dump_lock_queue: default_dump_lock_queue(),
        }
    }
}

/// Where operator output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// Append to `output.path`.
    File,
}

/// Operator output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output target.
    #[serde(default)]
    pub target: OutputTarget,
    /// File path; required when `target = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl SaferMigrationsConfig {
    /// Loads configuration from `path`, the `SAFER_MIGRATIONS_CONFIG`
    /// environment variable, or `safer-migrations.toml`, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds the size
    /// limit, is not UTF-8, fails to parse, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.default_lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.default_lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.default_statement_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.default_statement_timeout_ms must be greater than zero".to_string(),
            ));
        }
        match (self.output.target, &self.output.path) {
            (OutputTarget::File, None) => Err(ConfigError::Invalid(
                "output.path is required when output.target is file".to_string(),
            )),
            (OutputTarget::File, Some(path)) => {
                validate_path_string("output.path", &path.to_string_lossy())
            }
            (_, Some(_)) => Err(ConfigError::Invalid(
                "output.path is only valid when output.target is file".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }

    /// Returns executor settings for the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a default is zero.
    pub fn migrator_settings(&self) -> Result<MigratorSettings, ConfigError> {
        MigratorSettings::new(
            self.timeouts.default_lock_timeout_ms,
            self.timeouts.default_statement_timeout_ms,
            self.diagnostics.dump_lock_queue,
        )
        .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Opens the configured output sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a file target has no path, or
    /// [`ConfigError::Io`] when the file cannot be opened.
    pub fn build_output(&self) -> Result<Arc<dyn MigrationOutput>, ConfigError> {
        match self.output.target {
            OutputTarget::Stdout => Ok(Arc::new(StdoutOutput)),
            OutputTarget::Stderr => Ok(Arc::new(StderrOutput)),
            OutputTarget::File => {
                let path = self.output.path.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("output.path is required for file output".to_string())
                })?;
                let sink = FileOutput::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
        }
    }

    /// Builds an executor from this configuration.
    ///
    /// # Errors
    ///
    /// See [`Self::migrator_settings`] and [`Self::build_output`].
    pub fn build_migrator(&self) -> Result<SaferMigrator, ConfigError> {
        Ok(SaferMigrator::new(self.migrator_settings()?, self.build_output()?))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Default for `timeouts.default_lock_timeout_ms`.
const fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

/// Default for `timeouts.default_statement_timeout_ms`.
const fn default_statement_timeout_ms() -> u64 {
    DEFAULT_STATEMENT_TIMEOUT_MS
}

/// Default for `diagnostics.dump_lock_queue`.
const fn default_dump_lock_queue() -> bool {
    true
}

/// Resolves the config path from the argument or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
