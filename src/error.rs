//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Herdux.
//! Engines classify the stderr of the tools they invoke into these kinds at the
//! point of invocation; callers never re-parse tool output.
//!
//! # Error Categories
//! - `ToolingMissing`: A required client binary is not on the PATH
//! - `AuthenticationFailed`: The server rejected the supplied credentials
//! - `CommandFailed`: Generic nonzero exit with captured stderr
//! - `DatabaseExists`: `CREATE DATABASE` hit an existing database
//! - `BackupFailed` / `RestoreFailed`: Fatal dump or restore outcome
//! - `NoServerFound` / `MultipleServersFound`: Discovery could not pick a server
//! - `UnknownProfile`: Named server profile is not in the config
//! - `InvalidFormat` / `UnsupportedFormat` / `InvalidEngine` / `InvalidPort` / `InvalidConfigKey`: Bad user input
//! - `ConfigError`: Configuration file could not be read or written

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Herdux operations
#[derive(Error, Debug)]
pub enum HerduxError {
    /// Required binary is absent; carries install guidance
    #[error("{tool} not found.\n{guidance}")]
    ToolingMissing { tool: String, guidance: String },

    /// Credentials rejected by the server
    #[error("Authentication failed. {hint}")]
    AuthenticationFailed { hint: String },

    /// Generic nonzero exit
    #[error("{0}")]
    CommandFailed(String),

    /// Target database already exists
    #[error("Database \"{0}\" already exists")]
    DatabaseExists(String),

    /// Dump tool exited nonzero
    #[error("Backup failed for \"{database}\": {detail}")]
    BackupFailed { database: String, detail: String },

    /// Restore finished with a fatal status
    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    /// Backup file passed to restore does not exist
    #[error("Backup file not found: {}", .0.display())]
    BackupFileNotFound(PathBuf),

    /// Discovery returned zero instances
    #[error("No running {engine} servers found.\n{guidance}")]
    NoServerFound { engine: String, guidance: String },

    /// Discovery returned several instances and nobody can be asked
    #[error("Multiple {engine} servers found. Specify one with --port:\n{listing}")]
    MultipleServersFound { engine: String, listing: String },

    /// Named server profile does not exist
    #[error("Server profile \"{name}\" not found.\n{guidance}")]
    UnknownProfile { name: String, guidance: String },

    /// Unrecognized backup format
    #[error("Invalid format \"{0}\". Use \"custom\" or \"plain\".")]
    InvalidFormat(String),

    /// Known format the engine cannot produce or read
    #[error("{engine} does not support the \"{format}\" backup format. Use \"plain\".")]
    UnsupportedFormat { engine: String, format: String },

    /// Unrecognized engine name
    #[error("Unknown engine \"{0}\". Valid engines: postgres, mysql.")]
    InvalidEngine(String),

    /// Port outside 1..=65535 or not numeric
    #[error("Invalid port \"{0}\". Must be a number between 1 and 65535.")]
    InvalidPort(String),

    /// Unknown key for `config set` / `config get`
    #[error("Invalid key \"{0}\". Valid keys: host, port, user, password, output, engine")]
    InvalidConfigKey(String),

    /// Doctor found at least one failing check
    #[error("{failed} health check(s) failed")]
    HealthChecksFailed { failed: usize },

    /// The user dismissed an interactive prompt
    #[error("Operation cancelled")]
    Cancelled,

    /// Terminal prompt could not be shown
    #[error("Interactive prompt failed: {0}")]
    Interaction(String),

    /// Configuration error (file unreadable, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl HerduxError {
    /// Stable error code string
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ToolingMissing { .. } => "TOOLING_MISSING",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::CommandFailed(_) => "COMMAND_FAILED",
            Self::DatabaseExists(_) => "DATABASE_EXISTS",
            Self::BackupFailed { .. } => "BACKUP_FAILED",
            Self::RestoreFailed(_) => "RESTORE_FAILED",
            Self::BackupFileNotFound(_) => "BACKUP_FILE_NOT_FOUND",
            Self::NoServerFound { .. } => "NO_SERVER_FOUND",
            Self::MultipleServersFound { .. } => "MULTIPLE_SERVERS_FOUND",
            Self::UnknownProfile { .. } => "UNKNOWN_PROFILE",
            Self::InvalidFormat(_) | Self::UnsupportedFormat { .. } => "INVALID_FORMAT",
            Self::InvalidEngine(_) => "INVALID_ENGINE",
            Self::InvalidPort(_) => "INVALID_PORT",
            Self::InvalidConfigKey(_) => "INVALID_CONFIG_KEY",
            Self::HealthChecksFailed { .. } => "HEALTH_CHECKS_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Interaction(_) => "INTERACTION_FAILED",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a tooling-missing error
    pub fn tooling_missing(tool: impl Into<String>, guidance: impl Into<String>) -> Self {
        Self::ToolingMissing { tool: tool.into(), guidance: guidance.into() }
    }

    /// Create an authentication error with a remediation hint
    pub fn authentication_failed(hint: impl Into<String>) -> Self {
        Self::AuthenticationFailed { hint: hint.into() }
    }

    /// Create a generic command failure
    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::CommandFailed(message.into())
    }

    /// Create a backup failure
    pub fn backup_failed(database: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BackupFailed { database: database.into(), detail: detail.into() }
    }

    /// Create a fatal restore failure
    pub fn restore_failed(message: impl Into<String>) -> Self {
        Self::RestoreFailed(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a prompt I/O error
    pub fn interaction(message: impl Into<String>) -> Self {
        Self::Interaction(message.into())
    }
}

/// Result type alias for Herdux operations
pub type Result<T> = std::result::Result<T, HerduxError>;
