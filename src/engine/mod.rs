//! Database Engine Traits and Core Types
//!
//! This module defines the capability contract every supported engine implements.
//! Each engine (`PostgreSQL`, `MySQL`) implements the `DatabaseEngine` trait by
//! translating abstract operations into invocations of its native client binaries.
//!
//! # Stateless Design
//! Engines hold no connection or session. Every method takes `&ConnectionOptions`
//! and starts fresh subprocesses through the engine's [`CommandRunner`].
//!
//! # Closed Set
//! The engine set is fixed. [`Engine`] is a plain enum over the concrete
//! implementations and [`factory`] maps a [`DatabaseType`] tag onto it.
//!
//! [`CommandRunner`]: crate::process::CommandRunner

use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{HerduxError, Result};
use crate::process::RunResult;

pub mod factory;
pub mod health;
pub mod mysql;
pub mod postgres;
pub(crate) mod restore;

pub use factory::{create_engine, create_engine_with, EngineContext};
pub use health::{overall_status, HealthCheck, HealthCheckResult, HealthStatus};
pub use mysql::MySqlEngine;
pub use postgres::PostgresEngine;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    #[default]
    Postgres,
    /// `MySQL` database (includes `MariaDB`)
    MySQL,
}

impl DatabaseType {
    pub const ALL: [Self; 2] = [Self::Postgres, Self::MySQL];

    /// Get the engine tag as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySQL => "mysql",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = HerduxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySQL),
            _ => Err(HerduxError::InvalidEngine(s.to_string())),
        }
    }
}

/// Connection parameters for a database server
///
/// Every field is optional. The resolver fills what it can, engines let the
/// client binaries apply their own defaults for the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Accepts `5432` or `"5432"` when read back from a config file
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::config::deserialize_optional_port"
    )]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionOptions {
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Field-wise merge: values set here win, gaps are filled from `lower`
    ///
    /// Empty strings count as unset.
    #[must_use]
    pub fn layered_over(&self, lower: &Self) -> Self {
        Self {
            host: pick(&self.host, &lower.host),
            port: self.port.or(lower.port),
            user: pick(&self.user, &lower.user),
            password: pick(&self.password, &lower.password),
        }
    }

    /// True when no field carries a value
    #[must_use]
    pub fn is_empty(&self) -> bool {
        non_empty(&self.host).is_none()
            && self.port.is_none()
            && non_empty(&self.user).is_none()
            && non_empty(&self.password).is_none()
    }

    /// Host, falling back to `localhost`
    #[must_use]
    pub fn host_or_localhost(&self) -> &str {
        non_empty(&self.host).unwrap_or("localhost")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn pick(upper: &Option<String>, lower: &Option<String>) -> Option<String> {
    non_empty(upper).or_else(|| non_empty(lower)).map(String::from)
}

/// Liveness of a discovered instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Unreachable,
}

/// A server found by a discovery scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInstance {
    pub port: u16,

    /// Reported or inferred version; `None` when the server answered but would not say
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub status: InstanceStatus,
}

impl DatabaseInstance {
    #[must_use]
    pub fn running(port: u16, version: Option<String>) -> Self {
        Self { port, version, status: InstanceStatus::Running }
    }

    /// Version for display, `running` when unknown
    #[must_use]
    pub fn version_label(&self) -> &str {
        self.version.as_deref().unwrap_or("running")
    }
}

/// One database on a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    /// Human-readable size (only when sizes were requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Raw size in bytes, used for ordering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Parse the JSON array a client prints for a database listing
///
/// Sized listings are ordered largest first regardless of the order the server
/// aggregated them in.
pub(crate) fn parse_database_list(output: &str, include_size: bool) -> Result<Vec<DatabaseInfo>> {
    let output = output.trim();
    if output.is_empty() || output.eq_ignore_ascii_case("null") {
        return Ok(Vec::new());
    }

    let mut databases: Vec<DatabaseInfo> = serde_json::from_str(output)
        .map_err(|_| HerduxError::command_failed(format!("Failed to parse database list: {output}")))?;

    if include_size {
        databases.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    }

    Ok(databases)
}

/// Backup encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    /// Tool-specific binary archive
    Custom,
    /// Executable SQL script
    Plain,
}

impl BackupFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Plain => "plain",
        }
    }

    /// File extension used for backups in this format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Custom => "dump",
            Self::Plain => "sql",
        }
    }

    /// Infer the format of an existing backup file: `.sql` is plain, anything else custom
    #[must_use]
    pub fn infer_from_path(path: &Path) -> Self {
        let is_sql = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("sql"));
        if is_sql {
            Self::Plain
        } else {
            Self::Custom
        }
    }
}

impl std::fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackupFormat {
    type Err = HerduxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "custom" => Ok(Self::Custom),
            "plain" => Ok(Self::Plain),
            _ => Err(HerduxError::InvalidFormat(s.to_string())),
        }
    }
}

/// `{db_name}_{YYYY-MM-DD}.{extension}`
#[must_use]
pub fn backup_file_name(db_name: &str, date: NaiveDate, format: BackupFormat) -> String {
    format!("{db_name}_{}.{}", date.format("%Y-%m-%d"), format.extension())
}

/// Today's date in UTC, as used for backup names
#[must_use]
pub fn backup_date() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Create `output_dir` if needed and return the absolute backup path
pub(crate) fn prepare_backup_path(db_name: &str, output_dir: &Path, format: BackupFormat) -> Result<PathBuf> {
    let dir = std::path::absolute(output_dir).map_err(|e| {
        HerduxError::backup_failed(db_name, format!("Could not resolve {}: {e}", output_dir.display()))
    })?;
    std::fs::create_dir_all(&dir).map_err(|e| {
        HerduxError::backup_failed(db_name, format!("Could not create {}: {e}", dir.display()))
    })?;
    Ok(dir.join(backup_file_name(db_name, backup_date(), format)))
}

/// Three-way classification of a restore tool's exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStatus {
    Success,
    SuccessWithWarnings(String),
    Failure(String),
}

/// Maps a restore tool's exit status onto [`RestoreStatus`]
///
/// Which codes mean "fatal" varies across tool versions, so the policy is data:
/// engines ship a default and the config file can override the fatal codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreExitPolicy {
    /// Nonzero codes that always mean failure
    pub fatal_codes: Vec<i32>,
    /// Case-insensitive stderr marker that turns any other nonzero code into failure
    pub fatal_marker: Option<String>,
    /// When false every nonzero code is fatal
    pub allow_warnings: bool,
}

impl RestoreExitPolicy {
    /// Any nonzero exit is fatal
    #[must_use]
    pub const fn strict() -> Self {
        Self { fatal_codes: Vec::new(), fatal_marker: None, allow_warnings: false }
    }

    /// `pg_restore`: 1 is fatal, other nonzero codes are warnings unless stderr says "fatal"
    #[must_use]
    pub fn pg_restore() -> Self {
        Self { fatal_codes: vec![1], fatal_marker: Some("fatal".to_string()), allow_warnings: true }
    }

    /// Replace the fatal exit codes
    #[must_use]
    pub fn with_fatal_codes(mut self, codes: Vec<i32>) -> Self {
        self.fatal_codes = codes;
        self
    }

    #[must_use]
    pub fn classify(&self, result: &RunResult) -> RestoreStatus {
        if result.success() {
            return RestoreStatus::Success;
        }

        let stderr = result.stderr.trim().to_string();
        if !self.allow_warnings || self.fatal_codes.contains(&result.exit_code) {
            return RestoreStatus::Failure(stderr);
        }

        let marked_fatal = self
            .fatal_marker
            .as_deref()
            .is_some_and(|marker| stderr.to_lowercase().contains(&marker.to_lowercase()));
        if marked_fatal {
            RestoreStatus::Failure(stderr)
        } else {
            RestoreStatus::SuccessWithWarnings(stderr)
        }
    }
}

/// Non-failing restore outcomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Everything restored
    Restored,
    /// Restored, but the tool skipped objects (missing roles, ACLs, ...)
    RestoredWithWarnings { warnings: String },
}

impl RestoreOutcome {
    #[must_use]
    pub const fn has_warnings(&self) -> bool {
        matches!(self, Self::RestoredWithWarnings { .. })
    }

    #[must_use]
    pub fn warnings(&self) -> Option<&str> {
        match self {
            Self::Restored => None,
            Self::RestoredWithWarnings { warnings } => Some(warnings),
        }
    }
}

/// What a restore did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// The target database did not exist and was created first
    pub created_database: bool,
    pub outcome: RestoreOutcome,
}

/// Database engine trait
///
/// All engines implement this trait. Each method is stateless: it builds the
/// arguments for one or more client binaries, runs them, and classifies the
/// result into a [`HerduxError`] kind on failure.
pub trait DatabaseEngine: Send + Sync {
    /// Tag of this engine
    fn engine_type(&self) -> DatabaseType;

    /// Display label ("PostgreSQL", "MySQL")
    fn engine_name(&self) -> &'static str;

    /// Last-resort host/port/user
    fn default_connection_options(&self) -> ConnectionOptions;

    /// Format used when the user does not pick one
    fn default_backup_format(&self) -> BackupFormat;

    /// Formats `backup_database` accepts
    fn supported_backup_formats(&self) -> &'static [BackupFormat];

    /// Verify the primary client is installed and return its version line
    fn check_client_version(&self) -> impl Future<Output = Result<String>> + Send;

    /// Verify the dump tool is installed
    fn check_backup_requirements(&self) -> impl Future<Output = Result<()>> + Send;

    /// Probe candidate ports concurrently, sorted by port
    fn discover_instances(
        &self,
        opts: &ConnectionOptions,
    ) -> impl Future<Output = Vec<DatabaseInstance>> + Send;

    /// Ask a live server for its version, `None` if nobody answered
    fn server_version(&self, opts: &ConnectionOptions) -> impl Future<Output = Option<String>> + Send;

    /// List databases; with `include_size` the result is ordered largest first
    fn list_databases(
        &self,
        opts: &ConnectionOptions,
        include_size: bool,
    ) -> impl Future<Output = Result<Vec<DatabaseInfo>>> + Send;

    /// `CREATE DATABASE`; an existing target yields [`HerduxError::DatabaseExists`]
    fn create_database(&self, name: &str, opts: &ConnectionOptions) -> impl Future<Output = Result<()>> + Send;

    /// `DROP DATABASE`
    fn drop_database(&self, name: &str, opts: &ConnectionOptions) -> impl Future<Output = Result<()>> + Send;

    /// Dump `db_name` into `output_dir`, returning the absolute file path
    fn backup_database(
        &self,
        db_name: &str,
        output_dir: &Path,
        opts: &ConnectionOptions,
        format: BackupFormat,
    ) -> impl Future<Output = Result<PathBuf>> + Send;

    /// Create the target if missing, then restore `file` into it
    fn restore_database(
        &self,
        file: &Path,
        db_name: &str,
        opts: &ConnectionOptions,
        format: Option<BackupFormat>,
        clean: bool,
    ) -> impl Future<Output = Result<RestoreReport>> + Send;

    /// Ordered checks for `doctor`
    fn health_checks(&self) -> Vec<HealthCheck>;
}

/// One of the supported engines
#[derive(Clone)]
pub enum Engine {
    Postgres(PostgresEngine),
    MySql(MySqlEngine),
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Engine").field(&self.engine_type()).finish()
    }
}

impl DatabaseEngine for Engine {
    fn engine_type(&self) -> DatabaseType {
        match self {
            Self::Postgres(e) => e.engine_type(),
            Self::MySql(e) => e.engine_type(),
        }
    }

    fn engine_name(&self) -> &'static str {
        match self {
            Self::Postgres(e) => e.engine_name(),
            Self::MySql(e) => e.engine_name(),
        }
    }

    fn default_connection_options(&self) -> ConnectionOptions {
        match self {
            Self::Postgres(e) => e.default_connection_options(),
            Self::MySql(e) => e.default_connection_options(),
        }
    }

    fn default_backup_format(&self) -> BackupFormat {
        match self {
            Self::Postgres(e) => e.default_backup_format(),
            Self::MySql(e) => e.default_backup_format(),
        }
    }

    fn supported_backup_formats(&self) -> &'static [BackupFormat] {
        match self {
            Self::Postgres(e) => e.supported_backup_formats(),
            Self::MySql(e) => e.supported_backup_formats(),
        }
    }

    async fn check_client_version(&self) -> Result<String> {
        match self {
            Self::Postgres(e) => e.check_client_version().await,
            Self::MySql(e) => e.check_client_version().await,
        }
    }

    async fn check_backup_requirements(&self) -> Result<()> {
        match self {
            Self::Postgres(e) => e.check_backup_requirements().await,
            Self::MySql(e) => e.check_backup_requirements().await,
        }
    }

    async fn discover_instances(&self, opts: &ConnectionOptions) -> Vec<DatabaseInstance> {
        match self {
            Self::Postgres(e) => e.discover_instances(opts).await,
            Self::MySql(e) => e.discover_instances(opts).await,
        }
    }

    async fn server_version(&self, opts: &ConnectionOptions) -> Option<String> {
        match self {
            Self::Postgres(e) => e.server_version(opts).await,
            Self::MySql(e) => e.server_version(opts).await,
        }
    }

    async fn list_databases(&self, opts: &ConnectionOptions, include_size: bool) -> Result<Vec<DatabaseInfo>> {
        match self {
            Self::Postgres(e) => e.list_databases(opts, include_size).await,
            Self::MySql(e) => e.list_databases(opts, include_size).await,
        }
    }

    async fn create_database(&self, name: &str, opts: &ConnectionOptions) -> Result<()> {
        match self {
            Self::Postgres(e) => e.create_database(name, opts).await,
            Self::MySql(e) => e.create_database(name, opts).await,
        }
    }

    async fn drop_database(&self, name: &str, opts: &ConnectionOptions) -> Result<()> {
        match self {
            Self::Postgres(e) => e.drop_database(name, opts).await,
            Self::MySql(e) => e.drop_database(name, opts).await,
        }
    }

    async fn backup_database(
        &self,
        db_name: &str,
        output_dir: &Path,
        opts: &ConnectionOptions,
        format: BackupFormat,
    ) -> Result<PathBuf> {
        match self {
            Self::Postgres(e) => e.backup_database(db_name, output_dir, opts, format).await,
            Self::MySql(e) => e.backup_database(db_name, output_dir, opts, format).await,
        }
    }

    async fn restore_database(
        &self,
        file: &Path,
        db_name: &str,
        opts: &ConnectionOptions,
        format: Option<BackupFormat>,
        clean: bool,
    ) -> Result<RestoreReport> {
        match self {
            Self::Postgres(e) => e.restore_database(file, db_name, opts, format, clean).await,
            Self::MySql(e) => e.restore_database(file, db_name, opts, format, clean).await,
        }
    }

    fn health_checks(&self) -> Vec<HealthCheck> {
        match self {
            Self::Postgres(e) => e.health_checks(),
            Self::MySql(e) => e.health_checks(),
        }
    }
}

/// Quote an identifier, doubling embedded quote characters
pub(crate) fn quote_identifier(name: &str, quote: char) -> String {
    let doubled = format!("{quote}{quote}");
    format!("{quote}{}{quote}", name.replace(quote, &doubled))
}
