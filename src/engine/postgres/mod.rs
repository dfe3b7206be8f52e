//! `PostgreSQL` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `PostgreSQL` servers.
//!
//! # Binaries
//! - `psql`: version checks, listing, CREATE/DROP, plain-text restores
//! - `pg_dump`: backups in custom (`-Fc`) or plain (`-Fp`) format
//! - `pg_restore`: custom-format restores
//! - `pg_isready`: readiness probe used only by discovery
//!
//! # Implementation Notes
//! - `-w` is always passed so a missing password fails fast instead of prompting
//! - The password travels in `PGPASSWORD`, never on the command line
//! - `PAGER`/`PSQL_PAGER` are blanked so output is never piped through a pager
//! - Administrative statements connect to the `postgres` maintenance database
//! - `pg_restore` exit codes go through a [`RestoreExitPolicy`]: 1 is fatal,
//!   higher codes are warnings unless stderr says "fatal"

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::discovery::{self, infer_postgres_version, PROBE_TIMEOUT, POSTGRES_PORTS, VERSION_TIMEOUT};
use crate::engine::health::binary_check;
use crate::engine::restore::{ensure_database, finish_restore, locate_backup_file};
use crate::engine::{
    parse_database_list, prepare_backup_path, quote_identifier, BackupFormat, ConnectionOptions,
    DatabaseEngine, DatabaseInfo, DatabaseInstance, DatabaseType, HealthCheck, HealthCheckResult,
    HealthStatus, RestoreExitPolicy, RestoreReport,
};
use crate::error::{HerduxError, Result};
use crate::process::{binary_exists, binary_version, CommandRunner, RunOptions, RunResult, DEFAULT_TIMEOUT};

const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const CLIENT_GUIDANCE: &str = "Install the PostgreSQL client:\n  \
     Windows: choco install postgresql\n  \
     macOS:   brew install libpq\n  \
     Ubuntu:  sudo apt install postgresql-client";

const DUMP_GUIDANCE: &str = "pg_dump is required for backup operations.\n\
     It is usually included with the PostgreSQL client installation.";

const LIST_QUERY: &str = "SELECT json_agg(json_build_object(\
     'name', datname, \
     'owner', pg_catalog.pg_get_userbyid(datdba), \
     'encoding', pg_encoding_to_char(encoding)) ORDER BY datname) \
     FROM pg_database WHERE datistemplate = false;";

const LIST_WITH_SIZE_QUERY: &str = "SELECT json_agg(json_build_object(\
     'name', datname, \
     'owner', pg_catalog.pg_get_userbyid(datdba), \
     'encoding', pg_encoding_to_char(encoding), \
     'size', pg_size_pretty(size_bytes), \
     'size_bytes', size_bytes) ORDER BY size_bytes DESC) \
     FROM (SELECT datname, datdba, encoding, pg_database_size(datname) AS size_bytes \
     FROM pg_database WHERE datistemplate = false) AS sized;";

const SUPPORTED_FORMATS: [BackupFormat; 2] = [BackupFormat::Custom, BackupFormat::Plain];

/// `PostgreSQL` database engine implementation
#[derive(Clone)]
pub struct PostgresEngine {
    runner: Arc<dyn CommandRunner>,
    scan_ports: Vec<u16>,
    restore_policy: RestoreExitPolicy,
}

impl PostgresEngine {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, scan_ports: Vec::new(), restore_policy: RestoreExitPolicy::pg_restore() }
    }

    /// Ports to scan instead of the conventional ones
    #[must_use]
    pub fn with_scan_ports(mut self, ports: Vec<u16>) -> Self {
        self.scan_ports = ports;
        self
    }

    #[must_use]
    pub fn with_restore_policy(mut self, policy: RestoreExitPolicy) -> Self {
        self.restore_policy = policy;
        self
    }

    pub fn restore_policy(&self) -> &RestoreExitPolicy {
        &self.restore_policy
    }

    /// Run a statement through `psql` against `database`
    async fn psql(
        &self,
        opts: &ConnectionOptions,
        database: &str,
        extra: &[&str],
        timeout: Option<Duration>,
    ) -> RunResult {
        let mut args = connection_args(opts);
        args.extend(["-d".to_string(), database.to_string()]);
        args.extend(extra.iter().map(|a| (*a).to_string()));

        let mut run_opts = RunOptions::new().envs(connection_env(opts));
        run_opts = match timeout {
            Some(limit) => run_opts.timeout(limit),
            None => run_opts.no_timeout(),
        };
        self.runner.run("psql", &args, run_opts).await
    }

    async fn probe(&self, opts: &ConnectionOptions, host: &str, port: u16) -> Option<DatabaseInstance> {
        let ready = self
            .runner
            .run(
                "pg_isready",
                &["-h".to_string(), host.to_string(), "-p".to_string(), port.to_string()],
                RunOptions::new().timeout(PROBE_TIMEOUT),
            )
            .await;
        if !ready.success() {
            return None;
        }

        let target = opts.clone().with_host(host).with_port(port);
        let version = match self.server_version(&target).await {
            Some(version) => Some(version),
            None => infer_postgres_version(port),
        };
        Some(DatabaseInstance::running(port, version))
    }
}

/// `-w -h <host> -p <port> -U <user>`, skipping unset fields
fn connection_args(opts: &ConnectionOptions) -> Vec<String> {
    let mut args = vec!["-w".to_string()];
    if let Some(host) = opts.host.as_deref().filter(|h| !h.is_empty()) {
        args.extend(["-h".to_string(), host.to_string()]);
    }
    if let Some(port) = opts.port {
        args.extend(["-p".to_string(), port.to_string()]);
    }
    if let Some(user) = opts.user.as_deref().filter(|u| !u.is_empty()) {
        args.extend(["-U".to_string(), user.to_string()]);
    }
    args
}

fn connection_env(opts: &ConnectionOptions) -> Vec<(String, String)> {
    let mut env = vec![("PAGER".to_string(), String::new()), ("PSQL_PAGER".to_string(), String::new())];
    if let Some(password) = opts.password.as_deref().filter(|p| !p.is_empty()) {
        env.push(("PGPASSWORD".to_string(), password.to_string()));
    }
    env
}

/// Server-side credential rejection, matched on the libpq phrasing only
fn is_auth_failure(stderr: &str) -> bool {
    stderr.contains("authentication failed for user") || stderr.contains("no password supplied")
}

fn auth_hint(command: &str) -> String {
    format!("Use --password to provide credentials:\n  herdux --password <password> {command}")
}

/// Classify a failed CREATE/DROP
fn admin_failure(result: &RunResult, action: &str, name: &str) -> HerduxError {
    let stderr = result.stderr.trim();
    // The name is echoed back in stderr, so the exists check runs first
    if action == "create" && stderr.contains("already exists") {
        return HerduxError::DatabaseExists(name.to_string());
    }
    if is_auth_failure(stderr) {
        return HerduxError::authentication_failed(auth_hint(&format!("{action} \"{name}\"")));
    }
    HerduxError::command_failed(format!("Failed to {action} database \"{name}\": {stderr}"))
}

impl DatabaseEngine for PostgresEngine {
    fn engine_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    fn engine_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn default_connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::default().with_host("localhost").with_port(5432).with_user("postgres")
    }

    fn default_backup_format(&self) -> BackupFormat {
        BackupFormat::Custom
    }

    fn supported_backup_formats(&self) -> &'static [BackupFormat] {
        &SUPPORTED_FORMATS
    }

    async fn check_client_version(&self) -> Result<String> {
        if !binary_exists(self.runner.as_ref(), "psql").await {
            return Err(HerduxError::tooling_missing("PostgreSQL client (psql)", CLIENT_GUIDANCE));
        }
        Ok(binary_version(self.runner.as_ref(), "psql")
            .await
            .unwrap_or_else(|| "psql (version unknown)".to_string()))
    }

    async fn check_backup_requirements(&self) -> Result<()> {
        if !binary_exists(self.runner.as_ref(), "pg_dump").await {
            return Err(HerduxError::tooling_missing("pg_dump", DUMP_GUIDANCE));
        }
        Ok(())
    }

    async fn discover_instances(&self, opts: &ConnectionOptions) -> Vec<DatabaseInstance> {
        let host = opts.host_or_localhost().to_string();
        let ports = discovery::candidate_ports(&self.scan_ports, &POSTGRES_PORTS);
        debug!(?ports, host = %host, "scanning for PostgreSQL servers");

        discovery::scan(&ports, |port| self.probe(opts, &host, port)).await
    }

    async fn server_version(&self, opts: &ConnectionOptions) -> Option<String> {
        let result = self
            .psql(opts, "postgres", &["-t", "-A", "-c", "SELECT version();"], Some(VERSION_TIMEOUT))
            .await;
        if !result.success() {
            return None;
        }

        result
            .stdout
            .trim()
            .split(',')
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }

    async fn list_databases(&self, opts: &ConnectionOptions, include_size: bool) -> Result<Vec<DatabaseInfo>> {
        // Summing sizes walks every database on disk, so it gets no ceiling
        let (query, timeout) =
            if include_size { (LIST_WITH_SIZE_QUERY, None) } else { (LIST_QUERY, Some(LIST_TIMEOUT)) };

        let result = self.psql(opts, "postgres", &["-t", "-A", "-c", query], timeout).await;
        if !result.success() {
            let stderr = result.stderr.trim();
            if is_auth_failure(stderr) {
                return Err(HerduxError::authentication_failed(auth_hint("list")));
            }
            return Err(HerduxError::command_failed(format!("Failed to list databases: {stderr}")));
        }

        parse_database_list(&result.stdout, include_size)
    }

    async fn create_database(&self, name: &str, opts: &ConnectionOptions) -> Result<()> {
        let statement = format!("CREATE DATABASE {};", quote_identifier(name, '"'));
        let result = self.psql(opts, "postgres", &["-c", &statement], Some(DEFAULT_TIMEOUT)).await;
        if !result.success() {
            return Err(admin_failure(&result, "create", name));
        }
        info!(database = name, "database created");
        Ok(())
    }

    async fn drop_database(&self, name: &str, opts: &ConnectionOptions) -> Result<()> {
        let statement = format!("DROP DATABASE {};", quote_identifier(name, '"'));
        let result = self.psql(opts, "postgres", &["-c", &statement], Some(DEFAULT_TIMEOUT)).await;
        if !result.success() {
            return Err(admin_failure(&result, "drop", name));
        }
        info!(database = name, "database dropped");
        Ok(())
    }

    async fn backup_database(
        &self,
        db_name: &str,
        output_dir: &Path,
        opts: &ConnectionOptions,
        format: BackupFormat,
    ) -> Result<PathBuf> {
        let path = prepare_backup_path(db_name, output_dir, format)?;
        let format_flag = match format {
            BackupFormat::Custom => "-Fc",
            BackupFormat::Plain => "-Fp",
        };

        let mut args = connection_args(opts);
        args.extend([
            format_flag.to_string(),
            "-f".to_string(),
            path.display().to_string(),
            db_name.to_string(),
        ]);

        info!(database = db_name, path = %path.display(), %format, "starting backup");
        let result = self
            .runner
            .run("pg_dump", &args, RunOptions::new().envs(connection_env(opts)).no_timeout())
            .await;
        if !result.success() {
            return Err(HerduxError::backup_failed(db_name, result.stderr.trim()));
        }

        Ok(path)
    }

    async fn restore_database(
        &self,
        file: &Path,
        db_name: &str,
        opts: &ConnectionOptions,
        format: Option<BackupFormat>,
        clean: bool,
    ) -> Result<RestoreReport> {
        let file = locate_backup_file(file)?;
        let created_database = ensure_database(self, db_name, opts).await?;
        let format = format.unwrap_or_else(|| BackupFormat::infer_from_path(&file));
        let file_arg = file.display().to_string();

        info!(database = db_name, file = %file_arg, %format, "starting restore");
        let status = match format {
            BackupFormat::Plain => {
                let result = self.psql(opts, db_name, &["-f", &file_arg], None).await;
                RestoreExitPolicy::strict().classify(&result)
            }
            BackupFormat::Custom => {
                let mut args = connection_args(opts);
                args.extend(["-d".to_string(), db_name.to_string()]);
                if clean {
                    args.extend(["--clean".to_string(), "--if-exists".to_string()]);
                }
                args.push(file_arg);

                let result = self
                    .runner
                    .run("pg_restore", &args, RunOptions::new().envs(connection_env(opts)).no_timeout())
                    .await;
                self.restore_policy.classify(&result)
            }
        };

        Ok(RestoreReport { created_database, outcome: finish_restore(status)? })
    }

    fn health_checks(&self) -> Vec<HealthCheck> {
        let runner = self.runner.clone();
        let defaults = self.default_connection_options();

        vec![
            binary_check(
                self.runner.clone(),
                "psql",
                "psql",
                HealthStatus::Error,
                "Please install PostgreSQL client tools.",
            ),
            binary_check(self.runner.clone(), "pg_dump", "pg_dump", HealthStatus::Error, "Backups will not work."),
            binary_check(
                self.runner.clone(),
                "pg_restore",
                "pg_restore",
                HealthStatus::Warn,
                "Custom format restores will not work.",
            ),
            HealthCheck::new("Connection", "Testing database connection...", move |opts| {
                let runner = runner.clone();
                let opts = opts.layered_over(&defaults);
                Box::pin(async move { check_connection(runner.as_ref(), &opts).await })
            }),
        ]
    }
}

async fn check_connection(runner: &dyn CommandRunner, opts: &ConnectionOptions) -> HealthCheckResult {
    let mut args = connection_args(opts);
    args.extend(["-d", "postgres", "-c", "SELECT 1;", "-q", "-t", "-A"].map(String::from));

    let result = runner
        .run("psql", &args, RunOptions::new().envs(connection_env(opts)).timeout(CONNECTION_CHECK_TIMEOUT))
        .await;

    let host = opts.host_or_localhost();
    let port = opts.port.unwrap_or(5432);
    if result.success() {
        return HealthCheckResult::success(format!("Successfully connected to PostgreSQL at {host}:{port}"));
    }

    if result.stderr.contains("password authentication failed") {
        let user = opts.user.as_deref().unwrap_or("postgres");
        return HealthCheckResult::error(format!(
            "Connection failed: Password authentication rejected for user '{user}'"
        ));
    }
    HealthCheckResult::error(format!(
        "Connection failed: Could not connect to the database. Make sure PostgreSQL is running and port is open.\n  {}",
        result.stderr.trim()
    ))
}
