//! `MySQL` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `MySQL` and `MariaDB` servers.
//!
//! # Implementation Notes
//! - `--protocol=tcp` is always passed so `-h localhost` never silently means a socket
//! - The password travels in `MYSQL_PWD`
//! - Backups are plain SQL produced by `mysqldump --result-file`
//! - Restores stream the SQL file into `mysql` on stdin; any nonzero exit is fatal
//! - Discovery probes with `mysqladmin ping`, which exits 0 for a live server even
//!   when the credentials are rejected

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::discovery::{self, MYSQL_PORTS, PROBE_TIMEOUT, VERSION_TIMEOUT};
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

const INSTALL_HINT: &str = "  Ubuntu/Debian: sudo apt install mysql-client\n  \
     macOS:         brew install mysql-client";

const SYSTEM_SCHEMAS: &str = "('information_schema', 'mysql', 'performance_schema', 'sys')";

const SUPPORTED_FORMATS: [BackupFormat; 1] = [BackupFormat::Plain];

/// `MySQL` database engine implementation
#[derive(Clone)]
pub struct MySqlEngine {
    runner: Arc<dyn CommandRunner>,
    scan_ports: Vec<u16>,
}

impl MySqlEngine {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, scan_ports: Vec::new() }
    }

    /// Ports to scan instead of the conventional ones
    #[must_use]
    pub fn with_scan_ports(mut self, ports: Vec<u16>) -> Self {
        self.scan_ports = ports;
        self
    }

    /// Run `mysql -e <statement>` in batch mode
    async fn execute(&self, opts: &ConnectionOptions, statement: &str, timeout: Option<Duration>) -> RunResult {
        let mut args = connection_args(opts);
        args.extend([
            "-e".to_string(),
            statement.to_string(),
            "--skip-column-names".to_string(),
            "--batch".to_string(),
        ]);

        let run_opts = RunOptions::new().envs(connection_env(opts));
        let run_opts = match timeout {
            Some(limit) => run_opts.timeout(limit),
            None => run_opts.no_timeout(),
        };
        self.runner.run("mysql", &args, run_opts).await
    }

    async fn probe(&self, opts: &ConnectionOptions, host: &str, port: u16) -> Option<DatabaseInstance> {
        let args = vec![
            "--protocol=tcp".to_string(),
            "-h".to_string(),
            host.to_string(),
            "-P".to_string(),
            port.to_string(),
            "ping".to_string(),
        ];
        let ping = self
            .runner
            .run("mysqladmin", &args, RunOptions::new().envs(connection_env(opts)).timeout(PROBE_TIMEOUT))
            .await;
        if !ping.success() {
            return None;
        }

        let target = opts.clone().with_host(host).with_port(port);
        Some(DatabaseInstance::running(port, self.server_version(&target).await))
    }

    fn ensure_plain(&self, format: BackupFormat) -> Result<()> {
        match format {
            BackupFormat::Plain => Ok(()),
            BackupFormat::Custom => Err(HerduxError::UnsupportedFormat {
                engine: self.engine_name().to_string(),
                format: format.to_string(),
            }),
        }
    }
}

/// `--protocol=tcp -h <host> -P <port> -u <user>`, skipping unset fields
fn connection_args(opts: &ConnectionOptions) -> Vec<String> {
    let mut args = vec!["--protocol=tcp".to_string()];
    if let Some(host) = opts.host.as_deref().filter(|h| !h.is_empty()) {
        args.extend(["-h".to_string(), host.to_string()]);
    }
    if let Some(port) = opts.port {
        args.extend(["-P".to_string(), port.to_string()]);
    }
    if let Some(user) = opts.user.as_deref().filter(|u| !u.is_empty()) {
        args.extend(["-u".to_string(), user.to_string()]);
    }
    args
}

fn connection_env(opts: &ConnectionOptions) -> Vec<(String, String)> {
    opts.password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| vec![("MYSQL_PWD".to_string(), p.to_string())])
        .unwrap_or_default()
}

/// ERROR 1045 (28000): Access denied for user 'root'@'localhost'
fn is_auth_failure(stderr: &str) -> bool {
    stderr.contains("Access denied for user")
}

fn auth_hint(command: &str) -> String {
    format!("Use --password to provide credentials:\n  herdux --engine mysql --password <password> {command}")
}

fn admin_failure(result: &RunResult, action: &str, name: &str) -> HerduxError {
    let stderr = result.stderr.trim();
    // ERROR 1007 (HY000): Can't create database 'x'; database exists
    if action == "create" && stderr.contains("database exists") {
        return HerduxError::DatabaseExists(name.to_string());
    }
    if is_auth_failure(stderr) {
        return HerduxError::authentication_failed(auth_hint(&format!("{action} \"{name}\"")));
    }
    HerduxError::command_failed(format!("Failed to {action} database \"{name}\": {stderr}"))
}

fn list_query(include_size: bool) -> String {
    if include_size {
        format!(
            "SELECT JSON_ARRAYAGG(JSON_OBJECT('name', schema_name, 'encoding', default_character_set_name, \
             'size', CONCAT(ROUND(size_bytes / 1024), ' kB'), 'size_bytes', size_bytes)) \
             FROM (SELECT s.schema_name, s.default_character_set_name, \
             CAST(SUM(IFNULL(t.data_length + t.index_length, 0)) AS UNSIGNED) AS size_bytes \
             FROM information_schema.schemata s \
             LEFT JOIN information_schema.tables t ON t.table_schema = s.schema_name \
             WHERE s.schema_name NOT IN {SYSTEM_SCHEMAS} \
             GROUP BY s.schema_name, s.default_character_set_name) AS sized;"
        )
    } else {
        format!(
            "SELECT JSON_ARRAYAGG(JSON_OBJECT('name', schema_name, 'encoding', default_character_set_name)) \
             FROM information_schema.schemata WHERE schema_name NOT IN {SYSTEM_SCHEMAS};"
        )
    }
}

impl DatabaseEngine for MySqlEngine {
    fn engine_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn engine_name(&self) -> &'static str {
        "MySQL"
    }

    fn default_connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::default().with_host("localhost").with_port(3306).with_user("root")
    }

    fn default_backup_format(&self) -> BackupFormat {
        BackupFormat::Plain
    }

    fn supported_backup_formats(&self) -> &'static [BackupFormat] {
        &SUPPORTED_FORMATS
    }

    async fn check_client_version(&self) -> Result<String> {
        if !binary_exists(self.runner.as_ref(), "mysql").await {
            return Err(HerduxError::tooling_missing(
                "MySQL client (mysql)",
                format!("Please install the MySQL client tools to continue.\n{INSTALL_HINT}"),
            ));
        }
        Ok(binary_version(self.runner.as_ref(), "mysql")
            .await
            .unwrap_or_else(|| "mysql (version unknown)".to_string()))
    }

    async fn check_backup_requirements(&self) -> Result<()> {
        if !binary_exists(self.runner.as_ref(), "mysqldump").await {
            return Err(HerduxError::tooling_missing(
                "mysqldump",
                format!("Please install the MySQL client tools to enable backup and restore.\n{INSTALL_HINT}"),
            ));
        }
        Ok(())
    }

    async fn discover_instances(&self, opts: &ConnectionOptions) -> Vec<DatabaseInstance> {
        let host = opts.host_or_localhost().to_string();
        let ports = discovery::candidate_ports(&self.scan_ports, &MYSQL_PORTS);
        debug!(?ports, host = %host, "scanning for MySQL servers");

        discovery::scan(&ports, |port| self.probe(opts, &host, port)).await
    }

    async fn server_version(&self, opts: &ConnectionOptions) -> Option<String> {
        let result = self.execute(opts, "SELECT VERSION();", Some(VERSION_TIMEOUT)).await;
        if !result.success() {
            return None;
        }
        let version = result.stdout.trim();
        (!version.is_empty()).then(|| format!("MySQL {version}"))
    }

    async fn list_databases(&self, opts: &ConnectionOptions, include_size: bool) -> Result<Vec<DatabaseInfo>> {
        let timeout = if include_size { None } else { Some(LIST_TIMEOUT) };
        let result = self.execute(opts, &list_query(include_size), timeout).await;
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
        let statement = format!("CREATE DATABASE {};", quote_identifier(name, '`'));
        let result = self.execute(opts, &statement, Some(DEFAULT_TIMEOUT)).await;
        if !result.success() {
            return Err(admin_failure(&result, "create", name));
        }
        info!(database = name, "database created");
        Ok(())
    }

    async fn drop_database(&self, name: &str, opts: &ConnectionOptions) -> Result<()> {
        let statement = format!("DROP DATABASE {};", quote_identifier(name, '`'));
        let result = self.execute(opts, &statement, Some(DEFAULT_TIMEOUT)).await;
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
        self.ensure_plain(format)?;
        let path = prepare_backup_path(db_name, output_dir, format)?;

        let mut args = connection_args(opts);
        args.extend(["--result-file".to_string(), path.display().to_string(), db_name.to_string()]);

        info!(database = db_name, path = %path.display(), "starting backup");
        let result = self
            .runner
            .run("mysqldump", &args, RunOptions::new().envs(connection_env(opts)).no_timeout())
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
        _clean: bool,
    ) -> Result<RestoreReport> {
        // Dumps are SQL whatever their extension, only an explicit custom request is refused
        if let Some(format) = format {
            self.ensure_plain(format)?;
        }
        let file = locate_backup_file(file)?;
        let created_database = ensure_database(self, db_name, opts).await?;

        let mut args = connection_args(opts);
        args.push(db_name.to_string());

        info!(database = db_name, file = %file.display(), "starting restore");
        let result = self
            .runner
            .run("mysql", &args, RunOptions::new().envs(connection_env(opts)).no_timeout().stdin_file(&file))
            .await;
        let status = RestoreExitPolicy::strict().classify(&result);

        Ok(RestoreReport { created_database, outcome: finish_restore(status)? })
    }

    fn health_checks(&self) -> Vec<HealthCheck> {
        let runner = self.runner.clone();
        let defaults = self.default_connection_options();

        vec![
            binary_check(
                self.runner.clone(),
                "mysql",
                "mysql",
                HealthStatus::Error,
                "Please install MySQL client tools.",
            ),
            binary_check(self.runner.clone(), "mysqldump", "mysqldump", HealthStatus::Error, "Backups will not work."),
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
    args.extend(["-e", "SELECT 1;", "--skip-column-names", "--batch"].map(String::from));

    let result = runner
        .run("mysql", &args, RunOptions::new().envs(connection_env(opts)).timeout(CONNECTION_CHECK_TIMEOUT))
        .await;

    let host = opts.host_or_localhost();
    let port = opts.port.unwrap_or(3306);
    if result.success() {
        return HealthCheckResult::success(format!("Successfully connected to MySQL at {host}:{port}"));
    }

    if is_auth_failure(&result.stderr) {
        let user = opts.user.as_deref().unwrap_or("root");
        return HealthCheckResult::error(format!("Access denied for user '{user}'"));
    }
    HealthCheckResult::error(
        "Could not connect to the database. Make sure MySQL is running and port is open.",
    )
}
