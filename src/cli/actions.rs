//! Command handlers
//!
//! Each handler resolves a connection, calls the engine and prints plain text
//! to stdout. Questions go through the context's [`Prompter`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Cli, Command, ConfigCommand, GlobalArgs};
use crate::config::{ConfigKey, ConfigStore, HerduxConfig, ServerProfile};
use crate::engine::{
    overall_status, BackupFormat, ConnectionOptions, DatabaseEngine, DatabaseInfo, Engine, HealthStatus,
};
use crate::error::{HerduxError, Result};
use crate::process::CommandRunner;
use crate::resolve::{default_options, resolve_engine_type, Prompter, ResolvedConnection, Resolver};

/// Backup directory when neither `--output` nor a saved `output` is set
pub const DEFAULT_BACKUP_DIR: &str = "./backups";

const MASKED: &str = "••••••";

/// Everything a handler needs besides its arguments
pub struct Context<'a> {
    pub store: ConfigStore,
    pub config: HerduxConfig,
    pub runner: Arc<dyn CommandRunner>,
    pub prompter: &'a dyn Prompter,
    pub interactive: bool,
}

impl Context<'_> {
    #[must_use]
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.config, self.prompter, self.runner.clone()).interactive(self.interactive)
    }

    async fn connect(&self, global: &GlobalArgs) -> Result<ResolvedConnection> {
        self.resolver().resolve(&global.request()).await
    }

    /// Engine implied by flags and config, without resolving a connection
    fn engine_without_connection(&self, global: &GlobalArgs) -> Engine {
        let profile = global.server.as_deref().and_then(|name| self.config.server(name));
        let engine_type = resolve_engine_type(global.engine, profile, self.config.defaults());
        self.resolver().engine_for(engine_type)
    }
}

/// Run the parsed command
pub async fn execute(cli: &Cli, ctx: &Context<'_>) -> Result<()> {
    let global = &cli.global;
    match &cli.command {
        Command::Version => version(ctx, global).await,
        Command::List { size } => list(ctx, global, *size).await,
        Command::Create { name } => create(ctx, global, name).await,
        Command::Drop { name, yes } => drop_database(ctx, global, name, *yes).await,
        Command::Backup { database, output, format, drop, yes } => {
            backup(ctx, global, database, output.as_deref(), *format, *drop, *yes).await
        }
        Command::Restore { file, database, format, no_clean } => {
            restore(ctx, global, file, database, *format, !no_clean).await
        }
        Command::Clean => clean(ctx, global).await,
        Command::Doctor => doctor(ctx, global).await,
        Command::Config(command) => config(&ctx.store, global, command),
    }
}

async fn version(ctx: &Context<'_>, global: &GlobalArgs) -> Result<()> {
    let engine = ctx.engine_without_connection(global);
    let client = engine.check_client_version().await?;
    println!("\n{} Client", engine.engine_name());
    println!("   {client}\n");

    let opts = default_options(&global.connection(), ctx.config.defaults());
    let instances = engine.discover_instances(&opts).await;
    if instances.is_empty() {
        println!("   No servers detected on common ports.");
        println!("   Use --port to specify a custom port.\n");
    } else {
        println!("Running Servers ({})", instances.len());
        for instance in &instances {
            println!("   :{} {}", instance.port, instance.version_label());
        }
        println!();
    }

    println!("herdux");
    println!("   v{}\n", env!("CARGO_PKG_VERSION"));
    Ok(())
}

async fn list(ctx: &Context<'_>, global: &GlobalArgs, include_size: bool) -> Result<()> {
    let conn = ctx.connect(global).await?;
    conn.engine.check_client_version().await?;

    let databases = conn.engine.list_databases(&conn.opts, include_size).await?;
    println!("Found {} database(s)\n", databases.len());
    if databases.is_empty() {
        println!("  No databases found.\n");
        return Ok(());
    }

    println!("{}\n", format_database_table(&databases, include_size));
    Ok(())
}

async fn create(ctx: &Context<'_>, global: &GlobalArgs, name: &str) -> Result<()> {
    let conn = ctx.connect(global).await?;
    conn.engine.check_client_version().await?;
    conn.engine.create_database(name, &conn.opts).await?;
    println!("✔ Database \"{name}\" created successfully\n");
    Ok(())
}

async fn drop_database(ctx: &Context<'_>, global: &GlobalArgs, name: &str, yes: bool) -> Result<()> {
    let conn = ctx.connect(global).await?;
    conn.engine.check_client_version().await?;

    let message = format!("Are you sure you want to drop database \"{name}\"? This action is irreversible.");
    if !yes && !ctx.prompter.confirm(&message, false)? {
        println!("\n⚠ Operation cancelled.\n");
        return Ok(());
    }

    conn.engine.drop_database(name, &conn.opts).await?;
    println!("✔ Database \"{name}\" dropped successfully\n");
    Ok(())
}

async fn backup(
    ctx: &Context<'_>,
    global: &GlobalArgs,
    database: &str,
    output: Option<&Path>,
    format: Option<BackupFormat>,
    drop_after: bool,
    yes: bool,
) -> Result<()> {
    let conn = ctx.connect(global).await?;
    let engine = &conn.engine;
    engine.check_client_version().await?;
    engine.check_backup_requirements().await?;

    let format = format.unwrap_or_else(|| engine.default_backup_format());
    let dir = backup_dir(output, &ctx.config);
    println!("Generating backup for \"{database}\"...");
    let path = engine.backup_database(database, &dir, &conn.opts, format).await?;
    println!("✔ Backup saved at {}\n", path.display());

    if !drop_after {
        return Ok(());
    }

    let message = format!("Are you sure you want to drop the database \"{database}\"?");
    if yes || ctx.prompter.confirm(&message, false)? {
        engine.drop_database(database, &conn.opts).await?;
        println!("✔ Database \"{database}\" dropped successfully\n");
    } else {
        println!("  Skipped dropping database \"{database}\".\n");
    }
    Ok(())
}

async fn restore(
    ctx: &Context<'_>,
    global: &GlobalArgs,
    file: &Path,
    database: &str,
    format: Option<BackupFormat>,
    clean: bool,
) -> Result<()> {
    let conn = ctx.connect(global).await?;
    conn.engine.check_client_version().await?;

    println!("Restoring \"{}\" into database \"{database}\"...", file.display());
    let report = conn.engine.restore_database(file, database, &conn.opts, format, clean).await?;

    println!("✔ Database \"{database}\" restored successfully from {}", file.display());
    if report.created_database {
        println!("  ↳ Note: Database did not exist and was automatically created.");
    }
    if let Some(warnings) = report.outcome.warnings() {
        println!("⚠ The restore tool reported warnings (objects it could not recreate):");
        for line in warnings.lines().map(str::trim).filter(|l| !l.is_empty()) {
            println!("    {line}");
        }
    }
    println!();
    Ok(())
}

/// Result of dropping a batch of databases
#[derive(Debug, Default)]
pub struct CleanReport {
    pub dropped: Vec<String>,
    pub failed: Vec<(String, HerduxError)>,
}

/// Back up every database, stopping at the first failure
pub async fn backup_all<E: DatabaseEngine>(
    engine: &E,
    opts: &ConnectionOptions,
    databases: &[String],
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let format = engine.default_backup_format();
    let mut paths = Vec::with_capacity(databases.len());
    for database in databases {
        paths.push(engine.backup_database(database, dir, opts, format).await?);
    }
    Ok(paths)
}

/// Drop every database, continuing past individual failures
pub async fn drop_all<E: DatabaseEngine>(
    engine: &E,
    opts: &ConnectionOptions,
    databases: &[String],
) -> CleanReport {
    let mut report = CleanReport::default();
    for database in databases {
        match engine.drop_database(database, opts).await {
            Ok(()) => report.dropped.push(database.clone()),
            Err(err) => {
                warn!(database = %database, error = %err, "drop failed");
                report.failed.push((database.clone(), err));
            }
        }
    }
    report
}

async fn clean(ctx: &Context<'_>, global: &GlobalArgs) -> Result<()> {
    let conn = ctx.connect(global).await?;
    let engine = &conn.engine;
    engine.check_client_version().await?;

    let databases = engine.list_databases(&conn.opts, false).await?;
    if databases.is_empty() {
        println!("  No databases found to clean.\n");
        return Ok(());
    }

    let labels: Vec<String> = databases
        .iter()
        .map(|db| format!("{} (owner: {})", db.name, db.owner.as_deref().unwrap_or("?")))
        .collect();
    let selected: Vec<String> = ctx
        .prompter
        .multi_select("Select databases to DROP (Space to select, Enter to confirm):", &labels)?
        .into_iter()
        .filter_map(|i| databases.get(i).map(|db| db.name.clone()))
        .collect();
    if selected.is_empty() {
        println!("\n⚠ Clean operation cancelled.\n");
        return Ok(());
    }
    println!("\nYou selected {} database(s) for deletion.", selected.len());

    if ctx.prompter.confirm("Would you like to backup these databases before dropping them?", true)? {
        engine.check_backup_requirements().await?;
        println!("\nStarting backups...");
        match backup_all(engine, &conn.opts, &selected, &backup_dir(None, &ctx.config)).await {
            Ok(paths) => {
                for path in paths {
                    println!("  ✔ Saved to {}", path.display());
                }
            }
            Err(err) => {
                println!("\n⚠ Aborting clean process to prevent data loss without backup.");
                return Err(err);
            }
        }
    }

    let message = format!(
        "Are you absolutely sure you want to DROP {} database(s)? This action is irreversible.",
        selected.len()
    );
    if !ctx.prompter.confirm(&message, false)? {
        println!("\n⚠ Clean operation aborted.\n");
        return Ok(());
    }

    println!();
    let report = drop_all(engine, &conn.opts, &selected).await;
    for name in &report.dropped {
        println!("  ✔ Dropped \"{name}\"");
    }
    for (name, err) in &report.failed {
        println!("  ✖ Failed to drop \"{name}\"");
        println!("    ↳ {err}");
    }
    println!("\n✔ Clean operation completed!\n");
    Ok(())
}

async fn doctor(ctx: &Context<'_>, global: &GlobalArgs) -> Result<()> {
    println!("\nherdux Doctor - System Health Check\n");

    // Tooling checks still run when no server can be reached
    let (engine, opts) = match ctx.connect(global).await {
        Ok(conn) => (conn.engine, conn.opts),
        Err(HerduxError::Cancelled) => return Err(HerduxError::Cancelled),
        Err(err) => {
            warn!(error = %err, "no connection resolved, checking against defaults");
            let opts = default_options(&global.connection(), ctx.config.defaults());
            (ctx.engine_without_connection(global), opts)
        }
    };

    let mut results = Vec::new();
    for check in engine.health_checks() {
        debug!(check = %check.name, "{}", check.pending_message);
        let result = check.run(&opts).await;
        println!("{} {}", status_symbol(result.status), result.message);
        results.push(result);
    }
    println!();

    match overall_status(&results) {
        HealthStatus::Success => println!("✔ Your system is fully equipped to run herdux commands!\n"),
        HealthStatus::Warn => println!("⚠ Some optional dependencies are missing. Please review the warnings above.\n"),
        HealthStatus::Error => {
            let failed = results.iter().filter(|r| r.status == HealthStatus::Error).count();
            return Err(HerduxError::HealthChecksFailed { failed });
        }
    }
    Ok(())
}

const fn status_symbol(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Success => "✔",
        HealthStatus::Warn => "⚠",
        HealthStatus::Error => "✖",
    }
}

fn config(store: &ConfigStore, global: &GlobalArgs, command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Set { key, value } => {
            store.set_default(*key, value)?;
            println!("✔ Default {key} set to {}", display_value(*key, value));
            println!("  Saved to {}", store.path().display());
        }
        ConfigCommand::Get { key } => match store.default_value(*key)? {
            Some(value) => println!("{key}: {}", display_value(*key, &value)),
            None => println!("⚠ No value set for \"{key}\""),
        },
        ConfigCommand::List => {
            let config = store.load()?;
            println!("{}\n", format_config_listing(&config, store.path()));
        }
        ConfigCommand::Reset => {
            store.reset()?;
            println!("✔ Configuration reset successfully");
        }
        ConfigCommand::AddServer { name } => {
            let profile = ServerProfile { connection: global.connection(), engine: global.engine };
            if profile.connection.is_empty() && profile.engine.is_none() {
                return Err(HerduxError::config_error(
                    "Provide at least one option (--engine, --host, --port, --user, --password)",
                ));
            }
            let saved = store.add_server(name, &profile)?;
            println!("✔ Server profile \"{name}\" saved");
            println!("  {}", describe_profile(&saved));
        }
        ConfigCommand::RemoveServer { name } => {
            if store.remove_server(name)? {
                println!("✔ Server profile \"{name}\" removed");
            } else {
                println!("⚠ Server profile \"{name}\" not found");
            }
        }
        ConfigCommand::ScanPorts { ports } => {
            store.set_scan_ports(ports.clone())?;
            println!("✔ Scan ports set to: {}", join_ports(ports));
        }
    }
    Ok(())
}

/// `--output`, else the saved `output` default, else `./backups`
#[must_use]
pub fn backup_dir(flag: Option<&Path>, config: &HerduxConfig) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| config.defaults().output.as_deref().filter(|o| !o.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR))
}

fn display_value(key: ConfigKey, value: &str) -> String {
    if key == ConfigKey::Password {
        MASKED.to_string()
    } else {
        value.to_string()
    }
}

fn join_ports(ports: &[u16]) -> String {
    ports.iter().map(u16::to_string).collect::<Vec<_>>().join(", ")
}

/// `engine=mysql, host=db, port=3307, user=root, password=••••••`
fn describe_profile(profile: &ServerProfile) -> String {
    let conn = &profile.connection;
    let mut parts = Vec::new();
    if let Some(engine) = profile.engine {
        parts.push(format!("engine={engine}"));
    }
    if let Some(host) = conn.host.as_deref().filter(|h| !h.is_empty()) {
        parts.push(format!("host={host}"));
    }
    if let Some(port) = conn.port {
        parts.push(format!("port={port}"));
    }
    if let Some(user) = conn.user.as_deref().filter(|u| !u.is_empty()) {
        parts.push(format!("user={user}"));
    }
    if conn.password.as_deref().is_some_and(|p| !p.is_empty()) {
        parts.push(format!("password={MASKED}"));
    }
    parts.join(", ")
}

/// Aligned table for `list`; trailing padding is trimmed
#[must_use]
pub fn format_database_table(databases: &[DatabaseInfo], include_size: bool) -> String {
    let (owner_width, encoding_width) = (15, 12);
    let size_width = if include_size { 15 } else { 0 };
    let longest = databases.iter().map(|db| db.name.chars().count()).max().unwrap_or(0);
    let name_width = longest.max(15) + 5;

    let mut header = format!("  {:<name_width$}{:<owner_width$}{:<encoding_width$}", "DATABASE", "OWNER", "ENCODING");
    if include_size {
        header.push_str("SIZE");
    }

    let rule = "─".repeat(name_width + owner_width + encoding_width + size_width - 4);
    let mut lines = vec![header.trim_end().to_string(), format!("  {rule}")];

    for db in databases {
        let mut row = format!(
            "  {:<name_width$}{:<owner_width$}{:<encoding_width$}",
            db.name,
            db.owner.as_deref().unwrap_or(""),
            db.encoding.as_deref().unwrap_or("")
        );
        if include_size {
            row.push_str(db.size.as_deref().unwrap_or(""));
        }
        lines.push(row.trim_end().to_string());
    }
    lines.join("\n")
}

/// Text for `config list`; passwords are masked
#[must_use]
pub fn format_config_listing(config: &HerduxConfig, path: &Path) -> String {
    let mut lines = vec!["Herdux Configuration".to_string(), String::new()];

    let defaults = config.defaults();
    let saved: Vec<(ConfigKey, String)> =
        ConfigKey::ALL.iter().filter_map(|key| defaults.value(*key).map(|value| (*key, value))).collect();
    if saved.is_empty() {
        lines.push("  No default connection configured.".to_string());
    } else {
        lines.push("  Default Connection:".to_string());
        for (key, value) in saved {
            lines.push(format!("    {key}: {}", display_value(key, &value)));
        }
    }
    lines.push(String::new());

    if config.servers().is_empty() {
        lines.push("  No server profiles configured.".to_string());
    } else {
        lines.push("  Server Profiles:".to_string());
        for (name, profile) in config.servers() {
            lines.push(format!("    {name}: {}", describe_profile(profile)));
        }
    }

    if !config.scan_ports().is_empty() {
        lines.push(String::new());
        lines.push("  Custom Scan Ports:".to_string());
        lines.push(format!("    {}", join_ports(config.scan_ports())));
    }

    lines.push(String::new());
    lines.push(format!("  Config file: {}", path.display()));
    lines.join("\n")
}
