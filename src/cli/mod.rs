//! Command-line surface
//!
//! Argument definitions only. Every database command resolves its engine and
//! connection first and then hands off to [`actions`].

pub mod actions;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::ConfigKey;
use crate::engine::{BackupFormat, ConnectionOptions, DatabaseType};
use crate::resolve::ConnectionRequest;

pub use actions::{
    backup_all, backup_dir, drop_all, execute, format_config_listing, format_database_table, CleanReport, Context,
};

/// Herdux - PostgreSQL and MySQL management on top of the native client tools
#[derive(Debug, Parser)]
#[command(name = "herdux")]
#[command(about = "A database management CLI for PostgreSQL and MySQL")]
#[command(version)]
#[command(after_help = "Examples:
  herdux list
  herdux backup mydb --output /tmp/backups
  herdux restore backup.dump --db mydb
  herdux --engine mysql list
  herdux --host 192.168.1.1 --user admin backup mydb")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection flags accepted by every command
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Database host
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// Database port (auto-detected if omitted)
    #[arg(short, long, global = true, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Database user
    #[arg(short = 'U', long, global = true)]
    pub user: Option<String>,

    /// Database password
    #[arg(short = 'W', long, global = true)]
    pub password: Option<String>,

    /// Use a named server profile from config
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    /// Database engine (postgres, mysql)
    #[arg(short, long, global = true)]
    pub engine: Option<DatabaseType>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Connection fields given on the command line
    #[must_use]
    pub fn connection(&self) -> ConnectionOptions {
        ConnectionOptions {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    #[must_use]
    pub fn request(&self) -> ConnectionRequest {
        ConnectionRequest { engine: self.engine, server: self.server.clone(), connection: self.connection() }
    }

    /// Default tracing filter for the `-v` count
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show client version, running servers and the herdux version
    Version,

    /// List all databases
    #[command(visible_alias = "ls")]
    List {
        /// Include database sizes (sorted from largest to smallest)
        #[arg(short = 'S', long)]
        size: bool,
    },

    /// Create a new database
    Create { name: String },

    /// Drop a database
    Drop {
        name: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Create a backup of a database
    Backup {
        database: String,

        /// Output directory (default: saved `output`, else ./backups)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Backup format (custom, plain); engine default if omitted
        #[arg(short = 'F', long)]
        format: Option<BackupFormat>,

        /// Offer to drop the database after a successful backup
        #[arg(short, long)]
        drop: bool,

        /// Skip the drop confirmation
        #[arg(short, long, requires = "drop")]
        yes: bool,
    },

    /// Restore a backup file, creating the database if it is missing
    Restore {
        file: PathBuf,

        /// Target database name
        #[arg(long = "db", value_name = "NAME")]
        database: String,

        /// Override format detection (custom, plain)
        #[arg(short = 'F', long)]
        format: Option<BackupFormat>,

        /// Keep existing objects instead of dropping them before a custom restore
        #[arg(long)]
        no_clean: bool,
    },

    /// Interactively drop several databases, optionally backing them up first
    Clean,

    /// Check client tooling and connectivity
    Doctor,

    /// Manage saved defaults, server profiles and scan ports
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Set a default value (host, port, user, password, output, engine)
    Set { key: ConfigKey, value: String },

    /// Show a default value
    Get { key: ConfigKey },

    /// Show all saved configuration
    #[command(visible_alias = "ls")]
    List,

    /// Delete all saved configuration
    Reset,

    /// Save a server profile from the global --engine/--host/--port/--user/--password flags
    #[command(visible_alias = "add")]
    AddServer { name: String },

    /// Remove a server profile
    #[command(visible_alias = "rm")]
    RemoveServer { name: String },

    /// Ports probed during auto-discovery
    #[command(visible_alias = "scan")]
    ScanPorts {
        #[arg(required = true, num_args = 1.., value_parser = clap::value_parser!(u16).range(1..))]
        ports: Vec<u16>,
    },
}

impl Command {
    /// Whether the command talks to a database server
    #[must_use]
    pub const fn needs_connection(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("herdux").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["list", "-p", "5417", "-U", "admin", "-e", "mysql", "-vv"]);
        assert_eq!(cli.global.port, Some(5417));
        assert_eq!(cli.global.user.as_deref(), Some("admin"));
        assert_eq!(cli.global.engine, Some(DatabaseType::MySQL));
        assert_eq!(cli.global.log_level(), "debug");
        assert!(matches!(cli.command, Command::List { size: false }));
    }

    #[test]
    fn test_request_carries_flags() {
        let cli = parse(&["-s", "pg17", "-H", "db.internal", "ls", "-S"]);
        let request = cli.global.request();
        assert_eq!(request.server.as_deref(), Some("pg17"));
        assert_eq!(request.connection.host.as_deref(), Some("db.internal"));
        assert_eq!(request.engine, None);
        assert!(matches!(cli.command, Command::List { size: true }));
    }

    #[test]
    fn test_port_range() {
        assert!(Cli::try_parse_from(["herdux", "-p", "0", "list"]).is_err());
        assert!(Cli::try_parse_from(["herdux", "-p", "65536", "list"]).is_err());
        assert!(Cli::try_parse_from(["herdux", "-p", "abc", "list"]).is_err());
        assert_eq!(parse(&["-p", "65535", "list"]).global.port, Some(65535));
    }

    #[test]
    fn test_engine_and_format_validation() {
        assert!(Cli::try_parse_from(["herdux", "-e", "oracle", "list"]).is_err());
        assert!(Cli::try_parse_from(["herdux", "backup", "app", "-F", "tar"]).is_err());

        let cli = parse(&["backup", "app", "-F", "plain", "-o", "/tmp/b", "-d", "-y"]);
        match cli.command {
            Command::Backup { database, output, format, drop, yes } => {
                assert_eq!(database, "app");
                assert_eq!(output, Some(PathBuf::from("/tmp/b")));
                assert_eq!(format, Some(BackupFormat::Plain));
                assert!(drop && yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_backup_yes_requires_drop() {
        assert!(Cli::try_parse_from(["herdux", "backup", "app", "-y"]).is_err());
    }

    #[test]
    fn test_restore_requires_db() {
        assert!(Cli::try_parse_from(["herdux", "restore", "app.dump"]).is_err());

        let cli = parse(&["restore", "app.dump", "--db", "app", "--no-clean"]);
        match cli.command {
            Command::Restore { file, database, format, no_clean } => {
                assert_eq!(file, PathBuf::from("app.dump"));
                assert_eq!(database, "app");
                assert_eq!(format, None);
                assert!(no_clean);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_subcommands() {
        let cli = parse(&["config", "set", "port", "5417"]);
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Set { key: ConfigKey::Port, .. })));
        assert!(!cli.command.needs_connection());

        assert!(Cli::try_parse_from(["herdux", "config", "set", "colour", "red"]).is_err());

        let cli = parse(&["config", "scan", "5432", "5433"]);
        match cli.command {
            Command::Config(ConfigCommand::ScanPorts { ports }) => assert_eq!(ports, vec![5432, 5433]),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["herdux", "config", "scan-ports"]).is_err());

        let cli = parse(&["-p", "5417", "config", "add", "pg17"]);
        assert!(matches!(cli.command, Command::Config(ConfigCommand::AddServer { ref name }) if name == "pg17"));
        assert_eq!(cli.global.port, Some(5417));
    }
}
