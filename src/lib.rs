//! Herdux - Database Management CLI
//!
//! Herdux manages local and remote PostgreSQL and MySQL servers by driving the
//! vendors' own client binaries (`psql`, `pg_dump`, `pg_restore`, `mysql`,
//! `mysqldump`, `mysqladmin`). It never speaks a wire protocol itself.
//!
//! # Architecture
//! The binary is a thin wrapper: it parses arguments, resolves which engine and
//! server to talk to, and calls into the engines exposed here.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`process`] - Subprocess execution behind the [`CommandRunner`] trait
//! - [`engine`] - Engine capability trait, Postgres and MySQL engines, factory
//! - [`discovery`] - Concurrent port scanning
//! - [`config`] - Saved defaults, server profiles and scan ports
//! - [`resolve`] - Flag/profile/default/discovery precedence
//! - [`cli`] - Argument definitions and command handlers

pub mod cli;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod process;
pub mod resolve;

pub use config::{ConfigKey, ConfigStore, HerduxConfig, SavedDefaults, ServerProfile};
pub use engine::{
    create_engine, create_engine_with, BackupFormat, ConnectionOptions, DatabaseEngine, DatabaseInfo,
    DatabaseInstance, DatabaseType, Engine, EngineContext, RestoreOutcome, RestoreReport,
};
pub use error::{HerduxError, Result};
pub use process::{CommandRunner, RunOptions, RunResult, ScriptedRunner, SystemRunner};
pub use resolve::{ConnectionRequest, Prompter, ResolvedConnection, Resolver, TerminalPrompter};
