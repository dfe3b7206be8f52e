//! Connection & Engine Resolution
//!
//! Every command starts here: explicit flags, the selected server profile, the
//! saved defaults and, as a last resort, a discovery scan are merged into one
//! engine plus one set of connection options.
//!
//! # Precedence
//! - Engine: `--engine` > profile engine > saved default engine > `postgres`
//! - With a profile: flag > profile > engine default (host and user only)
//! - Without a profile: flag > saved default; no port means discovery
//!
//! The precedence rules are plain functions over their inputs. Prompting goes
//! through the [`Prompter`] trait and subprocesses through the injected
//! [`CommandRunner`], so the whole resolver runs in tests without a terminal.

use std::io::IsTerminal;
use std::sync::Arc;

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, MultiSelect, Select};
use tracing::info;

use crate::config::{HerduxConfig, SavedDefaults, ServerProfile};
use crate::engine::{
    create_engine_with, ConnectionOptions, DatabaseEngine, DatabaseInstance, DatabaseType, Engine, EngineContext,
};
use crate::error::{HerduxError, Result};
use crate::process::CommandRunner;

/// Set to `1` to treat the session as interactive even without a terminal
pub const FORCE_TTY_ENV: &str = "HERDUX_FORCE_TTY";

/// Connection settings given explicitly on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub engine: Option<DatabaseType>,
    pub server: Option<String>,
    pub connection: ConnectionOptions,
}

/// Outcome of resolution: the engine to talk to and how to reach it
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub engine: Engine,
    pub engine_type: DatabaseType,
    pub opts: ConnectionOptions,
    /// Profile the options came from, if any
    pub server: Option<String>,
}

/// Interactive questions asked by the resolver and the commands
pub trait Prompter: Send + Sync {
    /// Pick one of several choices; `Ok(None)` means the prompt was dismissed
    fn select(&self, message: &str, choices: &[String]) -> Result<Option<usize>>;

    /// Yes/no question
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    /// Pick any number of choices; an empty selection means nothing was chosen
    fn multi_select(&self, message: &str, choices: &[String]) -> Result<Vec<usize>>;
}

/// [`Prompter`] backed by the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&self, message: &str, choices: &[String]) -> Result<Option<usize>> {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(choices)
            .default(0)
            .interact_opt()
            .map_err(|e| HerduxError::interaction(e.to_string()))
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(default)
            .interact_opt()
            .map(|answer| answer.unwrap_or(false))
            .map_err(|e| HerduxError::interaction(e.to_string()))
    }

    fn multi_select(&self, message: &str, choices: &[String]) -> Result<Vec<usize>> {
        MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(choices)
            .interact_opt()
            .map(Option::unwrap_or_default)
            .map_err(|e| HerduxError::interaction(e.to_string()))
    }
}

/// Whether prompts can be shown
#[must_use]
pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal() || std::env::var(FORCE_TTY_ENV).is_ok_and(|v| v == "1")
}

/// One entry of the connection picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCandidate {
    /// The saved defaults
    Default { port: Option<u16>, engine: DatabaseType },
    /// A named profile
    Server { name: String, port: Option<u16>, engine: Option<DatabaseType> },
}

impl ConnectionCandidate {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Default { port, engine } => {
                format!("Default connection (port {}, engine: {engine})", port_label(*port))
            }
            Self::Server { name, port, engine: Some(engine) } => {
                format!("{name} (port {}, engine: {engine})", port_label(*port))
            }
            Self::Server { name, port, engine: None } => format!("{name} (port {})", port_label(*port)),
        }
    }

    /// Profile name, `None` for the saved defaults
    #[must_use]
    pub fn server_name(&self) -> Option<&str> {
        match self {
            Self::Default { .. } => None,
            Self::Server { name, .. } => Some(name),
        }
    }
}

fn port_label(port: Option<u16>) -> String {
    port.map_or_else(|| "?".to_string(), |p| p.to_string())
}

/// `--engine` > profile engine > saved default engine > `postgres`
#[must_use]
pub fn resolve_engine_type(
    flag: Option<DatabaseType>,
    profile: Option<&ServerProfile>,
    defaults: &SavedDefaults,
) -> DatabaseType {
    flag.or_else(|| profile.and_then(|p| p.engine)).or(defaults.engine).unwrap_or_default()
}

/// Options for a selected profile
///
/// Flags win over profile values. Host and user fall back to the engine's
/// defaults; port and password never do.
#[must_use]
pub fn profile_options(
    flags: &ConnectionOptions,
    profile: &ServerProfile,
    engine_defaults: &ConnectionOptions,
) -> ConnectionOptions {
    let layered = flags.layered_over(&profile.connection);
    let fallback = ConnectionOptions {
        host: engine_defaults.host.clone(),
        user: engine_defaults.user.clone(),
        ..ConnectionOptions::default()
    };
    layered.layered_over(&fallback)
}

/// Options without a profile: flags over saved defaults
#[must_use]
pub fn default_options(flags: &ConnectionOptions, defaults: &SavedDefaults) -> ConnectionOptions {
    flags.layered_over(&defaults.connection)
}

/// Entries offered by the connection picker, saved defaults first
///
/// With `requested` set, only profiles that would resolve to that engine are
/// offered, and the saved defaults only when their engine matches.
#[must_use]
pub fn connection_candidates(config: &HerduxConfig, requested: Option<DatabaseType>) -> Vec<ConnectionCandidate> {
    let defaults = config.defaults();
    let default_engine = defaults.engine.unwrap_or_default();
    let compatible = |engine: DatabaseType| requested.map_or(true, |r| r == engine);

    let mut candidates = Vec::new();
    if defaults.has_connection() && compatible(default_engine) {
        candidates.push(ConnectionCandidate::Default { port: defaults.connection.port, engine: default_engine });
    }

    for (name, profile) in config.servers() {
        if compatible(profile.engine.unwrap_or(default_engine)) {
            candidates.push(ConnectionCandidate::Server {
                name: name.clone(),
                port: profile.connection.port,
                engine: profile.engine,
            });
        }
    }
    candidates
}

/// Remediation text for an empty discovery scan
#[must_use]
pub fn no_server_guidance(engine_name: &str) -> String {
    format!(
        "Could not find any {engine_name} server on common ports.\n\
         Options:\n  \
         1. Specify port: herdux --port 5417 list\n  \
         2. Save defaults: herdux config set port 5417\n  \
         3. Add server:    herdux config add-server pg17 --port 5417"
    )
}

/// Remediation text for an unknown profile name
#[must_use]
pub fn unknown_profile_guidance(config: &HerduxConfig) -> String {
    let mut lines = vec!["Available profiles:".to_string()];
    if config.servers().is_empty() {
        lines.push("  (none)".to_string());
        lines.push("  Add one with: herdux config add-server <name> --port <port> --password <pw>".to_string());
    } else {
        for (name, profile) in config.servers() {
            lines.push(format!("  {name}: port={}", port_label(profile.connection.port)));
        }
    }
    lines.join("\n")
}

fn instance_label(instance: &DatabaseInstance) -> String {
    format!("Port {} - {}", instance.port, instance.version_label())
}

/// Merges flags, profiles, defaults and discovery into a [`ResolvedConnection`]
pub struct Resolver<'a> {
    config: &'a HerduxConfig,
    prompter: &'a dyn Prompter,
    runner: Arc<dyn CommandRunner>,
    interactive: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a HerduxConfig, prompter: &'a dyn Prompter, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, prompter, runner, interactive: false }
    }

    #[must_use]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Engine built with this resolver's runner and the config's scan settings
    #[must_use]
    pub fn engine_for(&self, engine_type: DatabaseType) -> Engine {
        let ctx = EngineContext {
            runner: self.runner.clone(),
            scan_ports: self.config.scan_ports().to_vec(),
            restore_fatal_exit_codes: self.config.restore_fatal_exit_codes().map(<[i32]>::to_vec),
        };
        create_engine_with(Some(engine_type), &ctx)
    }

    pub async fn resolve(&self, request: &ConnectionRequest) -> Result<ResolvedConnection> {
        let flags = &request.connection;
        let mut server = request.server.clone().filter(|s| !s.is_empty());

        let nothing_pinned = server.is_none()
            && flags.port.is_none()
            && flags.host.as_deref().map_or(true, str::is_empty);
        if nothing_pinned && self.interactive {
            if let Some(candidate) = self.pick_candidate(request.engine)? {
                server = candidate.server_name().map(String::from);
            }
        }

        let profile = server.as_deref().and_then(|name| self.config.server(name));
        let engine_type = resolve_engine_type(request.engine, profile, self.config.defaults());
        let engine = self.engine_for(engine_type);

        if let Some(name) = server {
            let profile = profile.ok_or_else(|| HerduxError::UnknownProfile {
                name: name.clone(),
                guidance: unknown_profile_guidance(self.config),
            })?;
            let opts = profile_options(flags, profile, &engine.default_connection_options());
            return Ok(ResolvedConnection { engine, engine_type, opts, server: Some(name) });
        }

        let merged = default_options(flags, self.config.defaults());
        if merged.port.is_some() {
            return Ok(ResolvedConnection { engine, engine_type, opts: merged, server: None });
        }

        let port = self.discover_port(&engine, &merged).await?;
        Ok(ResolvedConnection { engine, engine_type, opts: merged.with_port(port), server: None })
    }

    fn pick_candidate(&self, requested: Option<DatabaseType>) -> Result<Option<ConnectionCandidate>> {
        let mut candidates = connection_candidates(self.config, requested);
        match candidates.len() {
            0 => Ok(None),
            1 => {
                let candidate = candidates.remove(0);
                info!(connection = %candidate.label(), "auto-selected connection");
                Ok(Some(candidate))
            }
            _ => {
                let labels: Vec<String> = candidates.iter().map(ConnectionCandidate::label).collect();
                let index = self
                    .prompter
                    .select("Select a connection to use:", &labels)?
                    .ok_or(HerduxError::Cancelled)?;
                Ok(candidates.into_iter().nth(index))
            }
        }
    }

    async fn discover_port(&self, engine: &Engine, merged: &ConnectionOptions) -> Result<u16> {
        let engine_name = engine.engine_name();
        let mut instances = engine.discover_instances(merged).await;

        match instances.len() {
            0 => Err(HerduxError::NoServerFound {
                engine: engine_name.to_string(),
                guidance: no_server_guidance(engine_name),
            }),
            1 => {
                let instance = instances.remove(0);
                info!(port = instance.port, version = instance.version_label(), "auto-detected server");
                Ok(instance.port)
            }
            _ if !self.interactive => Err(HerduxError::MultipleServersFound {
                engine: engine_name.to_string(),
                listing: instances.iter().map(|i| format!("  {}", instance_label(i))).collect::<Vec<_>>().join("\n"),
            }),
            _ => {
                let labels: Vec<String> = instances.iter().map(instance_label).collect();
                let message = format!("Multiple {engine_name} servers found. Which one do you want to use?");
                let index = self.prompter.select(&message, &labels)?.ok_or(HerduxError::Cancelled)?;
                instances.get(index).map(|i| i.port).ok_or(HerduxError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use crate::process::{RunResult, ScriptedRunner};

    /// Answers prompts from a queue and records what was asked
    #[derive(Default)]
    struct CannedPrompter {
        answers: Mutex<VecDeque<Option<usize>>>,
        asked: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CannedPrompter {
        fn answering(answers: &[Option<usize>]) -> Self {
            Self { answers: Mutex::new(answers.iter().copied().collect()), ..Self::default() }
        }

        fn asked(&self) -> Vec<(String, Vec<String>)> {
            self.asked.lock().unwrap().clone()
        }
    }

    impl Prompter for CannedPrompter {
        fn select(&self, message: &str, choices: &[String]) -> Result<Option<usize>> {
            self.asked.lock().unwrap().push((message.to_string(), choices.to_vec()));
            Ok(self.answers.lock().unwrap().pop_front().flatten())
        }

        fn confirm(&self, _message: &str, _default: bool) -> Result<bool> {
            Ok(false)
        }

        fn multi_select(&self, _message: &str, _choices: &[String]) -> Result<Vec<usize>> {
            Ok(Vec::new())
        }
    }

    fn profile(port: u16, engine: Option<DatabaseType>) -> ServerProfile {
        ServerProfile { connection: ConnectionOptions::default().with_port(port), engine }
    }

    fn config_with_servers(servers: &[(&str, ServerProfile)]) -> HerduxConfig {
        let mut config = HerduxConfig::default();
        for (name, p) in servers {
            config.servers.insert((*name).to_string(), p.clone());
        }
        config
    }

    fn pg_ready_on(ports: &[u16]) -> ScriptedRunner {
        let mut runner = ScriptedRunner::new();
        for port in ports {
            runner = runner
                .on_args("pg_isready", &format!("-p {port}"), RunResult::ok("accepting connections"))
                .on_args("psql", &format!("-p {port}"), RunResult::ok(format!("PostgreSQL 16.{port}, compiled")));
        }
        runner.on("pg_isready", RunResult::exited(2, "no response"))
    }

    fn opts_with(host: bool, port: bool, user: bool, password: bool, tag: &str) -> ConnectionOptions {
        ConnectionOptions {
            host: host.then(|| format!("{tag}-host")),
            port: port.then_some(match tag {
                "flag" => 1001,
                "profile" => 2002,
                "saved" => 3003,
                _ => 4004,
            }),
            user: user.then(|| format!("{tag}-user")),
            password: password.then(|| format!("{tag}-pw")),
        }
    }

    #[test]
    fn test_engine_precedence() {
        let defaults = SavedDefaults { engine: Some(DatabaseType::MySQL), ..SavedDefaults::default() };
        let pg_profile = profile(5417, Some(DatabaseType::Postgres));
        let bare_profile = profile(5417, None);

        assert_eq!(
            resolve_engine_type(Some(DatabaseType::MySQL), Some(&pg_profile), &defaults),
            DatabaseType::MySQL
        );
        assert_eq!(resolve_engine_type(None, Some(&pg_profile), &defaults), DatabaseType::Postgres);
        assert_eq!(resolve_engine_type(None, Some(&bare_profile), &defaults), DatabaseType::MySQL);
        assert_eq!(resolve_engine_type(None, None, &SavedDefaults::default()), DatabaseType::Postgres);
    }

    /// Every presence combination of every field across all levels
    #[test]
    fn test_highest_present_level_wins_for_every_combination() {
        let engine_defaults = ConnectionOptions::default().with_host("engine-host").with_port(4004).with_user("engine-user");

        for mask in 0u32..(1 << 12) {
            let bit = |n: u32| mask & (1 << n) != 0;
            let flags = opts_with(bit(0), bit(1), bit(2), bit(3), "flag");
            let profile_conn = opts_with(bit(4), bit(5), bit(6), bit(7), "profile");
            let saved_conn = opts_with(bit(8), bit(9), bit(10), bit(11), "saved");
            let saved = SavedDefaults { connection: saved_conn.clone(), ..SavedDefaults::default() };
            let server = ServerProfile { connection: profile_conn.clone(), engine: None };

            let with_profile = profile_options(&flags, &server, &engine_defaults);
            assert_eq!(
                with_profile,
                ConnectionOptions {
                    host: flags.host.clone().or(profile_conn.host.clone()).or(engine_defaults.host.clone()),
                    port: flags.port.or(profile_conn.port),
                    user: flags.user.clone().or(profile_conn.user.clone()).or(engine_defaults.user.clone()),
                    password: flags.password.clone().or(profile_conn.password.clone()),
                },
                "profile branch, mask {mask:012b}"
            );

            let without_profile = default_options(&flags, &saved);
            assert_eq!(
                without_profile,
                ConnectionOptions {
                    host: flags.host.clone().or(saved_conn.host.clone()),
                    port: flags.port.or(saved_conn.port),
                    user: flags.user.clone().or(saved_conn.user.clone()),
                    password: flags.password.clone().or(saved_conn.password.clone()),
                },
                "default branch, mask {mask:012b}"
            );
        }
    }

    #[test]
    fn test_empty_flag_does_not_shadow_profile() {
        let flags = ConnectionOptions { host: Some(String::new()), ..ConnectionOptions::default() };
        let server = ServerProfile { connection: ConnectionOptions::default().with_host("db.internal"), engine: None };
        let opts = profile_options(&flags, &server, &ConnectionOptions::default().with_host("localhost"));
        assert_eq!(opts.host.as_deref(), Some("db.internal"));
    }

    #[test]
    fn test_candidates_filtered_by_engine() {
        let mut config = config_with_servers(&[
            ("legacy", profile(3307, Some(DatabaseType::MySQL))),
            ("pg17", profile(5417, None)),
        ]);
        config.default.connection.port = Some(5432);

        let labels: Vec<String> = connection_candidates(&config, None).iter().map(ConnectionCandidate::label).collect();
        assert_eq!(
            labels,
            vec![
                "Default connection (port 5432, engine: postgres)",
                "legacy (port 3307, engine: mysql)",
                "pg17 (port 5417)",
            ]
        );

        let mysql_only = connection_candidates(&config, Some(DatabaseType::MySQL));
        assert_eq!(mysql_only.len(), 1);
        assert_eq!(mysql_only[0].server_name(), Some("legacy"));
    }

    #[test]
    fn test_output_only_defaults_are_not_a_candidate() {
        let mut config = HerduxConfig::default();
        config.default.output = Some("/backups".to_string());
        assert!(connection_candidates(&config, None).is_empty());
    }

    #[test]
    fn test_guidance_texts() {
        insta::assert_snapshot!(no_server_guidance("PostgreSQL"), @r"
        Could not find any PostgreSQL server on common ports.
        Options:
          1. Specify port: herdux --port 5417 list
          2. Save defaults: herdux config set port 5417
          3. Add server:    herdux config add-server pg17 --port 5417
        ");

        insta::assert_snapshot!(unknown_profile_guidance(&HerduxConfig::default()), @r"
        Available profiles:
          (none)
          Add one with: herdux config add-server <name> --port <port> --password <pw>
        ");

        let config = config_with_servers(&[("pg16", profile(5416, None)), ("pg17", profile(5417, None))]);
        insta::assert_snapshot!(unknown_profile_guidance(&config), @r"
        Available profiles:
          pg16: port=5416
          pg17: port=5417
        ");
    }

    #[tokio::test]
    async fn test_single_discovered_server_is_auto_selected() {
        let config = HerduxConfig::default();
        let prompter = CannedPrompter::default();
        let runner = Arc::new(pg_ready_on(&[5432]));

        let resolved = Resolver::new(&config, &prompter, runner)
            .interactive(true)
            .resolve(&ConnectionRequest::default())
            .await
            .unwrap();

        assert_eq!(resolved.engine_type, DatabaseType::Postgres);
        assert_eq!(resolved.opts.port, Some(5432));
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn test_no_server_found() {
        let config = HerduxConfig::default();
        let prompter = CannedPrompter::default();
        let runner = Arc::new(pg_ready_on(&[]));

        let err = Resolver::new(&config, &prompter, runner)
            .resolve(&ConnectionRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, HerduxError::NoServerFound { .. }));
        assert!(err.message().contains("herdux --port 5417 list"));
    }

    #[tokio::test]
    async fn test_multiple_servers_prompt_or_fail() {
        let config = HerduxConfig::default();
        let runner = Arc::new(pg_ready_on(&[5433, 5417]));

        let quiet = CannedPrompter::default();
        let err = Resolver::new(&config, &quiet, runner.clone())
            .resolve(&ConnectionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HerduxError::MultipleServersFound { .. }));
        assert!(err.message().contains("Port 5417"));

        let prompter = CannedPrompter::answering(&[Some(1)]);
        let resolved = Resolver::new(&config, &prompter, runner)
            .interactive(true)
            .resolve(&ConnectionRequest::default())
            .await
            .unwrap();
        assert_eq!(resolved.opts.port, Some(5433));

        let asked = prompter.asked();
        assert_eq!(asked.len(), 1);
        assert_eq!(asked[0].1[0], "Port 5417 - PostgreSQL 16.5417");
    }

    #[tokio::test]
    async fn test_explicit_port_skips_discovery() {
        let config = HerduxConfig::default();
        let prompter = CannedPrompter::default();
        let runner = Arc::new(ScriptedRunner::new());

        let request = ConnectionRequest {
            connection: ConnectionOptions::default().with_port(5417),
            ..ConnectionRequest::default()
        };
        let resolved = Resolver::new(&config, &prompter, runner.clone()).interactive(true).resolve(&request).await.unwrap();

        assert_eq!(resolved.opts.port, Some(5417));
        assert!(runner.calls().is_empty());
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn test_saved_default_port_skips_discovery() {
        let mut config = HerduxConfig::default();
        config.default.connection = ConnectionOptions::default().with_port(5416).with_user("admin");
        let prompter = CannedPrompter::default();
        let runner = Arc::new(ScriptedRunner::new());

        let request = ConnectionRequest {
            connection: ConnectionOptions::default().with_user("flag-user"),
            ..ConnectionRequest::default()
        };
        let resolved = Resolver::new(&config, &prompter, runner.clone()).resolve(&request).await.unwrap();

        assert_eq!(resolved.opts.port, Some(5416));
        assert_eq!(resolved.opts.user.as_deref(), Some("flag-user"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_profile_supplies_engine_and_options() {
        let config = config_with_servers(&[("legacy", profile(3307, Some(DatabaseType::MySQL)))]);
        let prompter = CannedPrompter::default();
        let runner = Arc::new(ScriptedRunner::new());

        let request = ConnectionRequest { server: Some("legacy".to_string()), ..ConnectionRequest::default() };
        let resolved = Resolver::new(&config, &prompter, runner).resolve(&request).await.unwrap();

        assert_eq!(resolved.engine_type, DatabaseType::MySQL);
        assert_eq!(resolved.server.as_deref(), Some("legacy"));
        assert_eq!(
            resolved.opts,
            ConnectionOptions::default().with_host("localhost").with_port(3307).with_user("root")
        );
    }

    #[tokio::test]
    async fn test_saved_defaults_do_not_leak_into_profile() {
        let mut config = config_with_servers(&[("pg17", profile(5417, None))]);
        config.default.connection = ConnectionOptions::default()
            .with_host("db.saved")
            .with_port(5432)
            .with_user("admin")
            .with_password("saved-pw");
        let prompter = CannedPrompter::default();

        let request = ConnectionRequest { server: Some("pg17".to_string()), ..ConnectionRequest::default() };
        let resolved = Resolver::new(&config, &prompter, Arc::new(ScriptedRunner::new()))
            .resolve(&request)
            .await
            .unwrap();

        assert_eq!(
            resolved.opts,
            ConnectionOptions::default().with_host("localhost").with_port(5417).with_user("postgres")
        );
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_profile() {
        let config = config_with_servers(&[("pg17", profile(5417, None))]);
        let prompter = CannedPrompter::default();
        let request = ConnectionRequest { server: Some("pg99".to_string()), ..ConnectionRequest::default() };

        let err = Resolver::new(&config, &prompter, Arc::new(ScriptedRunner::new()))
            .resolve(&request)
            .await
            .unwrap_err();

        assert!(matches!(&err, HerduxError::UnknownProfile { name, .. } if name == "pg99"));
        assert!(err.message().contains("pg17: port=5417"));
    }

    #[tokio::test]
    async fn test_single_profile_is_auto_selected_interactively() {
        let config = config_with_servers(&[("pg17", profile(5417, None))]);
        let prompter = CannedPrompter::default();

        let resolved = Resolver::new(&config, &prompter, Arc::new(ScriptedRunner::new()))
            .interactive(true)
            .resolve(&ConnectionRequest::default())
            .await
            .unwrap();

        assert_eq!(resolved.server.as_deref(), Some("pg17"));
        assert_eq!(resolved.opts.port, Some(5417));
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn test_choosing_default_connection_uses_saved_defaults() {
        let mut config = config_with_servers(&[("pg17", profile(5417, None))]);
        config.default.connection.port = Some(5432);
        let prompter = CannedPrompter::answering(&[Some(0)]);

        let resolved = Resolver::new(&config, &prompter, Arc::new(ScriptedRunner::new()))
            .interactive(true)
            .resolve(&ConnectionRequest::default())
            .await
            .unwrap();

        assert_eq!(resolved.server, None);
        assert_eq!(resolved.opts.port, Some(5432));
        assert_eq!(prompter.asked()[0].0, "Select a connection to use:");
    }

    #[tokio::test]
    async fn test_cancelled_prompt() {
        let config = config_with_servers(&[("pg16", profile(5416, None)), ("pg17", profile(5417, None))]);
        let prompter = CannedPrompter::answering(&[None]);

        let err = Resolver::new(&config, &prompter, Arc::new(ScriptedRunner::new()))
            .interactive(true)
            .resolve(&ConnectionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HerduxError::Cancelled));
    }

    #[tokio::test]
    async fn test_profiles_ignored_when_not_interactive() {
        let config = config_with_servers(&[("pg17", profile(5417, None))]);
        let prompter = CannedPrompter::default();
        let runner = Arc::new(pg_ready_on(&[5432]));

        let resolved = Resolver::new(&config, &prompter, runner).resolve(&ConnectionRequest::default()).await.unwrap();
        assert_eq!(resolved.server, None);
        assert_eq!(resolved.opts.port, Some(5432));
    }

    #[tokio::test]
    async fn test_custom_scan_ports_reach_discovery() {
        let mut config = HerduxConfig::default();
        config.scan_ports = vec![6543];
        let prompter = CannedPrompter::default();
        let runner = Arc::new(pg_ready_on(&[6543]));

        let resolved =
            Resolver::new(&config, &prompter, runner.clone()).resolve(&ConnectionRequest::default()).await.unwrap();
        assert_eq!(resolved.opts.port, Some(6543));
        assert_eq!(runner.calls_to("pg_isready").len(), 1);
    }
}
