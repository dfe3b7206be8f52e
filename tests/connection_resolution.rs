//! Connection Resolution Tests
//!
//! End-to-end resolution from a config file on disk:
//! - Profiles written by older releases (string ports) still resolve
//! - Saved defaults, profiles and flags combine in precedence order
//! - Custom scan ports drive discovery for both engines
//! - Non-interactive sessions never prompt

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use herdux::config::ConfigKey;
use herdux::{
    ConfigStore, ConnectionOptions, ConnectionRequest, DatabaseType, HerduxConfig, HerduxError, Prompter,
    Resolver, RunResult, ScriptedRunner, ServerProfile,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Test Helpers
// ============================================================================

fn config_file(label: &str, contents: &str) -> (PathBuf, ConfigStore) {
    let dir = std::env::temp_dir().join(format!("herdux_resolution_{}_{label}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("Failed to create config dir");
    let path = dir.join("config.json");
    std::fs::write(&path, contents).expect("Failed to write config");
    (dir, ConfigStore::at(path))
}

/// Fails the test if anything is asked
struct NoPrompts;

impl Prompter for NoPrompts {
    fn select(&self, message: &str, _choices: &[String]) -> herdux::Result<Option<usize>> {
        panic!("unexpected prompt: {message}");
    }

    fn confirm(&self, message: &str, _default: bool) -> herdux::Result<bool> {
        panic!("unexpected prompt: {message}");
    }

    fn multi_select(&self, message: &str, _choices: &[String]) -> herdux::Result<Vec<usize>> {
        panic!("unexpected prompt: {message}");
    }
}

/// Always picks the last choice and remembers the labels it saw
#[derive(Default)]
struct PickLast {
    seen: Mutex<Vec<String>>,
}

impl Prompter for PickLast {
    fn select(&self, _message: &str, choices: &[String]) -> herdux::Result<Option<usize>> {
        self.seen.lock().unwrap().extend(choices.iter().cloned());
        Ok(choices.len().checked_sub(1))
    }

    fn confirm(&self, _message: &str, default: bool) -> herdux::Result<bool> {
        Ok(default)
    }

    fn multi_select(&self, _message: &str, _choices: &[String]) -> herdux::Result<Vec<usize>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Config File Compatibility
// ============================================================================

#[tokio::test]
async fn test_string_ports_from_older_config_resolve() {
    let (dir, store) = config_file(
        "string_ports",
        r#"{
            "default": { "port": "5432", "user": "admin" },
            "servers": { "pg17": { "port": "5417", "password": "secret" } },
            "scan_ports": ["5416", 5417]
        }"#,
    );
    let config = store.load().unwrap();
    assert_eq!(config.scan_ports(), &[5416, 5417]);

    let request = ConnectionRequest { server: Some("pg17".to_string()), ..ConnectionRequest::default() };
    let resolved = Resolver::new(&config, &NoPrompts, Arc::new(ScriptedRunner::new())).resolve(&request).await.unwrap();

    assert_eq!(resolved.engine_type, DatabaseType::Postgres);
    assert_eq!(
        resolved.opts,
        ConnectionOptions::default()
            .with_host("localhost")
            .with_port(5417)
            .with_user("postgres")
            .with_password("secret")
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_config_written_by_store_round_trips_through_resolution_inputs() {
    let (dir, store) = config_file("store_writes", "");
    store.set_default(ConfigKey::Engine, "mysql").unwrap();
    store.set_default(ConfigKey::Port, "3307").unwrap();
    store
        .add_server(
            "analytics",
            &ServerProfile { connection: ConnectionOptions::default().with_port(5433), engine: Some(DatabaseType::Postgres) },
        )
        .unwrap();

    let config = store.load().unwrap();
    assert_eq!(config.defaults().engine, Some(DatabaseType::MySQL));
    assert_eq!(config.defaults().connection.port, Some(3307));
    assert_eq!(config.server("analytics").unwrap().engine, Some(DatabaseType::Postgres));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_invalid_config_is_an_error() {
    let (dir, store) = config_file("invalid", "{ not json");
    assert!(matches!(store.load(), Err(HerduxError::ConfigError(_))));
    let _ = std::fs::remove_dir_all(dir);
}

// ============================================================================
// Precedence
// ============================================================================

#[tokio::test]
async fn test_flags_override_saved_defaults() {
    let (dir, store) = config_file("flags_win", r#"{ "default": { "port": 5432, "user": "admin", "engine": "mysql" } }"#);
    let config = store.load().unwrap();

    let request = ConnectionRequest {
        engine: Some(DatabaseType::Postgres),
        server: None,
        connection: ConnectionOptions::default().with_port(5417),
    };
    let resolved = Resolver::new(&config, &NoPrompts, Arc::new(ScriptedRunner::new())).resolve(&request).await.unwrap();

    assert_eq!(resolved.engine_type, DatabaseType::Postgres);
    assert_eq!(resolved.opts.port, Some(5417));
    assert_eq!(resolved.opts.user.as_deref(), Some("admin"));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_saved_engine_selects_mysql_discovery() {
    let (dir, store) = config_file("mysql_discovery", r#"{ "default": { "engine": "mysql" }, "scan_ports": [3316] }"#);
    let config = store.load().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .on_args("mysqladmin", "-P 3316", RunResult::ok("mysqld is alive"))
            .on_args("mysql", "SELECT VERSION()", RunResult::ok("8.0.36\n")),
    );

    let resolved = Resolver::new(&config, &NoPrompts, runner.clone())
        .resolve(&ConnectionRequest::default())
        .await
        .unwrap();

    assert_eq!(resolved.engine_type, DatabaseType::MySQL);
    assert_eq!(resolved.opts.port, Some(3316));
    assert_eq!(runner.calls_to("mysqladmin").len(), 1);

    let _ = std::fs::remove_dir_all(dir);
}

// ============================================================================
// Interactive Selection
// ============================================================================

#[tokio::test]
async fn test_interactive_picker_filters_by_requested_engine() {
    let config: HerduxConfig = serde_json::from_str(
        r#"{
            "default": { "port": 5432 },
            "servers": {
                "legacy": { "port": 3307, "engine": "mysql" },
                "reports": { "port": 3308, "engine": "mysql", "user": "reporter" },
                "pg17": { "port": 5417 }
            }
        }"#,
    )
    .unwrap();
    let prompter = PickLast::default();

    let request = ConnectionRequest { engine: Some(DatabaseType::MySQL), ..ConnectionRequest::default() };
    let resolved = Resolver::new(&config, &prompter, Arc::new(ScriptedRunner::new()))
        .interactive(true)
        .resolve(&request)
        .await
        .unwrap();

    assert_eq!(
        *prompter.seen.lock().unwrap(),
        vec!["legacy (port 3307, engine: mysql)".to_string(), "reports (port 3308, engine: mysql)".to_string()]
    );
    assert_eq!(resolved.server.as_deref(), Some("reports"));
    assert_eq!(resolved.opts.user.as_deref(), Some("reporter"));
    assert_eq!(resolved.opts.host.as_deref(), Some("localhost"));
}

#[tokio::test]
async fn test_explicit_host_skips_picker() {
    let config: HerduxConfig =
        serde_json::from_str(r#"{ "servers": { "a": { "port": 5416 }, "b": { "port": 5417 } } }"#).unwrap();
    let request = ConnectionRequest {
        connection: ConnectionOptions::default().with_host("db.internal").with_port(6432),
        ..ConnectionRequest::default()
    };

    let resolved = Resolver::new(&config, &NoPrompts, Arc::new(ScriptedRunner::new()))
        .interactive(true)
        .resolve(&request)
        .await
        .unwrap();

    assert_eq!(resolved.server, None);
    assert_eq!(resolved.opts.host.as_deref(), Some("db.internal"));
    assert_eq!(resolved.opts.port, Some(6432));
}
