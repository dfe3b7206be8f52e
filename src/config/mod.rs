//! Configuration Management
//!
//! This module handles loading and saving saved defaults, named server profiles
//! and discovery settings.
//!
//! # Configuration Location
//! - `~/.herdux/config.json` (per-user)
//! - `HERDUX_CONFIG` overrides the path
//!
//! # Lifecycle
//! The file is read on demand and never cached across commands. The core only
//! reads a [`HerduxConfig`] snapshot; only the `config` command writes through
//! [`ConfigStore`].
//!
//! # File Format
//! ```json
//! {
//!   "default": { "host": "localhost", "port": 5432, "user": "postgres", "engine": "postgres", "output": "./backups" },
//!   "servers": {
//!     "pg17": { "port": 5417, "password": "secret" },
//!     "legacy": { "port": 3307, "engine": "mysql" }
//!   },
//!   "scan_ports": [5432, 5417],
//!   "restore_fatal_exit_codes": [1]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::engine::{ConnectionOptions, DatabaseType};
use crate::error::{HerduxError, Result};

/// Environment variable that relocates the config file
pub const CONFIG_PATH_ENV: &str = "HERDUX_CONFIG";

/// Saved defaults (`herdux config set ...`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDefaults {
    #[serde(flatten)]
    pub connection: ConnectionOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<DatabaseType>,

    /// Default backup directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl SavedDefaults {
    /// True when nothing but `output` is saved
    #[must_use]
    pub fn has_connection(&self) -> bool {
        !self.connection.is_empty() || self.engine.is_some()
    }

    /// Saved value for `key`, as text
    #[must_use]
    pub fn value(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::Host => self.connection.host.clone(),
            ConfigKey::Port => self.connection.port.map(|p| p.to_string()),
            ConfigKey::User => self.connection.user.clone(),
            ConfigKey::Password => self.connection.password.clone(),
            ConfigKey::Output => self.output.clone(),
            ConfigKey::Engine => self.engine.map(|e| e.to_string()),
        }
    }
}

/// A named server profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    #[serde(flatten)]
    pub connection: ConnectionOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<DatabaseType>,
}

impl ServerProfile {
    /// Field-wise merge: values set in `update` replace the ones here
    #[must_use]
    pub fn merged_with(&self, update: &Self) -> Self {
        Self {
            connection: update.connection.layered_over(&self.connection),
            engine: update.engine.or(self.engine),
        }
    }
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HerduxConfig {
    #[serde(default)]
    pub default: SavedDefaults,

    #[serde(default)]
    pub servers: BTreeMap<String, ServerProfile>,

    /// Ports probed instead of each engine's conventional ones
    #[serde(default, deserialize_with = "deserialize_ports")]
    pub scan_ports: Vec<u16>,

    /// Overrides which `pg_restore` exit codes are fatal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_fatal_exit_codes: Option<Vec<i32>>,
}

impl HerduxConfig {
    #[must_use]
    pub fn defaults(&self) -> &SavedDefaults {
        &self.default
    }

    #[must_use]
    pub fn server(&self, name: &str) -> Option<&ServerProfile> {
        self.servers.get(name)
    }

    /// All profiles, ordered by name
    #[must_use]
    pub fn servers(&self) -> &BTreeMap<String, ServerProfile> {
        &self.servers
    }

    #[must_use]
    pub fn scan_ports(&self) -> &[u16] {
        &self.scan_ports
    }

    #[must_use]
    pub fn restore_fatal_exit_codes(&self) -> Option<&[i32]> {
        self.restore_fatal_exit_codes.as_deref()
    }
}

/// Keys accepted by `config set` / `config get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Host,
    Port,
    User,
    Password,
    Output,
    Engine,
}

impl ConfigKey {
    pub const ALL: [Self; 6] = [Self::Host, Self::Port, Self::User, Self::Password, Self::Output, Self::Engine];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Port => "port",
            Self::User => "user",
            Self::Password => "password",
            Self::Output => "output",
            Self::Engine => "engine",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = HerduxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| HerduxError::InvalidConfigKey(s.to_string()))
    }
}

/// Parse a TCP port, rejecting 0 and anything above 65535
pub fn parse_port(value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(HerduxError::InvalidPort(value.to_string())),
    }
}

/// Handle over the config file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at `HERDUX_CONFIG` or `~/.herdux/config.json`
    pub fn open_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(Self::at(path));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| HerduxError::config_error("Could not determine home directory"))?;
        Ok(Self::at(home.join(".herdux").join("config.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file; a missing file is an empty config
    pub fn load(&self) -> Result<HerduxConfig> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no config file, using empty config");
            return Ok(HerduxConfig::default());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| HerduxError::config_error(format!("Could not read config file: {e}")))?;
        if contents.trim().is_empty() {
            return Ok(HerduxConfig::default());
        }

        serde_json::from_str(&contents).map_err(|e| {
            HerduxError::config_error(format!("Invalid config file {}: {e}", self.path.display()))
        })
    }

    pub fn save(&self, config: &HerduxConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                HerduxError::config_error(format!("Could not create config directory: {e}"))
            })?;
        }

        let mut contents = serde_json::to_string_pretty(config)
            .map_err(|e| HerduxError::config_error(format!("Could not serialize config: {e}")))?;
        contents.push('\n');

        fs::write(&self.path, contents)
            .map_err(|e| HerduxError::config_error(format!("Could not write config file: {e}")))?;
        restrict_permissions(&self.path)
    }

    fn update<T>(&self, change: impl FnOnce(&mut HerduxConfig) -> Result<T>) -> Result<T> {
        let mut config = self.load()?;
        let outcome = change(&mut config)?;
        self.save(&config)?;
        Ok(outcome)
    }

    /// Validate and save one default value
    pub fn set_default(&self, key: ConfigKey, value: &str) -> Result<()> {
        self.update(|config| {
            let defaults = &mut config.default;
            match key {
                ConfigKey::Host => defaults.connection.host = Some(value.to_string()),
                ConfigKey::Port => defaults.connection.port = Some(parse_port(value)?),
                ConfigKey::User => defaults.connection.user = Some(value.to_string()),
                ConfigKey::Password => defaults.connection.password = Some(value.to_string()),
                ConfigKey::Output => defaults.output = Some(value.to_string()),
                ConfigKey::Engine => defaults.engine = Some(value.parse()?),
            }
            Ok(())
        })
    }

    /// Saved value for `key`, as text
    pub fn default_value(&self, key: ConfigKey) -> Result<Option<String>> {
        Ok(self.load()?.default.value(key))
    }

    /// Add a profile, merging over an existing one of the same name
    pub fn add_server(&self, name: &str, profile: &ServerProfile) -> Result<ServerProfile> {
        self.update(|config| {
            let merged = config.servers.get(name).map_or_else(|| profile.clone(), |p| p.merged_with(profile));
            config.servers.insert(name.to_string(), merged.clone());
            Ok(merged)
        })
    }

    /// Remove a profile; `false` when it did not exist
    pub fn remove_server(&self, name: &str) -> Result<bool> {
        let mut config = self.load()?;
        if config.servers.remove(name).is_none() {
            return Ok(false);
        }
        self.save(&config)?;
        Ok(true)
    }

    pub fn set_scan_ports(&self, ports: Vec<u16>) -> Result<()> {
        self.update(|config| {
            config.scan_ports = ports;
            Ok(())
        })
    }

    /// Delete the config file
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HerduxError::config_error(format!("Could not remove config file: {e}"))),
        }
    }
}

// Passwords live in this file
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| HerduxError::config_error(format!("Could not set config file permissions: {e}")))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u64),
    Text(String),
}

impl PortRepr {
    fn into_port<E: serde::de::Error>(self) -> std::result::Result<u16, E> {
        let text = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        };
        parse_port(&text).map_err(|_| E::custom(format!("invalid port \"{text}\"")))
    }
}

/// Ports may be stored as numbers or as numeric strings
pub(crate) fn deserialize_optional_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<PortRepr>::deserialize(deserializer)? {
        Some(repr) => repr.into_port().map(Some),
        None => Ok(None),
    }
}

fn deserialize_ports<'de, D>(deserializer: D) -> std::result::Result<Vec<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<PortRepr>::deserialize(deserializer)?.into_iter().map(PortRepr::into_port).collect()
}
