//! Configuration management for Storelens
//!
//! Two kinds of configuration live here:
//! - [`PluginConfig`]/[`Credentials`]: the per-call connection value object
//!   handed to every contract operation. It is never persisted by the core.
//! - [`Config`]: application settings (logging, transport tuning, saved
//!   profiles) loaded from a TOML/JSON file or the environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{DatabaseType, Record};

/// Prefix of the environment variables holding connection profiles
pub const ENV_PREFIX: &str = "STORELENS";

// ============================================================================
// Per-call Connection Configuration
// ============================================================================

/// Credentials and options for one backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub database_type: DatabaseType,
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Selected namespace (logical database number for key-value backends)
    #[serde(default)]
    pub database: String,
    /// Advanced options such as `Port` and the `SSL ...` keys
    #[serde(default)]
    pub advanced: Vec<Record>,
    /// Set for admin-managed profiles; enables path-based certificate loading
    #[serde(default)]
    pub is_profile: bool,
}

impl Credentials {
    pub fn new(database_type: DatabaseType, hostname: impl Into<String>) -> Self {
        Self {
            id: None,
            database_type,
            hostname: hostname.into(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            advanced: Vec::new(),
            is_profile: false,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_advanced(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.advanced.push(Record::new(key, value));
        self
    }
}

/// Configuration handed to every plugin operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub credentials: Credentials,
}

impl PluginConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Copy of this configuration pointed at another namespace
    #[must_use]
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        let mut config = self.clone();
        config.credentials.database = database.into();
        config
    }
}

// ============================================================================
// Saved Profiles
// ============================================================================

/// A saved connection profile, as found in config files and environment
/// variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(rename = "type", default)]
    pub database_type: Option<DatabaseType>,
    #[serde(alias = "host")]
    pub hostname: String,
    #[serde(default, alias = "user")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub port: Option<String>,
    /// Extra advanced options
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Profile {
    /// Build per-call credentials, falling back to `default_type` when the
    /// profile does not name its backend
    #[must_use]
    pub fn to_credentials(&self, default_type: DatabaseType) -> Credentials {
        let mut advanced: Vec<Record> = Vec::with_capacity(self.config.len() + 1);
        if let Some(port) = &self.port {
            advanced.push(Record::new("Port", port.clone()));
        }
        advanced.extend(self.config.iter().map(|(k, v)| Record::new(k.clone(), v.clone())));

        Credentials {
            id: self.alias.clone(),
            database_type: self.database_type.unwrap_or(default_type),
            hostname: self.hostname.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            advanced,
            is_profile: true,
        }
    }
}

/// Reads profiles for `database_type` from the process environment.
///
/// `STORELENS_<TYPE>` holds a JSON array of profiles. When it is unset the
/// numbered variables `STORELENS_<TYPE>_1`, `_2`, ... are read, one JSON
/// object each, stopping at the first missing or unparsable entry.
pub fn profiles_from_env(database_type: DatabaseType) -> Result<Vec<Profile>> {
    profiles_from_lookup(database_type, |name| std::env::var(name).ok())
}

/// [`profiles_from_env`] over an arbitrary variable source
pub fn profiles_from_lookup<F>(database_type: DatabaseType, lookup: F) -> Result<Vec<Profile>>
where
    F: Fn(&str) -> Option<String>,
{
    let var = format!("{}_{}", ENV_PREFIX, database_type.as_str().to_uppercase());

    if let Some(value) = lookup(&var).filter(|v| !v.is_empty()) {
        let profiles: Vec<Profile> = serde_json::from_str(&value)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", var, e)))?;
        debug!(var = %var, count = profiles.len(), "Loaded profiles from environment");
        return Ok(profiles);
    }

    let mut profiles = Vec::new();
    for i in 1.. {
        let numbered = format!("{}_{}", var, i);
        let Some(value) = lookup(&numbered).filter(|v| !v.is_empty()) else {
            break;
        };
        match serde_json::from_str::<Profile>(&value) {
            Ok(profile) => profiles.push(profile),
            Err(e) => {
                warn!(var = %numbered, error = %e, "Unable to parse profile, stopping scan");
                break;
            }
        }
    }
    Ok(profiles)
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Main configuration structure for Storelens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Transport configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Saved connection profiles
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Load configuration from a TOML/JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = if path.as_ref().extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        Ok(config)
    }

    /// Find a saved profile by alias
    #[must_use]
    pub fn profile(&self, alias: &str) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.alias.as_deref() == Some(alias))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Dial timeout applied by the TCP transport
    pub connect_timeout_ms: u64,
    /// Rows read per range request when exporting ordered shapes
    pub export_batch_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            export_batch_size: 1_000,
        }
    }
}
