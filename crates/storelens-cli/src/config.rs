//! Configuration loading and connection resolution

use anyhow::{Context, Result};
use std::path::Path;

use storelens_common::ssl::{SslMode, KEY_SSL_CA_CERT_CONTENT, KEY_SSL_MODE};
use storelens_common::{Config, Credentials, DatabaseType, PluginConfig};
use storelens_engine::Engine;
use storelens_redis::db::PORT_KEY;

use crate::TargetArgs;

/// Load configuration from file
pub async fn load(path: &str) -> Result<Config> {
    let path = Path::new(path);

    if path.exists() {
        Config::load(path).await.map_err(|e| anyhow::anyhow!(e))
    } else {
        // Use default configuration
        Ok(Config::default())
    }
}

/// Per-call connection settings from a saved profile or explicit flags
pub fn plugin_config(engine: &Engine, target: &TargetArgs) -> Result<PluginConfig> {
    if let Some(alias) = &target.profile {
        let profile = engine
            .login_profiles()
            .iter()
            .find(|p| p.alias.as_deref() == Some(alias.as_str()))
            .with_context(|| format!("no profile named '{}'", alias))?;
        return Ok(PluginConfig::new(profile.to_credentials(DatabaseType::Redis)));
    }

    let mode = SslMode::parse(&target.ssl_mode)?;
    let mut credentials = Credentials::new(DatabaseType::Redis, target.host.as_str())
        .with_auth(target.username.as_str(), target.password.as_str())
        .with_database(target.database.as_str());

    if let Some(port) = target.port {
        credentials = credentials.with_advanced(PORT_KEY, port.to_string());
    }
    if mode != SslMode::Disabled {
        credentials = credentials.with_advanced(KEY_SSL_MODE, mode.as_str());
    }
    if let Some(ca) = &target.ssl_ca {
        let pem = std::fs::read_to_string(ca).with_context(|| format!("failed to read {}", ca.display()))?;
        credentials = credentials.with_advanced(KEY_SSL_CA_CERT_CONTENT, pem);
    }
    Ok(PluginConfig::new(credentials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use storelens_common::get_record_value_or_default;
    use storelens_common::Profile;

    fn flags() -> TargetArgs {
        TargetArgs {
            profile: None,
            host: "cache.local".into(),
            port: Some(6380),
            username: String::new(),
            password: "pw".into(),
            database: "2".into(),
            ssl_mode: "insecure".into(),
            ssl_ca: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let config = load("/nonexistent/storelens.toml").await.unwrap();
        assert_eq!(config.connection.export_batch_size, 1_000);
        assert!(config.profiles.is_empty());
    }

    #[tokio::test]
    async fn test_load_toml_profiles() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"
json = true

[connection]
connect_timeout_ms = 250
export_batch_size = 10

[[profiles]]
alias = "cache"
host = "10.0.0.5"
database = "1"
"#
        )
        .unwrap();

        let config = load(file.path().to_str().unwrap()).await.unwrap();
        assert!(config.logging.json);
        assert_eq!(config.connection.connect_timeout_ms, 250);
        assert_eq!(config.profile("cache").unwrap().hostname, "10.0.0.5");
    }

    #[test]
    fn test_flags_to_credentials() {
        let config = plugin_config(&Engine::new(), &flags()).unwrap();
        let creds = &config.credentials;
        assert_eq!(creds.hostname, "cache.local");
        assert_eq!(creds.database, "2");
        assert_eq!(get_record_value_or_default(&creds.advanced, PORT_KEY, ""), "6380");
        assert_eq!(get_record_value_or_default(&creds.advanced, KEY_SSL_MODE, ""), "insecure");
        assert!(!creds.is_profile);
    }

    #[test]
    fn test_profile_lookup() {
        let mut engine = Engine::new();
        let profile: Profile = serde_json::from_str(r#"{"alias":"cache","host":"10.0.0.5","port":"6390"}"#).unwrap();
        engine.add_login_profile(profile);

        let mut target = flags();
        target.profile = Some("cache".into());
        let config = plugin_config(&engine, &target).unwrap();
        assert_eq!(config.credentials.hostname, "10.0.0.5");
        assert!(config.credentials.is_profile);

        target.profile = Some("other".into());
        assert!(plugin_config(&engine, &target).is_err());
    }

    #[test]
    fn test_bad_ssl_mode_rejected() {
        let mut target = flags();
        target.ssl_mode = "sometimes".into();
        assert!(plugin_config(&Engine::new(), &target).is_err());
    }
}
