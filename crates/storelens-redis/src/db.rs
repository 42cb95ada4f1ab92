//! Connection factory
//!
//! Validates a [`PluginConfig`] into [`ConnectionParams`] before anything is
//! dialed, then opens a connection and runs the handshake: `AUTH` when a
//! password is set, `SELECT` for a non-zero database, then `PING`.

use tracing::{debug, error};

use storelens_common::ssl::SslConfig;
use storelens_common::{get_record_value_or_default, Error, PluginConfig, Result};

use crate::client::{ConnectTarget, Connector, KvConnection};
use crate::resp::Cmd;

pub const PORT_KEY: &str = "Port";
pub const DEFAULT_PORT: &str = "6379";

/// Validated connection parameters
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub target: ConnectTarget,
    pub username: String,
    pub password: String,
    /// Logical database number
    pub database: u32,
}

impl ConnectionParams {
    /// Structural validation of the configuration; never touches the network
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let creds = &config.credentials;
        if creds.hostname.trim().is_empty() {
            return Err(Error::Config("hostname is required".to_string()));
        }

        let raw_port = get_record_value_or_default(&creds.advanced, PORT_KEY, DEFAULT_PORT);
        let port: u16 = raw_port.trim().parse().map_err(|_| {
            error!(hostname = %creds.hostname, port = %raw_port, "Failed to parse port number");
            Error::Config(format!("invalid port '{}'", raw_port))
        })?;

        let database = if creds.database.trim().is_empty() {
            0
        } else {
            creds.database.trim().parse::<u32>().map_err(|_| {
                error!(hostname = %creds.hostname, database = %creds.database, "Failed to parse database number");
                Error::Config(format!("invalid database number '{}'", creds.database))
            })?
        };

        let tls = SslConfig::from_advanced(&creds.advanced, &creds.hostname, creds.is_profile)?;

        Ok(Self {
            target: ConnectTarget {
                host: creds.hostname.trim().to_string(),
                port,
                tls,
            },
            username: creds.username.clone(),
            password: creds.password.clone(),
            database,
        })
    }

    /// Copy of these parameters selecting another database
    #[must_use]
    pub fn with_database(&self, database: u32) -> Self {
        Self {
            database,
            ..self.clone()
        }
    }
}

/// Validates `config`, dials and handshakes
pub async fn open<C: Connector>(connector: &C, config: &PluginConfig) -> Result<C::Conn> {
    let params = ConnectionParams::from_config(config)?;
    open_with(connector, &params).await
}

/// Dials and handshakes with already validated parameters
pub async fn open_with<C: Connector>(connector: &C, params: &ConnectionParams) -> Result<C::Conn> {
    let mut conn = connector.connect(&params.target).await.inspect_err(|e| {
        error!(hostname = %params.target.host, error = %e, "Failed to connect");
    })?;

    if let Err(e) = handshake(&mut conn, params).await {
        error!(
            hostname = %params.target.host,
            database = params.database,
            ssl = params.target.tls.as_ref().map_or("disabled", |t| t.mode.as_str()),
            error = %e,
            "Handshake failed"
        );
        return Err(match e {
            Error::Backend(msg) | Error::Protocol(msg) => Error::ConnectionFailed(format!("handshake: {}", msg)),
            other => other,
        });
    }

    debug!(hostname = %params.target.host, database = params.database, "Connection ready");
    Ok(conn)
}

async fn handshake<K: KvConnection>(conn: &mut K, params: &ConnectionParams) -> Result<()> {
    if !params.password.is_empty() {
        let mut auth = Cmd::new("AUTH");
        if !params.username.is_empty() {
            auth = auth.arg(&params.username);
        }
        conn.query(&auth.arg(&params.password)).await?;
    }
    if params.database != 0 {
        conn.query(&Cmd::new("SELECT").arg(params.database)).await?;
    }
    conn.query(&Cmd::new("PING")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore};
    use std::sync::Arc;
    use storelens_common::{Credentials, DatabaseType};

    fn config(host: &str) -> Credentials {
        Credentials::new(DatabaseType::Redis, host)
    }

    #[test]
    fn test_params_defaults() {
        let params = ConnectionParams::from_config(&PluginConfig::new(config("cache.local"))).unwrap();
        assert_eq!(params.target.port, 6379);
        assert_eq!(params.database, 0);
        assert!(params.target.tls.is_none());
    }

    #[test]
    fn test_invalid_port_and_database_rejected() {
        let bad_port = config("cache.local").with_advanced(PORT_KEY, "sixty");
        assert!(matches!(
            ConnectionParams::from_config(&PluginConfig::new(bad_port)),
            Err(Error::Config(_))
        ));

        let bad_db = config("cache.local").with_database("two");
        assert!(matches!(
            ConnectionParams::from_config(&PluginConfig::new(bad_db)),
            Err(Error::Config(_))
        ));

        assert!(matches!(
            ConnectionParams::from_config(&PluginConfig::new(config(" "))),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_never_dials() {
        let connector = MemoryConnector::default();
        let creds = config("cache.local").with_advanced(PORT_KEY, "70000");
        assert!(open(&connector, &PluginConfig::new(creds)).await.is_err());
        assert_eq!(connector.store().round_trips(), 0);
    }

    #[tokio::test]
    async fn test_handshake_auth_and_select() {
        let store = Arc::new(MemoryStore::new().with_password("pw"));
        store.seed(3, &["SET", "k", "v"]);
        let connector = MemoryConnector::new(Arc::clone(&store));

        let creds = config("cache.local").with_auth("default", "pw").with_database("3");
        let mut conn = open(&connector, &PluginConfig::new(creds)).await.unwrap();
        let reply = conn.query(&Cmd::new("GET").arg("k")).await.unwrap();
        assert_eq!(reply.into_string().unwrap().as_deref(), Some("v"));
        // AUTH, SELECT, PING, GET
        assert_eq!(store.round_trips(), 4);
    }

    #[tokio::test]
    async fn test_wrong_password_is_connection_failure() {
        let store = Arc::new(MemoryStore::new().with_password("pw"));
        let connector = MemoryConnector::new(Arc::clone(&store));

        let creds = config("cache.local").with_auth("", "nope");
        let err = open(&connector, &PluginConfig::new(creds)).await.err().unwrap();
        assert!(matches!(err, Error::ConnectionFailed(ref m) if m.contains("WRONGPASS")));
        assert_eq!(store.open_connections(), 0);
    }
}
