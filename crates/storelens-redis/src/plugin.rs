//! The key-value adapter behind the plugin contract
//!
//! Every operation opens its own connection, resolves the unit's shape when
//! it needs one, and drops the connection on return.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use storelens_common::ssl::SslConfig;
use storelens_common::{
    Column, Config, DatabaseType, Error, InputError, PluginConfig, Record, Result, RowsResult, SslStatus,
    StorageUnit,
};
use storelens_engine::{ColumnConstraints, Plugin, PluginFunctions, RowWriter, RowsQuery, SelectedRow};

use crate::client::{Connector, KvConnection};
use crate::db::{self, ConnectionParams};
use crate::export::export_unit;
use crate::metadata;
use crate::mutate;
use crate::rows::{self, RowFilter};
use crate::shape::{self, Shape};
use crate::tcp::TcpConnector;

/// Logical databases probed by `get_databases`
pub const PROBED_DATABASES: u32 = 16;

pub const DEFAULT_EXPORT_BATCH_SIZE: usize = 1_000;

/// Key-value adapter over any [`Connector`]
#[derive(Debug, Clone)]
pub struct RedisPlugin<C> {
    connector: C,
    export_batch_size: usize,
}

impl<C: Connector> RedisPlugin<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            export_batch_size: DEFAULT_EXPORT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_export_batch_size(mut self, export_batch_size: usize) -> Self {
        self.export_batch_size = export_batch_size.max(1);
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn connect(&self, config: &PluginConfig) -> Result<C::Conn> {
        db::open(&self.connector, config).await
    }
}

impl RedisPlugin<TcpConnector> {
    /// TCP adapter using the transport settings of `config`
    pub fn tcp(config: &Config) -> Self {
        let connector = TcpConnector::new(Duration::from_millis(config.connection.connect_timeout_ms));
        Self::new(connector).with_export_batch_size(config.connection.export_batch_size)
    }
}

impl<C: Connector + 'static> RedisPlugin<C> {
    /// Wraps this adapter for registration with an `Engine`
    pub fn into_plugin(self) -> Plugin {
        Plugin::new(DatabaseType::Redis, Arc::new(self))
    }
}

fn failed(operation: &str, unit: &str, e: &Error) {
    error!(operation, unit = %unit, error = %e, "Operation failed");
}

/// Current shape of `unit`; a failure is logged against `operation`
async fn resolve_for<K: KvConnection>(conn: &mut K, operation: &str, unit: &str) -> Result<Shape> {
    shape::resolve(conn, unit)
        .await
        .inspect_err(|e| failed(operation, unit, e))
}

#[async_trait]
impl<C: Connector> PluginFunctions for RedisPlugin<C> {
    async fn is_available(&self, config: &PluginConfig) -> bool {
        match self.connect(config).await {
            Ok(_) => true,
            Err(e) => {
                debug!(hostname = %config.credentials.hostname, error = %e, "Backend unavailable");
                false
            }
        }
    }

    #[instrument(skip_all)]
    async fn get_databases(&self, config: &PluginConfig) -> Result<Vec<String>> {
        let params = ConnectionParams::from_config(config)?;

        let mut reachable = Vec::new();
        for database in 0..PROBED_DATABASES {
            if db::open_with(&self.connector, &params.with_database(database)).await.is_ok() {
                reachable.push(database.to_string());
            }
        }

        if reachable.is_empty() {
            return Err(Error::ConnectionFailed(format!(
                "no reachable database on {}",
                params.target.addr()
            )));
        }
        info!(count = reachable.len(), "Discovered databases");
        Ok(reachable)
    }

    #[instrument(skip_all)]
    async fn get_storage_units(&self, config: &PluginConfig, _schema: &str) -> Result<Vec<StorageUnit>> {
        let mut conn = self.connect(config).await?;
        metadata::get_storage_units(&mut conn, "*")
            .await
            .inspect_err(|e| failed("get_storage_units", "*", e))
    }

    #[instrument(skip_all, fields(unit = %storage_unit))]
    async fn add_storage_unit(
        &self,
        config: &PluginConfig,
        _schema: &str,
        storage_unit: &str,
        fields: &[Record],
    ) -> Result<bool> {
        if fields.is_empty() {
            return Err(InputError::NoValues.into());
        }
        let mut conn = self.connect(config).await?;
        mutate::add_storage_unit(&mut conn, storage_unit, fields)
            .await
            .inspect_err(|e| failed("add_storage_unit", storage_unit, e))?;
        Ok(true)
    }

    #[instrument(skip_all, fields(unit = %storage_unit))]
    async fn update_storage_unit(
        &self,
        config: &PluginConfig,
        _schema: &str,
        storage_unit: &str,
        values: &HashMap<String, String>,
        _updated_columns: &[String],
    ) -> Result<bool> {
        let mut conn = self.connect(config).await?;
        let shape = resolve_for(&mut conn, "update_storage_unit", storage_unit).await?;
        mutate::update(&mut conn, storage_unit, shape, values)
            .await
            .inspect_err(|e| failed("update_storage_unit", storage_unit, e))?;
        Ok(true)
    }

    #[instrument(skip_all, fields(unit = %storage_unit))]
    async fn add_row(&self, config: &PluginConfig, _schema: &str, storage_unit: &str, values: &[Record]) -> Result<bool> {
        if values.is_empty() {
            return Err(InputError::NoValues.into());
        }
        let mut conn = self.connect(config).await?;
        let shape = resolve_for(&mut conn, "add_row", storage_unit).await?;
        mutate::add_row(&mut conn, storage_unit, shape, values)
            .await
            .inspect_err(|e| failed("add_row", storage_unit, e))?;
        Ok(true)
    }

    #[instrument(skip_all, fields(unit = %storage_unit))]
    async fn delete_row(
        &self,
        config: &PluginConfig,
        _schema: &str,
        storage_unit: &str,
        values: &HashMap<String, String>,
    ) -> Result<bool> {
        let mut conn = self.connect(config).await?;
        let shape = resolve_for(&mut conn, "delete_row", storage_unit).await?;
        mutate::delete_row(&mut conn, storage_unit, shape, values)
            .await
            .inspect_err(|e| failed("delete_row", storage_unit, e))?;
        Ok(true)
    }

    #[instrument(skip_all, fields(unit = %storage_unit, page_size = query.page_size, page_offset = query.page_offset))]
    async fn get_rows(
        &self,
        config: &PluginConfig,
        _schema: &str,
        storage_unit: &str,
        query: &RowsQuery,
    ) -> Result<RowsResult> {
        RowFilter::check_query(query)?;
        let mut conn = self.connect(config).await?;
        let shape = resolve_for(&mut conn, "get_rows", storage_unit).await?;
        rows::get_rows(&mut conn, storage_unit, shape, query)
            .await
            .inspect_err(|e| failed("get_rows", storage_unit, e))
    }

    #[instrument(skip_all, fields(unit = %storage_unit))]
    async fn get_columns_for_table(
        &self,
        config: &PluginConfig,
        _schema: &str,
        storage_unit: &str,
    ) -> Result<Vec<Column>> {
        let mut conn = self.connect(config).await?;
        Ok(resolve_for(&mut conn, "get_columns_for_table", storage_unit).await?.columns())
    }

    #[instrument(skip_all, fields(unit = %storage_unit))]
    async fn export_data(
        &self,
        config: &PluginConfig,
        _schema: &str,
        storage_unit: &str,
        writer: &mut dyn RowWriter,
        selected_rows: Option<&[SelectedRow]>,
    ) -> Result<()> {
        let mut conn = self.connect(config).await?;
        let shape = resolve_for(&mut conn, "export_data", storage_unit).await?;
        export_unit(&mut conn, storage_unit, shape, writer, selected_rows, self.export_batch_size)
            .await
            .inspect_err(|e| failed("export_data", storage_unit, e))
    }

    async fn get_column_constraints(
        &self,
        _config: &PluginConfig,
        _schema: &str,
        _storage_unit: &str,
    ) -> Result<ColumnConstraints> {
        Ok(ColumnConstraints::new())
    }

    async fn get_ssl_status(&self, config: &PluginConfig) -> Result<Option<SslStatus>> {
        let creds = &config.credentials;
        let status = match SslConfig::from_advanced(&creds.advanced, &creds.hostname, creds.is_profile)? {
            Some(ssl) => SslStatus {
                is_enabled: true,
                mode: ssl.mode.as_str().to_string(),
            },
            None => SslStatus {
                is_enabled: false,
                mode: "disabled".to_string(),
            },
        };
        Ok(Some(status))
    }
}
