//! The storage engine plugin contract.
//!
//! Every backend adapter implements [`PluginFunctions`]. The upper layer maps
//! one request to one call and never sees backend-specific types; failures
//! come back as [`storelens_common::Error`] values.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use storelens_common::{
    Column, DatabaseType, Error, GraphEdge, PluginConfig, Record, Result, RowsResult, SslStatus,
    StorageUnit,
};

use crate::export::{RowWriter, SelectedRow};
use crate::filter::RowsQuery;

/// Per-column constraint map: column name to constraint name to value
pub type ColumnConstraints = HashMap<String, HashMap<String, serde_json::Value>>;

/// Work run by [`PluginFunctions::with_transaction`].
///
/// Receives the backend's transaction handle, or `None` when the backend has
/// no multi-statement transactions.
pub type TransactionOp<'a> = Box<dyn FnOnce(Option<&mut (dyn Any + Send)>) -> Result<()> + Send + 'a>;

/// Uniform operation set implemented by every backend adapter.
///
/// Operations a backend cannot offer keep the default implementation, which
/// fails with [`Error::Unsupported`] naming the operation.
///
/// # Thread Safety
///
/// Implementations hold no per-call state and are shared as
/// `Arc<dyn PluginFunctions>`.
#[async_trait]
pub trait PluginFunctions: Send + Sync {
    /// Probes connectivity. Never fails; any error reads as `false`.
    async fn is_available(&self, config: &PluginConfig) -> bool;

    /// Logical databases reachable with this configuration
    async fn get_databases(&self, config: &PluginConfig) -> Result<Vec<String>>;

    /// Namespaces (schemas) inside the selected database
    async fn get_all_schemas(&self, _config: &PluginConfig) -> Result<Vec<String>> {
        Err(Error::unsupported("get_all_schemas"))
    }

    /// Storage units of a namespace with their `Type`/`Size` attributes
    async fn get_storage_units(&self, config: &PluginConfig, schema: &str) -> Result<Vec<StorageUnit>>;

    /// Creates a unit from caller-tagged fields
    async fn add_storage_unit(
        &self,
        _config: &PluginConfig,
        _schema: &str,
        _storage_unit: &str,
        _fields: &[Record],
    ) -> Result<bool> {
        Err(Error::unsupported("add_storage_unit"))
    }

    /// Updates one logical row identified by `values`
    async fn update_storage_unit(
        &self,
        config: &PluginConfig,
        schema: &str,
        storage_unit: &str,
        values: &HashMap<String, String>,
        updated_columns: &[String],
    ) -> Result<bool>;

    /// Appends a row
    async fn add_row(
        &self,
        config: &PluginConfig,
        schema: &str,
        storage_unit: &str,
        values: &[Record],
    ) -> Result<bool>;

    /// Deletes the logical row identified by `values`
    async fn delete_row(
        &self,
        config: &PluginConfig,
        schema: &str,
        storage_unit: &str,
        values: &HashMap<String, String>,
    ) -> Result<bool>;

    /// Reads rows honoring the query's filter, sort and page window
    async fn get_rows(
        &self,
        config: &PluginConfig,
        schema: &str,
        storage_unit: &str,
        query: &RowsQuery,
    ) -> Result<RowsResult>;

    /// Columns of the unit's tabular projection
    async fn get_columns_for_table(
        &self,
        config: &PluginConfig,
        schema: &str,
        storage_unit: &str,
    ) -> Result<Vec<Column>>;

    /// Inferred relationships between units
    async fn get_graph(&self, _config: &PluginConfig, _schema: &str) -> Result<Vec<GraphEdge>> {
        Err(Error::unsupported("get_graph"))
    }

    /// Runs a backend-native query
    async fn raw_execute(&self, _config: &PluginConfig, _query: &str) -> Result<RowsResult> {
        Err(Error::unsupported("raw_execute"))
    }

    /// Streams a header row then data rows through `writer`.
    ///
    /// A non-empty `selected_rows` re-renders exactly those rows instead of
    /// reading the backend again.
    async fn export_data(
        &self,
        _config: &PluginConfig,
        _schema: &str,
        _storage_unit: &str,
        _writer: &mut dyn RowWriter,
        _selected_rows: Option<&[SelectedRow]>,
    ) -> Result<()> {
        Err(Error::unsupported("export_data"))
    }

    async fn get_column_constraints(
        &self,
        _config: &PluginConfig,
        _schema: &str,
        _storage_unit: &str,
    ) -> Result<ColumnConstraints> {
        Err(Error::unsupported("get_column_constraints"))
    }

    async fn clear_table_data(
        &self,
        _config: &PluginConfig,
        _schema: &str,
        _storage_unit: &str,
    ) -> Result<bool> {
        Err(Error::unsupported("clear_table_data"))
    }

    /// Runs `operation` inside a backend transaction.
    ///
    /// The default invokes it directly with no handle and no isolation.
    async fn with_transaction<'a>(&self, _config: &PluginConfig, operation: TransactionOp<'a>) -> Result<()> {
        operation(None)
    }

    /// Configured transport security, reported without dialing.
    /// `None` when the backend has no TLS notion.
    async fn get_ssl_status(&self, _config: &PluginConfig) -> Result<Option<SslStatus>> {
        Ok(None)
    }
}

/// A registered backend adapter
#[derive(Clone)]
pub struct Plugin {
    pub database_type: DatabaseType,
    pub functions: Arc<dyn PluginFunctions>,
}

impl Plugin {
    pub fn new(database_type: DatabaseType, functions: Arc<dyn PluginFunctions>) -> Self {
        Self {
            database_type,
            functions,
        }
    }
}

impl Deref for Plugin {
    type Target = dyn PluginFunctions;

    fn deref(&self) -> &Self::Target {
        self.functions.as_ref()
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("database_type", &self.database_type)
            .finish_non_exhaustive()
    }
}
