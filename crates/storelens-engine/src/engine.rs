//! Plugin registry

use tracing::{debug, info, warn};

use storelens_common::config::profiles_from_env;
use storelens_common::{DatabaseType, Profile, Result};

use crate::plugin::Plugin;

/// Resolves a [`DatabaseType`] to its registered [`Plugin`] and keeps the
/// login profiles offered to callers.
#[derive(Debug, Default)]
pub struct Engine {
    plugins: Vec<Plugin>,
    login_profiles: Vec<Profile>,
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin, replacing any earlier one for the same type
    pub fn register_plugin(&mut self, plugin: Plugin) {
        if let Some(existing) = self
            .plugins
            .iter_mut()
            .find(|p| p.database_type == plugin.database_type)
        {
            warn!(database_type = %plugin.database_type, "Replacing registered plugin");
            *existing = plugin;
            return;
        }
        info!(database_type = %plugin.database_type, "Registered plugin");
        self.plugins.push(plugin);
    }

    /// The plugin registered for `database_type`
    #[must_use]
    pub fn choose(&self, database_type: DatabaseType) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.database_type == database_type)
    }

    #[must_use]
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn add_login_profile(&mut self, profile: Profile) {
        self.login_profiles.push(profile);
    }

    #[must_use]
    pub fn login_profiles(&self) -> &[Profile] {
        &self.login_profiles
    }

    /// Adds the environment profiles of every registered backend type.
    /// Profiles without an explicit type take the type they were found under.
    pub fn load_env_profiles(&mut self) -> Result<usize> {
        let mut loaded = 0;
        let types: Vec<DatabaseType> = self.plugins.iter().map(|p| p.database_type).collect();
        for database_type in types {
            for mut profile in profiles_from_env(database_type)? {
                profile.database_type.get_or_insert(database_type);
                self.add_login_profile(profile);
                loaded += 1;
            }
        }
        debug!(loaded, "Loaded environment login profiles");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RowsQuery;
    use crate::plugin::PluginFunctions;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use storelens_common::{Column, PluginConfig, Record, RowsResult, StorageUnit};

    struct NamedAdapter(&'static str);

    #[async_trait]
    impl PluginFunctions for NamedAdapter {
        async fn is_available(&self, _config: &PluginConfig) -> bool {
            true
        }

        async fn get_databases(&self, _config: &PluginConfig) -> Result<Vec<String>> {
            Ok(vec![self.0.to_string()])
        }

        async fn get_storage_units(&self, _config: &PluginConfig, _schema: &str) -> Result<Vec<StorageUnit>> {
            Ok(Vec::new())
        }

        async fn update_storage_unit(
            &self,
            _config: &PluginConfig,
            _schema: &str,
            _storage_unit: &str,
            _values: &HashMap<String, String>,
            _updated_columns: &[String],
        ) -> Result<bool> {
            Ok(false)
        }

        async fn add_row(&self, _config: &PluginConfig, _schema: &str, _storage_unit: &str, _values: &[Record]) -> Result<bool> {
            Ok(false)
        }

        async fn delete_row(
            &self,
            _config: &PluginConfig,
            _schema: &str,
            _storage_unit: &str,
            _values: &HashMap<String, String>,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn get_rows(&self, _config: &PluginConfig, _schema: &str, _storage_unit: &str, _query: &RowsQuery) -> Result<RowsResult> {
            Ok(RowsResult::default())
        }

        async fn get_columns_for_table(&self, _config: &PluginConfig, _schema: &str, _storage_unit: &str) -> Result<Vec<Column>> {
            Ok(Vec::new())
        }
    }

    fn config() -> PluginConfig {
        PluginConfig::new(storelens_common::Credentials::new(DatabaseType::Redis, "localhost"))
    }

    #[tokio::test]
    async fn test_choose_registered_plugin() {
        let mut engine = Engine::new();
        engine.register_plugin(Plugin::new(DatabaseType::Redis, Arc::new(NamedAdapter("first"))));
        engine.register_plugin(Plugin::new(DatabaseType::MongoDB, Arc::new(NamedAdapter("mongo"))));

        let plugin = engine.choose(DatabaseType::Redis).unwrap();
        assert_eq!(plugin.get_databases(&config()).await.unwrap(), vec!["first"]);
        assert!(engine.choose(DatabaseType::Postgres).is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_same_type() {
        let mut engine = Engine::new();
        engine.register_plugin(Plugin::new(DatabaseType::Redis, Arc::new(NamedAdapter("first"))));
        engine.register_plugin(Plugin::new(DatabaseType::Redis, Arc::new(NamedAdapter("second"))));

        assert_eq!(engine.plugins().len(), 1);
        let plugin = engine.choose(DatabaseType::Redis).unwrap();
        assert_eq!(plugin.get_databases(&config()).await.unwrap(), vec!["second"]);
    }

    #[test]
    fn test_login_profiles() {
        let mut engine = Engine::new();
        let profile: Profile = serde_json::from_str(r#"{"alias":"cache","host":"10.0.0.5"}"#).unwrap();
        engine.add_login_profile(profile);
        assert_eq!(engine.login_profiles().len(), 1);
        assert_eq!(engine.login_profiles()[0].hostname, "10.0.0.5");
    }
}
