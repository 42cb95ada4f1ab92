//! Command handlers
//!
//! Data goes to the given writer as JSON lines; logs go to stderr.

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use std::io::Write;

use storelens_common::PluginConfig;
use storelens_engine::{Plugin, RowWriter, RowsQuery, WhereCondition};

const OPERATORS: [&str; 4] = ["!=", "=", ">", "<"];

/// Parses `key<op>value` with one of `=`, `!=`, `>`, `<`
pub fn parse_filter(expr: &str) -> Result<WhereCondition> {
    for (i, _) in expr.char_indices() {
        let rest = &expr[i..];
        if let Some(op) = OPERATORS.into_iter().find(|op| rest.starts_with(op)) {
            let key = expr[..i].trim();
            if key.is_empty() {
                bail!("filter '{}' has no key", expr);
            }
            return Ok(WhereCondition::atomic(key, op, rest[op.len()..].trim()));
        }
    }
    bail!("filter '{}' has no operator (=, !=, >, <)", expr)
}

pub fn rows_query(page_size: usize, offset: usize, filter: Option<&str>) -> Result<RowsQuery> {
    let query = RowsQuery::page(page_size, offset);
    Ok(match filter {
        Some(expr) => query.with_filter(parse_filter(expr)?),
        None => query,
    })
}

/// Writes each row as a JSON array on its own line
pub struct JsonLinesWriter<W> {
    out: W,
    rows: usize,
}

impl<W: Write + Send> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, rows: 0 }
    }

    /// Rows written so far, header included
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RowWriter for JsonLinesWriter<W> {
    fn write_row(&mut self, row: Vec<String>) -> storelens_common::Result<()> {
        serde_json::to_writer(&mut self.out, &row)?;
        self.out.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }
}

pub async fn ping<W: Write>(plugin: &Plugin, config: &PluginConfig, out: &mut W) -> Result<()> {
    if !plugin.is_available(config).await {
        bail!("{} is not reachable", config.credentials.hostname);
    }
    writeln!(out, "PONG")?;
    Ok(())
}

pub async fn databases<W: Write>(plugin: &Plugin, config: &PluginConfig, out: &mut W) -> Result<()> {
    for database in plugin.get_databases(config).await? {
        writeln!(out, "{}", database)?;
    }
    Ok(())
}

pub async fn units<W: Write>(plugin: &Plugin, config: &PluginConfig, out: &mut W) -> Result<()> {
    let schema = config.credentials.database.as_str();
    for unit in plugin.get_storage_units(config, schema).await? {
        let mut line = Map::new();
        line.insert("name".to_string(), Value::String(unit.name));
        for attribute in unit.attributes {
            line.insert(attribute.key, Value::String(attribute.value));
        }
        writeln!(out, "{}", Value::Object(line))?;
    }
    Ok(())
}

pub async fn columns<W: Write>(plugin: &Plugin, config: &PluginConfig, unit: &str, out: &mut W) -> Result<()> {
    let schema = config.credentials.database.as_str();
    for column in plugin.get_columns_for_table(config, schema, unit).await? {
        writeln!(out, "{}", json!({ "name": column.name, "type": column.ty }))?;
    }
    Ok(())
}

/// Writes each row as an object keyed by column name
pub async fn rows<W: Write>(
    plugin: &Plugin,
    config: &PluginConfig,
    unit: &str,
    query: &RowsQuery,
    out: &mut W,
) -> Result<()> {
    let schema = config.credentials.database.as_str();
    let result = plugin.get_rows(config, schema, unit, query).await?;
    for row in result.rows {
        let line: Map<String, Value> = result
            .columns
            .iter()
            .map(|c| c.name.clone())
            .zip(row.into_iter().map(Value::String))
            .collect();
        writeln!(out, "{}", Value::Object(line))?;
    }
    Ok(())
}

/// Streams the unit through a [`JsonLinesWriter`]; returns the data row count
pub async fn export<W: Write + Send>(plugin: &Plugin, config: &PluginConfig, unit: &str, out: W) -> Result<usize> {
    let schema = config.credentials.database.as_str();
    let mut writer = JsonLinesWriter::new(out);
    plugin.export_data(config, schema, unit, &mut writer, None).await?;
    let rows = writer.rows().saturating_sub(1);
    writer.into_inner().flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use storelens_common::{Credentials, DatabaseType};
    use storelens_redis::{MemoryConnector, MemoryStore, RedisPlugin};

    fn fixture() -> (Plugin, PluginConfig) {
        let store = Arc::new(MemoryStore::new());
        store.seed(0, &["HSET", "user:1", "username", "johndoe", "id", "1"]);
        store.seed(0, &["RPUSH", "orders:recent", "5", "4", "3"]);
        let plugin = RedisPlugin::new(MemoryConnector::new(store)).into_plugin();
        let config = PluginConfig::new(Credentials::new(DatabaseType::Redis, "memory"));
        (plugin, config)
    }

    fn lines(buf: Vec<u8>) -> Vec<String> {
        String::from_utf8(buf).unwrap().lines().map(str::to_string).collect()
    }

    #[rstest]
    #[case("value>10", "value", ">", "10")]
    #[case("username = johndoe", "username", "=", "johndoe")]
    #[case("field!=id", "field", "!=", "id")]
    #[case("score<1.5", "score", "<", "1.5")]
    fn test_parse_filter(#[case] expr: &str, #[case] key: &str, #[case] op: &str, #[case] value: &str) {
        let condition = parse_filter(expr).unwrap();
        let atomic = condition.as_atomic().unwrap();
        assert_eq!((atomic.key.as_str(), atomic.operator.as_str(), atomic.value.as_str()), (key, op, value));
    }

    #[rstest]
    #[case("value")]
    #[case("=x")]
    fn test_parse_filter_rejects(#[case] expr: &str) {
        assert!(parse_filter(expr).is_err());
    }

    #[tokio::test]
    async fn test_rows_as_objects() {
        let (plugin, config) = fixture();
        let mut out = Vec::new();
        rows(&plugin, &config, "orders:recent", &RowsQuery::page(2, 0), &mut out).await.unwrap();
        assert_eq!(
            lines(out),
            vec![r#"{"index":"0","value":"5"}"#, r#"{"index":"1","value":"4"}"#]
        );
    }

    #[tokio::test]
    async fn test_units_listing() {
        let (plugin, config) = fixture();
        let mut out = Vec::new();
        units(&plugin, &config, &mut out).await.unwrap();
        assert_eq!(
            lines(out),
            vec![
                r#"{"Size":"3","Type":"list","name":"orders:recent"}"#,
                r#"{"Size":"2","Type":"hash","name":"user:1"}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_export_json_lines() {
        let (plugin, config) = fixture();
        let mut buf = Vec::new();
        let written = export(&plugin, &config, "user:1", &mut buf).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            lines(buf),
            vec![r#"["field","value"]"#, r#"["id","1"]"#, r#"["username","johndoe"]"#]
        );
    }

    #[tokio::test]
    async fn test_ping_unreachable() {
        let store = Arc::new(MemoryStore::new());
        store.set_reachable(false);
        let plugin = RedisPlugin::new(MemoryConnector::new(store)).into_plugin();
        let config = PluginConfig::new(Credentials::new(DatabaseType::Redis, "memory"));
        assert!(ping(&plugin, &config, &mut Vec::<u8>::new()).await.is_err());
    }
}
