//! Common type definitions for Storelens

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ============================================================================
// Backend Kinds
// ============================================================================

/// Backend kinds an engine can register a plugin for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    Postgres,
    MySQL,
    MariaDB,
    Sqlite3,
    MongoDB,
    Redis,
    ElasticSearch,
    ClickHouse,
}

impl DatabaseType {
    /// All known backend kinds
    pub const ALL: [DatabaseType; 8] = [
        DatabaseType::Postgres,
        DatabaseType::MySQL,
        DatabaseType::MariaDB,
        DatabaseType::Sqlite3,
        DatabaseType::MongoDB,
        DatabaseType::Redis,
        DatabaseType::ElasticSearch,
        DatabaseType::ClickHouse,
    ];

    /// Canonical name, as used in configuration and environment variables
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "Postgres",
            DatabaseType::MySQL => "MySQL",
            DatabaseType::MariaDB => "MariaDB",
            DatabaseType::Sqlite3 => "Sqlite3",
            DatabaseType::MongoDB => "MongoDB",
            DatabaseType::Redis => "Redis",
            DatabaseType::ElasticSearch => "ElasticSearch",
            DatabaseType::ClickHouse => "ClickHouse",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatabaseType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("Unknown database type: {}", s)))
    }
}

// ============================================================================
// Records and Units
// ============================================================================

/// An ordered key/value pair, used for advanced options, attributes and
/// mutation input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            extra: HashMap::new(),
        }
    }
}

/// Looks up `key` in `records`, treating an empty value as absent
#[must_use]
pub fn get_record_value_or_default<'a>(records: &'a [Record], key: &str, default: &'a str) -> &'a str {
    records
        .iter()
        .find(|r| r.key == key && !r.value.is_empty())
        .map_or(default, |r| r.value.as_str())
}

/// A named, addressable data container and its descriptive attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUnit {
    pub name: String,
    pub attributes: Vec<Record>,
}

impl StorageUnit {
    /// Value of the named attribute, if reported
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

// ============================================================================
// Tabular Projection
// ============================================================================

/// Column of a unit's tabular projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }

    /// Shorthand for an untyped text column
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, "string")
    }
}

/// Rows read from a unit, with the columns describing them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
    /// Set when rows of this unit cannot be edited in place
    #[serde(default)]
    pub disable_update: bool,
}

impl RowsResult {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<String>>) -> Self {
        Self {
            columns,
            rows,
            disable_update: false,
        }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Names of the columns, in order
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

// ============================================================================
// Graph Types
// ============================================================================

/// Cardinality label of an inferred relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
    Unknown,
}

/// Directed relationship between two units' fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_unit: String,
    pub source_field: String,
    pub target_unit: String,
    pub target_field: String,
    pub relationship: RelationshipType,
}

// ============================================================================
// TLS Status
// ============================================================================

/// Configured transport security of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslStatus {
    pub is_enabled: bool,
    pub mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_parse() {
        assert_eq!("redis".parse::<DatabaseType>().unwrap(), DatabaseType::Redis);
        assert_eq!("MySQL".parse::<DatabaseType>().unwrap(), DatabaseType::MySQL);
        assert!("cassandra".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_record_lookup_skips_empty() {
        let records = vec![Record::new("Port", ""), Record::new("Port", "6380")];
        assert_eq!(get_record_value_or_default(&records, "Port", "6379"), "6380");
        assert_eq!(get_record_value_or_default(&records, "SSL Mode", "disabled"), "disabled");
    }

    #[test]
    fn test_storage_unit_attribute() {
        let unit = StorageUnit {
            name: "user:1".into(),
            attributes: vec![Record::new("Type", "hash"), Record::new("Size", "3")],
        };
        assert_eq!(unit.attribute("Type"), Some("hash"));
        assert_eq!(unit.attribute("Size"), Some("3"));
        assert_eq!(unit.attribute("Owner"), None);
    }
}
