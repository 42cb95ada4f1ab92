//! Shape-dispatched mutations
//!
//! Every mutation is a single command once the shape is known, except list
//! deletion (index lookup, then removal) and unit creation from several
//! tagged fields (one command per field, no rollback).

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use storelens_common::{Error, InputError, Record, Result};

use crate::client::KvConnection;
use crate::resp::Cmd;
use crate::shape::Shape;

fn required<'a>(values: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    values
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| InputError::MissingField(name.to_string()).into())
}

fn required_record<'a>(values: &'a [Record], name: &str) -> Result<&'a str> {
    values
        .iter()
        .find(|r| r.key == name)
        .map(|r| r.value.as_str())
        .ok_or_else(|| InputError::MissingField(name.to_string()).into())
}

fn parse_score(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| Error::decode("score", format!("'{}': {}", raw, e)))
}

fn parse_index(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| InputError::BadIndex(raw.to_string()).into())
}

/// Rejects a shape that has no semantics for the requested mutation
fn unsupported(key: &str, shape: Shape, operation: &str) -> Error {
    warn!(unit = %key, shape = %shape, operation, "Mutation not available for shape");
    Error::UnsupportedShape(shape.native_name().to_string())
}

// ============================================================================
// Create
// ============================================================================

/// Command writing one tagged field of a new unit
fn field_command(key: &str, field: &Record) -> Result<Cmd> {
    let tag = field.key.as_str();
    let empty = || Error::decode(tag, "payload has no entries");

    let cmd = match tag {
        "string" => Cmd::new("SET").arg(key).arg(&field.value),
        "hash" => {
            let entries: BTreeMap<String, String> =
                serde_json::from_str(&field.value).map_err(|e| Error::decode(tag, e))?;
            if entries.is_empty() {
                return Err(empty());
            }
            entries
                .into_iter()
                .fold(Cmd::new("HSET").arg(key), |cmd, (f, v)| cmd.arg(f).arg(v))
        }
        "list" | "set" => {
            let items: Vec<String> = serde_json::from_str(&field.value).map_err(|e| Error::decode(tag, e))?;
            if items.is_empty() {
                return Err(empty());
            }
            Cmd::new(if tag == "list" { "RPUSH" } else { "SADD" }).arg(key).args(items)
        }
        "zset" => {
            let members: BTreeMap<String, f64> =
                serde_json::from_str(&field.value).map_err(|e| Error::decode(tag, e))?;
            if members.is_empty() {
                return Err(empty());
            }
            members
                .into_iter()
                .fold(Cmd::new("ZADD").arg(key), |cmd, (m, s)| cmd.arg(s).arg(m))
        }
        other => {
            warn!(unit = %key, tag = %other, "Unknown shape tag");
            return Err(Error::UnsupportedShape(other.to_string()));
        }
    };
    Ok(cmd)
}

/// Creates `key` from tagged fields, one command per field
pub async fn add_storage_unit<K: KvConnection>(conn: &mut K, key: &str, fields: &[Record]) -> Result<()> {
    if fields.is_empty() {
        return Err(InputError::NoValues.into());
    }
    for field in fields {
        let cmd = field_command(key, field)?;
        debug!(unit = %key, tag = %field.key, "Writing field");
        conn.query(&cmd).await?;
    }
    Ok(())
}

// ============================================================================
// Rows
// ============================================================================

pub async fn add_row<K: KvConnection>(conn: &mut K, key: &str, shape: Shape, values: &[Record]) -> Result<()> {
    if values.is_empty() {
        return Err(InputError::NoValues.into());
    }

    let cmd = match shape {
        Shape::Scalar => return Err(unsupported(key, shape, "add_row")),
        Shape::Mapping => values
            .iter()
            .fold(Cmd::new("HSET").arg(key), |cmd, r| cmd.arg(&r.key).arg(&r.value)),
        Shape::Sequence => Cmd::new("RPUSH").arg(key).args(values.iter().map(|r| &r.value)),
        Shape::UniqueSet => Cmd::new("SADD").arg(key).args(values.iter().map(|r| &r.value)),
        Shape::OrderedSet => {
            let member = required_record(values, "member")?;
            let score = parse_score(required_record(values, "score")?)?;
            Cmd::new("ZADD").arg(key).arg(score).arg(member)
        }
    };
    conn.query(&cmd).await?;
    Ok(())
}

pub async fn update<K: KvConnection>(
    conn: &mut K,
    key: &str,
    shape: Shape,
    values: &HashMap<String, String>,
) -> Result<()> {
    let cmd = match shape {
        Shape::Scalar => {
            if values.len() != 1 {
                return Err(InputError::WrongArity {
                    expected: 1,
                    actual: values.len(),
                }
                .into());
            }
            Cmd::new("SET").arg(key).arg(required(values, "value")?)
        }
        Shape::Mapping => {
            let field = required(values, "field")?;
            let value = required(values, "value")?;
            Cmd::new("HSET").arg(key).arg(field).arg(value)
        }
        Shape::Sequence => {
            let raw = required(values, "index")?;
            let value = required(values, "value")?;
            let index = parse_index(raw)?;
            return match conn.query(&Cmd::new("LSET").arg(key).arg(index).arg(value)).await {
                Err(Error::Backend(msg)) if msg.contains("index out of range") => {
                    Err(InputError::BadIndex(raw.to_string()).into())
                }
                other => other.map(|_| ()),
            };
        }
        Shape::UniqueSet => return Err(unsupported(key, shape, "update")),
        Shape::OrderedSet => {
            let member = required(values, "member")?;
            let score = parse_score(required(values, "score")?)?;
            Cmd::new("ZADD").arg(key).arg("XX").arg(score).arg(member)
        }
    };
    conn.query(&cmd).await?;
    Ok(())
}

pub async fn delete_row<K: KvConnection>(
    conn: &mut K,
    key: &str,
    shape: Shape,
    values: &HashMap<String, String>,
) -> Result<()> {
    let cmd = match shape {
        Shape::Scalar => Cmd::new("DEL").arg(key),
        Shape::Mapping => Cmd::new("HDEL").arg(key).arg(required(values, "field")?),
        Shape::Sequence => {
            let raw = required(values, "index")?;
            let index = parse_index(raw)?;
            let Some(value) = conn.query(&Cmd::new("LINDEX").arg(key).arg(index)).await?.into_bytes()? else {
                return Err(InputError::BadIndex(raw.to_string()).into());
            };
            // removes the first occurrence, which may precede `index`
            let removed = conn
                .query(&Cmd::new("LREM").arg(key).arg(1).arg_bytes(value))
                .await?
                .into_integer()?;
            if removed == 0 {
                warn!(key = %key, index = %raw, "List element changed before removal");
                return Err(InputError::BadIndex(raw.to_string()).into());
            }
            return Ok(());
        }
        Shape::UniqueSet => Cmd::new("SREM").arg(key).arg(required(values, "member")?),
        Shape::OrderedSet => Cmd::new("ZREM").arg(key).arg(required(values, "member")?),
    };
    conn.query(&cmd).await?;
    Ok(())
}
