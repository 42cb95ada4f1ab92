//! Storage unit listing with `Type` and `Size` attributes
//!
//! Costs three round trips however many keys exist: `KEYS`, one `TYPE`
//! pipeline, one size pipeline.

use tracing::{debug, warn};

use storelens_common::{Record, Result, StorageUnit};

use crate::client::KvConnection;
use crate::resp::{Cmd, Reply};
use crate::shape::Shape;

pub const ATTR_TYPE: &str = "Type";
pub const ATTR_SIZE: &str = "Size";
pub const UNKNOWN_TYPE: &str = "unknown";

pub async fn get_storage_units<K: KvConnection>(conn: &mut K, pattern: &str) -> Result<Vec<StorageUnit>> {
    let mut keys = conn.query(&Cmd::new("KEYS").arg(pattern)).await?.into_strings()?;
    keys.sort();
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let type_cmds: Vec<Cmd> = keys.iter().map(|k| Cmd::new("TYPE").arg(k)).collect();
    let shapes: Vec<Option<Shape>> = conn
        .pipeline(&type_cmds)
        .await?
        .into_iter()
        .zip(&keys)
        .map(|(reply, key)| {
            let native = reply.into_string().ok().flatten().unwrap_or_default();
            let shape = Shape::from_native(&native);
            if shape.is_none() {
                warn!(unit = %key, native_type = %native, "Unknown shape during listing");
            }
            shape
        })
        .collect();

    let size_cmds: Vec<Cmd> = keys
        .iter()
        .zip(&shapes)
        .filter_map(|(key, shape)| shape.map(|s| s.size_command(key)))
        .collect();
    let mut sizes = if size_cmds.is_empty() {
        Vec::new()
    } else {
        conn.pipeline(&size_cmds).await?
    }
    .into_iter();

    let units = keys
        .into_iter()
        .zip(shapes)
        .map(|(name, shape)| {
            let attributes = match shape {
                None => vec![Record::new(ATTR_TYPE, UNKNOWN_TYPE)],
                Some(shape) => {
                    let mut attributes = vec![Record::new(ATTR_TYPE, shape.native_name())];
                    match sizes.next().map(Reply::into_integer) {
                        Some(Ok(size)) => attributes.push(Record::new(ATTR_SIZE, size.to_string())),
                        // key rewritten between the two pipelines
                        _ => warn!(unit = %name, "Size unavailable"),
                    }
                    attributes
                }
            };
            StorageUnit { name, attributes }
        })
        .collect::<Vec<_>>();

    debug!(count = units.len(), "Listed storage units");
    Ok(units)
}
