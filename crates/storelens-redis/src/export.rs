//! Row export through a caller-supplied writer

use tracing::debug;

use storelens_common::Result;
use storelens_engine::export::{bare_headers, render_selected};
use storelens_engine::{RowWriter, SelectedRow};

use crate::client::KvConnection;
use crate::rows;
use crate::shape::Shape;

/// Writes the header and then every row of `key`.
///
/// Lists and sorted sets are read in chunks of `batch_size` so they reach
/// the writer without being held whole.
pub async fn export_unit<K: KvConnection>(
    conn: &mut K,
    key: &str,
    shape: Shape,
    writer: &mut dyn RowWriter,
    selected_rows: Option<&[SelectedRow]>,
    batch_size: usize,
) -> Result<()> {
    let columns = shape.columns();
    writer.write_row(bare_headers(&columns))?;

    if let Some(selected) = selected_rows.filter(|rows| !rows.is_empty()) {
        for row in selected {
            writer.write_row(render_selected(&columns, row))?;
        }
        return Ok(());
    }

    if !shape.has_native_range() {
        for row in rows::scan(conn, key, shape).await? {
            writer.write_row(row)?;
        }
        return Ok(());
    }

    let batch_size = batch_size.max(1);
    let mut start = 0;
    loop {
        let chunk = rows::read_range(conn, key, shape, start, Some(start + batch_size - 1)).await?;
        let len = chunk.len();
        for row in chunk {
            writer.write_row(row)?;
        }
        start += len;
        if len < batch_size {
            break;
        }
    }
    debug!(unit = %key, rows = start, "Export finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ConnectTarget, Connector};
    use crate::memory::{MemoryConnection, MemoryConnector, MemoryStore};
    use std::sync::Arc;
    use storelens_common::Error;
    use storelens_engine::FnRowWriter;

    async fn connect(store: &Arc<MemoryStore>) -> MemoryConnection {
        MemoryConnector::new(Arc::clone(store))
            .connect(&ConnectTarget {
                host: "memory".into(),
                port: 6379,
                tls: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scalar_export_two_lines() {
        let store = Arc::new(MemoryStore::new());
        store.seed(0, &["SET", "greeting", "hello"]);
        let mut conn = connect(&store).await;

        let mut out: Vec<Vec<String>> = Vec::new();
        export_unit(&mut conn, "greeting", Shape::Scalar, &mut out, None, 100).await.unwrap();
        assert_eq!(out, vec![vec!["value".to_string()], vec!["hello".to_string()]]);
    }

    #[tokio::test]
    async fn test_list_export_chunked() {
        let store = Arc::new(MemoryStore::new());
        store.seed(0, &["RPUSH", "l", "a", "b", "c", "d", "e"]);
        let mut conn = connect(&store).await;
        let before = store.round_trips();

        let mut out: Vec<Vec<String>> = Vec::new();
        export_unit(&mut conn, "l", Shape::Sequence, &mut out, None, 2).await.unwrap();

        assert_eq!(out.len(), 6);
        assert_eq!(out[5], vec!["4".to_string(), "e".to_string()]);
        // chunks of 2, 2, 1
        assert_eq!(store.round_trips() - before, 3);
    }

    #[tokio::test]
    async fn test_selected_rows_skip_backend() {
        let store = Arc::new(MemoryStore::new());
        let mut conn = connect(&store).await;
        let before = store.round_trips();

        let selected: Vec<SelectedRow> = vec![[("member".to_string(), "alice".to_string())].into_iter().collect()];
        let mut out: Vec<Vec<String>> = Vec::new();
        export_unit(&mut conn, "board", Shape::OrderedSet, &mut out, Some(selected.as_slice()), 10)
            .await
            .unwrap();

        assert_eq!(out[1], vec![String::new(), "alice".to_string(), String::new()]);
        assert_eq!(store.round_trips(), before);
    }

    #[tokio::test]
    async fn test_set_export_sorted() {
        let store = Arc::new(MemoryStore::new());
        store.seed(0, &["SADD", "tags", "zig", "go", "rust"]);
        let mut conn = connect(&store).await;

        let none: Vec<SelectedRow> = Vec::new();
        let mut out: Vec<Vec<String>> = Vec::new();
        export_unit(&mut conn, "tags", Shape::UniqueSet, &mut out, Some(none.as_slice()), 10)
            .await
            .unwrap();
        let values: Vec<&str> = out[1..].iter().map(|r| r[1].as_str()).collect();
        assert_eq!(values, vec!["go", "rust", "zig"]);
    }

    #[tokio::test]
    async fn test_writer_error_aborts() {
        let store = Arc::new(MemoryStore::new());
        store.seed(0, &["RPUSH", "l", "a", "b"]);
        let mut conn = connect(&store).await;

        let mut written = 0;
        let mut writer = FnRowWriter(|_row: Vec<String>| {
            written += 1;
            if written > 1 {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        });
        let err = export_unit(&mut conn, "l", Shape::Sequence, &mut writer, None, 10).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
