//! Row writers used by `export_data`
//!
//! The contract only produces header and data rows; file formats and
//! buffering belong to whoever implements [`RowWriter`].

use std::collections::HashMap;

use storelens_common::{Column, Result};

/// A row previously shown to the caller, keyed by column name
pub type SelectedRow = HashMap<String, String>;

/// Sink for exported rows. The first row written is always the header.
pub trait RowWriter: Send {
    fn write_row(&mut self, row: Vec<String>) -> Result<()>;
}

impl RowWriter for Vec<Vec<String>> {
    fn write_row(&mut self, row: Vec<String>) -> Result<()> {
        self.push(row);
        Ok(())
    }
}

/// Adapts a closure into a [`RowWriter`]
pub struct FnRowWriter<F>(pub F);

impl<F> RowWriter for FnRowWriter<F>
where
    F: FnMut(Vec<String>) -> Result<()> + Send,
{
    fn write_row(&mut self, row: Vec<String>) -> Result<()> {
        (self.0)(row)
    }
}

/// Header label for backends with a declared column type
#[must_use]
pub fn format_typed_header(name: &str, ty: &str) -> String {
    format!("{} [{}]", name, ty)
}

/// Bare column names, for backends without an independent schema
#[must_use]
pub fn bare_headers(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

/// Re-renders a selected row in column order; absent cells are empty
#[must_use]
pub fn render_selected(columns: &[Column], row: &SelectedRow) -> Vec<String> {
    columns
        .iter()
        .map(|c| row.get(&c.name).cloned().unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_header() {
        assert_eq!(format_typed_header("id", "integer"), "id [integer]");
    }

    #[test]
    fn test_render_selected_in_column_order() {
        let columns = vec![Column::string("index"), Column::string("member"), Column::string("score")];
        let row: SelectedRow = [("score", "1.50"), ("member", "alice")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert_eq!(render_selected(&columns, &row), vec!["", "alice", "1.50"]);
        assert_eq!(bare_headers(&columns), vec!["index", "member", "score"]);
    }

    #[test]
    fn test_fn_writer_propagates_errors() {
        let mut count = 0;
        let mut writer = FnRowWriter(|_row: Vec<String>| {
            count += 1;
            if count > 1 {
                Err(storelens_common::Error::Backend("disk full".into()))
            } else {
                Ok(())
            }
        });
        assert!(writer.write_row(vec!["a".into()]).is_ok());
        assert!(writer.write_row(vec!["b".into()]).is_err());
    }
}
