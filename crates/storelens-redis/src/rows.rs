//! Row access and client-side filtering
//!
//! Each shape is projected onto string rows. Lists and sorted sets can be
//! read in an index window natively; everything else is read whole. Filters
//! are always evaluated here, after the read, since the backend has no
//! predicate language.

use tracing::{debug, warn};

use storelens_common::{Error, Result, RowsResult};
use storelens_engine::{FilterOperator, RowsQuery, WhereCondition};

use crate::client::KvConnection;
use crate::resp::Cmd;
use crate::shape::Shape;

pub type Row = Vec<String>;

// ============================================================================
// Filter
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterTarget {
    Column(usize),
    /// A mapping field name; compared against the `value` of that field's row
    MappingField(String),
    Nothing,
}

/// An atomic condition compiled against one shape's projection
#[derive(Debug, Clone)]
pub struct RowFilter {
    target: FilterTarget,
    operator: FilterOperator,
    value: String,
}

impl RowFilter {
    /// Rejects query forms this backend cannot serve. Runs before dialing.
    pub fn check_query(query: &RowsQuery) -> Result<()> {
        if !query.sort.is_empty() {
            warn!(columns = query.sort.len(), "Sorting is not available on key-value units");
            return Err(Error::unsupported("sort"));
        }
        if let Some(filter) = &query.filter {
            let atomic = filter.as_atomic().inspect_err(|_| {
                warn!("Compound filter rejected");
            })?;
            FilterOperator::parse(&atomic.operator)?;
        }
        Ok(())
    }

    pub fn compile(condition: &WhereCondition, shape: Shape) -> Result<Self> {
        let atomic = condition.as_atomic()?;
        let operator = FilterOperator::parse(&atomic.operator)?;
        let columns = shape.column_names();

        let target = match columns.iter().position(|c| *c == atomic.key) {
            Some(idx) => FilterTarget::Column(idx),
            None if shape == Shape::Mapping => FilterTarget::MappingField(atomic.key.clone()),
            None => FilterTarget::Nothing,
        };

        Ok(Self {
            target,
            operator,
            value: atomic.value.clone(),
        })
    }

    #[must_use]
    pub fn matches(&self, row: &[String]) -> bool {
        match &self.target {
            FilterTarget::Column(idx) => row
                .get(*idx)
                .is_some_and(|cell| self.operator.matches(cell, &self.value)),
            FilterTarget::MappingField(field) => {
                row.first().is_some_and(|f| f == field)
                    && row.get(1).is_some_and(|v| self.operator.matches(v, &self.value))
            }
            FilterTarget::Nothing => false,
        }
    }
}

// ============================================================================
// Reads
// ============================================================================

/// Reads the whole projection of `key`
pub async fn scan<K: KvConnection>(conn: &mut K, key: &str, shape: Shape) -> Result<Vec<Row>> {
    match shape {
        Shape::Scalar => {
            let value = conn.query(&Cmd::new("GET").arg(key)).await?.into_string()?;
            Ok(vec![vec![value.unwrap_or_default()]])
        }
        Shape::Mapping => {
            let flat = conn.query(&Cmd::new("HGETALL").arg(key)).await?.into_strings()?;
            let mut rows = pairs(flat, "HGETALL")?
                .into_iter()
                .map(|(field, value)| vec![field, value])
                .collect::<Vec<_>>();
            rows.sort();
            Ok(rows)
        }
        Shape::UniqueSet => {
            let mut members = conn.query(&Cmd::new("SMEMBERS").arg(key)).await?.into_strings()?;
            members.sort();
            Ok(indexed(0, members))
        }
        Shape::Sequence | Shape::OrderedSet => read_range(conn, key, shape, 0, None).await,
    }
}

/// Reads an index window of a list or sorted set. `stop` is inclusive;
/// `None` reads to the end. Indices in the result are absolute.
pub async fn read_range<K: KvConnection>(
    conn: &mut K,
    key: &str,
    shape: Shape,
    start: usize,
    stop: Option<usize>,
) -> Result<Vec<Row>> {
    let stop = stop.map_or("-1".to_string(), |s| s.to_string());
    debug!(unit = %key, shape = %shape, start, stop = %stop, "Range read");

    match shape {
        Shape::Sequence => {
            let values = conn
                .query(&Cmd::new("LRANGE").arg(key).arg(start).arg(stop))
                .await?
                .into_strings()?;
            Ok(indexed(start, values))
        }
        Shape::OrderedSet => {
            let flat = conn
                .query(&Cmd::new("ZRANGE").arg(key).arg(start).arg(stop).arg("WITHSCORES"))
                .await?
                .into_strings()?;
            pairs(flat, "ZRANGE")?
                .into_iter()
                .enumerate()
                .map(|(i, (member, score))| -> Result<Row> {
                    Ok(vec![(start + i).to_string(), member, format_score(&score)?])
                })
                .collect()
        }
        other => Err(Error::UnsupportedShape(format!("{} has no index range", other))),
    }
}

/// Rows of `key` for `query`
pub async fn get_rows<K: KvConnection>(conn: &mut K, key: &str, shape: Shape, query: &RowsQuery) -> Result<RowsResult> {
    RowFilter::check_query(query)?;
    let filter = query
        .filter
        .as_ref()
        .map(|f| RowFilter::compile(f, shape))
        .transpose()?;

    let rows = match (&filter, shape.has_native_range()) {
        (None, true) => match native_window(query) {
            Some((start, stop)) => read_range(conn, key, shape, start, stop).await?,
            None => Vec::new(),
        },
        (Some(filter), true) => {
            let matched = scan(conn, key, shape).await?.into_iter().filter(|r| filter.matches(r));
            window(matched, query).collect()
        }
        (filter, false) => {
            let mut rows = scan(conn, key, shape).await?;
            if let Some(filter) = filter {
                rows.retain(|r| filter.matches(r));
            }
            rows
        }
    };

    let mut result = RowsResult::new(shape.columns(), rows);
    result.disable_update = shape == Shape::UniqueSet;
    Ok(result)
}

/// Inclusive index window of a page as the backend takes it; `None` when the
/// page starts past any index the backend accepts
fn native_window(query: &RowsQuery) -> Option<(usize, Option<usize>)> {
    let max_index = usize::try_from(i64::MAX).unwrap_or(usize::MAX);
    if query.page_offset > max_index {
        return None;
    }
    let stop = match query.page_size {
        0 => None,
        // past the last index reads to the end
        size => query
            .page_offset
            .checked_add(size - 1)
            .filter(|stop| *stop <= max_index),
    };
    Some((query.page_offset, stop))
}

fn window<I: Iterator<Item = Row>>(rows: I, query: &RowsQuery) -> impl Iterator<Item = Row> {
    let take = if query.page_size == 0 { usize::MAX } else { query.page_size };
    rows.skip(query.page_offset).take(take)
}

fn indexed(start: usize, values: Vec<String>) -> Vec<Row> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| vec![(start + i).to_string(), v])
        .collect()
}

/// Splits a flat `k1 v1 k2 v2 ...` reply
fn pairs(flat: Vec<String>, command: &str) -> Result<Vec<(String, String)>> {
    if flat.len() % 2 != 0 {
        return Err(Error::Protocol(format!("{} returned an odd number of elements", command)));
    }
    let mut it = flat.into_iter();
    let mut out = Vec::new();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        out.push((k, v));
    }
    Ok(out)
}

/// Renders a score with two decimals
pub fn format_score(raw: &str) -> Result<String> {
    let score: f64 = raw
        .parse()
        .map_err(|e| Error::decode("score", format!("'{}': {}", raw, e)))?;
    Ok(format!("{:.2}", score))
}
