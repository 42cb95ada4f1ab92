//! Filter, sort and paging arguments of row reads

use serde::{Deserialize, Serialize};

use storelens_common::{Error, Result};

/// Filter predicate handed to `get_rows`.
///
/// Adapters with a native query language may translate compound conditions.
/// Adapters that evaluate client-side accept only [`WhereCondition::Atomic`];
/// composing predicates is the caller's job there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhereCondition {
    Atomic(AtomicCondition),
    And(Vec<WhereCondition>),
    Or(Vec<WhereCondition>),
}

impl WhereCondition {
    /// Shorthand for an atomic `(key, operator, value)` condition
    pub fn atomic(key: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        WhereCondition::Atomic(AtomicCondition {
            key: key.into(),
            operator: operator.into(),
            value: value.into(),
            column_type: "string".to_string(),
        })
    }

    /// The single atomic condition, or `Unsupported` for compound forms
    pub fn as_atomic(&self) -> Result<&AtomicCondition> {
        match self {
            WhereCondition::Atomic(atomic) => Ok(atomic),
            WhereCondition::And(_) | WhereCondition::Or(_) => {
                Err(Error::unsupported("compound filter conditions"))
            }
        }
    }
}

/// One `(key, operator, value)` inclusion test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicCondition {
    pub key: String,
    pub operator: String,
    pub value: String,
    #[serde(default = "default_column_type")]
    pub column_type: String,
}

fn default_column_type() -> String {
    "string".to_string()
}

/// Operators available to client-side evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
}

impl FilterOperator {
    /// Parses `=`, `!=`, `>` or `<`; anything else is `Unsupported`
    pub fn parse(op: &str) -> Result<Self> {
        match op.trim() {
            "=" => Ok(FilterOperator::Eq),
            "!=" => Ok(FilterOperator::Ne),
            ">" => Ok(FilterOperator::Gt),
            "<" => Ok(FilterOperator::Lt),
            other => Err(Error::Unsupported(format!("filter operator '{}'", other))),
        }
    }

    /// Lexicographic comparison of `value` against `target`
    #[must_use]
    pub fn matches(&self, value: &str, target: &str) -> bool {
        match self {
            FilterOperator::Eq => value == target,
            FilterOperator::Ne => value != target,
            FilterOperator::Gt => value > target,
            FilterOperator::Lt => value < target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCondition {
    pub column: String,
    pub direction: SortDirection,
}

/// Arguments of a row read: optional filter, sort and page window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsQuery {
    pub filter: Option<WhereCondition>,
    #[serde(default)]
    pub sort: Vec<SortCondition>,
    /// Rows per page; zero reads to the end
    pub page_size: usize,
    pub page_offset: usize,
}

impl RowsQuery {
    #[must_use]
    pub fn page(page_size: usize, page_offset: usize) -> Self {
        Self {
            page_size,
            page_offset,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: WhereCondition) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortCondition {
            column: column.into(),
            direction,
        });
        self
    }
}
