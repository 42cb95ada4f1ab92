//! Storelens Engine - the storage engine plugin contract
//!
//! Defines the operation set every backend adapter implements, the registry
//! that resolves a backend type to its adapter, and the filter and export
//! types the operations exchange.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod export;
pub mod filter;
pub mod plugin;

pub use engine::Engine;
pub use export::{format_typed_header, FnRowWriter, RowWriter, SelectedRow};
pub use filter::{AtomicCondition, FilterOperator, RowsQuery, SortCondition, SortDirection, WhereCondition};
pub use plugin::{ColumnConstraints, Plugin, PluginFunctions, TransactionOp};
