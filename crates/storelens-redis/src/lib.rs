//! Storelens Redis - key-value adapter for the plugin contract
//!
//! A single key can hold one of five native shapes and may change shape
//! between calls, so every operation resolves the current shape with `TYPE`
//! before acting. Filtering always happens client-side; lists and sorted sets
//! are the only shapes paged natively.
//!
//! Two transports implement [`Connector`]:
//! - [`TcpConnector`]: RESP over TCP, optionally TLS
//! - [`MemoryConnector`]: an in-process keyspace speaking the same commands

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod db;
pub mod export;
pub mod memory;
pub mod metadata;
pub mod mutate;
pub mod plugin;
pub mod resp;
pub mod rows;
pub mod shape;
pub mod tcp;

pub use client::{ConnectTarget, Connector, KvConnection};
pub use db::ConnectionParams;
pub use memory::{MemoryConnection, MemoryConnector, MemoryStore};
pub use plugin::RedisPlugin;
pub use resp::{Cmd, Reply, ReplyDecoder};
pub use shape::Shape;
pub use tcp::{TcpConnection, TcpConnector};
