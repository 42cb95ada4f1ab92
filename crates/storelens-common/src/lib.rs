//! Storelens Common - Shared utilities and types
//!
//! This crate provides common functionality used across all Storelens components:
//! - Error types and handling
//! - Connection and application configuration
//! - TLS options
//! - Common type definitions

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod ssl;
pub mod types;

pub use config::{Config, Credentials, PluginConfig, Profile};
pub use error::{Error, InputError, Result};
pub use types::*;
