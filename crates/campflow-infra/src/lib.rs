//! Infrastructure layer for Campflow.
//!
//! Implements the ports defined in `campflow-core`: SQLite repositories,
//! a local blob store, the tabular artifact analyzer and HTTP adapters for
//! the generator and publisher. Also loads `config.toml`.

pub mod analyzer;
pub mod blob;
pub mod config;
pub mod http;
pub mod sqlite;
