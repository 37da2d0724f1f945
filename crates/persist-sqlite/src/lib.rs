//! SQLite driver for the persist engine.
//!
//! [`SqliteConnection`] implements [`persist_core::Connection`] over a
//! bundled `rusqlite` database. Values are bound with SQLite's native
//! storage classes and read back as [`persist_core::Value`]s; integers always
//! come back as `BigInt`, so callers coerce to declared types.

pub mod config;
pub mod connection;

pub use config::SqliteConfig;
pub use connection::{SqliteConnection, from_rusqlite};
