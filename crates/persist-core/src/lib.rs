//! Core types and traits for the persist engine.
//!
//! `persist-core` is the **contract layer** of the workspace. It defines what
//! the engine consumes and what drivers implement.
//!
//! # Role In The Architecture
//!
//! - **Models**: [`Model`] is a shared, sparse field bag with identity and
//!   per-field "set" markers; [`ModelSchema`] / [`SchemaRegistry`] describe
//!   model types and their relations, with ownership flags derived once.
//! - **Drivers**: [`Connection`] is the synchronous statement interface each
//!   database driver implements; [`Row`] and [`Value`] carry data across it.
//! - **Dialects**: [`Dialect`] answers quoting, placeholder, limit and type
//!   mapping questions so the layers above never branch on a database.
//!
//! # Who Uses This Crate
//!
//! - `persist-query` turns models into statements and rows back into models.
//! - `persist-engine` orders, writes and cascades model graphs.
//! - `persist-sqlite` implements [`Connection`] over SQLite.
//!
//! Most applications should use the `persist` facade.

pub mod connection;
pub mod dialect;
pub mod error;
pub mod fields_set;
pub mod model;
pub mod naming;
pub mod row;
pub mod schema;
pub mod types;
pub mod value;

pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{DriverError, Error, Result};
pub use fields_set::FieldsSet;
pub use model::{FieldValue, Model, ModelKey};
pub use naming::JoinTable;
pub use row::Row;
pub use schema::{
    AttributeInfo, CascadePolicy, FieldRef, ModelSchema, RelationInfo, RelationKind,
    SchemaRegistry, SchemaRegistryBuilder, Through,
};
pub use types::SqlType;
pub use value::Value;
