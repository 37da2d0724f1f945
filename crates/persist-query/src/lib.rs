//! Statement building and query processing for the persist engine.
//!
//! `persist-query` turns model state into SQL and SQL results back into
//! models:
//!
//! - [`Cell`] is one column assignment (a bound value or a raw expression).
//! - [`StatementBuilder`] renders INSERT/UPDATE/DELETE statements and the
//!   relation bookkeeping primitives (one-to-one swap, join-table replace,
//!   bulk reparent) for a [`Dialect`](persist_core::Dialect).
//! - [`QueryProcessor`] interprets query fragments, runs SELECTs and
//!   materializes rows, including relation loading.
//! - [`DdlGenerator`] creates the tables a registry needs.

pub mod builder;
pub mod cell;
pub mod ddl;
pub mod processor;

pub use builder::{Statement, StatementBuilder};
pub use cell::{Cell, CellContent, insert_stamps, update_stamps};
pub use ddl::DdlGenerator;
pub use processor::{
    FragmentKind, QueryProcessor, classify, compiled, where_condition, with_limit,
};
