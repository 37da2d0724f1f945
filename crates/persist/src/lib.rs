//! Graph-aware relational persistence for dynamic models.
//!
//! Models are sparse field bags described by a [`SchemaRegistry`]: plain
//! attributes plus `hasOne`/`hasMany` relations carrying ownership and
//! cascade metadata. A [`Persistor`] writes whole graphs of them:
//!
//! ```ignore
//! use persist::prelude::*;
//!
//! let registry = Arc::new(
//!     SchemaRegistry::builder()
//!         .model(
//!             ModelSchema::new("Account")
//!                 .attr("name", SqlType::Text)
//!                 .relation(RelationInfo::has_one("category", "Category").opposite("account")),
//!         )
//!         .model(
//!             ModelSchema::new("Category")
//!                 .attr("name", SqlType::Text)
//!                 .relation(RelationInfo::has_one("account", "Account").opposite("category").key()),
//!         )
//!         .build()?,
//! );
//!
//! let persistor = Persistor::new(SqliteConnection::open_memory()?, Arc::clone(&registry));
//! let account = registry.model("Account")?;
//! let category = registry.model("Category")?;
//! account.set("name", "checking")?;
//! account.set("category", &category)?;
//! persistor.create(&account)?;
//! ```
//!
//! The workspace is split the usual way:
//!
//! - `persist-core`: values, rows, errors, schemas, models, the connection
//!   trait and dialects.
//! - `persist-query`: statement building, query processing and DDL.
//! - `persist-engine`: creation planning, deferred fields, cascades and the
//!   persistor.
//! - `persist-sqlite`: the SQLite driver (feature `sqlite`, on by default).

pub use persist_core::{
    AttributeInfo, CascadePolicy, Connection, Dialect, Error, FieldValue, JoinTable, Model,
    ModelKey, ModelSchema, RelationInfo, RelationKind, Result, Row, SchemaRegistry, SqlType,
    Value, naming,
};
pub use persist_engine::{
    Cascade, CreationPlan, DeferredQueue, DestroyStage, Persistor, PersistorConfig, UnitOfWork,
};
pub use persist_query::{Cell, DdlGenerator, QueryProcessor, Statement, StatementBuilder};

#[cfg(feature = "sqlite")]
pub use persist_sqlite::{SqliteConfig, SqliteConnection};

/// Everything needed to declare schemas and persist models.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        CascadePolicy, Connection, DdlGenerator, Dialect, Error, FieldValue, Model, ModelSchema,
        Persistor, PersistorConfig, RelationInfo, Result, SchemaRegistry, SqlType, UnitOfWork,
        Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::{SqliteConfig, SqliteConnection};
}
