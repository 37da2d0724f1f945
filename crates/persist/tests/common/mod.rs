#![allow(dead_code)]

use std::sync::Once;

use persist::prelude::*;

static TRACING: Once = Once::new();

/// Route engine logs to the test writer; `RUST_LOG=persist_engine=trace`
/// shows every statement.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A small bookkeeping domain:
///
/// - `Account` 1:1 `Category` (the category holds the key),
/// - `Account` 1:n `Transaction` (deleted with the account),
/// - `Account` n:m `Tag`,
/// - `Person` parent/children tree (children are orphaned on destroy).
pub fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .model(
            ModelSchema::new("Account")
                .attr("name", SqlType::Text)
                .attr("kind", SqlType::Text)
                .relation(
                    RelationInfo::has_one("category", "Category")
                        .opposite("account")
                        .dependent(CascadePolicy::Nullify),
                )
                .relation(
                    RelationInfo::has_many("transactions", "Transaction")
                        .opposite("account")
                        .dependent(CascadePolicy::Delete),
                )
                .relation(RelationInfo::has_many("tags", "Tag").opposite("accounts"))
                .timestamps(),
        )
        .model(
            ModelSchema::new("Category")
                .attr("name", SqlType::Text)
                .relation(
                    RelationInfo::has_one("account", "Account")
                        .opposite("category")
                        .key(),
                ),
        )
        .model(
            ModelSchema::new("Transaction")
                .attr("amount", SqlType::Double)
                .attr("memo", SqlType::Text)
                .relation(RelationInfo::has_one("account", "Account").opposite("transactions")),
        )
        .model(
            ModelSchema::new("Tag")
                .attr("name", SqlType::Text)
                .relation(RelationInfo::has_many("accounts", "Account").opposite("tags")),
        )
        .model(
            ModelSchema::new("Person")
                .attr("name", SqlType::Text)
                .relation(RelationInfo::has_one("parent", "Person").opposite("children"))
                .relation(
                    RelationInfo::has_many("children", "Person")
                        .opposite("parent")
                        .dependent(CascadePolicy::Nullify),
                )
                .relation(
                    RelationInfo::has_many("grandchildren", "Person")
                        .through("children", "children"),
                ),
        )
        .build()
        .expect("valid schema");
    Arc::new(registry)
}

/// `Account` and `Category` deleting each other, and `Account` deleting its
/// tags.
pub fn cascading_registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .model(
            ModelSchema::new("Account")
                .attr("name", SqlType::Text)
                .relation(
                    RelationInfo::has_one("category", "Category")
                        .opposite("account")
                        .dependent(CascadePolicy::Delete),
                )
                .relation(
                    RelationInfo::has_many("tags", "Tag")
                        .opposite("accounts")
                        .dependent(CascadePolicy::Delete),
                ),
        )
        .model(
            ModelSchema::new("Category")
                .attr("name", SqlType::Text)
                .relation(
                    RelationInfo::has_one("account", "Account")
                        .opposite("category")
                        .key()
                        .dependent(CascadePolicy::Delete),
                ),
        )
        .model(
            ModelSchema::new("Tag")
                .attr("name", SqlType::Text)
                .relation(RelationInfo::has_many("accounts", "Account").opposite("tags")),
        )
        .build()
        .expect("valid schema");
    Arc::new(registry)
}

/// A persistor over a fresh in-memory database with every table created.
pub fn persistor() -> (Persistor<SqliteConnection>, Arc<SchemaRegistry>) {
    persistor_for(registry())
}

/// Like [`persistor`], over the tables of `registry`.
pub fn persistor_for(
    registry: Arc<SchemaRegistry>,
) -> (Persistor<SqliteConnection>, Arc<SchemaRegistry>) {
    init_tracing();
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    for stmt in DdlGenerator::new(Dialect::Sqlite).create_all(&registry) {
        conn.execute(&stmt, &[]).expect("create table");
    }
    (Persistor::new(conn, Arc::clone(&registry)), registry)
}

/// Single integer result of `sql`, with NULL as `None`.
pub fn int(p: &Persistor<SqliteConnection>, sql: &str, params: &[Value]) -> Option<i64> {
    p.execute_query_value(sql, params)
        .expect("scalar query")
        .and_then(|v| v.as_i64())
}

/// New model of `type_name` with `name` set.
pub fn named(registry: &SchemaRegistry, type_name: &str, name: &str) -> Model {
    let model = registry.model(type_name).expect("registered type");
    model.set("name", name).expect("name field");
    model
}
