//! CREATE / DROP statements for a registered schema.
//!
//! Used to bootstrap databases for tests and tools; schema migration is not
//! handled here. Key and join columns are plain BIGINT columns without
//! constraints, so tables can be created in any order.

use std::collections::HashSet;

use persist_core::naming;
use persist_core::{Dialect, ModelSchema, SchemaRegistry, SqlType};

/// DDL generator for one dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DdlGenerator {
    dialect: Dialect,
}

impl DdlGenerator {
    /// Generator for `dialect`.
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// `CREATE TABLE` for one model's own table.
    pub fn create_table(&self, schema: &ModelSchema) -> String {
        let d = self.dialect;
        let mut columns = vec![format!("{} {}", d.quote_ident(naming::ID), d.id_column())];
        columns.extend(schema.attributes().iter().map(|attr| {
            format!("{} {}", d.quote_ident(&attr.column), d.column_type(attr.sql_type))
        }));
        columns.extend(
            schema
                .relations()
                .iter()
                .filter(|rel| rel.stores_column())
                .map(|rel| {
                    format!(
                        "{} {}",
                        d.quote_ident(&rel.column),
                        d.column_type(SqlType::BigInt)
                    )
                }),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            d.quote_ident(schema.table_name()),
            columns.join(", ")
        )
    }

    /// `CREATE TABLE` statements for every model table and join table.
    pub fn create_all(&self, registry: &SchemaRegistry) -> Vec<String> {
        tracing::debug!(dialect = self.dialect.name(), models = registry.len(), "Generating DDL");
        let d = self.dialect;
        let mut stmts: Vec<String> = registry.iter().map(|s| self.create_table(s)).collect();
        let mut joins = HashSet::new();
        for schema in registry.iter() {
            for join in schema.relations().iter().filter_map(|r| r.join.as_ref()) {
                if !joins.insert(join.table.clone()) {
                    continue;
                }
                let bigint = d.column_type(SqlType::BigInt);
                stmts.push(format!(
                    "CREATE TABLE IF NOT EXISTS {} ({} {bigint}, {} {bigint})",
                    d.quote_ident(&join.table),
                    d.quote_ident(&join.owner_column),
                    d.quote_ident(&join.member_column),
                ));
            }
        }
        stmts
    }

    /// `DROP TABLE` statements mirroring [`DdlGenerator::create_all`].
    pub fn drop_all(&self, registry: &SchemaRegistry) -> Vec<String> {
        let d = self.dialect;
        let mut tables: Vec<String> = Vec::new();
        for schema in registry.iter() {
            for join in schema.relations().iter().filter_map(|r| r.join.as_ref()) {
                if !tables.contains(&join.table) {
                    tables.push(join.table.clone());
                }
            }
        }
        tables.extend(registry.iter().map(|s| s.table_name().to_string()));
        tables
            .iter()
            .map(|t| format!("DROP TABLE IF EXISTS {}", d.quote_ident(t)))
            .collect()
    }
}
