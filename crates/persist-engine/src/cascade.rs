//! Dependent handling around destroy.
//!
//! Destroying a row runs three stages:
//!
//! 1. [`DestroyStage::PreDestroy`]: children that reference the row are
//!    destroyed or nullified; ids that would be lost with the row (its own key
//!    columns, its join rows) are captured.
//! 2. [`DestroyStage::RowDeleted`]: join rows and the row itself are deleted.
//! 3. [`DestroyStage::PostDestroy`]: captured models are destroyed and
//!    one-to-one references held by the other side are nullified.
//!
//! Each destroy call keeps a visited set of `(type, id)` pairs, so mutual
//! `Delete` policies terminate. Nothing here opens a transaction; a failure
//! part way leaves earlier statements applied.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use persist_core::{
    CascadePolicy, Connection, Error, ModelSchema, RelationInfo, Result, SchemaRegistry, Value,
};
use persist_query::{Statement, StatementBuilder};

/// Progress of one row through destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyStage {
    /// Dependents are handled and lost ids captured.
    PreDestroy,
    /// Join rows and the row are deleted.
    RowDeleted,
    /// Captured dependents are handled.
    PostDestroy,
}

impl fmt::Display for DestroyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DestroyStage::PreDestroy => "pre-destroy",
            DestroyStage::RowDeleted => "row-deleted",
            DestroyStage::PostDestroy => "post-destroy",
        })
    }
}

/// Ids captured before the row disappears.
#[derive(Debug, Default)]
struct Captured {
    targets: Vec<(String, i64)>,
}

/// Destroys rows and applies their relations' cascade policies.
pub struct Cascade<'a, C: Connection + ?Sized> {
    conn: &'a C,
    registry: &'a SchemaRegistry,
    builder: StatementBuilder,
    visited: HashSet<(String, i64)>,
}

impl<'a, C: Connection + ?Sized> Cascade<'a, C> {
    /// A cascade with an empty visited set.
    pub fn new(conn: &'a C, registry: &'a SchemaRegistry, builder: StatementBuilder) -> Self {
        Self {
            conn,
            registry,
            builder,
            visited: HashSet::new(),
        }
    }

    fn exec(&self, stmt: &Statement) -> Result<u64> {
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "execute");
        self.conn.execute(&stmt.sql, &stmt.params)
    }

    fn ids(&self, stmt: &Statement) -> Result<Vec<i64>> {
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "query");
        Ok(self
            .conn
            .query(&stmt.sql, &stmt.params)?
            .iter()
            .filter_map(|row| row.get(0).and_then(Value::as_i64))
            .collect())
    }

    /// Destroy the row `type_name:id` and its dependents.
    ///
    /// Returns `false` if the pair was already handled by this cascade.
    pub fn destroy(&mut self, type_name: &str, id: i64) -> Result<bool> {
        if !self.visited.insert((type_name.to_string(), id)) {
            return Ok(false);
        }
        let schema = Arc::clone(self.registry.schema(type_name)?);

        tracing::debug!(model = type_name, id, stage = %DestroyStage::PreDestroy, "destroy");
        let captured = self.pre_destroy(&schema, id)?;

        tracing::debug!(model = type_name, id, stage = %DestroyStage::RowDeleted, "destroy");
        self.delete_row(&schema, id)?;

        tracing::debug!(model = type_name, id, stage = %DestroyStage::PostDestroy, "destroy");
        self.post_destroy(&schema, id, captured)?;
        Ok(true)
    }

    fn target_table(&self, rel: &RelationInfo) -> Result<String> {
        Ok(self.registry.schema(&rel.target)?.table_name().to_string())
    }

    fn opposite_column<'r>(&self, schema: &ModelSchema, rel: &'r RelationInfo) -> Result<&'r str> {
        rel.opposite_column.as_deref().ok_or_else(|| {
            Error::schema(format!(
                "{}.{} has no opposite column",
                schema.type_name(),
                rel.name
            ))
        })
    }

    fn pre_destroy(&mut self, schema: &ModelSchema, id: i64) -> Result<Captured> {
        let mut captured = Captured::default();
        for rel in schema.relations().iter().filter(|r| !r.is_through()) {
            match rel.dependent {
                CascadePolicy::Delete => {
                    if rel.many_to_one || (rel.one_to_one && !rel.has_key) {
                        let column = self.opposite_column(schema, rel)?;
                        let table = self.target_table(rel)?;
                        let children = self.ids(&self.builder.select_ids_where(&table, column, id))?;
                        tracing::debug!(model = schema.type_name(), id, field = %rel.name, count = children.len(), "cascade delete");
                        for child in children {
                            self.destroy(&rel.target, child)?;
                        }
                    } else if rel.stores_column() {
                        let stmt = self
                            .builder
                            .select_column_by_id(schema.table_name(), &rel.column, id);
                        for target in self.ids(&stmt)? {
                            captured.targets.push((rel.target.clone(), target));
                        }
                    } else if let Some(join) = &rel.join {
                        for member in self.ids(&self.builder.select_join_members(join, id))? {
                            captured.targets.push((rel.target.clone(), member));
                        }
                    }
                }
                CascadePolicy::Nullify if rel.is_has_many() && !rel.many_to_many => {
                    let column = self.opposite_column(schema, rel)?;
                    let table = self.target_table(rel)?;
                    tracing::debug!(model = schema.type_name(), id, field = %rel.name, "cascade nullify");
                    self.exec(&self.builder.nullify(&table, column, id))?;
                }
                CascadePolicy::Nullify | CascadePolicy::None => {}
            }
        }
        Ok(captured)
    }

    fn delete_row(&self, schema: &ModelSchema, id: i64) -> Result<()> {
        for join in schema
            .relations()
            .iter()
            .filter(|r| r.many_to_many && !r.is_through())
            .filter_map(|r| r.join.as_ref())
        {
            self.exec(&self.builder.delete_where(&join.table, &join.owner_column, id))?;
        }
        self.exec(&self.builder.delete_by_id(schema.table_name(), id))?;
        Ok(())
    }

    fn post_destroy(&mut self, schema: &ModelSchema, id: i64, captured: Captured) -> Result<()> {
        for (target, target_id) in captured.targets {
            self.destroy(&target, target_id)?;
        }
        for rel in schema
            .relations()
            .iter()
            .filter(|r| r.is_has_one() && !r.is_through() && !r.has_key)
            .filter(|r| r.dependent == CascadePolicy::Nullify)
        {
            let column = self.opposite_column(schema, rel)?;
            let table = self.target_table(rel)?;
            tracing::debug!(model = schema.type_name(), id, field = %rel.name, "nullify reference");
            self.exec(&self.builder.nullify(&table, column, id))?;
        }
        Ok(())
    }
}
