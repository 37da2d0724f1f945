//! The persistor: create, update and destroy of model graphs, plus reads.
//!
//! A [`Persistor`] owns one [`Connection`] and a [`SchemaRegistry`]. Writes
//! are issued statement by statement; wrap them in
//! [`Persistor::unit_of_work`] or [`Persistor::transaction`] when they must be
//! atomic.
//!
//! # Create
//!
//! `create` plans the graph reachable from the root ([`CreationPlan`]),
//! collects the fields that need generated ids ([`DeferredQueue`]), inserts
//! every planned model and then resolves the queue. A key column whose target
//! is still new when its row is inserted is written as NULL and patched once
//! the target exists.
//!
//! # Update
//!
//! `update` writes only the fields marked set. Relation fields are applied
//! with the bookkeeping primitives of
//! [`StatementBuilder`](persist_query::StatementBuilder) before the row
//! itself is updated; an UPDATE matching no row is reported as
//! [`Error::NotFound`].

use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use persist_core::naming;
use persist_core::{
    Connection, Dialect, Error, FieldValue, Model, ModelSchema, RelationInfo, Result,
    SchemaRegistry, Value,
};
use persist_query::{
    Cell, QueryProcessor, Statement, StatementBuilder, compiled, insert_stamps, update_stamps,
};
use regex::Regex;

use crate::cascade::Cascade;
use crate::config::PersistorConfig;
use crate::deferred::{Deferred, DeferredQueue};
use crate::planner::CreationPlan;
use crate::unit_of_work::UnitOfWork;

static INSERT: OnceLock<Regex> = OnceLock::new();
static RETURNING: OnceLock<Regex> = OnceLock::new();

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn require_id(model: &Model) -> Result<i64> {
    model.persisted_id().ok_or_else(|| Error::NotPersisted {
        model: model.describe(),
    })
}

fn opposite_column<'r>(schema: &ModelSchema, rel: &'r RelationInfo) -> Result<&'r str> {
    rel.opposite_column.as_deref().ok_or_else(|| {
        Error::schema(format!(
            "{}.{} has no opposite column",
            schema.type_name(),
            rel.name
        ))
    })
}

/// Graph-aware persistence over one connection.
pub struct Persistor<C: Connection> {
    conn: C,
    registry: Arc<SchemaRegistry>,
    config: PersistorConfig,
    builder: StatementBuilder,
}

impl<C: Connection> Persistor<C> {
    /// Persistor with the default configuration.
    pub fn new(conn: C, registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(conn, registry, PersistorConfig::default())
    }

    /// Persistor with an explicit configuration.
    pub fn with_config(conn: C, registry: Arc<SchemaRegistry>, config: PersistorConfig) -> Self {
        let dialect = config.resolve_dialect(conn.dialect());
        tracing::debug!(dialect = dialect.name(), auto_stamps = config.auto_stamps, "persistor ready");
        Self {
            conn,
            registry,
            config,
            builder: StatementBuilder::new(dialect),
        }
    }

    /// Underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Registered schemas.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Dialect SQL is generated for.
    pub fn dialect(&self) -> Dialect {
        self.builder.dialect()
    }

    /// Active configuration.
    pub fn config(&self) -> &PersistorConfig {
        &self.config
    }

    /// Give the connection back.
    pub fn into_inner(self) -> C {
        self.conn
    }

    fn processor(&self) -> QueryProcessor<'_, C> {
        QueryProcessor::new(&self.conn, &self.registry, self.builder)
    }

    fn exec(&self, stmt: &Statement) -> Result<u64> {
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "execute");
        self.conn.execute(&stmt.sql, &stmt.params)
    }

    fn exec_all(&self, stmts: &[Statement]) -> Result<()> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn table_of(&self, type_name: &str) -> Result<String> {
        Ok(self.registry.schema(type_name)?.table_name().to_string())
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Insert `model` and every new model reachable from it.
    ///
    /// Returns the id of `model`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyPersisted`] if `model` already has an id.
    /// - [`Error::Unsupported`] if a planned model sets a `through` field.
    /// - [`Error::EmptyModel`] / [`Error::CreateFailed`] from the inserts.
    #[tracing::instrument(level = "debug", skip(self, model), fields(model = %model))]
    pub fn create(&self, model: &Model) -> Result<i64> {
        if !model.is_new() {
            return Err(Error::AlreadyPersisted {
                model: model.describe(),
            });
        }
        let plan = CreationPlan::for_root(model)?;
        let mut queue = DeferredQueue::collect(plan.models())?;
        let now = now_millis();

        for planned in plan.insertion_order() {
            self.insert_model(planned, &mut queue, now)?;
        }

        tracing::debug!(inserted = plan.len(), deferred = queue.len(), "resolving deferred fields");
        for item in queue.into_items() {
            self.resolve(item)?;
        }
        require_id(model)
    }

    /// [`Persistor::create`] for each model, in order.
    pub fn create_all(&self, models: &[Model]) -> Result<Vec<i64>> {
        models.iter().map(|m| self.create(m)).collect()
    }

    fn insert_model(&self, model: &Model, queue: &mut DeferredQueue, now: i64) -> Result<i64> {
        let schema = model.schema();
        let mut cells = Vec::new();

        for attr in schema.attributes() {
            if model.is_set(&attr.name) {
                let value = model.value(&attr.name).unwrap_or(Value::Null);
                cells.push(Cell::value(&attr.column, attr.sql_type, value));
            }
        }

        for rel in schema.relations().iter().filter(|r| r.stores_column()) {
            if !model.is_set(&rel.name) {
                continue;
            }
            let target_id = match model.one(&rel.name) {
                Some(target) if target.is_new() => {
                    queue.push_key_patch(model, &rel.name);
                    None
                }
                Some(target) => target.persisted_id(),
                None => None,
            };
            if rel.one_to_one {
                if let Some(target_id) = target_id {
                    self.exec(&self.builder.nullify(schema.table_name(), &rel.column, target_id))?;
                }
            }
            cells.push(Cell::key(&rel.column, target_id));
        }

        if self.config.auto_stamps {
            let stamps = insert_stamps(&schema, self.dialect(), now, &cells);
            cells.extend(stamps);
        }
        if cells.is_empty() {
            return Err(Error::EmptyModel {
                model: model.describe(),
            });
        }

        let stmt = self.builder.insert(schema.table_name(), &cells);
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "insert");
        let id = self.conn.insert(&stmt.sql, &stmt.params)?;
        if id < 1 {
            return Err(Error::CreateFailed {
                model: model.describe(),
            });
        }
        model.set_id(id);
        tracing::debug!(model = %model, "inserted");
        Ok(id)
    }

    fn resolve(&self, item: Deferred) -> Result<()> {
        match item {
            Deferred::KeyPatch { model, field } => {
                let schema = model.schema();
                let rel = schema.require_relation(&field)?;
                let id = require_id(&model)?;
                let target_id = model.one(&field).and_then(|t| t.persisted_id());
                if rel.one_to_one {
                    if let Some(target_id) = target_id {
                        self.exec(&self.builder.nullify(schema.table_name(), &rel.column, target_id))?;
                    }
                }
                tracing::debug!(model = %model, field = %field, "patch key");
                let cells = [Cell::key(&rel.column, target_id)];
                self.exec(&self.builder.update(schema.table_name(), id, &cells))?;
            }
            Deferred::JoinReplace { model, field } => {
                let members = model.many(&field);
                if members.is_empty() {
                    return Ok(());
                }
                let schema = model.schema();
                let rel = schema.require_relation(&field)?;
                let id = require_id(&model)?;
                self.replace_join(&schema, rel, id, &members)?;
            }
            Deferred::OneToOneSwap { model, field } => {
                let schema = model.schema();
                let rel = schema.require_relation(&field)?;
                let id = require_id(&model)?;
                let owner_id = self.ensure_created(model.one(&field))?;
                self.swap(&schema, rel, owner_id, id)?;
            }
            Deferred::Link {
                model,
                field,
                children,
            } => {
                let schema = model.schema();
                let rel = schema.require_relation(&field)?;
                let id = require_id(&model)?;
                let table = self.table_of(&rel.target)?;
                let column = opposite_column(&schema, rel)?;
                tracing::debug!(model = %model, field = %field, children = children.len(), "link children");
                if let Some(stmt) = self.builder.link_children(&table, column, id, &children) {
                    self.exec(&stmt)?;
                }
            }
        }
        Ok(())
    }

    /// Id of `target`, creating it first when it is new.
    fn ensure_created(&self, target: Option<Model>) -> Result<Option<i64>> {
        match target {
            Some(target) if target.is_new() => self.create(&target).map(Some),
            Some(target) => Ok(target.persisted_id()),
            None => Ok(None),
        }
    }

    fn member_ids(&self, members: &[Model]) -> Result<Vec<i64>> {
        members
            .iter()
            .map(|member| match member.persisted_id() {
                Some(id) => Ok(id),
                None => self.create(member),
            })
            .collect()
    }

    fn replace_join(
        &self,
        schema: &ModelSchema,
        rel: &RelationInfo,
        id: i64,
        members: &[Model],
    ) -> Result<()> {
        let join = rel.join.as_ref().ok_or_else(|| {
            Error::schema(format!("{}.{} has no join table", schema.type_name(), rel.name))
        })?;
        let member_ids = self.member_ids(members)?;
        tracing::debug!(model = schema.type_name(), id, field = %rel.name, members = member_ids.len(), "replace join rows");
        self.exec_all(&self.builder.many_to_many_replace(join, id, &member_ids))
    }

    fn swap(
        &self,
        schema: &ModelSchema,
        rel: &RelationInfo,
        owner_id: Option<i64>,
        id: i64,
    ) -> Result<()> {
        let table = self.table_of(&rel.target)?;
        let column = opposite_column(schema, rel)?;
        tracing::debug!(model = schema.type_name(), id, field = %rel.name, owner = ?owner_id, "one-to-one swap");
        self.exec(&self.builder.one_to_one_swap(&table, column, owner_id, id))?;
        Ok(())
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Write the set fields of a persisted model.
    ///
    /// Does nothing when no field is set. A stamped model always gets its row
    /// UPDATE, so relation-only changes still bump `updated_*` and detect a
    /// vanished row. New members of relation fields are created first.
    ///
    /// # Errors
    ///
    /// - [`Error::NotPersisted`] if `model` has no id.
    /// - [`Error::Unsupported`] if a `through` field is set.
    /// - [`Error::NotFound`] if the row no longer exists.
    #[tracing::instrument(level = "debug", skip(self, model), fields(model = %model))]
    pub fn update(&self, model: &Model) -> Result<()> {
        let id = require_id(model)?;
        if model.nothing_set() {
            tracing::debug!("nothing set, skipping update");
            return Ok(());
        }
        let schema = model.schema();
        if let Some(rel) = schema
            .relations()
            .iter()
            .find(|r| r.is_through() && model.is_set(&r.name))
        {
            return Err(Error::Unsupported(format!(
                "updating a through field is not supported: {}.{}",
                schema.type_name(),
                rel.name
            )));
        }

        let mut cells = Vec::new();
        for rel in schema.relations() {
            if !model.is_set(&rel.name) {
                continue;
            }
            if rel.is_has_one() {
                let target_id = self.ensure_created(model.one(&rel.name))?;
                if rel.one_to_one && !rel.has_key {
                    self.swap(&schema, rel, target_id, id)?;
                    continue;
                }
                if rel.one_to_one {
                    if let Some(target_id) = target_id {
                        self.exec(&self.builder.nullify(schema.table_name(), &rel.column, target_id))?;
                    }
                }
                cells.push(Cell::key(&rel.column, target_id));
            } else if rel.many_to_one {
                if rel.embedded {
                    continue;
                }
                self.reparent(&schema, rel, model, id)?;
            } else {
                self.replace_join(&schema, rel, id, &model.many(&rel.name))?;
            }
        }

        for attr in schema.attributes() {
            if attr.column == naming::CREATED_AT || attr.column == naming::CREATED_ON {
                continue;
            }
            if model.is_set(&attr.name) {
                let value = model.value(&attr.name).unwrap_or(Value::Null);
                cells.push(Cell::value(&attr.column, attr.sql_type, value));
            }
        }

        if self.config.auto_stamps {
            let stamps = update_stamps(&schema, self.dialect(), now_millis(), &cells);
            cells.extend(stamps);
        }
        if cells.is_empty() {
            return Ok(());
        }

        let affected = self.exec(&self.builder.update(schema.table_name(), id, &cells))?;
        if affected == 0 {
            return Err(Error::NotFound {
                model: schema.type_name().to_string(),
                id,
            });
        }
        Ok(())
    }

    fn reparent(&self, schema: &ModelSchema, rel: &RelationInfo, owner: &Model, id: i64) -> Result<()> {
        let mut child_ids = Vec::new();
        for child in owner.many(&rel.name) {
            if child.is_new() {
                if let Some(back) = &rel.opposite {
                    if !child.is_set(back) {
                        child.set(back, owner)?;
                    }
                }
                self.create(&child)?;
            }
            child_ids.extend(child.persisted_id());
        }
        let table = self.table_of(&rel.target)?;
        let column = opposite_column(schema, rel)?;
        tracing::debug!(model = schema.type_name(), id, field = %rel.name, children = child_ids.len(), "reparent children");
        self.exec_all(&self.builder.many_to_one_reparent(&table, column, id, &child_ids))
    }

    /// [`Persistor::update`] for each model, in order.
    pub fn update_all(&self, models: &[Model]) -> Result<()> {
        models.iter().try_for_each(|m| self.update(m))
    }

    // ========================================================================
    // Destroy
    // ========================================================================

    /// Delete the row of `model`, applying each relation's cascade policy.
    ///
    /// # Errors
    ///
    /// [`Error::NotPersisted`] if `model` has no id.
    #[tracing::instrument(level = "debug", skip(self, model), fields(model = %model))]
    pub fn destroy(&self, model: &Model) -> Result<()> {
        let id = require_id(model)?;
        let mut cascade = Cascade::new(&self.conn, &self.registry, self.builder);
        cascade.destroy(&model.type_name(), id)?;
        Ok(())
    }

    /// Destroy each model, sharing one visited set.
    pub fn destroy_all(&self, models: &[Model]) -> Result<()> {
        let mut cascade = Cascade::new(&self.conn, &self.registry, self.builder);
        for model in models {
            cascade.destroy(&model.type_name(), require_id(model)?)?;
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Model `type_name` with `id`; `None` if absent or `id < 1`.
    pub fn find(&self, type_name: &str, id: i64) -> Result<Option<Model>> {
        self.processor().find_by_id(type_name, id)
    }

    /// First model matching a query fragment.
    pub fn find_where(
        &self,
        type_name: &str,
        fragment: &str,
        params: &[Value],
    ) -> Result<Option<Model>> {
        self.processor().find(type_name, fragment, params)
    }

    /// Every model matching a query fragment.
    pub fn find_all(&self, type_name: &str, fragment: &str, params: &[Value]) -> Result<Vec<Model>> {
        self.processor().find_all(type_name, fragment, params)
    }

    /// Number of rows matching a query fragment.
    pub fn count(&self, type_name: &str, fragment: &str, params: &[Value]) -> Result<i64> {
        self.processor().count(type_name, fragment, params)
    }

    /// Refresh models from their rows.
    pub fn retrieve(&self, models: &[Model]) -> Result<()> {
        self.processor().retrieve(models)
    }

    /// Refresh models and load the named relations.
    pub fn retrieve_include(&self, models: &[Model], include: &[&str]) -> Result<()> {
        self.processor().retrieve_include(models, include)
    }

    /// Load one relation field from the database.
    pub fn load_relation(&self, model: &Model, field: &str) -> Result<FieldValue> {
        self.processor().load_relation(model, field)
    }

    // ========================================================================
    // Raw SQL
    // ========================================================================

    /// Rows as JSON objects keyed by column.
    pub fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<serde_json::Value>> {
        self.processor().query_maps(sql, params)
    }

    /// Rows as value lists.
    pub fn execute_query_lists(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        self.processor().query_lists(sql, params)
    }

    /// First column of the first row.
    pub fn execute_query_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        self.processor().query_value(sql, params)
    }

    /// First column of every row.
    pub fn execute_query_values(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        self.processor().query_values(sql, params)
    }

    /// Run a data-changing statement.
    ///
    /// An INSERT returns the generated id; anything else returns the number
    /// of affected rows.
    pub fn execute_update(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let insert = compiled(&INSERT, r"(?i)^\s*insert\b")?;
        if !insert.is_match(sql) {
            tracing::trace!(sql = %sql, params = params.len(), "execute");
            let affected = self.conn.execute(sql, params)?;
            return Ok(i64::try_from(affected).unwrap_or(i64::MAX));
        }
        let returning = compiled(&RETURNING, r"(?i)\breturning\b")?;
        let sql = if self.dialect().insert_returning_id() && !returning.is_match(sql) {
            format!(
                "{} RETURNING {}",
                sql.trim_end().trim_end_matches(';'),
                self.dialect().quote_ident(naming::ID)
            )
        } else {
            sql.to_string()
        };
        tracing::trace!(sql = %sql, params = params.len(), "insert");
        self.conn.insert(&sql, params)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction that rolls back unless committed.
    pub fn unit_of_work(&self) -> Result<UnitOfWork<'_, C>> {
        UnitOfWork::begin(self)
    }

    /// Run `f` in a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// A failed rollback is logged; the error of `f` is returned.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let uow = self.unit_of_work()?;
        match f(self) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl<C: Connection> std::fmt::Debug for Persistor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistor")
            .field("dialect", &self.dialect())
            .field("models", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
