//! SELECT execution and materialization of rows into models.
//!
//! Query fragments follow a small convention:
//!
//! - an empty fragment selects every row of the model's table,
//! - a fragment starting with `WHERE`, `ORDER BY`, `LIMIT` or `FETCH FIRST`
//!   (any case) is appended to `SELECT * FROM <table>`,
//! - anything else is taken to be a complete statement and run verbatim.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use persist_core::naming;
use persist_core::{
    Connection, Error, FieldValue, Model, ModelSchema, RelationInfo, Result, Row, SchemaRegistry,
    Value,
};
use regex::Regex;

use crate::builder::{Statement, StatementBuilder};

static APPENDABLE: OnceLock<Regex> = OnceLock::new();
static WHERE_END: OnceLock<Regex> = OnceLock::new();
static TRAILING_LIMIT: OnceLock<Regex> = OnceLock::new();

/// Compile `pattern` into `slot` on first use.
pub fn compiled(slot: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex> {
    if let Some(re) = slot.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern).map_err(|e| Error::Query(e.to_string()))?;
    Ok(slot.get_or_init(|| re))
}

/// How a fragment relates to the model's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// Blank fragment.
    Empty,
    /// Clause to append to `SELECT * FROM <table>`.
    Clause,
    /// A complete statement.
    Verbatim,
}

/// Classify a query fragment.
pub fn classify(fragment: &str) -> Result<FragmentKind> {
    if fragment.trim().is_empty() {
        return Ok(FragmentKind::Empty);
    }
    let re = compiled(
        &APPENDABLE,
        r"(?i)^\s*(where|order\s+by|limit|fetch\s+first)\b",
    )?;
    Ok(if re.is_match(fragment) {
        FragmentKind::Clause
    } else {
        FragmentKind::Verbatim
    })
}

/// The condition of a `WHERE …` fragment, without trailing ORDER BY / LIMIT.
///
/// Returns `Ok(None)` for fragments without a WHERE clause.
pub fn where_condition(fragment: &str) -> Result<Option<String>> {
    let trimmed = fragment.trim_start();
    let Some(rest) = trimmed
        .get(..5)
        .filter(|head| head.eq_ignore_ascii_case("where"))
        .map(|_| &trimmed[5..])
    else {
        return Ok(None);
    };
    let end = compiled(&WHERE_END, r"(?i)\b(order\s+by|limit|fetch\s+first)\b")?;
    let stop = end.find(rest).map_or(rest.len(), |m| m.start());
    let condition = rest[..stop].trim();
    if condition.is_empty() {
        return Err(Error::Query(format!("invalid sql format: {fragment}")));
    }
    Ok(Some(condition.to_string()))
}

/// Replace any trailing literal row limit of `sql` with the dialect's
/// `LIMIT n`.
///
/// A trailing limit bound to a placeholder is kept, so the caller's parameters
/// still line up; the first row is taken either way.
pub fn with_limit(sql: &str, builder: StatementBuilder, n: usize) -> Result<String> {
    let re = compiled(
        &TRAILING_LIMIT,
        r"(?i)\s+(limit\s+(\d+|\?\d*|\$\d+|:\w+)|fetch\s+first\s+\d+\s+rows?\s+only)\s*$",
    )?;
    let sql = sql.trim_end();
    let Some(caps) = re.captures(sql) else {
        return Ok(format!("{sql} {}", builder.dialect().limit_clause(n)));
    };
    let bound = caps
        .get(2)
        .is_some_and(|v| !v.as_str().starts_with(|c: char| c.is_ascii_digit()));
    if bound {
        return Ok(sql.to_string());
    }
    let start = caps.get(0).map_or(sql.len(), |m| m.start());
    Ok(format!("{} {}", &sql[..start], builder.dialect().limit_clause(n)))
}

/// Runs SELECTs for one connection and turns rows into [`Model`]s.
pub struct QueryProcessor<'a, C: Connection + ?Sized> {
    conn: &'a C,
    registry: &'a SchemaRegistry,
    builder: StatementBuilder,
}

impl<'a, C: Connection + ?Sized> QueryProcessor<'a, C> {
    /// Processor over `conn`, generating SQL with `builder`.
    pub fn new(conn: &'a C, registry: &'a SchemaRegistry, builder: StatementBuilder) -> Self {
        Self {
            conn,
            registry,
            builder,
        }
    }

    fn run(&self, stmt: &Statement) -> Result<Vec<Row>> {
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "query");
        self.conn.query(&stmt.sql, &stmt.params)
    }

    fn raw(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::trace!(sql = %sql, params = params.len(), "query");
        self.conn.query(sql, params)
    }

    /// The SELECT a fragment stands for.
    pub fn select_sql(&self, schema: &ModelSchema, fragment: &str) -> Result<String> {
        let table = self.builder.dialect().quote_ident(schema.table_name());
        Ok(match classify(fragment)? {
            FragmentKind::Empty => format!("SELECT * FROM {table}"),
            FragmentKind::Clause => format!("SELECT * FROM {table} {}", fragment.trim()),
            FragmentKind::Verbatim => fragment.trim().to_string(),
        })
    }

    /// First model matching a fragment.
    pub fn find(&self, type_name: &str, fragment: &str, params: &[Value]) -> Result<Option<Model>> {
        let schema = self.registry.schema(type_name)?;
        let sql = with_limit(&self.select_sql(schema, fragment)?, self.builder, 1)?;
        tracing::trace!(sql = %sql, params = params.len(), "query");
        self.conn
            .query_one(&sql, params)?
            .map(|row| self.materialize(schema, &row))
            .transpose()
    }

    /// Model with the given id; `None` for ids below 1 or missing rows.
    pub fn find_by_id(&self, type_name: &str, id: i64) -> Result<Option<Model>> {
        if id < 1 {
            return Ok(None);
        }
        let schema = self.registry.schema(type_name)?;
        let stmt = self.builder.select_by_ids(schema.table_name(), &[id]);
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "query");
        self.conn
            .query_one(&stmt.sql, &stmt.params)?
            .map(|row| self.materialize(schema, &row))
            .transpose()
    }

    /// Every model matching a fragment.
    pub fn find_all(&self, type_name: &str, fragment: &str, params: &[Value]) -> Result<Vec<Model>> {
        let schema = self.registry.schema(type_name)?;
        let sql = self.select_sql(schema, fragment)?;
        self.raw(&sql, params)?
            .iter()
            .map(|row| self.materialize(schema, row))
            .collect()
    }

    /// Number of rows matching the WHERE part of a fragment.
    pub fn count(&self, type_name: &str, fragment: &str, params: &[Value]) -> Result<i64> {
        let schema = self.registry.schema(type_name)?;
        let table = self.builder.dialect().quote_ident(schema.table_name());
        let sql = match classify(fragment)? {
            FragmentKind::Empty => format!("SELECT COUNT(*) FROM {table}"),
            FragmentKind::Clause => match where_condition(fragment)? {
                Some(condition) => format!("SELECT COUNT(*) FROM {table} WHERE {condition}"),
                None => format!("SELECT COUNT(*) FROM {table}"),
            },
            FragmentKind::Verbatim => {
                format!("SELECT COUNT(*) FROM ({}) counted", fragment.trim())
            }
        };
        let value = self.query_value(&sql, params)?;
        Ok(value.as_ref().and_then(Value::as_i64).unwrap_or(0))
    }

    /// Build a model from a row of its table.
    ///
    /// Values are stored without set markers. Key columns become id-only
    /// stubs of the referenced type.
    pub fn materialize(&self, schema: &Arc<ModelSchema>, row: &Row) -> Result<Model> {
        let model = Model::new(Arc::clone(schema));
        self.fill(&model, row)?;
        Ok(model)
    }

    fn fill(&self, model: &Model, row: &Row) -> Result<()> {
        let schema = model.schema();
        for (column, value) in row.iter() {
            if column.eq_ignore_ascii_case(naming::ID) {
                if let Some(id) = value.as_i64() {
                    model.set_id(id);
                }
            } else if let Some(attr) = schema.attribute_for_column(column) {
                model.put(&attr.name, value.clone().coerce(attr.sql_type))?;
            } else if let Some(rel) = schema.key_relation_for_column(column) {
                let stub = match value.as_i64() {
                    Some(id) => Some(Model::stub(Arc::clone(self.registry.schema(&rel.target)?), id)),
                    None => None,
                };
                model.put(&rel.name, stub)?;
            }
        }
        Ok(())
    }

    /// Load a relation field of a persisted model from the database and store
    /// it on the model (unmarked). New models yield an empty value.
    pub fn load_relation(&self, model: &Model, field: &str) -> Result<FieldValue> {
        let schema = model.schema();
        let rel = schema.require_relation(field)?;
        let value = match model.persisted_id() {
            Some(id) => self.fetch_relation(&schema, rel, model, id)?,
            None => shape(rel, Vec::new()),
        };
        model.put(field, value.clone())?;
        Ok(value)
    }

    fn fetch_relation(
        &self,
        schema: &ModelSchema,
        rel: &RelationInfo,
        model: &Model,
        id: i64,
    ) -> Result<FieldValue> {
        let target = self.registry.schema(&rel.target)?;

        if let Some(through) = &rel.through {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for step in members(self.load_relation(model, &through.via)?) {
                for end in members(self.load_relation(&step, &through.target_field)?) {
                    if seen.insert(end.id()) {
                        out.push(end);
                    }
                }
            }
            return Ok(shape(rel, out));
        }

        let rows = if rel.stores_column() {
            let stmt = self
                .builder
                .select_column_by_id(schema.table_name(), &rel.column, id);
            let referenced = self
                .run(&stmt)?
                .first()
                .and_then(|row| row.get(0))
                .and_then(Value::as_i64);
            match referenced {
                Some(ref_id) => self.run(&self.builder.select_by_ids(target.table_name(), &[ref_id]))?,
                None => Vec::new(),
            }
        } else if let Some(join) = &rel.join {
            self.run(&self.builder.select_join_targets(target.table_name(), join, id))?
        } else {
            let column = rel.opposite_column.as_deref().ok_or_else(|| {
                Error::schema(format!(
                    "{}.{} has no column to load from",
                    schema.type_name(),
                    rel.name
                ))
            })?;
            self.run(&self.builder.select_referencing(target.table_name(), column, id))?
        };

        let loaded = rows
            .iter()
            .map(|row| self.materialize(target, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(shape(rel, loaded))
    }

    /// Refresh the given models from their rows, one query per model type.
    ///
    /// New models and models whose row no longer exists are left untouched.
    pub fn retrieve(&self, models: &[Model]) -> Result<()> {
        let mut groups: Vec<(String, Vec<&Model>)> = Vec::new();
        for model in models.iter().filter(|m| !m.is_new()) {
            let type_name = model.type_name();
            match groups.iter_mut().find(|(t, _)| *t == type_name) {
                Some((_, group)) => group.push(model),
                None => groups.push((type_name, vec![model])),
            }
        }

        for (type_name, group) in groups {
            let schema = self.registry.schema(&type_name)?;
            let ids: Vec<i64> = group.iter().filter_map(|m| m.persisted_id()).collect();
            for row in self.run(&self.builder.select_by_ids(schema.table_name(), &ids))? {
                let row_id = row.get_named(naming::ID).and_then(Value::as_i64);
                for model in group.iter().filter(|m| m.id() == row_id) {
                    self.fill(model, &row)?;
                }
            }
        }
        Ok(())
    }

    /// [`QueryProcessor::retrieve`], then load each `include` relation.
    pub fn retrieve_include(&self, models: &[Model], include: &[&str]) -> Result<()> {
        self.retrieve(models)?;
        for model in models.iter().filter(|m| !m.is_new()) {
            for field in include {
                self.load_relation(model, field)?;
            }
        }
        Ok(())
    }

    /// Rows as JSON objects keyed by column name.
    pub fn query_maps(&self, sql: &str, params: &[Value]) -> Result<Vec<serde_json::Value>> {
        Ok(self.raw(sql, params)?.iter().map(Row::to_json).collect())
    }

    /// Rows as value lists, in select order.
    pub fn query_lists(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        Ok(self
            .raw(sql, params)?
            .into_iter()
            .map(Row::into_values)
            .collect())
    }

    /// First column of the first row.
    pub fn query_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self
            .raw(sql, params)?
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// First column of every row.
    pub fn query_values(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        Ok(self
            .raw(sql, params)?
            .into_iter()
            .filter_map(|row| row.into_values().into_iter().next())
            .collect())
    }
}

fn shape(rel: &RelationInfo, mut models: Vec<Model>) -> FieldValue {
    if rel.is_has_one() {
        FieldValue::One(if models.is_empty() {
            None
        } else {
            Some(models.swap_remove(0))
        })
    } else {
        FieldValue::Many(models)
    }
}

fn members(value: FieldValue) -> Vec<Model> {
    match value {
        FieldValue::One(one) => one.into_iter().collect(),
        FieldValue::Many(many) => many,
        FieldValue::Value(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persist_core::{Dialect, RelationInfo, SqlType};
    use std::cell::RefCell;

    #[test]
    fn test_classify_fragments() {
        assert_eq!(classify("").unwrap(), FragmentKind::Empty);
        assert_eq!(classify("   ").unwrap(), FragmentKind::Empty);
        assert_eq!(classify("where id = 1").unwrap(), FragmentKind::Clause);
        assert_eq!(classify("  ORDER  BY name").unwrap(), FragmentKind::Clause);
        assert_eq!(classify("Limit 3").unwrap(), FragmentKind::Clause);
        assert_eq!(classify("wherever").unwrap(), FragmentKind::Verbatim);
        assert_eq!(classify("select * from x").unwrap(), FragmentKind::Verbatim);
    }

    #[test]
    fn test_where_condition() {
        assert_eq!(
            where_condition("where a = 1 order by b limit 2").unwrap(),
            Some("a = 1".to_string())
        );
        assert_eq!(
            where_condition("WHERE name = ?").unwrap(),
            Some("name = ?".to_string())
        );
        assert_eq!(where_condition("order by b").unwrap(), None);
        assert!(where_condition("where order by b").is_err());
    }

    #[test]
    fn test_with_limit_replaces_existing() {
        let b = StatementBuilder::new(Dialect::Sqlite);
        assert_eq!(
            with_limit("SELECT * FROM t LIMIT 10", b, 1).unwrap(),
            "SELECT * FROM t LIMIT 1"
        );
        assert_eq!(
            with_limit("SELECT * FROM t WHERE a = ?1 LIMIT ?2 ", b, 1).unwrap(),
            "SELECT * FROM t WHERE a = ?1 LIMIT ?2"
        );
        assert_eq!(
            with_limit("SELECT * FROM t limit ?", b, 1).unwrap(),
            "SELECT * FROM t limit ?"
        );
        let pg = StatementBuilder::new(Dialect::Postgres);
        assert_eq!(
            with_limit("SELECT * FROM t LIMIT $1", pg, 1).unwrap(),
            "SELECT * FROM t LIMIT $1"
        );
        let derby = StatementBuilder::new(Dialect::Derby);
        assert_eq!(
            with_limit("SELECT * FROM t", derby, 1).unwrap(),
            "SELECT * FROM t FETCH FIRST 1 ROWS ONLY"
        );
    }

    struct Canned {
        rows: Vec<Row>,
        seen: RefCell<Vec<String>>,
    }

    impl Connection for Canned {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            self.seen.borrow_mut().push(sql.to_string());
            Ok(self.rows.clone())
        }

        fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            Ok(0)
        }

        fn insert(&self, _sql: &str, _params: &[Value]) -> Result<i64> {
            Ok(0)
        }
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .model(
                ModelSchema::new("Account")
                    .attr("active", SqlType::Boolean)
                    .relation(
                        RelationInfo::has_many("transactions", "Transaction").opposite("account"),
                    ),
            )
            .model(
                ModelSchema::new("Transaction")
                    .attr("amount", SqlType::Double)
                    .relation(RelationInfo::has_one("account", "Account").opposite("transactions")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_materialize_coerces_and_stubs() {
        let registry = registry();
        let columns: Arc<[String]> =
            vec!["id".to_string(), "amount".to_string(), "account".to_string()].into();
        let conn = Canned {
            rows: vec![Row::new(
                columns,
                vec![Value::BigInt(3), Value::BigInt(12), Value::BigInt(9)],
            )],
            seen: RefCell::new(Vec::new()),
        };
        let processor = QueryProcessor::new(&conn, &registry, StatementBuilder::new(Dialect::Sqlite));
        let tx = processor
            .find("Transaction", "where amount > ?", &[Value::Int(1)])
            .unwrap()
            .unwrap();

        assert_eq!(tx.id(), Some(3));
        assert_eq!(tx.value("amount"), Some(Value::Double(12.0)));
        assert!(!tx.is_set("amount"));
        let account = tx.one("account").unwrap();
        assert_eq!(account.type_name(), "Account");
        assert_eq!(account.id(), Some(9));
        assert_eq!(
            conn.seen.borrow()[0],
            "SELECT * FROM \"transactions\" where amount > ? LIMIT 1"
        );
    }

    #[test]
    fn test_find_by_id_below_one_skips_query() {
        let registry = registry();
        let conn = Canned {
            rows: Vec::new(),
            seen: RefCell::new(Vec::new()),
        };
        let processor = QueryProcessor::new(&conn, &registry, StatementBuilder::new(Dialect::Sqlite));
        assert!(processor.find_by_id("Account", 0).unwrap().is_none());
        assert!(conn.seen.borrow().is_empty());
    }

    #[test]
    fn test_count_uses_where_part() {
        let registry = registry();
        let columns: Arc<[String]> = vec!["count".to_string()].into();
        let conn = Canned {
            rows: vec![Row::new(columns, vec![Value::BigInt(4)])],
            seen: RefCell::new(Vec::new()),
        };
        let processor = QueryProcessor::new(&conn, &registry, StatementBuilder::new(Dialect::Sqlite));
        let n = processor
            .count("Account", "where active = ?1 order by id limit 2", &[Value::Bool(true)])
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(
            conn.seen.borrow()[0],
            "SELECT COUNT(*) FROM \"accounts\" WHERE active = ?1"
        );
    }
}
