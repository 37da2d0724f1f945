//! [`Connection`] over a `rusqlite` database handle.

use std::sync::Arc;

use persist_core::{Connection, Dialect, Error, Result, Row, Value};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use crate::config::SqliteConfig;

/// Wrap a `rusqlite` failure.
pub fn from_rusqlite(err: rusqlite::Error) -> Error {
    Error::driver(err)
}

/// Binds a [`Value`] as a SQLite parameter.
struct SqliteValue<'a>(&'a Value);

impl ToSql for SqliteValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(Sql::Integer(i64::from(*i))),
            Value::BigInt(i) => ToSqlOutput::Owned(Sql::Integer(*i)),
            Value::Double(f) => ToSqlOutput::Owned(Sql::Real(*f)),
            Value::Decimal(s) | Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
            Value::Json(v) => ToSqlOutput::Owned(Sql::Text(v.to_string())),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::BigInt(i),
        ValueRef::Real(f) => Value::Double(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// A synchronous SQLite connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open a database as described by `config`.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => rusqlite::Connection::open(path),
            None => rusqlite::Connection::open_in_memory(),
        }
        .map_err(from_rusqlite)?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)
            .map_err(from_rusqlite)?;
        conn.busy_timeout(config.busy_timeout)
            .map_err(from_rusqlite)?;
        tracing::debug!(
            path = ?config.path,
            foreign_keys = config.foreign_keys,
            "sqlite connection opened"
        );
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::default())
    }

    /// Run a batch of `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::trace!(sql = %sql, "execute batch");
        self.conn.execute_batch(sql).map_err(from_rusqlite)
    }

    /// Borrow the underlying `rusqlite` handle.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql).map_err(from_rusqlite)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let bound: Vec<SqliteValue<'_>> = params.iter().map(SqliteValue).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound.iter()))
            .map_err(from_rusqlite)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(from_rusqlite)? {
            let values = (0..columns.len())
                .map(|idx| row.get_ref(idx).map(value_from_ref))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(from_rusqlite)?;
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let bound: Vec<SqliteValue<'_>> = params.iter().map(SqliteValue).collect();
        let affected = self
            .conn
            .execute(sql, rusqlite::params_from_iter(bound.iter()))
            .map_err(from_rusqlite)?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let affected = self.execute(sql, params)?;
        if affected == 0 {
            return Ok(0);
        }
        Ok(self.conn.last_insert_rowid())
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}
