//! Database connection contract.
//!
//! Drivers implement [`Connection`]; the engine only ever talks to this trait.
//! All calls are synchronous and blocking. A connection is used by one caller
//! at a time; the engine performs no locking of its own.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// An open relational connection able to run parameterized statements.
pub trait Connection {
    /// Dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Run a SELECT and return every row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run an INSERT and return the generated id.
    ///
    /// Implementations return `0` or a negative number when the database did
    /// not report an id.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Run a SELECT and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Open a transaction.
    fn begin(&self) -> Result<()> {
        self.execute(self.dialect().begin_sql(), &[]).map(|_| ())
    }

    /// Commit the open transaction.
    fn commit(&self) -> Result<()> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    /// Roll back the open transaction.
    fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }
}

impl<C: Connection + ?Sized> Connection for &C {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        (**self).insert(sql, params)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }
}
