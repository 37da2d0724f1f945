//! SQL dialect rules.
//!
//! Everything that differs between databases (identifier quoting, parameter
//! placeholders, row limits, generated keys, column types) is answered here so
//! statement generation never branches on a concrete database elsewhere.

use serde::{Deserialize, Serialize};

use crate::types::SqlType;

/// Target database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// PostgreSQL: `"ident"`, `$1` placeholders, `RETURNING` for generated ids.
    #[default]
    Postgres,
    /// SQLite: `"ident"`, `?1` placeholders.
    Sqlite,
    /// MySQL: `` `ident` ``, `?` placeholders.
    Mysql,
    /// Apache Derby: `"ident"`, `?` placeholders, `FETCH FIRST` limits.
    Derby,
}

impl Dialect {
    /// Short lowercase name, used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
            Dialect::Derby => "derby",
        }
    }

    /// Quote an identifier, escaping embedded quote characters.
    pub fn quote_ident(self, ident: &str) -> String {
        let quote = match self {
            Dialect::Mysql => '`',
            Dialect::Postgres | Dialect::Sqlite | Dialect::Derby => '"',
        };
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(quote);
        for ch in ident.chars() {
            if ch == quote {
                out.push(quote);
            }
            out.push(ch);
        }
        out.push(quote);
        out
    }

    /// Placeholder for the 1-based parameter `idx`.
    pub fn placeholder(self, idx: usize) -> String {
        match self {
            Dialect::Postgres => format!("${idx}"),
            Dialect::Sqlite => format!("?{idx}"),
            Dialect::Mysql | Dialect::Derby => "?".to_string(),
        }
    }

    /// Clause restricting a SELECT to `n` rows.
    pub fn limit_clause(self, n: usize) -> String {
        match self {
            Dialect::Derby => format!("FETCH FIRST {n} ROWS ONLY"),
            Dialect::Postgres | Dialect::Sqlite | Dialect::Mysql => format!("LIMIT {n}"),
        }
    }

    /// Statement opening a transaction.
    pub const fn begin_sql(self) -> &'static str {
        match self {
            Dialect::Mysql => "START TRANSACTION",
            Dialect::Postgres | Dialect::Sqlite | Dialect::Derby => "BEGIN",
        }
    }

    /// Whether INSERT statements must ask for the generated id with `RETURNING`.
    pub const fn insert_returning_id(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Literal for an epoch-millisecond stamp inlined into a statement.
    pub fn epoch_millis_literal(self, millis: i64) -> String {
        millis.to_string()
    }

    /// Server-side expression for the current calendar date.
    pub const fn current_date(self) -> &'static str {
        "CURRENT_DATE"
    }

    /// Column type for a [`SqlType`].
    pub const fn column_type(self, sql_type: SqlType) -> &'static str {
        match (self, sql_type) {
            (Dialect::Sqlite, SqlType::Boolean | SqlType::Integer | SqlType::BigInt) => "INTEGER",
            (Dialect::Sqlite, SqlType::Double) => "REAL",
            (Dialect::Sqlite, SqlType::Blob) => "BLOB",
            (Dialect::Sqlite, _) => "TEXT",
            (Dialect::Mysql, SqlType::Boolean) => "TINYINT(1)",
            (Dialect::Derby, SqlType::Boolean) => "SMALLINT",
            (_, SqlType::Boolean) => "BOOLEAN",
            (_, SqlType::Integer) => "INTEGER",
            (_, SqlType::BigInt) => "BIGINT",
            (Dialect::Postgres, SqlType::Double) => "DOUBLE PRECISION",
            (_, SqlType::Double) => "DOUBLE",
            (_, SqlType::Decimal) => "DECIMAL(19,4)",
            (Dialect::Derby, SqlType::Text) => "CLOB",
            (_, SqlType::Text) => "TEXT",
            (Dialect::Postgres, SqlType::Blob) => "BYTEA",
            (_, SqlType::Blob) => "BLOB",
            (_, SqlType::Date) => "DATE",
            (Dialect::Mysql, SqlType::Timestamp) => "DATETIME",
            (_, SqlType::Timestamp) => "TIMESTAMP",
            (Dialect::Postgres, SqlType::Json) => "JSONB",
            (Dialect::Mysql, SqlType::Json) => "JSON",
            (_, SqlType::Json) => "CLOB",
        }
    }

    /// Definition of the auto-generated `id` primary key column (without its name).
    pub const fn id_column(self) -> &'static str {
        match self {
            Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Mysql => "BIGINT AUTO_INCREMENT PRIMARY KEY",
            Dialect::Derby => "INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY",
        }
    }
}
