//! Column assignments used by INSERT and UPDATE statements.

use persist_core::naming;
use persist_core::{Dialect, ModelSchema, SqlType, Value};

/// What a [`Cell`] writes into its column.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    /// A value bound as a statement parameter.
    Value(Value),
    /// A raw SQL expression inlined verbatim (e.g. `CURRENT_DATE`).
    Raw(String),
}

/// One column assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Target column.
    pub column: String,
    /// Declared type of the column.
    pub sql_type: SqlType,
    /// Value or expression.
    pub content: CellContent,
}

impl Cell {
    /// A cell binding `value`.
    pub fn value(column: impl Into<String>, sql_type: SqlType, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            sql_type,
            content: CellContent::Value(value.into()),
        }
    }

    /// A cell inlining the SQL expression `expr`.
    pub fn raw(column: impl Into<String>, sql_type: SqlType, expr: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            sql_type,
            content: CellContent::Raw(expr.into()),
        }
    }

    /// Foreign key cell; `None` writes NULL.
    pub fn key(column: impl Into<String>, id: Option<i64>) -> Self {
        Self::value(column, SqlType::BigInt, Value::from(id))
    }

    /// Render the right-hand side of the assignment.
    ///
    /// Bound values are appended to `params` and replaced by the dialect's
    /// placeholder. Stamp columns carrying epoch millis and raw expressions
    /// are inlined and bind nothing.
    pub fn render(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        match &self.content {
            CellContent::Raw(expr) => expr.clone(),
            CellContent::Value(Value::BigInt(millis)) if naming::is_stamp_column(&self.column) => {
                dialect.epoch_millis_literal(*millis)
            }
            CellContent::Value(value) => {
                params.push(value.clone());
                dialect.placeholder(params.len())
            }
        }
    }
}

/// Stamp cells written when a row is inserted, skipping columns already
/// present in `cells`.
pub fn insert_stamps(
    schema: &ModelSchema,
    dialect: Dialect,
    now_millis: i64,
    cells: &[Cell],
) -> Vec<Cell> {
    let present = |column: &str| cells.iter().any(|c| c.column == column);
    let mut out = Vec::new();
    if schema.has_timestamps() {
        for column in [naming::CREATED_AT, naming::UPDATED_AT] {
            if !present(column) {
                out.push(Cell::value(column, SqlType::BigInt, now_millis));
            }
        }
    }
    if schema.has_datestamps() {
        for column in [naming::CREATED_ON, naming::UPDATED_ON] {
            if !present(column) {
                out.push(Cell::raw(column, SqlType::Date, dialect.current_date()));
            }
        }
    }
    out
}

/// Stamp cells written when a row is updated, skipping columns already
/// present in `cells`.
pub fn update_stamps(
    schema: &ModelSchema,
    dialect: Dialect,
    now_millis: i64,
    cells: &[Cell],
) -> Vec<Cell> {
    let present = |column: &str| cells.iter().any(|c| c.column == column);
    let mut out = Vec::new();
    if schema.has_timestamps() && !present(naming::UPDATED_AT) {
        out.push(Cell::value(naming::UPDATED_AT, SqlType::BigInt, now_millis));
    }
    if schema.has_datestamps() && !present(naming::UPDATED_ON) {
        out.push(Cell::raw(naming::UPDATED_ON, SqlType::Date, dialect.current_date()));
    }
    out
}
