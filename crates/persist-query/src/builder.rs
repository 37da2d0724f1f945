//! Statement builders for the persistor's writes and relation bookkeeping.
//!
//! Every builder returns a [`Statement`]: SQL text with dialect placeholders
//! plus the values to bind, in placeholder order. Identifiers are always
//! quoted, so reserved words and odd names are safe as table or column names.

use persist_core::naming;
use persist_core::{Dialect, JoinTable, Value};

use crate::cell::Cell;

/// SQL text plus bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL with placeholders.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

/// Builds dialect-correct statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementBuilder {
    dialect: Dialect,
}

impl StatementBuilder {
    /// Builder for `dialect`.
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Dialect statements are generated for.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn q(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    fn ph(&self, params: &mut Vec<Value>, value: Value) -> String {
        params.push(value);
        self.dialect.placeholder(params.len())
    }

    /// `INSERT INTO t (cols…) VALUES (…)`, with `RETURNING "id"` where the
    /// dialect needs it to report the generated key.
    pub fn insert(&self, table: &str, cells: &[Cell]) -> Statement {
        let mut params = Vec::with_capacity(cells.len());
        let columns: Vec<String> = cells.iter().map(|c| self.q(&c.column)).collect();
        let values: Vec<String> = cells
            .iter()
            .map(|c| c.render(self.dialect, &mut params))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.q(table),
            columns.join(", "),
            values.join(", ")
        );
        if self.dialect.insert_returning_id() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.q(naming::ID));
        }
        Statement::new(sql, params)
    }

    /// `UPDATE t SET c = …, … WHERE "id" = ?`.
    pub fn update(&self, table: &str, id: i64, cells: &[Cell]) -> Statement {
        let mut params = Vec::with_capacity(cells.len() + 1);
        let sets: Vec<String> = cells
            .iter()
            .map(|c| format!("{} = {}", self.q(&c.column), c.render(self.dialect, &mut params)))
            .collect();
        let id_ph = self.ph(&mut params, Value::BigInt(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.q(table),
            sets.join(", "),
            self.q(naming::ID),
            id_ph
        );
        Statement::new(sql, params)
    }

    /// `DELETE FROM t WHERE "id" = ?`.
    pub fn delete_by_id(&self, table: &str, id: i64) -> Statement {
        self.delete_where(table, naming::ID, id)
    }

    /// `DELETE FROM t WHERE c = ?`.
    pub fn delete_where(&self, table: &str, column: &str, id: i64) -> Statement {
        let mut params = Vec::with_capacity(1);
        let ph = self.ph(&mut params, Value::BigInt(id));
        let sql = format!("DELETE FROM {} WHERE {} = {}", self.q(table), self.q(column), ph);
        Statement::new(sql, params)
    }

    /// `UPDATE t SET c = NULL WHERE c = ?`.
    ///
    /// Used to release one-to-one references before a key owner claims one,
    /// and for nullify cascades.
    pub fn nullify(&self, table: &str, column: &str, id: i64) -> Statement {
        let mut params = Vec::with_capacity(1);
        let col = self.q(column);
        let ph = self.ph(&mut params, Value::BigInt(id));
        let sql = format!("UPDATE {} SET {col} = NULL WHERE {col} = {ph}", self.q(table));
        Statement::new(sql, params)
    }

    /// Point exactly one row of the key-owning table at `model_id`.
    ///
    /// `table.column` is the key column of the other side of a one-to-one.
    /// The row `owner_id` gets `model_id`; every other row currently holding
    /// `model_id` is cleared, in a single statement. With no owner the
    /// reference is simply cleared.
    pub fn one_to_one_swap(
        &self,
        table: &str,
        column: &str,
        owner_id: Option<i64>,
        model_id: i64,
    ) -> Statement {
        let Some(owner_id) = owner_id else {
            return self.nullify(table, column, model_id);
        };
        let mut params = Vec::with_capacity(4);
        let id = self.q(naming::ID);
        let col = self.q(column);
        let when = self.ph(&mut params, Value::BigInt(owner_id));
        let then = self.ph(&mut params, Value::BigInt(model_id));
        let by_id = self.ph(&mut params, Value::BigInt(owner_id));
        let by_ref = self.ph(&mut params, Value::BigInt(model_id));
        let sql = format!(
            "UPDATE {} SET {col} = CASE WHEN {id} = {when} THEN {then} ELSE NULL END WHERE {id} = {by_id} OR {col} = {by_ref}",
            self.q(table)
        );
        Statement::new(sql, params)
    }

    /// Replace every join row of `owner_id` with rows for `member_ids`.
    ///
    /// Yields the DELETE, then one multi-row INSERT when there are members.
    pub fn many_to_many_replace(
        &self,
        join: &JoinTable,
        owner_id: i64,
        member_ids: &[i64],
    ) -> Vec<Statement> {
        let mut out = vec![self.delete_where(&join.table, &join.owner_column, owner_id)];
        if member_ids.is_empty() {
            return out;
        }
        let mut params = Vec::with_capacity(member_ids.len() * 2);
        let rows: Vec<String> = member_ids
            .iter()
            .map(|member| {
                let a = self.ph(&mut params, Value::BigInt(owner_id));
                let b = self.ph(&mut params, Value::BigInt(*member));
                format!("({a}, {b})")
            })
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES {}",
            self.q(&join.table),
            self.q(&join.owner_column),
            self.q(&join.member_column),
            rows.join(", ")
        );
        out.push(Statement::new(sql, params));
        out
    }

    /// Make `child_ids` the complete set of children pointing at `owner_id`.
    ///
    /// Yields `UPDATE child SET fk = NULL WHERE fk = ?`, then one bulk
    /// `UPDATE child SET fk = ? WHERE id IN (…)` when there are children.
    pub fn many_to_one_reparent(
        &self,
        table: &str,
        fk_column: &str,
        owner_id: i64,
        child_ids: &[i64],
    ) -> Vec<Statement> {
        let mut out = vec![self.nullify(table, fk_column, owner_id)];
        if let Some(link) = self.link_children(table, fk_column, owner_id, child_ids) {
            out.push(link);
        }
        out
    }

    /// `UPDATE child SET fk = ? WHERE id IN (…)`; `None` without children.
    pub fn link_children(
        &self,
        table: &str,
        fk_column: &str,
        owner_id: i64,
        child_ids: &[i64],
    ) -> Option<Statement> {
        if child_ids.is_empty() {
            return None;
        }
        let mut params = Vec::with_capacity(child_ids.len() + 1);
        let owner = self.ph(&mut params, Value::BigInt(owner_id));
        let ids = self.id_list(&mut params, child_ids);
        let sql = format!(
            "UPDATE {} SET {} = {owner} WHERE {} IN ({ids})",
            self.q(table),
            self.q(fk_column),
            self.q(naming::ID)
        );
        Some(Statement::new(sql, params))
    }

    fn id_list(&self, params: &mut Vec<Value>, ids: &[i64]) -> String {
        ids.iter()
            .map(|id| self.ph(params, Value::BigInt(*id)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `SELECT "id" FROM t WHERE c = ?`.
    pub fn select_ids_where(&self, table: &str, column: &str, id: i64) -> Statement {
        let mut params = Vec::with_capacity(1);
        let ph = self.ph(&mut params, Value::BigInt(id));
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {ph}",
            self.q(naming::ID),
            self.q(table),
            self.q(column)
        );
        Statement::new(sql, params)
    }

    /// `SELECT c FROM t WHERE "id" = ?`.
    pub fn select_column_by_id(&self, table: &str, column: &str, id: i64) -> Statement {
        let mut params = Vec::with_capacity(1);
        let ph = self.ph(&mut params, Value::BigInt(id));
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {ph}",
            self.q(column),
            self.q(table),
            self.q(naming::ID)
        );
        Statement::new(sql, params)
    }

    /// Member ids stored in a join table for `owner_id`.
    pub fn select_join_members(&self, join: &JoinTable, owner_id: i64) -> Statement {
        let mut params = Vec::with_capacity(1);
        let ph = self.ph(&mut params, Value::BigInt(owner_id));
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {ph}",
            self.q(&join.member_column),
            self.q(&join.table),
            self.q(&join.owner_column)
        );
        Statement::new(sql, params)
    }

    /// `SELECT * FROM t WHERE "id" = ?` or `… IN (…)` for several ids.
    pub fn select_by_ids(&self, table: &str, ids: &[i64]) -> Statement {
        let mut params = Vec::with_capacity(ids.len());
        let filter = match ids {
            [id] => format!("= {}", self.ph(&mut params, Value::BigInt(*id))),
            _ => format!("IN ({})", self.id_list(&mut params, ids)),
        };
        let sql = format!(
            "SELECT * FROM {} WHERE {} {filter}",
            self.q(table),
            self.q(naming::ID)
        );
        Statement::new(sql, params)
    }

    /// Rows of `table` whose `column` references `id`, ordered by id.
    pub fn select_referencing(&self, table: &str, column: &str, id: i64) -> Statement {
        let mut params = Vec::with_capacity(1);
        let ph = self.ph(&mut params, Value::BigInt(id));
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {ph} ORDER BY {}",
            self.q(table),
            self.q(column),
            self.q(naming::ID)
        );
        Statement::new(sql, params)
    }

    /// Rows of `table` joined to `owner_id` through a join table, ordered by id.
    pub fn select_join_targets(&self, table: &str, join: &JoinTable, owner_id: i64) -> Statement {
        let mut params = Vec::with_capacity(1);
        let ph = self.ph(&mut params, Value::BigInt(owner_id));
        let t = self.q(table);
        let j = self.q(&join.table);
        let id = self.q(naming::ID);
        let sql = format!(
            "SELECT {t}.* FROM {t} INNER JOIN {j} ON {j}.{} = {t}.{id} WHERE {j}.{} = {ph} ORDER BY {t}.{id}",
            self.q(&join.member_column),
            self.q(&join.owner_column),
        );
        Statement::new(sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persist_core::SqlType;

    fn cells() -> Vec<Cell> {
        vec![
            Cell::value("type", SqlType::Text, "checking"),
            Cell::key("category", Some(4)),
            Cell::raw("created_on", SqlType::Date, "CURRENT_DATE"),
        ]
    }

    #[test]
    fn test_insert_postgres_returns_id() {
        let stmt = StatementBuilder::new(Dialect::Postgres).insert("accounts", &cells());
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"accounts\" (\"type\", \"category\", \"created_on\") VALUES ($1, $2, CURRENT_DATE) RETURNING \"id\""
        );
        assert_eq!(stmt.params, vec![Value::Text("checking".into()), Value::BigInt(4)]);
    }

    #[test]
    fn test_insert_mysql_and_derby() {
        let stmt = StatementBuilder::new(Dialect::Mysql).insert("accounts", &cells());
        assert_eq!(
            stmt.sql,
            "INSERT INTO `accounts` (`type`, `category`, `created_on`) VALUES (?, ?, CURRENT_DATE)"
        );
        let stmt = StatementBuilder::new(Dialect::Derby).insert("accounts", &cells());
        assert!(!stmt.sql.contains("RETURNING"));
    }

    #[test]
    fn test_update_appends_id() {
        let stamp = Cell::value("updated_at", SqlType::BigInt, 42_i64);
        let name = Cell::value("name", SqlType::Text, "n");
        let stmt = StatementBuilder::new(Dialect::Sqlite).update("accounts", 7, &[name, stamp]);
        assert_eq!(
            stmt.sql,
            "UPDATE \"accounts\" SET \"name\" = ?1, \"updated_at\" = 42 WHERE \"id\" = ?2"
        );
        assert_eq!(stmt.params, vec![Value::Text("n".into()), Value::BigInt(7)]);
    }

    #[test]
    fn test_one_to_one_swap() {
        let b = StatementBuilder::new(Dialect::Postgres);
        let stmt = b.one_to_one_swap("categories", "account", Some(3), 8);
        assert_eq!(
            stmt.sql,
            "UPDATE \"categories\" SET \"account\" = CASE WHEN \"id\" = $1 THEN $2 ELSE NULL END WHERE \"id\" = $3 OR \"account\" = $4"
        );
        assert_eq!(
            stmt.params,
            vec![Value::BigInt(3), Value::BigInt(8), Value::BigInt(3), Value::BigInt(8)]
        );

        let clear = b.one_to_one_swap("categories", "account", None, 8);
        assert_eq!(
            clear.sql,
            "UPDATE \"categories\" SET \"account\" = NULL WHERE \"account\" = $1"
        );
    }

    #[test]
    fn test_many_to_many_replace() {
        let join = JoinTable::derive("accounts", "tags", "tags", "accounts");
        let b = StatementBuilder::new(Dialect::Sqlite);
        let stmts = b.many_to_many_replace(&join, 1, &[5, 6]);
        assert_eq!(stmts.len(), 2);
        assert_eq!(
            stmts[0].sql,
            "DELETE FROM \"accounts__tags___tags__accounts\" WHERE \"accounts__tags\" = ?1"
        );
        assert_eq!(
            stmts[1].sql,
            "INSERT INTO \"accounts__tags___tags__accounts\" (\"accounts__tags\", \"tags__accounts\") VALUES (?1, ?2), (?3, ?4)"
        );
        assert_eq!(stmts[1].params.len(), 4);

        assert_eq!(b.many_to_many_replace(&join, 1, &[]).len(), 1);
    }

    #[test]
    fn test_many_to_one_reparent() {
        let b = StatementBuilder::new(Dialect::Postgres);
        let stmts = b.many_to_one_reparent("transactions", "account", 2, &[10, 11]);
        assert_eq!(
            stmts[0].sql,
            "UPDATE \"transactions\" SET \"account\" = NULL WHERE \"account\" = $1"
        );
        assert_eq!(
            stmts[1].sql,
            "UPDATE \"transactions\" SET \"account\" = $1 WHERE \"id\" IN ($2, $3)"
        );
        assert_eq!(b.many_to_one_reparent("transactions", "account", 2, &[]).len(), 1);
    }

    #[test]
    fn test_select_by_ids() {
        let b = StatementBuilder::new(Dialect::Sqlite);
        assert_eq!(
            b.select_by_ids("tags", &[3]).sql,
            "SELECT * FROM \"tags\" WHERE \"id\" = ?1"
        );
        assert_eq!(
            b.select_by_ids("tags", &[3, 4]).sql,
            "SELECT * FROM \"tags\" WHERE \"id\" IN (?1, ?2)"
        );
    }
}
