//! Connection abstraction and typed query helpers.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{DbError, QueryResult, Value};

/// A driver capable of running SQL against one database.
///
/// Implementations must be shareable across threads: the index service hands
/// the same connection to every tenant worker.
pub trait Connection: Send + Sync {
    /// Run a statement that returns no rows, reporting the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Run a statement that returns rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError>;

    /// Quote an identifier for inclusion in a statement.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}

/// Cloneable handle over a shared [`Connection`].
#[derive(Clone)]
pub struct Db {
    conn: Arc<dyn Connection>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

impl Db {
    pub fn new(conn: impl Connection + 'static) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    pub fn from_arc(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    /// Execute a statement that doesn't return rows.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        tracing::trace!(sql, "execute");
        self.conn.execute(sql, params)
    }

    /// Execute a query and return the raw result set.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        tracing::trace!(sql, "query");
        self.conn.query(sql, params)
    }

    /// Execute a query and map every row onto `T`.
    pub fn query_as<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<T>, DbError> {
        self.query(sql, params)?.deserialize_all()
    }

    /// Execute a query that must return at least one row.
    pub fn query_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<T, DbError> {
        let result = self.query(sql, params)?;
        result.first().ok_or(DbError::NotFound)?.deserialize()
    }

    /// Execute a query that may return one row.
    pub fn query_optional<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, DbError> {
        let result = self.query(sql, params)?;
        result.first().map(|row| row.deserialize()).transpose()
    }

    /// First column of the first row as text, `None` if there is no row or
    /// the cell is NULL.
    pub fn fetch_one_value(&self, sql: &str, params: &[Value]) -> Result<Option<String>, DbError> {
        let result = self.query(sql, params)?;
        Ok(result.first().and_then(|row| match row.values().first() {
            None | Some(Value::Null) => None,
            Some(Value::Text(s)) => Some(s.clone()),
            Some(other) => other.as_text().map(str::to_string).or_else(|| Some(other.to_json().to_string())),
        }))
    }

    pub fn quote_identifier(&self, ident: &str) -> String {
        self.conn.quote_identifier(ident)
    }

    /// Insert a row, updating every non key column when the key already exists.
    pub fn upsert(
        &self,
        table: &str,
        data: &[(String, Value)],
        primary_key: &[String],
    ) -> Result<u64, DbError> {
        if data.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = data.iter().map(|(c, _)| self.quote_identifier(c)).collect();
        let placeholders = vec!["?"; data.len()].join(",");
        let updates: Vec<String> = data
            .iter()
            .filter(|(c, _)| !primary_key.contains(c))
            .map(|(c, _)| {
                let quoted = self.quote_identifier(c);
                format!("{quoted} = VALUES({quoted})")
            })
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(table),
            columns.join(","),
            placeholders
        );
        if updates.is_empty() {
            sql = sql.replacen("INSERT INTO", "INSERT IGNORE INTO", 1);
        } else {
            sql.push_str(" ON DUPLICATE KEY UPDATE ");
            sql.push_str(&updates.join(", "));
        }

        let params: Vec<Value> = data.iter().map(|(_, v)| v.clone()).collect();
        self.execute(&sql, &params)
    }

    /// Run `f` inside a transaction, rolling back when it fails.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Db) -> Result<T, DbError>,
    {
        self.execute("START TRANSACTION", &[])?;
        match f(self) {
            Ok(value) => {
                self.execute("COMMIT", &[])?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.execute("ROLLBACK", &[]) {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        statements: Mutex<Vec<(String, Vec<Value>)>>,
        fail_on: Option<&'static str>,
    }

    impl Connection for Recorder {
        fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
            if self.fail_on.is_some_and(|needle| sql.contains(needle)) {
                return Err(DbError::QueryError(sql.to_string()));
            }
            self.statements.lock().push((sql.to_string(), params.to_vec()));
            Ok(1)
        }

        fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult, DbError> {
            Ok(QueryResult::from_values(&["data"], vec![vec![Value::Text("{\"a\":1}".into())]]))
        }
    }

    #[test]
    fn test_upsert_updates_non_key_columns() {
        let recorder = Arc::new(Recorder::default());
        let db = Db::from_arc(recorder.clone());

        db.upsert(
            "productindex",
            &[
                ("id".to_string(), Value::Integer(1)),
                ("name".to_string(), Value::from("shoe")),
            ],
            &["id".to_string()],
        )
        .unwrap();

        let statements = recorder.statements.lock();
        assert_eq!(
            statements[0].0,
            "INSERT INTO `productindex` (`id`,`name`) VALUES (?,?) ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );
        assert_eq!(statements[0].1.len(), 2);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let recorder = Arc::new(Recorder::default());
        let db = Db::from_arc(recorder.clone());

        let result: Result<(), DbError> =
            db.transaction(|_| Err(DbError::QueryError("boom".into())));
        assert!(result.is_err());

        let statements: Vec<String> = recorder.statements.lock().iter().map(|s| s.0.clone()).collect();
        assert_eq!(statements, vec!["START TRANSACTION", "ROLLBACK"]);
    }

    #[test]
    fn test_fetch_one_value() {
        let db = Db::new(Recorder::default());
        let value = db.fetch_one_value("SELECT data FROM store", &[]).unwrap();
        assert_eq!(value.as_deref(), Some("{\"a\":1}"));
    }
}
