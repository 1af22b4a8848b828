//! In-memory schema catalog that answers introspection queries and applies DDL.
//!
//! Used to plan structure changes offline: load a JSON dump of the live
//! schema, run the index helper against it, then read back the statements it
//! executed. Only the statement shapes the product index emits are understood.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{normalize_column_type, Connection, DbError, QueryResult, Value};

/// A dump of the tables relevant to the product index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default)]
    pub tables: BTreeMap<String, TableSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    #[serde(default)]
    pub columns: Vec<ColumnSnapshot>,
    /// Secondary indexes by name, with their column lists.
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl TableSnapshot {
    fn column_mut(&mut self, name: &str) -> Option<&mut ColumnSnapshot> {
        self.columns.iter_mut().find(|c| c.field == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub field: String,
    #[serde(rename = "type")]
    pub column_type: String,
    /// `"PRI"` for primary key columns, empty otherwise.
    #[serde(default)]
    pub key: String,
}

/// [`Connection`] backed by a [`SchemaSnapshot`].
#[derive(Debug, Default)]
pub struct SnapshotConnection {
    schema: Mutex<SchemaSnapshot>,
    executed: Mutex<Vec<String>>,
}

impl SnapshotConnection {
    pub fn new(schema: SchemaSnapshot) -> Self {
        Self {
            schema: Mutex::new(schema),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Current state of the schema, including applied DDL.
    pub fn schema(&self) -> SchemaSnapshot {
        self.schema.lock().clone()
    }

    /// Every statement passed to [`Connection::execute`] that changed the schema.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    fn apply(&self, sql: &str) -> Result<u64, DbError> {
        let sql = clean(sql);
        let upper = sql.to_uppercase();

        if matches!(upper.as_str(), "START TRANSACTION" | "COMMIT" | "ROLLBACK") {
            return Ok(0);
        }

        if let Some(caps) = pattern(r"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?`?(\w+)`?\s*\((.*)\)(.*)$")?.captures(&sql) {
            return self.create_table(&caps);
        }

        if let Some(caps) = pattern(r"(?is)^ALTER\s+TABLE\s+`?(\w+)`?\s+(.*)$")?.captures(&sql) {
            let table = caps[1].to_string();
            let action = caps[2].trim().to_string();
            return self.alter_table(&table, &action);
        }

        Err(DbError::Unsupported(sql))
    }

    fn create_table(&self, caps: &Captures<'_>) -> Result<u64, DbError> {
        let if_not_exists = caps.get(1).is_some();
        let name = caps[2].to_string();
        let body = &caps[3];
        let options = &caps[4];

        let mut schema = self.schema.lock();
        if schema.tables.contains_key(&name) {
            if if_not_exists {
                return Ok(0);
            }
            return Err(DbError::QueryError(format!("Table '{}' already exists", name)));
        }

        let mut table = TableSnapshot::default();
        let mut primary: Vec<String> = Vec::new();
        for part in split_top_level(body) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part.to_uppercase().starts_with("PRIMARY KEY") {
                primary = identifiers(part);
                continue;
            }
            let (field, definition) = split_column(part)
                .ok_or_else(|| DbError::Unsupported(format!("column definition: {}", part)))?;
            table.columns.push(ColumnSnapshot {
                field,
                column_type: normalize_column_type(&definition),
                key: String::new(),
            });
        }
        for column in &mut table.columns {
            if primary.contains(&column.field) {
                column.key = "PRI".to_string();
            }
        }
        table.engine = pattern(r"(?i)ENGINE\s*=\s*(\w+)")?
            .captures(options)
            .map(|c| c[1].to_string());

        schema.tables.insert(name, table);
        Ok(0)
    }

    fn alter_table(&self, name: &str, action: &str) -> Result<u64, DbError> {
        let mut schema = self.schema.lock();
        let table = schema
            .tables
            .get_mut(name)
            .ok_or_else(|| DbError::QueryError(format!("Table '{}' doesn't exist", name)))?;

        if let Some(caps) = pattern(r"(?is)^ADD\s+FULLTEXT\s+INDEX\s+`?(\w+)`?\s*\((.*)\)$")?.captures(action) {
            let index = caps[1].to_string();
            if table.indexes.contains_key(&index) {
                return Err(DbError::QueryError(format!("Duplicate key name '{}'", index)));
            }
            table.indexes.insert(index, identifiers(&caps[2]));
            return Ok(0);
        }

        if let Some(caps) = pattern(r"(?is)^DROP\s+INDEX\s+`?(\w+)`?$")?.captures(action) {
            return match table.indexes.remove(&caps[1]) {
                Some(_) => Ok(0),
                None => Err(DbError::QueryError(format!(
                    "Can't DROP '{}'; check that column/key exists",
                    &caps[1]
                ))),
            };
        }

        if let Some(caps) = pattern(r"(?is)^DROP\s+COLUMN\s+`?(\w+)`?$")?.captures(action) {
            let before = table.columns.len();
            table.columns.retain(|c| c.field != caps[1]);
            if table.columns.len() == before {
                return Err(DbError::QueryError(format!("Can't DROP '{}'", &caps[1])));
            }
            for columns in table.indexes.values_mut() {
                columns.retain(|c| c != &caps[1]);
            }
            table.indexes.retain(|_, columns| !columns.is_empty());
            return Ok(0);
        }

        if let Some(caps) = pattern(r"(?is)^MODIFY\s+(COLUMN\s+)?`?(\w+)`?\s+(.+)$")?.captures(action) {
            let column = table
                .column_mut(&caps[2])
                .ok_or_else(|| DbError::QueryError(format!("Unknown column '{}'", &caps[2])))?;
            column.column_type = normalize_column_type(&caps[3]);
            return Ok(0);
        }

        if let Some(caps) = pattern(r"(?is)^ADD\s+(COLUMN\s+)?`?(\w+)`?\s+(.+)$")?.captures(action) {
            if table.column_mut(&caps[2]).is_some() {
                return Err(DbError::QueryError(format!("Duplicate column name '{}'", &caps[2])));
            }
            table.columns.push(ColumnSnapshot {
                field: caps[2].to_string(),
                column_type: normalize_column_type(&caps[3]),
                key: String::new(),
            });
            return Ok(0);
        }

        if let Some(caps) = pattern(r"(?is)^ENGINE\s*=\s*(\w+)$")?.captures(action) {
            table.engine = Some(caps[1].to_string());
            return Ok(0);
        }

        Err(DbError::Unsupported(format!("ALTER TABLE {} {}", name, action)))
    }

    fn introspect(&self, sql: &str) -> Result<QueryResult, DbError> {
        let sql = clean(sql);
        let schema = self.schema.lock();

        if let Some(caps) = pattern(r"(?is)^SHOW\s+TABLES\s+LIKE\s+'([^']*)'$")?.captures(&sql) {
            let rows = schema
                .tables
                .keys()
                .filter(|name| name.as_str() == &caps[1])
                .map(|name| vec![Value::from(name.as_str())])
                .collect();
            return Ok(QueryResult::from_values(&["Tables_in_database"], rows));
        }

        if let Some(caps) = pattern(r"(?is)^SHOW\s+COLUMNS\s+FROM\s+`?(\w+)`?$")?.captures(&sql) {
            let table = schema
                .tables
                .get(&caps[1])
                .ok_or_else(|| DbError::QueryError(format!("Table '{}' doesn't exist", &caps[1])))?;
            let rows = table
                .columns
                .iter()
                .map(|c| {
                    vec![
                        Value::from(c.field.as_str()),
                        Value::from(c.column_type.as_str()),
                        Value::from(c.key.as_str()),
                    ]
                })
                .collect();
            return Ok(QueryResult::from_values(&["Field", "Type", "Key"], rows));
        }

        if let Some(caps) = pattern(r"(?is)^SHOW\s+INDEX\s+FROM\s+`?(\w+)`?$")?.captures(&sql) {
            let table = schema
                .tables
                .get(&caps[1])
                .ok_or_else(|| DbError::QueryError(format!("Table '{}' doesn't exist", &caps[1])))?;
            let mut rows = Vec::new();
            let primary = table.columns.iter().filter(|c| c.key == "PRI");
            for (seq, column) in primary.enumerate() {
                rows.push(vec![
                    Value::from("PRIMARY"),
                    Value::from(seq as i64 + 1),
                    Value::from(column.field.as_str()),
                    Value::from("BTREE"),
                ]);
            }
            for (index, columns) in &table.indexes {
                for (seq, column) in columns.iter().enumerate() {
                    rows.push(vec![
                        Value::from(index.as_str()),
                        Value::from(seq as i64 + 1),
                        Value::from(column.as_str()),
                        Value::from("FULLTEXT"),
                    ]);
                }
            }
            return Ok(QueryResult::from_values(
                &["Key_name", "Seq_in_index", "Column_name", "Index_type"],
                rows,
            ));
        }

        Err(DbError::Unsupported(sql))
    }
}

impl Connection for SnapshotConnection {
    fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64, DbError> {
        let affected = self.apply(sql)?;
        let statement = clean(sql);
        if !matches!(
            statement.to_uppercase().as_str(),
            "START TRANSACTION" | "COMMIT" | "ROLLBACK"
        ) {
            self.executed.lock().push(statement);
        }
        Ok(affected)
    }

    fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult, DbError> {
        self.introspect(sql)
    }
}

fn pattern(re: &str) -> Result<Regex, DbError> {
    Regex::new(re).map_err(|e| DbError::QueryError(e.to_string()))
}

fn clean(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_string()
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

/// Backtick quoted names inside a column list, in order.
fn identifiers(list: &str) -> Vec<String> {
    let inner = match (list.find('('), list.rfind(')')) {
        (Some(start), Some(end)) if start < end => &list[start + 1..end],
        _ => list,
    };
    inner
        .split(',')
        .map(|s| s.trim().trim_matches('`').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_column(part: &str) -> Option<(String, String)> {
    let part = part.trim();
    if let Some(rest) = part.strip_prefix('`') {
        let end = rest.find('`')?;
        return Some((rest[..end].to_string(), rest[end + 1..].trim().to_string()));
    }
    let (name, definition) = part.split_once(char::is_whitespace)?;
    Some((name.to_string(), definition.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn conn_with_table() -> SnapshotConnection {
        let conn = SnapshotConnection::default();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS `shop_productindex` (
              `id` int(11) NOT NULL default '0',
              `name` varchar(255) NOT NULL,
              PRIMARY KEY  (`id`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8;",
            &[],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_create_table_and_show_columns() {
        let conn = conn_with_table();
        let columns = conn.query("SHOW COLUMNS FROM shop_productindex", &[]).unwrap();

        assert_eq!(columns.len(), 2);
        assert_eq!(columns.rows[0].text("Field"), Some("id"));
        assert_eq!(columns.rows[0].text("Type"), Some("int(11)"));
        assert_eq!(columns.rows[0].text("Key"), Some("PRI"));
        assert_eq!(columns.rows[1].text("Type"), Some("varchar(255)"));
        assert_eq!(conn.schema().tables["shop_productindex"].engine.as_deref(), Some("InnoDB"));
    }

    #[test]
    fn test_create_if_not_exists_is_noop() {
        let conn = conn_with_table();
        conn.execute("CREATE TABLE IF NOT EXISTS `shop_productindex` (`x` int(11))", &[])
            .unwrap();
        assert_eq!(conn.schema().tables["shop_productindex"].columns.len(), 2);
    }

    #[test]
    fn test_alter_statements() {
        let conn = conn_with_table();
        conn.execute("ALTER TABLE `shop_productindex` ADD `color` varchar(50);", &[]).unwrap();
        conn.execute("ALTER TABLE `shop_productindex` MODIFY `name` text;", &[]).unwrap();
        conn.execute(
            "ALTER TABLE `shop_productindex` ADD FULLTEXT INDEX search (`name`,`color`);",
            &[],
        )
        .unwrap();

        let schema = conn.schema();
        let table = &schema.tables["shop_productindex"];
        assert_eq!(table.columns[1].column_type, "text");
        assert_eq!(table.indexes["search"], vec!["name", "color"]);

        conn.execute("ALTER TABLE `shop_productindex` DROP COLUMN `color`;", &[]).unwrap();
        assert_eq!(conn.schema().tables["shop_productindex"].indexes["search"], vec!["name"]);
    }

    #[test]
    fn test_drop_missing_index_fails() {
        let conn = conn_with_table();
        let err = conn
            .execute("ALTER TABLE shop_productindex DROP INDEX search;", &[])
            .unwrap_err();
        assert!(err.to_string().contains("check that column/key exists"));
    }

    #[test]
    fn test_show_tables_like() {
        let conn = conn_with_table();
        assert_eq!(conn.query("SHOW TABLES LIKE 'shop_productindex'", &[]).unwrap().len(), 1);
        assert!(conn.query("SHOW TABLES LIKE 'missing'", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_statement_is_rejected() {
        let conn = SnapshotConnection::default();
        assert!(matches!(
            conn.execute("DELETE FROM x", &[]),
            Err(DbError::Unsupported(_))
        ));
    }
}
