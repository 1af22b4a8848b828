use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use turbo_db::{normalize_column_type, params, Db, Value as SqlValue};

use super::{attribute_values, system_values, Worker, MULTISELECT_DELIMITER};
use crate::error::Result;
use crate::index::attribute::Indexable;
use crate::index::config::{is_system_attribute, split_sub_field, TenantConfig};
use crate::index::list::ProductList;

/// Name of the full text index over the search attributes.
const SEARCH_INDEX: &str = "search";

#[derive(Debug, Clone, Default)]
struct TableColumns {
    columns: Vec<String>,
    primary_key: Vec<String>,
}

/// Structure maintenance and row upserts for the relational product index.
///
/// Every statement that changes the schema is kept in a change log. The log
/// is written to `db-change-log_<unix time>_productindex.sql` when the helper
/// is dropped, so the same changes can be replayed on other systems.
pub struct MySqlIndexHelper {
    config: Arc<TenantConfig>,
    db: Db,
    columns: Mutex<HashMap<String, TableColumns>>,
    change_log: Mutex<Vec<String>>,
}

impl fmt::Debug for MySqlIndexHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlIndexHelper")
            .field("tenant", &self.config.tenant_name())
            .field("table", &self.config.tables().table)
            .field("change_log", &self.change_log.lock().len())
            .finish()
    }
}

impl MySqlIndexHelper {
    pub fn new(config: Arc<TenantConfig>, db: Db) -> Self {
        Self {
            config,
            db,
            columns: Mutex::new(HashMap::new()),
            change_log: Mutex::new(Vec::new()),
        }
    }

    fn table_columns(&self, table: &str) -> Result<TableColumns> {
        if let Some(cached) = self.columns.lock().get(table) {
            return Ok(cached.clone());
        }
        let result = self.db.query(&format!("SHOW COLUMNS FROM {table}"), &[])?;
        let mut columns = TableColumns::default();
        for row in result.iter() {
            let Some(field) = row.text("Field") else { continue };
            if row.text("Key") == Some("PRI") {
                columns.primary_key.push(field.to_string());
            }
            columns.columns.push(field.to_string());
        }
        self.columns.lock().insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    pub fn valid_table_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table_columns(table)?.columns)
    }

    pub fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table_columns(table)?.primary_key)
    }

    /// Upsert an index row. Columns the table does not have are dropped.
    pub fn do_insert_data(&self, data: &[(String, SqlValue)]) -> Result<()> {
        let table = &self.config.tables().table;
        let TableColumns { columns, primary_key } = self.table_columns(table)?;
        let row: Vec<(String, SqlValue)> = data
            .iter()
            .filter(|(column, _)| columns.contains(column))
            .cloned()
            .collect();
        self.db.upsert(table, &row, &primary_key)?;
        Ok(())
    }

    /// Statements executed so far.
    pub fn change_log(&self) -> Vec<String> {
        self.change_log.lock().clone()
    }

    /// Drain the change log without writing it anywhere.
    pub fn take_change_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.change_log.lock())
    }

    fn dbexec(&self, sql: String) -> Result<()> {
        info!("{sql}");
        self.change_log.lock().push(sql.clone());
        self.db.execute(&sql, &[])?;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(!self.db.query(&format!("SHOW TABLES LIKE '{table}'"), &[])?.is_empty())
    }

    /// Columns of the full text index, in index order.
    fn search_index_columns(&self, table: &str) -> Result<Vec<String>> {
        let result = self.db.query(&format!("SHOW INDEX FROM {table}"), &[])?;
        let mut columns: Vec<(i64, String)> = result
            .iter()
            .filter(|row| row.text("Key_name") == Some(SEARCH_INDEX))
            .filter_map(|row| {
                let seq = row.get("Seq_in_index").and_then(SqlValue::as_integer)?;
                Some((seq, row.text("Column_name")?.to_string()))
            })
            .collect();
        columns.sort();
        Ok(columns.into_iter().map(|(_, column)| column).collect())
    }

    /// Bring the index tables in line with the tenant's attributes.
    ///
    /// Running it twice against an unchanged config executes nothing the
    /// second time.
    pub fn create_or_update_index_structures(&self) -> Result<()> {
        let tables = self.config.tables();
        let table = tables.table.as_str();
        let primary_id_type = self.config.id_column_type(true);
        let id_type = self.config.id_column_type(false);
        self.columns.lock().clear();

        if !self.table_exists(table)? {
            self.dbexec(format!(
                "CREATE TABLE IF NOT EXISTS `{table}` (
          `id` {primary_id_type},
          `virtualProductId` {id_type},
          `virtualProductActive` TINYINT(1) NOT NULL,
          `classId` varchar(50) NOT NULL,
          `parentId` {id_type},
          `type` varchar(20) NOT NULL,
          `categoryIds` varchar(255) NOT NULL,
          `parentCategoryIds` varchar(255) NOT NULL,
          `priceSystemName` varchar(50) NOT NULL,
          `active` TINYINT(1) NOT NULL,
          `inProductList` TINYINT(1) NOT NULL,
          PRIMARY KEY  (`id`)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8;"
            ))?;
        }

        let existing = self.db.query(&format!("SHOW COLUMNS FROM {table}"), &[])?;
        let mut to_delete: Vec<(String, String)> = existing
            .iter()
            .filter_map(|row| Some((row.text("Field")?.to_string(), row.text("Type")?.to_string())))
            .collect();
        let mut to_add = Vec::new();
        let mut to_modify = Vec::new();

        for attribute in self.config.attributes() {
            let name = attribute.name();
            let current = to_delete
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, column_type)| column_type.clone());
            match (current, attribute.column_type()) {
                (None, _) if attribute.is_relation() => {}
                (None, Some(column_type)) => to_add.push((name, column_type)),
                (Some(current), Some(column_type))
                    if normalize_column_type(&current) != normalize_column_type(column_type) =>
                {
                    to_modify.push((name, column_type))
                }
                (None, None) => {
                    warn!(attribute = %name, "skipping attribute without column type");
                }
                _ => {}
            }
            to_delete.retain(|(field, _)| field != name);
        }

        for (column, _) in &to_delete {
            if !is_system_attribute(column) {
                self.dbexec(format!("ALTER TABLE `{table}` DROP COLUMN `{column}`;"))?;
            }
        }
        for (column, column_type) in to_add {
            self.dbexec(format!("ALTER TABLE `{table}` ADD `{column}` {column_type};"))?;
        }
        for (column, column_type) in to_modify {
            self.dbexec(format!("ALTER TABLE `{table}` MODIFY `{column}` {column_type};"))?;
        }

        let search_columns: Vec<String> = self
            .config
            .search_attributes()
            .iter()
            .map(|name| split_sub_field(name).0.to_string())
            .collect();
        if !search_columns.is_empty() && self.search_index_columns(table)? != search_columns {
            if let Err(e) = self.dbexec(format!("ALTER TABLE {table} DROP INDEX {SEARCH_INDEX};")) {
                info!(error = %e, "no full text index to drop");
            }
            self.dbexec(format!("ALTER TABLE `{table}` ENGINE = InnoDB;"))?;
            let quoted: Vec<String> = search_columns
                .iter()
                .map(|c| self.db.quote_identifier(c))
                .collect();
            self.dbexec(format!(
                "ALTER TABLE `{table}` ADD FULLTEXT INDEX {SEARCH_INDEX} ({});",
                quoted.join(",")
            ))?;
        }

        let relation_table = tables.relation_table.as_str();
        if !self.table_exists(relation_table)? {
            self.dbexec(format!(
                "CREATE TABLE IF NOT EXISTS `{relation_table}` (
          `src` {id_type},
          `src_virtualProductId` int(11) NOT NULL,
          `dest` int(11) NOT NULL,
          `fieldname` varchar(255) COLLATE utf8_bin NOT NULL,
          `type` varchar(20) COLLATE utf8_bin NOT NULL,
          PRIMARY KEY (`src`,`dest`,`fieldname`,`type`)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8 COLLATE=utf8_bin;"
            ))?;
        }

        if let Some(tenant_table) = tables.tenant_relation_table.as_deref() {
            if !self.table_exists(tenant_table)? {
                self.dbexec(format!(
                    "CREATE TABLE IF NOT EXISTS `{tenant_table}` (
              `id` {id_type},
              `subtenant_id` int(11) NOT NULL,
              PRIMARY KEY (`id`,`subtenant_id`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8 COLLATE=utf8_bin;"
                ))?;
            }
        }

        self.columns.lock().clear();
        Ok(())
    }

    /// Write the change log and clear it. Returns the file written, if any.
    pub fn flush_change_log(&self) -> Result<Option<PathBuf>> {
        let log = self.take_change_log();
        if log.is_empty() {
            return Ok(None);
        }
        let dir = self
            .config
            .tables()
            .change_log_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let file = dir.join(format!(
            "db-change-log_{}_productindex.sql",
            chrono::Utc::now().timestamp()
        ));
        std::fs::write(&file, log.join("\n\n\n"))?;
        debug!(file = %file.display(), "wrote change log");
        Ok(Some(file))
    }
}

impl Drop for MySqlIndexHelper {
    fn drop(&mut self) {
        if let Err(e) = self.flush_change_log() {
            error!(error = %e, "could not write database change log");
        }
    }
}

/// Worker writing index rows into a relational table.
pub struct MySqlWorker {
    config: Arc<TenantConfig>,
    db: Db,
    helper: MySqlIndexHelper,
}

impl fmt::Debug for MySqlWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlWorker")
            .field("tenant", &self.config.tenant_name())
            .field("helper", &self.helper)
            .finish()
    }
}

/// Column value of an indexed attribute. Lists are stored delimited by
/// [`MULTISELECT_DELIMITER`], with a leading and trailing delimiter.
fn column_value(value: &Value) -> SqlValue {
    match value {
        Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => {
            if items.is_empty() {
                return SqlValue::Null;
            }
            let joined: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            SqlValue::from(format!(
                "{d}{}{d}",
                joined.join(MULTISELECT_DELIMITER),
                d = MULTISELECT_DELIMITER
            ))
        }
        other => SqlValue::from_json(other),
    }
}

/// `,1,2,3,` form of an id list, matched with `LIKE '%,2,%'`.
fn id_list(value: &Value) -> SqlValue {
    let ids: Vec<String> = value
        .as_array()
        .map(|items| items.iter().map(Value::to_string).collect())
        .unwrap_or_default();
    SqlValue::from(format!(",{},", ids.join(",")))
}

impl MySqlWorker {
    pub fn new(config: Arc<TenantConfig>, db: Db) -> Self {
        let helper = MySqlIndexHelper::new(Arc::clone(&config), db.clone());
        Self { config, db, helper }
    }

    pub fn helper(&self) -> &MySqlIndexHelper {
        &self.helper
    }

    /// Row of `object` for the index table.
    pub fn index_row(&self, object: &dyn Indexable) -> Vec<(String, SqlValue)> {
        let system = system_values(&self.config, object);
        let (attributes, _) = attribute_values(&self.config, object);

        let mut row = Vec::with_capacity(system.len() + attributes.len());
        for (name, value) in &system {
            let value = match name.as_str() {
                "categoryIds" | "parentCategoryIds" => id_list(value),
                "parentId" if value.is_null() => SqlValue::from(0),
                _ => SqlValue::from_json(value),
            };
            row.push((name.clone(), value));
        }
        for (name, value) in &attributes {
            row.push((name.clone(), column_value(value)));
        }
        row
    }
}

impl Worker for MySqlWorker {
    fn tenant_config(&self) -> &Arc<TenantConfig> {
        &self.config
    }

    fn create_or_update_index_structures(&self) -> Result<()> {
        self.helper.create_or_update_index_structures()
    }

    fn update_index(&self, object: &dyn Indexable) -> Result<()> {
        if !self.config.in_index(object) {
            return self.delete_from_index(object);
        }

        self.helper.do_insert_data(&self.index_row(object))?;

        let (_, relations) = attribute_values(&self.config, object);
        let relation_table = &self.config.tables().relation_table;
        let id = object.id().get();
        let virtual_id = object.virtual_product_id().get();
        self.db.transaction(|db| {
            db.execute(&format!("DELETE FROM {relation_table} WHERE src = ?"), params![id])?;
            for (fieldname, ids) in &relations {
                for dest in ids.as_array().into_iter().flatten().filter_map(Value::as_i64) {
                    let row: Vec<(String, SqlValue)> = vec![
                        ("src".to_string(), id.into()),
                        ("src_virtualProductId".to_string(), virtual_id.into()),
                        ("dest".to_string(), dest.into()),
                        ("fieldname".to_string(), fieldname.as_str().into()),
                        ("type".to_string(), "object".into()),
                    ];
                    db.upsert(relation_table, &row, &[])?;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    fn delete_from_index(&self, object: &dyn Indexable) -> Result<()> {
        let tables = self.config.tables();
        let id = object.id().get();
        self.db
            .execute(&format!("DELETE FROM {} WHERE id = ?", tables.table), params![id])?;
        self.db
            .execute(&format!("DELETE FROM {} WHERE src = ?", tables.relation_table), params![id])?;
        if let Some(tenant_table) = &tables.tenant_relation_table {
            self.db
                .execute(&format!("DELETE FROM {tenant_table} WHERE id = ?"), params![id])?;
        }
        Ok(())
    }

    fn product_list(&self) -> ProductList {
        ProductList::new(Arc::clone(&self.config))
    }
}
