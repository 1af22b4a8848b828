//! Product mockups and the mockup cache.
//!
//! A mockup carries just enough of a product to render a list: its id, the
//! indexed attribute values and its relations. The cache keeps them keyed per
//! tenant and rebuilds them from the index store table when the stored data
//! changed since the last write.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};
use turbo_cache::{cache_key, Cache};
use turbo_db::{params, Db, Value as SqlValue};

use crate::error::{CommerceError, Result};
use crate::ids::ProductId;
use crate::index::config::TenantConfig;

/// A relation of a mockup to another object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRef {
    pub fieldname: String,
    #[serde(rename = "dest", alias = "destinationId")]
    pub destination_id: i64,
    #[serde(rename = "type", default = "default_relation_type")]
    pub kind: String,
}

fn default_relation_type() -> String {
    "object".to_string()
}

impl RelationRef {
    pub fn object(fieldname: impl Into<String>, destination_id: i64) -> Self {
        Self {
            fieldname: fieldname.into(),
            destination_id,
            kind: default_relation_type(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMockup {
    pub id: ProductId,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub relations: Vec<RelationRef>,
}

impl ProductMockup {
    pub fn new(id: ProductId, params: Map<String, Value>, relations: Vec<RelationRef>) -> Self {
        Self { id, params, relations }
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Destination ids of the relations stored under `fieldname`.
    pub fn related(&self, fieldname: &str) -> Vec<i64> {
        self.relations
            .iter()
            .filter(|r| r.fieldname == fieldname)
            .map(|r| r.destination_id)
            .collect()
    }
}

/// Row content of the index store table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredMockupData {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub relations: Vec<RelationRef>,
}

/// Checksum of stored data, compared against the checksum of the data the
/// cache was last built from.
pub fn checksum(data: &StoredMockupData) -> Result<u32> {
    let bytes = serde_json::to_vec(data)?;
    let hash = blake3::hash(&bytes);
    let mut head = [0u8; 4];
    head.copy_from_slice(&hash.as_bytes()[..4]);
    Ok(u32::from_le_bytes(head))
}

/// Mockup cache of one tenant.
pub struct MockupCache {
    prefix: String,
    config: Arc<TenantConfig>,
    cache: Cache,
    db: Db,
}

impl fmt::Debug for MockupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockupCache")
            .field("prefix", &self.prefix)
            .field("tenant", &self.config.tenant_name())
            .finish_non_exhaustive()
    }
}

impl MockupCache {
    pub const DEFAULT_PREFIX: &'static str = "ecommerce_mockup";

    pub fn new(config: Arc<TenantConfig>, cache: Cache, db: Db) -> Self {
        Self {
            prefix: Self::DEFAULT_PREFIX.to_string(),
            config,
            cache,
            db,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn key(&self, id: ProductId) -> String {
        cache_key!(&self.prefix, self.config.tenant_name(), id)
    }

    fn store_table(&self) -> &str {
        &self.config.tables().store_table
    }

    /// Write the store row for `id`. Returns whether the data changed.
    pub fn store(&self, id: ProductId, data: &StoredMockupData) -> Result<bool> {
        let crc = i64::from(checksum(data)?);
        let current = self.db.fetch_one_value(
            &format!("SELECT crc_current FROM {} WHERE id = ? AND tenant = ?", self.store_table()),
            params![id.get(), self.config.tenant_name()],
        )?;
        if current.as_deref() == Some(crc.to_string().as_str()) {
            return Ok(false);
        }

        let row: Vec<(String, SqlValue)> = vec![
            ("id".to_string(), id.get().into()),
            ("tenant".to_string(), self.config.tenant_name().into()),
            ("data".to_string(), serde_json::to_string(data)?.into()),
            ("crc_current".to_string(), crc.into()),
        ];
        self.db
            .upsert(self.store_table(), &row, &["id".to_string(), "tenant".to_string()])?;
        Ok(true)
    }

    /// Build the mockup of `id` and put it into the cache.
    ///
    /// Without `data` the stored row is read. A held cache write lock is
    /// bypassed for this one write. The store row is marked clean only when
    /// the write could be read back.
    pub fn save(&self, id: ProductId, data: Option<StoredMockupData>) -> Result<ProductMockup> {
        let data = match data {
            Some(data) if !data.data.is_empty() || !data.relations.is_empty() => data,
            _ => self.load_stored(id)?,
        };
        let mockup = self.config.create_mockup(id, data.data, data.relations);
        let key = self.key(id);

        let lock = self.cache.write_lock();
        let has_lock = lock.has_lock();
        if has_lock {
            lock.disable();
        }

        let written = match self.cache.set(&key, &mockup, &[self.prefix.as_str()]) {
            Ok(written) => written,
            Err(e) => {
                error!(product = %id, error = %e, "mockup cache write failed");
                false
            }
        };
        let verified = matches!(self.cache.get::<ProductMockup>(&key), Ok(Some(_)));

        let marked = if written && verified {
            let sql = format!(
                "UPDATE {} SET crc_index = crc_current WHERE id = ? and tenant = ?",
                self.store_table()
            );
            self.db
                .transaction(|db| db.execute(&sql, params![id.get(), self.config.tenant_name()]))
                .map(|_| ())
        } else {
            error!(product = %id, "Element with ID {} could not be added to mockup-cache", id);
            Ok(())
        };

        if has_lock {
            lock.enable();
        }
        marked?;
        Ok(mockup)
    }

    /// Cached mockup of `id`, rebuilt when missing or when the stored data
    /// changed after the cache entry was written.
    pub fn get(&self, id: ProductId) -> Result<ProductMockup> {
        let key = self.key(id);
        match self.cache.get::<ProductMockup>(&key)? {
            Some(mockup) => {
                if !self.is_dirty(id)? {
                    return Ok(mockup);
                }
                debug!(product = %id, "stored data changed, rebuilding mockup");
            }
            None => debug!(product = %id, "mockup not in cache, rebuilding"),
        }
        self.save(id, None)
    }

    pub fn delete(&self, id: ProductId) -> Result<()> {
        Ok(self.cache.delete(&self.key(id))?)
    }

    fn is_dirty(&self, id: ProductId) -> Result<bool> {
        let result = self.db.query(
            &format!(
                "SELECT crc_current, crc_index FROM {} WHERE id = ? AND tenant = ?",
                self.store_table()
            ),
            params![id.get(), self.config.tenant_name()],
        )?;
        Ok(match result.first() {
            Some(row) => {
                let current = row.get("crc_current").and_then(|v| v.as_integer());
                let index = row.get("crc_index").and_then(|v| v.as_integer());
                index.is_none() || current != index
            }
            None => false,
        })
    }

    fn load_stored(&self, id: ProductId) -> Result<StoredMockupData> {
        let raw = self
            .db
            .fetch_one_value(
                &format!("SELECT data FROM {} WHERE id = ? AND tenant = ?", self.store_table()),
                params![id.get(), self.config.tenant_name()],
            )?
            .ok_or(CommerceError::MockupDataMissing(id))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use turbo_cache::MemoryStore;
    use turbo_db::{Connection, DbError, QueryResult};

    #[derive(Debug, Default, Clone)]
    struct StoreRow {
        data: String,
        crc_current: i64,
        crc_index: Option<i64>,
    }

    /// The store table, answering the statements the cache issues.
    #[derive(Default)]
    struct StoreTable {
        rows: Mutex<HashMap<i64, StoreRow>>,
        log: Mutex<Vec<String>>,
    }

    impl Connection for StoreTable {
        fn execute(&self, sql: &str, params: &[SqlValue]) -> std::result::Result<u64, DbError> {
            self.log.lock().push(sql.to_string());
            let id = params.first().and_then(SqlValue::as_integer);
            if sql.starts_with("UPDATE") {
                let mut rows = self.rows.lock();
                if let Some(row) = id.and_then(|id| rows.get_mut(&id)) {
                    row.crc_index = Some(row.crc_current);
                    return Ok(1);
                }
                return Ok(0);
            }
            if sql.starts_with("INSERT") {
                let id = id.ok_or_else(|| DbError::QueryError("id".into()))?;
                let data = params.get(2).and_then(SqlValue::as_text).unwrap_or_default().to_string();
                let crc = params.get(3).and_then(SqlValue::as_integer).unwrap_or_default();
                let mut rows = self.rows.lock();
                let row = rows.entry(id).or_default();
                row.data = data;
                row.crc_current = crc;
                return Ok(1);
            }
            Ok(0)
        }

        fn query(&self, sql: &str, params: &[SqlValue]) -> std::result::Result<QueryResult, DbError> {
            let id = params.first().and_then(SqlValue::as_integer).unwrap_or_default();
            let rows = self.rows.lock();
            let Some(row) = rows.get(&id) else {
                return Ok(QueryResult::default());
            };
            if sql.starts_with("SELECT data") {
                return Ok(QueryResult::from_values(&["data"], vec![vec![row.data.as_str().into()]]));
            }
            if sql.starts_with("SELECT crc_current, crc_index") {
                return Ok(QueryResult::from_values(
                    &["crc_current", "crc_index"],
                    vec![vec![row.crc_current.into(), row.crc_index.into()]],
                ));
            }
            Ok(QueryResult::from_values(
                &["crc_current"],
                vec![vec![row.crc_current.to_string().into()]],
            ))
        }
    }

    fn setup() -> (MockupCache, Arc<StoreTable>, Cache) {
        let config = Arc::new(TenantConfig::builder("shop").build().unwrap());
        let table = Arc::new(StoreTable::default());
        let cache = Cache::new(MemoryStore::new());
        let mockups = MockupCache::new(config, cache.clone(), Db::from_arc(table.clone()));
        (mockups, table, cache)
    }

    fn stored(name: &str) -> StoredMockupData {
        let mut data = Map::new();
        data.insert("name".into(), json!(name));
        StoredMockupData {
            data,
            relations: vec![RelationRef::object("brand", 4)],
        }
    }

    #[test]
    fn test_key_format() {
        let (mockups, _, _) = setup();
        assert_eq!(mockups.key(ProductId::new(42)), "ecommerce_mockup_shop_42");
    }

    #[test]
    fn test_save_marks_row_clean() {
        let (mockups, table, cache) = setup();
        assert!(mockups.store(ProductId::new(1), &stored("Boot")).unwrap());
        assert!(!mockups.store(ProductId::new(1), &stored("Boot")).unwrap());

        let mockup = mockups.save(ProductId::new(1), None).unwrap();
        assert_eq!(mockup.param("name"), Some(&json!("Boot")));
        assert_eq!(mockup.related("brand"), vec![4]);

        let row = table.rows.lock()[&1].clone();
        assert_eq!(row.crc_index, Some(row.crc_current));
        assert!(cache.exists("ecommerce_mockup_shop_1").unwrap());
        let log = table.log.lock().clone();
        assert_eq!(log[log.len() - 3], "START TRANSACTION");
        assert_eq!(log.last().map(String::as_str), Some("COMMIT"));
    }

    #[test]
    fn test_dirty_row_is_rebuilt() {
        let (mockups, _, _) = setup();
        let id = ProductId::new(2);
        mockups.store(id, &stored("Old")).unwrap();
        assert_eq!(mockups.get(id).unwrap().param("name"), Some(&json!("Old")));

        mockups.store(id, &stored("New")).unwrap();
        assert_eq!(mockups.get(id).unwrap().param("name"), Some(&json!("New")));
    }

    #[test]
    fn test_held_lock_is_bypassed_and_restored() {
        let (mockups, table, cache) = setup();
        mockups.store(ProductId::new(3), &stored("Sock")).unwrap();
        assert!(cache.write_lock().acquire());

        mockups.save(ProductId::new(3), None).unwrap();
        assert!(cache.exists("ecommerce_mockup_shop_3").unwrap());
        assert!(cache.write_lock().has_lock());
        assert!(cache.write_lock().is_enabled());
        let row = table.rows.lock()[&3].clone();
        assert_eq!(row.crc_index, Some(row.crc_current));
    }

    #[test]
    fn test_missing_store_row() {
        let (mockups, _, _) = setup();
        let err = mockups.save(ProductId::new(9), None).unwrap_err();
        assert!(matches!(err, CommerceError::MockupDataMissing(id) if id == ProductId::new(9)));
    }

    #[test]
    fn test_delete() {
        let (mockups, _, cache) = setup();
        mockups.store(ProductId::new(5), &stored("Hat")).unwrap();
        mockups.save(ProductId::new(5), None).unwrap();
        mockups.delete(ProductId::new(5)).unwrap();
        assert!(!cache.exists("ecommerce_mockup_shop_5").unwrap());
    }
}
