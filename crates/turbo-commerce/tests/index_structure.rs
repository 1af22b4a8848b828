//! Relational index structures planned against schema snapshots.

mod common;

use std::sync::Arc;

use common::ScriptedConnection;
use pretty_assertions::assert_eq;
use turbo_commerce::ids::ProductId;
use turbo_commerce::index::{
    Attribute, IndexService, IndexableDocument, MySqlWorker, SyncMode, TableNames, TenantConfig,
    Worker,
};
use turbo_db::{Db, SchemaSnapshot, SnapshotConnection};

fn config(tenant: &str, dir: &std::path::Path) -> Arc<TenantConfig> {
    let mut tables = TableNames::for_tenant(tenant);
    tables.tenant_relation_table = Some(format!("{}_subtenants", tables.table));
    tables.change_log_dir = Some(dir.to_path_buf());
    Arc::new(
        TenantConfig::builder(tenant)
            .attribute(Attribute::new("name").with_type("varchar(255)"))
            .attribute(Attribute::new("description").with_type("text"))
            .attribute(Attribute::new("price").with_type("double"))
            .search_attribute("name")
            .search_attribute("description")
            .tables(tables)
            .build()
            .unwrap(),
    )
}

#[test]
fn test_second_sync_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Arc::new(SnapshotConnection::new(SchemaSnapshot::default()));
    let mut service = IndexService::new();
    for tenant in ["shop", "outlet"] {
        let worker = MySqlWorker::new(config(tenant, dir.path()), Db::from_arc(conn.clone()));
        service.register(Arc::new(worker)).unwrap();
    }

    let report = service.create_or_update_index_structures(None).unwrap();
    assert!(report.is_success());
    assert_eq!(report.processed, vec!["outlet".to_string(), "shop".to_string()]);
    let first = conn.executed();
    // main table, three columns, engine, fulltext index, relations, subtenants
    assert_eq!(first.len(), 2 * 8);

    let schema = conn.schema();
    let shop = &schema.tables["ecommerceframework_productindex_shop"];
    assert_eq!(
        shop.indexes["search"],
        vec!["name".to_string(), "description".to_string()]
    );
    assert_eq!(shop.engine.as_deref(), Some("InnoDB"));

    let again = service.create_or_update_index_structures(None).unwrap();
    assert!(again.is_success());
    assert_eq!(conn.executed(), first);

    // relational workers have nothing to refresh
    let sync = service.sync(SyncMode::Reindex, None).unwrap();
    assert_eq!(sync.skipped.len(), 2);
    assert!(sync.processed.is_empty());
}

#[test]
fn test_delete_clears_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let conn = ScriptedConnection::new();
    let worker = MySqlWorker::new(config("shop", dir.path()), Db::from_arc(conn.clone()));

    let mut product = IndexableDocument::new(ProductId::new(5));
    product.do_index = false;
    worker.update_index(&product).unwrap();

    assert_eq!(
        conn.executed(),
        vec![
            "DELETE FROM ecommerceframework_productindex_shop WHERE id = ?".to_string(),
            "DELETE FROM ecommerceframework_productindex_shop_relations WHERE src = ?".to_string(),
            "DELETE FROM ecommerceframework_productindex_shop_subtenants WHERE id = ?".to_string(),
        ]
    );
}
