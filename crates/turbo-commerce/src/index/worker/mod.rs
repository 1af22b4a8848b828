//! Index workers: keep a tenant's index in sync with its products.
//!
//! [`OpenSearchWorker`] writes search documents, [`MySqlWorker`] writes rows
//! into the relational index maintained by [`MySqlIndexHelper`].

mod mysql;
mod opensearch;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::ids::CategoryId;
use crate::index::attribute::Indexable;
use crate::index::backend::SearchBackend;
use crate::index::config::TenantConfig;
use crate::index::list::ProductList;

pub use mysql::{MySqlIndexHelper, MySqlWorker};
pub use opensearch::OpenSearchWorker;

/// Separator of multi value fields stored as text.
pub const MULTISELECT_DELIMITER: &str = "#;#";

/// Keeps the index of one tenant up to date.
pub trait Worker: Send + Sync {
    fn tenant_config(&self) -> &Arc<TenantConfig>;

    /// Names of the indexed attributes, without the ones hidden in field
    /// lists when `consider_hide_in_field_list` is set.
    fn index_attributes(&self, consider_hide_in_field_list: bool) -> Vec<String> {
        self.tenant_config()
            .attributes()
            .iter()
            .filter(|a| !(consider_hide_in_field_list && a.hide_in_field_list()))
            .map(|a| a.name().to_string())
            .collect()
    }

    fn filter_groups(&self) -> Vec<String> {
        self.tenant_config().filter_groups()
    }

    fn attributes_by_filter_group(&self, filter_group: &str) -> Vec<String> {
        self.tenant_config()
            .attributes()
            .iter()
            .filter(|a| a.filter_group() == Some(filter_group))
            .map(|a| a.name().to_string())
            .collect()
    }

    fn general_search_attributes(&self) -> Vec<String> {
        self.tenant_config().search_attributes().to_vec()
    }

    fn create_or_update_index_structures(&self) -> Result<()>;

    /// Write `object` to the index, or remove it when it should not be indexed.
    fn update_index(&self, object: &dyn Indexable) -> Result<()>;

    fn delete_from_index(&self, object: &dyn Indexable) -> Result<()>;

    fn product_list(&self) -> ProductList;

    /// Backend serving product list requests, for search based workers.
    fn search_backend(&self) -> Option<Arc<dyn SearchBackend>> {
        None
    }

    fn as_index_refresh(&self) -> Option<&dyn IndexRefresh> {
        None
    }
}

/// Maintenance of search indexes that can be rebuilt in place.
pub trait IndexRefresh {
    /// Rebuild the index from its current definition.
    fn start_reindex_mode(&self) -> Result<()>;

    fn update_synonyms(&self) -> Result<()>;
}

/// System fields of an object as they are indexed.
pub(crate) fn system_values(config: &TenantConfig, object: &dyn Indexable) -> Map<String, Value> {
    let ids = |ids: Vec<CategoryId>| -> Vec<Value> { ids.into_iter().map(|c| Value::from(c.get())).collect() };

    let mut system = Map::new();
    system.insert("id".to_string(), Value::from(object.id().get()));
    system.insert("classId".to_string(), Value::from(object.class_id()));
    system.insert(
        "parentId".to_string(),
        object.parent_id().map(|p| Value::from(p.get())).unwrap_or(Value::Null),
    );
    system.insert("virtualProductId".to_string(), Value::from(object.virtual_product_id().get()));
    system.insert("virtualProductActive".to_string(), Value::from(object.virtual_product_active()));
    system.insert("type".to_string(), Value::from(object.kind().as_str()));
    system.insert("categoryIds".to_string(), Value::Array(ids(object.categories())));
    system.insert("parentCategoryIds".to_string(), Value::Array(ids(object.parent_category_ids())));
    system.insert(
        "priceSystemName".to_string(),
        Value::from(object.price_system_name().unwrap_or_default()),
    );
    system.insert("active".to_string(), Value::from(config.is_active(object)));
    system.insert("inProductList".to_string(), Value::from(object.is_active(true)));
    system
}

/// Attribute values and relation ids of an object, split by kind.
pub(crate) fn attribute_values(
    config: &TenantConfig,
    object: &dyn Indexable,
) -> (Map<String, Value>, Map<String, Value>) {
    let mut attributes = Map::new();
    let mut relations = Map::new();
    for attribute in config.attributes() {
        let value = attribute.value(object).unwrap_or(Value::Null);
        let value = attribute.interpret(value);
        if attribute.is_relation() {
            let ids: Vec<Value> = value
                .as_array()
                .map(|items| items.iter().filter_map(|r| r.get("dest").cloned()).collect())
                .unwrap_or_default();
            relations.insert(attribute.name().to_string(), Value::Array(ids));
        } else {
            attributes.insert(attribute.name().to_string(), value);
        }
    }
    (attributes, relations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProductId;
    use crate::index::attribute::{Attribute, IndexableDocument, ObjectRelations};
    use serde_json::json;

    fn config() -> TenantConfig {
        TenantConfig::builder("shop")
            .attribute(Attribute::new("name").with_filter_group("text"))
            .attribute(Attribute::new("color").with_filter_group("multiselect"))
            .attribute(Attribute::new("ean").hidden_in_field_list())
            .attribute(Attribute::new("brand").with_interpreter(Arc::new(ObjectRelations), Map::new()))
            .search_attribute("name")
            .build()
            .unwrap()
    }

    #[test]
    fn test_system_values_of_variant() {
        let config = config();
        let shoe = IndexableDocument::new(ProductId::new(12))
            .variant_of(ProductId::new(10))
            .with_categories([CategoryId::new(3)])
            .with_price_system("default");
        let system = system_values(&config, &shoe);
        assert_eq!(system["virtualProductId"], json!(10));
        assert_eq!(system["parentId"], json!(10));
        assert_eq!(system["type"], json!("variant"));
        assert_eq!(system["categoryIds"], json!([3]));
        assert_eq!(system["priceSystemName"], json!("default"));
    }

    #[test]
    fn test_attribute_values_split_relations() {
        let config = config();
        let shoe = IndexableDocument::new(ProductId::new(12))
            .with_field("color", json!("red"))
            .with_field("brand", json!([7, 9]));
        let (attributes, relations) = attribute_values(&config, &shoe);
        assert_eq!(attributes["color"], json!("red"));
        assert_eq!(attributes["name"], Value::Null);
        assert!(!attributes.contains_key("brand"));
        assert_eq!(relations["brand"], json!([7, 9]));
    }
}
