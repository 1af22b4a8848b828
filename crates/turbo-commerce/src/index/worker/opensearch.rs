use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{attribute_values, system_values, IndexRefresh, Worker};
use crate::error::Result;
use crate::index::attribute::{Attribute, Indexable, ObjectKind};
use crate::index::backend::SearchBackend;
use crate::index::config::TenantConfig;
use crate::index::list::ProductList;
use crate::index::mockup::{MockupCache, RelationRef, StoredMockupData};
use crate::price_system::PriceSystemLocator;

/// Name of the join field linking variants to their product.
pub const PARENT_CHILD_FIELD: &str = "parentchildrelation";

const SEARCH_TYPES: [&str; 12] = [
    "keyword", "text", "long", "integer", "short", "byte", "double", "float", "boolean", "date",
    "object", "nested",
];

/// Worker writing one search document per product and variant.
pub struct OpenSearchWorker {
    config: Arc<TenantConfig>,
    backend: Arc<dyn SearchBackend>,
    mockup_cache: Option<MockupCache>,
    price_systems: Option<Arc<dyn PriceSystemLocator>>,
    index_settings: Map<String, Value>,
}

impl fmt::Debug for OpenSearchWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSearchWorker")
            .field("tenant", &self.config.tenant_name())
            .field("index", &self.config.index_name())
            .field("mockup_cache", &self.mockup_cache.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenSearchWorker {
    pub fn new(config: Arc<TenantConfig>, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            config,
            backend,
            mockup_cache: None,
            price_systems: None,
            index_settings: Map::new(),
        }
    }

    /// Keep product mockups cached alongside the index.
    pub fn with_mockup_cache(mut self, cache: MockupCache) -> Self {
        self.mockup_cache = Some(cache);
        self
    }

    pub fn with_price_systems(mut self, locator: Arc<dyn PriceSystemLocator>) -> Self {
        self.price_systems = Some(locator);
        self
    }

    /// Index settings sent on creation, e.g. analysis with synonym filters.
    pub fn with_index_settings(mut self, settings: Map<String, Value>) -> Self {
        self.index_settings = settings;
        self
    }

    /// Settings and mappings of the index.
    pub fn index_definition(&self) -> Value {
        let system = json!({
            "id": {"type": "long"},
            "classId": {"type": "keyword"},
            "parentId": {"type": "long"},
            "virtualProductId": {"type": "long"},
            "virtualProductActive": {"type": "boolean"},
            "type": {"type": "keyword"},
            "categoryIds": {"type": "long"},
            "parentCategoryIds": {"type": "long"},
            "priceSystemName": {"type": "keyword"},
            "active": {"type": "boolean"},
            "inProductList": {"type": "boolean"},
        });

        let mut attributes = Map::new();
        let mut relations = Map::new();
        for attribute in self.config.attributes() {
            if attribute.is_relation() {
                relations.insert(attribute.name().to_string(), json!({"type": "long"}));
            } else {
                attributes.insert(attribute.name().to_string(), attribute_mapping(attribute));
            }
        }

        json!({
            "settings": self.index_settings,
            "mappings": {
                "properties": {
                    "system": {"type": "object", "properties": system},
                    "type": {"type": "keyword"},
                    "attributes": {"type": "object", "properties": attributes},
                    "relations": {"type": "object", "properties": relations},
                    PARENT_CHILD_FIELD: {
                        "type": "join",
                        "relations": { ObjectKind::Object.as_str(): ObjectKind::Variant.as_str() }
                    },
                }
            }
        })
    }

    /// Search document of `object` and the routing it is stored with.
    pub fn document(&self, object: &dyn Indexable) -> (Value, Option<String>) {
        let system = system_values(&self.config, object);
        let (attributes, relations) = attribute_values(&self.config, object);

        let (join, routing) = match (object.kind(), object.parent_id()) {
            (ObjectKind::Variant, Some(parent)) => (
                json!({"name": ObjectKind::Variant.as_str(), "parent": parent.get()}),
                Some(parent.to_string()),
            ),
            _ => (json!({"name": ObjectKind::Object.as_str()}), None),
        };

        let document = json!({
            "system": system,
            "type": object.kind().as_str(),
            "attributes": attributes,
            "relations": relations,
            PARENT_CHILD_FIELD: join,
        });
        (document, routing)
    }

    fn update_mockup(&self, cache: &MockupCache, document: &Value, object: &dyn Indexable) -> Result<()> {
        let mut data = Map::new();
        for section in ["system", "attributes"] {
            if let Some(Value::Object(values)) = document.get(section) {
                data.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        let mut relations = Vec::new();
        if let Some(Value::Object(fields)) = document.get("relations") {
            for (name, ids) in fields {
                let ids = ids.as_array().map(Vec::as_slice).unwrap_or_default();
                relations.extend(
                    ids.iter()
                        .filter_map(Value::as_i64)
                        .map(|dest| RelationRef::object(name.as_str(), dest)),
                );
            }
        }

        let stored = StoredMockupData { data, relations };
        if cache.store(object.id(), &stored)? {
            cache.save(object.id(), Some(stored))?;
        }
        Ok(())
    }
}

fn attribute_mapping(attribute: &Attribute) -> Value {
    if let Some(mapping) = attribute.option("mapping") {
        return mapping.clone();
    }
    let column_type = attribute.column_type().unwrap_or("keyword").to_lowercase();
    let search_type = if SEARCH_TYPES.contains(&column_type.as_str()) {
        column_type.as_str()
    } else if column_type.starts_with("tinyint(1)") || column_type.starts_with("bool") {
        "boolean"
    } else if column_type.contains("int") {
        "long"
    } else if ["double", "float", "decimal", "real"].iter().any(|t| column_type.starts_with(t)) {
        "double"
    } else if column_type.starts_with("date") || column_type.starts_with("timestamp") {
        "date"
    } else if column_type.contains("text") {
        "text"
    } else {
        "keyword"
    };
    json!({"type": search_type})
}

impl Worker for OpenSearchWorker {
    fn tenant_config(&self) -> &Arc<TenantConfig> {
        &self.config
    }

    fn create_or_update_index_structures(&self) -> Result<()> {
        let index = self.config.index_name();
        info!(tenant = %self.config.tenant_name(), index = %index, "updating index structures");
        self.backend.ensure_index(&index, &self.index_definition())?;
        Ok(())
    }

    fn update_index(&self, object: &dyn Indexable) -> Result<()> {
        if !self.config.in_index(object) {
            return self.delete_from_index(object);
        }

        let (document, routing) = self.document(object);
        debug!(tenant = %self.config.tenant_name(), product = %object.id(), "indexing product");
        self.backend.index_document(
            &self.config.index_name(),
            &object.id().to_string(),
            &document,
            routing.as_deref(),
        )?;

        if let Some(cache) = &self.mockup_cache {
            self.update_mockup(cache, &document, object)?;
        }
        Ok(())
    }

    fn delete_from_index(&self, object: &dyn Indexable) -> Result<()> {
        debug!(tenant = %self.config.tenant_name(), product = %object.id(), "removing product from index");
        self.backend
            .delete_document(&self.config.index_name(), &object.id().to_string())?;
        if let Some(cache) = &self.mockup_cache {
            cache.delete(object.id())?;
        }
        Ok(())
    }

    fn product_list(&self) -> ProductList {
        let list = ProductList::new(Arc::clone(&self.config));
        match &self.price_systems {
            Some(locator) => list.with_price_systems(Arc::clone(locator)),
            None => list,
        }
    }

    fn search_backend(&self) -> Option<Arc<dyn SearchBackend>> {
        Some(Arc::clone(&self.backend))
    }

    fn as_index_refresh(&self) -> Option<&dyn IndexRefresh> {
        Some(self)
    }
}

impl IndexRefresh for OpenSearchWorker {
    fn start_reindex_mode(&self) -> Result<()> {
        let index = self.config.index_name();
        info!(tenant = %self.config.tenant_name(), index = %index, "reindexing");
        self.backend.reindex(&index, &self.index_definition())?;
        Ok(())
    }

    fn update_synonyms(&self) -> Result<()> {
        let index = self.config.index_name();
        info!(tenant = %self.config.tenant_name(), index = %index, "reloading synonyms");
        self.backend.reload_synonyms(&index)?;
        Ok(())
    }
}
