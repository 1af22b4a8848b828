//! Per-tenant product index configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CommerceError, Result};
use crate::ids::ProductId;
use crate::index::attribute::{getter_by_name, interpreter_by_name, Attribute, Indexable};
use crate::index::filter::FilterService;
use crate::index::mockup::{ProductMockup, RelationRef};
use crate::index::worker::Worker;

/// Columns every index table carries, and fields every search document has
/// under `system`.
pub const SYSTEM_ATTRIBUTES: [&str; 11] = [
    "id",
    "classId",
    "parentId",
    "virtualProductId",
    "virtualProductActive",
    "type",
    "categoryIds",
    "parentCategoryIds",
    "priceSystemName",
    "active",
    "inProductList",
];

pub fn is_system_attribute(name: &str) -> bool {
    SYSTEM_ATTRIBUTES.contains(&name)
}

/// Base name of `name.analyzed` or `name^3`, and the rest.
pub(crate) fn split_sub_field(field: &str) -> (&str, &str) {
    match field.find(['.', '^']) {
        Some(pos) => field.split_at(pos),
        None => (field, ""),
    }
}

/// Search client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Index name, the tenant name when unset. Always lowercased.
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub scroll_keep_alive: String,
}

fn default_keep_alive() -> String {
    "30s".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            index_name: None,
            scroll_keep_alive: default_keep_alive(),
        }
    }
}

/// Relational tables used by a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableNames {
    pub table: String,
    pub relation_table: String,
    #[serde(default)]
    pub tenant_relation_table: Option<String>,
    #[serde(default = "default_store_table")]
    pub store_table: String,
    /// Where structure changes are logged, the temp directory when unset.
    #[serde(default)]
    pub change_log_dir: Option<PathBuf>,
}

fn default_store_table() -> String {
    "ecommerceframework_productindex_store".to_string()
}

impl TableNames {
    pub fn for_tenant(tenant: &str) -> Self {
        let table = format!("ecommerceframework_productindex_{}", tenant.to_lowercase());
        Self {
            relation_table: format!("{table}_relations"),
            table,
            tenant_relation_table: None,
            store_table: default_store_table(),
            change_log_dir: None,
        }
    }
}

/// Which worker serves a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    #[default]
    OpenSearch,
    MySql,
}

/// Configuration of one product index tenant.
///
/// Immutable once built, except for the one-time worker binding.
pub struct TenantConfig {
    name: String,
    worker_kind: WorkerKind,
    attributes: Vec<Attribute>,
    search_attributes: Vec<String>,
    filter_service: Arc<FilterService>,
    client: ClientConfig,
    sub_tenant_condition: Option<Value>,
    tables: TableNames,
    worker: OnceLock<Weak<dyn Worker>>,
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("name", &self.name)
            .field("worker_kind", &self.worker_kind)
            .field("attributes", &self.attributes)
            .field("search_attributes", &self.search_attributes)
            .field("client", &self.client)
            .field("tables", &self.tables)
            .field("worker_bound", &self.worker.get().is_some())
            .finish_non_exhaustive()
    }
}

impl TenantConfig {
    pub fn builder(name: impl Into<String>) -> TenantConfigBuilder {
        TenantConfigBuilder::new(name)
    }

    pub fn tenant_name(&self) -> &str {
        &self.name
    }

    pub fn worker_kind(&self) -> WorkerKind {
        self.worker_kind
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn search_attributes(&self) -> &[String] {
        &self.search_attributes
    }

    pub fn filter_service(&self) -> &Arc<FilterService> {
        &self.filter_service
    }

    pub fn client(&self) -> &ClientConfig {
        &self.client
    }

    pub fn sub_tenant_condition(&self) -> Option<&Value> {
        self.sub_tenant_condition.as_ref()
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Filter groups in use, sorted.
    pub fn filter_groups(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter_map(|a| a.filter_group())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn index_name(&self) -> String {
        self.client
            .index_name
            .as_deref()
            .unwrap_or(&self.name)
            .to_lowercase()
    }

    /// Search document path of a field.
    ///
    /// System attributes live under `system`, relation attributes under
    /// `relations`, everything else under `attributes`. With
    /// `consider_sub_field_names`, `name.analyzed` and `name^3` are mapped by
    /// their base name and keep their suffix. Unknown fields are returned as is.
    pub fn field_name_mapped(&self, field: &str, consider_sub_field_names: bool) -> String {
        if is_system_attribute(field) {
            return format!("system.{field}");
        }
        let (base, suffix) = if consider_sub_field_names {
            split_sub_field(field)
        } else {
            (field, "")
        };
        match self.attribute(base) {
            Some(attr) if attr.is_relation() => format!("relations.{base}{suffix}"),
            Some(_) => format!("attributes.{base}{suffix}"),
            None => field.to_string(),
        }
    }

    /// Short field name of a mapped path, sub field names dropped.
    pub fn reverse_mapped_field_name(&self, mapped: &str) -> Option<String> {
        let (prefix, rest) = mapped.split_once('.')?;
        let (base, _) = split_sub_field(rest);
        let known = match prefix {
            "system" => is_system_attribute(base),
            "attributes" => self.attribute(base).is_some_and(|a| !a.is_relation()),
            "relations" => self.attribute(base).is_some_and(Attribute::is_relation),
            _ => false,
        };
        known.then(|| base.to_string())
    }

    pub fn id_column_type(&self, primary: bool) -> &'static str {
        if primary {
            "int(11) NOT NULL default '0'"
        } else {
            "int(11) NOT NULL"
        }
    }

    pub fn is_active(&self, object: &dyn Indexable) -> bool {
        object.is_active(false)
    }

    pub fn in_index(&self, object: &dyn Indexable) -> bool {
        object.do_index()
    }

    pub fn create_mockup(
        &self,
        id: ProductId,
        params: Map<String, Value>,
        relations: Vec<RelationRef>,
    ) -> ProductMockup {
        ProductMockup::new(id, params, relations)
    }

    /// Bind the worker serving this tenant. Only works once, and only for a
    /// worker built on this very config.
    pub fn set_tenant_worker(&self, worker: &Arc<dyn Worker>) -> Result<()> {
        if self.worker.get().is_some() {
            return Err(CommerceError::Configuration(format!(
                "Worker for tenant \"{}\" is already set",
                self.name
            )));
        }
        if !std::ptr::eq(Arc::as_ptr(worker.tenant_config()), self) {
            return Err(CommerceError::Configuration(
                "Worker config does not match the config the worker is about to be set to".to_string(),
            ));
        }
        self.worker.set(Arc::downgrade(worker)).map_err(|_| {
            CommerceError::Configuration(format!("Worker for tenant \"{}\" is already set", self.name))
        })
    }

    pub fn tenant_worker(&self) -> Result<Arc<dyn Worker>> {
        self.worker
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| CommerceError::Configuration("Tenant worker is not set.".to_string()))
    }
}

/// Builder for [`TenantConfig`].
#[derive(Debug)]
pub struct TenantConfigBuilder {
    name: String,
    worker_kind: WorkerKind,
    attributes: Vec<Attribute>,
    search_attributes: Vec<String>,
    filter_service: Option<Arc<FilterService>>,
    client: ClientConfig,
    sub_tenant_condition: Option<Value>,
    tables: Option<TableNames>,
}

impl TenantConfigBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker_kind: WorkerKind::default(),
            attributes: Vec::new(),
            search_attributes: Vec::new(),
            filter_service: None,
            client: ClientConfig::default(),
            sub_tenant_condition: None,
            tables: None,
        }
    }

    pub fn worker_kind(mut self, kind: WorkerKind) -> Self {
        self.worker_kind = kind;
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn search_attribute(mut self, name: impl Into<String>) -> Self {
        self.search_attributes.push(name.into());
        self
    }

    pub fn filter_service(mut self, service: Arc<FilterService>) -> Self {
        self.filter_service = Some(service);
        self
    }

    pub fn client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn sub_tenant_condition(mut self, condition: Value) -> Self {
        self.sub_tenant_condition = Some(condition);
        self
    }

    pub fn tables(mut self, tables: TableNames) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn build(self) -> Result<TenantConfig> {
        let mut seen = BTreeSet::new();
        for attr in &self.attributes {
            if !seen.insert(attr.name()) {
                return Err(CommerceError::Configuration(format!(
                    "The attribute \"{}\" in product index tenant \"{}\" is defined twice",
                    attr.name(),
                    self.name
                )));
            }
        }

        for search in &self.search_attributes {
            let (base, _) = split_sub_field(search);
            if !seen.contains(base) {
                return Err(CommerceError::Configuration(format!(
                    "The search attribute \"{}\" in product index tenant \"{}\" is not defined as attribute",
                    search, self.name
                )));
            }
        }

        let tables = self.tables.unwrap_or_else(|| TableNames::for_tenant(&self.name));
        Ok(TenantConfig {
            worker_kind: self.worker_kind,
            attributes: self.attributes,
            search_attributes: self.search_attributes,
            filter_service: self
                .filter_service
                .unwrap_or_else(|| Arc::new(FilterService::with_defaults())),
            client: self.client,
            sub_tenant_condition: self.sub_tenant_condition,
            tables,
            worker: OnceLock::new(),
            name: self.name,
        })
    }
}

/// Serialized tenant, as found in the `tenants` list of a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDefinition {
    pub name: String,
    #[serde(default)]
    pub worker: WorkerKind,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub search_attributes: Vec<String>,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub sub_tenant_condition: Option<Value>,
    #[serde(default)]
    pub tables: Option<TableNames>,
}

impl TenantDefinition {
    pub fn build(&self) -> Result<TenantConfig> {
        let mut builder = TenantConfig::builder(&self.name)
            .worker_kind(self.worker)
            .client(self.client.clone());
        for attr in &self.attributes {
            builder = builder.attribute(attr.build(&self.name)?);
        }
        for search in &self.search_attributes {
            builder = builder.search_attribute(search);
        }
        if let Some(condition) = &self.sub_tenant_condition {
            builder = builder.sub_tenant_condition(condition.clone());
        }
        if let Some(tables) = &self.tables {
            builder = builder.tables(tables.clone());
        }
        builder.build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default, rename = "type")]
    pub column_type: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub filter_group: Option<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub getter: Option<String>,
    #[serde(default)]
    pub getter_options: Map<String, Value>,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub interpreter_options: Map<String, Value>,
    #[serde(default)]
    pub hide_in_field_list: bool,
}

impl AttributeDefinition {
    fn build(&self, tenant: &str) -> Result<Attribute> {
        let mut attr = Attribute::new(&self.name);
        if let Some(field_name) = &self.field_name {
            attr = attr.with_field_name(field_name);
        }
        if let Some(column_type) = &self.column_type {
            attr = attr.with_type(column_type);
        }
        if let Some(locale) = &self.locale {
            attr = attr.with_locale(locale);
        }
        if let Some(group) = &self.filter_group {
            attr = attr.with_filter_group(group);
        }
        for (name, value) in &self.options {
            attr = attr.with_option(name, value.clone());
        }
        if let Some(name) = &self.getter {
            let getter = getter_by_name(name).ok_or_else(|| {
                CommerceError::Configuration(format!(
                    "Unknown getter \"{}\" for attribute \"{}\" in tenant \"{}\"",
                    name, self.name, tenant
                ))
            })?;
            attr = attr.with_getter(getter, self.getter_options.clone());
        }
        if let Some(name) = &self.interpreter {
            let interpreter = interpreter_by_name(name).ok_or_else(|| {
                CommerceError::Configuration(format!(
                    "Unknown interpreter \"{}\" for attribute \"{}\" in tenant \"{}\"",
                    name, self.name, tenant
                ))
            })?;
            attr = attr.with_interpreter(interpreter, self.interpreter_options.clone());
        }
        if self.hide_in_field_list {
            attr = attr.hidden_in_field_list();
        }
        Ok(attr)
    }
}
