//! Product index: tenant configuration, workers and the product list.
//!
//! - [`attribute`]: indexed attributes, getters and interpreters
//! - [`config`]: per-tenant configuration and field name mapping
//! - [`backend`]: search backend seam and its response model
//! - [`list`]: product list query compiler and facets
//! - [`mockup`]: lightweight product stand-ins and their cache
//! - [`worker`]: search and relational index workers
//! - [`filter`]: filter types driving a product list
//! - [`service`]: tenant registry and multi-tenant operations

pub mod attribute;
pub mod backend;
pub mod config;
pub mod filter;
pub mod list;
pub mod mockup;
pub mod service;
pub mod worker;

pub use attribute::{Attribute, Getter, Indexable, IndexableDocument, Interpreter, ObjectKind};
pub use backend::{BackendError, Hit, SearchBackend, SearchResponse};
pub use config::{ClientConfig, TableNames, TenantConfig, TenantConfigBuilder, TenantDefinition};
pub use filter::{FilterConfig, FilterDefinition, FilterService, FilterType};
pub use list::{GroupByValue, IndexCondition, OrderKey, ProductList, SortDirection, VariantMode};
pub use mockup::{MockupCache, ProductMockup, RelationRef};
pub use service::{IndexService, SyncMode, SyncReport};
pub use worker::{IndexRefresh, MySqlIndexHelper, MySqlWorker, OpenSearchWorker, Worker};
