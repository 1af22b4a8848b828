//! Registry of tenant workers and operations spanning all tenants.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use super::worker::Worker;
use crate::error::{CommerceError, Result};

/// Maintenance run by [`IndexService::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Reindex,
    UpdateSynonyms,
}

/// Outcome of a multi-tenant operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub processed: Vec<String>,
    /// Tenants whose worker does not support the operation.
    pub skipped: Vec<String>,
    /// Failed tenants with their error message.
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Workers by tenant name.
#[derive(Default)]
pub struct IndexService {
    workers: BTreeMap<String, Arc<dyn Worker>>,
}

impl fmt::Debug for IndexService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexService")
            .field("tenants", &self.workers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IndexService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker` and bind it to its tenant config.
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> Result<()> {
        let config = Arc::clone(worker.tenant_config());
        let tenant = config.tenant_name().to_string();
        if self.workers.contains_key(&tenant) {
            return Err(CommerceError::Configuration(format!(
                "Tenant \"{tenant}\" is already registered"
            )));
        }
        config.set_tenant_worker(&worker)?;
        self.workers.insert(tenant, worker);
        Ok(())
    }

    pub fn tenants(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn worker(&self, tenant: &str) -> Result<&Arc<dyn Worker>> {
        self.workers
            .get(tenant)
            .ok_or_else(|| CommerceError::Configuration(format!("Unknown tenant \"{tenant}\"")))
    }

    fn selected<'a>(&'a self, tenant: Option<&str>) -> Result<Vec<(&'a str, &'a Arc<dyn Worker>)>> {
        match tenant {
            Some(name) => {
                let (name, worker) = self
                    .workers
                    .get_key_value(name)
                    .ok_or_else(|| CommerceError::Configuration(format!("Unknown tenant \"{name}\"")))?;
                Ok(vec![(name.as_str(), worker)])
            }
            None => Ok(self.workers.iter().map(|(k, v)| (k.as_str(), v)).collect()),
        }
    }

    /// Create or update the index structures of one or all tenants. A failing
    /// tenant does not stop the others.
    pub fn create_or_update_index_structures(&self, tenant: Option<&str>) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for (name, worker) in self.selected(tenant)? {
            match worker.create_or_update_index_structures() {
                Ok(()) => report.processed.push(name.to_string()),
                Err(e) => {
                    error!(tenant = %name, error = %e, "index structure update failed");
                    report.failed.push((name.to_string(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Run `mode` for one or all tenants. Workers that cannot refresh their
    /// index are skipped.
    pub fn sync(&self, mode: SyncMode, tenant: Option<&str>) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for (name, worker) in self.selected(tenant)? {
            let Some(refresh) = worker.as_index_refresh() else {
                info!(tenant = %name, "worker has no refreshable index, skipping");
                report.skipped.push(name.to_string());
                continue;
            };
            let outcome = match mode {
                SyncMode::Reindex => refresh.start_reindex_mode(),
                SyncMode::UpdateSynonyms => refresh.update_synonyms(),
            };
            match outcome {
                Ok(()) => report.processed.push(name.to_string()),
                Err(e) => {
                    error!(tenant = %name, ?mode, error = %e, "index sync failed");
                    report.failed.push((name.to_string(), e.to_string()));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::Indexable;
    use crate::index::config::TenantConfig;
    use crate::index::list::ProductList;
    use crate::index::worker::IndexRefresh;
    use parking_lot::Mutex;

    struct Fake {
        config: Arc<TenantConfig>,
        refreshable: bool,
        fail: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl Fake {
        fn new(tenant: &str, refreshable: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                config: Arc::new(TenantConfig::builder(tenant).build().unwrap()),
                refreshable,
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn outcome(&self, call: &'static str) -> Result<()> {
            self.calls.lock().push(call);
            if self.fail {
                Err(CommerceError::NotImplemented(call.to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl Worker for Fake {
        fn tenant_config(&self) -> &Arc<TenantConfig> {
            &self.config
        }

        fn create_or_update_index_structures(&self) -> Result<()> {
            self.outcome("structures")
        }

        fn update_index(&self, _object: &dyn Indexable) -> Result<()> {
            Ok(())
        }

        fn delete_from_index(&self, _object: &dyn Indexable) -> Result<()> {
            Ok(())
        }

        fn product_list(&self) -> ProductList {
            ProductList::new(Arc::clone(&self.config))
        }

        fn as_index_refresh(&self) -> Option<&dyn IndexRefresh> {
            self.refreshable.then_some(self as &dyn IndexRefresh)
        }
    }

    impl IndexRefresh for Fake {
        fn start_reindex_mode(&self) -> Result<()> {
            self.outcome("reindex")
        }

        fn update_synonyms(&self) -> Result<()> {
            self.outcome("synonyms")
        }
    }

    #[test]
    fn test_register_binds_worker() {
        let mut service = IndexService::new();
        let fake = Fake::new("shop", true, false);
        service.register(fake.clone()).unwrap();
        let bound = fake.config.tenant_worker().unwrap();
        assert!(Arc::ptr_eq(&bound, service.worker("shop").unwrap()));

        assert!(matches!(service.register(fake), Err(CommerceError::Configuration(_))));
        assert!(service.worker("outlet").is_err());
    }

    #[test]
    fn test_binding_checks_config_identity() {
        let fake = Fake::new("shop", false, false);
        let worker: Arc<dyn Worker> = fake.clone();

        let other = TenantConfig::builder("shop").build().unwrap();
        assert!(matches!(other.set_tenant_worker(&worker), Err(CommerceError::Configuration(_))));
        assert!(other.tenant_worker().is_err());

        fake.config.set_tenant_worker(&worker).unwrap();
        assert!(matches!(
            fake.config.set_tenant_worker(&worker),
            Err(CommerceError::Configuration(_))
        ));
    }

    #[test]
    fn test_sync_isolates_failures() {
        let mut service = IndexService::new();
        let failing = Fake::new("a_failing", true, true);
        let plain = Fake::new("b_plain", false, false);
        let good = Fake::new("c_good", true, false);
        for worker in [failing.clone(), plain.clone(), good.clone()] {
            service.register(worker).unwrap();
        }

        let report = service.sync(SyncMode::Reindex, None).unwrap();
        assert_eq!(report.processed, vec!["c_good".to_string()]);
        assert_eq!(report.skipped, vec!["b_plain".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "a_failing");
        assert!(!report.is_success());
        assert_eq!(*good.calls.lock(), vec!["reindex"]);
        assert!(plain.calls.lock().is_empty());

        let report = service.sync(SyncMode::UpdateSynonyms, Some("c_good")).unwrap();
        assert!(report.is_success());
        assert_eq!(*good.calls.lock(), vec!["reindex", "synonyms"]);
    }

    #[test]
    fn test_structures_for_all_tenants() {
        let mut service = IndexService::new();
        service.register(Fake::new("shop", false, false)).unwrap();
        service.register(Fake::new("outlet", false, true)).unwrap();
        let report = service.create_or_update_index_structures(None).unwrap();
        assert_eq!(report.processed, vec!["shop".to_string()]);
        assert_eq!(report.failed[0].0, "outlet");
        assert!(service.create_or_update_index_structures(Some("nope")).is_err());
    }
}
