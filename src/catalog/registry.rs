//! Per-tenant catalog registry with explicit load/evict lifecycle.
//!
//! Catalogs are read-mostly: loaded once, shared immutably behind `Arc`
//! across concurrent requests, and replaced or evicted explicitly. There
//! is no implicit global cache.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;

use super::{Catalog, LoadError};

/// Concurrent map of tenant id to its loaded catalog.
#[derive(Debug, Default)]
pub struct CatalogRegistry {
    catalogs: DashMap<String, Arc<Catalog>>,
}

impl CatalogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog definition file and register it, replacing any
    /// previous catalog for the same tenant.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<Catalog>, LoadError> {
        let catalog = Arc::new(Catalog::from_file(path)?);
        tracing::debug!(tenant = catalog.tenant(), "catalog loaded");
        self.catalogs
            .insert(catalog.tenant().to_string(), Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Register an already-built catalog.
    pub fn insert(&self, catalog: Catalog) -> Arc<Catalog> {
        let catalog = Arc::new(catalog);
        self.catalogs
            .insert(catalog.tenant().to_string(), Arc::clone(&catalog));
        catalog
    }

    /// Fetch a tenant's catalog.
    pub fn get(&self, tenant: &str) -> Option<Arc<Catalog>> {
        self.catalogs.get(tenant).map(|entry| Arc::clone(&entry))
    }

    /// Remove a tenant's catalog. Returns true if one was registered.
    /// In-flight requests holding an `Arc` keep their snapshot.
    pub fn evict(&self, tenant: &str) -> bool {
        self.catalogs.remove(tenant).is_some()
    }

    /// Registered tenant ids, sorted.
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> =
            self.catalogs.iter().map(|e| e.key().clone()).collect();
        tenants.sort();
        tenants
    }
}
