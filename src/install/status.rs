//! Installed-state tracking.
//!
//! Nothing here is persisted: the truth about what is installed lives on
//! disk and in the host package manifest, and a [`rescan`](InstallStatus::rescan)
//! recomputes every flag from those sources. The installer runs one at
//! startup and one after every mutating operation.

use std::collections::HashMap;

use tracing::debug;

use crate::catalog::{Catalog, ComponentKind, ModuleId};
use crate::paths::ProjectPaths;
use crate::registry::PackageClient;

/// Boolean install flags for every module, component, and external
/// dependency declared in the catalog.
#[derive(Debug, Clone, Default)]
pub struct InstallStatus {
    modules: HashMap<ModuleId, bool>,
    components: HashMap<(String, ComponentKind), bool>,
    urls: HashMap<String, bool>,
    registries: HashMap<String, bool>,
    scoped_registries: HashMap<String, bool>,
}

impl InstallStatus {
    /// Recomputes every flag by checking declared paths on disk and asking
    /// the package client about external dependencies.
    ///
    /// A component counts as installed when all of its declared paths
    /// exist. The module flag is fixed by the first component scanned for
    /// that module; components with no declared paths are skipped and
    /// never report installed.
    pub fn rescan(catalog: &Catalog, paths: &ProjectPaths, client: &dyn PackageClient) -> Self {
        let mut status = Self::default();
        for (_ty, module) in catalog.modules() {
            for (kind, component) in &module.components {
                for url in &component.dependency_urls {
                    status
                        .urls
                        .entry(url.clone())
                        .or_insert_with(|| client.package_added(url));
                }
                for name in &component.dependency_registries {
                    status
                        .registries
                        .entry(name.clone())
                        .or_insert_with(|| client.registry_added(name));
                }
                for registry in &component.scoped_registries {
                    status
                        .scoped_registries
                        .entry(registry.name.clone())
                        .or_insert_with(|| {
                            client.scoped_registry_added(&registry.name, &registry.url)
                        });
                }

                if component.paths.is_empty() {
                    continue;
                }
                let all_exist = component
                    .paths
                    .iter()
                    .all(|declared| paths.resolve(declared).exists());
                debug!("{}/{kind}: installed={all_exist}", module.name);
                status
                    .components
                    .insert((module.name.clone(), *kind), all_exist);
                status.modules.entry(module.id).or_insert(all_exist);
            }
        }
        status
    }

    pub fn module_installed(&self, id: ModuleId) -> bool {
        self.modules.get(&id).copied().unwrap_or(false)
    }

    pub fn component_installed(&self, module_name: &str, kind: ComponentKind) -> bool {
        self.components
            .get(&(module_name.to_string(), kind))
            .copied()
            .unwrap_or(false)
    }

    pub fn url_added(&self, url: &str) -> bool {
        self.urls.get(url).copied().unwrap_or(false)
    }

    pub fn registry_added(&self, name: &str) -> bool {
        self.registries.get(name).copied().unwrap_or(false)
    }

    pub fn scoped_registry_added(&self, name: &str) -> bool {
        self.scoped_registries.get(name).copied().unwrap_or(false)
    }

    /// Read-only component map for presentation snapshots.
    pub fn components(&self) -> &HashMap<(String, ComponentKind), bool> {
        &self.components
    }

    pub fn modules(&self) -> &HashMap<ModuleId, bool> {
        &self.modules
    }
}

#[cfg(test)]
impl InstallStatus {
    pub(crate) fn with_component(
        mut self,
        module_name: &str,
        kind: ComponentKind,
        installed: bool,
    ) -> Self {
        self.components
            .insert((module_name.to_string(), kind), installed);
        self
    }

    pub(crate) fn with_url(mut self, url: &str, added: bool) -> Self {
        self.urls.insert(url.to_string(), added);
        self
    }

    pub(crate) fn with_registry(mut self, name: &str, added: bool) -> Self {
        self.registries.insert(name.to_string(), added);
        self
    }

    pub(crate) fn with_scoped_registry(mut self, name: &str, added: bool) -> Self {
        self.scoped_registries.insert(name.to_string(), added);
        self
    }
}
