//! Catalog subsystem: the authored module config plus per-type binary
//! partitions, with the lookup tables the resolver and installer run on.

pub mod config;
pub mod partition;

pub use config::{
    CatalogConfig, Component, ComponentKind, Module, ModuleDependency, ModuleId, ModuleType,
    ScopedRegistry, ToolLink,
};
pub use partition::{BlobIndexEntry, Partition};

use std::collections::{BTreeMap, HashMap};
use std::fs;

use tracing::{debug, info, warn};

use crate::error::{KitbagError, Result};
use crate::paths::ProjectPaths;

/// Blob-name prefix for one module component, per the
/// `"{moduleName}_{componentKind}_{relativePath}"` convention.
pub fn blob_prefix(module_name: &str, kind: ComponentKind) -> String {
    format!("{module_name}_{kind}_")
}

/// Loaded catalog: config, partitions, and id/name lookup tables.
#[derive(Debug, Clone)]
pub struct Catalog {
    config: CatalogConfig,
    partitions: BTreeMap<ModuleType, Partition>,
    by_id: HashMap<ModuleId, (ModuleType, usize)>,
    by_name: HashMap<String, ModuleId>,
}

impl Catalog {
    /// Builds the lookup tables over a parsed config. Duplicate module ids
    /// or names make the catalog unusable and are rejected here.
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for (ty, modules) in &config.modules {
            for (slot, module) in modules.iter().enumerate() {
                if by_id.insert(module.id, (*ty, slot)).is_some() {
                    return Err(KitbagError::CatalogParse(format!(
                        "duplicate module id {} in catalog config",
                        module.id
                    )));
                }
                if by_name.insert(module.name.clone(), module.id).is_some() {
                    return Err(KitbagError::CatalogParse(format!(
                        "duplicate module name {:?} in catalog config",
                        module.name
                    )));
                }
            }
        }
        Ok(Self {
            config,
            partitions: BTreeMap::new(),
            by_id,
            by_name,
        })
    }

    /// Reads `catalog.bin` plus one `<ModuleType>.bin` partition per
    /// configured type from the project data directory. A missing or
    /// malformed partition is logged and skipped; its modules stay
    /// registered as metadata with no installable blobs.
    pub fn load_dir(paths: &ProjectPaths) -> Result<Self> {
        let raw = fs::read(paths.catalog_file())?;
        let config = CatalogConfig::from_bytes(&raw)?;
        let mut catalog = Self::new(config)?;

        for ty in ModuleType::ALL {
            if !catalog.config.modules.contains_key(&ty) {
                continue;
            }
            let path = paths.data_dir().join(format!("{ty}.bin"));
            let raw = match fs::read(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("partition {ty} unreadable at {}: {err}", path.display());
                    continue;
                }
            };
            match Partition::from_bytes(&raw) {
                Ok(partition) => {
                    debug!(
                        "partition {ty} loaded: version {}, {} blob(s)",
                        partition.version(),
                        partition.len()
                    );
                    catalog.partitions.insert(ty, partition);
                }
                Err(err) => warn!("skipping malformed partition {ty}: {err}"),
            }
        }

        info!(
            "catalog loaded: {} module(s), {} partition(s)",
            catalog.by_id.len(),
            catalog.partitions.len()
        );
        Ok(catalog)
    }

    /// Attaches a partition built elsewhere (authoring tools, tests).
    pub fn attach_partition(&mut self, ty: ModuleType, partition: Partition) {
        self.partitions.insert(ty, partition);
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Every module in catalog order (type, then declaration order).
    pub fn modules(&self) -> impl Iterator<Item = (ModuleType, &Module)> + '_ {
        self.config
            .modules
            .iter()
            .flat_map(|(ty, modules)| modules.iter().map(move |module| (*ty, module)))
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.module_entry(id).map(|(_, module)| module)
    }

    /// Module plus the type partition it lives in.
    pub fn module_entry(&self, id: ModuleId) -> Option<(ModuleType, &Module)> {
        let (ty, slot) = *self.by_id.get(&id)?;
        let module = self.config.modules.get(&ty)?.get(slot)?;
        Some((ty, module))
    }

    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.module(*self.by_name.get(name)?)
    }

    pub fn component(&self, module_name: &str, kind: ComponentKind) -> Option<&Component> {
        self.module_by_name(module_name)?.component(kind)
    }

    pub fn partition(&self, ty: ModuleType) -> Option<&Partition> {
        self.partitions.get(&ty)
    }

    /// Content version of a loaded partition, 0 when absent.
    pub fn partition_version(&self, ty: ModuleType) -> i64 {
        self.partitions.get(&ty).map_or(0, Partition::version)
    }
}
