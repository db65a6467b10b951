//! Install orchestration over one project tree.
//!
//! [`Installer`] owns the catalog, the scanned install status, and the
//! collaborator handles, and is the single mutator of the tree. Every
//! operation ends with a full rescan, so the status maps always describe
//! the disk and the package manifest, never the plan. Progress and
//! completion surface through the async operations themselves plus the
//! per-step report they return.

pub mod materialize;
pub mod resolver;
pub mod status;

pub use materialize::{delete_target, extract};
pub use resolver::{resolve_install_order, InstallAction, InstallPlan};
pub use status::InstallStatus;

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::catalog::{blob_prefix, Catalog, CatalogConfig, ComponentKind, ModuleType};
use crate::defines::DefineStore;
use crate::error::{KitbagError, Result};
use crate::paths::ProjectPaths;
use crate::registry::PackageClient;

/// Lifecycle of one (module, component) pair within a session. The two
/// transient states are only observable while an operation is in flight;
/// every rescan settles the map back to installed-or-not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentState {
    #[default]
    NotInstalled,
    DependenciesPending,
    Installing,
    Installed,
}

/// One failed step of an install run.
#[derive(Debug)]
pub struct InstallFailure {
    pub module: String,
    pub kind: ComponentKind,
    pub error: KitbagError,
}

/// What an install run actually did. Failures are recorded per item so a
/// batch can finish and still say exactly what went wrong where.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<(String, ComponentKind)>,
    pub failed: Vec<InstallFailure>,
    pub packages_added: Vec<String>,
    pub registries_added: Vec<String>,
    pub scoped_registries_added: Vec<String>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, mut other: InstallReport) {
        self.installed.append(&mut other.installed);
        self.failed.append(&mut other.failed);
        self.packages_added.append(&mut other.packages_added);
        self.registries_added.append(&mut other.registries_added);
        self.scoped_registries_added.append(&mut other.scoped_registries_added);
    }
}

/// Orchestrates installs and uninstalls for one project tree.
///
/// The installer is the sole writer under the single-writer discipline:
/// callers hold it exclusively and operations never overlap. Installed
/// state is recomputed from disk and the package client after every
/// mutation rather than updated incrementally.
pub struct Installer<C> {
    catalog: Catalog,
    project: ProjectPaths,
    client: C,
    defines: Option<Box<dyn DefineStore>>,
    status: InstallStatus,
    states: HashMap<(String, ComponentKind), ComponentState>,
}

impl<C: PackageClient> Installer<C> {
    /// Loads the catalog from the project data directory and takes a first
    /// scan of what is already present.
    pub fn initialize(project: ProjectPaths, client: C) -> Result<Self> {
        let catalog = Catalog::load_dir(&project)?;
        Ok(Self::with_catalog(catalog, project, client))
    }

    /// Builds an installer over an already-loaded catalog.
    pub fn with_catalog(catalog: Catalog, project: ProjectPaths, client: C) -> Self {
        let mut installer = Self {
            catalog,
            project,
            client,
            defines: None,
            status: InstallStatus::default(),
            states: HashMap::new(),
        };
        installer.rescan();
        installer
    }

    /// Attaches the build-configuration store whose symbols are retracted
    /// on uninstall.
    pub fn with_defines(mut self, defines: impl DefineStore + 'static) -> Self {
        self.defines = Some(Box::new(defines));
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &CatalogConfig {
        self.catalog.config()
    }

    pub fn partition_version(&self, module_type: ModuleType) -> i64 {
        self.catalog.partition_version(module_type)
    }

    pub fn status(&self) -> &InstallStatus {
        &self.status
    }

    pub fn component_state(&self, module: &str, kind: ComponentKind) -> ComponentState {
        self.states
            .get(&(module.to_string(), kind))
            .copied()
            .unwrap_or_default()
    }

    /// Re-reads the catalog from disk and rescans the tree.
    pub fn reload(&mut self) -> Result<()> {
        self.catalog = Catalog::load_dir(&self.project)?;
        self.rescan();
        Ok(())
    }

    /// Forgets all tracked state. The next operation starts from scratch.
    pub fn clear(&mut self) {
        self.status = InstallStatus::default();
        self.states.clear();
    }

    /// Installs one component with its prerequisites strictly first:
    /// dependency modules, external adds, then same-module lower kinds.
    /// Installing an installed component is a no-op, and so is installing
    /// into a module type whose partition never loaded. A failed external
    /// add aborts the rest of the chain; a failed materialization is
    /// recorded in the report and the remaining actions still run. The
    /// tree is rescanned before returning, on success and on failure
    /// alike.
    pub async fn install(
        &mut self,
        module_type: ModuleType,
        module_name: &str,
        kind: ComponentKind,
    ) -> Result<InstallReport> {
        if self.status.component_installed(module_name, kind) {
            debug!("{module_name}/{kind} is already installed");
            return Ok(InstallReport::default());
        }
        if self.catalog.partition(module_type).is_none() {
            warn!("no {module_type} partition loaded, cannot install {module_name}/{kind}");
            return Ok(InstallReport::default());
        }
        info!("installing {module_name}/{kind}");
        let plan =
            resolve_install_order(&self.catalog, &self.status, module_type, module_name, kind);
        self.set_state(module_name, kind, ComponentState::DependenciesPending);

        let mut report = InstallReport::default();
        let outcome = self.execute(&plan, &mut report).await;
        self.rescan();
        outcome.map(|()| report)
    }

    /// Installs every missing component in catalog order: module type,
    /// then module, then ascending component kind. `on_progress` runs as
    /// `(done, total)` after each pair actually attempted, where `total`
    /// precounts every pair in the catalog; pairs already present (or
    /// pulled in earlier as dependencies) are skipped and advance nothing.
    /// Failures land in the report and the batch keeps going.
    pub async fn install_all(
        &mut self,
        mut on_progress: impl FnMut(usize, usize),
    ) -> InstallReport {
        let pairs: Vec<(ModuleType, String, ComponentKind)> = self
            .catalog
            .modules()
            .flat_map(|(ty, module)| {
                module
                    .components
                    .keys()
                    .map(move |kind| (ty, module.name.clone(), *kind))
            })
            .collect();
        let total = pairs.len();
        info!("installing all: {total} component(s) in the catalog");

        let mut report = InstallReport::default();
        let mut done = 0usize;
        for (ty, name, kind) in pairs {
            if self.status.component_installed(&name, kind) {
                continue;
            }
            match self.install(ty, &name, kind).await {
                Ok(sub) => report.merge(sub),
                Err(error) => {
                    warn!("{name}/{kind} failed: {error}");
                    report.failed.push(InstallFailure {
                        module: name,
                        kind,
                        error,
                    });
                }
            }
            done += 1;
            on_progress(done, total);
        }
        report
    }

    /// Removes one component. Installed higher kinds on the same module
    /// come off first, highest kind down to the target, each dropping its
    /// blob targets and retracting its build symbols. Without a loaded
    /// partition there is nothing to enumerate and the call is a warned
    /// no-op. Per-target delete failures are logged and the loop keeps
    /// going. Ends with a rescan.
    pub fn uninstall(&mut self, module_type: ModuleType, module_name: &str, kind: ComponentKind) {
        let Some(module) = self.catalog.module_by_name(module_name) else {
            warn!("unknown module {module_name:?}, nothing to uninstall");
            return;
        };
        if self.catalog.partition(module_type).is_none() {
            warn!("no {module_type} partition loaded, {module_name}/{kind} has no removable blobs");
            return;
        }
        let mut doomed: Vec<ComponentKind> = module
            .components
            .keys()
            .filter(|higher| {
                **higher > kind && self.status.component_installed(module_name, **higher)
            })
            .copied()
            .collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        doomed.push(kind);

        for each in doomed {
            self.remove_component(module_type, module_name, each);
        }
        self.rescan();
    }

    async fn execute(&mut self, plan: &InstallPlan, report: &mut InstallReport) -> Result<()> {
        for action in &plan.actions {
            match action {
                InstallAction::AddPackage(identifier) => {
                    info!("adding package {identifier}");
                    self.client.add_package(identifier).wait().await?;
                    report.packages_added.push(identifier.clone());
                }
                InstallAction::AddRegistry(name) => {
                    // registry packages ride the same add pipeline, keyed
                    // by plain name instead of a source url
                    info!("adding registry package {name}");
                    self.client.add_package(name).wait().await?;
                    report.registries_added.push(name.clone());
                }
                InstallAction::AddScopedRegistry(registry) => {
                    info!("adding scoped registry {}", registry.name);
                    self.client.add_scoped_registry(registry).wait().await?;
                    report.scoped_registries_added.push(registry.name.clone());
                }
                InstallAction::Component {
                    module_type,
                    module,
                    kind,
                } => {
                    self.set_state(module, *kind, ComponentState::Installing);
                    match self.materialize_component(*module_type, module, *kind) {
                        Ok(()) => {
                            self.set_state(module, *kind, ComponentState::Installed);
                            report.installed.push((module.clone(), *kind));
                        }
                        Err(error) => {
                            warn!("materializing {module}/{kind} failed: {error}");
                            self.set_state(module, *kind, ComponentState::NotInstalled);
                            report.failed.push(InstallFailure {
                                module: module.clone(),
                                kind: *kind,
                                error,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Extracts every blob carrying the component's prefix into its
    /// resolved target. All blobs are attempted even after a failure; the
    /// first failure is the one reported.
    fn materialize_component(
        &self,
        module_type: ModuleType,
        module_name: &str,
        kind: ComponentKind,
    ) -> Result<()> {
        let Some(partition) = self.catalog.partition(module_type) else {
            warn!("no {module_type} partition loaded, nothing to materialize for {module_name}/{kind}");
            return Ok(());
        };
        let prefix = blob_prefix(module_name, kind);
        let mut first_failure = None;
        let mut blobs = 0usize;
        for (name, data) in partition.blobs_with_prefix(&prefix) {
            blobs += 1;
            let target = self.project.resolve(&name[prefix.len()..]);
            debug!("materializing {name} into {}", target.display());
            if let Err(err) = materialize::extract(&self.project, data, &target) {
                warn!("{err}");
                first_failure.get_or_insert(err);
            }
        }
        if blobs == 0 {
            warn!("{module_name}/{kind} has no blobs under prefix {prefix:?}");
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Deletes one component's blob targets and retracts its symbols.
    /// Best effort throughout.
    fn remove_component(
        &mut self,
        module_type: ModuleType,
        module_name: &str,
        kind: ComponentKind,
    ) {
        let Some(partition) = self.catalog.partition(module_type) else {
            return;
        };
        info!("uninstalling {module_name}/{kind}");
        let prefix = blob_prefix(module_name, kind);
        let targets: Vec<PathBuf> = partition
            .blobs_with_prefix(&prefix)
            .map(|(name, _)| self.project.resolve(&name[prefix.len()..]))
            .collect();
        for target in &targets {
            if let Err(err) = materialize::delete_target(&self.project, target) {
                warn!("{err}");
            }
        }

        let symbols: Vec<String> = self
            .catalog
            .component(module_name, kind)
            .map(|component| component.delete_symbols.clone())
            .unwrap_or_default();
        if let Some(defines) = self.defines.as_mut() {
            for symbol in &symbols {
                if let Err(err) = defines.retract(symbol) {
                    warn!("symbol {symbol:?} not retracted: {err}");
                }
            }
        }
        self.set_state(module_name, kind, ComponentState::NotInstalled);
    }

    fn rescan(&mut self) {
        self.status = InstallStatus::rescan(&self.catalog, &self.project, &self.client);
        self.sync_states();
    }

    /// Settles the per-component state map against the fresh scan.
    fn sync_states(&mut self) {
        let mut states = HashMap::new();
        for (_, module) in self.catalog.modules() {
            for kind in module.components.keys() {
                let state = if self.status.component_installed(&module.name, *kind) {
                    ComponentState::Installed
                } else {
                    ComponentState::NotInstalled
                };
                states.insert((module.name.clone(), *kind), state);
            }
        }
        self.states = states;
    }

    fn set_state(&mut self, module: &str, kind: ComponentKind, state: ComponentState) {
        self.states.insert((module.to_string(), kind), state);
    }
}
