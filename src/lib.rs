//! Dependency-resolving module installer over a binary catalog store.

pub mod catalog;
pub mod defines;
pub mod error;
pub mod install;
pub mod paths;
pub mod registry;

pub use catalog::{Catalog, CatalogConfig, Component, ComponentKind, Module, ModuleId, ModuleType};
pub use error::{KitbagError, Result};
pub use install::{InstallReport, InstallStatus, Installer};
pub use paths::ProjectPaths;
pub use registry::{AddRequest, ManifestPackageClient, PackageClient};
