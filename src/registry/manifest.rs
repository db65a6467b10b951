//! File-backed package client.
//!
//! Stands in for the host package manager by persisting a JSON manifest of
//! added packages and scoped registries. The installer only sees the
//! [`PackageClient`] trait; anything with a real remote behind it can
//! replace this.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AddRequest, PackageClient};
use crate::catalog::ScopedRegistry;
use crate::error::{KitbagError, Result};

/// Source-identifier schemes accepted by [`ManifestPackageClient`].
const URL_SCHEMES: [&str; 4] = ["https://", "git@", "git+", "pkg://"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Manifest {
    /// RFC-3339 time of the last mutation.
    #[serde(default)]
    updated: String,
    #[serde(default)]
    packages: BTreeSet<String>,
    #[serde(default)]
    scoped_registries: Vec<ScopedRegistry>,
}

impl Manifest {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        self.updated = Utc::now().to_rfc3339();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Package client persisting its state in a JSON manifest file.
pub struct ManifestPackageClient {
    path: PathBuf,
}

impl ManifestPackageClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Manifest snapshot for the synchronous existence checks; an
    /// unreadable manifest answers as empty rather than failing a scan.
    fn read(&self) -> Manifest {
        Manifest::load(&self.path).unwrap_or_else(|err| {
            warn!(
                "failed to read package manifest {}: {err}",
                self.path.display()
            );
            Manifest::default()
        })
    }
}

impl PackageClient for ManifestPackageClient {
    fn package_added(&self, identifier: &str) -> bool {
        self.read().packages.contains(identifier)
    }

    fn registry_added(&self, name: &str) -> bool {
        // registry packages are recorded under their plain name
        self.read().packages.contains(name)
    }

    fn scoped_registry_added(&self, name: &str, url: &str) -> bool {
        self.read()
            .scoped_registries
            .iter()
            .any(|registry| registry.name == name && registry.url == url)
    }

    fn add_package(&self, identifier: &str) -> AddRequest {
        let path = self.path.clone();
        let identifier = identifier.to_string();
        AddRequest::spawn(move |progress| async move {
            validate_identifier(&identifier)?;
            progress.report(0.25);
            let mut manifest = Manifest::load(&path)?;
            if !manifest.packages.insert(identifier.clone()) {
                debug!("package {identifier} already in manifest");
                return Ok(());
            }
            progress.report(0.75);
            manifest.save(&path)?;
            info!("added package {identifier}");
            Ok(())
        })
    }

    fn add_scoped_registry(&self, registry: &ScopedRegistry) -> AddRequest {
        let path = self.path.clone();
        let registry = registry.clone();
        AddRequest::spawn(move |progress| async move {
            progress.report(0.25);
            let mut manifest = Manifest::load(&path)?;
            let present = manifest
                .scoped_registries
                .iter()
                .any(|existing| existing.name == registry.name && existing.url == registry.url);
            if present {
                debug!("scoped registry {} already in manifest", registry.name);
                return Ok(());
            }
            progress.report(0.75);
            let name = registry.name.clone();
            manifest.scoped_registries.push(registry);
            manifest.save(&path)?;
            info!("added scoped registry {name}");
            Ok(())
        })
    }
}

/// Rejects empty identifiers and URL-shaped identifiers with a scheme the
/// host cannot fetch; bare package/registry names pass through.
fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(KitbagError::Registry("empty package identifier".into()));
    }
    let url_shaped = identifier.contains("://") || identifier.starts_with("git@");
    if url_shaped
        && !URL_SCHEMES
            .iter()
            .any(|scheme| identifier.starts_with(scheme))
    {
        return Err(KitbagError::Registry(format!(
            "unsupported package source scheme: {identifier}"
        )));
    }
    Ok(())
}
