//! Project layout and declared-path resolution.
//!
//! A kitbag project is a directory tree with an asset root one level below
//! the project root and a `.kitbag/` data directory holding the binary
//! catalog, its partitions, and scratch space. Component paths and blob
//! names declare locations relative to this layout; [`ProjectPaths::resolve`]
//! turns them into absolute paths.

use std::path::{Component, Path, PathBuf};

/// Data directory under the project root (catalog, partitions, scratch).
pub const DATA_DIR: &str = ".kitbag";

/// Asset root directory under the project root.
pub const ASSET_DIR: &str = "assets";

/// Canonical asset-root prefix recognized in declared paths (ASCII
/// case-insensitive).
pub const ASSET_PREFIX: &str = "assets/";

/// File name of the binary catalog config inside the data directory.
pub const CATALOG_FILE: &str = "catalog.bin";

/// Suffix of sidecar metadata marker files removed alongside their target.
pub const META_SUFFIX: &str = ".meta";

/// Project path resolution following the `.kitbag/` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    /// Root project directory (contains `.kitbag/` and the asset root).
    pub root: PathBuf,
    /// Asset root directory that declared paths resolve under by default.
    pub asset_root: PathBuf,
}

impl ProjectPaths {
    /// Lays out paths for the project rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let asset_root = root.join(ASSET_DIR);
        Self { root, asset_root }
    }

    /// `.kitbag/` data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Scratch parent for materializer temp directories, kept inside the
    /// project tree so renames into the tree stay on one filesystem.
    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir().join("tmp")
    }

    /// Binary catalog config file.
    pub fn catalog_file(&self) -> PathBuf {
        self.data_dir().join(CATALOG_FILE)
    }

    /// Resolves a declared component path to an absolute location.
    ///
    /// Precedence: an absolute path is used as-is; a path starting with
    /// `../` resolves relative to the project root; a path starting with
    /// the canonical asset-root prefix resolves relative to the project
    /// root; anything else resolves relative to the asset root.
    pub fn resolve(&self, declared: &str) -> PathBuf {
        let raw = Path::new(declared);
        if raw.is_absolute() {
            return raw.to_path_buf();
        }
        if declared.starts_with("../") {
            return normalize(&self.root.join(declared));
        }
        if has_asset_prefix(declared) {
            return normalize(&self.root.join(declared));
        }
        normalize(&self.asset_root.join(declared))
    }
}

/// Sidecar metadata marker next to `path` (`<path>.meta`).
pub fn meta_marker(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

fn has_asset_prefix(declared: &str) -> bool {
    declared
        .get(..ASSET_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(ASSET_PREFIX))
}

/// Lexical normalization: drops `.` components and folds `..` into the
/// preceding component without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
